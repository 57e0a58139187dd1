//! K-way merge of per-instrument tick sources.
//!
//! Keeps a one-element look-ahead per source and always emits the point with
//! the minimum `(time, name)`; ties go to the lexicographically smallest
//! instrument name. Only the emitted source advances, so each per-source
//! subsequence of the output equals the source itself.

use crate::data::Point;

use super::source::TickSource;

struct MergeEntry {
    source: Box<dyn TickSource>,
    lookahead: Option<Point>,
}

/// Deterministic time-ordered merge over several tick sources.
pub struct TickMerge {
    entries: Vec<MergeEntry>,
    primed: bool,
}

impl TickMerge {
    /// Build a merge over `sources`. Source order is normalized by name so
    /// the tie-break is independent of caller ordering.
    pub fn new(mut sources: Vec<Box<dyn TickSource>>) -> Self {
        sources.sort_by(|a, b| a.name().cmp(b.name()));
        Self {
            entries: sources
                .into_iter()
                .map(|source| MergeEntry {
                    source,
                    lookahead: None,
                })
                .collect(),
            primed: false,
        }
    }

    fn prime(&mut self) {
        for entry in &mut self.entries {
            entry.lookahead = entry.source.next_point();
        }
        self.primed = true;
    }

    /// Emit the next point in global `(time, name)` order.
    pub fn next_point(&mut self) -> Option<Point> {
        if !self.primed {
            self.prime();
        }

        // Entries are name-sorted, so a strict less-than scan lands on the
        // smallest name among equal times.
        let mut winner: Option<(usize, chrono::DateTime<chrono::Utc>)> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let Some(candidate) = &entry.lookahead else {
                continue;
            };
            match winner {
                None => winner = Some((index, candidate.time)),
                Some((_, best)) if candidate.time < best => {
                    winner = Some((index, candidate.time))
                }
                Some(_) => {}
            }
        }

        let (index, _) = winner?;
        let entry = &mut self.entries[index];
        let point = entry.lookahead.take();
        entry.lookahead = entry.source.next_point();
        point
    }

    /// True once every look-ahead is drained.
    pub fn is_exhausted(&self) -> bool {
        self.primed && self.entries.iter().all(|e| e.lookahead.is_none())
    }
}

impl Iterator for TickMerge {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        self.next_point()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MockTickSource;
    use chrono::DateTime;
    use rust_decimal_macros::dec;

    fn point(symbol: &str, secs: i64) -> Point {
        Point::new(
            DateTime::from_timestamp(secs, 0).unwrap(),
            symbol,
            Some(dec!(100)),
            Some(dec!(101)),
            dec!(1),
            dec!(1),
        )
    }

    fn sources(specs: Vec<(&str, Vec<i64>)>) -> Vec<Box<dyn TickSource>> {
        specs
            .into_iter()
            .map(|(symbol, times)| {
                let points = times.into_iter().map(|s| point(symbol, s)).collect();
                Box::new(MockTickSource::new(symbol, points)) as Box<dyn TickSource>
            })
            .collect()
    }

    #[test]
    fn test_merge_is_time_ordered() {
        let merge = TickMerge::new(sources(vec![
            ("ES", vec![1, 4, 7]),
            ("NQ", vec![2, 3, 8]),
        ]));
        let times: Vec<i64> = merge.map(|p| p.time.timestamp()).collect();
        assert_eq!(times, vec![1, 2, 3, 4, 7, 8]);
    }

    #[test]
    fn test_tie_break_by_name() {
        // Both instruments tick at t=5; AAA must come out first regardless
        // of construction order.
        let mut merge = TickMerge::new(sources(vec![("BBB", vec![5]), ("AAA", vec![5])]));
        assert_eq!(merge.next_point().unwrap().symbol, "AAA");
        assert_eq!(merge.next_point().unwrap().symbol, "BBB");
        assert!(merge.next_point().is_none());
        assert!(merge.is_exhausted());
    }

    #[test]
    fn test_per_source_subsequence_preserved() {
        let merge = TickMerge::new(sources(vec![
            ("ES", vec![1, 2, 9]),
            ("NQ", vec![1, 5, 6]),
        ]));
        let mut es = Vec::new();
        let mut nq = Vec::new();
        for p in merge {
            match p.symbol.as_str() {
                "ES" => es.push(p.time.timestamp()),
                _ => nq.push(p.time.timestamp()),
            }
        }
        assert_eq!(es, vec![1, 2, 9]);
        assert_eq!(nq, vec![1, 5, 6]);
    }

    #[test]
    fn test_empty_merge() {
        let mut merge = TickMerge::new(Vec::new());
        assert!(merge.next_point().is_none());
        assert!(merge.is_exhausted());
    }
}
