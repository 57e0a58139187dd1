//! Tick sources for the replay feed.
//!
//! A source is a lazy, restartable sequence of points in non-decreasing time
//! order. The file source reads the simulator's text format, one file per
//! instrument, named after the instrument, under a configured directory.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::data::Point;
use crate::error::{GatewayError, GatewayResult};

/// A lazy, restartable sequence of points for one instrument.
pub trait TickSource: Send {
    /// Instrument name this source feeds.
    fn name(&self) -> &str;

    /// Next point, or `None` when the source is exhausted. Malformed
    /// entries are skipped, not returned.
    fn next_point(&mut self) -> Option<Point>;

    /// Restart the sequence from the beginning.
    fn rewind(&mut self) -> GatewayResult<()>;
}

/// File-backed tick source reading `<unixSeconds> <bid> <bidSize> <ask>
/// <askSize>` lines.
pub struct FileTickSource {
    symbol: String,
    path: PathBuf,
    reader: Option<BufReader<File>>,
}

impl FileTickSource {
    /// Create a source for `symbol` whose file lives under `dir` and is
    /// named after the instrument.
    pub fn open(dir: &Path, symbol: impl Into<String>) -> GatewayResult<Self> {
        let symbol = symbol.into();
        let path = dir.join(&symbol);
        if !path.is_file() {
            return Err(GatewayError::Configuration(format!(
                "no tick file for {symbol} at {}",
                path.display()
            )));
        }
        Ok(Self {
            symbol,
            path,
            reader: None,
        })
    }

    fn reader(&mut self) -> GatewayResult<&mut BufReader<File>> {
        if self.reader.is_none() {
            let file = File::open(&self.path)
                .map_err(|e| GatewayError::connection(format!("{}: {e}", self.path.display())))?;
            self.reader = Some(BufReader::new(file));
        }
        self.reader
            .as_mut()
            .ok_or_else(|| GatewayError::Invariant("tick reader missing after open".to_string()))
    }
}

impl TickSource for FileTickSource {
    fn name(&self) -> &str {
        &self.symbol
    }

    fn next_point(&mut self) -> Option<Point> {
        let symbol = self.symbol.clone();
        let reader = match self.reader() {
            Ok(reader) => reader,
            Err(error) => {
                warn!(%symbol, %error, "tick source unreadable");
                return None;
            }
        };

        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(error) => {
                    warn!(%symbol, %error, "tick source read failed");
                    return None;
                }
            }
            if line.trim().is_empty() {
                continue;
            }
            match Point::parse_line(&symbol, &line) {
                Ok(point) => return Some(point),
                Err(error) => {
                    // Malformed line: drop it and keep reading.
                    warn!(%symbol, %error, "skipping malformed tick line");
                }
            }
        }
    }

    fn rewind(&mut self) -> GatewayResult<()> {
        self.reader = None;
        Ok(())
    }
}

/// In-memory tick source for tests and synthetic feeds.
pub struct MockTickSource {
    symbol: String,
    points: Vec<Point>,
    cursor: usize,
}

impl MockTickSource {
    /// Create a source over a fixed point sequence.
    pub fn new(symbol: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            symbol: symbol.into(),
            points,
            cursor: 0,
        }
    }
}

impl TickSource for MockTickSource {
    fn name(&self) -> &str {
        &self.symbol
    }

    fn next_point(&mut self) -> Option<Point> {
        let point = self.points.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(point)
    }

    fn rewind(&mut self) -> GatewayResult<()> {
        self.cursor = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("terminal-core-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        dir
    }

    #[test]
    fn test_file_source_reads_and_skips_malformed() {
        let dir = scratch_file("ES", "1 100 1 101 1\nnot-a-line\n2 102 1 103 1\n");
        let mut source = FileTickSource::open(&dir, "ES").unwrap();

        let first = source.next_point().unwrap();
        assert_eq!(first.time.timestamp(), 1);
        // Malformed middle line is skipped.
        let second = source.next_point().unwrap();
        assert_eq!(second.time.timestamp(), 2);
        assert!(source.next_point().is_none());
    }

    #[test]
    fn test_file_source_rewind() {
        let dir = scratch_file("NQ", "5 10 1 11 1\n");
        let mut source = FileTickSource::open(&dir, "NQ").unwrap();

        assert!(source.next_point().is_some());
        assert!(source.next_point().is_none());

        source.rewind().unwrap();
        assert!(source.next_point().is_some());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let dir = std::env::temp_dir();
        assert!(FileTickSource::open(&dir, "NO_SUCH_INSTRUMENT").is_err());
    }
}
