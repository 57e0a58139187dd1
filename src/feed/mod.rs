//! Tick replay: sources, merge, and the virtual-clock scheduler.

mod merge;
mod source;

pub use merge::TickMerge;
pub use source::{FileTickSource, MockTickSource, TickSource};

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::data::Point;

/// Paces a [`TickMerge`] on a virtual clock.
///
/// Exactly one point is forwarded per period. The scheduler stops when the
/// merge is exhausted, the sink is gone, or the disconnect signal fires;
/// stopping drops the merge and with it every source handle.
pub struct FeedScheduler {
    merge: TickMerge,
    period: Duration,
}

impl FeedScheduler {
    /// Create a scheduler emitting one point every `speed` milliseconds.
    pub fn new(merge: TickMerge, speed_ms: u64) -> Self {
        Self {
            merge,
            period: Duration::from_millis(speed_ms.max(1)),
        }
    }

    /// Run until exhaustion or disconnect, forwarding points into `sink`.
    pub async fn run(
        mut self,
        sink: mpsc::UnboundedSender<Point>,
        mut disconnect: broadcast::Receiver<()>,
    ) {
        let mut clock = tokio::time::interval(self.period);
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = disconnect.recv() => {
                    debug!("feed scheduler disconnected");
                    break;
                }
                _ = clock.tick() => {
                    match self.merge.next_point() {
                        Some(point) => {
                            if sink.send(point).is_err() {
                                debug!("feed sink dropped");
                                break;
                            }
                        }
                        None => {
                            debug!("all tick sources exhausted");
                            break;
                        }
                    }
                }
            }
        }
    }
}
