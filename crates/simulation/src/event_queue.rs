//! Event queue with deterministic ordering.

use flowsim_types::{DeviceId, FlowId};
use std::cmp::Ordering;
use std::time::Duration;

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Sequence number (FIFO for the same time)
///
/// The sequence number is unique per scheduler and doubles as the event id.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct EventKey {
    /// When this event should be processed.
    pub time: Duration,
    /// Insertion order.
    pub sequence: u64,
}

impl EventKey {
    pub fn new(time: Duration, sequence: u64) -> Self {
        Self { time, sequence }
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Scheduled engine work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Attempt to start a flow.
    FlowStart { flow: FlowId },
    /// A running flow finishes processing.
    FlowComplete { flow: FlowId },
    /// A device's recovery period ends.
    RecoveryComplete { device: DeviceId },
}
