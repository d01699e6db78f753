//! Future event list.

use crate::event_queue::{Event, EventKey};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

/// Time-ordered queue of pending events.
///
/// The scheduler is the only source of time advancement: `current_time`
/// moves to the key of each popped event and never goes backwards.
#[derive(Debug, Default)]
pub struct EventScheduler {
    queue: BTreeMap<EventKey, Event>,
    sequence: u64,
    now: Duration,
    popped: u64,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event at an absolute time. Returns its key.
    ///
    /// Times earlier than `current_time` are a caller bug; they are clamped
    /// to `current_time` so ordering stays monotonic.
    pub fn schedule(&mut self, time: Duration, event: Event) -> EventKey {
        debug_assert!(
            time >= self.now,
            "event scheduled in the past: {time:?} < {:?}",
            self.now
        );
        let time = time.max(self.now);

        self.sequence += 1;
        let key = EventKey::new(time, self.sequence);
        trace!(time = ?time, sequence = key.sequence, event = ?event, "Event scheduled");
        self.queue.insert(key, event);
        key
    }

    /// Schedule an event `delay` after the current time.
    pub fn schedule_after(&mut self, delay: Duration, event: Event) -> EventKey {
        self.schedule(self.now + delay, event)
    }

    /// Remove and return the earliest event, advancing the clock to it.
    pub fn pop_next(&mut self) -> Option<(EventKey, Event)> {
        let (key, event) = self.queue.pop_first()?;
        self.now = key.time;
        self.popped += 1;
        Some((key, event))
    }

    /// Key of the earliest pending event.
    pub fn peek(&self) -> Option<EventKey> {
        self.queue.first_key_value().map(|(key, _)| *key)
    }

    pub fn has_events(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Time of the most recently popped event.
    pub fn current_time(&self) -> Duration {
        self.now
    }

    /// Events popped so far.
    pub fn events_popped(&self) -> u64 {
        self.popped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsim_types::FlowId;

    fn start(id: &str) -> Event {
        Event::FlowStart {
            flow: FlowId::from(id),
        }
    }

    #[test]
    fn test_pops_in_time_order() {
        let mut scheduler = EventScheduler::new();
        scheduler.schedule(Duration::from_secs(3), start("c"));
        scheduler.schedule(Duration::from_secs(1), start("a"));
        scheduler.schedule(Duration::from_secs(2), start("b"));

        let order: Vec<Event> = std::iter::from_fn(|| scheduler.pop_next())
            .map(|(_, event)| event)
            .collect();
        assert_eq!(order, vec![start("a"), start("b"), start("c")]);
        assert_eq!(scheduler.current_time(), Duration::from_secs(3));
        assert_eq!(scheduler.events_popped(), 3);
    }

    #[test]
    fn test_ties_break_by_insertion() {
        let mut scheduler = EventScheduler::new();
        for id in ["x", "y", "z"] {
            scheduler.schedule(Duration::from_secs(5), start(id));
        }
        let order: Vec<Event> = std::iter::from_fn(|| scheduler.pop_next())
            .map(|(_, event)| event)
            .collect();
        assert_eq!(order, vec![start("x"), start("y"), start("z")]);
    }

    #[test]
    fn test_schedule_after_is_relative_to_now() {
        let mut scheduler = EventScheduler::new();
        scheduler.schedule(Duration::from_secs(10), start("a"));
        scheduler.pop_next();

        let key = scheduler.schedule_after(Duration::from_secs(1), start("b"));
        assert_eq!(key.time, Duration::from_secs(11));
        assert_eq!(scheduler.peek(), Some(key));
    }

    #[test]
    fn test_empty_scheduler() {
        let mut scheduler = EventScheduler::new();
        assert!(!scheduler.has_events());
        assert!(scheduler.pop_next().is_none());
        assert_eq!(scheduler.current_time(), Duration::ZERO);
        assert_eq!(scheduler.events_popped(), 0);
    }

    #[test]
    fn test_unique_keys() {
        let mut scheduler = EventScheduler::new();
        let a = scheduler.schedule(Duration::ZERO, start("a"));
        let b = scheduler.schedule(Duration::ZERO, start("a"));
        assert_ne!(a, b);
        assert_eq!(scheduler.len(), 2);
    }
}
