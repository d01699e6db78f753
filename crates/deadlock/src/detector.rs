//! Blocked-device tracking and deadlock checks.

use crate::graph::{find_cycle, Adjacency};
use flowsim_types::{DeviceId, FlowId, DEFAULT_DEADLOCK_CHECK_INTERVAL_SECS, DEFAULT_DEADLOCK_TIMEOUT_SECS};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Wait-for graph: device → devices it is waiting on.
pub type WaitGraph = BTreeMap<DeviceId, Vec<DeviceId>>;

/// Configuration for deadlock detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlockConfig {
    /// A device blocked at least this long is a timeout deadlock.
    pub timeout: Duration,

    /// Simulated interval between checks.
    pub check_interval: Duration,
}

impl Default for DeadlockConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs_f64(DEFAULT_DEADLOCK_TIMEOUT_SECS),
            check_interval: Duration::from_secs_f64(DEFAULT_DEADLOCK_CHECK_INTERVAL_SECS),
        }
    }
}

impl DeadlockConfig {
    /// Create a config with a custom timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create a config with a custom check interval.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }
}

/// Kind of deadlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlockType {
    /// A device stayed blocked past the timeout threshold.
    Timeout,
    /// The wait-for graph contains a cycle.
    CircularWait,
}

impl fmt::Display for DeadlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadlockType::Timeout => f.write_str("timeout"),
            DeadlockType::CircularWait => f.write_str("circular_wait"),
        }
    }
}

/// A detected deadlock.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadlockInfo {
    /// Timeout or circular wait.
    pub deadlock_type: DeadlockType,
    /// Devices taking part, in a stable order.
    pub involved_devices: Vec<DeviceId>,
    /// Flows registered as waiting on the involved devices.
    pub involved_flows: Vec<FlowId>,
    /// Simulated time of detection.
    pub detection_time: Duration,
    /// Human-readable description.
    pub message: String,
    /// For circular waits: the cycle, first device repeated at the end.
    pub wait_chain: Vec<DeviceId>,
    /// The complete wait-for graph at detection time.
    pub wait_graph: WaitGraph,
}

/// Counters describing the detector's current view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorStats {
    /// Devices currently registered as blocked.
    pub blocked_devices: usize,
    /// Edges in the wait-for graph.
    pub wait_relationships: usize,
    /// Deadlocks reported so far.
    pub deadlocks_detected: usize,
    /// Checks run so far.
    pub checks_run: u64,
}

#[derive(Debug, Clone)]
struct BlockedEntry {
    since: Duration,
    waiting_for: BTreeSet<DeviceId>,
    flows: BTreeSet<FlowId>,
}

/// Tracks blocked devices and checks for deadlocks.
///
/// The engine registers a device when it transitions to Blocked and
/// unregisters it when backpressure clears. Iteration is over ordered maps,
/// so for a given registration history the reported deadlock is always the
/// same one.
#[derive(Debug)]
pub struct DeadlockDetector {
    config: DeadlockConfig,
    blocked: BTreeMap<DeviceId, BlockedEntry>,
    /// Keys of deadlocks already reported.
    reported: HashSet<String>,
    last_check: Duration,
    checks_run: u64,
}

impl DeadlockDetector {
    /// Create a new detector.
    pub fn new(config: DeadlockConfig) -> Self {
        debug!(
            timeout_secs = config.timeout.as_secs_f64(),
            check_interval_secs = config.check_interval.as_secs_f64(),
            "Deadlock detector initialized"
        );
        Self {
            config,
            blocked: BTreeMap::new(),
            reported: HashSet::new(),
            last_check: Duration::ZERO,
            checks_run: 0,
        }
    }

    /// Get the detector configuration.
    pub fn config(&self) -> &DeadlockConfig {
        &self.config
    }

    /// Register that `device` is blocked waiting for capacity on `waiting_for`.
    ///
    /// The blocked-since time is kept from the first registration; repeated
    /// registrations only add wait-for edges and waiting flows.
    pub fn register_blocked(
        &mut self,
        device: &DeviceId,
        now: Duration,
        waiting_for: &DeviceId,
        flow: &FlowId,
    ) {
        let entry = self
            .blocked
            .entry(device.clone())
            .or_insert_with(|| {
                debug!(device = %device, now = ?now, "Device entered blocked state");
                BlockedEntry {
                    since: now,
                    waiting_for: BTreeSet::new(),
                    flows: BTreeSet::new(),
                }
            });

        if entry.waiting_for.insert(waiting_for.clone()) {
            debug!(device = %device, waiting_for = %waiting_for, "Device waiting for capacity");
        }
        entry.flows.insert(flow.clone());
    }

    /// Register that `device` is no longer blocked.
    ///
    /// Returns `true` if it was registered.
    pub fn register_unblocked(&mut self, device: &DeviceId) -> bool {
        let removed = self.blocked.remove(device).is_some();
        if removed {
            debug!(device = %device, "Device cleared blocked state");
        }
        removed
    }

    /// Whether `device` is currently registered as blocked.
    pub fn is_blocked(&self, device: &DeviceId) -> bool {
        self.blocked.contains_key(device)
    }

    /// Whether a periodic check is due at `now`.
    pub fn is_check_due(&self, now: Duration) -> bool {
        now.saturating_sub(self.last_check) >= self.config.check_interval
    }

    /// Check for a deadlock at `now`.
    ///
    /// The timeout check runs first; the circular-wait check only runs when
    /// no device has timed out. A deadlock already reported is not reported
    /// again.
    pub fn check_deadlock(&mut self, now: Duration) -> Option<DeadlockInfo> {
        self.last_check = now;
        self.checks_run += 1;

        if let Some(info) = self.check_timeout(now) {
            return Some(info);
        }
        self.check_circular_wait(now)
    }

    fn check_timeout(&mut self, now: Duration) -> Option<DeadlockInfo> {
        let timeout = self.config.timeout;
        let (device, entry) = self.blocked.iter().find(|(device, entry)| {
            now.saturating_sub(entry.since) >= timeout
                && !self.reported.contains(&timeout_key(device, entry.since))
        })?;
        let key = timeout_key(device, entry.since);

        let blocked_for = now.saturating_sub(entry.since);
        let mut message = format!(
            "Timeout deadlock: device '{}' has been blocked for {:.1}s (threshold: {:.1}s). ",
            device,
            blocked_for.as_secs_f64(),
            timeout.as_secs_f64()
        );
        if entry.waiting_for.is_empty() {
            message.push_str("No downstream capacity available.");
        } else {
            message.push_str("Waiting for: ");
            message.push_str(&join(entry.waiting_for.iter()));
        }

        let mut involved_devices = vec![device.clone()];
        involved_devices.extend(entry.waiting_for.iter().filter(|d| *d != device).cloned());
        let involved_flows = entry.flows.iter().cloned().collect();

        warn!(
            device = %device,
            blocked_secs = blocked_for.as_secs_f64(),
            detection_time = ?now,
            "Timeout deadlock detected"
        );

        self.reported.insert(key);
        Some(DeadlockInfo {
            deadlock_type: DeadlockType::Timeout,
            involved_devices,
            involved_flows,
            detection_time: now,
            message,
            wait_chain: Vec::new(),
            wait_graph: self.wait_graph(),
        })
    }

    fn check_circular_wait(&mut self, now: Duration) -> Option<DeadlockInfo> {
        let adjacency: Adjacency<DeviceId> = self
            .blocked
            .iter()
            .map(|(device, entry)| (device.clone(), entry.waiting_for.clone()))
            .collect();
        let cycle = find_cycle(&adjacency)?;

        let involved: BTreeSet<DeviceId> = cycle.iter().cloned().collect();
        let key = format!("cycle:{}", join(involved.iter()));
        if self.reported.contains(&key) {
            return None;
        }

        let chain = cycle
            .iter()
            .map(DeviceId::as_str)
            .collect::<Vec<_>>()
            .join(" -> ");
        let message = format!(
            "Circular wait deadlock detected: {chain}. Involved devices: {}",
            join(involved.iter())
        );

        let involved_flows: BTreeSet<FlowId> = involved
            .iter()
            .filter_map(|device| self.blocked.get(device))
            .flat_map(|entry| entry.flows.iter().cloned())
            .collect();

        warn!(
            wait_chain = %chain,
            detection_time = ?now,
            "Circular wait deadlock detected"
        );

        self.reported.insert(key);
        Some(DeadlockInfo {
            deadlock_type: DeadlockType::CircularWait,
            involved_devices: involved.into_iter().collect(),
            involved_flows: involved_flows.into_iter().collect(),
            detection_time: now,
            message,
            wait_chain: cycle,
            wait_graph: self.wait_graph(),
        })
    }

    /// Currently blocked devices with their blocked-since times.
    pub fn blocked_devices(&self) -> Vec<(DeviceId, Duration)> {
        self.blocked
            .iter()
            .map(|(device, entry)| (device.clone(), entry.since))
            .collect()
    }

    /// The current wait-for graph.
    pub fn wait_graph(&self) -> WaitGraph {
        self.blocked
            .iter()
            .map(|(device, entry)| (device.clone(), entry.waiting_for.iter().cloned().collect()))
            .collect()
    }

    /// Get detector statistics.
    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            blocked_devices: self.blocked.len(),
            wait_relationships: self.blocked.values().map(|e| e.waiting_for.len()).sum(),
            deadlocks_detected: self.reported.len(),
            checks_run: self.checks_run,
        }
    }

    /// Clear all state for a new run.
    pub fn reset(&mut self) {
        self.blocked.clear();
        self.reported.clear();
        self.last_check = Duration::ZERO;
        self.checks_run = 0;
    }
}

impl Default for DeadlockDetector {
    fn default() -> Self {
        Self::new(DeadlockConfig::default())
    }
}

fn timeout_key(device: &DeviceId, since: Duration) -> String {
    format!("timeout:{}:{}", device, since.as_nanos())
}

fn join<'a>(ids: impl Iterator<Item = &'a DeviceId>) -> String {
    ids.map(DeviceId::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn dev(id: &str) -> DeviceId {
        DeviceId::from(id)
    }

    fn flow(id: &str) -> FlowId {
        FlowId::from(id)
    }

    #[test]
    fn test_no_deadlock_when_nothing_blocked() {
        let mut detector = DeadlockDetector::default();
        assert!(detector.check_deadlock(secs(1000)).is_none());
        assert_eq!(detector.stats().checks_run, 1);
    }

    #[test]
    fn test_blocked_since_is_kept_from_first_registration() {
        let mut detector = DeadlockDetector::default();
        detector.register_blocked(&dev("D1"), secs(10), &dev("D2"), &flow("F1"));
        detector.register_blocked(&dev("D1"), secs(50), &dev("D3"), &flow("F2"));

        assert_eq!(detector.blocked_devices(), vec![(dev("D1"), secs(10))]);
        assert_eq!(
            detector.wait_graph().get(&dev("D1")),
            Some(&vec![dev("D2"), dev("D3")])
        );
        assert_eq!(detector.stats().wait_relationships, 2);
    }

    #[traced_test]
    #[test]
    fn test_timeout_detected_at_threshold() {
        let mut detector = DeadlockDetector::default();
        detector.register_blocked(&dev("D2"), secs(1), &dev("D1"), &flow("F2"));

        assert!(detector.check_deadlock(secs(300)).is_none());

        let info = detector.check_deadlock(secs(301)).expect("timeout");
        assert_eq!(info.deadlock_type, DeadlockType::Timeout);
        assert_eq!(info.involved_devices, vec![dev("D2"), dev("D1")]);
        assert_eq!(info.involved_flows, vec![flow("F2")]);
        assert_eq!(info.detection_time, secs(301));
        assert!(info.wait_chain.is_empty());
        assert!(info.message.contains("Waiting for: D1"));
        assert!(logs_contain("Timeout deadlock detected"));
    }

    #[test]
    fn test_timeout_takes_priority_over_cycle() {
        let mut detector = DeadlockDetector::default();
        detector.register_blocked(&dev("A"), secs(0), &dev("B"), &flow("F1"));
        detector.register_blocked(&dev("B"), secs(0), &dev("A"), &flow("F2"));

        let info = detector.check_deadlock(secs(400)).expect("deadlock");
        assert_eq!(info.deadlock_type, DeadlockType::Timeout);
    }

    #[test]
    fn test_circular_wait_detected() {
        let mut detector = DeadlockDetector::default();
        detector.register_blocked(&dev("D1"), secs(10), &dev("D2"), &flow("F12"));
        detector.register_blocked(&dev("D2"), secs(11), &dev("D3"), &flow("F23"));
        detector.register_blocked(&dev("D3"), secs(12), &dev("D1"), &flow("F31"));

        let info = detector.check_deadlock(secs(30)).expect("cycle");
        assert_eq!(info.deadlock_type, DeadlockType::CircularWait);
        assert_eq!(
            info.wait_chain,
            vec![dev("D1"), dev("D2"), dev("D3"), dev("D1")]
        );
        assert_eq!(info.involved_devices, vec![dev("D1"), dev("D2"), dev("D3")]);
        assert_eq!(
            info.involved_flows,
            vec![flow("F12"), flow("F23"), flow("F31")]
        );
        assert_eq!(info.wait_graph.len(), 3);
        assert!(info.message.contains("D1 -> D2 -> D3 -> D1"));
    }

    #[test]
    fn test_chain_without_cycle_is_not_deadlock() {
        let mut detector = DeadlockDetector::default();
        detector.register_blocked(&dev("D1"), secs(10), &dev("D2"), &flow("F1"));
        detector.register_blocked(&dev("D2"), secs(10), &dev("D3"), &flow("F2"));
        assert!(detector.check_deadlock(secs(30)).is_none());
    }

    #[test]
    fn test_unblock_breaks_cycle() {
        let mut detector = DeadlockDetector::default();
        detector.register_blocked(&dev("D1"), secs(0), &dev("D2"), &flow("F1"));
        detector.register_blocked(&dev("D2"), secs(0), &dev("D1"), &flow("F2"));

        assert!(detector.register_unblocked(&dev("D2")));
        assert!(!detector.register_unblocked(&dev("D2")));
        assert!(!detector.is_blocked(&dev("D2")));
        assert!(detector.check_deadlock(secs(30)).is_none());
    }

    #[test]
    fn test_same_deadlock_reported_once() {
        let mut detector = DeadlockDetector::default();
        detector.register_blocked(&dev("D1"), secs(0), &dev("D2"), &flow("F1"));
        detector.register_blocked(&dev("D2"), secs(0), &dev("D1"), &flow("F2"));

        assert!(detector.check_deadlock(secs(30)).is_some());
        assert!(detector.check_deadlock(secs(60)).is_none());
        assert_eq!(detector.stats().deadlocks_detected, 1);
    }

    #[test]
    fn test_check_interval() {
        let config = DeadlockConfig::default().with_check_interval(secs(30));
        let mut detector = DeadlockDetector::new(config);

        assert!(!detector.is_check_due(secs(29)));
        assert!(detector.is_check_due(secs(30)));
        detector.check_deadlock(secs(31));
        assert!(!detector.is_check_due(secs(60)));
        assert!(detector.is_check_due(secs(61)));
    }

    #[test]
    fn test_reset() {
        let mut detector = DeadlockDetector::default();
        detector.register_blocked(&dev("D1"), secs(0), &dev("D2"), &flow("F1"));
        detector.check_deadlock(secs(30));
        detector.reset();
        assert_eq!(detector.stats(), DetectorStats::default());
    }
}
