//! Structured run output.
//!
//! Every type here serializes to the stable result shape consumed by
//! exporters. Times are seconds as `f64`.

use crate::state::StateChange;
use flowsim_deadlock::{DeadlockInfo, DeadlockType, WaitGraph};
use flowsim_types::{DeviceId, DeviceState, FlowId};
use serde::Serialize;

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    DeadlockDetected,
}

/// Why the event loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// No events left.
    QueueExhausted,
    /// The next event lies beyond the configured duration.
    DurationReached,
    /// The deadlock detector reported a deadlock.
    DeadlockDetected,
}

/// Complete result of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub status: RunStatus,
    pub metadata: RunMetadata,
    pub summary: Summary,
    pub device_states: Vec<DeviceReport>,
    pub flows: Vec<FlowReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_timeline: Option<Vec<TimelineEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_history: Option<Vec<StateChange>>,
    /// Deadlock diagnostics, present when `status` is `deadlock_detected`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DeadlockReport>,
}

impl SimulationResult {
    pub fn is_deadlock(&self) -> bool {
        self.status == RunStatus::DeadlockDetected
    }

    /// Look up a device report.
    pub fn device(&self, id: &str) -> Option<&DeviceReport> {
        self.device_states.iter().find(|d| d.device_id.as_str() == id)
    }

    /// Look up a flow report.
    pub fn flow(&self, id: &str) -> Option<&FlowReport> {
        self.flows.iter().find(|f| f.flow_id.as_str() == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub duration: f64,
    pub random_seed: u64,
    pub engine_version: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_events: u64,
    pub flows_completed: usize,
    pub devices_count: usize,
    pub simulation_time_seconds: f64,
    /// Wall-clock time. The only field that differs between identical runs.
    pub execution_time_seconds: f64,
    pub termination: Termination,
}

/// Per-device outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReport {
    pub device_id: DeviceId,
    pub final_state: DeviceState,
    pub state_changes: usize,
    pub time_in_state: StateDurations,
    /// Flows released from this device as their source.
    pub flows_processed: u64,
    pub peak_active_flows: usize,
    /// Flows still holding a slot when the run ended.
    pub active_flows: usize,
}

/// Seconds spent in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StateDurations {
    pub idle: f64,
    pub processing: f64,
    pub blocked: f64,
    pub failed: f64,
}

/// Per-flow outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowReport {
    pub flow_id: FlowId,
    pub started_at: Option<f64>,
    pub completed_at: Option<f64>,
    /// Start events handled for this flow.
    pub attempts: u32,
    pub deferrals: u32,
}

/// One engine-level occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub time: f64,
    #[serde(flatten)]
    pub event: TimelineEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimelineEvent {
    FlowDeferred {
        flow_id: FlowId,
        reason: DeferReason,
        retry_at: f64,
    },
    FlowStarted {
        flow_id: FlowId,
        from_device: DeviceId,
        to_device: DeviceId,
        process_time: f64,
    },
    FlowCompleted {
        flow_id: FlowId,
    },
    RecoveryStarted {
        device_id: DeviceId,
        recovery_time: f64,
    },
    RecoveryCompleted {
        device_id: DeviceId,
    },
    DeadlockDetected {
        deadlock_type: DeadlockType,
        involved_devices: Vec<DeviceId>,
    },
}

/// Why a start attempt was pushed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
    GateClosed,
    DependenciesPending,
    ConditionalDelay,
    SourceAtCapacity,
    DestinationAtCapacity,
}

/// Deadlock diagnostics in result form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadlockReport {
    pub deadlock_type: DeadlockType,
    pub message: String,
    pub involved_devices: Vec<DeviceId>,
    pub involved_flows: Vec<FlowId>,
    pub detection_time: f64,
    pub wait_chain: Vec<DeviceId>,
    pub wait_graph: WaitGraph,
}

impl From<&DeadlockInfo> for DeadlockReport {
    fn from(info: &DeadlockInfo) -> Self {
        Self {
            deadlock_type: info.deadlock_type,
            message: info.message.clone(),
            involved_devices: info.involved_devices.clone(),
            involved_flows: info.involved_flows.clone(),
            detection_time: info.detection_time.as_secs_f64(),
            wait_chain: info.wait_chain.clone(),
            wait_graph: info.wait_graph.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_names() {
        assert_eq!(
            serde_json::to_value(RunStatus::DeadlockDetected).unwrap(),
            json!("deadlock_detected")
        );
        assert_eq!(
            serde_json::to_value(Termination::QueueExhausted).unwrap(),
            json!("queue_exhausted")
        );
    }

    #[test]
    fn test_timeline_entry_shape() {
        let entry = TimelineEntry {
            time: 12.0,
            event: TimelineEvent::FlowDeferred {
                flow_id: "F1".into(),
                reason: DeferReason::DestinationAtCapacity,
                retry_at: 13.0,
            },
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "time": 12.0,
                "event": "flow_deferred",
                "flow_id": "F1",
                "reason": "destination_at_capacity",
                "retry_at": 13.0
            })
        );
    }
}
