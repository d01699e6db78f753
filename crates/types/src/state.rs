//! Device state machine types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a device.
///
/// ```text
///            START_PROCESSING            BACKPRESSURE_DETECTED
///   ┌──────┐ ───────────────▶ ┌────────────┐ ───────────────▶ ┌─────────┐
///   │ Idle │                  │ Processing │                  │ Blocked │
///   └──────┘ ◀─────────────── └────────────┘ ◀─────────────── └─────────┘
///     ▲   │   COMPLETE_PROCESSING    │        BACKPRESSURE_CLEARED
///     │   │                          │
///     │   └───── RECOVERY_START ─────┤
///     │                              ▼
///     │      RECOVERY_COMPLETE   ┌────────┐
///     └───────────────────────── │ Failed │
///                                └────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum DeviceState {
    /// No active work.
    #[default]
    Idle,
    /// At least one flow is active on the device.
    Processing,
    /// Work is paused because a downstream device has no free capacity.
    Blocked,
    /// Post-processing recovery period. No new work is accepted.
    Failed,
}

impl DeviceState {
    /// All states, in a stable order.
    pub const ALL: [DeviceState; 4] = [
        DeviceState::Idle,
        DeviceState::Processing,
        DeviceState::Blocked,
        DeviceState::Failed,
    ];

    /// Apply a transition event.
    ///
    /// Returns `None` if the event is not legal in this state.
    pub fn apply(self, event: DeviceEvent) -> Option<DeviceState> {
        use DeviceEvent::*;
        use DeviceState::*;

        match (self, event) {
            (Idle, StartProcessing) => Some(Processing),
            (Processing, CompleteProcessing) => Some(Idle),
            (Processing, BackpressureDetected) => Some(Blocked),
            (Blocked, BackpressureCleared) => Some(Processing),
            (Idle | Processing, RecoveryStart) => Some(Failed),
            (Failed, RecoveryComplete) => Some(Idle),
            _ => None,
        }
    }

    /// Whether `event` is legal from this state.
    pub fn accepts(self, event: DeviceEvent) -> bool {
        self.apply(event).is_some()
    }

    /// Stable index into per-state arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Idle => "Idle",
            DeviceState::Processing => "Processing",
            DeviceState::Blocked => "Blocked",
            DeviceState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Event that drives a device state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceEvent {
    /// Idle → Processing.
    StartProcessing,
    /// Processing → Idle.
    CompleteProcessing,
    /// Processing → Blocked.
    BackpressureDetected,
    /// Blocked → Processing.
    BackpressureCleared,
    /// Idle | Processing → Failed.
    RecoveryStart,
    /// Failed → Idle.
    RecoveryComplete,
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceEvent::StartProcessing => "START_PROCESSING",
            DeviceEvent::CompleteProcessing => "COMPLETE_PROCESSING",
            DeviceEvent::BackpressureDetected => "BACKPRESSURE_DETECTED",
            DeviceEvent::BackpressureCleared => "BACKPRESSURE_CLEARED",
            DeviceEvent::RecoveryStart => "RECOVERY_START",
            DeviceEvent::RecoveryComplete => "RECOVERY_COMPLETE",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert_eq!(
            DeviceState::Idle.apply(DeviceEvent::StartProcessing),
            Some(DeviceState::Processing)
        );
        assert_eq!(
            DeviceState::Processing.apply(DeviceEvent::BackpressureDetected),
            Some(DeviceState::Blocked)
        );
        assert_eq!(
            DeviceState::Blocked.apply(DeviceEvent::BackpressureCleared),
            Some(DeviceState::Processing)
        );
        assert_eq!(
            DeviceState::Processing.apply(DeviceEvent::RecoveryStart),
            Some(DeviceState::Failed)
        );
        assert_eq!(
            DeviceState::Failed.apply(DeviceEvent::RecoveryComplete),
            Some(DeviceState::Idle)
        );
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!DeviceState::Idle.accepts(DeviceEvent::BackpressureDetected));
        assert!(!DeviceState::Blocked.accepts(DeviceEvent::CompleteProcessing));
        assert!(!DeviceState::Blocked.accepts(DeviceEvent::RecoveryStart));
        assert!(!DeviceState::Failed.accepts(DeviceEvent::StartProcessing));
        assert!(!DeviceState::Idle.accepts(DeviceEvent::RecoveryComplete));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(
            DeviceEvent::BackpressureDetected.to_string(),
            "BACKPRESSURE_DETECTED"
        );
        assert_eq!(
            serde_json::to_string(&DeviceEvent::RecoveryComplete).unwrap(),
            "\"RECOVERY_COMPLETE\""
        );
        assert_eq!(
            serde_json::to_string(&DeviceState::Blocked).unwrap(),
            "\"Blocked\""
        );
    }
}
