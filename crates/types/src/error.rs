//! Configuration errors.

use crate::{DeviceId, FlowId, GateName};
use thiserror::Error;

/// A configuration that cannot be simulated.
///
/// Raised before any event is scheduled. A run never starts from a
/// configuration that produced one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Two devices share an id.
    #[error("Duplicate device id: {0}")]
    DuplicateDevice(DeviceId),

    /// Two flows share an id.
    #[error("Duplicate flow id: {0}")]
    DuplicateFlow(FlowId),

    /// A flow or conditional delay references a device that does not exist.
    #[error("Flow {flow} references unknown device: {device}")]
    UnknownDevice { flow: FlowId, device: DeviceId },

    /// A flow depends on a flow that does not exist.
    #[error("Flow {flow} references unknown flow dependency: {dependency}")]
    UnknownDependency { flow: FlowId, dependency: FlowId },

    /// Device capacity below 1.
    #[error("Device {device} has invalid capacity {capacity}: capacity must be >= 1")]
    InvalidCapacity { device: DeviceId, capacity: usize },

    /// A time range is negative, non-finite, too large, or has min > max.
    #[error("{owner} has invalid {field} [{min}, {max}]")]
    InvalidTimeRange {
        owner: String,
        field: &'static str,
        min: f64,
        max: f64,
    },

    /// A scalar duration is negative, zero where positive is required, non-finite,
    /// or larger than [`MAX_TIME_SECS`](crate::MAX_TIME_SECS).
    #[error("Invalid {field}: {value}")]
    InvalidDuration { field: &'static str, value: f64 },

    /// A device or flow requires a gate that is not declared.
    #[error("{owner} requires undefined gate: {gate}")]
    UndefinedGate { owner: String, gate: GateName },

    /// A ratio (threshold, probability) outside [0, 1].
    #[error("{owner} has invalid {field} {value}: must be within [0, 1]")]
    InvalidRatio {
        owner: String,
        field: &'static str,
        value: f64,
    },

    /// The flow dependency graph contains a cycle.
    #[error("Circular dependency detected: {}", format_cycle(.cycle))]
    DependencyCycle { cycle: Vec<FlowId> },
}

fn format_cycle(cycle: &[FlowId]) -> String {
    cycle
        .iter()
        .map(FlowId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
