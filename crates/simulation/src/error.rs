//! Simulation errors.
//!
//! Only construction problems and engine logic errors land here. Deferrals,
//! closed gates and deadlocks are normal control flow.

use flowsim_types::{ConfigError, DeviceEvent, DeviceId, DeviceState, FlowId};
use thiserror::Error;

/// A device event that is not legal from the device's current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Illegal transition on device {device}: {event} from {from}")]
pub struct TransitionError {
    pub device: DeviceId,
    pub from: DeviceState,
    pub event: DeviceEvent,
}

/// Errors raised by the simulation kernel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// The configuration cannot be simulated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Illegal device state transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Unknown device: {0}")]
    UnknownDevice(DeviceId),

    #[error("Unknown flow: {0}")]
    UnknownFlow(FlowId),

    #[error("Flow {0} was already marked started")]
    FlowAlreadyStarted(FlowId),

    #[error("Flow {0} was already marked completed")]
    FlowAlreadyCompleted(FlowId),
}
