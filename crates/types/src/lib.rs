//! Core types for flowsim.
//!
//! This crate holds everything the simulation kernel and its callers share:
//!
//! - **Identifiers**: [`DeviceId`], [`FlowId`], [`GateName`]
//! - **Configuration**: [`SimulationConfig`] and its parts, validated once at
//!   the boundary by [`SimulationConfig::validate`]
//! - **Device states**: the four-state [`DeviceState`] machine and the
//!   [`DeviceEvent`]s that drive it
//! - **Errors**: [`ConfigError`]

mod config;
mod error;
mod identifiers;
mod state;

pub use config::{
    ConditionalDelay, DelayCondition, DeviceConfig, FlowConfig, OffsetMode, OffsetType,
    OutputOptions, SimulationConfig, SimulationSettings, TimeRange,
    DEFAULT_DEADLOCK_CHECK_INTERVAL_SECS, DEFAULT_DEADLOCK_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS,
    MAX_TIME_SECS,
};
pub use error::ConfigError;
pub use identifiers::{DeviceId, FlowId, GateName};
pub use state::{DeviceEvent, DeviceState};
