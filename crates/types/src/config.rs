//! Simulation configuration.
//!
//! The configuration is the engine's only input: a topology of devices and
//! flows, the gate table, and the run settings. It is strongly typed and
//! checked once, at the boundary, by [`SimulationConfig::validate`].
//!
//! All times are expressed in seconds.

use crate::{ConfigError, DeviceId, FlowId, GateName};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Default delay before a deferred flow is retried.
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 1.0;

/// Default time a device may stay blocked before a timeout deadlock is declared.
pub const DEFAULT_DEADLOCK_TIMEOUT_SECS: f64 = 300.0;

/// Default simulated interval between deadlock checks.
pub const DEFAULT_DEADLOCK_CHECK_INTERVAL_SECS: f64 = 30.0;

/// Largest time, in seconds, accepted anywhere in a configuration.
///
/// Sums of a few such values still fit in a `std::time::Duration`.
pub const MAX_TIME_SECS: f64 = 1.0e12;

/// Inclusive `[min, max]` range of seconds, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange(pub f64, pub f64);

impl TimeRange {
    /// Create a range.
    pub fn new(min: f64, max: f64) -> Self {
        Self(min, max)
    }

    /// A degenerate range that always samples `secs`.
    pub fn fixed(secs: f64) -> Self {
        Self(secs, secs)
    }

    /// Lower bound.
    pub fn min(&self) -> f64 {
        self.0
    }

    /// Upper bound.
    pub fn max(&self) -> f64 {
        self.1
    }

    /// Whether `value` lies within the range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.0 && value <= self.1
    }

    fn is_valid(&self) -> bool {
        in_time_bounds(self.0) && in_time_bounds(self.1) && self.0 <= self.1
    }
}

/// When a flow's first start attempt is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetMode {
    /// Start at t=0 when independent; otherwise driven by dependencies.
    #[default]
    Parallel,
    /// Wait for dependencies regardless of elapsed time.
    Sequence,
    /// Start at a fixed `start_offset` or an offset sampled from `offset_range`.
    Custom,
}

/// Which state of a dependency satisfies readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OffsetType {
    /// The prerequisite must have completed.
    #[default]
    FinishToStart,
    /// The prerequisite must merely have started.
    StartToStart,
}

/// Condition under which a conditional delay applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayCondition {
    /// The referenced device's utilization meets or exceeds the threshold.
    #[default]
    HighUtilization,
}

/// Extra delay applied to a flow's start while a device is heavily utilized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalDelay {
    /// Condition type.
    #[serde(default)]
    pub condition_type: DelayCondition,
    /// Device whose utilization is observed.
    pub device_id: DeviceId,
    /// Utilization ratio (active flows / capacity) at which the delay applies.
    pub threshold: f64,
    /// Seconds of extra delay.
    pub delay_seconds: f64,
}

impl ConditionalDelay {
    /// Create a high-utilization delay rule.
    pub fn high_utilization(device_id: impl Into<DeviceId>, threshold: f64, delay_seconds: f64) -> Self {
        Self {
            condition_type: DelayCondition::HighUtilization,
            device_id: device_id.into(),
            threshold,
            delay_seconds,
        }
    }
}

/// Run-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Simulated horizon in seconds.
    pub duration: f64,

    /// Seed for all sampling.
    pub random_seed: u64,

    /// Delay before a deferred flow start is retried.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    /// A device blocked at least this long is a timeout deadlock.
    #[serde(default = "default_deadlock_timeout")]
    pub deadlock_timeout: f64,

    /// Simulated interval between deadlock checks.
    #[serde(default = "default_deadlock_check_interval")]
    pub deadlock_check_interval: f64,
}

fn default_retry_delay() -> f64 {
    DEFAULT_RETRY_DELAY_SECS
}

fn default_deadlock_timeout() -> f64 {
    DEFAULT_DEADLOCK_TIMEOUT_SECS
}

fn default_deadlock_check_interval() -> f64 {
    DEFAULT_DEADLOCK_CHECK_INTERVAL_SECS
}

impl SimulationSettings {
    /// Create settings with default retry and deadlock constants.
    pub fn new(duration: f64, random_seed: u64) -> Self {
        Self {
            duration,
            random_seed,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            deadlock_timeout: DEFAULT_DEADLOCK_TIMEOUT_SECS,
            deadlock_check_interval: DEFAULT_DEADLOCK_CHECK_INTERVAL_SECS,
        }
    }

    /// Set the retry delay.
    pub fn with_retry_delay(mut self, secs: f64) -> Self {
        self.retry_delay = secs;
        self
    }

    /// Set the deadlock timeout.
    pub fn with_deadlock_timeout(mut self, secs: f64) -> Self {
        self.deadlock_timeout = secs;
        self
    }

    /// Set the deadlock check interval.
    pub fn with_deadlock_check_interval(mut self, secs: f64) -> Self {
        self.deadlock_check_interval = secs;
        self
    }
}

/// A finite-capacity resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device id.
    pub id: DeviceId,

    /// Maximum concurrent flows.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Recovery period sampled after a flow completes onto this device.
    #[serde(default)]
    pub recovery_time_range: Option<TimeRange>,

    /// Probability that a completed flow triggers a recovery cycle.
    #[serde(default = "default_failure_probability")]
    pub failure_probability: f64,

    /// Gates that must be open for flows sourced at this device.
    #[serde(default, deserialize_with = "null_as_default")]
    pub required_gates: Vec<GateName>,
}

fn default_capacity() -> usize {
    1
}

fn default_failure_probability() -> f64 {
    1.0
}

impl DeviceConfig {
    /// Create a device with the given capacity.
    pub fn new(id: impl Into<DeviceId>, capacity: usize) -> Self {
        Self {
            id: id.into(),
            capacity,
            recovery_time_range: None,
            failure_probability: 1.0,
            required_gates: Vec::new(),
        }
    }

    /// Set the recovery range.
    pub fn with_recovery(mut self, min: f64, max: f64) -> Self {
        self.recovery_time_range = Some(TimeRange::new(min, max));
        self
    }

    /// Set the probability that a completion triggers recovery.
    pub fn with_failure_probability(mut self, probability: f64) -> Self {
        self.failure_probability = probability;
        self
    }

    /// Require a gate.
    pub fn with_required_gate(mut self, gate: impl Into<GateName>) -> Self {
        self.required_gates.push(gate.into());
        self
    }
}

/// A timed unit of work moving from one device to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Unique flow id.
    pub flow_id: FlowId,

    /// Device the work is taken from. Holds a slot while the flow runs.
    pub from_device: DeviceId,

    /// Device the work is delivered to. Also holds a slot while the flow runs.
    pub to_device: DeviceId,

    /// Processing time, sampled uniformly.
    pub process_time_range: TimeRange,

    /// Tie-break hint for flows first attempted at the same instant. Lower first.
    #[serde(default)]
    pub priority: i32,

    /// Flows this flow depends on.
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: Vec<FlowId>,

    /// When the first start attempt is made.
    #[serde(default)]
    pub offset_mode: OffsetMode,

    /// Which dependency state satisfies readiness.
    #[serde(default)]
    pub offset_type: OffsetType,

    /// Fixed start time for `custom` mode.
    #[serde(default)]
    pub start_offset: Option<f64>,

    /// Random start time range for `custom` mode. Takes precedence over `start_offset`.
    #[serde(default)]
    pub offset_range: Option<TimeRange>,

    /// Utilization-triggered delays.
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditional_delays: Vec<ConditionalDelay>,

    /// Gates that must be open for this flow to start.
    #[serde(default, deserialize_with = "null_as_default")]
    pub required_gates: Vec<GateName>,
}

impl FlowConfig {
    /// Create an independent parallel flow.
    pub fn new(
        flow_id: impl Into<FlowId>,
        from_device: impl Into<DeviceId>,
        to_device: impl Into<DeviceId>,
        process_time_range: TimeRange,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            from_device: from_device.into(),
            to_device: to_device.into(),
            process_time_range,
            priority: 0,
            dependencies: Vec::new(),
            offset_mode: OffsetMode::Parallel,
            offset_type: OffsetType::FinishToStart,
            start_offset: None,
            offset_range: None,
            conditional_delays: Vec::new(),
            required_gates: Vec::new(),
        }
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, flow_id: impl Into<FlowId>) -> Self {
        self.dependencies.push(flow_id.into());
        self
    }

    /// Set the offset mode.
    pub fn with_offset_mode(mut self, mode: OffsetMode) -> Self {
        self.offset_mode = mode;
        self
    }

    /// Set the offset type.
    pub fn with_offset_type(mut self, offset_type: OffsetType) -> Self {
        self.offset_type = offset_type;
        self
    }

    /// Use `custom` mode with a fixed start offset.
    pub fn with_start_offset(mut self, secs: f64) -> Self {
        self.offset_mode = OffsetMode::Custom;
        self.start_offset = Some(secs);
        self
    }

    /// Use `custom` mode with a random start offset.
    pub fn with_offset_range(mut self, min: f64, max: f64) -> Self {
        self.offset_mode = OffsetMode::Custom;
        self.offset_range = Some(TimeRange::new(min, max));
        self
    }

    /// Add a conditional delay rule.
    pub fn with_conditional_delay(mut self, rule: ConditionalDelay) -> Self {
        self.conditional_delays.push(rule);
        self
    }

    /// Set the priority hint.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Require a gate.
    pub fn with_required_gate(mut self, gate: impl Into<GateName>) -> Self {
        self.required_gates.push(gate.into());
        self
    }
}

/// Which optional sections the result carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOptions {
    /// Include the device state-transition log.
    #[serde(default = "enabled")]
    pub include_history: bool,

    /// Include the engine event timeline.
    #[serde(default = "enabled")]
    pub include_events: bool,
}

fn enabled() -> bool {
    true
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            include_history: true,
            include_events: true,
        }
    }
}

/// Complete simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Run settings.
    pub simulation: SimulationSettings,

    /// Devices, in output order.
    pub devices: Vec<DeviceConfig>,

    /// Flows, in configuration order.
    pub flows: Vec<FlowConfig>,

    /// Gate table: name → open.
    #[serde(default)]
    pub gates: IndexMap<GateName, bool>,

    /// Optional result sections.
    #[serde(default)]
    pub output_options: OutputOptions,
}

impl SimulationConfig {
    /// Create an empty configuration.
    pub fn new(duration: f64, random_seed: u64) -> Self {
        Self {
            simulation: SimulationSettings::new(duration, random_seed),
            devices: Vec::new(),
            flows: Vec::new(),
            gates: IndexMap::new(),
            output_options: OutputOptions::default(),
        }
    }

    /// Replace the run settings.
    pub fn with_settings(mut self, settings: SimulationSettings) -> Self {
        self.simulation = settings;
        self
    }

    /// Add a device.
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.devices.push(device);
        self
    }

    /// Add a flow.
    pub fn with_flow(mut self, flow: FlowConfig) -> Self {
        self.flows.push(flow);
        self
    }

    /// Declare a gate.
    pub fn with_gate(mut self, name: impl Into<GateName>, open: bool) -> Self {
        self.gates.insert(name.into(), open);
        self
    }

    /// Set the output options.
    pub fn with_output_options(mut self, options: OutputOptions) -> Self {
        self.output_options = options;
        self
    }

    /// Look up a device.
    pub fn device(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id.as_str() == id)
    }

    /// Look up a flow.
    pub fn flow(&self, id: &str) -> Option<&FlowConfig> {
        self.flows.iter().find(|f| f.flow_id.as_str() == id)
    }

    /// Check the configuration against the input contract.
    ///
    /// Checks settings, id uniqueness, references between flows, devices and
    /// gates, capacities, and every time range. Dependency cycles are
    /// detected when the flow graph is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let settings = &self.simulation;
        positive("duration", settings.duration)?;
        positive("retry_delay", settings.retry_delay)?;
        positive("deadlock_timeout", settings.deadlock_timeout)?;
        positive("deadlock_check_interval", settings.deadlock_check_interval)?;

        let mut device_ids = HashSet::new();
        for device in &self.devices {
            if !device_ids.insert(device.id.as_str()) {
                return Err(ConfigError::DuplicateDevice(device.id.clone()));
            }
            if device.capacity < 1 {
                return Err(ConfigError::InvalidCapacity {
                    device: device.id.clone(),
                    capacity: device.capacity,
                });
            }
            let owner = || format!("Device {}", device.id);
            if let Some(range) = device.recovery_time_range {
                check_range(owner(), "recovery_time_range", range)?;
            }
            check_ratio(owner(), "failure_probability", device.failure_probability)?;
            self.check_gates(owner(), &device.required_gates)?;
        }

        let mut flow_ids = HashSet::new();
        for flow in &self.flows {
            if !flow_ids.insert(flow.flow_id.as_str()) {
                return Err(ConfigError::DuplicateFlow(flow.flow_id.clone()));
            }
        }

        for flow in &self.flows {
            let owner = || format!("Flow {}", flow.flow_id);
            for device in [&flow.from_device, &flow.to_device] {
                if !device_ids.contains(device.as_str()) {
                    return Err(ConfigError::UnknownDevice {
                        flow: flow.flow_id.clone(),
                        device: device.clone(),
                    });
                }
            }
            check_range(owner(), "process_time_range", flow.process_time_range)?;
            for dependency in &flow.dependencies {
                if !flow_ids.contains(dependency.as_str()) {
                    return Err(ConfigError::UnknownDependency {
                        flow: flow.flow_id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
            if let Some(offset) = flow.start_offset {
                non_negative("start_offset", offset)?;
            }
            if let Some(range) = flow.offset_range {
                check_range(owner(), "offset_range", range)?;
            }
            for rule in &flow.conditional_delays {
                if !device_ids.contains(rule.device_id.as_str()) {
                    return Err(ConfigError::UnknownDevice {
                        flow: flow.flow_id.clone(),
                        device: rule.device_id.clone(),
                    });
                }
                check_ratio(owner(), "conditional delay threshold", rule.threshold)?;
                non_negative("delay_seconds", rule.delay_seconds)?;
            }
            self.check_gates(owner(), &flow.required_gates)?;
        }

        Ok(())
    }

    fn check_gates(&self, owner: String, gates: &[GateName]) -> Result<(), ConfigError> {
        match gates.iter().find(|g| !self.gates.contains_key(*g)) {
            Some(gate) => Err(ConfigError::UndefinedGate {
                owner,
                gate: gate.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Finite, non-negative and no larger than [`MAX_TIME_SECS`].
fn in_time_bounds(value: f64) -> bool {
    (0.0..=MAX_TIME_SECS).contains(&value)
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if in_time_bounds(value) && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidDuration { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if in_time_bounds(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidDuration { field, value })
    }
}

fn check_range(owner: String, field: &'static str, range: TimeRange) -> Result<(), ConfigError> {
    if range.is_valid() {
        Ok(())
    } else {
        Err(ConfigError::InvalidTimeRange {
            owner,
            field,
            min: range.min(),
            max: range.max(),
        })
    }
}

fn check_ratio(owner: String, field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidRatio {
            owner,
            field,
            value,
        })
    }
}

/// Accept `null` wherever a list is expected.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
