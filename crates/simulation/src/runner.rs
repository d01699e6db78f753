//! Simulation engine.
//!
//! Owns the scheduler, state manager, flow controller, deadlock detector and
//! RNG, and drives them from a single event loop. Nothing blocks: a flow that
//! cannot proceed is re-enqueued `retry_delay` later.
//!
//! A running flow holds one slot on its source and one on its destination,
//! so flows sharing a device are serialized by its capacity. The source slot
//! is taken first and kept while the flow waits for the destination.

use crate::event_queue::Event;
use crate::flows::FlowController;
use crate::result::{
    DeadlockReport, DeferReason, FlowReport, RunMetadata, RunStatus, SimulationResult, Summary,
    Termination, TimelineEntry, TimelineEvent,
};
use crate::rng::DeterministicRng;
use crate::scheduler::EventScheduler;
use crate::state::StateManager;
use crate::{secs, SimulationError};
use flowsim_deadlock::{DeadlockConfig, DeadlockDetector, DeadlockInfo};
use flowsim_types::{
    DeviceConfig, DeviceEvent, DeviceId, DeviceState, FlowConfig, FlowId, GateName, OffsetMode,
    OutputOptions, SimulationConfig,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Counters collected during a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulationStats {
    /// Total events processed.
    pub events_processed: u64,
    /// Flows that passed every start check.
    pub flows_started: u64,
    pub flows_completed: u64,
    /// Start attempts pushed back, for any reason.
    pub deferrals: u64,
    /// Recovery cycles started.
    pub recoveries: u64,
    /// Deadlock checks run.
    pub deadlock_checks: u64,
}

impl SimulationStats {
    /// Average deferrals per started flow.
    pub fn deferrals_per_start(&self) -> f64 {
        if self.flows_started == 0 {
            0.0
        } else {
            self.deferrals as f64 / self.flows_started as f64
        }
    }
}

/// Per-flow bookkeeping that is not part of the dependency status.
#[derive(Debug, Clone, Default)]
struct FlowProgress {
    /// A start event for this flow is in the queue.
    pending: bool,
    /// The conditional delay has been served.
    delay_applied: bool,
    started_at: Option<Duration>,
    completed_at: Option<Duration>,
    attempts: u32,
    deferrals: u32,
}

/// Deterministic discrete-event simulation engine.
///
/// Given the same configuration and seed, produces identical results every
/// run.
pub struct SimulationEngine {
    /// Flow configurations, indexed like `progress`.
    flow_configs: Arc<[FlowConfig]>,
    flow_index: HashMap<FlowId, usize>,
    devices: IndexMap<DeviceId, DeviceConfig>,
    gates: IndexMap<GateName, bool>,

    scheduler: EventScheduler,
    states: StateManager,
    flows: FlowController,
    detector: DeadlockDetector,
    rng: DeterministicRng,

    horizon: Duration,
    retry_delay: Duration,
    output: OutputOptions,

    progress: Vec<FlowProgress>,
    timeline: Vec<TimelineEntry>,
    stats: SimulationStats,
    deadlock: Option<DeadlockInfo>,
    termination: Option<Termination>,
}

impl SimulationEngine {
    /// Build an engine and schedule every flow's first start attempt.
    ///
    /// The configuration is validated and the dependency graph checked for
    /// cycles; either failure prevents the run from starting.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let flows = FlowController::new(&config.flows)?;

        let settings = &config.simulation;
        let detector = DeadlockDetector::new(
            DeadlockConfig::default()
                .with_timeout(secs(settings.deadlock_timeout))
                .with_check_interval(secs(settings.deadlock_check_interval)),
        );

        let flow_index = config
            .flows
            .iter()
            .enumerate()
            .map(|(i, flow)| (flow.flow_id.clone(), i))
            .collect();

        let mut engine = Self {
            flow_index,
            devices: config
                .devices
                .iter()
                .map(|d| (d.id.clone(), d.clone()))
                .collect(),
            states: StateManager::new(&config.devices),
            flows,
            detector,
            rng: DeterministicRng::new(settings.random_seed),
            scheduler: EventScheduler::new(),
            horizon: secs(settings.duration),
            retry_delay: secs(settings.retry_delay),
            output: config.output_options,
            progress: vec![FlowProgress::default(); config.flows.len()],
            timeline: Vec::new(),
            stats: SimulationStats::default(),
            deadlock: None,
            termination: None,
            gates: config.gates,
            flow_configs: config.flows.into(),
        };
        engine.schedule_initial_flows();

        info!(
            devices = engine.devices.len(),
            flows = engine.flow_configs.len(),
            seed = engine.rng.seed(),
            duration_secs = engine.horizon.as_secs_f64(),
            initial_events = engine.scheduler.len(),
            "Simulation engine initialized"
        );
        Ok(engine)
    }

    /// Schedule first start attempts, lowest priority value first, ties in
    /// configuration order.
    fn schedule_initial_flows(&mut self) {
        let mut order: Vec<usize> = (0..self.flow_configs.len()).collect();
        order.sort_by_key(|&i| self.flow_configs[i].priority);

        let flows = Arc::clone(&self.flow_configs);
        for i in order {
            let flow = &flows[i];
            let independent = flow.dependencies.is_empty();
            let start = match flow.offset_mode {
                OffsetMode::Parallel | OffsetMode::Sequence if independent => Some(0.0),
                OffsetMode::Parallel | OffsetMode::Sequence => None,
                OffsetMode::Custom => Some(match flow.offset_range {
                    Some(range) => self.rng.sample(range),
                    None => flow.start_offset.unwrap_or(0.0),
                }),
            };

            match start {
                Some(at) => {
                    trace!(flow = %flow.flow_id, start_secs = at, "Initial start scheduled");
                    self.progress[i].pending = true;
                    self.scheduler.schedule(
                        secs(at),
                        Event::FlowStart {
                            flow: flow.flow_id.clone(),
                        },
                    );
                }
                None => {
                    trace!(flow = %flow.flow_id, "Start deferred to dependency completion");
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.scheduler.current_time()
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn device_state(&self, device: &str) -> Option<DeviceState> {
        let (id, _) = self.devices.get_key_value(device)?;
        self.states.state(id).ok()
    }

    pub fn active_flow_count(&self, device: &str) -> Option<usize> {
        let (id, _) = self.devices.get_key_value(device)?;
        self.states.active_count(id).ok()
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.states
    }

    pub fn flow_controller(&self) -> &FlowController {
        &self.flows
    }

    pub fn detector(&self) -> &DeadlockDetector {
        &self.detector
    }

    /// The deadlock that ended the run, if any.
    pub fn deadlock(&self) -> Option<&DeadlockInfo> {
        self.deadlock.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.termination.is_some()
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Open or close a gate. Returns the previous value, if the gate existed.
    pub fn set_gate(&mut self, gate: impl Into<GateName>, open: bool) -> Option<bool> {
        let gate = gate.into();
        debug!(gate = %gate, open, now = ?self.now(), "Gate set");
        self.gates.insert(gate, open)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Event loop
    // ═══════════════════════════════════════════════════════════════════════

    /// Run to termination and build the result.
    pub fn run(&mut self) -> Result<SimulationResult, SimulationError> {
        let started = Instant::now();
        while self.step()? {}
        Ok(self.result(started.elapsed()))
    }

    /// Dispatch exactly one event.
    ///
    /// Returns `Ok(false)` once the run has terminated: queue exhausted,
    /// next event beyond the horizon, or deadlock detected.
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        if self.termination.is_some() {
            return Ok(false);
        }

        let Some(next) = self.scheduler.peek() else {
            self.finish(Termination::QueueExhausted);
            return Ok(false);
        };
        if next.time > self.horizon {
            debug!(
                remaining_events = self.scheduler.len(),
                "Time limit reached"
            );
            self.finish(Termination::DurationReached);
            return Ok(false);
        }
        let Some((key, event)) = self.scheduler.pop_next() else {
            self.finish(Termination::QueueExhausted);
            return Ok(false);
        };

        trace!(time = ?key.time, sequence = key.sequence, event = ?event, "Processing event");
        self.stats.events_processed += 1;

        match event {
            Event::FlowStart { flow } => self.on_flow_start(&flow)?,
            Event::FlowComplete { flow } => self.on_flow_complete(&flow)?,
            Event::RecoveryComplete { device } => self.on_recovery_complete(&device)?,
        }

        let now = self.now();
        if self.detector.is_check_due(now) {
            self.stats.deadlock_checks += 1;
            if let Some(info) = self.detector.check_deadlock(now) {
                warn!(
                    deadlock_type = %info.deadlock_type,
                    devices = ?info.involved_devices,
                    detection_time = ?now,
                    "Simulation halted on deadlock"
                );
                self.record(TimelineEvent::DeadlockDetected {
                    deadlock_type: info.deadlock_type,
                    involved_devices: info.involved_devices.clone(),
                });
                self.deadlock = Some(info);
                self.finish(Termination::DeadlockDetected);
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn finish(&mut self, termination: Termination) {
        self.termination = Some(termination);
        info!(
            termination = ?termination,
            events = self.stats.events_processed,
            flows_completed = self.stats.flows_completed,
            simulated_secs = self.now().as_secs_f64(),
            "Simulation finished"
        );
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Flow start
    // ═══════════════════════════════════════════════════════════════════════

    fn on_flow_start(&mut self, flow_id: &FlowId) -> Result<(), SimulationError> {
        let idx = self.flow_idx(flow_id)?;
        self.progress[idx].pending = false;

        if self.flows.is_started(flow_id.as_str()) {
            trace!(flow = %flow_id, "Stale start event ignored");
            return Ok(());
        }
        self.progress[idx].attempts += 1;

        let flows = Arc::clone(&self.flow_configs);
        let flow = &flows[idx];
        let (from, to) = (&flow.from_device, &flow.to_device);

        if let Some(gate) = self.closed_gate(flow) {
            trace!(flow = %flow_id, gate = %gate, "Gate closed");
            self.defer(idx, DeferReason::GateClosed, self.retry_delay);
            return Ok(());
        }

        if !self.flows.is_ready(&flow.dependencies, flow.offset_type) {
            self.defer(idx, DeferReason::DependenciesPending, self.retry_delay);
            return Ok(());
        }

        if !self.progress[idx].delay_applied {
            let delay = self.conditional_delay(flow)?;
            if delay > 0.0 {
                self.progress[idx].delay_applied = true;
                self.defer(idx, DeferReason::ConditionalDelay, secs(delay));
                return Ok(());
            }
        }

        let now = self.now();

        // Covers flows that already hold their slot as well.
        if self.states.state(from)? == DeviceState::Failed {
            self.defer(idx, DeferReason::SourceAtCapacity, self.retry_delay);
            return Ok(());
        }

        // A flow deferred on its destination keeps the source slot it took.
        if !self.states.holds(from, flow_id)? {
            if !self.states.acquire_capacity(from, flow_id)? {
                self.defer(idx, DeferReason::SourceAtCapacity, self.retry_delay);
                return Ok(());
            }
            if self.states.state(from)? == DeviceState::Idle {
                self.states
                    .transition(from, DeviceEvent::StartProcessing, now)?;
            }
        }

        if !self.states.acquire_capacity(to, flow_id)? {
            if self.states.state(from)? == DeviceState::Processing {
                self.states
                    .transition(from, DeviceEvent::BackpressureDetected, now)?;
            }
            if self.states.state(from)? == DeviceState::Blocked {
                self.detector.register_blocked(from, now, to, flow_id);
            }
            self.defer(idx, DeferReason::DestinationAtCapacity, self.retry_delay);
            return Ok(());
        }

        if self.states.state(from)? == DeviceState::Blocked {
            self.states
                .transition(from, DeviceEvent::BackpressureCleared, now)?;
            self.detector.register_unblocked(from);
        }

        self.flows.mark_started(flow_id)?;
        let process_time = self.rng.sample(flow.process_time_range);
        self.scheduler.schedule(
            now + secs(process_time),
            Event::FlowComplete {
                flow: flow_id.clone(),
            },
        );
        self.progress[idx].started_at = Some(now);
        self.stats.flows_started += 1;

        debug!(
            flow = %flow_id,
            from = %from,
            to = %to,
            process_secs = process_time,
            now = ?now,
            "Flow started"
        );
        self.record(TimelineEvent::FlowStarted {
            flow_id: flow_id.clone(),
            from_device: from.clone(),
            to_device: to.clone(),
            process_time,
        });

        self.trigger_dependents(flow_id);
        Ok(())
    }

    /// First closed gate required by the flow or its source device.
    fn closed_gate(&self, flow: &FlowConfig) -> Option<GateName> {
        let device_gates = self
            .devices
            .get(&flow.from_device)
            .map(|d| d.required_gates.as_slice())
            .unwrap_or_default();

        flow.required_gates
            .iter()
            .chain(device_gates)
            .find(|gate| !self.gates.get(*gate).copied().unwrap_or(false))
            .cloned()
    }

    /// Sum of the delays whose utilization threshold is met right now.
    fn conditional_delay(&self, flow: &FlowConfig) -> Result<f64, SimulationError> {
        let mut total = 0.0;
        for rule in &flow.conditional_delays {
            let utilization = self.states.utilization(&rule.device_id)?;
            if utilization >= rule.threshold {
                trace!(
                    flow = %flow.flow_id,
                    device = %rule.device_id,
                    utilization,
                    threshold = rule.threshold,
                    delay_secs = rule.delay_seconds,
                    "Conditional delay applies"
                );
                total += rule.delay_seconds;
            }
        }
        Ok(total)
    }

    fn defer(&mut self, idx: usize, reason: DeferReason, delay: Duration) {
        let flow_id = self.flow_configs[idx].flow_id.clone();
        let retry_at = self.now() + delay;

        let progress = &mut self.progress[idx];
        progress.pending = true;
        progress.deferrals += 1;
        self.stats.deferrals += 1;

        debug!(flow = %flow_id, reason = ?reason, retry_at = ?retry_at, "Flow start deferred");
        self.scheduler.schedule(
            retry_at,
            Event::FlowStart {
                flow: flow_id.clone(),
            },
        );
        self.record(TimelineEvent::FlowDeferred {
            flow_id,
            reason,
            retry_at: retry_at.as_secs_f64(),
        });
    }

    /// Schedule an immediate start attempt for every dependent of `flow_id`
    /// that is now ready, not started and not already queued.
    fn trigger_dependents(&mut self, flow_id: &FlowId) {
        let flows = Arc::clone(&self.flow_configs);
        for dependent in self.flows.dependents(flow_id.as_str()) {
            let Some(&idx) = self.flow_index.get(dependent) else {
                continue;
            };
            let config = &flows[idx];
            if self.progress[idx].pending
                || self.flows.is_started(dependent.as_str())
                || !self.flows.is_ready(&config.dependencies, config.offset_type)
            {
                continue;
            }

            trace!(flow = %dependent, prerequisite = %flow_id, "Dependent flow triggered");
            self.progress[idx].pending = true;
            self.scheduler.schedule(
                self.scheduler.current_time(),
                Event::FlowStart {
                    flow: dependent.clone(),
                },
            );
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Completion and recovery
    // ═══════════════════════════════════════════════════════════════════════

    fn on_flow_complete(&mut self, flow_id: &FlowId) -> Result<(), SimulationError> {
        let idx = self.flow_idx(flow_id)?;
        let flows = Arc::clone(&self.flow_configs);
        let flow = &flows[idx];
        let from = &flow.from_device;
        let now = self.now();

        self.states.release_capacity(from, flow_id)?;
        self.states.release_capacity(&flow.to_device, flow_id)?;
        self.states.record_processed(from)?;
        if self.states.state(from)? == DeviceState::Processing
            && self.outbound_count(from)? == 0
        {
            self.states
                .transition(from, DeviceEvent::CompleteProcessing, now)?;
        }

        self.flows.mark_completed(flow_id)?;
        self.progress[idx].completed_at = Some(now);
        self.stats.flows_completed += 1;

        debug!(flow = %flow_id, now = ?now, "Flow completed");
        self.record(TimelineEvent::FlowCompleted {
            flow_id: flow_id.clone(),
        });

        self.trigger_dependents(flow_id);
        self.maybe_start_recovery(&flow.to_device)
    }

    fn maybe_start_recovery(&mut self, device: &DeviceId) -> Result<(), SimulationError> {
        let Some(config) = self.devices.get(device) else {
            return Err(SimulationError::UnknownDevice(device.clone()));
        };
        let Some(range) = config.recovery_time_range else {
            return Ok(());
        };
        let probability = config.failure_probability;

        let state = self.states.state(device)?;
        if !state.accepts(DeviceEvent::RecoveryStart) {
            debug!(device = %device, state = %state, "Recovery skipped");
            return Ok(());
        }
        if probability < 1.0 && !self.rng.chance(probability) {
            trace!(device = %device, probability, "Recovery not triggered");
            return Ok(());
        }

        let now = self.now();
        self.states
            .transition(device, DeviceEvent::RecoveryStart, now)?;
        let recovery_time = self.rng.sample(range);
        self.scheduler.schedule(
            now + secs(recovery_time),
            Event::RecoveryComplete {
                device: device.clone(),
            },
        );
        self.stats.recoveries += 1;

        debug!(device = %device, recovery_secs = recovery_time, now = ?now, "Recovery started");
        self.record(TimelineEvent::RecoveryStarted {
            device_id: device.clone(),
            recovery_time,
        });
        Ok(())
    }

    fn on_recovery_complete(&mut self, device: &DeviceId) -> Result<(), SimulationError> {
        let now = self.now();
        self.states
            .transition(device, DeviceEvent::RecoveryComplete, now)?;
        if self.outbound_count(device)? > 0 {
            self.states
                .transition(device, DeviceEvent::StartProcessing, now)?;
        }

        debug!(device = %device, now = ?now, "Recovery completed");
        self.record(TimelineEvent::RecoveryCompleted {
            device_id: device.clone(),
        });
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════

    fn flow_idx(&self, flow: &FlowId) -> Result<usize, SimulationError> {
        self.flow_index
            .get(flow)
            .copied()
            .ok_or_else(|| SimulationError::UnknownFlow(flow.clone()))
    }

    /// Slots on `device` held by flows sourced there. Inbound deliveries
    /// occupy capacity but do not keep the device Processing.
    fn outbound_count(&self, device: &DeviceId) -> Result<usize, SimulationError> {
        Ok(self
            .states
            .active_flows(device)?
            .filter_map(|flow| self.flow_index.get(flow))
            .filter(|&&idx| self.flow_configs[idx].from_device == *device)
            .count())
    }

    fn record(&mut self, event: TimelineEvent) {
        if self.output.include_events {
            self.timeline.push(TimelineEntry {
                time: self.now().as_secs_f64(),
                event,
            });
        }
    }

    /// Build the result from the engine's current state.
    pub fn result(&self, execution_time: Duration) -> SimulationResult {
        let now = self.now();
        let status = match self.deadlock {
            Some(_) => RunStatus::DeadlockDetected,
            None => RunStatus::Completed,
        };

        let flows = self
            .flow_configs
            .iter()
            .zip(&self.progress)
            .map(|(flow, progress)| FlowReport {
                flow_id: flow.flow_id.clone(),
                started_at: progress.started_at.map(|t| t.as_secs_f64()),
                completed_at: progress.completed_at.map(|t| t.as_secs_f64()),
                attempts: progress.attempts,
                deferrals: progress.deferrals,
            })
            .collect();

        SimulationResult {
            status,
            metadata: RunMetadata {
                duration: self.horizon.as_secs_f64(),
                random_seed: self.rng.seed(),
                engine_version: env!("CARGO_PKG_VERSION"),
            },
            summary: Summary {
                total_events: self.stats.events_processed,
                flows_completed: self.flows.completed_count(),
                devices_count: self.devices.len(),
                simulation_time_seconds: now.as_secs_f64(),
                execution_time_seconds: execution_time.as_secs_f64(),
                termination: self.termination.unwrap_or(Termination::QueueExhausted),
            },
            device_states: self.states.reports(now),
            flows,
            event_timeline: self
                .output
                .include_events
                .then(|| self.timeline.clone()),
            state_history: self
                .output
                .include_history
                .then(|| self.states.history().to_vec()),
            error: self.deadlock.as_ref().map(DeadlockReport::from),
        }
    }
}
