//! Device state machines and capacity accounting.

use crate::error::{SimulationError, TransitionError};
use crate::result::{DeviceReport, StateDurations};
use flowsim_types::{DeviceConfig, DeviceEvent, DeviceId, DeviceState, FlowId};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::trace;

/// One recorded device transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub device_id: DeviceId,
    pub from_state: DeviceState,
    pub to_state: DeviceState,
    pub event: DeviceEvent,
    pub time: f64,
}

#[derive(Debug, Clone)]
struct DeviceSlot {
    capacity: usize,
    state: DeviceState,
    active: BTreeSet<FlowId>,
    entered_at: Duration,
    time_in_state: [Duration; 4],
    state_changes: usize,
    flows_processed: u64,
    peak_active: usize,
}

impl DeviceSlot {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: DeviceState::Idle,
            active: BTreeSet::new(),
            entered_at: Duration::ZERO,
            time_in_state: [Duration::ZERO; 4],
            state_changes: 0,
            flows_processed: 0,
            peak_active: 0,
        }
    }
}

/// Owns every device's state and active-flow set.
///
/// `acquire_capacity` and `release_capacity` are the only mutation points
/// for the active-flow sets, and `transition` the only one for states. The
/// active set of a device never exceeds its capacity.
#[derive(Debug, Clone)]
pub struct StateManager {
    devices: IndexMap<DeviceId, DeviceSlot>,
    history: Vec<StateChange>,
}

impl StateManager {
    /// Create a manager with every device Idle and empty.
    pub fn new(devices: &[DeviceConfig]) -> Self {
        Self {
            devices: devices
                .iter()
                .map(|d| (d.id.clone(), DeviceSlot::new(d.capacity)))
                .collect(),
            history: Vec::new(),
        }
    }

    fn slot(&self, device: &DeviceId) -> Result<&DeviceSlot, SimulationError> {
        self.devices
            .get(device)
            .ok_or_else(|| SimulationError::UnknownDevice(device.clone()))
    }

    fn slot_mut(&mut self, device: &DeviceId) -> Result<&mut DeviceSlot, SimulationError> {
        self.devices
            .get_mut(device)
            .ok_or_else(|| SimulationError::UnknownDevice(device.clone()))
    }

    pub fn contains(&self, device: &str) -> bool {
        self.devices.contains_key(device)
    }

    /// Current state of a device.
    pub fn state(&self, device: &DeviceId) -> Result<DeviceState, SimulationError> {
        Ok(self.slot(device)?.state)
    }

    /// Apply a transition event at simulated time `now`.
    ///
    /// Illegal events are rejected without changing anything.
    pub fn transition(
        &mut self,
        device: &DeviceId,
        event: DeviceEvent,
        now: Duration,
    ) -> Result<DeviceState, SimulationError> {
        let slot = self.slot_mut(device)?;
        let from = slot.state;
        let to = from.apply(event).ok_or_else(|| TransitionError {
            device: device.clone(),
            from,
            event,
        })?;

        slot.time_in_state[from.index()] += now.saturating_sub(slot.entered_at);
        slot.entered_at = now;
        slot.state = to;
        slot.state_changes += 1;

        trace!(device = %device, %from, %to, %event, now = ?now, "Device transition");
        self.history.push(StateChange {
            device_id: device.clone(),
            from_state: from,
            to_state: to,
            event,
            time: now.as_secs_f64(),
        });
        Ok(to)
    }

    /// Whether the device has a free slot.
    pub fn has_capacity(&self, device: &DeviceId) -> Result<bool, SimulationError> {
        let slot = self.slot(device)?;
        Ok(slot.active.len() < slot.capacity)
    }

    /// Take a slot on `device` for `flow`.
    ///
    /// Fails without side effects when the device is full or Failed.
    /// Acquiring a slot the flow already holds succeeds without change.
    pub fn acquire_capacity(
        &mut self,
        device: &DeviceId,
        flow: &FlowId,
    ) -> Result<bool, SimulationError> {
        let slot = self.slot_mut(device)?;
        if slot.active.contains(flow) {
            return Ok(true);
        }
        if slot.state == DeviceState::Failed || slot.active.len() >= slot.capacity {
            return Ok(false);
        }

        slot.active.insert(flow.clone());
        slot.peak_active = slot.peak_active.max(slot.active.len());
        trace!(device = %device, flow = %flow, active = slot.active.len(), "Capacity acquired");
        Ok(true)
    }

    /// Give back the slot `flow` holds on `device`. Returns whether it held one.
    pub fn release_capacity(
        &mut self,
        device: &DeviceId,
        flow: &FlowId,
    ) -> Result<bool, SimulationError> {
        let slot = self.slot_mut(device)?;
        let released = slot.active.remove(flow);
        if released {
            trace!(device = %device, flow = %flow, active = slot.active.len(), "Capacity released");
        }
        Ok(released)
    }

    /// Count one flow finished with `device` as its source.
    pub fn record_processed(&mut self, device: &DeviceId) -> Result<(), SimulationError> {
        self.slot_mut(device)?.flows_processed += 1;
        Ok(())
    }

    /// Flows holding a slot on `device`, in id order.
    pub fn active_flows(
        &self,
        device: &DeviceId,
    ) -> Result<impl Iterator<Item = &FlowId> + '_, SimulationError> {
        Ok(self.slot(device)?.active.iter())
    }

    /// Whether `flow` holds a slot on `device`.
    pub fn holds(&self, device: &DeviceId, flow: &FlowId) -> Result<bool, SimulationError> {
        Ok(self.slot(device)?.active.contains(flow))
    }

    pub fn active_count(&self, device: &DeviceId) -> Result<usize, SimulationError> {
        Ok(self.slot(device)?.active.len())
    }

    pub fn capacity(&self, device: &DeviceId) -> Result<usize, SimulationError> {
        Ok(self.slot(device)?.capacity)
    }

    /// Active flows divided by capacity.
    pub fn utilization(&self, device: &DeviceId) -> Result<f64, SimulationError> {
        let slot = self.slot(device)?;
        Ok(slot.active.len() as f64 / slot.capacity.max(1) as f64)
    }

    /// All recorded transitions, in order.
    pub fn history(&self) -> &[StateChange] {
        &self.history
    }

    /// Recorded transitions of one device.
    pub fn history_for<'a>(&'a self, device: &'a str) -> impl Iterator<Item = &'a StateChange> {
        self.history
            .iter()
            .filter(move |change| change.device_id.as_str() == device)
    }

    /// Per-device reports, in configuration order, with the current state's
    /// time accounted up to `now`.
    pub fn reports(&self, now: Duration) -> Vec<DeviceReport> {
        self.devices
            .iter()
            .map(|(id, slot)| {
                let mut spent = slot.time_in_state;
                spent[slot.state.index()] += now.saturating_sub(slot.entered_at);
                let secs = |state: DeviceState| spent[state.index()].as_secs_f64();

                DeviceReport {
                    device_id: id.clone(),
                    final_state: slot.state,
                    state_changes: slot.state_changes,
                    time_in_state: StateDurations {
                        idle: secs(DeviceState::Idle),
                        processing: secs(DeviceState::Processing),
                        blocked: secs(DeviceState::Blocked),
                        failed: secs(DeviceState::Failed),
                    },
                    flows_processed: slot.flows_processed,
                    peak_active_flows: slot.peak_active,
                    active_flows: slot.active.len(),
                }
            })
            .collect()
    }
}
