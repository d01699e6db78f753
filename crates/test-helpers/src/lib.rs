//! Scenario fixtures shared by the engine and CLI tests.
//!
//! Each function returns a valid [`SimulationConfig`] whose outcome is known
//! in advance. Process times are fixed ranges unless the scenario is about
//! sampling.

use flowsim_types::{DeviceConfig, FlowConfig, SimulationConfig, TimeRange};

/// Seed used by every fixture unless a test overrides it.
pub const DEFAULT_SEED: u64 = 42;

/// Three capacity-1 devices A → B → C → A, one flow per edge, no
/// dependencies. Each flow holds a slot on both of its devices, so the shared
/// devices alone serialize the work:
///
/// ```text
///   t=0   F1 takes A and B; F3 takes C, waits for A   C blocked on A
///   t=10  F1 done; F3 takes A; F2 takes B, waits for C  B blocked on C
///   t=15  F3 done; F2 takes C
///   t=30  F2 done: 10 + 15 + 5
/// ```
pub fn linear_chain() -> SimulationConfig {
    SimulationConfig::new(1000.0, DEFAULT_SEED)
        .with_device(DeviceConfig::new("A", 1))
        .with_device(DeviceConfig::new("B", 1))
        .with_device(DeviceConfig::new("C", 1))
        .with_flow(FlowConfig::new("F1", "A", "B", TimeRange::fixed(10.0)))
        .with_flow(FlowConfig::new("F2", "B", "C", TimeRange::fixed(15.0)))
        .with_flow(FlowConfig::new("F3", "C", "A", TimeRange::fixed(5.0)))
}

/// The same chain with `F2` waiting for `F1` and `F3` for `F2`, so the flows
/// run in edge order.
pub fn dependent_chain() -> SimulationConfig {
    let mut config = linear_chain();
    config.flows[1] = config.flows[1].clone().with_dependency("F1");
    config.flows[2] = config.flows[2].clone().with_dependency("F2");
    config
}

/// Two capacity-1 devices that end up each holding the slot the other needs.
///
/// ```text
///   t=0     Z takes D1 (D1 → D3, 10.5s)
///   t=1     Y takes D2, wants D1        D2 blocked on D1
///   t=10.5  Z done; X takes D1, wants D2  D1 blocked on D2
///   t=30    first check sees D1 → D2 → D1
/// ```
pub fn circular_wait() -> SimulationConfig {
    SimulationConfig::new(1000.0, DEFAULT_SEED)
        .with_device(DeviceConfig::new("D1", 1))
        .with_device(DeviceConfig::new("D2", 1))
        .with_device(DeviceConfig::new("D3", 10))
        .with_flow(FlowConfig::new("Z", "D1", "D3", TimeRange::fixed(10.5)))
        .with_flow(FlowConfig::new("Y", "D2", "D1", TimeRange::fixed(5.0)).with_start_offset(1.0))
        .with_flow(FlowConfig::new("X", "D1", "D2", TimeRange::fixed(5.0)).with_dependency("Z"))
}

/// `S` blocks at t=0 on `T`, which is busy for far longer than the
/// deadlock timeout. No cycle ever forms.
pub fn timeout_stall() -> SimulationConfig {
    SimulationConfig::new(2000.0, DEFAULT_SEED)
        .with_device(DeviceConfig::new("S", 1))
        .with_device(DeviceConfig::new("T", 1))
        .with_device(DeviceConfig::new("U", 1))
        .with_flow(FlowConfig::new("hold", "T", "U", TimeRange::fixed(1000.0)))
        .with_flow(FlowConfig::new("stuck", "S", "T", TimeRange::fixed(1.0)))
}

/// A flow delivers into a device with a fixed 20s recovery; the follow-up
/// flow sourced there must wait for the recovery to finish.
pub fn recovery() -> SimulationConfig {
    SimulationConfig::new(500.0, DEFAULT_SEED)
        .with_device(DeviceConfig::new("press", 1))
        .with_device(DeviceConfig::new("oven", 1).with_recovery(20.0, 20.0))
        .with_device(DeviceConfig::new("store", 5))
        .with_flow(FlowConfig::new("load", "press", "oven", TimeRange::fixed(5.0)))
        .with_flow(
            FlowConfig::new("bake", "oven", "store", TimeRange::fixed(30.0)).with_dependency("load"),
        )
}

/// A single flow behind a gate.
pub fn gated(open: bool) -> SimulationConfig {
    SimulationConfig::new(100.0, DEFAULT_SEED)
        .with_gate("power", open)
        .with_device(DeviceConfig::new("D1", 1))
        .with_device(DeviceConfig::new("D2", 1))
        .with_flow(
            FlowConfig::new("F1", "D1", "D2", TimeRange::fixed(10.0)).with_required_gate("power"),
        )
}

/// One flow whose start is sampled from `[5, 15]`.
pub fn offset_range(seed: u64) -> SimulationConfig {
    SimulationConfig::new(100.0, seed)
        .with_device(DeviceConfig::new("D1", 1))
        .with_device(DeviceConfig::new("D2", 1))
        .with_flow(
            FlowConfig::new("F1", "D1", "D2", TimeRange::fixed(1.0)).with_offset_range(5.0, 15.0),
        )
}

/// A wider mixed workload with random process times, for determinism checks.
pub fn mixed_workload(seed: u64) -> SimulationConfig {
    let mut config = SimulationConfig::new(600.0, seed)
        .with_device(DeviceConfig::new("intake", 2))
        .with_device(DeviceConfig::new("cut", 1).with_recovery(2.0, 6.0))
        .with_device(DeviceConfig::new("weld", 2).with_recovery(1.0, 3.0).with_failure_probability(0.5))
        .with_device(DeviceConfig::new("paint", 1))
        .with_device(DeviceConfig::new("ship", 4));

    for batch in 0..4 {
        let cut = format!("cut-{batch}");
        let weld = format!("weld-{batch}");
        let paint = format!("paint-{batch}");
        config = config
            .with_flow(
                FlowConfig::new(cut.as_str(), "intake", "cut", TimeRange::new(3.0, 8.0))
                    .with_offset_range(0.0, 20.0),
            )
            .with_flow(
                FlowConfig::new(weld.as_str(), "cut", "weld", TimeRange::new(4.0, 9.0))
                    .with_dependency(cut.as_str()),
            )
            .with_flow(
                FlowConfig::new(paint.as_str(), "weld", "paint", TimeRange::new(2.0, 5.0))
                    .with_dependency(weld.as_str()),
            )
            .with_flow(
                FlowConfig::new(format!("ship-{batch}"), "paint", "ship", TimeRange::new(1.0, 2.0))
                    .with_dependency(paint.as_str()),
            );
    }
    config
}
