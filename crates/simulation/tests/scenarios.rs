//! End-to-end scenarios with known outcomes.
//!
//! Each test builds an engine from a fixture, runs it to termination, and
//! checks the structured result: status, timings, device histories and
//! deadlock diagnostics.

use flowsim_deadlock::DeadlockType;
use flowsim_simulation::{
    DeferReason, RunStatus, SimulationEngine, SimulationResult, Termination, TimelineEvent,
};
use flowsim_test_helpers as fixtures;
use flowsim_types::{
    DeviceEvent, DeviceId, DeviceState, FlowId, OffsetType, SimulationConfig, TimeRange,
};
use std::collections::HashMap;
use tracing_test::traced_test;

fn run(config: SimulationConfig) -> SimulationResult {
    SimulationEngine::new(config)
        .expect("fixture is valid")
        .run()
        .expect("run succeeds")
}

// ═══════════════════════════════════════════════════════════════════════════════
// Linear chain
// ═══════════════════════════════════════════════════════════════════════════════

/// A → B → C → A with fixed times 10, 15, 5 and no dependencies: shared
/// devices serialize the flows and the last completes at 30.
#[test]
fn test_linear_chain_completion_time() {
    let result = run(fixtures::linear_chain());

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.summary.termination, Termination::QueueExhausted);
    assert_eq!(result.summary.flows_completed, 3);

    let span = |id: &str| {
        let flow = result.flow(id).unwrap();
        (flow.started_at, flow.completed_at)
    };
    assert_eq!(span("F1"), (Some(0.0), Some(10.0)));
    assert_eq!(span("F3"), (Some(10.0), Some(15.0)));
    assert_eq!(span("F2"), (Some(15.0), Some(30.0)));
    assert_eq!(result.summary.simulation_time_seconds, 30.0);

    for (device, changes) in [("A", 2), ("B", 4), ("C", 4)] {
        let report = result.device(device).unwrap();
        assert_eq!(report.final_state, DeviceState::Idle);
        assert_eq!(report.flows_processed, 1);
        assert_eq!(report.state_changes, changes, "{device}");
    }
    assert_eq!(result.device("B").unwrap().time_in_state.blocked, 5.0);
    assert!(result.error.is_none());
}

/// With explicit dependencies the flows run in edge order instead.
#[test]
fn test_dependent_chain_runs_in_edge_order() {
    let result = run(fixtures::dependent_chain());

    assert_eq!(result.flow("F2").unwrap().started_at, Some(10.0));
    assert_eq!(result.flow("F3").unwrap().started_at, Some(25.0));
    assert_eq!(result.flow("F3").unwrap().completed_at, Some(30.0));
    assert!(result
        .device_states
        .iter()
        .all(|d| d.time_in_state.blocked == 0.0));
}

/// Completion time is fixed by the seed even when durations are sampled.
#[test]
fn test_linear_chain_reproducible_with_ranges() {
    let mut config = fixtures::linear_chain();
    for flow in &mut config.flows {
        flow.process_time_range = TimeRange::new(5.0, 20.0);
    }

    let first = run(config.clone());
    let second = run(config);
    let end = first.summary.simulation_time_seconds;
    assert_eq!(second.summary.simulation_time_seconds, end);
    assert_eq!(first.summary.flows_completed, 3);
    // Serialized work, plus at most one retry interval per handover.
    assert!((15.0..=62.0).contains(&end), "end {end}");
}

// ═══════════════════════════════════════════════════════════════════════════════
// Deadlocks
// ═══════════════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn test_circular_wait_detected() {
    let result = run(fixtures::circular_wait());

    assert_eq!(result.status, RunStatus::DeadlockDetected);
    assert_eq!(result.summary.termination, Termination::DeadlockDetected);

    let error = result.error.as_ref().expect("deadlock payload");
    assert_eq!(error.deadlock_type, DeadlockType::CircularWait);
    assert_eq!(
        error.involved_devices,
        vec![DeviceId::from("D1"), DeviceId::from("D2")]
    );
    assert_eq!(
        error.involved_flows,
        vec![FlowId::from("X"), FlowId::from("Y")]
    );
    assert_eq!(
        error.wait_chain,
        vec![
            DeviceId::from("D1"),
            DeviceId::from("D2"),
            DeviceId::from("D1")
        ]
    );
    assert_eq!(error.wait_graph.len(), 2);
    assert_eq!(error.detection_time, 30.0);
    assert!(error.detection_time < 300.0, "found before any timeout");

    assert_eq!(result.device("D1").unwrap().final_state, DeviceState::Blocked);
    assert_eq!(result.device("D2").unwrap().final_state, DeviceState::Blocked);
    assert_eq!(result.flow("Z").unwrap().completed_at, Some(10.5));
}

#[test]
fn test_circular_wait_result_shape() {
    let result = run(fixtures::circular_wait());
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["status"], "deadlock_detected");
    assert_eq!(json["error"]["deadlock_type"], "circular_wait");
    assert_eq!(json["error"]["wait_graph"]["D1"][0], "D2");
    assert_eq!(json["error"]["wait_graph"]["D2"][0], "D1");
    assert_eq!(json["summary"]["termination"], "deadlock_detected");

    let last = result.event_timeline.as_ref().unwrap().last().unwrap();
    assert!(matches!(
        last.event,
        TimelineEvent::DeadlockDetected {
            deadlock_type: DeadlockType::CircularWait,
            ..
        }
    ));
}

#[test]
fn test_timeout_detected() {
    let result = run(fixtures::timeout_stall());

    let error = result.error.as_ref().expect("deadlock payload");
    assert_eq!(error.deadlock_type, DeadlockType::Timeout);
    assert_eq!(error.detection_time, 300.0);
    assert_eq!(error.involved_devices[0], DeviceId::from("S"));
    assert!(error.involved_devices.contains(&DeviceId::from("T")));
    assert_eq!(error.involved_flows, vec![FlowId::from("stuck")]);
    assert!(error.wait_chain.is_empty());
    assert_eq!(result.flow("hold").unwrap().completed_at, None);
}

#[test]
fn test_shorter_timeout_from_settings() {
    let mut config = fixtures::timeout_stall();
    config.simulation.deadlock_timeout = 60.0;
    config.simulation.deadlock_check_interval = 10.0;

    let result = run(config);
    assert_eq!(result.error.unwrap().detection_time, 60.0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Backpressure and capacity
// ═══════════════════════════════════════════════════════════════════════════════

/// The source blocks only while its destination is full.
#[test]
fn test_backpressure_transitions_in_history() {
    let result = run(fixtures::circular_wait());
    let history = result.state_history.unwrap();

    let d2: Vec<_> = history
        .iter()
        .filter(|c| c.device_id.as_str() == "D2")
        .map(|c| (c.event, c.time))
        .collect();
    assert_eq!(
        d2,
        vec![
            (DeviceEvent::StartProcessing, 1.0),
            (DeviceEvent::BackpressureDetected, 1.0),
        ]
    );
}

#[test]
fn test_capacity_never_exceeded() {
    let config = fixtures::mixed_workload(11);
    let capacities: HashMap<String, usize> = config
        .devices
        .iter()
        .map(|d| (d.id.to_string(), d.capacity))
        .collect();

    let mut engine = SimulationEngine::new(config).unwrap();
    while engine.step().unwrap() {
        for (device, capacity) in &capacities {
            let active = engine.active_flow_count(device).unwrap();
            assert!(
                active <= *capacity,
                "{device} holds {active} flows with capacity {capacity} at {:?}",
                engine.now()
            );
        }
    }
    assert!(engine.stats().flows_completed > 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Dependencies and offsets
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_dependencies_respected() {
    let config = fixtures::mixed_workload(5);
    let flows = config.flows.clone();
    let result = run(config);

    for flow in &flows {
        let Some(started) = result.flow(flow.flow_id.as_str()).unwrap().started_at else {
            continue;
        };
        for dep in &flow.dependencies {
            let dep_report = result.flow(dep.as_str()).unwrap();
            match flow.offset_type {
                OffsetType::FinishToStart => {
                    let done = dep_report.completed_at.expect("prerequisite completed");
                    assert!(done <= started, "{} started before {dep} completed", flow.flow_id);
                }
                OffsetType::StartToStart => {
                    let began = dep_report.started_at.expect("prerequisite started");
                    assert!(began <= started);
                }
            }
        }
    }
}

#[test]
fn test_offset_range_sampling() {
    let first = run(fixtures::offset_range(1234));
    let second = run(fixtures::offset_range(1234));

    let offset = first.flow("F1").unwrap().started_at.unwrap();
    assert!(TimeRange::new(5.0, 15.0).contains(offset), "offset {offset} out of range");
    assert_eq!(second.flow("F1").unwrap().started_at, Some(offset));

    let distinct: std::collections::BTreeSet<u64> = (0..10)
        .map(|seed| {
            run(fixtures::offset_range(seed))
                .flow("F1")
                .unwrap()
                .started_at
                .unwrap()
                .to_bits()
        })
        .collect();
    assert!(distinct.len() > 1, "offsets should vary with the seed");
}

// ═══════════════════════════════════════════════════════════════════════════════
// Gates and recovery
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_closed_gate_never_starts() {
    let result = run(fixtures::gated(false));

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.summary.termination, Termination::DurationReached);
    let f1 = result.flow("F1").unwrap();
    assert_eq!(f1.started_at, None);
    assert_eq!(f1.deferrals, 101);
    assert!(result
        .event_timeline
        .unwrap()
        .iter()
        .all(|e| matches!(
            e.event,
            TimelineEvent::FlowDeferred {
                reason: DeferReason::GateClosed,
                ..
            }
        )));
}

#[test]
fn test_retry_delay_spaces_deferrals() {
    let mut config = fixtures::gated(false);
    config.simulation.retry_delay = 5.0;
    let result = run(config);

    let retries: Vec<f64> = result
        .event_timeline
        .as_ref()
        .unwrap()
        .iter()
        .filter_map(|entry| match entry.event {
            TimelineEvent::FlowDeferred { retry_at, .. } => {
                assert_eq!(retry_at - entry.time, 5.0);
                Some(retry_at)
            }
            _ => None,
        })
        .collect();

    // Attempts at 0, 5, ..., 100.
    assert_eq!(retries.len(), 21);
    assert_eq!(retries[0], 5.0);
    assert!(retries.windows(2).all(|w| w[1] - w[0] == 5.0));
    assert_eq!(result.flow("F1").unwrap().deferrals, 21);
}

#[test]
fn test_open_gate_starts_immediately() {
    let result = run(fixtures::gated(true));
    assert_eq!(result.flow("F1").unwrap().started_at, Some(0.0));
    assert_eq!(result.flow("F1").unwrap().deferrals, 0);
}

#[test]
fn test_recovery_holds_next_flow() {
    let result = run(fixtures::recovery());

    assert_eq!(result.flow("bake").unwrap().started_at, Some(25.0));
    assert_eq!(result.flow("bake").unwrap().completed_at, Some(55.0));

    let oven = result.device("oven").unwrap();
    assert_eq!(oven.final_state, DeviceState::Idle);
    assert_eq!(oven.time_in_state.failed, 20.0);

    let timeline = result.event_timeline.unwrap();
    assert!(timeline.iter().any(|e| e.time == 5.0
        && matches!(&e.event, TimelineEvent::RecoveryStarted { device_id, .. } if device_id.as_str() == "oven")));
    assert!(timeline.iter().any(|e| e.time == 25.0
        && matches!(&e.event, TimelineEvent::RecoveryCompleted { .. })));
}
