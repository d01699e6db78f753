//! Deterministic discrete-event simulation kernel.
//!
//! Devices are finite-capacity resources; flows are timed units of work
//! moving from one device to another. Given the same configuration and
//! seed, a run produces identical results every time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SimulationEngine                       │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     EventScheduler (BTreeMap<EventKey, Event>)     │ │
//! │  │     Ordered by: time, sequence                     │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │ FlowStart / FlowComplete /  │
//! │                           ▼ RecoveryComplete            │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │  gates → dependencies → conditional delay →        │ │
//! │  │  source capacity → destination capacity → start    │ │
//! │  └─────┬──────────────────┬──────────────────┬────────┘ │
//! │        ▼                  ▼                  ▼          │
//! │  StateManager       FlowController    DeadlockDetector  │
//! │  (device FSM,       (dependency DAG,  (blocked devices, │
//! │   capacity)          started/done)     wait-for graph)  │
//! │        │                                                │
//! │        └──▶ retries and completions → schedule events   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! A detected deadlock ends the run with
//! [`RunStatus::DeadlockDetected`]; it is an outcome, not an error.

mod error;
mod event_queue;
mod flows;
mod result;
mod rng;
mod runner;
mod scheduler;
mod state;

pub use error::{SimulationError, TransitionError};
pub use event_queue::{Event, EventKey};
pub use flows::FlowController;
pub use result::{
    DeadlockReport, DeferReason, DeviceReport, FlowReport, RunMetadata, RunStatus,
    SimulationResult, StateDurations, Summary, Termination, TimelineEntry, TimelineEvent,
};
pub use rng::DeterministicRng;
pub use runner::{SimulationEngine, SimulationStats};
pub use scheduler::EventScheduler;
pub use state::{StateChange, StateManager};

/// Convert configuration seconds into simulated time.
///
/// Validation bounds every configured time by `MAX_TIME_SECS`, so the
/// conversion cannot fail for a validated configuration. Anything else maps
/// to zero.
pub(crate) fn secs(value: f64) -> std::time::Duration {
    std::time::Duration::try_from_secs_f64(value).unwrap_or_default()
}
