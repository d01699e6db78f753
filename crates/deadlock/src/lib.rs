//! Deadlock detection for the simulation kernel.
//!
//! Devices that enter the Blocked state are registered here together with
//! the device whose capacity they are waiting on. Periodic checks look for
//! two conditions:
//!
//! 1. **Timeout**: a device blocked for at least the configured threshold.
//! 2. **Circular wait**: a cycle in the wait-for graph (edge A → B means
//!    "A is waiting for capacity on B").
//!
//! ```text
//!   register_blocked(D1, t, D2)        register_blocked(D2, t, D1)
//!            │                                  │
//!            ▼                                  ▼
//!   ┌──────────────────────────────────────────────────────┐
//!   │ blocked: BTreeMap<DeviceId, BlockedEntry>            │
//!   │          D1 ─waits-for─▶ D2 ─waits-for─▶ D1          │
//!   └───────────────────────────┬──────────────────────────┘
//!                               │ check_deadlock(now)
//!                               ▼
//!        timeout? ──no──▶ cycle? ──no──▶ None
//!           │yes             │yes
//!           ▼                ▼
//!   DeadlockInfo(Timeout)  DeadlockInfo(CircularWait)
//! ```
//!
//! A detected deadlock is a simulation outcome, not an error.

mod detector;
pub mod graph;

pub use detector::{
    DeadlockConfig, DeadlockDetector, DeadlockInfo, DeadlockType, DetectorStats, WaitGraph,
};
