// src/scheduling/mod.rs

//! Task selection.
//!
//! - [`gate`] decides whether a task's dependencies are satisfied.
//! - [`selector`] picks the first eligible QUEUED task in store order.
//! - [`blocked`] explains why queued tasks are not being picked.
//!
//! Everything here is a pure function over a store snapshot.

pub mod blocked;
pub mod gate;
pub mod selector;

pub use blocked::{blocked_report, dependency_cycles, BlockedReport, BlockedTask};
pub use gate::satisfied;
pub use selector::{next_retry_at, next_runnable};
