//! geotier-tier — the cache tier lifecycle control loop.
//!
//! Every tick the [`TierController`] reads the association store, asks the
//! trigger evaluator which pairs are hot, and advances each
//! [`CacheTierRecord`](geotier_state::CacheTierRecord) by at most one step:
//!
//! ```text
//! (none) ──trigger+enabled──▶ startup ──create ok──▶ active
//!                                                    │ cooldown expired
//!                                                    ▼
//!                      ┌──────── worker gone ───── teardown
//!                      │                             │ drain launched
//!                      ▼                             ▼
//!                  teardown ◀──────────────────── draining
//!                                                    │ drain finished
//!                                                    ▼
//!                  draining ◀──── not empty ────── empty ──removed──▶ (none)
//! ```
//!
//! Provisioning runs synchronously inside the tick; draining runs on a
//! background worker owned by the [`DrainCoordinator`] and is only polled.

pub mod context;
pub mod controller;
pub mod drain;
pub mod error;
pub mod gateway;
pub mod machine;

#[cfg(test)]
pub(crate) mod fakes;

pub use context::ControlLoopContext;
pub use controller::{Failure, TickReport, TierController, Transition};
pub use drain::{DrainCoordinator, DrainStatus};
pub use error::{TierError, TierResult};
pub use gateway::{ProvisioningGateway, RemoveOutcome};
pub use machine::{DrainView, PlanInputs, Step, plan};
