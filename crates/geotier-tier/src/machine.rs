//! Decides the single step a tier record takes this tick.
//!
//! `plan` is pure: it looks at the record and this tick's inputs and
//! names the step. The controller performs the step's side effects and
//! writes the resulting state.

use geotier_state::{CacheTierRecord, TierState};

/// What the drain coordinator knows about the record's cache pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainView {
    /// No worker tracked (never started, or lost across a restart).
    Absent,
    Running,
    /// Worker finished, successfully or not.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanInputs {
    /// The record's pair is triggered this tick.
    pub triggered: bool,
    /// Unix seconds.
    pub now: u64,
    /// Zero disables automatic teardown.
    pub cooldown_secs: u64,
    pub drain: DrainView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing to do this tick.
    Hold,
    /// startup: run the create sequence; success → active.
    Provision,
    /// active and triggered: reset the cooldown timer.
    Refresh,
    /// active, cooldown expired → teardown.
    BeginTeardown,
    /// teardown: ensure a drain worker → draining.
    LaunchDrain,
    /// draining, worker finished → empty.
    DrainFinished,
    /// draining, no worker tracked → teardown.
    RestartDrain,
    /// empty: run the remove sequence; removed → record deleted,
    /// not empty → draining.
    Remove,
}

impl Step {
    /// The state the record moves to when the step succeeds, if it changes.
    pub fn target(&self) -> Option<TierState> {
        match self {
            Step::Hold | Step::Refresh | Step::Remove => None,
            Step::Provision => Some(TierState::Active),
            Step::BeginTeardown => Some(TierState::Teardown),
            Step::LaunchDrain => Some(TierState::Draining),
            Step::DrainFinished => Some(TierState::Empty),
            Step::RestartDrain => Some(TierState::Teardown),
        }
    }
}

pub fn plan(record: &CacheTierRecord, inputs: &PlanInputs) -> Step {
    match record.state {
        TierState::Startup => Step::Provision,
        TierState::Active if inputs.triggered => Step::Refresh,
        TierState::Active => {
            let idle = inputs.now.saturating_sub(record.last_transition_time);
            if inputs.cooldown_secs > 0 && idle > inputs.cooldown_secs {
                Step::BeginTeardown
            } else {
                Step::Hold
            }
        }
        TierState::Teardown => Step::LaunchDrain,
        TierState::Draining => match inputs.drain {
            DrainView::Running => Step::Hold,
            DrainView::Finished => Step::DrainFinished,
            DrainView::Absent => Step::RestartDrain,
        },
        TierState::Empty => Step::Remove,
    }
}
