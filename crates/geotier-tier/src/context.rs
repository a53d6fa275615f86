//! Process-lifetime state carried between ticks.

use crate::drain::DrainCoordinator;

/// Everything the control loop keeps in memory across ticks. Created at
/// startup, shut down on exit. Durable state lives in the store.
pub struct ControlLoopContext {
    drains: DrainCoordinator,
    ticks: u64,
}

impl ControlLoopContext {
    pub fn new(drains: DrainCoordinator) -> Self {
        Self { drains, ticks: 0 }
    }

    pub fn drains(&self) -> &DrainCoordinator {
        &self.drains
    }

    pub fn drains_mut(&mut self) -> &mut DrainCoordinator {
        &mut self.drains
    }

    /// Ticks completed so far, including failed ones.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub(crate) fn record_tick(&mut self) {
        self.ticks += 1;
    }

    /// Cancel drain workers and drop their handles.
    pub fn shutdown(&mut self) {
        self.drains.shutdown();
    }
}
