//! Error types for the tier lifecycle.

use geotier_state::StateError;
use thiserror::Error;

pub type TierResult<T> = Result<T, TierError>;

#[derive(Debug, Error)]
pub enum TierError {
    /// A create or remove step failed. The record keeps its state and the
    /// step is retried next tick.
    #[error("provisioning step {step} failed for pool {pool}: {detail}")]
    Provisioning {
        pool: String,
        step: String,
        detail: String,
    },

    /// The association store could not be read or written. Fatal for the tick.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StateError),
}
