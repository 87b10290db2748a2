//! Domain error taxonomy surfaced by [`crate::service::SimulationService`].

use thiserror::Error;
use uuid::Uuid;

use crate::exit_codes;

#[derive(Debug, Error)]
pub enum SimError {
    /// Bad caller input; never retried.
    #[error("invalid run request: {0}")]
    Validation(String),

    #[error("run {0} not found")]
    NotFound(Uuid),

    /// Any failure while the state machine was executing the run.
    #[error("run {run_id} failed")]
    RunFailed {
        run_id: Uuid,
        #[source]
        source: anyhow::Error,
    },

    /// Store failure outside a run, e.g. while hydrating a run for retrieval.
    #[error(transparent)]
    Store(anyhow::Error),
}

impl SimError {
    /// Stable process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::Validation(_) | SimError::Store(_) => exit_codes::INVALID,
            SimError::NotFound(_) => exit_codes::NOT_FOUND,
            SimError::RunFailed { .. } => exit_codes::RUN_FAILED,
        }
    }
}
