//! Errors in the library.
use thiserror::Error;

/// Error kinds raised by the replay engine and its collaborators.
///
/// Public functions return [`anyhow::Result`]; callers that need to branch on
/// the kind use `err.downcast_ref::<ReplayError>()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayError {
    /// A policy method was called that the policy does not implement.
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// A collaborator returned a value that breaks its contract.
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// A background thread was started twice.
    #[error("Already running: {0}")]
    AlreadyRunning(String),

    /// An operation was requested in a lifecycle state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The job queue has been stopped or was never started.
    #[error("Job queue is shut down")]
    ShutDown,

    /// A blocking operation was interrupted by a stop request.
    #[error("Cancelled by a stop request")]
    Cancelled,

    /// A record disagrees with the declared observation or action spec.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The policy holds fewer records than requested.
    #[error("Not enough records: requested {requested}, stored {stored}")]
    NotEnoughRecords {
        /// Number of records requested.
        requested: usize,
        /// Number of records stored.
        stored: usize,
    },

    /// Configuration value out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A job panicked on the job worker.
    #[error("Job panicked: {0}")]
    JobPanicked(String),

    /// Failure reported by the store client.
    #[error("Store error: {0}")]
    Store(String),
}

impl ReplayError {
    /// Returns `true` if `err` carries [`ReplayError::Cancelled`] or [`ReplayError::ShutDown`].
    ///
    /// Loops use this to tell a stop request apart from a failure worth retrying.
    pub fn is_stop(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<ReplayError>(),
            Some(ReplayError::Cancelled) | Some(ReplayError::ShutDown)
        )
    }
}
