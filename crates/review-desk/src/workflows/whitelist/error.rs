use super::domain::{ReviewerId, SessionId};
use super::ledger::StorageError;

/// Failure taxonomy shared by the ledger, the interview engine, and the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("interview session {0} not found")]
    SessionNotFound(SessionId),
    #[error("{actor} may not act on session {session}; it belongs to {owner}")]
    Unauthorized {
        session: SessionId,
        actor: ReviewerId,
        owner: ReviewerId,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ReviewError {
    /// Stable code the presentation layer maps to a user-facing message.
    pub const fn reason_code(&self) -> &'static str {
        match self {
            ReviewError::SessionNotFound(_) => "not_found",
            ReviewError::Unauthorized { .. } => "unauthorized",
            ReviewError::InvalidInput(_) => "invalid_input",
            ReviewError::Storage(_) => "storage_failure",
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ReviewError::InvalidInput(message.into())
    }
}
