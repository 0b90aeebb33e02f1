use thiserror::Error;

use crate::driver::DriverError;
use crate::types::{AccessState, Rejection};

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("database name or user already in use")]
    IdentifierCollision,

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("rejected: {reason}")]
    Rejected {
        reason: Rejection,
        state: Option<AccessState>,
    },

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Unavailable outcomes clear up on their own once the admin endpoint is
    /// reachable again; everything else needs a caller decision.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    #[must_use]
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// State the tenant was in when the operation was rejected, if one was
    /// loaded.
    #[must_use]
    pub fn state(&self) -> Option<AccessState> {
        match self {
            Self::Rejected { state, .. } => *state,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(Error::Unavailable("mysql admin endpoint".into()).is_retryable());
        assert!(!Error::NotFound.is_retryable());
        assert!(
            !Error::Rejected {
                reason: Rejection::AlreadyDisabled,
                state: Some(AccessState::UserDisabled),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_rejection_carries_state() {
        let err = Error::Rejected {
            reason: Rejection::AdminLocked,
            state: Some(AccessState::AdminDisabled),
        };
        assert_eq!(
            err.to_string(),
            "rejected: database is locked by an administrator"
        );
        assert_eq!(err.rejection(), Some(Rejection::AdminLocked));
        assert_eq!(err.state(), Some(AccessState::AdminDisabled));

        let err = Error::Rejected {
            reason: Rejection::UnknownFlavor,
            state: None,
        };
        assert_eq!(err.state(), None);
    }
}
