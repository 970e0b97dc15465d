//! Error types for the trust engine and moderation workflow

use thiserror::Error;
use uuid::Uuid;

use crate::moderation::{ContentKind, ContentStatus};

/// Errors surfaced by ledger, engine and workflow operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustError {
    /// Referenced user or content does not exist (or is already deleted)
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What kind of record was looked up
        entity: &'static str,
        /// The id that was not found
        id: Uuid,
    },

    /// Actor lacks the tier or role required for the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Optimistic-concurrency violation on a content item or report quota
    #[error("Concurrent modification of {entity} {id}")]
    Conflict {
        /// What kind of record was contended
        entity: &'static str,
        /// The contended record
        id: Uuid,
    },

    /// Target status is unreachable from the current status
    #[error("Invalid transition for {kind}: {from} -> {to}")]
    InvalidTransition {
        kind: ContentKind,
        from: ContentStatus,
        to: ContentStatus,
    },

    /// Policy or configuration values are inconsistent
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Persistence adapter failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl TrustError {
    pub fn user_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "user", id }
    }

    pub fn content_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "content",
            id,
        }
    }

    pub fn content_conflict(id: Uuid) -> Self {
        Self::Conflict {
            entity: "content",
            id,
        }
    }

    pub fn quota_conflict(reporter_id: Uuid) -> Self {
        Self::Conflict {
            entity: "report_quota",
            id: reporter_id,
        }
    }

    /// Only a concurrency conflict is worth retrying against fresh state
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for trust operations
pub type TrustResult<T> = Result<T, TrustError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflict_is_retryable() {
        let id = Uuid::new_v4();
        assert!(TrustError::content_conflict(id).is_retryable());
        assert!(!TrustError::user_not_found(id).is_retryable());
        assert!(!TrustError::Forbidden("nope".to_string()).is_retryable());
        assert!(!TrustError::InvalidTransition {
            kind: ContentKind::Comment,
            from: ContentStatus::Hidden,
            to: ContentStatus::PendingReview,
        }
        .is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let id = Uuid::nil();
        assert_eq!(
            TrustError::user_not_found(id).to_string(),
            format!("user not found: {}", id)
        );
        let err = TrustError::InvalidTransition {
            kind: ContentKind::Report,
            from: ContentStatus::Hidden,
            to: ContentStatus::PendingReview,
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition for report: hidden -> pending_review"
        );
    }
}
