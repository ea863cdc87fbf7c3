//! Error kinds raised by the authority core
//!
//! Placement pipeline failures (`UnknownTemplate`, `InsufficientFunds`,
//! `PlacementBlocked`) are terminal for a single request and are dropped
//! without feedback to the client. `StaleConnection` is an expected race
//! between teardown and in-flight notifications. `PermissionDenied` means a
//! caller broke the authority contract and must surface immediately.

use crate::ConnectionId;
use thiserror::Error;

/// Which placement check rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlacementFailure {
    /// The footprint intersects building-blocking geometry
    #[error("footprint overlaps blocking geometry")]
    Overlap,
    /// No owned building lies within the construction range
    #[error("no owned building within range")]
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("unknown building template {0}")]
    UnknownTemplate(u32),

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u32, available: u32 },

    #[error("placement blocked: {0}")]
    PlacementBlocked(PlacementFailure),

    #[error("{operation} requires server authority")]
    PermissionDenied { operation: &'static str },

    #[error("connection {0} is no longer part of the session")]
    StaleConnection(ConnectionId),
}

impl AuthorityError {
    /// True for failures that reject a single request and leave no state behind
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthorityError::UnknownTemplate(_)
                | AuthorityError::InsufficientFunds { .. }
                | AuthorityError::PlacementBlocked(_)
        )
    }

    /// True when the error indicates a programming error rather than client input
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, AuthorityError::PermissionDenied { .. })
    }
}

pub type Result<T> = std::result::Result<T, AuthorityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(AuthorityError::UnknownTemplate(7).is_rejection());
        assert!(AuthorityError::InsufficientFunds {
            needed: 600,
            available: 500
        }
        .is_rejection());
        assert!(AuthorityError::PlacementBlocked(PlacementFailure::Overlap).is_rejection());

        let denied = AuthorityError::PermissionDenied {
            operation: "set_balance",
        };
        assert!(denied.is_contract_violation());
        assert!(!denied.is_rejection());

        let stale = AuthorityError::StaleConnection(ConnectionId(3));
        assert!(!stale.is_rejection());
        assert!(!stale.is_contract_violation());
    }

    #[test]
    fn test_error_messages() {
        let err = AuthorityError::InsufficientFunds {
            needed: 600,
            available: 500,
        };
        assert_eq!(err.to_string(), "insufficient funds: need 600, have 500");

        let err = AuthorityError::PlacementBlocked(PlacementFailure::OutOfRange);
        assert_eq!(
            err.to_string(),
            "placement blocked: no owned building within range"
        );

        assert_eq!(
            PlacementFailure::Overlap.to_string(),
            "footprint overlaps blocking geometry"
        );

        let err = AuthorityError::StaleConnection(ConnectionId(4));
        assert_eq!(err.to_string(), "connection 4 is no longer part of the session");
    }
}
