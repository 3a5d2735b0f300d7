//! The error taxonomy of spec §7, shared between the Validator,
//! Orchestrator, and the HTTP surface that maps it onto status codes.

use crate::resource::UnknownKind;

/// A request-scoped failure. Variants are surfaced differently depending
/// on where they originate - see `server::api` for the status-code
/// mapping; `response.error` only ever carries `InvalidScope` and
/// `InvalidTimeWindow`, never the others.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Surfaced as an RPC-level `Unimplemented`, not `response.error` -
    /// an unknown kind means the caller is out of contract with the
    /// protocol, not that their otherwise-valid request was rejected.
    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("invalid time window: {0}")]
    InvalidTimeWindow(String),

    /// RPC-level `Unavailable`; no response body.
    #[error("topology unavailable: {0}")]
    TopologyUnavailable(String),

    /// RPC-level `Canceled`.
    #[error("request canceled")]
    Canceled,
}

impl CoreError {
    /// Whether this belongs in `response.error` (vs. being an RPC-level
    /// failure with no response body at all).
    pub fn is_response_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidScope(_) | CoreError::InvalidTimeWindow(_)
        )
    }
}
