//! # Query Error Types
//!
//! Structured error handling for the query lifecycle using thiserror.
//!
//! Every variant carries a stable, externally visible message format. The
//! thin HTTP/RPC layer sitting above this crate maps errors onto response
//! status classes via [`QueryError::status_code`], so the wording and the
//! mapping here are part of the public contract and are asserted by tests.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by query lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("No query object matches this id. {query_id}")]
    NotFound { query_id: Uuid },

    #[error("Current user does not match user that defined query. {caller} != {owner}")]
    OwnershipMismatch { caller: String, owner: String },

    #[error("Current user does not have the required role. {role} role required.")]
    Forbidden { role: String },

    /// next/cancel/close against a query that is not in the CREATED state.
    #[error("Cannot call {operation} on a query that is not running")]
    NotRunning { operation: String },

    #[error("Cannot remove a running query. {query_id}")]
    RemoveRunning { query_id: Uuid },

    #[error("Cannot remove a query with active next calls. {query_id}")]
    RemoveActiveNext { query_id: Uuid },

    /// update/create against a query that has left the DEFINED state.
    #[error("Cannot call {operation} on a query that is not defined")]
    NotDefined { operation: String },

    #[error("Concurrent next call limit reached: {limit}")]
    ConcurrentNextLimit { limit: u32 },

    /// Delegated from the parameter validator; `code` is the validator's
    /// specific sub-code (e.g. "missing-required-parameter").
    #[error("Validation failed ({code}): {message}")]
    Validation { code: String, message: String },

    #[error("Query timed out. {query_id} timed out.")]
    Timeout { query_id: Uuid },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl QueryError {
    pub fn not_found(query_id: Uuid) -> Self {
        Self::NotFound { query_id }
    }

    pub fn ownership_mismatch(caller: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::OwnershipMismatch {
            caller: caller.into(),
            owner: owner.into(),
        }
    }

    pub fn forbidden(role: impl Into<String>) -> Self {
        Self::Forbidden { role: role.into() }
    }

    pub fn not_running(operation: impl Into<String>) -> Self {
        Self::NotRunning {
            operation: operation.into(),
        }
    }

    pub fn not_defined(operation: impl Into<String>) -> Self {
        Self::NotDefined {
            operation: operation.into(),
        }
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn timeout(query_id: Uuid) -> Self {
        Self::Timeout { query_id }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP-style status class for this error.
    ///
    /// Success (200) and no-more-results (204) are not errors and are
    /// expressed as `Ok(Some(_))` / `Ok(None)` returns instead.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::OwnershipMismatch { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotRunning { .. }
            | Self::RemoveRunning { .. }
            | Self::RemoveActiveNext { .. }
            | Self::NotDefined { .. }
            | Self::ConcurrentNextLimit { .. }
            | Self::Validation { .. } => 400,
            Self::Timeout { .. } | Self::Internal { .. } => 500,
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    ///
    /// Only timeouts leave the query in a retryable state; everything else
    /// reflects a condition the caller must change first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
