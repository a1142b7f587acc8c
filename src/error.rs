//! Error types for the authorization engine

use thiserror::Error;

use crate::expr::ExprError;

/// Authorization engine errors
///
/// "Not permitted" is never an error: `check_permission` signals it with a
/// normal `(false, None)` decision. Errors are reserved for structural or
/// programming problems in the inputs.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed permission key passed to a check
    #[error("Invalid permission key: {0}")]
    InvalidPermissionKey(String),

    /// Expression engine failure surfaced outside of per-policy dispatch
    #[error("Expression error: {0}")]
    Expr(#[from] ExprError),

    /// Storage backend failure
    #[error("Store error: {0}")]
    Store(String),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
