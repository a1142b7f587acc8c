//! Error types for the expression engine

use thiserror::Error;

/// Expression engine errors
///
/// Two kinds share one enum: structural errors are raised at tokenize/parse
/// time and are meant to block activation of a bad policy at write time via
/// [`validate`](crate::expr::validate); evaluation errors are raised while
/// walking the tree. [`is_structural`](ExprError::is_structural) tells them
/// apart.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    // --- structural (tokenize/parse time) ---
    /// String literal never closed
    #[error("Unterminated string literal at position {pos}")]
    UnterminatedString { pos: usize },

    /// String literal exceeds the tokenizer's length cap
    #[error("String literal at position {pos} exceeds {max} characters")]
    StringTooLong { pos: usize, max: usize },

    /// Character the tokenizer does not recognize
    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    /// Token out of place during parsing
    #[error("Unexpected token '{found}' at position {pos}: {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        pos: usize,
    },

    /// Source ended mid-expression
    #[error("Unexpected end of expression: {0}")]
    UnexpectedEnd(String),

    /// Identifier or scope on the forbidden list, rejected before evaluation
    #[error("Forbidden identifier '{0}'")]
    ForbiddenName(String),

    /// Expression nesting exceeds the structural depth cap
    #[error("Expression nesting exceeds maximum depth of {max}")]
    TooDeep { max: usize },

    // --- evaluation time ---
    /// Variable scope or path segment not present in the context
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    /// Function name absent from the injected registry
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    /// Operand types incompatible with the operation
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Division or modulo by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// List index negative or past the end
    #[error("Index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// Map key absent during indexed access
    #[error("Key '{0}' not found")]
    MissingKey(String),

    /// Function called with the wrong number of arguments
    #[error("Function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    /// Integer arithmetic overflow
    #[error("Integer overflow in '{0}'")]
    Overflow(&'static str),

    /// Evaluation exceeded its execution budget
    #[error("Expression evaluation exceeded the budget of {max} steps")]
    BudgetExceeded { max: usize },
}

impl ExprError {
    /// True for errors raised before any evaluation takes place
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::UnterminatedString { .. }
                | Self::StringTooLong { .. }
                | Self::UnexpectedChar { .. }
                | Self::UnexpectedToken { .. }
                | Self::UnexpectedEnd(_)
                | Self::ForbiddenName(_)
                | Self::TooDeep { .. }
        )
    }
}

/// Result type for expression operations
pub type ExprResult<T> = std::result::Result<T, ExprError>;
