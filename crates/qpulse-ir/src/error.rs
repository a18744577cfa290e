//! Error types for the IR crate.

use thiserror::Error;

/// Errors raised while building or decoding a program.
///
/// Every build-time error aborts construction: the builder that produced it
/// should be discarded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// An operation was invoked outside the scope kind it requires.
    #[error("Scope error: expected {expected}, found {found}")]
    Scope {
        /// The scope kind the operation needs.
        expected: String,
        /// The scope kind that was actually on top of the stack.
        found: String,
    },

    /// Malformed control-flow nesting (for example a misplaced `else`).
    #[error("Structure error: {0}")]
    Structure(String),

    /// An operand of an unsupported kind.
    #[error("Type error: {0}")]
    Type(String),

    /// An operand with an unsupported value or arity.
    #[error("Value error: {0}")]
    Value(String),

    /// Program (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IrError {
    pub(crate) fn scope(expected: impl Into<String>, found: impl Into<String>) -> Self {
        IrError::Scope {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_error_message() {
        let err = IrError::scope("scope with body", "for scope");
        assert_eq!(
            err.to_string(),
            "Scope error: expected scope with body, found for scope"
        );
    }

    #[test]
    fn test_serialization_from() {
        let err: IrError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, IrError::Serialization(_)));
    }
}
