// This module defines the error type shared by every lazyemit component, using the thiserror
// crate for idiomatic Rust error handling. BuildError covers builder misuse (no active
// function, a function already active, argument index out of range, unknown opcode),
// backend-reported problems (type mismatches between merged or combined values, module
// verification failures, raw inkwell builder errors) and execution problems (unresolved
// function, unsupported signature or arity, execution engine construction failure). None of
// these are transient: they are surfaced synchronously and never retried. BuildResult<T> is
// the convenience alias used throughout the crate.

//! Error types for lazyemit.
//!
//! Using thiserror for more idiomatic error handling.

use inkwell::builder::BuilderError;
use thiserror::Error;

/// Main error type for building and executing functions.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Builder is not currently in a function")]
    NotInFunction,

    #[error("Builder is already in function '{name}'")]
    AlreadyInFunction {
        name: String,
    },

    #[error("Argument index {index} out of range for function with {count} argument(s)")]
    IndexOutOfRange {
        index: usize,
        count: usize,
    },

    #[error("Unsupported binary operator: {op}")]
    UnsupportedOperator {
        op: String,
    },

    #[error("Type mismatch in {context}: {expected} vs {found}")]
    TypeMismatch {
        context: &'static str,
        expected: String,
        found: String,
    },

    #[error("Function not found: {name}")]
    FunctionNotFound {
        name: String,
    },

    #[error("Function '{name}' is already defined")]
    DuplicateDefinition {
        name: String,
    },

    #[error("Signature mismatch for '{name}': {reason}")]
    SignatureMismatch {
        name: String,
        reason: String,
    },

    #[error("Function '{name}' takes {expected} argument(s), got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Cannot marshal {arity} arguments (at most {max} supported)")]
    UnsupportedArity {
        arity: usize,
        max: usize,
    },

    #[error("Buffer of {len} elements is too large to embed")]
    BufferTooLarge {
        len: usize,
    },

    #[error("Module verification failed: {reason}")]
    BackendVerificationFailed {
        reason: String,
    },

    #[error("Execution engine initialization failed: {reason}")]
    EngineInitializationFailed {
        reason: String,
    },

    #[error("LLVM builder error: {0}")]
    Backend(#[from] BuilderError),

    #[error("I/O error: {reason}")]
    Io {
        reason: String,
    },
}

/// Result type alias for builder and executor operations.
pub type BuildResult<T> = Result<T, BuildError>;

impl BuildError {
    pub(crate) fn type_mismatch(
        context: &'static str,
        expected: impl std::fmt::Display,
        found: impl std::fmt::Display,
    ) -> Self {
        BuildError::TypeMismatch {
            context,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BuildError::IndexOutOfRange { index: 3, count: 2 };
        assert_eq!(
            err.to_string(),
            "Argument index 3 out of range for function with 2 argument(s)"
        );

        let err = BuildError::UnsupportedOperator { op: "div".into() };
        assert_eq!(err.to_string(), "Unsupported binary operator: div");

        let err = BuildError::type_mismatch("select", "i64", "i1");
        assert_eq!(err.to_string(), "Type mismatch in select: i64 vs i1");
    }
}
