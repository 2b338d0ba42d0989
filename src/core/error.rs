//! Error types for the rvjit backend.
//!
//! Using thiserror for idiomatic error handling. All errors are fatal to the
//! function currently being compiled; the driver may fall back to a
//! non-optimizing path, but this crate never retries.

use thiserror::Error;

/// Main error type for backend compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// An IR construct this backend does not implement for riscv64.
    #[error("unsupported on riscv64: {oper}")]
    Unsupported { oper: &'static str },

    /// IR that should have been eliminated or contained by lowering.
    #[error("malformed IR reached register demand computation: {reason}")]
    MalformedIr { reason: &'static str },
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
