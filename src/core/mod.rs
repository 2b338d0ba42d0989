//! Core backend infrastructure.
//!
//! This module provides the building blocks shared by the lowering pass,
//! the register demand computation and the allocator: arena-based session
//! management, register identifiers and sets, and the backend error types.

pub mod error;
pub mod registers;
pub mod session;

pub use error::{CompileError, CompileResult};
pub use registers::{AsmReg, RegSet};
pub use session::{CompilationSession, NodeMeta, SessionStats};
