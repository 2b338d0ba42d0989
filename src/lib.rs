//! Register demand computation for a RISC-V 64 JIT backend.
//!
//! The crate sits between lowering and linear scan register allocation. It
//! walks lowered IR nodes in execution order and produces, per node, the
//! stream of register demand records the allocator consumes: operand uses,
//! result definitions, clobbered-register kills and node-scoped scratch
//! registers.
//!
//! # Architecture
//!
//! - [`core`]: arena-backed compilation session, register sets, errors.
//! - [`ir`]: the lowered IR node model the pass reads.
//! - [`riscv64`]: the target, covering the ABI description, instruction
//!   encodability predicates and the per-node demand handlers.
//!
//! # Example
//!
//! ```
//! use bumpalo::Bump;
//! use rvjit::core::CompilationSession;
//! use rvjit::ir::{BinaryOp, IrBuilder, ValueType};
//! use rvjit::riscv64::{DemandPass, FrameInfo, IsaDescription, IsaFeatures};
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let b = IrBuilder::new(&session);
//!
//! let lhs = b.local(ValueType::Long);
//! let rhs = b.local(ValueType::Long);
//! let add = b.binary(BinaryOp::Add, ValueType::Long, lhs, rhs);
//!
//! let isa = IsaDescription::new(IsaFeatures::default());
//! let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
//! pass.run(&[lhs, rhs, add]).unwrap();
//! assert_eq!(pass.stream().defs_of(add.id).count(), 1);
//! ```

pub mod core;
pub mod ir;
pub mod riscv64;

pub use crate::core::{CompilationSession, CompileError, CompileResult};
pub use crate::riscv64::{DemandPass, DemandStream, FrameInfo, IsaDescription, IsaFeatures};
