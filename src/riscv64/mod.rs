//! RISC-V 64 backend: ABI description, encodability predicates and the
//! register demand computation.

pub mod abi;
pub mod demand;
pub mod encoding;
pub mod requirements;

pub use abi::{IsaDescription, IsaFeatures};
pub use demand::{DemandStream, NodeDemand, Record, RecordId, RecordKind};
pub use requirements::{DemandPass, FrameInfo};
