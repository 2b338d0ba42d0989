//! Arena-based compilation session management.
//!
//! The session owns the arena that IR nodes live in and tracks the advisory
//! per-node metadata this pass writes back (source and destination register
//! counts), plus statistics for debugging. All compilation objects share the
//! session lifetime, eliminating complex lifetime propagation.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

use crate::ir::NodeId;

/// Advisory per-node metadata produced by the demand computation.
///
/// The instruction emitter later expects register assignments matching
/// exactly these counts; the allocator verifies against them as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeMeta {
    /// Number of register-resident sources the node consumes.
    pub src_count: u32,
    /// Number of register-resident results the node produces.
    pub dst_count: u32,
    /// The node's value is produced but never consumed.
    pub local_dead_use: bool,
}

/// Statistics gathered while building register demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    pub nodes_processed: usize,
    pub records_emitted: usize,
    pub internal_requests: usize,
    pub functions_compiled: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes, {} demand records, {} internal registers across {} functions",
            self.nodes_processed,
            self.records_emitted,
            self.internal_requests,
            self.functions_compiled
        )
    }
}

/// Arena-based compilation session.
///
/// Owns the arena allocator and all per-function bookkeeping shared between
/// the lowering pass, the demand computation and the allocator.
pub struct CompilationSession<'arena> {
    /// Arena allocator for compilation objects.
    arena: &'arena Bump,

    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,

    /// Advisory metadata attached to nodes by the demand computation.
    node_meta: RefCell<HashMap<NodeId, NodeMeta>>,

    /// Current function being compiled.
    current_function: RefCell<Option<String>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            node_meta: RefCell::new(HashMap::new()),
            current_function: RefCell::new(None),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Allocate an object in the session arena.
    pub fn alloc<T>(&self, value: T) -> &'arena mut T {
        self.arena.alloc(value)
    }

    /// Allocate a slice in the session arena.
    pub fn alloc_slice<T: Copy>(&self, slice: &[T]) -> &'arena [T] {
        self.arena.alloc_slice_copy(slice)
    }

    /// Set current function being compiled.
    pub fn set_current_function(&self, name: &str) {
        *self.current_function.borrow_mut() = Some(name.to_string());
        self.stats.borrow_mut().functions_compiled += 1;
    }

    /// Name of the function currently being compiled, if any.
    pub fn current_function(&self) -> Option<String> {
        self.current_function.borrow().clone()
    }

    /// Record per-node metadata after the node's demand has been built.
    pub fn set_node_meta(&self, node: NodeId, meta: NodeMeta) {
        self.node_meta.borrow_mut().insert(node, meta);
    }

    /// Metadata recorded for a node, if the node has been processed.
    pub fn node_meta(&self, node: NodeId) -> Option<NodeMeta> {
        self.node_meta.borrow().get(&node).copied()
    }

    /// Record that one node has been processed.
    pub fn record_node(&self, records_emitted: usize, internal_requests: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.nodes_processed += 1;
        stats.records_emitted += records_emitted;
        stats.internal_requests += internal_requests;
    }

    /// Snapshot of the session statistics.
    pub fn stats(&self) -> SessionStats {
        *self.stats.borrow()
    }
}
