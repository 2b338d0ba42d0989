//! Demand records and the per-node demand builder.
//!
//! The pass communicates with the allocator exclusively through the ordered
//! [`DemandStream`]. Each node's handler works through a [`NodeDemand`]
//! builder that owns the node's pending internal-register requests and the
//! use/def accounting; the builder is consumed before the dispatcher moves
//! on, so scratch-register lifetimes can never span nodes.

use crate::core::registers::RegSet;
use crate::ir::{Node, NodeId};
use std::fmt;

/// Index of a record in the demand stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId(usize);

/// Kind of a demand record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// An operand value that must be register-resident at this point.
    Use,
    /// A register-resident result produced here. `unused` marks a value
    /// with no consumers; the register is still reserved but may be
    /// retired immediately.
    Def { unused: bool },
    /// Registers whose contents become invalid at this point.
    Kill { regs: RegSet },
    /// A scratch register owned by the node itself, released before the
    /// next node.
    Internal,
}

/// One unit of register demand.
///
/// `node` names the IR node the record refers to: the operand for a `Use`,
/// the producing node otherwise. Records are append-only; only the
/// delay-free flag may change, and only before the node completes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    pub node: NodeId,
    pub kind: RecordKind,
    /// Restriction of the registers the allocator may pick, if any.
    pub candidates: Option<RegSet>,
    /// The register must stay live past the node's own definition point
    /// and must not coincide with the node's destination.
    pub delay_free: bool,
}

impl Record {
    pub fn is_use(&self) -> bool {
        matches!(self.kind, RecordKind::Use)
    }

    pub fn is_def(&self) -> bool {
        matches!(self.kind, RecordKind::Def { .. })
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.kind, RecordKind::Internal)
    }

    pub fn is_kill(&self) -> bool {
        matches!(self.kind, RecordKind::Kill { .. })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RecordKind::Use => write!(f, "use    n{}", self.node.0)?,
            RecordKind::Def { unused } => {
                write!(f, "def    n{}{}", self.node.0, if unused { " (unused)" } else { "" })?
            }
            RecordKind::Kill { regs } => write!(f, "kill   n{} {regs}", self.node.0)?,
            RecordKind::Internal => write!(f, "intern n{}", self.node.0)?,
        }
        if let Some(c) = self.candidates {
            write!(f, " in {c}")?;
        }
        if self.delay_free {
            write!(f, " delay-free")?;
        }
        Ok(())
    }
}

/// The ordered stream of demand records for one function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemandStream {
    records: Vec<Record>,
}

impl DemandStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, record: Record) -> RecordId {
        self.records.push(record);
        RecordId(self.records.len() - 1)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records referring to the given node.
    pub fn for_node(&self, node: NodeId) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |r| r.node == node)
    }

    pub fn uses_of(&self, node: NodeId) -> impl Iterator<Item = &Record> {
        self.for_node(node).filter(|r| r.is_use())
    }

    pub fn defs_of(&self, node: NodeId) -> impl Iterator<Item = &Record> {
        self.for_node(node).filter(|r| r.is_def())
    }

    pub fn internals_of(&self, node: NodeId) -> impl Iterator<Item = &Record> {
        self.for_node(node).filter(|r| r.is_internal())
    }

    pub fn kills_of(&self, node: NodeId) -> impl Iterator<Item = &Record> {
        self.for_node(node).filter(|r| r.is_kill())
    }
}

/// Accounting returned by [`NodeDemand::finish`].
#[derive(Debug, Clone, Copy)]
pub struct NodeSummary {
    pub src_count: u32,
    pub dst_count: u32,
    pub internal_requests: u32,
}

/// Per-node demand builder.
///
/// Created by the dispatcher for exactly one node and consumed by
/// [`NodeDemand::finish`], which closes the node's invariants.
pub struct NodeDemand<'s> {
    stream: &'s mut DemandStream,
    node: NodeId,
    src_count: u32,
    defs_built: u32,
    internal_requests: u32,
    pending_internals: Vec<RecordId>,
    /// When set, every internal register of this node must not coincide
    /// with the node's own destination.
    pub internal_regs_delay_free: bool,
}

impl<'s> NodeDemand<'s> {
    pub fn new(stream: &'s mut DemandStream, node: &Node<'_>) -> Self {
        Self {
            stream,
            node: node.id,
            src_count: 0,
            defs_built: 0,
            internal_requests: 0,
            pending_internals: Vec::new(),
            internal_regs_delay_free: false,
        }
    }

    fn push_use(&mut self, operand: &Node<'_>, candidates: Option<RegSet>) -> RecordId {
        // Contained nodes never occupy a register.
        assert!(
            !operand.is_contained(),
            "register use built for a contained node"
        );
        self.src_count += 1;
        self.stream.push(Record {
            node: operand.id,
            kind: RecordKind::Use,
            candidates,
            delay_free: false,
        })
    }

    /// Register a use of an operand's value.
    pub fn use_reg(&mut self, operand: &Node<'_>) -> RecordId {
        self.push_use(operand, None)
    }

    /// Register a use restricted to a candidate set.
    pub fn use_reg_in(&mut self, operand: &Node<'_>, candidates: RegSet) -> RecordId {
        debug_assert!(!candidates.is_empty());
        self.push_use(operand, Some(candidates))
    }

    fn push_def(&mut self, node: &Node<'_>, candidates: Option<RegSet>) -> RecordId {
        assert!(
            node.is_value() || node.multi_reg_count().is_some(),
            "register def built for a non-value node"
        );
        self.defs_built += 1;
        self.stream.push(Record {
            node: node.id,
            kind: RecordKind::Def {
                unused: node.is_unused_value(),
            },
            candidates,
            delay_free: false,
        })
    }

    /// Declare one register-resident result of the node.
    pub fn def(&mut self, node: &Node<'_>) -> RecordId {
        self.push_def(node, None)
    }

    /// Declare a result restricted to a candidate set.
    pub fn def_in(&mut self, node: &Node<'_>, candidates: RegSet) -> RecordId {
        debug_assert!(!candidates.is_empty());
        self.push_def(node, Some(candidates))
    }

    /// Declare registers clobbered at this point. Empty sets are dropped.
    pub fn kill(&mut self, regs: RegSet) {
        if regs.is_empty() {
            return;
        }
        self.stream.push(Record {
            node: self.node,
            kind: RecordKind::Kill { regs },
            candidates: None,
            delay_free: false,
        });
    }

    fn push_internal(&mut self, candidates: Option<RegSet>) -> RecordId {
        self.internal_requests += 1;
        let id = self.stream.push(Record {
            node: self.node,
            kind: RecordKind::Internal,
            candidates,
            delay_free: false,
        });
        self.pending_internals.push(id);
        id
    }

    /// Request a scratch GP register for the node's own code generation.
    pub fn request_internal(&mut self) -> RecordId {
        self.push_internal(None)
    }

    /// Request a scratch register from a restricted candidate set.
    pub fn request_internal_in(&mut self, candidates: RegSet) -> RecordId {
        debug_assert!(!candidates.is_empty());
        self.push_internal(Some(candidates))
    }

    /// Retroactively extend a use's or internal's lifetime past the node's
    /// own definition point.
    pub fn mark_delay_free(&mut self, id: RecordId) {
        let record = &mut self.stream.records[id.0];
        debug_assert!(record.is_use() || record.is_internal());
        record.delay_free = true;
    }

    /// Finalize all pending internal-register requests, scoping their
    /// lifetimes to this node. Must run before the node completes.
    pub fn finish_internals(&mut self) {
        if self.internal_regs_delay_free {
            for id in std::mem::take(&mut self.pending_internals) {
                self.mark_delay_free(id);
            }
        } else {
            self.pending_internals.clear();
        }
        self.internal_regs_delay_free = false;
    }

    /// Close the node: every internal request must have been consumed and
    /// the declared defs must match the node's statically known register
    /// destination count.
    pub fn finish(self, node: &Node<'_>) -> NodeSummary {
        assert!(
            self.pending_internals.is_empty(),
            "internal register request leaked past its node"
        );
        assert!(
            self.defs_built < 2 || node.multi_reg_count().is_some(),
            "multi-register def on a single-register node"
        );
        assert_eq!(
            self.defs_built,
            node.register_dst_count(),
            "declared defs do not match the node's register destinations"
        );
        // A discarded value still reserves its register.
        assert!(!node.is_unused_value() || !node.is_value() || self.defs_built != 0);
        NodeSummary {
            src_count: self.src_count,
            dst_count: self.defs_built,
            internal_requests: self.internal_requests,
        }
    }
}
