//! Lowered IR node model consumed by the register demand computation.
//!
//! Nodes arrive here fully lowered: addressing modes are folded, operand
//! containment is final, and multi-register layouts are decided. This pass
//! treats the tree as immutable and only attaches advisory metadata.
//!
//! Each operation family carries exactly the operands that family needs, so
//! handlers access them through exhaustive pattern matching rather than
//! generic operand accessors.

use std::cell::Cell;

use crate::core::registers::AsmReg;
use crate::core::session::CompilationSession;

/// Identifier of an IR node within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Value type of an IR node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Void,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// GC reference.
    Ref,
    /// Interior pointer.
    ByRef,
    Float,
    Double,
    Struct,
}

impl ValueType {
    pub fn is_void(self) -> bool {
        matches!(self, ValueType::Void)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, ValueType::Float | ValueType::Double)
    }

    /// Size of the value in bytes when held in a register.
    pub fn size(self) -> u32 {
        match self {
            ValueType::Void => 0,
            ValueType::Int | ValueType::Float => 4,
            _ => 8,
        }
    }
}

/// Node flags finalized by lowering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeFlags {
    /// The node produces a value nothing consumes.
    pub unused_value: bool,
    /// Integer arithmetic must trap on overflow.
    pub overflow_check: bool,
    /// Operands are treated as unsigned.
    pub unsigned: bool,
    /// The node is folded into its parent and occupies no register.
    pub contained: bool,
}

/// Binary operation kinds, including the Zba/Zbb shift-add fusions lowering
/// may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    MulHi,
    Div,
    UDiv,
    Mod,
    UMod,
    And,
    AndNot,
    Or,
    Xor,
    Lsh,
    Rsh,
    Rsz,
    Rol,
    Ror,
    Sh1Add,
    Sh1AddUw,
    Sh2Add,
    Sh2AddUw,
    Sh3Add,
    Sh3AddUw,
    AddUw,
    SlliUw,
}

impl BinaryOp {
    pub fn is_rotate(self) -> bool {
        matches!(self, BinaryOp::Rol | BinaryOp::Ror)
    }

    /// Operations that may carry the overflow-check flag.
    pub fn supports_overflow(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul)
    }

    pub fn is_div_or_mod(self) -> bool {
        matches!(
            self,
            BinaryOp::Div | BinaryOp::UDiv | BinaryOp::Mod | BinaryOp::UMod
        )
    }

    /// Signed division or remainder, where dividing `MIN / -1` overflows.
    pub fn is_signed_div_or_mod(self) -> bool {
        matches!(self, BinaryOp::Div | BinaryOp::Mod)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Comparison relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Ge,
    Gt,
}

/// Math intrinsics lowering keeps as single nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrinsicKind {
    Abs,
    Sqrt,
    MinNumber,
    MaxNumber,
    Min,
    Max,
    MinUnsigned,
    MaxUnsigned,
    LeadingZeroCount,
    TrailingZeroCount,
    PopCount,
}

impl IntrinsicKind {
    /// Intrinsics only available with the Zbb extension.
    pub fn requires_zbb(self) -> bool {
        matches!(
            self,
            IntrinsicKind::Min
                | IntrinsicKind::Max
                | IntrinsicKind::MinUnsigned
                | IntrinsicKind::MaxUnsigned
                | IntrinsicKind::LeadingZeroCount
                | IntrinsicKind::TrailingZeroCount
                | IntrinsicKind::PopCount
        )
    }
}

/// Read-modify-write atomic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicOp {
    Add,
    Exchange,
    And,
    Or,
}

/// Runtime helpers with known, reduced clobber sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeHelper {
    /// GC suspension poll.
    StopForGc,
    /// Reference-field write barrier.
    WriteBarrier,
    /// By-reference block copy write barrier.
    ByRefWriteBarrier,
    /// Profiler enter/leave hook.
    Profiler,
}

/// How a call reaches its target.
#[derive(Debug, Clone, Copy)]
pub enum CallTarget<'a> {
    /// Direct call; the target is encodable in the call instruction.
    Direct,
    /// Target computed into a register, or a contained immediate that must
    /// be materialized first.
    Indirect(&'a Node<'a>),
    /// Target loaded from the fixed indirection-cell parameter register.
    StubIndirect,
}

/// Value-return shape of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Void,
    Single,
    /// Struct returned in `count` registers.
    Multi { count: u8 },
}

/// Call node payload.
#[derive(Debug, Clone, Copy)]
pub struct CallDesc<'a> {
    pub target: CallTarget<'a>,
    /// Late argument nodes: `PutArgReg` and `PutArgStack`.
    pub args: &'a [&'a Node<'a>],
    pub ret: ReturnKind,
    /// Fast tail call implemented as a jump out of the epilogue.
    pub fast_tail_call: bool,
    /// Known runtime helper; narrows the kill set.
    pub helper: Option<RuntimeHelper>,
}

/// Strategy chosen by lowering for a block store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStoreKind {
    /// Inline sequence of loads/stores.
    Unroll,
    /// Counted copy/init loop.
    Loop,
    /// GC-aware copy through the write-barrier register pair.
    ObjUnroll,
}

/// Source of a block store.
#[derive(Debug, Clone, Copy)]
pub enum BlockSource<'a> {
    /// Initialization with a fill value (possibly a contained constant).
    Init { fill: &'a Node<'a> },
    /// Copy from another location; `src` is typically a contained
    /// indirection whose address operand supplies the source register.
    Copy { src: &'a Node<'a> },
}

/// Block store payload.
#[derive(Debug, Clone, Copy)]
pub struct BlockStoreDesc<'a> {
    pub dst_addr: &'a Node<'a>,
    pub src: BlockSource<'a>,
    pub size: u32,
    pub kind: BlockStoreKind,
}

/// Operation kind, carrying only family-relevant operands.
#[derive(Debug, Clone, Copy)]
pub enum Oper<'a> {
    // Locals.
    LocalLoad,
    LocalField,
    LocalAddr,
    LocalStore {
        value: &'a Node<'a>,
        /// `Some(n)` for promoted locals stored from a multi-register
        /// source; the store then defines `n` registers.
        split_fields: Option<u8>,
    },

    // Constants.
    ConstInt(i64),
    ConstFloat(f64),

    // Arithmetic and logic.
    Unary {
        op: UnaryOp,
        operand: &'a Node<'a>,
    },
    Binary {
        op: BinaryOp,
        lhs: &'a Node<'a>,
        rhs: &'a Node<'a>,
    },
    Compare {
        rel: Relation,
        lhs: &'a Node<'a>,
        rhs: &'a Node<'a>,
    },
    JumpCompare {
        rel: Relation,
        lhs: &'a Node<'a>,
        rhs: &'a Node<'a>,
    },
    Intrinsic {
        kind: IntrinsicKind,
        op1: &'a Node<'a>,
        op2: Option<&'a Node<'a>>,
    },
    Cast {
        operand: &'a Node<'a>,
        /// Narrowing with overflow detection; decided by lowering.
        overflow_check: bool,
    },
    CheckFinite {
        operand: &'a Node<'a>,
    },

    // Atomics.
    CompareExchange {
        addr: &'a Node<'a>,
        value: &'a Node<'a>,
        comparand: &'a Node<'a>,
    },
    AtomicRmw {
        op: AtomicOp,
        addr: &'a Node<'a>,
        value: &'a Node<'a>,
    },
    /// Interlocked add returning nothing; never lowered for riscv64.
    LockAdd {
        addr: &'a Node<'a>,
        value: &'a Node<'a>,
    },

    // Memory.
    Indirection {
        addr: &'a Node<'a>,
    },
    NullCheck {
        addr: &'a Node<'a>,
    },
    StoreIndirection {
        addr: &'a Node<'a>,
        value: &'a Node<'a>,
        write_barrier: bool,
    },
    AddrMode {
        base: Option<&'a Node<'a>>,
        index: Option<&'a Node<'a>>,
        scale: u8,
        offset: i64,
    },
    IndexAddr {
        base: &'a Node<'a>,
        index: &'a Node<'a>,
    },
    BoundsCheck {
        index: &'a Node<'a>,
        length: &'a Node<'a>,
    },
    BlockStore(BlockStoreDesc<'a>),
    StackAlloc {
        size: &'a Node<'a>,
    },

    // Calls and arguments.
    Call(CallDesc<'a>),
    PutArgReg {
        src: &'a Node<'a>,
        reg: AsmReg,
    },
    PutArgStack {
        src: &'a Node<'a>,
    },
    FieldList {
        items: &'a [&'a Node<'a>],
    },

    // Control flow and bookkeeping.
    Return {
        value: Option<&'a Node<'a>>,
    },
    ReturnFilter {
        value: Option<&'a Node<'a>>,
    },
    ReturnTrap {
        condition: &'a Node<'a>,
    },
    JumpTrue,
    Jump,
    JumpTable,
    SwitchTable {
        index: &'a Node<'a>,
        table: &'a Node<'a>,
    },
    Keepalive {
        operand: &'a Node<'a>,
    },
    Nop,
    NoOp,
    StartNoGc,
    StartPreemptGc,
    ProfilerHook,
    CatchArg,
    AsyncContinuation,

    // Unsupported on this target.
    Simd,
    HwIntrinsic,

    // Shapes that must not survive lowering.
    Switch,
    ArrayElem,
    Block,
    InitVal,
    Box,
    Comma,
    Qmark,
    Colon,
}

/// A lowered IR node.
#[derive(Debug)]
pub struct Node<'a> {
    pub id: NodeId,
    pub ty: ValueType,
    pub flags: NodeFlags,
    pub oper: Oper<'a>,
}

impl<'a> Node<'a> {
    pub fn is_contained(&self) -> bool {
        self.flags.contained
    }

    pub fn is_unused_value(&self) -> bool {
        self.flags.unused_value
    }

    /// Whether the node produces a register-resident value.
    pub fn is_value(&self) -> bool {
        !self.ty.is_void()
    }

    /// The node's integral constant value, contained or not.
    pub fn integral_const(&self) -> Option<i64> {
        match self.oper {
            Oper::ConstInt(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_integral_const(&self, value: i64) -> bool {
        self.integral_const() == Some(value)
    }

    /// Contained integer immediate, as operands fold them.
    pub fn contained_int_const(&self) -> Option<i64> {
        if self.is_contained() {
            self.integral_const()
        } else {
            None
        }
    }

    /// Number of registers a multi-register node writes, if it is one of
    /// the statically multi-register-capable shapes.
    pub fn multi_reg_count(&self) -> Option<u8> {
        match self.oper {
            Oper::Call(CallDesc {
                ret: ReturnKind::Multi { count },
                ..
            }) => Some(count),
            Oper::LocalStore {
                split_fields: Some(n),
                ..
            } => Some(n),
            _ => None,
        }
    }

    /// Number of register destinations the emitter will expect for this
    /// node, known statically from its shape.
    pub fn register_dst_count(&self) -> u32 {
        if let Some(n) = self.multi_reg_count() {
            return n as u32;
        }
        match self.oper {
            // Stores, checks and branches never define a register even
            // though some carry the stored value's type.
            Oper::LocalStore { .. }
            | Oper::StoreIndirection { .. }
            | Oper::NullCheck { .. }
            | Oper::BoundsCheck { .. }
            | Oper::JumpCompare { .. }
            | Oper::BlockStore(_) => 0,
            _ => {
                if self.ty.is_void() {
                    0
                } else {
                    1
                }
            }
        }
    }
}

/// Arena-backed builder for lowered IR, used by the driver and tests.
pub struct IrBuilder<'a> {
    session: &'a CompilationSession<'a>,
    next_id: Cell<u32>,
}

impl<'a> IrBuilder<'a> {
    pub fn new(session: &'a CompilationSession<'a>) -> Self {
        Self {
            session,
            next_id: Cell::new(0),
        }
    }

    fn fresh_id(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId(id)
    }

    /// Allocate a node with default flags.
    pub fn node(&self, ty: ValueType, oper: Oper<'a>) -> &'a Node<'a> {
        self.node_with_flags(ty, NodeFlags::default(), oper)
    }

    /// Allocate a node with explicit flags.
    pub fn node_with_flags(
        &self,
        ty: ValueType,
        flags: NodeFlags,
        oper: Oper<'a>,
    ) -> &'a Node<'a> {
        self.session.alloc(Node {
            id: self.fresh_id(),
            ty,
            flags,
            oper,
        })
    }

    pub fn const_int(&self, ty: ValueType, value: i64) -> &'a Node<'a> {
        self.node(ty, Oper::ConstInt(value))
    }

    /// A constant folded into its consumer.
    pub fn contained_const_int(&self, ty: ValueType, value: i64) -> &'a Node<'a> {
        self.node_with_flags(
            ty,
            NodeFlags {
                contained: true,
                ..NodeFlags::default()
            },
            Oper::ConstInt(value),
        )
    }

    pub fn local(&self, ty: ValueType) -> &'a Node<'a> {
        self.node(ty, Oper::LocalLoad)
    }

    pub fn local_addr(&self) -> &'a Node<'a> {
        self.node(ValueType::ByRef, Oper::LocalAddr)
    }

    /// A local address folded into its consumer.
    pub fn contained_local_addr(&self) -> &'a Node<'a> {
        self.node_with_flags(
            ValueType::ByRef,
            NodeFlags {
                contained: true,
                ..NodeFlags::default()
            },
            Oper::LocalAddr,
        )
    }

    pub fn binary(
        &self,
        op: BinaryOp,
        ty: ValueType,
        lhs: &'a Node<'a>,
        rhs: &'a Node<'a>,
    ) -> &'a Node<'a> {
        self.node(ty, Oper::Binary { op, lhs, rhs })
    }

    /// Allocate a slice of nodes in the session arena.
    pub fn nodes(&self, items: &[&'a Node<'a>]) -> &'a [&'a Node<'a>] {
        self.session.alloc_slice(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn test_register_dst_count_shapes() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let b = IrBuilder::new(&session);

        let value = b.const_int(ValueType::Long, 1);
        assert_eq!(value.register_dst_count(), 1);

        let store = b.node(
            ValueType::Void,
            Oper::LocalStore {
                value,
                split_fields: None,
            },
        );
        assert_eq!(store.register_dst_count(), 0);

        let split = b.node(
            ValueType::Void,
            Oper::LocalStore {
                value,
                split_fields: Some(2),
            },
        );
        assert_eq!(split.register_dst_count(), 2);
        assert_eq!(split.multi_reg_count(), Some(2));
    }

    #[test]
    fn test_contained_const_helpers() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let b = IrBuilder::new(&session);

        let c = b.contained_const_int(ValueType::Long, 0);
        assert!(c.is_contained());
        assert!(c.is_integral_const(0));
        assert_eq!(c.contained_int_const(), Some(0));

        let r = b.const_int(ValueType::Long, 0);
        assert_eq!(r.contained_int_const(), None);
    }

    #[test]
    fn test_node_ids_are_unique() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let b = IrBuilder::new(&session);

        let a = b.const_int(ValueType::Int, 1);
        let c = b.const_int(ValueType::Int, 2);
        assert_ne!(a.id, c.id);
    }
}
