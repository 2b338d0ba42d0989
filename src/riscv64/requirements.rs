//! Register requirement computation for RISC-V 64.
//!
//! This encapsulates all the logic for deciding, per lowered IR node, how
//! many registers the node uses, defines, kills and needs as scratch
//! storage. The results go into the demand stream the linear scan allocator
//! consumes; the instruction emitter later relies on the per-node counts
//! recorded here matching what it finds register-assigned.
//!
//! The pass handles one node at a time. Traversal order is the caller's
//! responsibility: operands must be visited before their consumers so that
//! operand registers are known when a node's handler runs.

use log::{debug, trace};

use crate::core::error::{CompileError, CompileResult};
use crate::core::registers::RegSet;
use crate::core::session::{CompilationSession, NodeMeta};
use crate::ir::{
    BinaryOp, BlockSource, BlockStoreDesc, BlockStoreKind, CallDesc, CallTarget, IntrinsicKind,
    Node, Oper, Relation, ReturnKind, RuntimeHelper, ValueType,
};
use crate::riscv64::abi::IsaDescription;
use crate::riscv64::demand::{DemandStream, NodeDemand};
use crate::riscv64::encoding::{is_simm12, single_instruction_fp_bits, zero_reg_expressible};

/// Register size in bytes.
pub const REGSIZE_BYTES: u32 = 8;

/// Floating point register size in bytes.
pub const FP_REGSIZE_BYTES: u32 = 8;

/// Stack alignment in bytes.
pub const STACK_ALIGN: u32 = 16;

/// Page size assumed for stack probing.
pub const PAGE_SIZE: u32 = 4096;

/// Largest localloc handled with an unrolled store sequence.
pub const STACK_ALLOC_UNROLL_LIMIT: u32 = REGSIZE_BYTES * 2 * 4;

/// Per-function facts the demand computation needs from the frame layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInfo {
    /// The method requires freshly allocated stack memory to be zeroed.
    pub init_memory: bool,
    /// Bytes of outgoing stack argument space below dynamic allocations.
    pub outgoing_arg_space: u32,
}

/// The register demand pass for one function.
///
/// Owns the in-progress demand stream; no other component observes it
/// mid-pass. Construct once per function, feed nodes in execution order,
/// then hand the stream to the allocator.
pub struct DemandPass<'a, 's> {
    session: &'s CompilationSession<'a>,
    isa: &'s IsaDescription,
    frame: FrameInfo,
    stream: DemandStream,
    /// Argument registers currently occupied by processed PutArgReg nodes.
    /// Cleared after every call; placements never carry over.
    placed_arg_regs: RegSet,
}

impl<'a, 's> DemandPass<'a, 's> {
    pub fn new(
        session: &'s CompilationSession<'a>,
        isa: &'s IsaDescription,
        frame: FrameInfo,
    ) -> Self {
        Self {
            session,
            isa,
            frame,
            stream: DemandStream::new(),
            placed_arg_regs: RegSet::new(),
        }
    }

    pub fn stream(&self) -> &DemandStream {
        &self.stream
    }

    pub fn into_stream(self) -> DemandStream {
        self.stream
    }

    /// Argument registers holding not-yet-consumed call arguments.
    pub fn placed_arg_regs(&self) -> RegSet {
        self.placed_arg_regs
    }

    /// Process nodes in execution order, skipping contained ones.
    pub fn run(&mut self, nodes: &[&'a Node<'a>]) -> CompileResult<()> {
        for &node in nodes {
            if node.is_contained() {
                continue;
            }
            self.build_node(node)?;
        }
        debug!("register demand built: {}", self.session.stats());
        Ok(())
    }

    /// Build the demand records for one node.
    ///
    /// Returns the number of register sources the node consumed and writes
    /// the node's source/destination counts into the session metadata.
    pub fn build_node(&mut self, node: &'a Node<'a>) -> CompileResult<usize> {
        assert!(!node.is_contained(), "contained node dispatched");

        let isa = self.isa;
        let frame = self.frame;
        let mut placed = self.placed_arg_regs;
        let start_records = self.stream.len();
        let mut d = NodeDemand::new(&mut self.stream, node);

        match node.oper {
            // Loads of stack locals and local addresses: a def, no uses.
            Oper::LocalLoad | Oper::LocalField | Oper::LocalAddr => {
                d.def(node);
            }

            Oper::LocalStore {
                value,
                split_fields,
            } => build_store_local(&mut d, node, value, split_fields),

            Oper::ConstInt(_) => {
                d.def(node);
            }

            Oper::ConstFloat(value) => {
                // A one-instruction bit pattern is built in a GP register
                // and moved over; zero comes from the zero register.
                if let Some(bits) = single_instruction_fp_bits(value, node.ty) {
                    if bits != 0 {
                        d.request_internal();
                    }
                }
                d.finish_internals();
                d.def(node);
            }

            Oper::Unary { operand, .. } => {
                d.use_reg(operand);
                d.def(node);
            }

            Oper::Binary { op, lhs, rhs } => build_binary(&mut d, isa, node, op, lhs, rhs),

            Oper::Compare { rel, lhs, rhs } => {
                build_compare_internals(&mut d, node, rel, lhs, rhs);
                d.finish_internals();
                build_binary_uses(&mut d, lhs, rhs);
                d.def(node);
            }

            Oper::JumpCompare { lhs, rhs, .. } => {
                build_binary_uses(&mut d, lhs, rhs);
            }

            Oper::Intrinsic { kind, op1, op2 } => {
                build_intrinsic(&mut d, isa, node, kind, op1, op2)?;
            }

            Oper::Cast {
                operand,
                overflow_check,
            } => build_cast(&mut d, node, operand, overflow_check),

            Oper::CheckFinite { operand } => {
                d.request_internal();
                d.use_reg(operand);
                d.def(node);
                d.finish_internals();
            }

            Oper::CompareExchange {
                addr,
                value,
                comparand,
            } => build_compare_exchange(&mut d, node, addr, value, comparand),

            Oper::AtomicRmw { addr, value, .. } => {
                assert!(!addr.is_contained());
                d.use_reg(addr);
                if !value.is_contained() {
                    d.use_reg(value);
                } else {
                    assert!(zero_reg_expressible(value));
                }
                if node.is_value() {
                    d.def(node);
                }
            }

            Oper::LockAdd { .. } => {
                return Err(CompileError::Unsupported {
                    oper: "interlocked add",
                });
            }

            Oper::Indirection { addr } => build_indir(&mut d, node, addr, true),

            Oper::NullCheck { addr } => build_indir(&mut d, node, addr, false),

            Oper::StoreIndirection {
                addr,
                value,
                write_barrier,
            } => {
                if write_barrier {
                    build_gc_write_barrier(&mut d, isa, addr, value);
                } else {
                    build_indir(&mut d, node, addr, false);
                    if !value.is_contained() {
                        d.use_reg(value);
                    }
                }
            }

            Oper::AddrMode {
                base,
                index,
                scale,
                offset,
            } => {
                if let Some(base) = base {
                    d.use_reg(base);
                }
                if let Some(index) = index {
                    d.use_reg(index);
                }
                if base.is_some() && index.is_some() && scale > 1 {
                    // Scaling the index needs its own temporary.
                    d.request_internal();
                }
                if index.is_some() && offset != 0 {
                    // The target supports at most one of index and offset
                    // per instruction; one internal covers both cases.
                    d.request_internal();
                } else if !is_simm12(offset) {
                    d.request_internal();
                }
                d.finish_internals();
                d.def(node);
            }

            Oper::IndexAddr { base, index } => {
                build_binary_uses(&mut d, base, index);
                d.request_internal();
                d.finish_internals();
                d.def(node);
            }

            Oper::BoundsCheck { index, length } => {
                // 32-bit operands are compared sign-extended.
                if length.ty == ValueType::Int {
                    d.request_internal();
                }
                if index.ty == ValueType::Int {
                    d.request_internal();
                }
                d.finish_internals();
                build_operand_uses(&mut d, index);
                build_operand_uses(&mut d, length);
            }

            Oper::BlockStore(desc) => build_block_store(&mut d, isa, desc)?,

            Oper::StackAlloc { size } => build_stack_alloc(&mut d, frame, node, size),

            Oper::Call(ref call) => build_call(&mut d, isa, &mut placed, node, call),

            Oper::PutArgReg { src, reg } => {
                assert!(!src.is_contained());
                d.use_reg_in(src, RegSet::single(reg));
                d.def_in(node, RegSet::single(reg));
                placed.set(reg);
            }

            Oper::PutArgStack { src } => build_put_arg_stack(&mut d, src),

            Oper::Return { value } => build_return(&mut d, isa, value),

            Oper::ReturnFilter { value } => {
                if let Some(value) = value {
                    assert_eq!(value.ty, ValueType::Int);
                    d.use_reg_in(value, isa.int_return);
                }
            }

            Oper::ReturnTrap { condition } => {
                // A compare of the poll word plus a conditional helper call.
                d.use_reg(condition);
                d.kill(isa.helper_kill_set(RuntimeHelper::StopForGc));
            }

            Oper::JumpTable => {
                d.def(node);
            }

            Oper::SwitchTable { index, table } => {
                d.request_internal();
                build_binary_uses(&mut d, index, table);
                d.finish_internals();
            }

            Oper::Keepalive { operand } => {
                build_operand_uses(&mut d, operand);
            }

            Oper::CatchArg => {
                d.def_in(node, isa.exception_object);
            }

            Oper::AsyncContinuation => {
                d.def_in(node, isa.async_continuation_ret);
            }

            Oper::ProfilerHook => {
                d.kill(isa.helper_kill_set(RuntimeHelper::Profiler));
            }

            Oper::Nop | Oper::NoOp | Oper::StartNoGc | Oper::StartPreemptGc => {
                assert!(!node.is_value());
            }

            Oper::JumpTrue | Oper::Jump => {
                assert!(!node.is_value());
            }

            Oper::Simd => {
                return Err(CompileError::Unsupported {
                    oper: "SIMD node without vector support",
                });
            }
            Oper::HwIntrinsic => {
                return Err(CompileError::Unsupported {
                    oper: "hardware intrinsic",
                });
            }

            Oper::Switch => {
                return Err(CompileError::MalformedIr {
                    reason: "switch must be lowered before register demand",
                });
            }
            Oper::ArrayElem => {
                return Err(CompileError::MalformedIr {
                    reason: "array element access must be lowered",
                });
            }
            Oper::Block => {
                return Err(CompileError::MalformedIr {
                    reason: "non-store block node survived lowering",
                });
            }
            Oper::InitVal => {
                return Err(CompileError::MalformedIr {
                    reason: "init value must be contained",
                });
            }
            Oper::FieldList { .. } => {
                return Err(CompileError::MalformedIr {
                    reason: "non-contained field list",
                });
            }
            Oper::Box | Oper::Comma | Oper::Qmark | Oper::Colon => {
                return Err(CompileError::MalformedIr {
                    reason: "morph-only node survived lowering",
                });
            }
        }

        let summary = d.finish(node);
        self.placed_arg_regs = placed;
        self.session.set_node_meta(
            node.id,
            NodeMeta {
                src_count: summary.src_count,
                dst_count: summary.dst_count,
                local_dead_use: node.is_value() && node.is_unused_value(),
            },
        );
        self.session.record_node(
            self.stream.len() - start_records,
            summary.internal_requests as usize,
        );
        trace!(
            "node n{}: {} srcs, {} dsts, {} internals",
            node.id.0,
            summary.src_count,
            summary.dst_count,
            summary.internal_requests
        );
        Ok(summary.src_count as usize)
    }
}

/// One use per non-contained register operand; contained operands
/// contribute the registers of their own unfolded parts.
fn build_operand_uses<'a>(d: &mut NodeDemand<'_>, operand: &'a Node<'a>) {
    if !operand.is_contained() {
        d.use_reg(operand);
        return;
    }
    match operand.oper {
        Oper::AddrMode { base, index, .. } => {
            if let Some(base) = base {
                build_addr_uses(d, base);
            }
            if let Some(index) = index {
                build_addr_uses(d, index);
            }
        }
        // A contained indirection exposes its address operand.
        Oper::Indirection { addr } => build_addr_uses(d, addr),
        Oper::FieldList { items } => {
            for item in items {
                d.use_reg(item);
            }
        }
        // Contained constants and local addresses occupy no register.
        _ => {}
    }
}

fn build_addr_uses<'a>(d: &mut NodeDemand<'_>, addr: &'a Node<'a>) {
    if !addr.is_contained() {
        d.use_reg(addr);
    } else if let Oper::AddrMode { base, index, .. } = addr.oper {
        if let Some(base) = base {
            if !base.is_contained() {
                d.use_reg(base);
            }
        }
        if let Some(index) = index {
            if !index.is_contained() {
                d.use_reg(index);
            }
        }
    }
}

fn build_binary_uses<'a>(d: &mut NodeDemand<'_>, lhs: &'a Node<'a>, rhs: &'a Node<'a>) {
    build_operand_uses(d, lhs);
    build_operand_uses(d, rhs);
}

fn build_store_local<'a>(
    d: &mut NodeDemand<'_>,
    node: &'a Node<'a>,
    value: &'a Node<'a>,
    split_fields: Option<u8>,
) {
    if let Some(fields) = split_fields {
        // A promoted local stored from a multi-register source: one use
        // and one def per field register.
        debug_assert_eq!(value.multi_reg_count(), Some(fields));
        for _ in 0..fields {
            d.use_reg(value);
        }
        for _ in 0..fields {
            d.def(node);
        }
        return;
    }
    if !value.is_contained() {
        d.use_reg(value);
    }
}

fn build_binary<'a>(
    d: &mut NodeDemand<'_>,
    isa: &IsaDescription,
    node: &'a Node<'a>,
    op: BinaryOp,
    lhs: &'a Node<'a>,
    rhs: &'a Node<'a>,
) {
    if node.ty.is_floating() {
        // Overflow checking is an integer concept, and lowering has made
        // all conversions explicit.
        assert!(!node.flags.overflow_check);
        debug_assert_eq!(lhs.ty.is_floating(), rhs.ty.is_floating());
    } else if op.supports_overflow() && node.flags.overflow_check {
        // The overflow check reads the pre-truncation intermediate after
        // the destination may already hold the truncated result, so the
        // temps must not alias the target. Signed checks need a second
        // temp to tell sign overflow from carry.
        d.request_internal();
        if !node.flags.unsigned {
            d.request_internal();
        }
        d.internal_regs_delay_free = true;
    }

    if op.is_rotate() && !isa.features.zbb {
        // Emulated as a shift pair into a temporary.
        d.request_internal();
    }

    if op == BinaryOp::MulHi && node.ty.size() != 8 && node.flags.unsigned {
        d.request_internal();
    }

    build_binary_uses(d, lhs, rhs);

    if op.is_div_or_mod() {
        build_divisor_temps(d, node, op, rhs);
    }

    d.finish_internals();
    d.def(node);
}

/// Scratch requirements of integer division.
///
/// A divisor proven zero needs nothing: the operation unconditionally
/// faults. Otherwise the zero check needs the divisor in a real register,
/// and signed div/mod needs a temp for the MIN/-1 overflow check unless a
/// constant divisor rules it out.
fn build_divisor_temps<'a>(
    d: &mut NodeDemand<'_>,
    node: &'a Node<'a>,
    op: BinaryOp,
    divisor: &'a Node<'a>,
) {
    if node.ty.is_floating() {
        return;
    }
    if zero_reg_expressible(divisor) || divisor.is_integral_const(0) {
        return;
    }

    let mut need_temp = false;
    if let Some(imm) = divisor.contained_int_const() {
        // A contained nonzero immediate has no register of its own and
        // must be materialized for the divide instruction.
        if imm != 0 {
            need_temp = true;
        }
    }
    if !need_temp && op.is_signed_div_or_mod() {
        let overflow_impossible = matches!(divisor.integral_const(), Some(c) if c != -1);
        if !overflow_impossible {
            need_temp = true;
        }
    }
    if need_temp {
        d.request_internal();
    }
}

/// Internal-register decision for value-producing integer compares.
///
/// 32-bit operands on 64-bit registers offer three zero-cost strategies;
/// only when none applies does the compare need a scratch register.
fn build_compare_internals<'a>(
    d: &mut NodeDemand<'_>,
    node: &'a Node<'a>,
    rel: Relation,
    lhs: &'a Node<'a>,
    rhs: &'a Node<'a>,
) {
    let op1_ty = lhs.ty;
    if op1_ty.is_floating() || op1_ty.size() != 4 {
        return;
    }
    let unsigned = node.flags.unsigned;

    let use_add_sub =
        matches!(rel, Relation::Eq | Relation::Ne) && !rhs.is_integral_const(-2048);
    let use_shift_right = !unsigned
        && ((rel == Relation::Lt && rhs.is_integral_const(0))
            || (rel == Relation::Le && rhs.is_integral_const(-1)));
    let use_load_imm = unsigned
        && ((matches!(rel, Relation::Lt | Relation::Ge) && rhs.is_integral_const(0))
            || (matches!(rel, Relation::Le | Relation::Gt) && rhs.is_integral_const(-1)));

    if !use_add_sub && !use_shift_right && !use_load_imm {
        d.request_internal();
    }
}

fn build_intrinsic<'a>(
    d: &mut NodeDemand<'_>,
    isa: &IsaDescription,
    node: &'a Node<'a>,
    kind: IntrinsicKind,
    op1: &'a Node<'a>,
    op2: Option<&'a Node<'a>>,
) -> CompileResult<()> {
    if kind.requires_zbb() && !isa.features.zbb {
        return Err(CompileError::Unsupported {
            oper: "bit-manipulation intrinsic without Zbb",
        });
    }
    match kind {
        IntrinsicKind::MinNumber | IntrinsicKind::MaxNumber => {
            assert!(op2.is_some());
            assert!(node.ty.is_floating());
        }
        IntrinsicKind::Abs | IntrinsicKind::Sqrt => {
            assert!(node.ty.is_floating());
            debug_assert_eq!(op1.ty, node.ty);
        }
        IntrinsicKind::Min
        | IntrinsicKind::Max
        | IntrinsicKind::MinUnsigned
        | IntrinsicKind::MaxUnsigned => {
            assert!(op2.is_some());
            assert_eq!(node.ty, ValueType::Long);
        }
        IntrinsicKind::LeadingZeroCount
        | IntrinsicKind::TrailingZeroCount
        | IntrinsicKind::PopCount => {
            assert!(op2.is_none());
            assert!(!node.ty.is_floating());
        }
    }

    d.use_reg(op1);
    if let Some(op2) = op2 {
        d.use_reg(op2);
    }
    d.def(node);
    Ok(())
}

fn build_cast<'a>(
    d: &mut NodeDemand<'_>,
    node: &'a Node<'a>,
    operand: &'a Node<'a>,
    overflow_check: bool,
) {
    if overflow_check {
        d.request_internal();
    }
    d.finish_internals();
    build_operand_uses(d, operand);
    d.def(node);

    if operand.ty.is_floating() && !node.ty.is_floating() {
        // Conversion to integer needs a scratch value for NaN and range
        // handling, independent of any overflow check above.
        d.request_internal();
        d.finish_internals();
    }
}

fn build_compare_exchange<'a>(
    d: &mut NodeDemand<'_>,
    node: &'a Node<'a>,
    addr: &'a Node<'a>,
    value: &'a Node<'a>,
    comparand: &'a Node<'a>,
) {
    // The retry loop re-reads every operand, so none of them may share a
    // register with the node's own result.
    assert!(!addr.is_contained());
    let use_ = d.use_reg(addr);
    d.mark_delay_free(use_);

    if !value.is_contained() {
        let use_ = d.use_reg(value);
        d.mark_delay_free(use_);
    } else {
        assert!(zero_reg_expressible(value));
    }

    if !comparand.is_contained() {
        let use_ = d.use_reg(comparand);
        d.mark_delay_free(use_);
        if comparand.ty.size() == 4 {
            // The comparison reads a sign-extended copy.
            d.request_internal();
        }
    } else {
        assert!(zero_reg_expressible(comparand));
    }

    // Status register of the store-conditional.
    d.request_internal();
    d.internal_regs_delay_free = true;
    d.finish_internals();
    d.def(node);
}

fn build_indir<'a>(d: &mut NodeDemand<'_>, node: &'a Node<'a>, addr: &'a Node<'a>, has_def: bool) {
    // Struct-typed indirections appear only contained under block copies.
    debug_assert!(node.ty != ValueType::Struct);

    if addr.is_contained() {
        match addr.oper {
            Oper::AddrMode { index, offset, .. } => {
                if index.is_some() && offset != 0 {
                    // At most one of index and offset fits one instruction;
                    // a single internal covers the two-step address.
                    d.request_internal();
                } else if !is_simm12(offset) {
                    d.request_internal();
                }
            }
            Oper::ConstInt(_) => {
                d.request_internal();
            }
            _ => {}
        }
    }

    build_addr_uses(d, addr);
    d.finish_internals();

    if has_def {
        d.def(node);
    }
}

fn build_gc_write_barrier<'a>(
    d: &mut NodeDemand<'_>,
    isa: &IsaDescription,
    addr: &'a Node<'a>,
    value: &'a Node<'a>,
) {
    assert!(!addr.is_contained() && !value.is_contained());
    d.use_reg_in(addr, RegSet::single(isa.write_barrier_dst));
    d.use_reg_in(value, RegSet::single(isa.write_barrier_src));
    d.kill(isa.helper_kill_set(RuntimeHelper::WriteBarrier));
}

fn build_return<'a>(d: &mut NodeDemand<'_>, isa: &IsaDescription, value: Option<&'a Node<'a>>) {
    let Some(value) = value else {
        return;
    };
    if value.is_contained() {
        // A contained return operand is materialized by codegen directly
        // into the return register.
        return;
    }
    if let Some(count) = value.multi_reg_count() {
        let candidates = isa.multi_reg_return_candidates();
        for _ in 0..count {
            d.use_reg_in(value, candidates);
        }
    } else {
        d.use_reg_in(value, isa.return_candidates(value.ty));
    }
}

fn build_call<'a>(
    d: &mut NodeDemand<'_>,
    isa: &IsaDescription,
    placed: &mut RegSet,
    node: &'a Node<'a>,
    call: &CallDesc<'a>,
) {
    // Candidate restriction for the target of a fast tail call: it must
    // survive the epilogue, so only volatile registers qualify.
    let mut target_candidates = None;
    if call.fast_tail_call {
        let candidates = isa.fast_tail_call_target_candidates();
        assert!(!candidates.is_empty());
        target_candidates = Some(candidates);
    }

    match call.target {
        CallTarget::Indirect(target) => {
            assert!(!target.ty.is_void());
            if target.contained_int_const().is_some() {
                // A literal target too wide for a direct call is loaded
                // into a scratch register first.
                match target_candidates {
                    Some(candidates) => d.request_internal_in(candidates),
                    None => d.request_internal(),
                };
            }
        }
        CallTarget::StubIndirect => {
            // The real target is loaded from the indirection cell into a
            // temp register.
            match target_candidates {
                Some(candidates) => d.request_internal_in(candidates),
                None => d.request_internal(),
            };
        }
        CallTarget::Direct => {}
    }

    for arg in call.args {
        match arg.oper {
            Oper::PutArgReg { reg, .. } => {
                d.use_reg_in(arg, RegSet::single(reg));
                placed.set(reg);
            }
            // Stack arguments were consumed by their own nodes.
            Oper::PutArgStack { .. } => {}
            _ => debug_assert!(false, "unexpected call argument shape"),
        }
    }

    if let CallTarget::Indirect(target) = call.target {
        if target.contained_int_const().is_none() {
            match target_candidates {
                Some(candidates) => d.use_reg_in(target, candidates),
                None => d.use_reg(target),
            };
        }
    }

    d.finish_internals();

    // Kills precede the defs so the allocator relocates live values before
    // the return registers are written.
    d.kill(isa.kill_set_for_call(call));
    match call.ret {
        ReturnKind::Void => {}
        ReturnKind::Single => {
            d.def_in(node, isa.return_candidates(node.ty));
        }
        ReturnKind::Multi { count } => {
            let candidates = isa.multi_reg_return_candidates();
            assert!(candidates.count() > 0);
            for _ in 0..count {
                d.def_in(node, candidates);
            }
        }
    }

    // No argument stays placed in a register past the call.
    *placed = RegSet::new();
}

fn build_put_arg_stack<'a>(d: &mut NodeDemand<'_>, src: &'a Node<'a>) {
    if src.ty == ValueType::Struct {
        match src.oper {
            Oper::FieldList { items } => {
                assert!(src.is_contained());
                for item in items {
                    d.use_reg(item);
                }
            }
            _ => {
                // Register-sized load/store copy of the struct body.
                d.request_internal();
                d.request_internal();
                assert!(src.is_contained());
                if let Oper::Indirection { addr } = src.oper {
                    build_addr_uses(d, addr);
                }
            }
        }
    } else {
        build_operand_uses(d, src);
    }
    d.finish_internals();
}

fn build_block_store<'a>(
    d: &mut NodeDemand<'_>,
    isa: &IsaDescription,
    desc: BlockStoreDesc<'a>,
) -> CompileResult<()> {
    let BlockStoreDesc {
        dst_addr,
        src,
        size,
        kind,
    } = desc;

    let mut dst_addr_candidates = None;
    let mut src_candidates = None;
    let src_addr_or_fill;

    match src {
        BlockSource::Init { fill } => {
            src_addr_or_fill = Some(fill);
            match kind {
                BlockStoreKind::Unroll => {
                    if dst_addr.is_contained() {
                        // The address is computed in codegen and may need a
                        // register of its own.
                        d.request_internal();
                    }
                    let dst_alignment_known = matches!(dst_addr.oper, Oper::LocalAddr);
                    if dst_alignment_known && size > FP_REGSIZE_BYTES {
                        d.request_internal();
                    }
                }
                BlockStoreKind::Loop => {
                    // Loop counter / store temp.
                    d.request_internal();
                }
                BlockStoreKind::ObjUnroll => {
                    return Err(CompileError::MalformedIr {
                        reason: "zero-init block store cannot use the GC copy strategy",
                    });
                }
            }
        }
        BlockSource::Copy { src } => {
            src_addr_or_fill = match src.oper {
                Oper::Indirection { addr } => {
                    assert!(src.is_contained());
                    Some(addr)
                }
                // A local source's address is formed in codegen.
                _ => None,
            };
            match kind {
                BlockStoreKind::ObjUnroll => {
                    // The copy runs through the fixed write-barrier address
                    // pair; scratch registers must not collide with it.
                    let candidates = isa.allocatable_int.minus(isa.write_barrier_pair());
                    d.request_internal_in(candidates);
                    if size >= 2 * REGSIZE_BYTES {
                        d.request_internal_in(candidates);
                    }
                    dst_addr_candidates = Some(RegSet::single(isa.write_barrier_dst));
                    if let Some(src_addr) = src_addr_or_fill {
                        assert!(!src_addr.is_contained());
                        src_candidates = Some(RegSet::single(isa.write_barrier_src));
                    }
                }
                BlockStoreKind::Unroll => {
                    d.request_internal();
                }
                BlockStoreKind::Loop => {
                    return Err(CompileError::MalformedIr {
                        reason: "block copy does not use the loop strategy",
                    });
                }
            }
        }
    }

    if !dst_addr.is_contained() {
        match dst_addr_candidates {
            Some(candidates) => d.use_reg_in(dst_addr, candidates),
            None => d.use_reg(dst_addr),
        };
    } else if let Oper::AddrMode { base: Some(base), .. } = dst_addr.oper {
        build_addr_uses(d, base);
    }

    if let Some(operand) = src_addr_or_fill {
        if !operand.is_contained() {
            match src_candidates {
                Some(candidates) => d.use_reg_in(operand, candidates),
                None => d.use_reg(operand),
            };
        } else if let Oper::AddrMode { base: Some(base), .. } = operand.oper {
            build_addr_uses(d, base);
        }
    }

    d.finish_internals();
    if kind == BlockStoreKind::ObjUnroll {
        d.kill(isa.helper_kill_set(RuntimeHelper::ByRefWriteBarrier));
    }
    Ok(())
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Scratch requirements of dynamic stack allocation.
///
/// Decision table, with one extra temp whenever the frame has outgoing
/// stack argument space the allocation must account for:
///
///   size        zero-init   scratch
///   0                -         0
///   const <= 64      -         0
///   const < page     no        0 or 1 (negated size not simm12)
///   const >= page    no        2
///   const > 64       yes       2
///   non-const        no        2
///   non-const        yes       2
fn build_stack_alloc<'a>(
    d: &mut NodeDemand<'_>,
    frame: FrameInfo,
    node: &'a Node<'a>,
    size: &'a Node<'a>,
) {
    let mut scratch = 0u32;

    if let Some(value) = size.integral_const() {
        assert!(size.is_contained());
        let size_val = align_up(value.max(0) as u64, STACK_ALIGN as u64);
        if size_val == 0 || size_val <= STACK_ALLOC_UNROLL_LIMIT as u64 {
            // Unrolled stores, no probe.
        } else if frame.init_memory {
            scratch = 2;
        } else if size_val < PAGE_SIZE as u64 {
            if !is_simm12(-(size_val as i64)) {
                scratch = 1;
            }
        } else {
            // Probe loop: count register and probe temp.
            scratch = 2;
        }
    } else {
        scratch = 2;
    }

    if frame.outgoing_arg_space > 0 {
        scratch += 1;
    }
    for _ in 0..scratch {
        d.request_internal();
    }

    if !size.is_contained() {
        d.use_reg(size);
    }
    d.finish_internals();
    d.def(node);
}
