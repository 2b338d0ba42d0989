//! Demand computation for arithmetic, compares and intrinsics.

use bumpalo::Bump;
use rvjit::core::{CompilationSession, CompileError};
use rvjit::ir::{
    BinaryOp, IntrinsicKind, IrBuilder, Node, NodeFlags, Oper, Relation, ValueType,
};
use rvjit::riscv64::{DemandPass, FrameInfo, IsaDescription, IsaFeatures};

fn isa(zbb: bool) -> IsaDescription {
    IsaDescription::new(IsaFeatures { zbb })
}

fn checked_binary<'a>(
    b: &IrBuilder<'a>,
    op: BinaryOp,
    ty: ValueType,
    unsigned: bool,
    lhs: &'a Node<'a>,
    rhs: &'a Node<'a>,
) -> &'a Node<'a> {
    b.node_with_flags(
        ty,
        NodeFlags {
            overflow_check: true,
            unsigned,
            ..NodeFlags::default()
        },
        Oper::Binary { op, lhs, rhs },
    )
}

#[test]
fn test_signed_checked_add_needs_two_delay_free_temps() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa(false);

    let lhs = b.local(ValueType::Int);
    let rhs = b.local(ValueType::Int);
    let add = checked_binary(&b, BinaryOp::Add, ValueType::Int, false, lhs, rhs);

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[lhs, rhs, add]).unwrap();

    let stream = pass.stream();
    let internals: Vec<_> = stream.internals_of(add.id).collect();
    assert_eq!(internals.len(), 2);
    assert!(internals.iter().all(|r| r.delay_free));
    assert_eq!(stream.uses_of(lhs.id).count(), 1);
    assert_eq!(stream.uses_of(rhs.id).count(), 1);
    assert_eq!(stream.defs_of(add.id).count(), 1);

    let meta = session.node_meta(add.id).unwrap();
    assert_eq!(meta.src_count, 2);
    assert_eq!(meta.dst_count, 1);
}

#[test]
fn test_unsigned_checked_sub_needs_one_temp() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa(false);

    let lhs = b.local(ValueType::Long);
    let rhs = b.local(ValueType::Long);
    let sub = checked_binary(&b, BinaryOp::Sub, ValueType::Long, true, lhs, rhs);

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[lhs, rhs, sub]).unwrap();

    let internals: Vec<_> = pass.stream().internals_of(sub.id).collect();
    assert_eq!(internals.len(), 1);
    assert!(internals[0].delay_free);
}

#[test]
fn test_rotate_emulation_without_zbb() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);

    let value = b.local(ValueType::Long);
    let amount = b.local(ValueType::Long);
    let rol = b.binary(BinaryOp::Rol, ValueType::Long, value, amount);

    let without = isa(false);
    let mut pass = DemandPass::new(&session, &without, FrameInfo::default());
    pass.run(&[value, amount, rol]).unwrap();
    assert_eq!(pass.stream().internals_of(rol.id).count(), 1);

    let with = isa(true);
    let mut pass = DemandPass::new(&session, &with, FrameInfo::default());
    pass.run(&[value, amount, rol]).unwrap();
    assert_eq!(pass.stream().internals_of(rol.id).count(), 0);
}

#[test]
fn test_mulhi_temp_only_for_narrow_unsigned() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa(false);

    let lhs = b.local(ValueType::Int);
    let rhs = b.local(ValueType::Int);
    let narrow = b.node_with_flags(
        ValueType::Int,
        NodeFlags {
            unsigned: true,
            ..NodeFlags::default()
        },
        Oper::Binary {
            op: BinaryOp::MulHi,
            lhs,
            rhs,
        },
    );

    let wl = b.local(ValueType::Long);
    let wr = b.local(ValueType::Long);
    let wide = b.node_with_flags(
        ValueType::Long,
        NodeFlags {
            unsigned: true,
            ..NodeFlags::default()
        },
        Oper::Binary {
            op: BinaryOp::MulHi,
            lhs: wl,
            rhs: wr,
        },
    );

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[lhs, rhs, narrow, wl, wr, wide]).unwrap();

    assert_eq!(pass.stream().internals_of(narrow.id).count(), 1);
    assert_eq!(pass.stream().internals_of(wide.id).count(), 0);
}

#[test]
fn test_division_temp_rules() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa(false);

    // Signed division by a register value can hit MIN / -1.
    let n1 = b.local(ValueType::Long);
    let d1 = b.local(ValueType::Long);
    let div1 = b.binary(BinaryOp::Div, ValueType::Long, n1, d1);

    // A register-resident constant divisor other than -1 rules overflow out.
    let n2 = b.local(ValueType::Long);
    let d2 = b.const_int(ValueType::Long, 5);
    let div2 = b.binary(BinaryOp::Div, ValueType::Long, n2, d2);

    // A contained nonzero immediate divisor must be materialized.
    let n3 = b.local(ValueType::Long);
    let d3 = b.contained_const_int(ValueType::Long, 7);
    let div3 = b.binary(BinaryOp::UDiv, ValueType::Long, n3, d3);

    // A divisor proven zero always faults; no temp needed.
    let n4 = b.local(ValueType::Long);
    let d4 = b.contained_const_int(ValueType::Long, 0);
    let div4 = b.binary(BinaryOp::Div, ValueType::Long, n4, d4);

    // Unsigned division by a register value needs no overflow temp.
    let n5 = b.local(ValueType::Long);
    let d5 = b.local(ValueType::Long);
    let div5 = b.binary(BinaryOp::UDiv, ValueType::Long, n5, d5);

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[
        n1, d1, div1, n2, d2, div2, n3, d3, div3, n4, d4, div4, n5, d5, div5,
    ])
    .unwrap();

    let stream = pass.stream();
    assert_eq!(stream.internals_of(div1.id).count(), 1);
    assert_eq!(stream.internals_of(div2.id).count(), 0);
    assert_eq!(stream.internals_of(div3.id).count(), 1);
    assert_eq!(stream.internals_of(div4.id).count(), 0);
    assert_eq!(stream.internals_of(div5.id).count(), 0);
}

#[test]
fn test_unused_value_still_defines_a_register() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa(false);

    let lhs = b.local(ValueType::Long);
    let rhs = b.local(ValueType::Long);
    let add = b.node_with_flags(
        ValueType::Long,
        NodeFlags {
            unused_value: true,
            ..NodeFlags::default()
        },
        Oper::Binary {
            op: BinaryOp::Add,
            lhs,
            rhs,
        },
    );

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[lhs, rhs, add]).unwrap();

    let defs: Vec<_> = pass.stream().defs_of(add.id).collect();
    assert_eq!(defs.len(), 1);
    assert!(matches!(
        defs[0].kind,
        rvjit::riscv64::RecordKind::Def { unused: true }
    ));
    assert!(session.node_meta(add.id).unwrap().local_dead_use);
}

fn compare32<'a>(
    b: &IrBuilder<'a>,
    rel: Relation,
    unsigned: bool,
    lhs: &'a Node<'a>,
    rhs: &'a Node<'a>,
) -> &'a Node<'a> {
    b.node_with_flags(
        ValueType::Int,
        NodeFlags {
            unsigned,
            ..NodeFlags::default()
        },
        Oper::Compare { rel, lhs, rhs },
    )
}

#[test]
fn test_compare_strategies_avoid_temps() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa(false);

    let lhs = b.local(ValueType::Int);

    // Equality against anything but -2048 subtracts and tests for zero.
    let c5 = b.contained_const_int(ValueType::Int, 5);
    let eq = compare32(&b, Relation::Eq, false, lhs, c5);

    // -2048 defeats the negated addi trick.
    let cmin = b.contained_const_int(ValueType::Int, -2048);
    let eq_min = compare32(&b, Relation::Eq, false, lhs, cmin);

    // Signed < 0 is a sign-bit shift.
    let c0 = b.contained_const_int(ValueType::Int, 0);
    let lt0 = compare32(&b, Relation::Lt, false, lhs, c0);

    // Unsigned >= 0 folds to a constant.
    let c0b = b.contained_const_int(ValueType::Int, 0);
    let uge0 = compare32(&b, Relation::Ge, true, lhs, c0b);

    // A general signed relation between registers needs a widening temp.
    let rhs = b.local(ValueType::Int);
    let lt = compare32(&b, Relation::Lt, false, lhs, rhs);

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[lhs, c5, eq, cmin, eq_min, c0, lt0, c0b, uge0, rhs, lt])
        .unwrap();

    let stream = pass.stream();
    assert_eq!(stream.internals_of(eq.id).count(), 0);
    assert_eq!(stream.internals_of(eq_min.id).count(), 1);
    assert_eq!(stream.internals_of(lt0.id).count(), 0);
    assert_eq!(stream.internals_of(uge0.id).count(), 0);
    assert_eq!(stream.internals_of(lt.id).count(), 1);
}

#[test]
fn test_wide_and_float_compares_need_no_temp() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa(false);

    let ll = b.local(ValueType::Long);
    let lr = b.local(ValueType::Long);
    let long_cmp = b.node(
        ValueType::Int,
        Oper::Compare {
            rel: Relation::Lt,
            lhs: ll,
            rhs: lr,
        },
    );

    let fl = b.local(ValueType::Double);
    let fr = b.local(ValueType::Double);
    let float_cmp = b.node(
        ValueType::Int,
        Oper::Compare {
            rel: Relation::Lt,
            lhs: fl,
            rhs: fr,
        },
    );

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[ll, lr, long_cmp, fl, fr, float_cmp]).unwrap();

    assert_eq!(pass.stream().internals_of(long_cmp.id).count(), 0);
    assert_eq!(pass.stream().internals_of(float_cmp.id).count(), 0);
}

#[test]
fn test_bit_intrinsics_require_zbb() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);

    let op = b.local(ValueType::Long);
    let clz = b.node(
        ValueType::Long,
        Oper::Intrinsic {
            kind: IntrinsicKind::LeadingZeroCount,
            op1: op,
            op2: None,
        },
    );

    let without = isa(false);
    let mut pass = DemandPass::new(&session, &without, FrameInfo::default());
    let err = pass.build_node(clz).unwrap_err();
    assert!(matches!(err, CompileError::Unsupported { .. }));

    let with = isa(true);
    let mut pass = DemandPass::new(&session, &with, FrameInfo::default());
    pass.run(&[op, clz]).unwrap();
    assert_eq!(pass.stream().defs_of(clz.id).count(), 1);
}

#[test]
fn test_float_abs_works_without_zbb() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa(false);

    let op = b.local(ValueType::Double);
    let abs = b.node(
        ValueType::Double,
        Oper::Intrinsic {
            kind: IntrinsicKind::Abs,
            op1: op,
            op2: None,
        },
    );

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[op, abs]).unwrap();
    assert_eq!(session.node_meta(abs.id).unwrap().src_count, 1);
}

#[test]
fn test_pass_is_deterministic() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa(false);

    let lhs = b.local(ValueType::Int);
    let rhs = b.local(ValueType::Int);
    let add = checked_binary(&b, BinaryOp::Add, ValueType::Int, false, lhs, rhs);
    let div = b.binary(BinaryOp::Div, ValueType::Long, b.local(ValueType::Long), b.local(ValueType::Long));
    let nodes = [lhs, rhs, add, div];

    let mut first = DemandPass::new(&session, &isa, FrameInfo::default());
    first.run(&nodes).unwrap();
    let mut second = DemandPass::new(&session, &isa, FrameInfo::default());
    second.run(&nodes).unwrap();

    assert_eq!(first.stream(), second.stream());
}
