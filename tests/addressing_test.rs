//! Demand computation for indirections, address modes and range checks.

use bumpalo::Bump;
use rvjit::core::CompilationSession;
use rvjit::ir::{IrBuilder, Node, NodeFlags, Oper, ValueType};
use rvjit::riscv64::{DemandPass, FrameInfo, IsaDescription, IsaFeatures, RecordKind};

fn isa() -> IsaDescription {
    IsaDescription::new(IsaFeatures::default())
}

fn contained_addr_mode<'a>(
    b: &IrBuilder<'a>,
    base: Option<&'a Node<'a>>,
    index: Option<&'a Node<'a>>,
    scale: u8,
    offset: i64,
) -> &'a Node<'a> {
    b.node_with_flags(
        ValueType::ByRef,
        NodeFlags {
            contained: true,
            ..NodeFlags::default()
        },
        Oper::AddrMode {
            base,
            index,
            scale,
            offset,
        },
    )
}

#[test]
fn test_load_with_small_offset_needs_no_temp() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa();

    let base = b.local(ValueType::ByRef);
    let mode = contained_addr_mode(&b, Some(base), None, 1, 16);
    let load = b.node(ValueType::Long, Oper::Indirection { addr: mode });

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[base, mode, load]).unwrap();

    let stream = pass.stream();
    assert_eq!(stream.internals_of(load.id).count(), 0);
    assert_eq!(stream.uses_of(base.id).count(), 1);
    assert_eq!(stream.defs_of(load.id).count(), 1);
    assert_eq!(session.node_meta(load.id).unwrap().src_count, 1);
}

#[test]
fn test_load_with_wide_offset_needs_temp() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa();

    let base = b.local(ValueType::ByRef);
    let mode = contained_addr_mode(&b, Some(base), None, 1, 4096);
    let load = b.node(ValueType::Long, Oper::Indirection { addr: mode });

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[base, mode, load]).unwrap();

    assert_eq!(pass.stream().internals_of(load.id).count(), 1);
}

#[test]
fn test_load_with_index_and_offset_needs_temp() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa();

    let base = b.local(ValueType::ByRef);
    let index = b.local(ValueType::Long);
    let mode = contained_addr_mode(&b, Some(base), Some(index), 1, 8);
    let load = b.node(ValueType::Long, Oper::Indirection { addr: mode });

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[base, index, mode, load]).unwrap();

    assert_eq!(pass.stream().internals_of(load.id).count(), 1);
    assert_eq!(session.node_meta(load.id).unwrap().src_count, 2);
}

#[test]
fn test_load_from_literal_address_needs_temp() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa();

    let addr = b.contained_const_int(ValueType::Long, 0x7fff_0000);
    let load = b.node(ValueType::Long, Oper::Indirection { addr });

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[addr, load]).unwrap();

    assert_eq!(pass.stream().internals_of(load.id).count(), 1);
    assert_eq!(session.node_meta(load.id).unwrap().src_count, 0);
}

#[test]
fn test_lea_scaled_base_plus_index_needs_temps() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa();

    let base = b.local(ValueType::ByRef);
    let index = b.local(ValueType::Long);

    // Plain base+index forms in one add.
    let plain = b.node(
        ValueType::ByRef,
        Oper::AddrMode {
            base: Some(base),
            index: Some(index),
            scale: 1,
            offset: 0,
        },
    );

    // Scaling needs a temp; a simultaneous offset needs another.
    let scaled = b.node(
        ValueType::ByRef,
        Oper::AddrMode {
            base: Some(base),
            index: Some(index),
            scale: 8,
            offset: 24,
        },
    );

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[base, index, plain, scaled]).unwrap();

    assert_eq!(pass.stream().internals_of(plain.id).count(), 0);
    assert_eq!(pass.stream().internals_of(scaled.id).count(), 2);
    assert_eq!(pass.stream().defs_of(scaled.id).count(), 1);
}

#[test]
fn test_index_addr_always_needs_temp() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa();

    let base = b.local(ValueType::Ref);
    let index = b.local(ValueType::Long);
    let elem = b.node(ValueType::ByRef, Oper::IndexAddr { base, index });

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[base, index, elem]).unwrap();

    assert_eq!(pass.stream().internals_of(elem.id).count(), 1);
    assert_eq!(session.node_meta(elem.id).unwrap().src_count, 2);
}

#[test]
fn test_bounds_check_widens_narrow_operands() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa();

    let narrow_index = b.local(ValueType::Int);
    let wide_length = b.local(ValueType::Long);
    let one_narrow = b.node(
        ValueType::Void,
        Oper::BoundsCheck {
            index: narrow_index,
            length: wide_length,
        },
    );

    let ni2 = b.local(ValueType::Int);
    let nl2 = b.local(ValueType::Int);
    let both_narrow = b.node(
        ValueType::Void,
        Oper::BoundsCheck {
            index: ni2,
            length: nl2,
        },
    );

    let wi = b.local(ValueType::Long);
    let wl = b.local(ValueType::Long);
    let both_wide = b.node(
        ValueType::Void,
        Oper::BoundsCheck {
            index: wi,
            length: wl,
        },
    );

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[
        narrow_index,
        wide_length,
        one_narrow,
        ni2,
        nl2,
        both_narrow,
        wi,
        wl,
        both_wide,
    ])
    .unwrap();

    let stream = pass.stream();
    assert_eq!(stream.internals_of(one_narrow.id).count(), 1);
    assert_eq!(stream.internals_of(both_narrow.id).count(), 2);
    assert_eq!(stream.internals_of(both_wide.id).count(), 0);
    // A range check produces no value.
    assert_eq!(stream.defs_of(both_wide.id).count(), 0);
}

#[test]
fn test_null_check_uses_without_defining() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa();

    let addr = b.local(ValueType::Ref);
    let check = b.node(ValueType::Void, Oper::NullCheck { addr });

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[addr, check]).unwrap();

    assert_eq!(pass.stream().uses_of(addr.id).count(), 1);
    assert_eq!(pass.stream().defs_of(check.id).count(), 0);
}

#[test]
fn test_gc_store_pins_operands_to_barrier_registers() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let b = IrBuilder::new(&session);
    let isa = isa();

    let addr = b.local(ValueType::ByRef);
    let value = b.local(ValueType::Ref);
    let store = b.node(
        ValueType::Void,
        Oper::StoreIndirection {
            addr,
            value,
            write_barrier: true,
        },
    );

    let mut pass = DemandPass::new(&session, &isa, FrameInfo::default());
    pass.run(&[addr, value, store]).unwrap();

    let stream = pass.stream();
    let addr_use = stream.uses_of(addr.id).next().unwrap();
    let value_use = stream.uses_of(value.id).next().unwrap();
    assert_eq!(
        addr_use.candidates.unwrap(),
        rvjit::core::RegSet::single(isa.write_barrier_dst)
    );
    assert_eq!(
        value_use.candidates.unwrap(),
        rvjit::core::RegSet::single(isa.write_barrier_src)
    );
    assert!(stream
        .kills_of(store.id)
        .any(|r| matches!(r.kind, RecordKind::Kill { regs } if !regs.is_empty())));
}
