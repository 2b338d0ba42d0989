//! RISC-V 64 register naming, ABI register classes and kill sets.
//!
//! Everything the demand computation needs to know about the target's
//! register file lives in one immutable [`IsaDescription`], built once per
//! compilation target and passed by reference into the pass. The calling
//! convention adapter methods on it map call-like nodes to candidate and
//! clobber sets; they never emit demand records themselves.

use crate::core::registers::{AsmReg, RegSet, GP_BANK};
use crate::ir::{CallDesc, RuntimeHelper, ValueType};

// Integer register names.
pub const ZERO: AsmReg = AsmReg::gp(0);
pub const RA: AsmReg = AsmReg::gp(1);
pub const SP: AsmReg = AsmReg::gp(2);
pub const GP: AsmReg = AsmReg::gp(3);
pub const TP: AsmReg = AsmReg::gp(4);
pub const T0: AsmReg = AsmReg::gp(5);
pub const T1: AsmReg = AsmReg::gp(6);
pub const T2: AsmReg = AsmReg::gp(7);
pub const FP: AsmReg = AsmReg::gp(8);
pub const S1: AsmReg = AsmReg::gp(9);
pub const A0: AsmReg = AsmReg::gp(10);
pub const A1: AsmReg = AsmReg::gp(11);
pub const A2: AsmReg = AsmReg::gp(12);
pub const A3: AsmReg = AsmReg::gp(13);
pub const A4: AsmReg = AsmReg::gp(14);
pub const A5: AsmReg = AsmReg::gp(15);
pub const A6: AsmReg = AsmReg::gp(16);
pub const A7: AsmReg = AsmReg::gp(17);
pub const T3: AsmReg = AsmReg::gp(28);
pub const T4: AsmReg = AsmReg::gp(29);
pub const T5: AsmReg = AsmReg::gp(30);
pub const T6: AsmReg = AsmReg::gp(31);

// Floating point register names.
pub const FA0: AsmReg = AsmReg::fp(10);
pub const FA1: AsmReg = AsmReg::fp(11);

/// Optional instruction set extensions the backend may rely on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IsaFeatures {
    /// Zbb bit manipulation: native rotates, clz/ctz/cpop, integer min/max.
    pub zbb: bool,
}

/// Immutable description of the target register file and ABI.
#[derive(Debug, Clone)]
pub struct IsaDescription {
    pub features: IsaFeatures,

    /// General purpose registers the allocator may hand out.
    pub allocatable_int: RegSet,
    /// Floating point registers the allocator may hand out.
    pub allocatable_float: RegSet,

    /// Caller-saved integer registers.
    pub int_callee_trash: RegSet,
    /// Caller-saved floating point registers.
    pub float_callee_trash: RegSet,

    /// Integer return register.
    pub int_return: RegSet,
    /// Floating point return register.
    pub float_return: RegSet,
    /// Registers a two-register struct return may occupy.
    pub multi_reg_return: RegSet,

    /// Fixed destination-address register of the by-reference write barrier.
    pub write_barrier_dst: AsmReg,
    /// Fixed source-address register of the by-reference write barrier.
    pub write_barrier_src: AsmReg,

    /// Register holding the exception object on catch entry.
    pub exception_object: RegSet,
    /// Register holding the continuation returned by an async call.
    pub async_continuation_ret: RegSet,

    /// Integer argument registers, in ABI order.
    pub int_arg_regs: [AsmReg; 8],
}

impl IsaDescription {
    pub fn new(features: IsaFeatures) -> Self {
        let all_int = RegSet::all_in_bank(GP_BANK, 32);
        // zero, sp, gp, tp and the frame pointer are never allocatable; ra
        // is clobbered by calls but reserved for link duty.
        let reserved = RegSet::of(&[ZERO, RA, SP, GP, TP, FP]);

        let temporaries = RegSet::of(&[T0, T1, T2, T3, T4, T5, T6]);
        let int_args = RegSet::of(&[A0, A1, A2, A3, A4, A5, A6, A7]);
        let int_callee_trash = temporaries.union(int_args).union(RegSet::single(RA));

        // ft0-ft7, fa0-fa7, ft8-ft11 are caller saved; fs0-fs11 survive.
        let mut float_callee_trash = RegSet::new();
        for id in (0..=7).chain(10..=17).chain(28..=31) {
            float_callee_trash.set(AsmReg::fp(id));
        }

        Self {
            features,
            allocatable_int: all_int.minus(reserved),
            allocatable_float: RegSet::all_in_bank(1, 32),
            int_callee_trash,
            float_callee_trash,
            int_return: RegSet::single(A0),
            float_return: RegSet::single(FA0),
            multi_reg_return: RegSet::of(&[A0, A1, FA0, FA1]),
            write_barrier_dst: T3,
            write_barrier_src: T4,
            exception_object: RegSet::single(A0),
            async_continuation_ret: RegSet::single(A2),
            int_arg_regs: [A0, A1, A2, A3, A4, A5, A6, A7],
        }
    }

    /// The write-barrier address register pair, excluded from general
    /// allocation while a GC-aware block copy runs.
    pub fn write_barrier_pair(&self) -> RegSet {
        RegSet::of(&[self.write_barrier_dst, self.write_barrier_src])
    }

    /// Candidate registers for the value returned in a single register.
    pub fn return_candidates(&self, ty: ValueType) -> RegSet {
        if ty.is_floating() {
            self.float_return
        } else {
            // 32- and 64-bit integers and GC refs all return in a0.
            self.int_return
        }
    }

    /// Candidate registers for each element of a multi-register return.
    pub fn multi_reg_return_candidates(&self) -> RegSet {
        self.multi_reg_return
    }

    /// Candidate registers for a fast-tail-call target: the target must
    /// live in a register the epilogue does not restore.
    pub fn fast_tail_call_target_candidates(&self) -> RegSet {
        self.allocatable_int.intersect(self.int_callee_trash)
    }

    /// Registers clobbered by a call to the given node.
    pub fn kill_set_for_call(&self, call: &CallDesc<'_>) -> RegSet {
        match call.helper {
            Some(helper) => self.helper_kill_set(helper),
            None => self.int_callee_trash.union(self.float_callee_trash),
        }
    }

    /// Reduced clobber sets of runtime helpers with custom conventions.
    pub fn helper_kill_set(&self, helper: RuntimeHelper) -> RegSet {
        match helper {
            // The GC poll helper preserves argument and return registers.
            RuntimeHelper::StopForGc => RegSet::of(&[RA, T0, T1, T2, T3, T4, T5, T6])
                .union(self.float_callee_trash),
            // The reference write barrier runs on a scratch-only contract.
            RuntimeHelper::WriteBarrier => RegSet::of(&[RA, T3, T4, T5]),
            RuntimeHelper::ByRefWriteBarrier => {
                RegSet::of(&[RA, T5, T6, self.write_barrier_dst, self.write_barrier_src])
            }
            RuntimeHelper::Profiler => RegSet::of(&[RA, T0, T1]),
        }
    }
}
