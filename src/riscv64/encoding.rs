//! Encodability oracle for RISC-V 64 instruction forms.
//!
//! Pure predicates over immediates and operand shapes. Family handlers ask
//! these questions to decide whether a scratch register is needed; the
//! answers never depend on pass state and nothing here emits demand records.

use crate::ir::{Node, ValueType};

/// Whether `value` fits the signed 12-bit immediate field shared by loads,
/// stores and addi.
pub fn is_simm12(value: i64) -> bool {
    (-2048..=2047).contains(&value)
}

/// Bit pattern of a floating point constant that a single integer
/// instruction can materialize (for a following `fmv`), or `None` when a
/// constant-pool load is required.
///
/// One instruction suffices when the pattern fits a 12-bit signed immediate
/// or is a `lui`-shaped 32-bit value with a clear low half-word.
pub fn single_instruction_fp_bits(value: f64, ty: ValueType) -> Option<i64> {
    debug_assert!(ty.is_floating());
    let bits = match ty {
        ValueType::Float => (value as f32).to_bits() as i32 as i64,
        _ => value.to_bits() as i64,
    };
    if is_simm12(bits) {
        return Some(bits);
    }
    let lui_shaped = bits & 0xfff == 0 && i32::try_from(bits).is_ok();
    lui_shaped.then_some(bits)
}

/// Whether a contained operand can stand in for the architectural zero
/// register. A literal zero constant and the zero register are the same
/// case: both contribute no register source.
pub fn zero_reg_expressible(node: &Node<'_>) -> bool {
    node.is_contained() && node.is_integral_const(0)
}
