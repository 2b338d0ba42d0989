//! Register identifiers and register sets.
//!
//! The demand computation never assigns physical registers; it only names
//! them in candidate and kill sets. Registers are identified by a bank
//! (general purpose or floating point) and an id within the bank, and sets
//! of registers are tracked as one bit mask per bank.

use std::fmt;

/// Number of register banks (GP, FP).
pub const NUM_REGISTER_BANKS: usize = 2;

/// Number of registers per bank.
pub const REGS_PER_BANK: usize = 32;

/// Type for register bank indices.
pub type RegBank = u8;

/// General purpose register bank.
pub const GP_BANK: RegBank = 0;

/// Floating point register bank.
pub const FP_BANK: RegBank = 1;

/// Type for register IDs within a bank.
pub type RegId = u8;

/// Combined register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsmReg {
    pub bank: RegBank,
    pub id: RegId,
}

impl AsmReg {
    pub const fn new(bank: RegBank, id: RegId) -> Self {
        Self { bank, id }
    }

    pub const fn gp(id: RegId) -> Self {
        Self::new(GP_BANK, id)
    }

    pub const fn fp(id: RegId) -> Self {
        Self::new(FP_BANK, id)
    }

    pub fn is_gp(&self) -> bool {
        self.bank == GP_BANK
    }
}

impl fmt::Display for AsmReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bank {
            GP_BANK => write!(f, "x{}", self.id),
            _ => write!(f, "f{}", self.id),
        }
    }
}

/// Bit set for efficiently tracking register sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegSet {
    /// Bit mask for each register bank.
    banks: [u64; NUM_REGISTER_BANKS],
}

impl RegSet {
    /// Create empty register set.
    pub const fn new() -> Self {
        Self {
            banks: [0; NUM_REGISTER_BANKS],
        }
    }

    /// Create a set containing a single register.
    pub const fn single(reg: AsmReg) -> Self {
        let mut banks = [0; NUM_REGISTER_BANKS];
        banks[reg.bank as usize] = 1u64 << reg.id;
        Self { banks }
    }

    /// Create a set from a list of registers.
    pub fn of(regs: &[AsmReg]) -> Self {
        let mut set = Self::new();
        for &reg in regs {
            set.set(reg);
        }
        set
    }

    /// Create register set with the first `count` registers of a bank marked.
    pub fn all_in_bank(bank: RegBank, count: u8) -> Self {
        let mut set = Self::new();
        if count as usize <= REGS_PER_BANK {
            set.banks[bank as usize] = (1u64 << count) - 1;
        }
        set
    }

    /// Check if register is set.
    pub fn contains(&self, reg: AsmReg) -> bool {
        if reg.bank as usize >= NUM_REGISTER_BANKS || reg.id as usize >= REGS_PER_BANK {
            return false;
        }
        (self.banks[reg.bank as usize] & (1u64 << reg.id)) != 0
    }

    /// Set a register.
    pub fn set(&mut self, reg: AsmReg) {
        if (reg.bank as usize) < NUM_REGISTER_BANKS && (reg.id as usize) < REGS_PER_BANK {
            self.banks[reg.bank as usize] |= 1u64 << reg.id;
        }
    }

    /// Clear a register.
    pub fn clear(&mut self, reg: AsmReg) {
        if (reg.bank as usize) < NUM_REGISTER_BANKS && (reg.id as usize) < REGS_PER_BANK {
            self.banks[reg.bank as usize] &= !(1u64 << reg.id);
        }
    }

    /// Set union with another set.
    pub fn union(mut self, other: RegSet) -> RegSet {
        for i in 0..NUM_REGISTER_BANKS {
            self.banks[i] |= other.banks[i];
        }
        self
    }

    /// Set intersection with another set.
    pub fn intersect(mut self, other: RegSet) -> RegSet {
        for i in 0..NUM_REGISTER_BANKS {
            self.banks[i] &= other.banks[i];
        }
        self
    }

    /// Set difference with another set.
    pub fn minus(mut self, other: RegSet) -> RegSet {
        for i in 0..NUM_REGISTER_BANKS {
            self.banks[i] &= !other.banks[i];
        }
        self
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.banks.iter().all(|&b| b == 0)
    }

    /// Count registers in the set.
    pub fn count(&self) -> u32 {
        self.banks.iter().map(|b| b.count_ones()).sum()
    }

    /// Count registers in the given bank.
    pub fn count_in_bank(&self, bank: RegBank) -> u32 {
        if bank as usize >= NUM_REGISTER_BANKS {
            return 0;
        }
        self.banks[bank as usize].count_ones()
    }

    /// Check if this set is a subset of `other`.
    pub fn is_subset_of(&self, other: &RegSet) -> bool {
        (0..NUM_REGISTER_BANKS).all(|i| self.banks[i] & !other.banks[i] == 0)
    }

    /// Iterate over the registers in the set.
    pub fn iter(&self) -> impl Iterator<Item = AsmReg> + '_ {
        (0..NUM_REGISTER_BANKS).flat_map(move |bank| {
            let bits = self.banks[bank];
            (0..REGS_PER_BANK as u8)
                .filter(move |id| bits & (1u64 << id) != 0)
                .map(move |id| AsmReg::new(bank as RegBank, id))
        })
    }
}

impl fmt::Display for RegSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, reg) in self.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{reg}")?;
        }
        write!(f, "}}")
    }
}
