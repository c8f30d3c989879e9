use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::common::{Variable, FRAME_POINTER, STACK_POINTER};

/// Spill slots are one machine word.
pub const WORD_SIZE: u32 = 4;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, EnumString,
)]
pub enum Register {
    #[strum(to_string = "$s0")]
    S0,
    #[strum(to_string = "$s1")]
    S1,
    #[strum(to_string = "$s2")]
    S2,
    #[strum(to_string = "$s3")]
    S3,
    #[strum(to_string = "$s4")]
    S4,
    #[strum(to_string = "$s5")]
    S5,
    #[strum(to_string = "$s6")]
    S6,
    #[strum(to_string = "$s7")]
    S7,
    #[strum(to_string = "$t0")]
    T0,
    #[strum(to_string = "$t1")]
    T1,
    #[strum(to_string = "$t2")]
    T2,
    #[strum(to_string = "$t3")]
    T3,
    #[strum(to_string = "$t4")]
    T4,
    #[strum(to_string = "$t5")]
    T5,
    #[strum(to_string = "$t6")]
    T6,
    #[strum(to_string = "$t7")]
    T7,
    #[strum(to_string = "$t8")]
    T8,
    #[strum(to_string = "$t9")]
    T9,
    #[strum(to_string = "$sp")]
    Sp,
    #[strum(to_string = "$fp")]
    Fp,
}

use Register::*;

/// Registers a palette may draw from, in preference order.
static ALLOCATABLE: [Register; 15] = [S0, S1, S2, S3, S4, S5, S6, S7, T0, T1, T2, T3, T4, T5, T6];

/// Registers that hold spilled variables between their reload and use.
static SCRATCH: [Register; 3] = [T7, T8, T9];

static PSEUDO_REGISTERS: Lazy<HashMap<&'static str, Register>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(STACK_POINTER, Sp);
    m.insert(FRAME_POINTER, Fp);
    m
});

/// Machine register a pseudo-variable is bound to.
pub fn pseudo_register(variable: &Variable) -> Option<Register> {
    PSEUDO_REGISTERS.get(variable.name()).copied()
}

impl Register {
    pub fn is_reserved(self) -> bool {
        SCRATCH.contains(&self) || PSEUDO_REGISTERS.values().any(|&r| r == self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("register {0} is reserved and cannot be allocated")]
    ReservedRegister(Register),

    #[error("register {0} appears twice in the palette")]
    DuplicateRegister(Register),

    #[error("palette of {requested} registers requested, at most {available} are available")]
    PaletteTooLarge { requested: usize, available: usize },
}

/// The physical registers the allocator colors with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    registers: Vec<Register>,
}

impl Palette {
    pub fn new(registers: impl IntoIterator<Item = Register>) -> Result<Self, Error> {
        let mut seen = HashSet::new();
        let mut palette = Vec::new();
        for register in registers {
            if register.is_reserved() {
                return Err(Error::ReservedRegister(register));
            }
            if !seen.insert(register) {
                return Err(Error::DuplicateRegister(register));
            }
            palette.push(register);
        }

        Ok(Palette {
            registers: palette,
        })
    }

    /// The first `k` allocatable registers.
    pub fn with_size(k: usize) -> Result<Self, Error> {
        if k > ALLOCATABLE.len() {
            return Err(Error::PaletteTooLarge {
                requested: k,
                available: ALLOCATABLE.len(),
            });
        }
        Self::new(ALLOCATABLE[..k].iter().copied())
    }

    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    pub fn scratch(&self) -> &[Register] {
        &SCRATCH
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

impl Default for Palette {
    /// `$s0` through `$s7`.
    fn default() -> Self {
        Palette {
            registers: ALLOCATABLE[..8].to_vec(),
        }
    }
}

/// Stack space a function reserves for its spilled variables.
#[derive(Debug, Default, Clone)]
pub struct Frame {
    size: u32,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset from `@stack` of a fresh, word-aligned spill slot.
    pub fn alloc_spill(&mut self) -> i32 {
        let offset = self.size;
        self.size += WORD_SIZE;
        offset as i32
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

/// Final variable to register assignment of one function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterMap {
    registers: HashMap<Variable, Register>,
    frame_size: u32,
}

impl RegisterMap {
    pub fn new(registers: HashMap<Variable, Register>, frame_size: u32) -> Self {
        RegisterMap {
            registers,
            frame_size,
        }
    }

    pub fn get(&self, variable: &Variable) -> Option<Register> {
        pseudo_register(variable).or_else(|| self.registers.get(variable).copied())
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Register)> {
        self.registers.iter()
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}
