// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use crate::arch::{InstructionAddress, Word};

/// The four VM registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    /// Index of the next instruction word.
    pub pc: InstructionAddress,
    /// Address of the stack top; the stack grows toward lower addresses.
    pub sp: Word,
    /// Address of the saved frame base in the current frame.
    pub bp: Word,
    /// Accumulator.
    pub ax: Word,
}

impl Registers {
    /// The state a run starts from: empty stack, accumulator zero, first
    /// instruction.
    pub fn at_entry(stack_top: Word) -> Self {
        Self {
            pc: 0,
            sp: stack_top,
            bp: stack_top,
            ax: 0,
        }
    }
}
