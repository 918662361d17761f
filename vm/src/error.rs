// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use thiserror::Error;

use crate::{
    arch::{InstructionAddress, Word},
    op::CodingError,
};

/// An address that does not resolve to memory the VM may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("address {address:#x} (+{length} bytes) is outside every arena")]
    OutOfBounds { address: Word, length: usize },
}

pub type MemoryResult<T> = Result<T, MemoryError>;

/// Conditions that stop the dispatch loop. None of these is ever reported
/// as an exit status.
#[derive(Debug, Error)]
pub enum VMError {
    #[error("illegal opcode {word} at instruction {pc}")]
    IllegalOpcode { pc: InstructionAddress, word: Word },
    #[error("{op} by zero at instruction {pc}")]
    ArithmeticFault {
        pc: InstructionAddress,
        op: &'static str,
    },
    #[error("out-of-bounds access: {0}")]
    OutOfBoundsAccess(#[from] MemoryError),
    #[error("instruction address {0} is outside the instruction arena")]
    InstructionOutOfBounds(InstructionAddress),
    #[error("jump at instruction {pc} targets {target}, outside the instruction arena")]
    InvalidJumpTarget { pc: InstructionAddress, target: Word },
    #[error("program of {words} words does not fit in {capacity} words")]
    ProgramTooLarge { words: usize, capacity: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<CodingError> for VMError {
    fn from(value: CodingError) -> Self {
        match value {
            CodingError::UnknownOpcode { index, word } => {
                VMError::IllegalOpcode { pc: index, word }
            }
            CodingError::EndOfStream { index } => {
                VMError::InstructionOutOfBounds(index)
            }
        }
    }
}

pub type VMResult<T = ()> = Result<T, VMError>;
