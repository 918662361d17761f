// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use core::fmt;

use enum_tags::op_tags;
use thiserror::Error;

use crate::arch::{InstructionAddress, Word};

// Encoding: one opcode word, followed by one operand word for the ops that
// carry one. Opcode values follow declaration order starting at LEA = 0.

/// A VM operation. Binary operators pop their left operand from the stack
/// and take their right operand from the accumulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[op_tags(public, repr(Word))]
pub enum Op {
    /// `Self::Lea(n)` loads the address of the `n`th word above the frame
    /// base.
    Lea(Word),
    /// `Self::Imm(i)` loads `i` into the accumulator.
    Imm(Word),
    /// `Self::Jmp(a)` continues at instruction `a`.
    Jmp(Word),
    /// `Self::Call(a)` pushes the return address and continues at `a`.
    Call(Word),
    /// `Self::Jz(a)` continues at `a` when the accumulator is zero.
    Jz(Word),
    /// `Self::Jnz(a)` continues at `a` when the accumulator is nonzero.
    Jnz(Word),
    /// `Self::Ent(n)` opens a frame with `n` local words.
    Ent(Word),
    /// `Self::Adj(n)` discards `n` stack words.
    Adj(Word),
    /// `Self::Lev` closes the frame and returns to the caller.
    Lev,
    Li,
    Lc,
    Si,
    Sc,
    Push,
    Or,
    Xor,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Open,
    Read,
    Clos,
    Prtf,
    Malc,
    Mset,
    Mcmp,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodingError {
    #[error("unknown opcode {word} at word {index}")]
    UnknownOpcode { index: InstructionAddress, word: Word },
    #[error("stream ends at word {index}")]
    EndOfStream { index: InstructionAddress },
}

impl Op {
    pub fn operand(&self) -> Option<Word> {
        match *self {
            Self::Lea(operand)
            | Self::Imm(operand)
            | Self::Jmp(operand)
            | Self::Call(operand)
            | Self::Jz(operand)
            | Self::Jnz(operand)
            | Self::Ent(operand)
            | Self::Adj(operand) => Some(operand),
            _ => None,
        }
    }

    /// Number of words this operation occupies in the instruction arena.
    pub fn length(&self) -> usize {
        if self.operand().is_some() {
            2
        } else {
            1
        }
    }

    pub fn encode_into(&self, stream: &mut Vec<Word>) {
        stream.push(self.tag());
        if let Some(operand) = self.operand() {
            stream.push(operand);
        }
    }

    /// Decodes the operation starting at `stream[index]`, returning it with
    /// its length in words.
    pub fn decode_from(
        stream: &[Word],
        index: InstructionAddress,
    ) -> Result<(Self, usize), CodingError> {
        let word = *stream
            .get(index)
            .ok_or(CodingError::EndOfStream { index })?;
        let operand = || {
            stream
                .get(index + 1)
                .copied()
                .ok_or(CodingError::EndOfStream { index: index + 1 })
        };

        let op = match word {
            Self::LEA_TAG => Self::Lea(operand()?),
            Self::IMM_TAG => Self::Imm(operand()?),
            Self::JMP_TAG => Self::Jmp(operand()?),
            Self::CALL_TAG => Self::Call(operand()?),
            Self::JZ_TAG => Self::Jz(operand()?),
            Self::JNZ_TAG => Self::Jnz(operand()?),
            Self::ENT_TAG => Self::Ent(operand()?),
            Self::ADJ_TAG => Self::Adj(operand()?),
            Self::LEV_TAG => Self::Lev,
            Self::LI_TAG => Self::Li,
            Self::LC_TAG => Self::Lc,
            Self::SI_TAG => Self::Si,
            Self::SC_TAG => Self::Sc,
            Self::PUSH_TAG => Self::Push,
            Self::OR_TAG => Self::Or,
            Self::XOR_TAG => Self::Xor,
            Self::AND_TAG => Self::And,
            Self::EQ_TAG => Self::Eq,
            Self::NE_TAG => Self::Ne,
            Self::LT_TAG => Self::Lt,
            Self::GT_TAG => Self::Gt,
            Self::LE_TAG => Self::Le,
            Self::GE_TAG => Self::Ge,
            Self::SHL_TAG => Self::Shl,
            Self::SHR_TAG => Self::Shr,
            Self::ADD_TAG => Self::Add,
            Self::SUB_TAG => Self::Sub,
            Self::MUL_TAG => Self::Mul,
            Self::DIV_TAG => Self::Div,
            Self::MOD_TAG => Self::Mod,
            Self::OPEN_TAG => Self::Open,
            Self::READ_TAG => Self::Read,
            Self::CLOS_TAG => Self::Clos,
            Self::PRTF_TAG => Self::Prtf,
            Self::MALC_TAG => Self::Malc,
            Self::MSET_TAG => Self::Mset,
            Self::MCMP_TAG => Self::Mcmp,
            Self::EXIT_TAG => Self::Exit,
            _ => return Err(CodingError::UnknownOpcode { index, word }),
        };

        Ok((op, op.length()))
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand() {
            Some(operand) => write!(f, "{} {}", self.mnemonic(), operand),
            None => f.write_str(self.mnemonic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        arch::Word,
        op::{CodingError, Op},
    };

    #[test]
    fn opcodes_follow_declaration_order() {
        assert_eq!(0, Op::LEA_TAG);
        assert_eq!(1, Op::IMM_TAG);
        assert_eq!(13, Op::PUSH_TAG);
        assert_eq!(37, Op::EXIT_TAG);
        assert_eq!(Op::ADD_TAG, Op::Add.tag());
    }

    #[test]
    fn encodes_operands_inline() {
        let mut stream = vec![];
        Op::Imm(-5).encode_into(&mut stream);
        Op::Push.encode_into(&mut stream);
        assert_eq!(vec![Op::IMM_TAG, -5, Op::PUSH_TAG], stream);
    }

    #[test]
    fn decodes_with_length() {
        let stream = [Op::JZ_TAG, 7, Op::LEV_TAG];
        assert_eq!(Ok((Op::Jz(7), 2)), Op::decode_from(&stream, 0));
        assert_eq!(Ok((Op::Lev, 1)), Op::decode_from(&stream, 2));
    }

    #[test]
    fn rejects_unknown_opcodes() {
        let stream: [Word; 2] = [Op::PUSH_TAG, 999];
        assert_eq!(
            Err(CodingError::UnknownOpcode {
                index: 1,
                word: 999
            }),
            Op::decode_from(&stream, 1)
        );
        assert!(Op::decode_from(&[-1], 0).is_err());
    }

    #[test]
    fn reports_truncated_operands() {
        assert_eq!(
            Err(CodingError::EndOfStream { index: 1 }),
            Op::decode_from(&[Op::ADJ_TAG], 0)
        );
    }

    #[test]
    fn displays_mnemonics() {
        assert_eq!("ENT 2", Op::Ent(2).to_string());
        assert_eq!("MCMP", Op::Mcmp.to_string());
        assert_eq!("CLOS", Op::Clos.to_string());
    }
}
