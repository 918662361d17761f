// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use core::fmt;

use crate::{
    arch::{InstructionAddress, Word},
    op::{CodingError, Op},
};

/// Assembles raw instruction words from mnemonics, e.g.
/// `bytecode![IMM(10), PUSH, IMM(20), ADD, PUSH, EXIT]`. Operands are
/// written in parentheses and are not checked against the opcode.
#[macro_export]
macro_rules! bytecode {
    ($($mnemonic:ident $(($operand:expr))?),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut words: ::std::vec::Vec<$crate::arch::Word> =
            ::std::vec::Vec::new();
        $(
            words.push($crate::__paste::paste!(
                $crate::op::Op::[<$mnemonic:upper _TAG>]
            ));
            $(words.push($operand);)?
        )*
        words
    }};
}

pub fn encode_program(program: &[Op]) -> Vec<Word> {
    let mut words = Vec::with_capacity(program.len() * 2);
    for op in program {
        op.encode_into(&mut words);
    }
    words
}

/// Decodes every instruction in `words`, pairing each with its address.
pub fn disassemble(words: &[Word]) -> Result<Listing, CodingError> {
    let mut ops = vec![];
    let mut index = 0;
    while index < words.len() {
        let (op, length) = Op::decode_from(words, index)?;
        ops.push((index, op));
        index += length;
    }
    Ok(Listing(ops))
}

pub struct Listing(Vec<(InstructionAddress, Op)>);

impl Listing {
    pub fn ops(&self) -> impl Iterator<Item = &Op> {
        self.0.iter().map(|(_, op)| op)
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (address, op) in &self.0 {
            writeln!(f, "{:>6}: {}", address, op)?;
        }
        Ok(())
    }
}
