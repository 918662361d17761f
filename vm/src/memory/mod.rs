// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! Address spaces the dispatch loop and host bridge work against.
//!
//! [`SandboxMemory`] resolves every address through the VM's own arenas
//! and rejects anything else. [`HostMemory`] treats words as raw host
//! pointers, so bytecode can reach any memory in the process; it can only
//! be constructed through an `unsafe` function.

use core::cmp::Ordering;

use crate::{arch::Word, error::MemoryResult};

mod host;
mod sandbox;

pub use host::HostMemory;
pub use sandbox::SandboxMemory;

/// An address space holding the data and stack arenas.
pub trait Memory {
    /// Address just past the highest stack word.
    fn stack_top(&self) -> Word;

    /// Address of byte `offset` of the data arena.
    fn data_address(&self, offset: usize) -> Word;

    fn data_mut(&mut self) -> &mut [u8];

    fn load_word(&self, address: Word) -> MemoryResult<Word>;

    fn store_word(&mut self, address: Word, value: Word) -> MemoryResult<()>;

    fn load_byte(&self, address: Word) -> MemoryResult<u8>;

    fn store_byte(&mut self, address: Word, value: u8) -> MemoryResult<()>;

    /// Returns a fresh block of `size` bytes, or 0 when none is available.
    fn allocate(&mut self, size: usize) -> Word;

    /// Reads bytes up to, not including, the first NUL.
    fn read_c_string(&self, address: Word) -> MemoryResult<Vec<u8>> {
        let mut bytes = vec![];
        let mut cursor = address;
        loop {
            match self.load_byte(cursor)? {
                0 => return Ok(bytes),
                byte => bytes.push(byte),
            }
            cursor = cursor.wrapping_add(1);
        }
    }

    fn write_bytes(&mut self, address: Word, bytes: &[u8]) -> MemoryResult<()> {
        for (i, &byte) in bytes.iter().enumerate() {
            self.store_byte(address.wrapping_add(i as Word), byte)?;
        }
        Ok(())
    }

    fn fill(&mut self, address: Word, value: u8, length: usize) -> MemoryResult<()> {
        for i in 0..length {
            self.store_byte(address.wrapping_add(i as Word), value)?;
        }
        Ok(())
    }

    /// Compares two byte ranges lexicographically, as unsigned bytes.
    fn compare(&self, a: Word, b: Word, length: usize) -> MemoryResult<Ordering> {
        for i in 0..length {
            let left = self.load_byte(a.wrapping_add(i as Word))?;
            let right = self.load_byte(b.wrapping_add(i as Word))?;
            match left.cmp(&right) {
                Ordering::Equal => {}
                unequal => return Ok(unequal),
            }
        }
        Ok(Ordering::Equal)
    }
}
