// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! The only place the VM dereferences words as raw host pointers.

#![allow(unsafe_code)]

use core::{cmp::Ordering, ffi::CStr, ptr};

use crate::{
    arch::Word,
    arena::Arena,
    error::MemoryResult,
    memory::Memory,
};

/// Memory where every word is a host address. Nothing is checked: a bad
/// address from bytecode is undefined behavior in the host process.
pub struct HostMemory {
    data: Arena<u8>,
    stack: Arena<Word>,
    data_base: Word,
    stack_base: Word,
    allocations: Vec<*mut libc::c_void>,
}

impl HostMemory {
    /// # Safety
    ///
    /// Bytecode run against this memory can read and write any address in
    /// the process and call `malloc` freely. The caller must trust every
    /// program it loads as much as native code.
    pub unsafe fn new(pool_size: usize) -> Self {
        let mut data = Arena::of_size(pool_size);
        let mut stack = Arena::of_size(pool_size);
        let data_base = data.as_mut_ptr() as Word;
        let stack_base = stack.as_mut_ptr() as Word;
        Self {
            data,
            stack,
            data_base,
            stack_base,
            allocations: vec![],
        }
    }
}

impl Memory for HostMemory {
    fn stack_top(&self) -> Word {
        self.stack_base + self.stack.len_bytes() as Word
    }

    fn data_address(&self, offset: usize) -> Word {
        self.data_base + offset as Word
    }

    fn data_mut(&mut self) -> &mut [u8] {
        self.data.cells_mut()
    }

    fn load_word(&self, address: Word) -> MemoryResult<Word> {
        Ok(unsafe { (address as *const Word).read_unaligned() })
    }

    fn store_word(&mut self, address: Word, value: Word) -> MemoryResult<()> {
        unsafe { (address as *mut Word).write_unaligned(value) };
        Ok(())
    }

    fn load_byte(&self, address: Word) -> MemoryResult<u8> {
        Ok(unsafe { (address as *const u8).read() })
    }

    fn store_byte(&mut self, address: Word, value: u8) -> MemoryResult<()> {
        unsafe { (address as *mut u8).write(value) };
        Ok(())
    }

    fn allocate(&mut self, size: usize) -> Word {
        let block = unsafe { libc::malloc(size) };
        if block.is_null() {
            return 0;
        }
        self.allocations.push(block);
        block as Word
    }

    fn read_c_string(&self, address: Word) -> MemoryResult<Vec<u8>> {
        let string = unsafe { CStr::from_ptr(address as *const libc::c_char) };
        Ok(string.to_bytes().to_vec())
    }

    fn write_bytes(&mut self, address: Word, bytes: &[u8]) -> MemoryResult<()> {
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len())
        };
        Ok(())
    }

    fn fill(&mut self, address: Word, value: u8, length: usize) -> MemoryResult<()> {
        unsafe { ptr::write_bytes(address as *mut u8, value, length) };
        Ok(())
    }

    fn compare(&self, a: Word, b: Word, length: usize) -> MemoryResult<Ordering> {
        let result = unsafe {
            libc::memcmp(
                a as *const libc::c_void,
                b as *const libc::c_void,
                length,
            )
        };
        Ok(result.cmp(&0))
    }
}

impl Drop for HostMemory {
    fn drop(&mut self) {
        for block in self.allocations.drain(..) {
            unsafe { libc::free(block) };
        }
    }
}

#[cfg(test)]
mod tests {
    use core::cmp::Ordering;

    use super::HostMemory;
    use crate::{arch::WORD_BYTES, memory::Memory};

    #[test]
    fn addresses_are_real_pointers() {
        let mut memory = unsafe { HostMemory::new(256) };
        memory.data_mut()[..4].copy_from_slice(b"abc\0");
        let address = memory.data_address(0);
        assert_eq!(Ok(b'b'), memory.load_byte(address + 1));
        assert_eq!(Ok(b"abc".to_vec()), memory.read_c_string(address));
    }

    #[test]
    fn stack_words_round_trip() {
        let mut memory = unsafe { HostMemory::new(256) };
        let slot = memory.stack_top() - WORD_BYTES as i64;
        memory.store_word(slot, -7).expect("host stores never fail");
        assert_eq!(Ok(-7), memory.load_word(slot));
    }

    #[test]
    fn malloc_blocks_are_usable() {
        let mut memory = unsafe { HostMemory::new(256) };
        let block = memory.allocate(16);
        assert_ne!(0, block);
        memory.fill(block, 0, 16).expect("host fills never fail");
        let zeros = memory.data_address(0);
        assert_eq!(Ok(Ordering::Equal), memory.compare(block, zeros, 16));
    }
}
