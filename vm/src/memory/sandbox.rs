// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use static_assertions::const_assert;

use crate::{
    arch::{Word, DEFAULT_POOL_SIZE, WORD_BYTES},
    arena::Arena,
    error::{MemoryError, MemoryResult, VMError, VMResult},
    memory::Memory,
};

// Sandboxed addresses are `(region << REGION_SHIFT) | byte_offset`. Region 0
// is never mapped, so the null word never resolves.
const REGION_SHIFT: u32 = 40;
const OFFSET_MASK: Word = (1 << REGION_SHIFT) - 1;
const_assert!((DEFAULT_POOL_SIZE as Word) < OFFSET_MASK);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Data = 1,
    Stack = 2,
    Heap = 3,
}

impl Region {
    fn of(tag: Word) -> Option<Self> {
        match tag {
            1 => Some(Self::Data),
            2 => Some(Self::Stack),
            3 => Some(Self::Heap),
            _ => None,
        }
    }

    fn address(self, offset: usize) -> Word {
        ((self as Word) << REGION_SHIFT) | offset as Word
    }
}

/// Memory whose addresses only ever resolve into VM-owned arenas.
pub struct SandboxMemory {
    data: Arena<u8>,
    stack: Arena<Word>,
    heap: Arena<u8>,
    heap_next: usize,
}

impl SandboxMemory {
    pub fn new(pool_size: usize) -> VMResult<Self> {
        if pool_size as Word > OFFSET_MASK {
            return Err(VMError::InvalidConfig(format!(
                "pool size {} exceeds the sandbox limit of {} bytes",
                pool_size, OFFSET_MASK
            )));
        }
        Ok(Self {
            data: Arena::of_size(pool_size),
            stack: Arena::of_size(pool_size),
            heap: Arena::of_size(pool_size),
            heap_next: 0,
        })
    }

    fn resolve(address: Word, length: usize) -> MemoryResult<(Region, usize)> {
        let out_of_bounds = MemoryError::OutOfBounds { address, length };
        if address <= 0 {
            return Err(out_of_bounds);
        }
        let region = Region::of(address >> REGION_SHIFT).ok_or(out_of_bounds)?;
        Ok((region, (address & OFFSET_MASK) as usize))
    }
}

impl Memory for SandboxMemory {
    fn stack_top(&self) -> Word {
        Region::Stack.address(self.stack.len_bytes())
    }

    fn data_address(&self, offset: usize) -> Word {
        Region::Data.address(offset)
    }

    fn data_mut(&mut self) -> &mut [u8] {
        self.data.cells_mut()
    }

    fn load_word(&self, address: Word) -> MemoryResult<Word> {
        let (region, offset) = Self::resolve(address, WORD_BYTES)?;
        match region {
            Region::Data => self.data.read_word(offset),
            Region::Stack => self.stack.read_word(offset),
            Region::Heap => self.heap.read_word(offset),
        }
        .ok_or(MemoryError::OutOfBounds {
            address,
            length: WORD_BYTES,
        })
    }

    fn store_word(&mut self, address: Word, value: Word) -> MemoryResult<()> {
        let (region, offset) = Self::resolve(address, WORD_BYTES)?;
        match region {
            Region::Data => self.data.write_word(offset, value),
            Region::Stack => self.stack.write_word(offset, value),
            Region::Heap => self.heap.write_word(offset, value),
        }
        .ok_or(MemoryError::OutOfBounds {
            address,
            length: WORD_BYTES,
        })
    }

    fn load_byte(&self, address: Word) -> MemoryResult<u8> {
        let (region, offset) = Self::resolve(address, 1)?;
        match region {
            Region::Data => self.data.read_byte(offset),
            Region::Stack => self.stack.read_byte(offset),
            Region::Heap => self.heap.read_byte(offset),
        }
        .ok_or(MemoryError::OutOfBounds { address, length: 1 })
    }

    fn store_byte(&mut self, address: Word, value: u8) -> MemoryResult<()> {
        let (region, offset) = Self::resolve(address, 1)?;
        match region {
            Region::Data => self.data.write_byte(offset, value),
            Region::Stack => self.stack.write_byte(offset, value),
            Region::Heap => self.heap.write_byte(offset, value),
        }
        .ok_or(MemoryError::OutOfBounds { address, length: 1 })
    }

    fn allocate(&mut self, size: usize) -> Word {
        let start = self.heap_next.next_multiple_of(WORD_BYTES);
        match start.checked_add(size) {
            Some(end) if end <= self.heap.len_bytes() => {
                self.heap_next = end;
                Region::Heap.address(start)
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SandboxMemory;
    use crate::{
        arch::WORD_BYTES,
        error::MemoryError,
        memory::Memory,
    };

    fn memory() -> SandboxMemory {
        SandboxMemory::new(256).expect("pool size should be accepted")
    }

    #[test]
    fn null_never_resolves() {
        let memory = memory();
        assert_eq!(
            Err(MemoryError::OutOfBounds {
                address: 0,
                length: WORD_BYTES
            }),
            memory.load_word(0)
        );
        assert!(memory.load_byte(-8).is_err());
    }

    #[test]
    fn stack_top_is_one_past_the_arena() {
        let mut memory = memory();
        let top = memory.stack_top();
        assert!(memory.load_word(top).is_err());

        let slot = top - WORD_BYTES as i64;
        memory.store_word(slot, 42).expect("top slot is in bounds");
        assert_eq!(Ok(42), memory.load_word(slot));
    }

    #[test]
    fn data_is_shared_with_the_producer() {
        let mut memory = memory();
        memory.data_mut()[..3].copy_from_slice(b"hi\0");
        assert_eq!(Ok(b"hi".to_vec()), memory.read_c_string(memory.data_address(0)));
    }

    #[test]
    fn unterminated_strings_fault() {
        let mut memory = memory();
        memory.data_mut().fill(b'x');
        assert!(memory.read_c_string(memory.data_address(0)).is_err());
    }

    #[test]
    fn allocations_are_aligned_and_bounded() {
        let mut memory = memory();
        let first = memory.allocate(3);
        let second = memory.allocate(8);
        assert_ne!(0, first);
        assert_eq!(first + WORD_BYTES as i64, second);
        assert_eq!(0, memory.allocate(1024));

        memory.fill(second, 0xab, 8).expect("block is in bounds");
        assert_eq!(Ok(-0x5454545454545455), memory.load_word(second));
    }
}
