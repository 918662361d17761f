// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use crate::arch::{Word, WORD_BYTES};

/// Element type of an [`Arena`], addressable a byte at a time.
pub trait Cell: Copy + Default + 'static {
    const BYTES: usize;

    fn byte(self, index: usize) -> u8;

    fn with_byte(self, index: usize, value: u8) -> Self;
}

impl Cell for u8 {
    const BYTES: usize = 1;

    fn byte(self, _index: usize) -> u8 {
        self
    }

    fn with_byte(self, _index: usize, value: u8) -> Self {
        value
    }
}

impl Cell for Word {
    const BYTES: usize = WORD_BYTES;

    fn byte(self, index: usize) -> u8 {
        self.to_ne_bytes()[index]
    }

    fn with_byte(self, index: usize, value: u8) -> Self {
        let mut bytes = self.to_ne_bytes();
        bytes[index] = value;
        Word::from_ne_bytes(bytes)
    }
}

/// A fixed-capacity, zero-filled region. Never resized after creation.
pub struct Arena<T: Cell> {
    cells: Box<[T]>,
}

impl<T: Cell> Arena<T> {
    /// Allocates `capacity_bytes / T::BYTES` zeroed cells.
    pub fn of_size(capacity_bytes: usize) -> Self {
        Self {
            cells: vec![T::default(); capacity_bytes / T::BYTES]
                .into_boxed_slice(),
        }
    }

    pub fn len_bytes(&self) -> usize {
        self.cells.len() * T::BYTES
    }

    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [T] {
        &mut self.cells
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.cells.as_mut_ptr()
    }

    pub fn read_byte(&self, offset: usize) -> Option<u8> {
        self.cells
            .get(offset / T::BYTES)
            .map(|cell| cell.byte(offset % T::BYTES))
    }

    pub fn write_byte(&mut self, offset: usize, value: u8) -> Option<()> {
        let cell = self.cells.get_mut(offset / T::BYTES)?;
        *cell = cell.with_byte(offset % T::BYTES, value);
        Some(())
    }

    pub fn read_word(&self, offset: usize) -> Option<Word> {
        if offset.checked_add(WORD_BYTES)? > self.len_bytes() {
            return None;
        }
        let mut bytes = [0; WORD_BYTES];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.read_byte(offset + i)?;
        }
        Some(Word::from_ne_bytes(bytes))
    }

    pub fn write_word(&mut self, offset: usize, value: Word) -> Option<()> {
        if offset.checked_add(WORD_BYTES)? > self.len_bytes() {
            return None;
        }
        for (i, byte) in value.to_ne_bytes().into_iter().enumerate() {
            self.write_byte(offset + i, byte)?;
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::Arena;
    use crate::arch::{Word, WORD_BYTES};

    #[test]
    fn starts_zeroed() {
        let arena = Arena::<Word>::of_size(64);
        assert_eq!(64 / WORD_BYTES, arena.cells().len());
        assert!(arena.cells().iter().all(|&cell| cell == 0));
    }

    #[test]
    fn word_arena_is_byte_addressable() {
        let mut arena = Arena::<Word>::of_size(32);
        arena.write_word(8, -2).expect("in bounds");
        assert_eq!(Some(-2), arena.read_word(8));
        assert_eq!(-2, arena.cells()[1]);

        arena.write_byte(16, 0x7f).expect("in bounds");
        assert_eq!(Some(0x7f), arena.read_byte(16));
    }

    #[test]
    fn byte_arena_holds_unaligned_words() {
        let mut arena = Arena::<u8>::of_size(32);
        arena.write_word(3, 0x0102_0304).expect("in bounds");
        assert_eq!(Some(0x0102_0304), arena.read_word(3));
    }

    #[test]
    fn rejects_accesses_past_the_end() {
        let mut arena = Arena::<u8>::of_size(16);
        assert_eq!(None, arena.read_word(9));
        assert_eq!(None, arena.write_byte(16, 1));
        assert_eq!(None, arena.read_word(usize::MAX));
    }
}
