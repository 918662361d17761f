// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use core::mem::size_of;
use static_assertions::const_assert;

/// The native value unit: every register, stack slot and instruction word.
pub type Word = i64;

/// Index of a word in the instruction arena.
pub type InstructionAddress = usize;

pub const WORD_BYTES: usize = size_of::<Word>();
const_assert!(WORD_BYTES >= size_of::<usize>());
const_assert!(WORD_BYTES >= size_of::<*const u8>());

/// Capacity in bytes shared by the instruction, data and stack arenas.
pub const DEFAULT_POOL_SIZE: usize = 256 * 1024;
const_assert!(DEFAULT_POOL_SIZE % WORD_BYTES == 0);

/// Smallest pool that still fits a frame or two.
pub const MIN_POOL_SIZE: usize = 16 * WORD_BYTES;
const_assert!(MIN_POOL_SIZE <= DEFAULT_POOL_SIZE);

/// Sign-extends the low `bits` bits of `value` into a [`Word`].
pub fn sign_extend<In>(value: In, bits: usize) -> Word
where
    In: num_traits::PrimInt + num_traits::AsPrimitive<Word>,
{
    let raw: Word = value.as_();
    let unused = Word::BITS - bits as u32;
    (raw << unused) >> unused
}

#[cfg(test)]
mod tests {
    use super::sign_extend;

    #[test]
    fn extends_negative_bytes() {
        assert_eq!(-1, sign_extend(0xffu8, 8));
        assert_eq!(-128, sign_extend(0x80u8, 8));
    }

    #[test]
    fn keeps_positive_bytes() {
        assert_eq!(0x7f, sign_extend(0x7fu8, 8));
        assert_eq!(0, sign_extend(0u8, 8));
    }

    #[test]
    fn truncates_wider_inputs() {
        assert_eq!(-2, sign_extend(0x1feu32, 8));
    }
}
