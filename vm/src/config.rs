// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use crate::{
    arch::{DEFAULT_POOL_SIZE, MIN_POOL_SIZE, WORD_BYTES},
    error::{VMError, VMResult},
};

/// Construction-time settings for a [`crate::vm::VM`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VMConfig {
    /// Capacity in bytes of each arena. Rounded down to whole words.
    pub pool_size: usize,
}

impl Default for VMConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl VMConfig {
    pub fn with_pool_size(pool_size: usize) -> Self {
        Self { pool_size }
    }

    /// Checks the settings, returning the word-aligned pool size.
    pub fn validate(&self) -> VMResult<usize> {
        let aligned = self.pool_size - self.pool_size % WORD_BYTES;
        if aligned < MIN_POOL_SIZE {
            return Err(VMError::InvalidConfig(format!(
                "pool size {} is below the minimum of {} bytes",
                self.pool_size, MIN_POOL_SIZE
            )));
        }
        Ok(aligned)
    }
}
