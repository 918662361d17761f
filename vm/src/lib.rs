// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

#![deny(unsafe_code)]

pub mod arch;
pub mod arena;
pub mod config;
pub mod error;
pub mod memory;
pub mod op;
pub mod printf;
pub mod program;
pub mod registers;
mod sys;
pub mod vm;

#[doc(hidden)]
pub use paste as __paste;

pub use config::VMConfig;
pub use error::{VMError, VMResult};
pub use vm::{Step, VM};
