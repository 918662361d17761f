// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! Thin wrappers over the host file primitives. Each returns the host's own
//! result, so failures come back as `-1` exactly as bytecode expects.

#![allow(unsafe_code)]

use std::{ffi::CStr, io};

use tracing::debug;

use crate::arch::Word;

fn report(call: &'static str, result: Word) -> Word {
    if result < 0 {
        debug!(call, error = %io::Error::last_os_error(), "host call failed");
    }
    result
}

pub fn open(path: &CStr, flags: Word) -> Word {
    let fd = unsafe { libc::open(path.as_ptr(), flags as libc::c_int) };
    report("open", fd as Word)
}

pub fn read(fd: Word, buffer: &mut [u8]) -> Word {
    let count = unsafe {
        libc::read(
            fd as libc::c_int,
            buffer.as_mut_ptr() as *mut libc::c_void,
            buffer.len(),
        )
    };
    report("read", count as Word)
}

pub fn close(fd: Word) -> Word {
    let result = unsafe { libc::close(fd as libc::c_int) };
    report("close", result as Word)
}
