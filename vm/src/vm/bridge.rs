// Copyright (C) 2024 Ethan Uppal. All rights reserved.

// Host bridge intrinsics. Arguments stay on the stack (slot 0 is the top)
// and the result lands in the accumulator. Host failures are values, never
// faults.

use core::cmp::Ordering;
use std::ffi::CString;

use tracing::debug;

use crate::{
    arch::{Word, WORD_BYTES},
    error::{MemoryError, VMError, VMResult},
    memory::Memory,
    printf::{self, FormatError},
    sys,
    vm::VM,
};

/// `PRTF` forwards the format string plus at most this many arguments.
pub const PRINTF_MAX_ARGS: usize = 5;

fn length_of(address: Word, raw: Word) -> Result<usize, MemoryError> {
    usize::try_from(raw).map_err(|_| MemoryError::OutOfBounds {
        address,
        length: raw as usize,
    })
}

impl<M: Memory> VM<M> {
    fn stack_arg(&self, slot: usize) -> VMResult<Word> {
        let offset = (slot as Word).wrapping_mul(WORD_BYTES as Word);
        let address = self.registers.sp.wrapping_add(offset);
        Ok(self.memory.load_word(address)?)
    }

    pub(super) fn open(&mut self) -> VMResult {
        let path = self.memory.read_c_string(self.stack_arg(1)?)?;
        let flags = self.stack_arg(0)?;
        self.registers.ax = match CString::new(path) {
            Ok(path) => {
                debug!(?path, flags, "OPEN");
                sys::open(&path, flags)
            }
            Err(_) => -1,
        };
        Ok(())
    }

    pub(super) fn read(&mut self) -> VMResult {
        let fd = self.stack_arg(2)?;
        let buffer = self.stack_arg(1)?;
        let requested = self.stack_arg(0)?;
        if requested < 0 {
            self.registers.ax = -1;
            return Ok(());
        }

        // never more than one arena's worth per call; short reads are legal
        let mut scratch =
            vec![0; (requested as usize).min(self.text.len_bytes())];
        let count = sys::read(fd, &mut scratch);
        if count > 0 {
            self.memory.write_bytes(buffer, &scratch[..count as usize])?;
        }
        debug!(fd, requested, count, "READ");
        self.registers.ax = count;
        Ok(())
    }

    pub(super) fn close(&mut self) -> VMResult {
        let fd = self.stack_arg(0)?;
        debug!(fd, "CLOS");
        self.registers.ax = sys::close(fd);
        Ok(())
    }

    /// The argument count is the operand of the `ADJ` the caller emits right
    /// after `PRTF`; it is read but not consumed.
    pub(super) fn printf(&mut self) -> VMResult {
        let operand_index = self.registers.pc + 1;
        let count = *self
            .text
            .cells()
            .get(operand_index)
            .ok_or(VMError::InstructionOutOfBounds(operand_index))?;
        if count < 1 {
            debug!(count, "PRTF without a format string");
            self.registers.ax = -1;
            return Ok(());
        }

        let count = count as usize;
        let format = self.memory.read_c_string(self.stack_arg(count - 1)?)?;
        let args = (0..(count - 1).min(PRINTF_MAX_ARGS))
            .map(|i| self.stack_arg(count - 2 - i))
            .collect::<VMResult<Vec<Word>>>()?;

        let rendered = match printf::format(&self.memory, &format, &args) {
            Ok(rendered) => rendered,
            Err(FormatError::Memory(error)) => return Err(error.into()),
            Err(error @ FormatError::Overflow) => {
                debug!(%error, "PRTF failed");
                self.registers.ax = -1;
                return Ok(());
            }
        };
        self.registers.ax = match self
            .output
            .write_all(&rendered)
            .and_then(|()| self.output.flush())
        {
            Ok(()) => rendered.len() as Word,
            Err(error) => {
                debug!(%error, "PRTF output failed");
                -1
            }
        };
        Ok(())
    }

    pub(super) fn malloc(&mut self) -> VMResult {
        let size = self.stack_arg(0)?;
        self.registers.ax = match usize::try_from(size) {
            Ok(size) => self.memory.allocate(size),
            Err(_) => 0,
        };
        debug!(size, address = self.registers.ax, "MALC");
        Ok(())
    }

    pub(super) fn memset(&mut self) -> VMResult {
        let address = self.stack_arg(2)?;
        let value = self.stack_arg(1)? as u8;
        let length = length_of(address, self.stack_arg(0)?)?;
        self.memory.fill(address, value, length)?;
        self.registers.ax = address;
        Ok(())
    }

    pub(super) fn memcmp(&mut self) -> VMResult {
        let a = self.stack_arg(2)?;
        let b = self.stack_arg(1)?;
        let length = length_of(a, self.stack_arg(0)?)?;
        self.registers.ax = match self.memory.compare(a, b, length)? {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, process};

    use crate::{
        arch::Word,
        bytecode,
        config::VMConfig,
        error::VMError,
        vm::{tests::SharedBuffer, VM},
    };

    fn vm() -> VM {
        VM::new(VMConfig::with_pool_size(4096)).expect("config should be valid")
    }

    fn seed(vm: &mut VM, offset: usize, bytes: &[u8]) -> Word {
        vm.data_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
        vm.data_address(offset)
    }

    fn zero_a_fresh_block(zeros: Word) -> Vec<Word> {
        bytecode![
            IMM(16), PUSH, MALC, ADJ(1),
            PUSH, IMM(0), PUSH, IMM(16), PUSH, MSET, ADJ(3),
            PUSH, IMM(zeros), PUSH, IMM(16), PUSH, MCMP, ADJ(3),
            PUSH, EXIT,
        ]
    }

    #[test]
    fn malloc_memset_memcmp() {
        let mut vm = vm();
        let zeros = vm.data_address(64);
        vm.load(&zero_a_fresh_block(zeros))
            .expect("program should fit");

        for _ in 0..4 {
            vm.step().expect("MALC should run");
        }
        let block = vm.registers().ax;
        assert_ne!(0, block);

        assert_eq!(0, vm.run().expect("program should exit"));
    }

    #[test]
    fn malloc_memset_memcmp_on_the_host() {
        #[allow(unsafe_code)]
        let mut vm = unsafe { VM::with_host_memory(VMConfig::with_pool_size(4096)) }
            .expect("config should be valid");
        let zeros = vm.data_address(64);
        vm.load(&zero_a_fresh_block(zeros))
            .expect("program should fit");
        assert_eq!(0, vm.run().expect("program should exit"));
    }

    #[test]
    fn memcmp_orders_bytes() {
        let mut vm = vm();
        let a = seed(&mut vm, 0, b"abc");
        let b = seed(&mut vm, 8, b"abd");
        let program = bytecode![
            IMM(a), PUSH, IMM(b), PUSH, IMM(3), PUSH, MCMP, ADJ(3),
            PUSH, EXIT,
        ];
        vm.load(&program).expect("program should fit");
        assert_eq!(-1, vm.run().expect("program should exit"));
    }

    #[test]
    fn malloc_failure_is_a_null_result() {
        let mut vm = vm();
        let program = bytecode![IMM(1 << 30), PUSH, MALC, ADJ(1), PUSH, EXIT];
        vm.load(&program).expect("program should fit");
        assert_eq!(0, vm.run().expect("program should exit"));
    }

    #[test]
    fn printf_reads_arguments_below_the_format() {
        let mut vm = vm();
        let format = seed(&mut vm, 0, b"%s=%d, %c\n\0");
        let name = seed(&mut vm, 16, b"answer\0");
        let output = SharedBuffer::default();
        vm.set_output(Box::new(output.clone()));

        let program = bytecode![
            IMM(format), PUSH,
            IMM(name), PUSH,
            IMM(42), PUSH,
            IMM(b'!' as Word), PUSH,
            PRTF, ADJ(4),
            PUSH, EXIT,
        ];
        vm.load(&program).expect("program should fit");

        assert_eq!(13, vm.run().expect("program should exit"));
        assert_eq!(b"answer=42, !\n".to_vec(), *output.0.borrow());
    }

    #[test]
    fn printf_forwards_at_most_five_arguments() {
        let mut vm = vm();
        let format = seed(&mut vm, 0, b"%d%d%d%d%d%d\0");
        let output = SharedBuffer::default();
        vm.set_output(Box::new(output.clone()));

        let mut program = bytecode![IMM(format), PUSH];
        for digit in 1..=6 {
            program.extend(bytecode![IMM(digit), PUSH]);
        }
        program.extend(bytecode![PRTF, ADJ(7), PUSH, EXIT]);
        vm.load(&program).expect("program should fit");

        assert_eq!(6, vm.run().expect("program should exit"));
        assert_eq!(b"123450".to_vec(), *output.0.borrow());
    }

    fn printf_into_buffer(format: &[u8], args: &[Word]) -> (Word, Vec<u8>) {
        let mut vm = vm();
        let format = seed(&mut vm, 0, format);
        let output = SharedBuffer::default();
        vm.set_output(Box::new(output.clone()));

        let mut program = bytecode![IMM(format), PUSH];
        for &arg in args {
            program.extend(bytecode![IMM(arg), PUSH]);
        }
        program.extend(bytecode![PRTF, ADJ(args.len() as Word + 1), PUSH, EXIT]);
        vm.load(&program).expect("program should fit");

        let status = vm.run().expect("program should exit");
        let written = output.0.borrow().clone();
        (status, written)
    }

    #[test]
    fn printf_with_a_huge_star_width_fails_softly() {
        assert_eq!((-1, vec![]), printf_into_buffer(b"%*d\n\0", &[1 << 50, 7]));
    }

    #[test]
    fn printf_with_a_huge_literal_width_fails_softly() {
        assert_eq!(
            (-1, vec![]),
            printf_into_buffer(b"%999999999999999999d\0", &[7])
        );
    }

    #[test]
    fn printf_with_ordinary_widths_prints() {
        assert_eq!((3, b"[7]".to_vec()), printf_into_buffer(b"[%d]\0", &[7]));
    }

    #[test]
    fn printf_needs_a_following_operand() {
        let mut vm = VM::new(VMConfig::with_pool_size(128))
            .expect("config should be valid");
        let mut program = bytecode![IMM(0), PUSH, JMP(15)];
        program.resize(15, 0);
        program.extend(bytecode![PRTF]);
        vm.load(&program).expect("program should fit");
        assert!(matches!(
            vm.run(),
            Err(VMError::InstructionOutOfBounds(17))
        ));
    }

    #[test]
    fn open_read_close_a_file() {
        let path = std::env::temp_dir()
            .join(format!("stackvm-bridge-{}.txt", process::id()));
        fs::write(&path, b"hello bytecode").expect("temp file should be writable");

        let mut vm = vm();
        let mut c_path = path.to_str().expect("temp path should be utf-8").as_bytes().to_vec();
        c_path.push(0);
        let path_address = seed(&mut vm, 0, &c_path);
        let buffer = vm.data_address(512);

        let program = bytecode![
            IMM(path_address), PUSH, IMM(libc::O_RDONLY as Word), PUSH, OPEN, ADJ(2),
            PUSH,                                           // fd stays on the stack
            PUSH, IMM(buffer), PUSH, IMM(5), PUSH, READ, ADJ(3),
            PUSH,                                           // bytes read
            LEA(-1), LI, PUSH, CLOS, ADJ(1),
            EXIT,
        ];
        vm.load(&program).expect("program should fit");

        let status = vm.run();
        fs::remove_file(&path).expect("temp file should be removable");
        assert_eq!(5, status.expect("program should exit"));

        let read = &vm.data_mut()[512..517];
        assert_eq!(b"hello", read);
    }

    #[test]
    fn open_failure_is_a_negative_result() {
        let mut vm = vm();
        let path = seed(&mut vm, 0, b"/no/such/stackvm/file\0");
        let program = bytecode![
            IMM(path), PUSH, IMM(0), PUSH, OPEN, ADJ(2), PUSH, EXIT,
        ];
        vm.load(&program).expect("program should fit");
        assert_eq!(-1, vm.run().expect("program should exit"));
    }

    #[test]
    fn sandboxed_bridge_rejects_wild_buffers() {
        let mut vm = vm();
        let program = bytecode![
            IMM(0x10), PUSH, IMM(0), PUSH, IMM(8), PUSH, MSET, ADJ(3), PUSH, EXIT,
        ];
        vm.load(&program).expect("program should fit");
        assert!(matches!(vm.run(), Err(VMError::OutOfBoundsAccess(_))));
    }
}
