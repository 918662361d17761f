// Copyright (C) 2024 Ethan Uppal and Utku Melemetci. All rights reserved.

use std::io::{self, Write};

use tracing::{debug, info, trace, warn};

use crate::{
    arch::{sign_extend, InstructionAddress, Word, WORD_BYTES},
    arena::Arena,
    config::VMConfig,
    error::{VMError, VMResult},
    memory::{HostMemory, Memory, SandboxMemory},
    op::Op,
    registers::Registers,
};

mod bridge;

/// Outcome of executing a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// `EXIT` ran; carries the word at the stack top.
    Exit(Word),
}

/// One VM instance: the instruction arena, an address space holding the
/// data and stack arenas, and the register file.
pub struct VM<M: Memory = SandboxMemory> {
    text: Arena<Word>,
    memory: M,
    registers: Registers,
    output: Box<dyn Write>,
}

impl VM<SandboxMemory> {
    /// Creates a [`VM`] whose addresses never leave its own arenas.
    pub fn new(config: VMConfig) -> VMResult<Self> {
        let pool_size = config.validate()?;
        Ok(Self::with_memory(pool_size, SandboxMemory::new(pool_size)?))
    }
}

impl VM<HostMemory> {
    /// Creates a [`VM`] whose words are raw host addresses.
    ///
    /// # Safety
    ///
    /// See [`HostMemory::new`]: loaded bytecode gets unrestricted access to
    /// the host process's memory.
    #[allow(unsafe_code)]
    pub unsafe fn with_host_memory(config: VMConfig) -> VMResult<Self> {
        let pool_size = config.validate()?;
        Ok(Self::with_memory(pool_size, unsafe { HostMemory::new(pool_size) }))
    }
}

impl<M: Memory> VM<M> {
    fn with_memory(pool_size: usize, memory: M) -> Self {
        let registers = Registers::at_entry(memory.stack_top());
        Self {
            text: Arena::of_size(pool_size),
            memory,
            registers,
            output: Box::new(io::stdout()),
        }
    }

    /// Redirects `PRTF` output, which goes to stdout by default.
    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    /// Copies `program` into the instruction arena and resets the registers
    /// to their entry state.
    pub fn load(&mut self, program: &[Word]) -> VMResult {
        let capacity = self.text.cells().len();
        if program.len() > capacity {
            return Err(VMError::ProgramTooLarge {
                words: program.len(),
                capacity,
            });
        }

        let cells = self.text.cells_mut();
        cells[..program.len()].copy_from_slice(program);
        cells[program.len()..].fill(0);
        self.reset();

        debug!(words = program.len(), "program loaded");
        Ok(())
    }

    pub fn reset(&mut self) {
        self.registers = Registers::at_entry(self.memory.stack_top());
    }

    pub fn registers(&self) -> Registers {
        self.registers
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// The data arena, for seeding globals and string literals before a run.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut()
    }

    /// The address bytecode uses for byte `offset` of the data arena.
    pub fn data_address(&self, offset: usize) -> Word {
        self.memory.data_address(offset)
    }

    /// Runs the [`VM`] until `EXIT`, returning the exit status.
    pub fn run(&mut self) -> VMResult<Word> {
        loop {
            match self.step() {
                Ok(Step::Continue) => {}
                Ok(Step::Exit(status)) => return Ok(status),
                Err(error) => {
                    warn!(%error, pc = self.registers.pc, "execution aborted");
                    return Err(error);
                }
            }
        }
    }

    /// Fetches, decodes and executes one instruction.
    pub fn step(&mut self) -> VMResult<Step> {
        let pc = self.registers.pc;
        let (op, length) = Op::decode_from(self.text.cells(), pc)?;
        trace!(
            pc,
            %op,
            ax = self.registers.ax,
            sp = self.registers.sp,
            bp = self.registers.bp,
            "step"
        );
        self.registers.pc = pc + length;

        match op {
            Op::Imm(value) => self.registers.ax = value,
            Op::Lea(offset) => {
                self.registers.ax = self.registers.bp.wrapping_add(words(offset));
            }
            Op::Lc => {
                let byte = self.memory.load_byte(self.registers.ax)?;
                self.registers.ax = sign_extend(byte, 8);
            }
            Op::Li => {
                self.registers.ax = self.memory.load_word(self.registers.ax)?;
            }
            Op::Sc => {
                let address = self.pop()?;
                self.memory.store_byte(address, self.registers.ax as u8)?;
            }
            Op::Si => {
                let address = self.pop()?;
                self.memory.store_word(address, self.registers.ax)?;
            }
            Op::Push => self.push(self.registers.ax)?,
            Op::Jmp(target) => self.jump(pc, target)?,
            Op::Jz(target) => {
                if self.registers.ax == 0 {
                    self.jump(pc, target)?;
                }
            }
            Op::Jnz(target) => {
                if self.registers.ax != 0 {
                    self.jump(pc, target)?;
                }
            }
            Op::Call(target) => {
                self.push(self.registers.pc as Word)?;
                self.jump(pc, target)?;
            }
            Op::Ent(locals) => {
                self.push(self.registers.bp)?;
                self.registers.bp = self.registers.sp;
                self.registers.sp = self.registers.sp.wrapping_sub(words(locals));
            }
            Op::Adj(count) => {
                self.registers.sp = self.registers.sp.wrapping_add(words(count));
            }
            Op::Lev => {
                self.registers.sp = self.registers.bp;
                self.registers.bp = self.pop()?;
                let return_address = self.pop()?;
                self.jump(pc, return_address)?;
            }
            Op::Or => self.binary(|left, right| left | right)?,
            Op::Xor => self.binary(|left, right| left ^ right)?,
            Op::And => self.binary(|left, right| left & right)?,
            Op::Eq => self.binary(|left, right| (left == right) as Word)?,
            Op::Ne => self.binary(|left, right| (left != right) as Word)?,
            Op::Lt => self.binary(|left, right| (left < right) as Word)?,
            Op::Gt => self.binary(|left, right| (left > right) as Word)?,
            Op::Le => self.binary(|left, right| (left <= right) as Word)?,
            Op::Ge => self.binary(|left, right| (left >= right) as Word)?,
            Op::Shl => self.binary(|left, right| left.wrapping_shl(right as u32))?,
            Op::Shr => self.binary(|left, right| left.wrapping_shr(right as u32))?,
            Op::Add => self.binary(Word::wrapping_add)?,
            Op::Sub => self.binary(Word::wrapping_sub)?,
            Op::Mul => self.binary(Word::wrapping_mul)?,
            Op::Div | Op::Mod if self.registers.ax == 0 => {
                return Err(VMError::ArithmeticFault {
                    pc,
                    op: if op == Op::Div { "division" } else { "modulo" },
                });
            }
            Op::Div => self.binary(Word::wrapping_div)?,
            Op::Mod => self.binary(Word::wrapping_rem)?,
            Op::Open => self.open()?,
            Op::Read => self.read()?,
            Op::Clos => self.close()?,
            Op::Prtf => self.printf()?,
            Op::Malc => self.malloc()?,
            Op::Mset => self.memset()?,
            Op::Mcmp => self.memcmp()?,
            Op::Exit => {
                let status = self.memory.load_word(self.registers.sp)?;
                info!(status, "exit");
                return Ok(Step::Exit(status));
            }
        }

        Ok(Step::Continue)
    }

    fn push(&mut self, value: Word) -> VMResult {
        let sp = self.registers.sp.wrapping_sub(WORD_BYTES as Word);
        self.memory.store_word(sp, value)?;
        self.registers.sp = sp;
        Ok(())
    }

    fn pop(&mut self) -> VMResult<Word> {
        let value = self.memory.load_word(self.registers.sp)?;
        self.registers.sp = self.registers.sp.wrapping_add(WORD_BYTES as Word);
        Ok(value)
    }

    /// Pops the left operand and combines it with the accumulator.
    fn binary(&mut self, apply: impl FnOnce(Word, Word) -> Word) -> VMResult {
        let left = self.pop()?;
        self.registers.ax = apply(left, self.registers.ax);
        Ok(())
    }

    fn jump(&mut self, pc: InstructionAddress, target: Word) -> VMResult {
        match usize::try_from(target) {
            Ok(target) if target < self.text.cells().len() => {
                self.registers.pc = target;
                Ok(())
            }
            _ => Err(VMError::InvalidJumpTarget { pc, target }),
        }
    }
}

/// Byte distance covered by `count` stack words.
fn words(count: Word) -> Word {
    count.wrapping_mul(WORD_BYTES as Word)
}
