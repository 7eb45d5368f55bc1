//! x86-64 JIT backend.
//!
//! Lowers a VM program to native code in three phases: a single linear
//! emission pass per block that records forward branch fixups keyed on the
//! target block, a patch pass that resolves every fixup to a rel32
//! displacement once all blocks are laid out, and installation of the byte
//! buffer into an executable memory region.
//!
//! Inside emitted code the register roles are fixed: RAX and RCX are
//! scratch, RSI holds the base of the VM register array, RDX the base of
//! the locals array. After every lowered instruction the logical
//! accumulator value is written back to `registers[0]` in memory, so the
//! state visible at block boundaries matches the VM interpreter's exactly.
//! The blob checks no bounds once entered; callers size the arrays.

use std::io;

use thiserror::Error;

use crate::vm::program::{BlockId, Instruction, Program};

mod codegen;
#[cfg(unix)]
pub mod memory;

pub use self::codegen::{Assembler, CodeBuffer, Reg};

/// Fixed machine-register roles inside emitted code.
mod regs {
    use super::Reg;

    pub const SCRATCH0: Reg = Reg::Rax;
    pub const SCRATCH1: Reg = Reg::Rcx;
    pub const REGISTERS: Reg = Reg::Rsi;
    pub const LOCALS: Reg = Reg::Rdx;
}

/// Compile-time failures. Once entered, emitted code checks nothing.
#[derive(Debug, Error)]
pub enum JitError {
    #[error("jump displacement to block {target} does not fit in 32 bits")]
    DisplacementOverflow { target: BlockId },
    #[error("slot index {index} is out of 32-bit addressing range")]
    SlotOutOfRange { index: usize },
    #[error("allocating executable memory: {0}")]
    Alloc(#[source] io::Error),
    #[error("marking code executable: {0}")]
    Protect(#[source] io::Error),
}

pub type JitResult<T> = Result<T, JitError>;

/// Machine code plus the layout metadata produced while emitting it.
///
/// `block_offsets[b]` is the code offset where block `b` starts;
/// `fixups[b]` lists the byte offsets of every rel32 displacement that was
/// patched to land on block `b`. Kept so layout can be inspected after the
/// fact.
#[derive(Debug)]
pub struct EmittedCode {
    pub code: Vec<u8>,
    pub block_offsets: Vec<usize>,
    pub fixups: Vec<Vec<usize>>,
}

/// Phases 1 and 2: emits every block in program order, then resolves all
/// recorded fixup sites against the final block offsets.
pub fn emit(program: &Program) -> JitResult<EmittedCode> {
    program.assert_well_formed();

    let mut buf = CodeBuffer::new();
    let mut block_offsets = vec![0; program.block_count()];
    let mut fixups: Vec<Vec<usize>> = vec![Vec::new(); program.block_count()];

    for id in program.block_ids() {
        block_offsets[id.index()] = buf.len();
        for &instruction in program.block(id).instructions() {
            emit_instruction(&mut buf, &mut fixups, instruction)?;
        }
    }

    for id in program.block_ids() {
        let target_offset = block_offsets[id.index()];
        for &site in &fixups[id.index()] {
            // rel32 branches are measured from the end of the immediate.
            let displacement = (target_offset as i64) - (site as i64) - 4;
            let displacement = i32::try_from(displacement)
                .map_err(|_| JitError::DisplacementOverflow { target: id })?;
            buf.patch_u32_le(site, displacement as u32);
        }
    }

    Ok(EmittedCode {
        code: buf.into_code(),
        block_offsets,
        fixups,
    })
}

fn emit_instruction(
    buf: &mut CodeBuffer,
    fixups: &mut [Vec<usize>],
    instruction: Instruction,
) -> JitResult<()> {
    use regs::{LOCALS, REGISTERS, SCRATCH0, SCRATCH1};

    let mut asm = Assembler::new(buf);
    match instruction {
        Instruction::LoadImmediate(value) => {
            asm.mov_ri64(SCRATCH0, value);
            asm.mov_mr(REGISTERS, 0, SCRATCH0);
        }
        Instruction::Load(reg) => {
            asm.mov_rm(SCRATCH0, REGISTERS, slot_disp(reg)?);
            asm.mov_mr(REGISTERS, 0, SCRATCH0);
        }
        Instruction::Store(reg) => {
            asm.mov_rm(SCRATCH0, REGISTERS, 0);
            asm.mov_mr(REGISTERS, slot_disp(reg)?, SCRATCH0);
        }
        Instruction::GetLocal(local) => {
            asm.mov_rm(SCRATCH0, LOCALS, slot_disp(local)?);
            asm.mov_mr(REGISTERS, 0, SCRATCH0);
        }
        Instruction::SetLocal(local) => {
            asm.mov_rm(SCRATCH0, REGISTERS, 0);
            asm.mov_mr(LOCALS, slot_disp(local)?, SCRATCH0);
        }
        Instruction::Increment => {
            asm.mov_rm(SCRATCH0, REGISTERS, 0);
            asm.inc_r(SCRATCH0);
            asm.mov_mr(REGISTERS, 0, SCRATCH0);
        }
        Instruction::LessThan(reg) => {
            // registers[reg] < accumulator, materialized as 0 or 1.
            asm.mov_rm(SCRATCH0, REGISTERS, slot_disp(reg)?);
            asm.mov_rm(SCRATCH1, REGISTERS, 0);
            asm.cmp_rr(SCRATCH0, SCRATCH1);
            asm.setl(SCRATCH0);
            asm.movzx_r64_r8(SCRATCH0, SCRATCH0);
            asm.mov_mr(REGISTERS, 0, SCRATCH0);
        }
        Instruction::Jump(target) => {
            let site = asm.jmp_rel32();
            fixups[target.index()].push(site);
        }
        Instruction::JumpConditional {
            true_target,
            false_target,
        } => {
            asm.mov_rm(SCRATCH0, REGISTERS, 0);
            asm.cmp_ri8(SCRATCH0, 0);
            // Jump-if-zero takes the false arm.
            let site = asm.je_rel32();
            fixups[false_target.index()].push(site);
            let site = asm.jmp_rel32();
            fixups[true_target.index()].push(site);
        }
        Instruction::Exit => asm.ret(),
    }
    Ok(())
}

fn slot_disp(index: usize) -> JitResult<i32> {
    index
        .checked_mul(8)
        .and_then(|disp| i32::try_from(disp).ok())
        .ok_or(JitError::SlotOutOfRange { index })
}

#[cfg(all(target_arch = "x86_64", unix))]
pub use self::native::{CompiledProgram, Jit};

#[cfg(all(target_arch = "x86_64", unix))]
mod native {
    use anyhow::Result;

    use super::memory::ExecutableMemory;
    use super::{JitError, JitResult, emit};
    use crate::backend::{Backend, PreparedProgram};
    use crate::vm::Vm;
    use crate::vm::program::{Program, Value};

    /// Entry ABI: opaque VM handle (reserved), register array base (RSI),
    /// locals array base (RDX). Returns the value left in RAX at `Exit`.
    type EntryFn = unsafe extern "sysv64" fn(*mut Vm, *mut Value, *mut Value) -> Value;

    pub struct Jit;

    impl Jit {
        pub fn new() -> Self {
            Self
        }

        /// Phase 3 on top of [`emit`]: installs the buffer into an
        /// executable region. No partial artifact survives an error.
        pub fn prepare(&self, program: &Program) -> JitResult<CompiledProgram> {
            let emitted = emit(program)?;
            let mut memory = ExecutableMemory::new(emitted.code.len()).map_err(JitError::Alloc)?;
            memory.write(0, &emitted.code).map_err(JitError::Alloc)?;
            memory.make_executable().map_err(JitError::Protect)?;
            Ok(CompiledProgram { memory })
        }
    }

    impl Default for Jit {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Installed native code for one program.
    ///
    /// The executable region lives exactly as long as this value.
    pub struct CompiledProgram {
        memory: ExecutableMemory,
    }

    impl CompiledProgram {
        /// Enters the native code against `vm`'s arrays.
        ///
        /// The arrays must cover every register and local index the
        /// program references; the blob performs no bounds checks.
        pub fn enter(&self, vm: &mut Vm) -> Value {
            let handle = vm as *mut Vm;
            let registers = unsafe { (*handle).registers.as_mut_ptr() };
            let locals = unsafe { (*handle).locals.as_mut_ptr() };
            let entry: EntryFn = unsafe { std::mem::transmute(self.memory.as_ptr()) };
            unsafe { entry(handle, registers, locals) }
        }
    }

    impl Backend for Jit {
        fn name(&self) -> &'static str {
            "jit"
        }

        fn prepare(&self, program: &Program) -> Result<Box<dyn PreparedProgram>> {
            Ok(Box::new(Jit::prepare(self, program)?))
        }
    }

    impl PreparedProgram for CompiledProgram {
        fn run(&self, vm: &mut Vm) -> Result<()> {
            self.enter(vm);
            Ok(())
        }
    }
}
