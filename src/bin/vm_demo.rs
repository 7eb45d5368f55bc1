//! Builds the six-block counting CFG, dumps it, and runs it.
//!
//! The loop increments local 0 one million times; the loop result lands in
//! register 6. The program runs through the VM interpreter and, on x86-64,
//! again through the JIT; both final states are printed.

use anyhow::Result;
use tinyjit::vm::Vm;
use tinyjit::vm::program::{Instruction, Program};

fn counting_program(bound: u64) -> Program {
    let mut program = Program::new();
    let entry = program.make_block();
    let exit = program.make_block();
    let taken = program.make_block();
    let condition = program.make_block();
    let body = program.make_block();
    let done = program.make_block();

    program.block_mut(entry).push(Instruction::Store(5));
    program.block_mut(entry).push(Instruction::LoadImmediate(0));
    program.block_mut(entry).push(Instruction::SetLocal(0));
    program.block_mut(entry).push(Instruction::Load(5));
    program.block_mut(entry).push(Instruction::LoadImmediate(0));
    program.block_mut(entry).push(Instruction::Store(6));
    program.block_mut(entry).push(Instruction::Jump(condition));

    program.block_mut(exit).push(Instruction::Exit);

    program.block_mut(taken).push(Instruction::LoadImmediate(0));
    program.block_mut(taken).push(Instruction::Jump(body));

    program.block_mut(condition).push(Instruction::GetLocal(0));
    program.block_mut(condition).push(Instruction::Store(7));
    program
        .block_mut(condition)
        .push(Instruction::LoadImmediate(bound));
    program.block_mut(condition).push(Instruction::LessThan(7));
    program.block_mut(condition).push(Instruction::JumpConditional {
        true_target: taken,
        false_target: done,
    });

    program.block_mut(body).push(Instruction::Store(6));
    program.block_mut(body).push(Instruction::GetLocal(0));
    program.block_mut(body).push(Instruction::Increment);
    program.block_mut(body).push(Instruction::SetLocal(0));
    program.block_mut(body).push(Instruction::Jump(condition));

    program.block_mut(done).push(Instruction::Load(6));
    program.block_mut(done).push(Instruction::Jump(exit));

    program.assert_well_formed();
    program
}

fn main() -> Result<()> {
    let program = counting_program(1_000_000);
    print!("{program}");

    let mut vm = Vm::new(8, 8);
    vm.run(&program);
    println!("interpreter:");
    print!("{vm}");

    #[cfg(all(target_arch = "x86_64", unix))]
    {
        use tinyjit::jit::Jit;

        let compiled = Jit::new().prepare(&program)?;
        let mut vm = Vm::new(8, 8);
        compiled.enter(&mut vm);
        println!("jit:");
        print!("{vm}");
    }

    Ok(())
}
