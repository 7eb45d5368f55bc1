//! End-to-end scenarios run across both tiers and every VM backend.

use tinyjit::ast::{Ast, Block, ValueType};
use tinyjit::backend::backends;
use tinyjit::interpreter::AstInterpreter;
use tinyjit::vm::Vm;
use tinyjit::vm::program::{Instruction as I, Program, Value};

fn literal(value: i64) -> Ast {
    Ast::Literal(value)
}

fn variable(name: &str) -> Ast {
    Ast::Variable(name.to_string())
}

fn less_than(left: Ast, right: Ast) -> Ast {
    Ast::LessThan {
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn declare(name: &str, initializer: Ast) -> Ast {
    Ast::VariableDeclaration {
        name: name.to_string(),
        declared_type: ValueType::Int,
        initializer: Box::new(initializer),
    }
}

fn assign(name: &str, value: Ast) -> Ast {
    Ast::Assignment {
        name: name.to_string(),
        value: Box::new(value),
    }
}

fn increment(name: &str) -> Ast {
    Ast::Increment {
        variable: name.to_string(),
    }
}

fn block(children: Vec<Ast>) -> Block {
    Block { children }
}

fn function(body: Block) -> Ast {
    Ast::FunctionDeclaration {
        name: "foo".to_string(),
        return_type: ValueType::Int,
        body,
    }
}

/// `{ int j = 0; int i = 0; while (i < bound) { j = i; i++; } return j; }`
fn while_accumulator_ast(bound: i64) -> Ast {
    function(block(vec![
        declare("j", literal(0)),
        declare("i", literal(0)),
        Ast::While {
            condition: Box::new(less_than(variable("i"), literal(bound))),
            body: block(vec![assign("j", variable("i")), increment("i")]),
        },
        Ast::Return(Box::new(variable("j"))),
    ]))
}

/// Hand-lowered form of [`while_accumulator_ast`]: local 0 is `i`, local 1
/// is `j`, and the final answer is copied into register 3 before `Exit`.
fn while_accumulator_program(bound: Value) -> Program {
    let mut program = Program::new();
    let entry = program.make_block();
    let condition = program.make_block();
    let body = program.make_block();
    let exit = program.make_block();

    program.block_mut(entry).push(I::LoadImmediate(0));
    program.block_mut(entry).push(I::SetLocal(0));
    program.block_mut(entry).push(I::LoadImmediate(0));
    program.block_mut(entry).push(I::SetLocal(1));
    program.block_mut(entry).push(I::Jump(condition));

    program.block_mut(condition).push(I::GetLocal(0));
    program.block_mut(condition).push(I::Store(2));
    program.block_mut(condition).push(I::LoadImmediate(bound));
    program.block_mut(condition).push(I::LessThan(2));
    program.block_mut(condition).push(I::JumpConditional {
        true_target: body,
        false_target: exit,
    });

    program.block_mut(body).push(I::GetLocal(0));
    program.block_mut(body).push(I::SetLocal(1));
    program.block_mut(body).push(I::GetLocal(0));
    program.block_mut(body).push(I::Increment);
    program.block_mut(body).push(I::SetLocal(0));
    program.block_mut(body).push(I::Jump(condition));

    program.block_mut(exit).push(I::GetLocal(1));
    program.block_mut(exit).push(I::Store(3));
    program.block_mut(exit).push(I::Exit);

    program.assert_well_formed();
    program
}

/// The six-block counting CFG: local 0 climbs to `bound`, register 6 holds
/// the loop result.
fn counting_program(bound: Value) -> Program {
    let mut program = Program::new();
    let entry = program.make_block();
    let exit = program.make_block();
    let taken = program.make_block();
    let condition = program.make_block();
    let body = program.make_block();
    let done = program.make_block();

    program.block_mut(entry).push(I::Store(5));
    program.block_mut(entry).push(I::LoadImmediate(0));
    program.block_mut(entry).push(I::SetLocal(0));
    program.block_mut(entry).push(I::Load(5));
    program.block_mut(entry).push(I::LoadImmediate(0));
    program.block_mut(entry).push(I::Store(6));
    program.block_mut(entry).push(I::Jump(condition));

    program.block_mut(exit).push(I::Exit);

    program.block_mut(taken).push(I::LoadImmediate(0));
    program.block_mut(taken).push(I::Jump(body));

    program.block_mut(condition).push(I::GetLocal(0));
    program.block_mut(condition).push(I::Store(7));
    program.block_mut(condition).push(I::LoadImmediate(bound));
    program.block_mut(condition).push(I::LessThan(7));
    program.block_mut(condition).push(I::JumpConditional {
        true_target: taken,
        false_target: done,
    });

    program.block_mut(body).push(I::Store(6));
    program.block_mut(body).push(I::GetLocal(0));
    program.block_mut(body).push(I::Increment);
    program.block_mut(body).push(I::SetLocal(0));
    program.block_mut(body).push(I::Jump(condition));

    program.block_mut(done).push(I::Load(6));
    program.block_mut(done).push(I::Jump(exit));

    program.assert_well_formed();
    program
}

#[test]
fn counting_for_loop() {
    let program = function(block(vec![Ast::For {
        initializer: Box::new(declare("i", literal(0))),
        condition: Box::new(less_than(variable("i"), literal(10))),
        step: Box::new(increment("i")),
        body: Block::new(),
    }]));

    let mut interpreter = AstInterpreter::new();
    assert_eq!(interpreter.interpret(&program), 0);
    assert_eq!(interpreter.variables["i"], 10);
}

#[test]
fn if_else_assignment() {
    let program = function(block(vec![
        declare("i", literal(42)),
        declare("j", literal(0)),
        Ast::IfElse {
            condition: Box::new(less_than(variable("i"), literal(100))),
            then_body: block(vec![assign("j", variable("i"))]),
            else_body: Block::new(),
        },
        Ast::Return(Box::new(variable("j"))),
    ]));

    let mut interpreter = AstInterpreter::new();
    assert_eq!(interpreter.interpret(&program), 42);
    assert_eq!(interpreter.variables["j"], 42);
    assert_eq!(interpreter.variables["i"], 42);
}

#[test]
fn while_accumulator() {
    let mut interpreter = AstInterpreter::new();
    assert_eq!(interpreter.interpret(&while_accumulator_ast(1000)), 999);
    assert_eq!(interpreter.variables["j"], 999);
    assert_eq!(interpreter.variables["i"], 1000);
}

#[test]
fn fibonacci_via_while_and_add() {
    let add = |left: Ast, right: Ast| Ast::Add {
        left: Box::new(left),
        right: Box::new(right),
    };
    let program = function(block(vec![
        declare("n", literal(20)),
        declare("i", literal(0)),
        declare("t1", literal(0)),
        declare("t2", literal(1)),
        declare("t3", literal(0)),
        Ast::While {
            condition: Box::new(less_than(variable("i"), variable("n"))),
            body: block(vec![
                assign("t3", add(variable("t1"), variable("t2"))),
                assign("t1", variable("t2")),
                assign("t2", variable("t3")),
                increment("i"),
            ]),
        },
        Ast::Return(Box::new(variable("t1"))),
    ]));

    let mut interpreter = AstInterpreter::new();
    assert_eq!(interpreter.interpret(&program), 6765);
}

#[test]
fn million_iteration_vm_loop() {
    let program = counting_program(1_000_000);
    let mut vm = Vm::new(8, 8);
    vm.run(&program);
    assert_eq!(vm.locals[0], 1_000_000);
    assert_eq!(vm.registers[6], 0);
}

#[test]
fn tree_and_vm_agree_on_the_accumulator_loop() {
    let bound = 1000;

    let mut interpreter = AstInterpreter::new();
    let tree_result = interpreter.interpret(&while_accumulator_ast(bound));

    let program = while_accumulator_program(bound as Value);
    let mut vm = Vm::new(4, 2);
    vm.run(&program);

    assert_eq!(vm.registers[3], tree_result as Value);
    assert_eq!(vm.locals[1], tree_result as Value);
    assert_eq!(vm.locals[0], bound as Value);
}

#[test]
fn every_backend_computes_the_same_state() {
    let program = counting_program(10_000);
    let mut states = Vec::new();

    for backend in backends() {
        let prepared = backend
            .prepare(&program)
            .unwrap_or_else(|err| panic!("{} prepare failed: {err}", backend.name()));
        let mut vm = Vm::new(8, 8);
        prepared
            .run(&mut vm)
            .unwrap_or_else(|err| panic!("{} run failed: {err}", backend.name()));
        states.push((backend.name(), vm));
    }

    let (_, reference) = &states[0];
    assert_eq!(reference.locals[0], 10_000);
    for (name, state) in &states[1..] {
        assert_eq!(state, reference, "backend {name} diverged");
    }
}

#[cfg(all(target_arch = "x86_64", unix))]
mod jit {
    use super::*;
    use tinyjit::jit::{Jit, emit};

    #[test]
    fn jit_matches_the_vm_interpreter_bit_for_bit() {
        let program = counting_program(1_000_000);

        let mut interpreted = Vm::new(8, 8);
        interpreted.run(&program);

        let compiled = Jit::new().prepare(&program).expect("prepare");
        let mut jitted = Vm::new(8, 8);
        compiled.enter(&mut jitted);

        assert_eq!(jitted.registers, interpreted.registers);
        assert_eq!(jitted.locals, interpreted.locals);
        assert_eq!(jitted.locals[0], 1_000_000);
    }

    #[test]
    fn jit_matches_on_the_hand_lowered_accumulator() {
        let program = while_accumulator_program(1000);

        let mut interpreted = Vm::new(4, 2);
        interpreted.run(&program);

        let compiled = Jit::new().prepare(&program).expect("prepare");
        let mut jitted = Vm::new(4, 2);
        compiled.enter(&mut jitted);

        assert_eq!(jitted, interpreted);
        assert_eq!(jitted.registers[3], 999);
    }

    #[test]
    fn patched_displacements_match_the_block_layout() {
        let emitted = emit(&counting_program(1_000_000)).expect("emit");
        let mut patched = 0;
        for (index, sites) in emitted.fixups.iter().enumerate() {
            for &site in sites {
                let bytes: [u8; 4] = emitted.code[site..site + 4].try_into().expect("rel32");
                let displacement = i32::from_le_bytes(bytes) as i64;
                assert_eq!(
                    displacement,
                    emitted.block_offsets[index] as i64 - site as i64 - 4
                );
                patched += 1;
            }
        }
        // Four Jumps plus one JumpConditional (two sites).
        assert_eq!(patched, 6);
    }
}
