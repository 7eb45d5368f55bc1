#![allow(dead_code)]
use tinyjit::ast::{Ast, Block, ValueType};
use tinyjit::vm::program::{Instruction as I, Program, Value};

pub const LOOP_BOUND: u64 = 1_000_000;

/// `foo() { int j = 0; int i = 0; while (i < bound) { j = i; i++; } return j; }`
pub fn accumulator_ast(bound: i64) -> Ast {
    let variable = |name: &str| Ast::Variable(name.to_string());
    let declare = |name: &str, value: i64| Ast::VariableDeclaration {
        name: name.to_string(),
        declared_type: ValueType::Int,
        initializer: Box::new(Ast::Literal(value)),
    };

    Ast::FunctionDeclaration {
        name: "foo".to_string(),
        return_type: ValueType::Int,
        body: Block {
            children: vec![
                declare("j", 0),
                declare("i", 0),
                Ast::While {
                    condition: Box::new(Ast::LessThan {
                        left: Box::new(variable("i")),
                        right: Box::new(Ast::Literal(bound)),
                    }),
                    body: Block {
                        children: vec![
                            Ast::Assignment {
                                name: "j".to_string(),
                                value: Box::new(variable("i")),
                            },
                            Ast::Increment {
                                variable: "i".to_string(),
                            },
                        ],
                    },
                },
                Ast::Return(Box::new(variable("j"))),
            ],
        },
    }
}

/// The six-block counting CFG; local 0 climbs to `bound`.
pub fn counting_program(bound: Value) -> Program {
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
