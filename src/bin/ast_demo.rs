//! Builds the counting-loop function, dumps it, and evaluates it.
//!
//! ```text
//! fn void foo() {
//!   for (int i = 0; i < 1000000; i++) {
//!   }
//! }
//! ```

use anyhow::Result;
use tinyjit::ast::{Ast, Block, ValueType};
use tinyjit::interpreter::AstInterpreter;

fn main() -> Result<()> {
    let initializer = Ast::VariableDeclaration {
        name: "i".to_string(),
        declared_type: ValueType::Int,
        initializer: Box::new(Ast::Literal(0)),
    };
    let condition = Ast::LessThan {
        left: Box::new(Ast::Variable("i".to_string())),
        right: Box::new(Ast::Literal(1_000_000)),
    };
    let step = Ast::Increment {
        variable: "i".to_string(),
    };
    let for_loop = Ast::For {
        initializer: Box::new(initializer),
        condition: Box::new(condition),
        step: Box::new(step),
        body: Block::new(),
    };

    let mut body = Block::new();
    body.append(for_loop);
    let function = Ast::FunctionDeclaration {
        name: "foo".to_string(),
        return_type: ValueType::Void,
        body,
    };

    println!("{function}");

    let mut interpreter = AstInterpreter::new();
    let result = interpreter.interpret(&function);
    println!("{result}");

    Ok(())
}
