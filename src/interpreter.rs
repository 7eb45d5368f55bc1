//! Tree-walking evaluator.
//!
//! Walks the syntax tree directly, eagerly and single-threaded, over a flat
//! name-to-integer environment. Environment misuse (redeclaring a name,
//! touching an undeclared one) is a fatal assertion: it indicates a bug in
//! the program under test, so there is no error path back to callers.

use std::collections::HashMap;

use crate::ast::{Ast, Block};

/// Recursive evaluator with a single flat scope.
///
/// The environment lives as long as the interpreter; callers inspect
/// `variables` after evaluation to observe final bindings.
#[derive(Debug, Default)]
pub struct AstInterpreter {
    pub variables: HashMap<String, i64>,
}

impl AstInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `ast` and returns its 64-bit integer result.
    ///
    /// Arithmetic wraps on overflow.
    pub fn interpret(&mut self, ast: &Ast) -> i64 {
        match ast {
            Ast::Literal(value) => *value,
            Ast::Variable(name) => self.read(name),
            Ast::Add { left, right } => {
                let left = self.interpret(left);
                let right = self.interpret(right);
                left.wrapping_add(right)
            }
            Ast::LessThan { left, right } => {
                let left = self.interpret(left);
                let right = self.interpret(right);
                i64::from(left < right)
            }
            Ast::Increment { variable } => {
                let slot = self
                    .variables
                    .get_mut(variable)
                    .unwrap_or_else(|| panic!("increment of undeclared variable '{variable}'"));
                let previous = *slot;
                *slot = previous.wrapping_add(1);
                previous
            }
            Ast::Assignment { name, value } => {
                assert!(
                    self.variables.contains_key(name),
                    "assignment to undeclared variable '{name}'"
                );
                let value = self.interpret(value);
                self.variables.insert(name.clone(), value);
                value
            }
            Ast::VariableDeclaration {
                name, initializer, ..
            } => {
                assert!(
                    !self.variables.contains_key(name),
                    "redeclaration of variable '{name}'"
                );
                let value = self.interpret(initializer);
                self.variables.insert(name.clone(), value);
                value
            }
            // Return is an expression; it does not unwind its enclosing block.
            Ast::Return(value) => self.interpret(value),
            Ast::Block(block) => self.interpret_block(block),
            Ast::IfElse {
                condition,
                then_body,
                else_body,
            } => {
                if self.interpret(condition) != 0 {
                    self.interpret_block(then_body)
                } else {
                    self.interpret_block(else_body)
                }
            }
            Ast::While { condition, body } => {
                let mut result = 0;
                while self.interpret(condition) != 0 {
                    result = self.interpret_block(body);
                }
                result
            }
            Ast::For {
                initializer,
                condition,
                step,
                body,
            } => {
                self.interpret(initializer);
                let mut result = 0;
                while self.interpret(condition) != 0 {
                    result = self.interpret_block(body);
                    self.interpret(step);
                }
                result
            }
            Ast::FunctionDeclaration { body, .. } => self.interpret_block(body),
        }
    }

    /// Evaluates children in order; the last child's result wins, 0 if empty.
    pub fn interpret_block(&mut self, block: &Block) -> i64 {
        let mut result = 0;
        for child in &block.children {
            result = self.interpret(child);
        }
        result
    }

    fn read(&self, name: &str) -> i64 {
        *self
            .variables
            .get(name)
            .unwrap_or_else(|| panic!("read of undeclared variable '{name}'"))
    }
}
