//! Execution backends for VM programs.
//!
//! The VM interpreter and the JIT are interchangeable behind this seam:
//! `prepare` does whatever per-program work the tier needs (nothing, or a
//! native compile), and the prepared artifact can then run against any
//! suitably sized [`Vm`] any number of times.

use anyhow::Result;

use crate::vm::Vm;
use crate::vm::program::Program;

pub trait Backend {
    fn name(&self) -> &'static str;
    fn prepare(&self, program: &Program) -> Result<Box<dyn PreparedProgram>>;
}

pub trait PreparedProgram {
    /// Executes against `vm`, mutating its register and locals arrays in
    /// place. The arrays must cover every index the program references.
    fn run(&self, vm: &mut Vm) -> Result<()>;
}

/// Every backend available on this target.
pub fn backends() -> Vec<Box<dyn Backend>> {
    let mut backends: Vec<Box<dyn Backend>> = vec![Box::new(crate::vm::Interpreter::new())];
    #[cfg(all(target_arch = "x86_64", unix))]
    backends.push(Box::new(crate::jit::Jit::new()));
    backends
}
