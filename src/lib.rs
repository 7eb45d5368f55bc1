//! `tinyjit` library crate.
//!
//! Two execution tiers over a tiny imperative language:
//! - `ast` + `interpreter`: a typed syntax tree walked directly by a
//!   recursive evaluator over a flat variable environment
//! - `vm`: register-based programs laid out as basic-block CFGs, executed
//!   either by the block-walking interpreter or by the `jit` backend, which
//!   lowers them to native x86-64 code
//!
//! Programs are constructed programmatically; there is no parser.
pub mod ast;
pub mod backend;
pub mod interpreter;
pub mod jit;
pub mod vm;
