//! Lexer, Pratt parser, tree-walking evaluator, bytecode compiler and stack
//! virtual machine for the Monkey language.
//!
//! Both backends share one [`BuiltinTable`] and report failures with the same
//! [`RuntimeError`] variants.

pub mod common;
pub mod compiler;
pub mod evaluator;

pub use common::{
    error::RuntimeError,
    lexer::Lexer,
    object::{builtin::BuiltinTable, environment::Environment, Object},
    parser::{Parser, ParserError},
};
pub use compiler::{
    compiler::{Bytecode, CompileError, Compiler},
    vm::Vm,
};
pub use evaluator::Evaluator;
