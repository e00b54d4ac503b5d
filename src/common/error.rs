use thiserror::Error;

use super::token::Token;

/// Failures raised while running a program, by either backend or by a builtin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("type mismatch: {left} {operator} {right}")]
    TypeMismatch {
        left: &'static str,
        operator: Token,
        right: &'static str,
    },
    #[error("unknown operator: {left} {operator} {right}")]
    UnknownInfixOperator {
        left: &'static str,
        operator: Token,
        right: &'static str,
    },
    #[error("unknown operator: {operator}{operand}")]
    UnknownPrefixOperator {
        operator: Token,
        operand: &'static str,
    },
    #[error("identifier not found: {0}")]
    IdentifierNotFound(String),
    #[error("not a function: {0}")]
    NotAFunction(&'static str),
    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArgumentCount { want: usize, got: usize },
    #[error("wrong number of arguments to `{name}`. got={got}, want={want}")]
    BuiltinArity {
        name: &'static str,
        got: usize,
        want: usize,
    },
    #[error("argument to `{name}` not supported, got {got}")]
    BuiltinArgument {
        name: &'static str,
        got: &'static str,
    },
    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),
    #[error("index operator not supported: {0}")]
    IndexNotSupported(&'static str),
    #[error("division by zero")]
    DivisionByZero,
    #[error("break outside loop")]
    BreakOutsideLoop,
    #[error("continue outside loop")]
    ContinueOutsideLoop,
    #[error("stack overflow")]
    StackOverflow,
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),
    #[error("unknown builtin index: {0}")]
    UnknownBuiltin(usize),
    #[error("constant {0} is not a function")]
    NotAFunctionConstant(usize),
}
