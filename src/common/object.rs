use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt::{Debug, Display},
    hash::Hasher,
    rc::Rc,
};

use rustc_hash::FxHasher;

use crate::compiler::code::Instructions;

use super::{
    ast::{csv_str, BlockStatement, Expression},
    error::RuntimeError,
};

use self::{builtin::Builtin, environment::MutEnv};

pub mod builtin;
pub mod environment;

#[derive(Debug, Clone)]
pub enum Object {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Str(String),
    Null,
    Error(String),
    Array(Rc<Vec<Object>>),
    Hash(Rc<BTreeMap<HashKey, HashPair>>),
    Function(Rc<Function>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(Builtin),
    /// An unevaluated expression captured by `quote`.
    Quote(Rc<Expression>),
}

pub const NULL: Object = Object::Null;
pub const TRUE: Object = Object::Boolean(true);
pub const FALSE: Object = Object::Boolean(false);

impl Object {
    pub fn from_native_bool(b: bool) -> Object {
        if b {
            TRUE
        } else {
            FALSE
        }
    }

    pub fn array(elements: Vec<Object>) -> Object {
        Object::Array(Rc::new(elements))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Integer(_) => "INTEGER",
            Object::Float(_) => "FLOAT",
            Object::Boolean(_) => "BOOLEAN",
            Object::Str(_) => "STRING",
            Object::Null => "NULL",
            Object::Error(_) => "ERROR",
            Object::Array(_) => "ARRAY",
            Object::Hash(_) => "HASH",
            Object::Function(_) => "FUNCTION",
            Object::CompiledFunction(_) => "COMPILED_FUNCTION",
            Object::Closure(_) => "CLOSURE",
            Object::Builtin(_) => "BUILTIN",
            Object::Quote(_) => "QUOTE",
        }
    }

    /// `false` and `null` are falsy, `true` is truthy, an integer is truthy
    /// only when strictly positive, and everything else is falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Object::Boolean(b) => *b,
            Object::Integer(i) => *i > 0,
            _ => false,
        }
    }

    /// Equality as seen by the language's `==`: scalars by value,
    /// containers and functions by identity.
    pub fn is_identical(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Array(a), Object::Array(b)) => Rc::ptr_eq(a, b),
            (Object::Hash(a), Object::Hash(b)) => Rc::ptr_eq(a, b),
            (Object::Function(a), Object::Function(b)) => Rc::ptr_eq(a, b),
            (Object::CompiledFunction(a), Object::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Object::Closure(a), Object::Closure(b)) => Rc::ptr_eq(a, b),
            (Object::Quote(a), Object::Quote(b)) => Rc::ptr_eq(a, b),
            (Object::Builtin(a), Object::Builtin(b)) => a.name == b.name,
            (a, b) => a == b,
        }
    }

    /// Floats are keyed by their 15-digit rendering, so values that differ
    /// only beyond that precision share a key.
    pub fn hash_key(&self) -> Result<HashKey, RuntimeError> {
        let (kind, value) = match self {
            Object::Integer(i) => (HashKind::Integer, *i as u64),
            Object::Boolean(b) => (HashKind::Boolean, u64::from(*b)),
            Object::Str(s) => (HashKind::Str, hash_bytes(s.as_bytes())),
            Object::Float(f) => (HashKind::Float, hash_bytes(format!("{:.15}", f).as_bytes())),
            other => return Err(RuntimeError::UnusableHashKey(other.type_name())),
        };

        Ok(HashKey { kind, value })
    }
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Object::Integer(a), Object::Integer(b)) => a == b,
            (Object::Float(a), Object::Float(b)) => a == b,
            (Object::Boolean(a), Object::Boolean(b)) => a == b,
            (Object::Str(a), Object::Str(b)) => a == b,
            (Object::Null, Object::Null) => true,
            (Object::Error(a), Object::Error(b)) => a == b,
            (Object::Array(a), Object::Array(b)) => a == b,
            (Object::Hash(a), Object::Hash(b)) => a == b,
            (Object::Function(a), Object::Function(b)) => Rc::ptr_eq(a, b),
            (Object::CompiledFunction(a), Object::CompiledFunction(b)) => a == b,
            (Object::Closure(a), Object::Closure(b)) => Rc::ptr_eq(a, b),
            (Object::Builtin(a), Object::Builtin(b)) => a == b,
            (Object::Quote(a), Object::Quote(b)) => a == b,
            _ => false,
        }
    }
}

impl Display for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Object::Integer(i) => write!(f, "{}", i),
            Object::Float(x) => write!(f, "{:.6}", x),
            Object::Boolean(b) => write!(f, "{}", b),
            Object::Str(s) => f.write_str(s),
            Object::Null => write!(f, "null"),
            Object::Error(message) => write!(f, "ERROR: {}", message),
            Object::Array(elements) => write!(f, "[{}]", csv_str(elements)),
            Object::Hash(pairs) => write!(
                f,
                "{{{}}}",
                csv_str(
                    &pairs
                        .values()
                        .map(|pair| format!("{}: {}", pair.key, pair.value))
                        .collect::<Vec<_>>()
                )
            ),
            Object::Function(function) => write!(
                f,
                "fn({}) {}",
                function.parameters.join(", "),
                function.body
            ),
            Object::CompiledFunction(function) => {
                write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(function))
            }
            Object::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Object::Builtin(builtin) => write!(f, "builtin function {}", builtin.name),
            Object::Quote(expression) => write!(f, "QUOTE({})", expression),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashKind {
    Integer,
    Float,
    Boolean,
    Str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashKey {
    pub kind: HashKind,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Object,
    pub value: Object,
}

/// A function value of the tree-walking evaluator.
pub struct Function {
    pub parameters: Vec<String>,
    pub body: BlockStatement,
    pub env: MutEnv,
}

// The captured environment may hold this function, so it is left out.
impl Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("parameters", &self.parameters)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

/// Where a closure finds one of its free variables when it is created,
/// relative to the frame that executes `OpClosure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    Local(usize),
    Free(usize),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
    pub captures: Vec<Capture>,
}

/// A variable shared between a frame and the closures that captured it.
pub type Captured = Rc<RefCell<Object>>;

#[derive(Clone)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Captured>,
}

// A captured cell may hold this closure, so only the count is shown.
impl Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Closure")
            .field("func", &self.func)
            .field("free", &self.free.len())
            .finish()
    }
}
