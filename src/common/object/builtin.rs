use std::rc::Rc;

use crate::common::error::RuntimeError;

use super::{Object, NULL};

pub type BuiltinFunction = fn(&[Object]) -> Result<Object, RuntimeError>;

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFunction,
}

impl Builtin {
    pub fn call(&self, args: &[Object]) -> Result<Object, RuntimeError> {
        (self.func)(args)
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// The native functions visible to programs, in a fixed order. The order is
/// the operand of `OpGetBuiltin`, so compiler and VM must share one table.
#[derive(Debug, Clone)]
pub struct BuiltinTable {
    builtins: Vec<Builtin>,
}

impl Default for BuiltinTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl BuiltinTable {
    pub fn new(builtins: Vec<Builtin>) -> Self {
        Self { builtins }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            Builtin { name: "len", func: LEN },
            Builtin { name: "puts", func: PUTS },
            Builtin { name: "first", func: FIRST },
            Builtin { name: "last", func: LAST },
            Builtin { name: "rest", func: REST },
            Builtin { name: "push", func: PUSH },
            Builtin { name: "str", func: STR },
            Builtin { name: "int", func: INT },
            Builtin { name: "float", func: FLOAT },
            Builtin { name: "timestamp", func: TIMESTAMP },
            Builtin { name: "exit", func: EXIT },
        ])
    }

    pub fn get(&self, name: &str) -> Option<Builtin> {
        self.builtins.iter().find(|b| b.name == name).copied()
    }

    pub fn by_index(&self, index: usize) -> Option<Builtin> {
        self.builtins.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Builtin> {
        self.builtins.iter()
    }

    pub fn len(&self) -> usize {
        self.builtins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty()
    }
}

fn check_arity(name: &'static str, args: &[Object], want: usize) -> Result<(), RuntimeError> {
    if args.len() != want {
        return Err(RuntimeError::BuiltinArity {
            name,
            got: args.len(),
            want,
        });
    }

    Ok(())
}

fn unsupported(name: &'static str, arg: &Object) -> RuntimeError {
    RuntimeError::BuiltinArgument {
        name,
        got: arg.type_name(),
    }
}

const LEN: BuiltinFunction = |objects| {
    check_arity("len", objects, 1)?;

    match &objects[0] {
        Object::Str(s) => Ok(Object::Integer(s.len() as i64)),
        Object::Array(elements) => Ok(Object::Integer(elements.len() as i64)),
        Object::Hash(pairs) => Ok(Object::Integer(pairs.len() as i64)),
        arg => Err(unsupported("len", arg)),
    }
};

const PUTS: BuiltinFunction = |objects| {
    for object in objects {
        println!("{}", object);
    }

    Ok(NULL)
};

const FIRST: BuiltinFunction = |objects| {
    check_arity("first", objects, 1)?;

    match &objects[0] {
        Object::Array(elements) => Ok(elements.first().cloned().unwrap_or(NULL)),
        Object::Str(s) => Ok(s
            .chars()
            .next()
            .map(|c| Object::Str(c.to_string()))
            .unwrap_or(NULL)),
        arg => Err(unsupported("first", arg)),
    }
};

const LAST: BuiltinFunction = |objects| {
    check_arity("last", objects, 1)?;

    match &objects[0] {
        Object::Array(elements) => Ok(elements.last().cloned().unwrap_or(NULL)),
        Object::Str(s) => Ok(s
            .chars()
            .last()
            .map(|c| Object::Str(c.to_string()))
            .unwrap_or(NULL)),
        arg => Err(unsupported("last", arg)),
    }
};

const REST: BuiltinFunction = |objects| {
    check_arity("rest", objects, 1)?;

    match &objects[0] {
        Object::Array(elements) if elements.is_empty() => Ok(NULL),
        Object::Array(elements) => Ok(Object::Array(Rc::new(elements[1..].to_vec()))),
        Object::Str(s) if s.is_empty() => Ok(NULL),
        Object::Str(s) => Ok(Object::Str(s.chars().skip(1).collect())),
        arg => Err(unsupported("rest", arg)),
    }
};

const PUSH: BuiltinFunction = |objects| {
    check_arity("push", objects, 2)?;

    match &objects[0] {
        Object::Array(elements) => {
            let mut new_elements = Vec::with_capacity(elements.len() + 1);
            new_elements.extend(elements.iter().cloned());
            new_elements.push(objects[1].clone());
            Ok(Object::Array(Rc::new(new_elements)))
        }
        Object::Str(s) => Ok(Object::Str(format!("{}{}", s, objects[1]))),
        arg => Err(unsupported("push", arg)),
    }
};

const STR: BuiltinFunction = |objects| {
    check_arity("str", objects, 1)?;

    Ok(Object::Str(objects[0].to_string()))
};

const INT: BuiltinFunction = |objects| {
    check_arity("int", objects, 1)?;

    match &objects[0] {
        Object::Integer(i) => Ok(Object::Integer(*i)),
        Object::Float(f) => Ok(Object::Integer(*f as i64)),
        arg => Err(unsupported("int", arg)),
    }
};

const FLOAT: BuiltinFunction = |objects| {
    check_arity("float", objects, 1)?;

    match &objects[0] {
        Object::Integer(i) => Ok(Object::Float(*i as f64)),
        Object::Float(f) => Ok(Object::Float(*f)),
        arg => Err(unsupported("float", arg)),
    }
};

const TIMESTAMP: BuiltinFunction = |objects| {
    check_arity("timestamp", objects, 0)?;

    Ok(Object::Integer(chrono::Utc::now().timestamp()))
};

const EXIT: BuiltinFunction = |objects| {
    let code = match objects {
        [] => 0,
        [Object::Integer(code)] => *code as i32,
        [arg] => return Err(unsupported("exit", arg)),
        _ => {
            return Err(RuntimeError::BuiltinArity {
                name: "exit",
                got: objects.len(),
                want: 1,
            })
        }
    };

    std::process::exit(code)
};
