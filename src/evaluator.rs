use std::{cell::Cell, collections::BTreeMap, rc::Rc};

use tracing::debug;

use crate::common::{
    ast::{BlockStatement, Expression, Program, Statement},
    error::RuntimeError,
    object::{
        builtin::BuiltinTable,
        environment::{Environment, MutEnv},
        Function, HashPair, Object, NULL,
    },
    token::Token,
};

/// Deepest chain of nested user function calls before evaluation fails with
/// `stack overflow`.
pub const MAX_CALL_DEPTH: usize = 1024;

// Headroom kept on the host stack before a call grows it.
const RED_ZONE: usize = 128 * 1024;
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Everything other than a plain value that can come out of evaluating a
/// node. Each variant unwinds until the construct that owns it.
#[derive(Debug, PartialEq)]
enum Signal {
    Return(Object),
    Break,
    Continue,
    Error(RuntimeError),
}

impl From<RuntimeError> for Signal {
    fn from(err: RuntimeError) -> Self {
        Signal::Error(err)
    }
}

type R<T> = Result<T, Signal>;

pub struct Evaluator {
    builtins: Rc<BuiltinTable>,
    depth: Cell<usize>,
}

impl Evaluator {
    pub fn new(builtins: Rc<BuiltinTable>) -> Self {
        Self {
            builtins,
            depth: Cell::new(0),
        }
    }

    /// Runs `program` in `env` and returns its value: the payload of the
    /// first top-level `return`, the first error, or the value of the last
    /// statement.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn eval(&self, program: &Program, env: &MutEnv) -> Object {
        let mut result = NULL;

        for stmt in &program.statements {
            match self.eval_statement(stmt, env) {
                Ok(value) => result = value,
                Err(Signal::Return(value)) => return value,
                Err(Signal::Error(err)) => {
                    debug!(%err, "evaluation failed");
                    return Object::Error(err.to_string());
                }
                // `eval_statement` only lets these escape from inside a loop.
                Err(Signal::Break) => {
                    return Object::Error(RuntimeError::BreakOutsideLoop.to_string())
                }
                Err(Signal::Continue) => {
                    return Object::Error(RuntimeError::ContinueOutsideLoop.to_string())
                }
            }
        }

        result
    }

    fn eval_block(&self, block: &BlockStatement, env: &MutEnv) -> R<Object> {
        let mut result = NULL;

        for stmt in &block.statements {
            result = self.eval_statement(stmt, env)?;
        }

        Ok(result)
    }

    fn eval_statement(&self, statement: &Statement, env: &MutEnv) -> R<Object> {
        match statement {
            Statement::Expression { value } => self.eval_expression(value, env),
            Statement::Let { name, value } => {
                let value = self.eval_expression(value, env)?;
                env.borrow_mut().set(name, value);
                Ok(NULL)
            }
            Statement::Assign { name, value } => {
                let value = self.eval_expression(value, env)?;
                env.borrow_mut().assign(name, value);
                Ok(NULL)
            }
            Statement::Return { value } => {
                let value = self.eval_expression(value, env)?;
                Err(Signal::Return(value))
            }
            Statement::Block(block) => self.eval_block(block, &Environment::new_enclosed(env.clone())),
            Statement::For {
                init,
                condition,
                post,
                body,
            } => self.eval_for_statement(init, condition, post, body, env),
            Statement::Break => {
                if env.borrow().is_in_loop() {
                    Err(Signal::Break)
                } else {
                    Err(RuntimeError::BreakOutsideLoop.into())
                }
            }
            Statement::Continue => {
                if env.borrow().is_in_loop() {
                    Err(Signal::Continue)
                } else {
                    Err(RuntimeError::ContinueOutsideLoop.into())
                }
            }
        }
    }

    fn eval_for_statement(
        &self,
        init: &Statement,
        condition: &Expression,
        post: &Statement,
        body: &BlockStatement,
        env: &MutEnv,
    ) -> R<Object> {
        let loop_env = Environment::new_loop(env.clone());
        self.eval_statement(init, &loop_env)?;

        loop {
            if !self.eval_expression(condition, &loop_env)?.is_truthy() {
                break;
            }

            match self.eval_block(body, &loop_env) {
                Ok(_) | Err(Signal::Continue) => {}
                Err(Signal::Break) => break,
                Err(signal) => return Err(signal),
            }

            self.eval_statement(post, &loop_env)?;
        }

        Ok(NULL)
    }

    fn eval_expression(&self, expression: &Expression, env: &MutEnv) -> R<Object> {
        match expression {
            Expression::Integer(i) => Ok(Object::Integer(*i)),
            Expression::Float(f) => Ok(Object::Float(*f)),
            Expression::Str(s) => Ok(Object::Str(s.clone())),
            Expression::Boolean(b) => Ok(Object::from_native_bool(*b)),
            Expression::Identifier(name) => self.eval_identifier(name, env),
            Expression::Array(elements) => Ok(Object::array(self.eval_expressions(elements, env)?)),
            Expression::Hash(pairs) => self.eval_hash_literal(pairs, env),
            Expression::Prefix(operator, right) => {
                let right = self.eval_expression(right, env)?;
                Ok(eval_prefix_expression(operator, right)?)
            }
            Expression::Infix(left, operator, right) => {
                let left = self.eval_expression(left, env)?;
                let right = self.eval_expression(right, env)?;
                Ok(eval_infix_expression(operator, left, right)?)
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                if self.eval_expression(condition, env)?.is_truthy() {
                    self.eval_block(consequence, env)
                } else if let Some(alternative) = alternative {
                    self.eval_block(alternative, env)
                } else {
                    Ok(NULL)
                }
            }
            Expression::Function { parameters, body } => Ok(Object::Function(Rc::new(Function {
                parameters: parameters.clone(),
                body: body.clone(),
                env: env.clone(),
            }))),
            Expression::Call {
                function,
                arguments,
            } => {
                // `quote` is special only while no binding shadows it.
                if let Expression::Identifier(name) = function.as_ref() {
                    if name == "quote" && env.borrow().get(name).is_none() {
                        return Ok(quote(arguments)?);
                    }
                }

                let function = self.eval_expression(function, env)?;
                let arguments = self.eval_expressions(arguments, env)?;
                self.apply_function(function, arguments)
            }
            Expression::Index { left, index } => {
                let left = self.eval_expression(left, env)?;
                let index = self.eval_expression(index, env)?;
                Ok(eval_index_expression(left, index)?)
            }
        }
    }

    fn eval_expressions(&self, expressions: &[Expression], env: &MutEnv) -> R<Vec<Object>> {
        expressions
            .iter()
            .map(|expression| self.eval_expression(expression, env))
            .collect()
    }

    fn eval_identifier(&self, name: &str, env: &MutEnv) -> R<Object> {
        if let Some(value) = env.borrow().get(name) {
            return Ok(value);
        }

        match self.builtins.get(name) {
            Some(builtin) => Ok(Object::Builtin(builtin)),
            None => Err(RuntimeError::IdentifierNotFound(name.to_string()).into()),
        }
    }

    fn eval_hash_literal(&self, pairs: &[(Expression, Expression)], env: &MutEnv) -> R<Object> {
        let mut hash = BTreeMap::new();

        for (key, value) in pairs {
            let key = self.eval_expression(key, env)?;
            let hash_key = key.hash_key()?;
            let value = self.eval_expression(value, env)?;

            hash.insert(hash_key, HashPair { key, value });
        }

        Ok(Object::Hash(Rc::new(hash)))
    }

    fn apply_function(&self, function: Object, arguments: Vec<Object>) -> R<Object> {
        match function {
            Object::Function(function) => {
                if function.parameters.len() != arguments.len() {
                    return Err(RuntimeError::WrongArgumentCount {
                        want: function.parameters.len(),
                        got: arguments.len(),
                    }
                    .into());
                }

                let depth = self.depth.get();
                if depth >= MAX_CALL_DEPTH {
                    return Err(RuntimeError::StackOverflow.into());
                }

                let env = Environment::new_enclosed(function.env.clone());
                for (parameter, argument) in function.parameters.iter().zip(arguments) {
                    env.borrow_mut().set(parameter, argument);
                }

                self.depth.set(depth + 1);
                let result = stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, || {
                    self.eval_block(&function.body, &env)
                });
                self.depth.set(depth);

                match result {
                    Ok(value) | Err(Signal::Return(value)) => Ok(value),
                    Err(Signal::Break) => Err(RuntimeError::BreakOutsideLoop.into()),
                    Err(Signal::Continue) => Err(RuntimeError::ContinueOutsideLoop.into()),
                    Err(signal) => Err(signal),
                }
            }
            Object::Builtin(builtin) => Ok(builtin.call(&arguments)?),
            other => Err(RuntimeError::NotAFunction(other.type_name()).into()),
        }
    }
}

fn quote(arguments: &[Expression]) -> Result<Object, RuntimeError> {
    match arguments {
        [expression] => Ok(Object::Quote(Rc::new(expression.clone()))),
        _ => Err(RuntimeError::WrongArgumentCount {
            want: 1,
            got: arguments.len(),
        }),
    }
}

fn eval_prefix_expression(operator: &Token, right: Object) -> Result<Object, RuntimeError> {
    match (operator, &right) {
        (Token::Bang, _) => Ok(Object::from_native_bool(!right.is_truthy())),
        (Token::Minus, Object::Integer(i)) => Ok(Object::Integer(i.wrapping_neg())),
        _ => Err(RuntimeError::UnknownPrefixOperator {
            operator: operator.clone(),
            operand: right.type_name(),
        }),
    }
}

fn eval_infix_expression(
    operator: &Token,
    left: Object,
    right: Object,
) -> Result<Object, RuntimeError> {
    if left.type_name() != right.type_name() {
        return Err(RuntimeError::TypeMismatch {
            left: left.type_name(),
            operator: operator.clone(),
            right: right.type_name(),
        });
    }

    match (operator, &left, &right) {
        (_, Object::Integer(a), Object::Integer(b)) => eval_integer_infix_expression(operator, *a, *b),
        (Token::Eq, _, _) => Ok(Object::from_native_bool(left.is_identical(&right))),
        (Token::NotEq, _, _) => Ok(Object::from_native_bool(!left.is_identical(&right))),
        _ => Err(RuntimeError::UnknownInfixOperator {
            left: left.type_name(),
            operator: operator.clone(),
            right: right.type_name(),
        }),
    }
}

fn eval_integer_infix_expression(operator: &Token, a: i64, b: i64) -> Result<Object, RuntimeError> {
    let result = match operator {
        Token::Plus => Object::Integer(a.wrapping_add(b)),
        Token::Minus => Object::Integer(a.wrapping_sub(b)),
        Token::Asterisk => Object::Integer(a.wrapping_mul(b)),
        Token::Slash => Object::Integer(a.checked_div(b).ok_or(RuntimeError::DivisionByZero)?),
        Token::Lt => Object::from_native_bool(a < b),
        Token::Gt => Object::from_native_bool(a > b),
        Token::Eq => Object::from_native_bool(a == b),
        Token::NotEq => Object::from_native_bool(a != b),
        _ => {
            return Err(RuntimeError::UnknownInfixOperator {
                left: "INTEGER",
                operator: operator.clone(),
                right: "INTEGER",
            })
        }
    };

    Ok(result)
}

fn eval_index_expression(left: Object, index: Object) -> Result<Object, RuntimeError> {
    match (&left, &index) {
        (Object::Array(elements), Object::Integer(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| elements.get(i).cloned())
            .unwrap_or(NULL)),
        (Object::Hash(pairs), _) => Ok(pairs
            .get(&index.hash_key()?)
            .map(|pair| pair.value.clone())
            .unwrap_or(NULL)),
        _ => Err(RuntimeError::IndexNotSupported(left.type_name())),
    }
}
