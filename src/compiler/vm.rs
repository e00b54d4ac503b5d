use std::{collections::BTreeMap, rc::Rc};

use tracing::{debug, trace};

use crate::common::{
    error::RuntimeError,
    object::{
        builtin::BuiltinTable, Capture, Closure, CompiledFunction, HashPair, Object, FALSE, NULL,
        TRUE,
    },
    token::Token,
};

use super::{
    code::{self, Op},
    compiler::Bytecode,
    frame::Frame,
};

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

type R<T> = Result<T, RuntimeError>;

pub struct Vm {
    constants: Vec<Object>,
    stack: Vec<Object>,
    sp: usize, // top of stack is stack[sp - 1]
    /// `None` marks a global slot that has not been assigned yet.
    globals: Vec<Option<Object>>,
    global_names: Vec<String>,
    frames: Vec<Frame>,
    builtins: Rc<BuiltinTable>,
}

impl Vm {
    pub fn new(bytecode: Bytecode, builtins: Rc<BuiltinTable>) -> Self {
        let main_fn = CompiledFunction {
            instructions: bytecode.instructions,
            ..Default::default()
        };
        let main_closure = Closure {
            func: Rc::new(main_fn),
            free: vec![],
        };

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(Rc::new(main_closure), 0));

        Self {
            constants: bytecode.constants,
            stack: vec![NULL; STACK_SIZE],
            sp: 0,
            globals: vec![None; GLOBALS_SIZE],
            global_names: bytecode.global_names,
            frames,
            builtins,
        }
    }

    pub fn stack_top(&self) -> &Object {
        if self.sp == 0 {
            return &NULL;
        }

        &self.stack[self.sp - 1]
    }

    /// The value most recently removed from the stack; after a run this is
    /// the value of the program's last expression statement.
    pub fn last_popped_value(&self) -> &Object {
        self.stack.get(self.sp).unwrap_or(&NULL)
    }

    fn push(&mut self, obj: Object) -> R<()> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }

        self.stack[self.sp] = obj;
        self.sp += 1;

        Ok(())
    }

    fn pop(&mut self) -> Object {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn read_u8(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let operand = frame.instructions()[frame.ip] as usize;
        frame.ip += 1;
        operand
    }

    fn read_u16(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let operand = code::read_u16(&frame.instructions()[frame.ip..]);
        frame.ip += 2;
        operand
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run(&mut self) -> R<()> {
        debug!(constants = self.constants.len(), "vm run started");

        let result = self.execute();
        match &result {
            Ok(()) => debug!(sp = self.sp, "vm run finished"),
            Err(err) => debug!(%err, "vm run failed"),
        }

        result
    }

    fn execute(&mut self) -> R<()> {
        while self.current_frame().ip < self.current_frame().instructions().len() {
            let op = Op::try_from(self.read_u8() as u8)?;
            trace!(ip = self.current_frame().ip - 1, sp = self.sp, %op, "dispatch");

            match op {
                Op::Constant => {
                    let const_index = self.read_u16();
                    self.push(self.constants[const_index].clone())?;
                }
                op @ (Op::Add | Op::Sub | Op::Mul | Op::Div) => {
                    self.execute_binary_operation(op)?
                }
                op @ (Op::Equal | Op::NotEqual | Op::GreaterThan) => {
                    self.execute_comparison(op)?
                }
                Op::Bang => {
                    let operand = self.pop();
                    self.push(Object::from_native_bool(!operand.is_truthy()))?;
                }
                Op::Minus => {
                    let operand = self.pop();
                    match operand {
                        Object::Integer(i) => self.push(Object::Integer(i.wrapping_neg()))?,
                        other => {
                            return Err(RuntimeError::UnknownPrefixOperator {
                                operator: Token::Minus,
                                operand: other.type_name(),
                            })
                        }
                    }
                }
                Op::Pop => {
                    self.pop();
                }
                Op::True => self.push(TRUE)?,
                Op::False => self.push(FALSE)?,
                Op::Null => self.push(NULL)?,
                Op::Jump => {
                    let position = self.read_u16();
                    self.current_frame_mut().ip = position;
                }
                Op::JumpNotTruthy => {
                    let position = self.read_u16();
                    if !self.pop().is_truthy() {
                        self.current_frame_mut().ip = position;
                    }
                }
                Op::SetGlobal => {
                    let index = self.read_u16();
                    self.globals[index] = Some(self.pop());
                }
                Op::GetGlobal => {
                    let index = self.read_u16();
                    let value = self.get_global(index)?;
                    self.push(value)?;
                }
                Op::SetLocal => {
                    let index = self.read_u8();
                    let value = self.pop();
                    let base_pointer = self.current_frame().base_pointer;
                    match self.current_frame().captured(index).cloned() {
                        Some(cell) => *cell.borrow_mut() = value,
                        None => self.stack[base_pointer + index] = value,
                    }
                }
                Op::GetLocal => {
                    let index = self.read_u8();
                    let base_pointer = self.current_frame().base_pointer;
                    let value = match self.current_frame().captured(index) {
                        Some(cell) => cell.borrow().clone(),
                        None => self.stack[base_pointer + index].clone(),
                    };
                    self.push(value)?;
                }
                Op::GetBuiltin => {
                    let index = self.read_u8();
                    let builtin = self
                        .builtins
                        .by_index(index)
                        .ok_or(RuntimeError::UnknownBuiltin(index))?;
                    self.push(Object::Builtin(builtin))?;
                }
                Op::GetFree => {
                    let index = self.read_u8();
                    let value = self.current_frame().closure.free[index].borrow().clone();
                    self.push(value)?;
                }
                Op::SetFree => {
                    let index = self.read_u8();
                    let value = self.pop();
                    *self.current_frame().closure.free[index].borrow_mut() = value;
                }
                Op::Array => {
                    let count = self.read_u16();
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Object::array(elements))?;
                }
                Op::Hash => {
                    let count = self.read_u16();
                    let hash = self.build_hash(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(hash)?;
                }
                Op::Index => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index_expression(left, index)?;
                }
                Op::Call => {
                    let num_args = self.read_u8();
                    self.execute_call(num_args)?;
                }
                Op::ReturnValue => {
                    let return_value = self.pop();

                    // `return` at top level ends the program.
                    let Some(frame) = self.pop_frame() else {
                        return Ok(());
                    };
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }
                Op::Return => {
                    let Some(frame) = self.pop_frame() else {
                        return Ok(());
                    };
                    self.sp = frame.base_pointer - 1;
                    self.push(NULL)?;
                }
                Op::Closure => {
                    let const_index = self.read_u16();
                    let num_free = self.read_u8();
                    self.push_closure(const_index, num_free)?;
                }
            }
        }

        Ok(())
    }

    fn get_global(&self, index: usize) -> R<Object> {
        match &self.globals[index] {
            Some(value) => Ok(value.clone()),
            None => {
                let name = self.global_names.get(index).cloned().unwrap_or_default();
                Err(RuntimeError::IdentifierNotFound(name))
            }
        }
    }

    /// Pops the current frame unless it is the main one.
    fn pop_frame(&mut self) -> Option<Frame> {
        if self.frames.len() == 1 {
            return None;
        }

        self.frames.pop()
    }

    fn execute_binary_operation(&mut self, op: Op) -> R<()> {
        let right = self.pop();
        let left = self.pop();

        if left.type_name() != right.type_name() {
            return Err(RuntimeError::TypeMismatch {
                left: left.type_name(),
                operator: operator_token(op),
                right: right.type_name(),
            });
        }

        match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                let result = match op {
                    Op::Add => l.wrapping_add(*r),
                    Op::Sub => l.wrapping_sub(*r),
                    Op::Mul => l.wrapping_mul(*r),
                    _ => l.checked_div(*r).ok_or(RuntimeError::DivisionByZero)?,
                };
                self.push(Object::Integer(result))
            }
            _ => Err(RuntimeError::UnknownInfixOperator {
                left: left.type_name(),
                operator: operator_token(op),
                right: right.type_name(),
            }),
        }
    }

    fn execute_comparison(&mut self, op: Op) -> R<()> {
        let right = self.pop();
        let left = self.pop();

        if left.type_name() != right.type_name() {
            return Err(RuntimeError::TypeMismatch {
                left: left.type_name(),
                operator: operator_token(op),
                right: right.type_name(),
            });
        }

        let result = match (op, &left, &right) {
            (Op::GreaterThan, Object::Integer(l), Object::Integer(r)) => l > r,
            (Op::Equal, _, _) => left.is_identical(&right),
            (Op::NotEqual, _, _) => !left.is_identical(&right),
            _ => {
                return Err(RuntimeError::UnknownInfixOperator {
                    left: left.type_name(),
                    operator: operator_token(op),
                    right: right.type_name(),
                })
            }
        };

        self.push(Object::from_native_bool(result))
    }

    fn execute_index_expression(&mut self, left: Object, index: Object) -> R<()> {
        let result = match (&left, &index) {
            (Object::Array(elements), Object::Integer(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| elements.get(i).cloned())
                .unwrap_or(NULL),
            (Object::Hash(pairs), _) => pairs
                .get(&index.hash_key()?)
                .map(|pair| pair.value.clone())
                .unwrap_or(NULL),
            _ => return Err(RuntimeError::IndexNotSupported(left.type_name())),
        };

        self.push(result)
    }

    fn build_hash(&self, start: usize, end: usize) -> R<Object> {
        let mut hash = BTreeMap::new();

        for i in (start..end).step_by(2) {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();

            hash.insert(key.hash_key()?, HashPair { key, value });
        }

        Ok(Object::Hash(Rc::new(hash)))
    }

    fn execute_call(&mut self, num_args: usize) -> R<()> {
        let callee = self.stack[self.sp - 1 - num_args].clone();

        match callee {
            Object::Closure(closure) => self.call_closure(closure, num_args),
            Object::Builtin(builtin) => {
                let args = self.stack[self.sp - num_args..self.sp].to_vec();
                let result = builtin.call(&args)?;

                self.sp -= num_args + 1;
                self.push(result)
            }
            other => Err(RuntimeError::NotAFunction(other.type_name())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> R<()> {
        if num_args != closure.func.num_parameters {
            return Err(RuntimeError::WrongArgumentCount {
                want: closure.func.num_parameters,
                got: num_args,
            });
        }

        let base_pointer = self.sp - num_args;
        let new_sp = base_pointer + closure.func.num_locals;
        if self.frames.len() >= MAX_FRAMES || new_sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }

        self.frames.push(Frame::new(closure, base_pointer));
        self.sp = new_sp;

        Ok(())
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> R<()> {
        let Object::CompiledFunction(func) = &self.constants[const_index] else {
            return Err(RuntimeError::NotAFunctionConstant(const_index));
        };

        let func = func.clone();
        let free = func
            .captures
            .iter()
            .take(num_free)
            .map(|capture| match *capture {
                Capture::Local(index) => {
                    let value = self.stack[self.current_frame().base_pointer + index].clone();
                    self.current_frame_mut().capture_local(index, value)
                }
                Capture::Free(index) => self.current_frame().closure.free[index].clone(),
            })
            .collect();

        self.push(Object::Closure(Rc::new(Closure { func, free })))
    }
}

fn operator_token(op: Op) -> Token {
    match op {
        Op::Add => Token::Plus,
        Op::Sub => Token::Minus,
        Op::Mul => Token::Asterisk,
        Op::Div => Token::Slash,
        Op::Equal => Token::Eq,
        Op::NotEqual => Token::NotEq,
        _ => Token::Gt,
    }
}

#[cfg(test)]
mod test_vm {
    use pretty_assertions::assert_eq;

    use crate::common::{ast::Program, lexer::Lexer, object::Object, parser::Parser};

    use super::super::compiler::Compiler;
    use super::*;

    struct VmTestCase<'a> {
        input: &'a str,
        expected: Object,
    }

    fn parse(input: &str) -> Program {
        let lexer = Lexer::new(input);
        let mut parser = Parser::new(lexer);

        parser.parse_program()
    }

    fn run(input: &str) -> R<Object> {
        let builtins = Rc::new(BuiltinTable::standard());
        let program = parse(input);
        let mut compiler = Compiler::new(&builtins);
        compiler.compile(&program).unwrap();

        let mut vm = Vm::new(compiler.byte_code(), builtins);
        vm.run()?;

        Ok(vm.last_popped_value().clone())
    }

    fn run_vm_tests(tests: Vec<VmTestCase>) {
        for t in tests {
            assert_eq!(run(t.input), Ok(t.expected), "input: {}", t.input);
        }
    }

    fn ints(values: &[i64]) -> Object {
        Object::array(values.iter().map(|v| Object::Integer(*v)).collect())
    }

    #[test]
    fn test_integer_arithmetic() {
        let tests = vec![
            VmTestCase {
                input: "1",
                expected: Object::Integer(1),
            },
            VmTestCase {
                input: "1 - 2",
                expected: Object::Integer(-1),
            },
            VmTestCase {
                input: "50 / 2 * 2 + 10 - 5",
                expected: Object::Integer(55),
            },
            VmTestCase {
                input: "5 * (2 + 10)",
                expected: Object::Integer(60),
            },
            VmTestCase {
                input: "-50 + 100 + -50",
                expected: Object::Integer(0),
            },
            VmTestCase {
                input: "-7 / 2",
                expected: Object::Integer(-3),
            },
            VmTestCase {
                input: "9223372036854775807 + 1",
                expected: Object::Integer(i64::MIN),
            },
        ];

        run_vm_tests(tests);
    }

    #[test]
    fn test_boolean_expressions() {
        let tests = vec![
            VmTestCase {
                input: "true",
                expected: TRUE,
            },
            VmTestCase {
                input: "1 < 2",
                expected: TRUE,
            },
            VmTestCase {
                input: "1 > 2",
                expected: FALSE,
            },
            VmTestCase {
                input: "(1 < 2) == true",
                expected: TRUE,
            },
            VmTestCase {
                input: "!5",
                expected: FALSE,
            },
            VmTestCase {
                input: "!0",
                expected: TRUE,
            },
            VmTestCase {
                input: "!(if (false) { 5; })",
                expected: TRUE,
            },
            VmTestCase {
                input: r#""a" == "a""#,
                expected: TRUE,
            },
            VmTestCase {
                input: "[1] == [1]",
                expected: FALSE,
            },
        ];

        run_vm_tests(tests);
    }

    #[test]
    fn test_conditionals() {
        let tests = vec![
            VmTestCase {
                input: "if (true) { 10 }",
                expected: Object::Integer(10),
            },
            VmTestCase {
                input: "if (1) { 1 } else { 2 }",
                expected: Object::Integer(1),
            },
            VmTestCase {
                input: "if (0) { 1 } else { 2 }",
                expected: Object::Integer(2),
            },
            VmTestCase {
                input: "if (1 > 2) { 10 }",
                expected: NULL,
            },
            VmTestCase {
                input: "if ((if (false) { 10 })) { 10 } else { 20 }",
                expected: Object::Integer(20),
            },
        ];

        run_vm_tests(tests);
    }

    #[test]
    fn test_global_let_and_assign_statements() {
        let tests = vec![
            VmTestCase {
                input: "let one = 1; one",
                expected: Object::Integer(1),
            },
            VmTestCase {
                input: "let one = 1; let two = one + one; one + two",
                expected: Object::Integer(3),
            },
            VmTestCase {
                input: "let x = 5; x = 6; x;",
                expected: Object::Integer(6),
            },
            VmTestCase {
                input: "let x = 1; fn() { x = 2; }(); x;",
                expected: Object::Integer(2),
            },
            VmTestCase {
                input: "fn() { y = 3; }(); y;",
                expected: Object::Integer(3),
            },
            VmTestCase {
                input: "let x = 1; let x = x + 1; x",
                expected: Object::Integer(2),
            },
        ];

        run_vm_tests(tests);
    }

    #[test]
    fn test_strings_arrays_and_hashes() {
        let tests = vec![
            VmTestCase {
                input: r#""monkey""#,
                expected: Object::Str("monkey".into()),
            },
            VmTestCase {
                input: "[1 + 2, 3 * 4]",
                expected: ints(&[3, 12]),
            },
            VmTestCase {
                input: "[1, 2, 3][1]",
                expected: Object::Integer(2),
            },
            VmTestCase {
                input: "[1, 2, 3][99]",
                expected: NULL,
            },
            VmTestCase {
                input: "[1][-1]",
                expected: NULL,
            },
            VmTestCase {
                input: "{1: 1, 2: 2}[2]",
                expected: Object::Integer(2),
            },
            VmTestCase {
                input: "{}[0]",
                expected: NULL,
            },
            VmTestCase {
                input: "len({1: 2, 3: 4})",
                expected: Object::Integer(2),
            },
        ];

        run_vm_tests(tests);
    }

    #[test]
    fn test_calling_functions() {
        let tests = vec![
            VmTestCase {
                input: "let fivePlusTen = fn() { 5 + 10; }; fivePlusTen();",
                expected: Object::Integer(15),
            },
            VmTestCase {
                input: "let earlyExit = fn() { return 99; 100; }; earlyExit();",
                expected: Object::Integer(99),
            },
            VmTestCase {
                input: "let noReturn = fn() { }; noReturn();",
                expected: NULL,
            },
            VmTestCase {
                input: "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2) + sum(3, 4);",
                expected: Object::Integer(10),
            },
            VmTestCase {
                input: "let g = 50; let f = fn(a) { let b = 2; a + b + g }; f(1) + f(2)",
                expected: Object::Integer(107),
            },
            VmTestCase {
                input: "return 7; 8;",
                expected: Object::Integer(7),
            },
        ];

        run_vm_tests(tests);
    }

    #[test]
    fn test_closures() {
        let tests = vec![
            VmTestCase {
                input: "let newClosure = fn(a) { fn() { a; }; }; let closure = newClosure(99); closure();",
                expected: Object::Integer(99),
            },
            VmTestCase {
                input: "let newAdder = fn(a, b) { fn(c) { a + b + c } }; let adder = newAdder(1, 2); adder(8);",
                expected: Object::Integer(11),
            },
            VmTestCase {
                input: "let a = fn(x) { fn(y) { fn(z) { x + y + z } } }; a(1)(2)(3)",
                expected: Object::Integer(6),
            },
            VmTestCase {
                input: "let fib = fn(n) { if (n < 2) { return n; } fib(n - 1) + fib(n - 2) }; fib(15);",
                expected: Object::Integer(610),
            },
            VmTestCase {
                input: "let wrapper = fn() { let countDown = fn(x) { if (x == 0) { return 0; } countDown(x - 1) }; countDown(3) }; wrapper();",
                expected: Object::Integer(0),
            },
            VmTestCase {
                input: "let counter = fn() { let n = 0; fn() { n = n + 1; n } }; let c = counter(); c(); c(); c()",
                expected: Object::Integer(3),
            },
            VmTestCase {
                input: "let f = fn() { let a = 1; let get = fn() { a }; a = 5; get() }; f()",
                expected: Object::Integer(5),
            },
            VmTestCase {
                input: "let f = fn(a) { let set = fn() { fn() { a = a * 2; } }; set()(); set()(); a }; f(3)",
                expected: Object::Integer(12),
            },
            VmTestCase {
                input: "let x = 1; let f = fn() { x }; let x = 2; f()",
                expected: Object::Integer(2),
            },
        ];

        run_vm_tests(tests);
    }

    #[test]
    fn test_for_statements() {
        let tests = vec![
            VmTestCase {
                input: "let n = 0; for (let i = 0; i < 3; i = i + 1) { if (i == 1) { continue; } n = n + 1; } n",
                expected: Object::Integer(2),
            },
            VmTestCase {
                input: "for (let i = 0; i < 3; i = i + 1) { if (i == 1) { continue; } }",
                expected: NULL,
            },
            VmTestCase {
                input: "let n = 0; for (let i = 0; i < 100; i = i + 1) { if (i == 5) { break; } n = i; } n",
                expected: Object::Integer(4),
            },
            VmTestCase {
                input: "let f = fn() { let n = 0; for (let i = 0; i < 4; i = i + 1) { n = n + i; } n }; f()",
                expected: Object::Integer(6),
            },
            VmTestCase {
                input: "let f = fn() { for (let i = 0; i < 10; i = i + 1) { if (i == 3) { return i; } } }; f()",
                expected: Object::Integer(3),
            },
            VmTestCase {
                input: "let n = 0; for (let i = 0; i < 3000; i = i + 1) { n = n + 1; 1 + if (true) { continue; } else { 0 }; } n",
                expected: Object::Integer(3000),
            },
            VmTestCase {
                input: "let n = 0; for (let i = 0; i < 3000; i = i + 1) { n = i; [1, 2, if (i == 2999) { break; } else { 3 }]; } n",
                expected: Object::Integer(2999),
            },
            VmTestCase {
                input: "let f = fn() { let n = 0; for (let i = 0; i < 3000; i = i + 1) { n = n + 1; 1 + if (true) { continue; } else { 0 }; } n }; f()",
                expected: Object::Integer(3000),
            },
        ];

        run_vm_tests(tests);
    }

    #[test]
    fn test_builtin_functions() {
        let tests = vec![
            VmTestCase {
                input: r#"len("abc")"#,
                expected: Object::Integer(3),
            },
            VmTestCase {
                input: "first([1, 2, 3])",
                expected: Object::Integer(1),
            },
            VmTestCase {
                input: "rest([])",
                expected: NULL,
            },
            VmTestCase {
                input: "push([1, 2], 3)",
                expected: ints(&[1, 2, 3]),
            },
            VmTestCase {
                input: "let a = [1, 2]; let b = push(a, 3); a == b",
                expected: FALSE,
            },
            VmTestCase {
                input: "puts(1)",
                expected: NULL,
            },
        ];

        run_vm_tests(tests);
    }

    #[test]
    fn test_runtime_errors() {
        let tests = vec![
            (
                "5 + true",
                RuntimeError::TypeMismatch {
                    left: "INTEGER",
                    operator: Token::Plus,
                    right: "BOOLEAN",
                },
            ),
            (
                "-true",
                RuntimeError::UnknownPrefixOperator {
                    operator: Token::Minus,
                    operand: "BOOLEAN",
                },
            ),
            (
                r#""a" + "b""#,
                RuntimeError::UnknownInfixOperator {
                    left: "STRING",
                    operator: Token::Plus,
                    right: "STRING",
                },
            ),
            ("1 / 0", RuntimeError::DivisionByZero),
            ("1()", RuntimeError::NotAFunction("INTEGER")),
            (
                "fn(a) { a }()",
                RuntimeError::WrongArgumentCount { want: 1, got: 0 },
            ),
            (
                "len(42)",
                RuntimeError::BuiltinArgument {
                    name: "len",
                    got: "INTEGER",
                },
            ),
            ("{[1]: 2}", RuntimeError::UnusableHashKey("ARRAY")),
            ("1[0]", RuntimeError::IndexNotSupported("INTEGER")),
            (
                "let f = fn(n) { f(n + 1) }; f(0)",
                RuntimeError::StackOverflow,
            ),
            ("missing", RuntimeError::IdentifierNotFound("missing".into())),
            (
                "let f = fn() { g() }; f(); let g = 1;",
                RuntimeError::IdentifierNotFound("g".into()),
            ),
        ];

        for (input, expected) in tests {
            assert_eq!(run(input), Err(expected), "input: {}", input);
        }
    }

    #[test]
    fn test_late_bound_globals() {
        let tests = vec![
            VmTestCase {
                input: "let f = fn() { g() }; let g = fn() { 7 }; f()",
                expected: Object::Integer(7),
            },
            VmTestCase {
                input: "if (false) { missing } else { 1 }",
                expected: Object::Integer(1),
            },
            VmTestCase {
                input: "let isEven = fn(n) { if (n == 0) { true } else { isOdd(n - 1) } }; let isOdd = fn(n) { if (n == 0) { false } else { isEven(n - 1) } }; isEven(10)",
                expected: TRUE,
            },
        ];

        run_vm_tests(tests);
    }

    #[test]
    fn test_quote() {
        assert_eq!(run("quote(a + b)").map(|q| q.to_string()), Ok("QUOTE((a + b))".into()));
        assert_eq!(run("let quote = fn(x) { x * 2 }; quote(4)"), Ok(Object::Integer(8)));
    }

    #[test]
    fn test_last_popped_value_after_overflow() {
        let builtins = Rc::new(BuiltinTable::standard());
        let input = format!("[{}]", vec!["0"; STACK_SIZE + 1].join(", "));
        let mut compiler = Compiler::new(&builtins);
        compiler.compile(&parse(&input)).unwrap();

        let mut vm = Vm::new(compiler.byte_code(), builtins);

        assert_eq!(vm.run(), Err(RuntimeError::StackOverflow));
        assert_eq!(vm.last_popped_value(), &NULL);
    }

    #[test]
    fn test_stack_is_balanced_after_statements() {
        let builtins = Rc::new(BuiltinTable::standard());
        let program = parse("1; let a = [1, 2]; if (a[0] == 1) { 2 }; for (let i = 0; i < 2; i = i + 1) { i; }");
        let mut compiler = Compiler::new(&builtins);
        compiler.compile(&program).unwrap();

        let mut vm = Vm::new(compiler.byte_code(), builtins);
        vm.run().unwrap();

        assert_eq!(vm.stack_top(), &NULL);
        assert_eq!(vm.sp, 0);
    }
}
