use std::{mem, rc::Rc};

use thiserror::Error;
use tracing::debug;

use crate::common::{
    ast::{BlockStatement, Expression, Program, Statement},
    object::{builtin::BuiltinTable, Capture, CompiledFunction, Object},
    token::Token,
};

use super::{
    code::{self, Instructions, Op},
    symbol_table::{Symbol, SymbolScope, SymbolTable},
};

const MAX_CONSTANTS: usize = 1 << 16;
const MAX_GLOBALS: usize = 1 << 16;
const MAX_LOCALS: usize = 1 << 8;

// Operand written before a jump target is known.
const PLACEHOLDER: usize = 9999;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("unknown operator: {0}")]
    UnknownOperator(Token),
    #[error("break outside loop")]
    BreakOutsideLoop,
    #[error("continue outside loop")]
    ContinueOutsideLoop,
    #[error("wrong number of arguments: want=1, got={0}")]
    QuoteArity(usize),
    #[error("too many constants")]
    TooManyConstants,
    #[error("too many global bindings")]
    TooManyGlobals,
    #[error("too many local bindings")]
    TooManyLocals,
    #[error("too many free variables")]
    TooManyFreeVariables,
    #[error("too many arguments: {0}")]
    TooManyArguments(usize),
    #[error("too many elements in literal: {0}")]
    TooManyElements(usize),
    #[error("jump target out of range: {0}")]
    JumpOutOfRange(usize),
}

type R<T> = Result<T, CompileError>;

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    op: Op,
    position: usize,
}

/// Jumps out of the innermost loop, patched once the loop's end is known.
#[derive(Debug, Default)]
struct LoopContext {
    /// Operand stack depth at the top of the body; jumps leaving the body pop
    /// back down to it.
    depth: usize,
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
    loops: Vec<LoopContext>,
    /// Operand stack depth the emitted code leaves, relative to the frame.
    depth: usize,
}

pub struct Compiler {
    constants: Vec<Object>,
    symbol_table: SymbolTable,
    scope: CompilationScope,
    enclosing_scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(&BuiltinTable::standard())
    }
}

impl Compiler {
    pub fn new(builtins: &BuiltinTable) -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in builtins.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        Self {
            constants: vec![],
            symbol_table,
            scope: CompilationScope::default(),
            enclosing_scopes: vec![],
        }
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn compile(&mut self, program: &Program) -> R<()> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }

        debug!(
            instructions = self.scope.instructions.len(),
            constants = self.constants.len(),
            "compiled program"
        );

        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Statement) -> R<()> {
        match stmt {
            Statement::Expression { value } => {
                self.compile_expression(value)?;
                self.emit(Op::Pop, &[]);
            }
            Statement::Let { name, value } => {
                // A function body only runs after the binding exists, so it
                // may refer to the name it is bound to.
                let symbol = match value {
                    Expression::Function { parameters, body } => {
                        let symbol = self.symbol_table.define(name);
                        self.compile_function(parameters, body)?;
                        symbol
                    }
                    value => {
                        self.compile_expression(value)?;
                        self.symbol_table.define(name)
                    }
                };
                self.store_symbol(&symbol)?;
            }
            Statement::Assign { name, value } => {
                self.compile_expression(value)?;

                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .unwrap_or_else(|| self.symbol_table.define_in_root(name));
                self.store_symbol(&symbol)?;
            }
            Statement::Return { value } => {
                self.compile_expression(value)?;
                self.emit(Op::ReturnValue, &[]);
            }
            Statement::Block(block) => {
                self.symbol_table.enter_block();
                let result = self.compile_block(block);
                self.symbol_table.leave_block();
                result?;
            }
            Statement::For {
                init,
                condition,
                post,
                body,
            } => {
                self.symbol_table.enter_block();
                let result = self.compile_for_statement(init, condition, post, body);
                self.symbol_table.leave_block();
                result?;
            }
            Statement::Break => {
                let position = self
                    .emit_loop_exit()
                    .ok_or(CompileError::BreakOutsideLoop)?;
                if let Some(ctx) = self.scope.loops.last_mut() {
                    ctx.breaks.push(position);
                }
            }
            Statement::Continue => {
                let position = self
                    .emit_loop_exit()
                    .ok_or(CompileError::ContinueOutsideLoop)?;
                if let Some(ctx) = self.scope.loops.last_mut() {
                    ctx.continues.push(position);
                }
            }
        }

        Ok(())
    }

    /// Drops operands left by enclosing expressions and emits an unpatched
    /// jump. Returns `None` outside a loop.
    fn emit_loop_exit(&mut self) -> Option<usize> {
        let loop_depth = self.scope.loops.last()?.depth;
        for _ in loop_depth..self.scope.depth {
            self.emit(Op::Pop, &[]);
        }

        Some(self.emit(Op::Jump, &[PLACEHOLDER]))
    }

    fn compile_block(&mut self, block: &BlockStatement) -> R<()> {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }

        Ok(())
    }

    fn compile_for_statement(
        &mut self,
        init: &Statement,
        condition: &Expression,
        post: &Statement,
        body: &BlockStatement,
    ) -> R<()> {
        self.compile_statement(init)?;

        let condition_position = self.scope.instructions.len();
        self.compile_expression(condition)?;
        let exit_jump = self.emit(Op::JumpNotTruthy, &[PLACEHOLDER]);

        self.scope.loops.push(LoopContext {
            depth: self.scope.depth,
            ..Default::default()
        });
        let body_result = self.compile_block(body);
        let ctx = self.scope.loops.pop().unwrap_or_default();
        body_result?;

        let post_position = self.scope.instructions.len();
        self.compile_statement(post)?;
        self.emit(Op::Jump, &[check_jump_target(condition_position)?]);

        let after_loop = self.scope.instructions.len();
        self.change_operand(exit_jump, after_loop)?;
        for position in ctx.breaks {
            self.change_operand(position, after_loop)?;
        }
        for position in ctx.continues {
            self.change_operand(position, post_position)?;
        }

        // The loop's own value.
        self.emit(Op::Null, &[]);
        self.emit(Op::Pop, &[]);

        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expression) -> R<()> {
        match expr {
            Expression::Integer(i) => {
                let ident = self.add_constant(Object::Integer(*i))?;
                self.emit(Op::Constant, &[ident]);
            }
            Expression::Float(f) => {
                let ident = self.add_constant(Object::Float(*f))?;
                self.emit(Op::Constant, &[ident]);
            }
            Expression::Str(s) => {
                let ident = self.add_constant(Object::Str(s.clone()))?;
                self.emit(Op::Constant, &[ident]);
            }
            Expression::Boolean(b) => {
                let op = match b {
                    true => Op::True,
                    false => Op::False,
                };
                self.emit(op, &[]);
            }
            Expression::Identifier(name) => {
                // Unknown names become globals that may be bound later; the VM
                // reports them if they are read while still unset.
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .unwrap_or_else(|| self.symbol_table.define_in_root(name));
                self.load_symbol(&symbol)?;
            }
            Expression::Infix(left, operator, right) => {
                if let Token::Lt = operator {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Op::GreaterThan, &[]);
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;

                let _ = match operator {
                    Token::Plus => self.emit(Op::Add, &[]),
                    Token::Minus => self.emit(Op::Sub, &[]),
                    Token::Asterisk => self.emit(Op::Mul, &[]),
                    Token::Slash => self.emit(Op::Div, &[]),
                    Token::Gt => self.emit(Op::GreaterThan, &[]),
                    Token::Eq => self.emit(Op::Equal, &[]),
                    Token::NotEq => self.emit(Op::NotEqual, &[]),
                    other => return Err(CompileError::UnknownOperator(other.clone())),
                };
            }
            Expression::Prefix(operator, expr) => {
                self.compile_expression(expr)?;
                let _ = match operator {
                    Token::Bang => self.emit(Op::Bang, &[]),
                    Token::Minus => self.emit(Op::Minus, &[]),
                    other => return Err(CompileError::UnknownOperator(other.clone())),
                };
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;
                let jump_not_truthy = self.emit(Op::JumpNotTruthy, &[PLACEHOLDER]);
                let depth = self.scope.depth;

                self.compile_branch(consequence)?;
                let jump = self.emit(Op::Jump, &[PLACEHOLDER]);

                let after_consequence = self.scope.instructions.len();
                self.change_operand(jump_not_truthy, after_consequence)?;

                self.scope.depth = depth;
                match alternative {
                    Some(alternative) => self.compile_branch(alternative)?,
                    None => {
                        self.emit(Op::Null, &[]);
                    }
                }

                let after_alternative = self.scope.instructions.len();
                self.change_operand(jump, after_alternative)?;
                self.scope.depth = depth + 1;
            }
            Expression::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                let count = check_u16_count(elements.len())?;
                self.emit(Op::Array, &[count]);
            }
            Expression::Hash(pairs) => {
                for (key, value) in pairs {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                let count = check_u16_count(pairs.len() * 2)?;
                self.emit(Op::Hash, &[count]);
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Op::Index, &[]);
            }
            Expression::Function { parameters, body } => self.compile_function(parameters, body)?,
            Expression::Call {
                function,
                arguments,
            } => {
                // `quote` is special only while no binding shadows it.
                if let Expression::Identifier(name) = function.as_ref() {
                    if name == "quote" && self.symbol_table.resolve(name).is_none() {
                        return self.compile_quote(arguments);
                    }
                }

                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                if arguments.len() >= MAX_LOCALS {
                    return Err(CompileError::TooManyArguments(arguments.len()));
                }
                self.emit(Op::Call, &[arguments.len()]);
            }
        }

        Ok(())
    }

    /// Compiles an `if` branch so that it leaves exactly one value.
    fn compile_branch(&mut self, block: &BlockStatement) -> R<()> {
        let start = self.scope.instructions.len();
        self.compile_block(block)?;

        if self.last_instruction_is(Op::Pop, start) {
            self.remove_last_pop();
        } else {
            self.emit(Op::Null, &[]);
        }

        Ok(())
    }

    fn compile_function(&mut self, parameters: &[String], body: &BlockStatement) -> R<()> {
        self.enter_scope();

        for parameter in parameters {
            self.symbol_table.define(parameter);
        }

        if let Err(err) = self.compile_block(body) {
            self.leave_scope();
            return Err(err);
        }

        if self.last_instruction_is(Op::Pop, 0) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Op::ReturnValue, 0) {
            self.emit(Op::Return, &[]);
        }

        let free_symbols = self.symbol_table.free_symbols().to_vec();
        let num_locals = self.symbol_table.num_definitions();
        let instructions = self.leave_scope();

        if num_locals > MAX_LOCALS {
            return Err(CompileError::TooManyLocals);
        }
        if free_symbols.len() >= MAX_LOCALS {
            return Err(CompileError::TooManyFreeVariables);
        }

        // Free symbols are always locals or free variables of the enclosing
        // function; globals and builtins are never captured.
        let captures = free_symbols
            .iter()
            .map(|symbol| match symbol.scope {
                SymbolScope::Free => Capture::Free(symbol.index),
                _ => Capture::Local(symbol.index),
            })
            .collect::<Vec<_>>();

        let function = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: parameters.len(),
            captures,
        };
        let ident = self.add_constant(Object::CompiledFunction(Rc::new(function)))?;
        self.emit(Op::Closure, &[ident, free_symbols.len()]);

        Ok(())
    }

    fn compile_quote(&mut self, arguments: &[Expression]) -> R<()> {
        let [expression] = arguments else {
            return Err(CompileError::QuoteArity(arguments.len()));
        };

        let ident = self.add_constant(Object::Quote(Rc::new(expression.clone())))?;
        self.emit(Op::Constant, &[ident]);

        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) -> R<()> {
        if symbol.scope == SymbolScope::Global && symbol.index >= MAX_GLOBALS {
            return Err(CompileError::TooManyGlobals);
        }

        let _ = match symbol.scope {
            SymbolScope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Op::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Op::GetFree, &[symbol.index]),
        };

        Ok(())
    }

    fn store_symbol(&mut self, symbol: &Symbol) -> R<()> {
        match symbol.scope {
            SymbolScope::Global if symbol.index >= MAX_GLOBALS => Err(CompileError::TooManyGlobals),
            SymbolScope::Global => {
                self.emit(Op::SetGlobal, &[symbol.index]);
                Ok(())
            }
            SymbolScope::Local if symbol.index >= MAX_LOCALS => Err(CompileError::TooManyLocals),
            SymbolScope::Local => {
                self.emit(Op::SetLocal, &[symbol.index]);
                Ok(())
            }
            SymbolScope::Free => {
                self.emit(Op::SetFree, &[symbol.index]);
                Ok(())
            }
            // Builtins are read-only; assigning one binds a root global that
            // hides it from then on.
            SymbolScope::Builtin => {
                let symbol = self.symbol_table.define_in_root(&symbol.name);
                self.store_symbol(&symbol)
            }
        }
    }

    fn add_constant(&mut self, obj: Object) -> R<usize> {
        if self.constants.len() >= MAX_CONSTANTS {
            return Err(CompileError::TooManyConstants);
        }

        self.constants.push(obj);
        Ok(self.constants.len() - 1)
    }

    pub fn byte_code(self) -> Bytecode {
        Bytecode {
            instructions: self.scope.instructions,
            constants: self.constants,
            global_names: self.symbol_table.global_names().to_vec(),
        }
    }

    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let ins = code::make(op, operands);
        let position = self.add_instruction(ins);

        self.scope.previous_instruction = self.scope.last_instruction;
        self.scope.last_instruction = Some(EmittedInstruction { op, position });
        self.scope.depth = self
            .scope
            .depth
            .saturating_add_signed(stack_effect(op, operands));

        position
    }

    fn add_instruction(&mut self, ins: Instructions) -> usize {
        let pos = self.scope.instructions.len();
        self.scope.instructions.append(ins);
        pos
    }

    /// Whether the last emitted instruction is `op` and sits at or after `since`.
    fn last_instruction_is(&self, op: Op, since: usize) -> bool {
        self.scope
            .last_instruction
            .is_some_and(|last| last.op == op && last.position >= since)
    }

    fn remove_last_pop(&mut self) {
        if let Some(last) = self.scope.last_instruction {
            self.scope.instructions.truncate(last.position);
            self.scope.last_instruction = self.scope.previous_instruction;
            self.scope.depth += 1;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        if let Some(last) = self.scope.last_instruction.as_mut() {
            let position = last.position;
            last.op = Op::ReturnValue;
            self.scope
                .instructions
                .replace(position, &code::make(Op::ReturnValue, &[]));
        }
    }

    fn change_operand(&mut self, position: usize, operand: usize) -> R<()> {
        let operand = check_jump_target(operand)?;
        if let Ok(op) = Op::try_from(self.scope.instructions[position]) {
            self.scope
                .instructions
                .replace(position, &code::make(op, &[operand]));
        }

        Ok(())
    }

    fn enter_scope(&mut self) {
        let outer = mem::take(&mut self.scope);
        self.enclosing_scopes.push(outer);

        let outer_table = mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer_table);
    }

    fn leave_scope(&mut self) -> Instructions {
        let outer = self.enclosing_scopes.pop().unwrap_or_default();
        let inner = mem::replace(&mut self.scope, outer);

        if let Some(outer_table) = self.symbol_table.take_outer() {
            self.symbol_table = outer_table;
        }

        inner.instructions
    }
}

/// Net change in operand stack depth from executing `op`.
fn stack_effect(op: Op, operands: &[usize]) -> isize {
    let count = operands.first().map_or(0, |count| *count as isize);

    match op {
        Op::Constant
        | Op::True
        | Op::False
        | Op::Null
        | Op::GetGlobal
        | Op::GetLocal
        | Op::GetBuiltin
        | Op::GetFree
        | Op::Closure => 1,
        Op::Add
        | Op::Sub
        | Op::Mul
        | Op::Div
        | Op::Equal
        | Op::NotEqual
        | Op::GreaterThan
        | Op::Pop
        | Op::JumpNotTruthy
        | Op::SetGlobal
        | Op::SetLocal
        | Op::SetFree
        | Op::Index
        | Op::ReturnValue => -1,
        Op::Minus | Op::Bang | Op::Jump | Op::Return => 0,
        Op::Array | Op::Hash => 1 - count,
        Op::Call => -count,
    }
}

fn check_u16_count(count: usize) -> R<usize> {
    if count > u16::MAX as usize {
        return Err(CompileError::TooManyElements(count));
    }

    Ok(count)
}

fn check_jump_target(target: usize) -> R<usize> {
    if target > u16::MAX as usize {
        return Err(CompileError::JumpOutOfRange(target));
    }

    Ok(target)
}

#[derive(Debug)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
    /// Source names of the global slots, for reporting unset globals.
    pub global_names: Vec<String>,
}
