use std::{
    fmt::Display,
    ops::{Index, RangeFrom},
};

use byteorder::{BigEndian, ByteOrder};

use crate::common::error::RuntimeError;

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Instructions(pub Vec<u8>);

impl Instructions {
    pub fn new() -> Self {
        Instructions(vec![])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn append(&mut self, ins: Instructions) {
        self.0.extend(ins.0);
    }

    /// Overwrites the bytes starting at `pos` with `ins`.
    pub fn replace(&mut self, pos: usize, ins: &Instructions) {
        self.0[pos..pos + ins.len()].copy_from_slice(&ins.0);
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

impl Index<usize> for Instructions {
    type Output = u8;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl Index<RangeFrom<usize>> for Instructions {
    type Output = [u8];

    fn index(&self, index: RangeFrom<usize>) -> &Self::Output {
        &self.0[index]
    }
}

impl Display for Instructions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut i = 0;
        let Instructions(ins) = self;

        while i < ins.len() {
            let op = match Op::try_from(ins[i]) {
                Ok(op) => op,
                Err(err) => {
                    writeln!(f, "ERROR: {}", err)?;
                    i += 1;
                    continue;
                }
            };
            let def = Definition::lookup(&op);
            let (operands, read) = read_operands(&def, &ins[i + 1..]);

            let operands = operands
                .iter()
                .map(|operand| format!(" {}", operand))
                .collect::<String>();
            writeln!(f, "{:04} {}{}", i, def.name, operands)?;

            i += 1 + read;
        }

        Ok(())
    }
}

impl IntoIterator for Instructions {
    type Item = u8;
    type IntoIter = <Vec<u8> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<u8> for Instructions {
    fn from_iter<T: IntoIterator<Item = u8>>(iter: T) -> Self {
        Instructions(iter.into_iter().collect())
    }
}

type Opcode = u8;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum Op {
    Constant,
    Add,
    Sub,
    Mul,
    Div,
    Pop,
    True,
    False,
    Equal,
    NotEqual,
    GreaterThan,
    Minus,
    Bang,
    JumpNotTruthy,
    Jump,
    Null,
    GetGlobal,
    SetGlobal,
    Array,
    Hash,
    Index,
    Call,
    ReturnValue,
    Return,
    GetLocal,
    SetLocal,
    GetBuiltin,
    Closure,
    GetFree,
    SetFree,
}

const ALL_OPS: [Op; 30] = [
    Op::Constant,
    Op::Add,
    Op::Sub,
    Op::Mul,
    Op::Div,
    Op::Pop,
    Op::True,
    Op::False,
    Op::Equal,
    Op::NotEqual,
    Op::GreaterThan,
    Op::Minus,
    Op::Bang,
    Op::JumpNotTruthy,
    Op::Jump,
    Op::Null,
    Op::GetGlobal,
    Op::SetGlobal,
    Op::Array,
    Op::Hash,
    Op::Index,
    Op::Call,
    Op::ReturnValue,
    Op::Return,
    Op::GetLocal,
    Op::SetLocal,
    Op::GetBuiltin,
    Op::Closure,
    Op::GetFree,
    Op::SetFree,
];

impl TryFrom<u8> for Op {
    type Error = RuntimeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ALL_OPS
            .get(value as usize)
            .copied()
            .ok_or(RuntimeError::UnknownOpcode(value))
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Op{:?}", self)
    }
}

impl From<Op> for Opcode {
    fn from(value: Op) -> Self {
        value as u8
    }
}

pub struct Definition {
    name: String,
    /// list of size of each operand (in order) in bytes
    operand_widths: Vec<u8>,
}

impl Definition {
    pub fn lookup(op: &Op) -> Self {
        Self {
            name: op.to_string(),
            operand_widths: match op {
                Op::Constant
                | Op::JumpNotTruthy
                | Op::Jump
                | Op::GetGlobal
                | Op::SetGlobal
                | Op::Array
                | Op::Hash => vec![2],
                Op::Call
                | Op::GetLocal
                | Op::SetLocal
                | Op::GetBuiltin
                | Op::GetFree
                | Op::SetFree => vec![1],
                Op::Closure => vec![2, 1],
                _ => vec![],
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operand_widths(&self) -> &[u8] {
        &self.operand_widths
    }
}

pub fn make(op: Op, operands: &[usize]) -> Instructions {
    let def = Definition::lookup(&op);

    // total len of instruction in bytes
    let instruction_len = 1 + def.operand_widths.iter().map(|w| *w as usize).sum::<usize>();

    let mut instruction = vec![0; instruction_len];
    instruction[0] = op.into();

    let mut offset = 1;
    for (operand, width) in operands.iter().zip(def.operand_widths.iter()) {
        match width {
            2 => BigEndian::write_u16(&mut instruction[offset..], *operand as u16),
            _ => instruction[offset] = *operand as u8,
        }

        offset += *width as usize;
    }

    Instructions(instruction)
}

/// Decodes the operands of one instruction from the bytes that follow its
/// opcode, returning them with the number of bytes consumed.
pub fn read_operands(def: &Definition, ins: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = vec![0usize; def.operand_widths.len()];
    let mut offset = 0;

    for (operand, width) in operands.iter_mut().zip(def.operand_widths.iter()) {
        *operand = match width {
            2 => read_u16(&ins[offset..]),
            _ => ins[offset] as usize,
        };

        offset += *width as usize;
    }

    (operands, offset)
}

pub fn read_u16(ins: &[u8]) -> usize {
    BigEndian::read_u16(ins) as usize
}
