use core::fmt;

use crate::instruction::{Capture, Instruction};
use crate::op::OpCode;

/// Failure to decode an instruction from a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The byte at `pc` is not a known opcode.
    UnknownOpcode { pc: usize, byte: u8 },
    /// The stream ended in the middle of the instruction starting at `pc`.
    Truncated { pc: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode { pc, byte } => {
                write!(f, "unknown opcode 0x{byte:02x} at {pc:04}")
            }
            Self::Truncated { pc } => {
                write!(f, "truncated instruction at {pc:04}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode the instruction starting at `pc`.
///
/// Returns the instruction and the offset of the byte following it. For
/// `Closure` the returned offset points at the first capture pair.
pub fn decode_at(
    bytes: &[u8],
    pc: usize,
) -> Result<(Instruction, usize), DecodeError> {
    let mut cursor = Cursor { bytes, pos: pc, start: pc };
    let byte = cursor.read_u8()?;
    let op = OpCode::try_from(byte)
        .map_err(|byte| DecodeError::UnknownOpcode { pc, byte })?;

    let instruction = match op {
        OpCode::Constant => Instruction::Constant { idx: cursor.read_u8()? },
        OpCode::Nil => Instruction::Nil,
        OpCode::True => Instruction::True,
        OpCode::False => Instruction::False,
        OpCode::Pop => Instruction::Pop,
        OpCode::GetLocal => Instruction::GetLocal { slot: cursor.read_u8()? },
        OpCode::SetLocal => Instruction::SetLocal { slot: cursor.read_u8()? },
        OpCode::GetGlobal => Instruction::GetGlobal { name: cursor.read_u8()? },
        OpCode::DefineGlobal => {
            Instruction::DefineGlobal { name: cursor.read_u8()? }
        }
        OpCode::SetGlobal => Instruction::SetGlobal { name: cursor.read_u8()? },
        OpCode::GetUpvalue => {
            Instruction::GetUpvalue { slot: cursor.read_u8()? }
        }
        OpCode::SetUpvalue => {
            Instruction::SetUpvalue { slot: cursor.read_u8()? }
        }
        OpCode::GetProperty => {
            Instruction::GetProperty { name: cursor.read_u8()? }
        }
        OpCode::SetProperty => {
            Instruction::SetProperty { name: cursor.read_u8()? }
        }
        OpCode::GetSuper => Instruction::GetSuper { name: cursor.read_u8()? },
        OpCode::Equal => Instruction::Equal,
        OpCode::Greater => Instruction::Greater,
        OpCode::Less => Instruction::Less,
        OpCode::Add => Instruction::Add,
        OpCode::Subtract => Instruction::Subtract,
        OpCode::Multiply => Instruction::Multiply,
        OpCode::Divide => Instruction::Divide,
        OpCode::Not => Instruction::Not,
        OpCode::Negate => Instruction::Negate,
        OpCode::Print => Instruction::Print,
        OpCode::Jump => Instruction::Jump { offset: cursor.read_u16()? },
        OpCode::JumpIfFalse => {
            Instruction::JumpIfFalse { offset: cursor.read_u16()? }
        }
        OpCode::Loop => Instruction::Loop { offset: cursor.read_u16()? },
        OpCode::Call => Instruction::Call { argc: cursor.read_u8()? },
        OpCode::Invoke => Instruction::Invoke {
            name: cursor.read_u8()?,
            argc: cursor.read_u8()?,
        },
        OpCode::SuperInvoke => Instruction::SuperInvoke {
            name: cursor.read_u8()?,
            argc: cursor.read_u8()?,
        },
        OpCode::Closure => Instruction::Closure {
            idx: cursor.read_u8()?,
            captures: cursor.read_u16()?,
        },
        OpCode::CloseUpvalue => Instruction::CloseUpvalue,
        OpCode::Return => Instruction::Return,
        OpCode::Class => Instruction::Class { name: cursor.read_u8()? },
        OpCode::Inherit => Instruction::Inherit,
        OpCode::Method => Instruction::Method { name: cursor.read_u8()? },
    };

    Ok((instruction, cursor.pos))
}

/// Decode one capture pair following an `OP_CLOSURE` instruction.
pub fn decode_capture(
    bytes: &[u8],
    pos: usize,
) -> Result<(Capture, usize), DecodeError> {
    let mut cursor = Cursor { bytes, pos, start: pos };
    let is_local = cursor.read_u8()? != 0;
    let index = cursor.read_u8()?;
    Ok((Capture { is_local, index }, cursor.pos))
}

/// Sequential decoder over a whole byte stream, used for listings.
///
/// Capture pairs of `Closure` instructions are consumed together with the
/// instruction and returned alongside it.
pub struct BytecodeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current byte offset in the stream.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Decode the next instruction, or `None` at end-of-stream.
    ///
    /// A decode error ends the stream.
    pub fn decode_next(
        &mut self,
    ) -> Option<Result<(usize, Instruction, Vec<Capture>), DecodeError>> {
        if self.is_at_end() {
            return None;
        }
        let pc = self.pos;
        let result = self.decode_one(pc);
        if result.is_err() {
            self.pos = self.bytes.len();
        }
        Some(result)
    }

    fn decode_one(
        &mut self,
        pc: usize,
    ) -> Result<(usize, Instruction, Vec<Capture>), DecodeError> {
        let (instruction, mut next) = decode_at(self.bytes, pc)?;
        let mut captures = Vec::new();
        if let Instruction::Closure { captures: count, .. } = instruction {
            for _ in 0..count {
                let (capture, after) = decode_capture(self.bytes, next)?;
                captures.push(capture);
                next = after;
            }
        }
        self.pos = next;
        Ok((pc, instruction, captures))
    }
}

impl Iterator for BytecodeDecoder<'_> {
    type Item = Result<(usize, Instruction, Vec<Capture>), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decode_next()
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    start: usize,
}

impl Cursor<'_> {
    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(DecodeError::Truncated { pc: self.start })?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let lo = self.read_u8()?;
        let hi = self.read_u8()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }
}
