use core::fmt;

use crate::instruction::Capture;
use crate::op::OpCode;
use crate::source_map::SourceMapBuilder;

/// A forward jump whose offset has not yet been resolved.
///
/// Created by [`BytecodeBuilder::jump`]. Resolve it with
/// [`BytecodeBuilder::bind`].
#[derive(Debug)]
#[must_use = "a forward jump must be bound"]
pub struct Label {
    /// Position of the u16 offset bytes in the buffer.
    offset_pos: usize,
}

/// A jump distance does not fit the 16-bit operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTooLarge {
    pub distance: usize,
}

impl fmt::Display for JumpTooLarge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "jump distance {} exceeds {}", self.distance, u16::MAX)
    }
}

impl std::error::Error for JumpTooLarge {}

/// Builds a bytecode byte sequence together with its pc→line map.
///
/// Call [`mark_line`](Self::mark_line) before emitting to attribute the
/// following bytes to a source line.
pub struct BytecodeBuilder {
    buf: Vec<u8>,
    lines: SourceMapBuilder,
    line: u32,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            lines: SourceMapBuilder::new(),
            line: 0,
        }
    }

    /// Current byte offset in the bytecode stream.
    pub fn current_offset(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Returns the bytecode and the encoded line map.
    pub fn finish(self) -> (Vec<u8>, Vec<u8>) {
        (self.buf, self.lines.finish())
    }

    /// Attribute bytes emitted from now on to `line`.
    pub fn mark_line(&mut self, line: u32) {
        if line != self.line || self.buf.is_empty() {
            self.lines.add(self.buf.len() as u32, line);
            self.line = line;
        }
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn emit_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn emit_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Emit an opcode without operands.
    pub fn op(&mut self, op: OpCode) {
        debug_assert!(
            !op.has_byte_operand() && !op.is_jump(),
            "{op:?} takes operands"
        );
        self.emit_u8(op as u8);
    }

    /// Emit an opcode with a single byte operand.
    pub fn op_with(&mut self, op: OpCode, operand: u8) {
        debug_assert!(op.has_byte_operand(), "{op:?} takes no byte operand");
        self.emit_u8(op as u8);
        self.emit_u8(operand);
    }

    /// `Invoke`/`SuperInvoke <name:u8> <argc:u8>`.
    pub fn invoke(&mut self, op: OpCode, name: u8, argc: u8) {
        debug_assert!(matches!(op, OpCode::Invoke | OpCode::SuperInvoke));
        self.emit_u8(op as u8);
        self.emit_u8(name);
        self.emit_u8(argc);
    }

    /// `Closure <idx:u8> <count:u16> (<is_local:u8> <index:u8>)*`.
    ///
    /// A function may capture 256 variables, one more than a byte counts.
    pub fn closure(&mut self, idx: u8, captures: &[Capture]) {
        debug_assert!(captures.len() <= u16::MAX as usize);
        self.emit_u8(OpCode::Closure as u8);
        self.emit_u8(idx);
        self.emit_u16(captures.len() as u16);
        for capture in captures {
            self.emit_u8(capture.is_local as u8);
            self.emit_u8(capture.index);
        }
    }

    // ── jumps ──────────────────────────────────────────────────────

    /// Emit a forward jump (`Jump` or `JumpIfFalse`) with a placeholder
    /// offset.
    pub fn jump(&mut self, op: OpCode) -> Label {
        debug_assert!(matches!(op, OpCode::Jump | OpCode::JumpIfFalse));
        self.emit_u8(op as u8);
        let offset_pos = self.buf.len();
        self.emit_u16(u16::MAX);
        Label { offset_pos }
    }

    /// Point a forward jump at the current offset.
    pub fn bind(&mut self, label: Label) -> Result<(), JumpTooLarge> {
        let distance = self.buf.len() - (label.offset_pos + 2);
        let offset = u16::try_from(distance)
            .map_err(|_| JumpTooLarge { distance })?;
        self.buf[label.offset_pos..label.offset_pos + 2]
            .copy_from_slice(&offset.to_le_bytes());
        Ok(())
    }

    /// Emit a backward jump to `loop_start`.
    ///
    /// The instruction is emitted even when the distance does not fit, with
    /// a saturated offset.
    pub fn loop_back(&mut self, loop_start: usize) -> Result<(), JumpTooLarge> {
        self.emit_u8(OpCode::Loop as u8);
        let distance = self.buf.len() + 2 - loop_start;
        match u16::try_from(distance) {
            Ok(offset) => {
                self.emit_u16(offset);
                Ok(())
            }
            Err(_) => {
                self.emit_u16(u16::MAX);
                Err(JumpTooLarge { distance })
            }
        }
    }
}

impl Default for BytecodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
