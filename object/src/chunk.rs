use crate::Value;

/// Bytecode, its encoded pc→line map and the constant pool.
#[derive(Debug, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub lines: Vec<u8>,
    pub constants: Vec<Value>,
}

impl Chunk {
    /// Source line of the instruction at `pc`, or 0 if unknown.
    pub fn line_at(&self, pc: usize) -> u32 {
        bytecode::line_at(&self.lines, pc as u32).unwrap_or(0)
    }
}
