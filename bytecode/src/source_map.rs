//! Delta-encoded VLQ source map: maps bytecode PCs to source lines.
//!
//! Each entry is 2 VLQ values:
//! - `delta_pc` (unsigned VLQ)
//! - `delta_line` (signed, zigzag + VLQ)
//!
//! An entry is only recorded when the line changes, so straight-line code
//! on one source line costs a single entry.

/// Accumulates source map entries during compilation.
pub struct SourceMapBuilder {
    entries: Vec<(u32, u32)>, // (pc, line)
}

impl SourceMapBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record that code from `pc` onwards belongs to `line`.
    pub fn add(&mut self, pc: u32, line: u32) {
        if let Some(last) = self.entries.last_mut() {
            if last.0 == pc {
                last.1 = line;
                return;
            }
        }
        self.entries.push((pc, line));
    }

    /// Produce the delta-encoded VLQ byte stream.
    pub fn finish(self) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut prev_pc: u32 = 0;
        let mut prev_line: i64 = 0;

        for (pc, line) in &self.entries {
            let delta_pc = pc - prev_pc;
            let delta_line = *line as i64 - prev_line;

            encode_unsigned_vlq(delta_pc, &mut buf);
            encode_unsigned_vlq(zigzag_encode(delta_line), &mut buf);

            prev_pc = *pc;
            prev_line = *line as i64;
        }

        buf
    }
}

impl Default for SourceMapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up the source line for `target_pc` in a delta-encoded source map.
/// Returns the line of the last entry with `pc <= target_pc`.
pub fn line_at(encoded: &[u8], target_pc: u32) -> Option<u32> {
    let mut pos = 0;
    let mut pc: u32 = 0;
    let mut line: i64 = 0;
    let mut best = None;

    while pos < encoded.len() {
        let delta_pc = decode_unsigned_vlq(encoded, &mut pos)?;
        let delta_line = zigzag_decode(decode_unsigned_vlq(encoded, &mut pos)?);

        pc += delta_pc;
        line += delta_line;

        if pc > target_pc {
            break;
        }
        best = Some(line as u32);
    }

    best
}

// ── VLQ helpers ─────────────────────────────────────────────────────

/// Encode an unsigned integer as a variable-length quantity.
/// Each byte uses 7 data bits + 1 continuation bit (MSB).
fn encode_unsigned_vlq(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode an unsigned VLQ from `encoded` starting at `pos`.
/// Advances `pos` past the consumed bytes.
fn decode_unsigned_vlq(encoded: &[u8], pos: &mut usize) -> Option<u32> {
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = *encoded.get(*pos)?;
        *pos += 1;
        result |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            return Some(result);
        }
        shift += 7;
        if shift >= 35 {
            return None;
        }
    }
}

fn zigzag_encode(value: i64) -> u32 {
    ((value << 1) ^ (value >> 63)) as u32
}

fn zigzag_decode(value: u32) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}
