mod op;
mod instruction;
mod builder;
mod decoder;
mod source_map;

pub use op::OpCode;
pub use instruction::{Capture, Instruction};
pub use builder::{BytecodeBuilder, JumpTooLarge, Label};
pub use decoder::{BytecodeDecoder, DecodeError, decode_at, decode_capture};
pub use source_map::{SourceMapBuilder, line_at};

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Instruction> {
        let mut decoder = BytecodeDecoder::new(bytes);
        let mut out = Vec::new();
        while let Some(next) = decoder.decode_next() {
            let (_, instruction, _) = next.expect("decode error");
            out.push(instruction);
        }
        out
    }

    #[test]
    fn opcode_bytes_round_trip() {
        for byte in 0..OpCode::COUNT as u8 {
            let op = OpCode::try_from(byte).expect("valid opcode");
            assert_eq!(op as u8, byte);
        }
        assert_eq!(OpCode::try_from(OpCode::COUNT as u8), Err(OpCode::COUNT as u8));
    }

    #[test]
    fn simple_sequence() {
        let mut b = BytecodeBuilder::new();
        b.op_with(OpCode::Constant, 3);
        b.op_with(OpCode::GetLocal, 1);
        b.op(OpCode::Add);
        b.invoke(OpCode::Invoke, 7, 2);
        b.op(OpCode::Return);
        let (code, _) = b.finish();

        assert_eq!(decode_all(&code), vec![
            Instruction::Constant { idx: 3 },
            Instruction::GetLocal { slot: 1 },
            Instruction::Add,
            Instruction::Invoke { name: 7, argc: 2 },
            Instruction::Return,
        ]);
    }

    #[test]
    fn forward_jump_measured_from_end_of_instruction() {
        let mut b = BytecodeBuilder::new();
        b.op(OpCode::True);
        let label = b.jump(OpCode::JumpIfFalse);
        b.op(OpCode::Pop);
        b.op_with(OpCode::Constant, 0);
        b.bind(label).expect("jump fits");
        b.op(OpCode::Return);
        let (code, _) = b.finish();

        assert_eq!(decode_all(&code), vec![
            Instruction::True,
            Instruction::JumpIfFalse { offset: 3 },
            Instruction::Pop,
            Instruction::Constant { idx: 0 },
            Instruction::Return,
        ]);
    }

    #[test]
    fn loop_lands_on_start() {
        let mut b = BytecodeBuilder::new();
        b.op(OpCode::Nil);
        let start = b.current_offset();
        b.op(OpCode::Pop);
        b.loop_back(start).expect("loop fits");
        let (code, _) = b.finish();

        let (instruction, next) = decode_at(&code, 2).expect("decode");
        let Instruction::Loop { offset } = instruction else {
            panic!("expected loop, got {instruction}");
        };
        assert_eq!(next - offset as usize, start);
    }

    #[test]
    fn oversized_jump_is_rejected() {
        let mut b = BytecodeBuilder::new();
        let label = b.jump(OpCode::Jump);
        for _ in 0..=u16::MAX as usize {
            b.op(OpCode::Nil);
        }
        let err = b.bind(label).expect_err("too far");
        assert_eq!(err.distance, u16::MAX as usize + 1);
    }

    #[test]
    fn closure_count_holds_a_full_upvalue_table() {
        let captures: Vec<Capture> = (0..=u8::MAX)
            .map(|index| Capture { is_local: index % 2 == 0, index })
            .collect();
        let mut b = BytecodeBuilder::new();
        b.closure(0, &captures);
        b.op(OpCode::Return);
        let (code, _) = b.finish();

        let decoded: Vec<_> = BytecodeDecoder::new(&code)
            .map(|item| item.expect("valid"))
            .collect();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].1, Instruction::Closure { idx: 0, captures: 256 });
        assert_eq!(decoded[0].2, captures);
        assert_eq!(decoded[1].1, Instruction::Return);
    }

    #[test]
    fn closure_captures_follow_instruction() {
        let captures = [
            Capture { is_local: true, index: 1 },
            Capture { is_local: false, index: 0 },
        ];
        let mut b = BytecodeBuilder::new();
        b.closure(4, &captures);
        b.op(OpCode::Pop);
        let (code, _) = b.finish();

        let mut decoder = BytecodeDecoder::new(&code);
        let (pc, instruction, decoded) =
            decoder.decode_next().expect("one").expect("valid");
        assert_eq!(pc, 0);
        assert_eq!(instruction, Instruction::Closure { idx: 4, captures: 2 });
        assert_eq!(decoded, captures);
        let (pc, instruction, _) =
            decoder.decode_next().expect("two").expect("valid");
        assert_eq!(pc, 8);
        assert_eq!(instruction, Instruction::Pop);
        assert!(decoder.decode_next().is_none());
    }

    #[test]
    fn truncated_and_unknown_bytes() {
        assert_eq!(
            decode_at(&[OpCode::Constant as u8], 0),
            Err(DecodeError::Truncated { pc: 0 })
        );
        assert_eq!(
            decode_at(&[0xFF], 0),
            Err(DecodeError::UnknownOpcode { pc: 0, byte: 0xFF })
        );
    }

    #[test]
    fn lines_follow_mark_line() {
        let mut b = BytecodeBuilder::new();
        b.mark_line(1);
        b.op(OpCode::Nil);
        b.op(OpCode::Pop);
        b.mark_line(3);
        b.op_with(OpCode::Constant, 0);
        b.mark_line(3);
        b.op(OpCode::Print);
        let (_, lines) = b.finish();

        assert_eq!(line_at(&lines, 0), Some(1));
        assert_eq!(line_at(&lines, 1), Some(1));
        assert_eq!(line_at(&lines, 2), Some(3));
        assert_eq!(line_at(&lines, 4), Some(3));
    }

    #[test]
    fn display_instructions() {
        assert_eq!(
            Instruction::Invoke { name: 5, argc: 2 }.to_string(),
            "Invoke #5 (2)"
        );
        assert_eq!(Instruction::Loop { offset: 7 }.to_string(), "Loop -7");
        assert_eq!(
            Capture { is_local: true, index: 2 }.to_string(),
            "local 2"
        );
        assert_eq!(OpCode::JumpIfFalse.mnemonic(), "OP_JUMP_IF_FALSE");
    }
}
