//! Bytecode listings for `--dump-bytecode` and execution tracing.

use std::fmt::Write;

use bytecode::{Instruction, decode_at, decode_capture};
use heap::Heap;
use object::{Chunk, ObjRef, Value};

/// Listing of `function` followed by every function nested in its
/// constant pool, depth first.
pub fn disassemble(heap: &Heap, function: ObjRef) -> String {
    let mut out = disassemble_function(heap, function);
    for &constant in &heap.function(function).chunk.constants {
        if let Value::Obj(r) = constant
            && heap.get(r).as_function().is_some()
        {
            out.push('\n');
            out.push_str(&disassemble(heap, r));
        }
    }
    out
}

/// Listing of a single function's chunk under a `== name ==` header.
pub fn disassemble_function(heap: &Heap, function: ObjRef) -> String {
    let f = heap.function(function);
    let mut out = match f.name {
        Some(name) => format!("== {} ==\n", heap.string(name).as_str()),
        None => "== <script> ==\n".to_string(),
    };
    let mut offset = 0;
    while offset < f.chunk.code.len() {
        let (text, next) = disassemble_instruction(heap, &f.chunk, offset);
        out.push_str(&text);
        offset = next;
    }
    out
}

/// One instruction (with any capture lines) and the offset after it.
pub fn disassemble_instruction(
    heap: &Heap,
    chunk: &Chunk,
    offset: usize,
) -> (String, usize) {
    let mut out = format!("{offset:04} ");
    let line = chunk.line_at(offset);
    if offset > 0 && line == chunk.line_at(offset - 1) {
        out.push_str("   | ");
    } else {
        let _ = write!(out, "{line:4} ");
    }

    let (instruction, mut next) = match decode_at(&chunk.code, offset) {
        Ok(decoded) => decoded,
        Err(err) => {
            let _ = writeln!(out, "<{err}>");
            return (out, chunk.code.len());
        }
    };

    let constant = |idx: u8| heap.display(chunk.constants[idx as usize]).to_string();
    let jump = |sign: i64, distance: u16| offset as i64 + 3 + sign * distance as i64;

    let mnemonic = bytecode::OpCode::try_from(chunk.code[offset])
        .map(|op| op.mnemonic())
        .unwrap_or("OP_UNKNOWN");

    let _ = match instruction {
        Instruction::Constant { idx }
        | Instruction::GetGlobal { name: idx }
        | Instruction::DefineGlobal { name: idx }
        | Instruction::SetGlobal { name: idx }
        | Instruction::GetProperty { name: idx }
        | Instruction::SetProperty { name: idx }
        | Instruction::GetSuper { name: idx }
        | Instruction::Class { name: idx }
        | Instruction::Method { name: idx } => {
            writeln!(out, "{mnemonic:<16} {idx:4} '{}'", constant(idx))
        }
        Instruction::GetLocal { slot }
        | Instruction::SetLocal { slot }
        | Instruction::GetUpvalue { slot }
        | Instruction::SetUpvalue { slot } => writeln!(out, "{mnemonic:<16} {slot:4}"),
        Instruction::Call { argc } => writeln!(out, "{mnemonic:<16} {argc:4}"),
        Instruction::Jump { offset: distance }
        | Instruction::JumpIfFalse { offset: distance } => {
            writeln!(out, "{mnemonic:<16} {offset:4} -> {}", jump(1, distance))
        }
        Instruction::Loop { offset: distance } => {
            writeln!(out, "{mnemonic:<16} {offset:4} -> {}", jump(-1, distance))
        }
        Instruction::Invoke { name, argc } | Instruction::SuperInvoke { name, argc } => {
            writeln!(out, "{mnemonic:<16} ({argc} args) {name:4} '{}'", constant(name))
        }
        Instruction::Closure { idx, captures } => {
            let _ = writeln!(out, "{mnemonic:<16} {idx:4} {}", constant(idx));
            for _ in 0..captures {
                let (capture, after) = match decode_capture(&chunk.code, next) {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        let _ = writeln!(out, "<{err}>");
                        return (out, chunk.code.len());
                    }
                };
                let _ = writeln!(out, "{next:04}    |                     {capture}");
                next = after;
            }
            Ok(())
        }
        _ => writeln!(out, "{mnemonic}"),
    };

    (out, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Vm, VmSettings};

    fn compiled(source: &str) -> (Vm, ObjRef) {
        let mut vm = Vm::with_output(
            VmSettings::default(),
            Box::new(std::io::sink()),
            Box::new(std::io::sink()),
        );
        let script = vm.compile(source).expect("compile");
        (vm, script)
    }

    #[test]
    fn lists_constants_and_simple_ops() {
        let (vm, script) = compiled("print 1 + 2;");
        let listing = disassemble(vm.heap(), script);
        let expected = "\
== <script> ==
0000    1 OP_CONSTANT         0 '1'
0002    | OP_CONSTANT         1 '2'
0004    | OP_ADD
0005    | OP_PRINT
0006    | OP_NIL
0007    | OP_RETURN
";
        assert_eq!(listing, expected);
    }

    #[test]
    fn jumps_show_their_targets() {
        let (vm, script) = compiled("while (false) print 1;");
        let listing = disassemble(vm.heap(), script);
        assert!(listing.contains("OP_JUMP_IF_FALSE    1 -> 11"), "{listing}");
        assert!(listing.contains("OP_LOOP             8 -> 0"), "{listing}");
    }

    #[test]
    fn nested_functions_and_captures_are_listed() {
        let (vm, script) = compiled(
            "fun outer() {\n  var x = 1;\n  fun inner() { return x; }\n  return inner;\n}",
        );
        let listing = disassemble(vm.heap(), script);
        assert!(listing.contains("== <script> =="));
        assert!(listing.contains("== outer =="));
        assert!(listing.contains("== inner =="));
        assert!(listing.contains("OP_CLOSURE          1 <fn inner>"), "{listing}");
        assert!(listing.contains("local 1"), "{listing}");
        assert!(listing.contains("OP_GET_UPVALUE      0"), "{listing}");
    }

    #[test]
    fn invoke_lists_argument_count() {
        let (vm, script) = compiled("var a; a.go(1);");
        let listing = disassemble_function(vm.heap(), script);
        assert!(listing.contains("OP_INVOKE        (1 args)    2 'go'"), "{listing}");
    }
}
