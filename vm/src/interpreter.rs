//! Dispatch loop and invocation protocol.
//!
//! All helpers return `Result<_, RuntimeErrorKind>`; the session turns the
//! first error into a trace and resets its stacks.

use std::io::Write;

use bytecode::{Instruction, decode_at, decode_capture};
use log::trace;
use object::{
    BoundMethod, Class, Closure, Instance, NativeFn, ObjRef, Object, Table,
    Upvalue, UpvalueState, Value,
};

use crate::Vm;
use crate::debug;
use crate::error::RuntimeErrorKind;

/// Maximum call depth.
pub const FRAMES_MAX: usize = 64;
/// Value stack capacity: every frame may address 256 slots.
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// One activation record.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallFrame {
    pub(crate) closure: ObjRef,
    /// The closure's function, cached for instruction fetch.
    pub(crate) function: ObjRef,
    pub(crate) ip: usize,
    /// Stack index of slot 0 (the callee or receiver).
    pub(crate) slots: usize,
}

/// What a callee value turned out to be.
enum Callee {
    Bound { receiver: Value, method: ObjRef },
    Class,
    Closure,
    Native(NativeFn),
}

impl Vm {
    #[inline(always)]
    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active frame")
    }

    #[inline(always)]
    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active frame")
    }

    /// Decode the instruction at the current ip and advance past it.
    #[inline(always)]
    fn fetch(&mut self) -> Instruction {
        let frame = self.frames.last_mut().expect("no active frame");
        let code = &self.heap.function(frame.function).chunk.code;
        let (instruction, next) = decode_at(code, frame.ip)
            .unwrap_or_else(|err| panic!("malformed bytecode: {err}"));
        frame.ip = next;
        instruction
    }

    fn read_constant(&self, idx: u8) -> Value {
        self.heap.function(self.frame().function).chunk.constants[idx as usize]
    }

    fn read_string(&self, idx: u8) -> ObjRef {
        self.read_constant(idx)
            .as_obj()
            .expect("name operand is not an object")
    }

    fn name_of(&self, name: ObjRef) -> String {
        self.heap.string(name).as_str().to_string()
    }

    fn instance_of(&self, value: Value) -> Option<ObjRef> {
        match value {
            Value::Obj(r) if self.heap.get(r).as_instance().is_some() => Some(r),
            _ => None,
        }
    }

    fn class_of(&self, value: Value) -> Option<ObjRef> {
        match value {
            Value::Obj(r) if self.heap.get(r).as_class().is_some() => Some(r),
            _ => None,
        }
    }

    fn is_string(&self, value: Value) -> bool {
        matches!(value, Value::Obj(r) if self.heap.get(r).as_str().is_some())
    }

    // ── Dispatch loop ─────────────────────────────────────────────────

    /// Execute until the outermost frame returns.
    pub(crate) fn run(&mut self) -> Result<(), RuntimeErrorKind> {
        loop {
            if self.settings.trace_execution {
                self.trace_instruction();
            }

            match self.fetch() {
                Instruction::Constant { idx } => {
                    let value = self.read_constant(idx);
                    self.push(value);
                }
                Instruction::Nil => self.push(Value::Nil),
                Instruction::True => self.push(Value::Bool(true)),
                Instruction::False => self.push(Value::Bool(false)),
                Instruction::Pop => {
                    self.pop();
                }

                Instruction::GetLocal { slot } => {
                    let base = self.frame().slots;
                    self.push(self.stack[base + slot as usize]);
                }
                Instruction::SetLocal { slot } => {
                    let base = self.frame().slots;
                    self.stack[base + slot as usize] = self.peek(0);
                }

                Instruction::GetGlobal { name } => {
                    let name = self.read_string(name);
                    match self.globals.get(name) {
                        Some(value) => self.push(value),
                        None => {
                            return Err(RuntimeErrorKind::UndefinedVariable(
                                self.name_of(name),
                            ));
                        }
                    }
                }
                Instruction::DefineGlobal { name } => {
                    let name = self.read_string(name);
                    self.globals.set(name, self.peek(0));
                    self.pop();
                }
                Instruction::SetGlobal { name } => {
                    let name = self.read_string(name);
                    if self.globals.set(name, self.peek(0)) {
                        self.globals.delete(name);
                        return Err(RuntimeErrorKind::UndefinedVariable(
                            self.name_of(name),
                        ));
                    }
                }

                Instruction::GetUpvalue { slot } => {
                    let upvalue = self.frame_upvalue(slot);
                    let value = match self.heap.upvalue(upvalue).state {
                        UpvalueState::Open(index) => self.stack[index],
                        UpvalueState::Closed(value) => value,
                    };
                    self.push(value);
                }
                Instruction::SetUpvalue { slot } => {
                    let upvalue = self.frame_upvalue(slot);
                    let value = self.peek(0);
                    let upvalue = self.heap.upvalue_mut(upvalue);
                    match &mut upvalue.state {
                        UpvalueState::Open(index) => self.stack[*index] = value,
                        UpvalueState::Closed(cell) => *cell = value,
                    }
                }

                Instruction::GetProperty { name } => {
                    let name = self.read_string(name);
                    let Some(instance) = self.instance_of(self.peek(0)) else {
                        return Err(RuntimeErrorKind::OnlyInstancesHaveProperties);
                    };
                    let instance = self.heap.instance(instance);
                    if let Some(value) = instance.fields.get(name) {
                        self.pop();
                        self.push(value);
                    } else {
                        let class = instance.class;
                        self.bind_method(class, name)?;
                    }
                }
                Instruction::SetProperty { name } => {
                    let name = self.read_string(name);
                    let Some(instance) = self.instance_of(self.peek(1)) else {
                        return Err(RuntimeErrorKind::OnlyInstancesHaveFields);
                    };
                    let value = self.peek(0);
                    self.heap.instance_mut(instance).fields.set(name, value);
                    let value = self.pop();
                    self.pop();
                    self.push(value);
                }
                Instruction::GetSuper { name } => {
                    let name = self.read_string(name);
                    let superclass = self.pop_class();
                    self.bind_method(superclass, name)?;
                }

                Instruction::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                Instruction::Greater => self.binary_op(|a, b| Value::Bool(a > b))?,
                Instruction::Less => self.binary_op(|a, b| Value::Bool(a < b))?,
                Instruction::Add => {
                    let (a, b) = (self.peek(1), self.peek(0));
                    if self.is_string(a) && self.is_string(b) {
                        self.concatenate();
                    } else if let (Value::Number(a), Value::Number(b)) = (a, b) {
                        self.pop();
                        self.pop();
                        self.push(Value::Number(a + b));
                    } else {
                        return Err(RuntimeErrorKind::OperandsMustBeNumbersOrStrings);
                    }
                }
                Instruction::Subtract => {
                    self.binary_op(|a, b| Value::Number(a - b))?
                }
                Instruction::Multiply => {
                    self.binary_op(|a, b| Value::Number(a * b))?
                }
                Instruction::Divide => {
                    self.binary_op(|a, b| Value::Number(a / b))?
                }
                Instruction::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                Instruction::Negate => {
                    let Value::Number(n) = self.peek(0) else {
                        return Err(RuntimeErrorKind::OperandMustBeNumber);
                    };
                    self.pop();
                    self.push(Value::Number(-n));
                }

                Instruction::Print => {
                    let value = self.pop();
                    if let Err(err) = writeln!(self.out, "{}", self.heap.display(value)) {
                        log::warn!("failed to write to output sink: {err}");
                    }
                }

                Instruction::Jump { offset } => {
                    self.frame_mut().ip += offset as usize;
                }
                Instruction::JumpIfFalse { offset } => {
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset as usize;
                    }
                }
                Instruction::Loop { offset } => {
                    self.frame_mut().ip -= offset as usize;
                }

                Instruction::Call { argc } => {
                    self.call_value(self.peek(argc as usize), argc)?;
                }
                Instruction::Invoke { name, argc } => {
                    let name = self.read_string(name);
                    self.invoke(name, argc)?;
                }
                Instruction::SuperInvoke { name, argc } => {
                    let name = self.read_string(name);
                    let superclass = self.pop_class();
                    self.invoke_from_class(superclass, name, argc)?;
                }

                Instruction::Closure { idx, captures } => {
                    self.make_closure(idx, captures);
                }
                Instruction::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }
                Instruction::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("no active frame");
                    self.close_upvalues(frame.slots);
                    if self.frames.is_empty() {
                        self.stack.clear();
                        return Ok(());
                    }
                    self.stack.truncate(frame.slots);
                    self.push(result);
                }

                Instruction::Class { name } => {
                    let name = self.read_string(name);
                    let class = self.alloc(Object::Class(Class {
                        name,
                        methods: Table::new(),
                    }));
                    self.push(Value::Obj(class));
                }
                Instruction::Inherit => {
                    let Some(superclass) = self.class_of(self.peek(1)) else {
                        return Err(RuntimeErrorKind::SuperclassMustBeAClass);
                    };
                    let subclass = self
                        .class_of(self.peek(0))
                        .expect("inherit target is not a class");
                    let methods = self.heap.class(superclass).methods.clone();
                    methods.add_all_into(&mut self.heap.class_mut(subclass).methods);
                    self.pop();
                }
                Instruction::Method { name } => {
                    let name = self.read_string(name);
                    self.define_method(name);
                }
            }
        }
    }

    fn binary_op(
        &mut self,
        op: impl Fn(f64, f64) -> Value,
    ) -> Result<(), RuntimeErrorKind> {
        let (Value::Number(a), Value::Number(b)) = (self.peek(1), self.peek(0))
        else {
            return Err(RuntimeErrorKind::OperandsMustBeNumbers);
        };
        self.pop();
        self.pop();
        self.push(op(a, b));
        Ok(())
    }

    /// Both operands stay on the stack until the result is interned.
    fn concatenate(&mut self) {
        let b = self.peek(0).as_obj().expect("string operand");
        let a = self.peek(1).as_obj().expect("string operand");
        let (a, b) = (self.heap.string(a).as_str(), self.heap.string(b).as_str());
        let mut chars = String::with_capacity(a.len() + b.len());
        chars.push_str(a);
        chars.push_str(b);
        let result = self.take_string(chars);
        self.pop();
        self.pop();
        self.push(Value::Obj(result));
    }

    fn pop_class(&mut self) -> ObjRef {
        let value = self.pop();
        self.class_of(value).expect("superclass operand is not a class")
    }

    fn frame_upvalue(&self, slot: u8) -> ObjRef {
        self.heap.closure(self.frame().closure).upvalues[slot as usize]
    }

    fn trace_instruction(&self) {
        let frame = self.frame();
        let chunk = &self.heap.function(frame.function).chunk;
        let stack: String = self
            .stack
            .iter()
            .map(|&value| format!("[ {} ]", self.heap.display(value)))
            .collect();
        trace!("          {stack}");
        let (text, _) = debug::disassemble_instruction(&self.heap, chunk, frame.ip);
        trace!("{}", text.trim_end());
    }

    // ── Invocation protocol ───────────────────────────────────────────

    /// Push a frame for `closure` whose callee and arguments are already on
    /// the stack.
    pub(crate) fn call(
        &mut self,
        closure: ObjRef,
        argc: u8,
    ) -> Result<(), RuntimeErrorKind> {
        let function = self.heap.closure(closure).function;
        let arity = self.heap.function(function).arity;
        if argc != arity {
            return Err(RuntimeErrorKind::ArityMismatch { expected: arity, got: argc });
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(RuntimeErrorKind::StackOverflow);
        }
        self.frames.push(CallFrame {
            closure,
            function,
            ip: 0,
            slots: self.stack.len() - argc as usize - 1,
        });
        Ok(())
    }

    fn call_value(&mut self, callee: Value, argc: u8) -> Result<(), RuntimeErrorKind> {
        let Value::Obj(r) = callee else {
            return Err(RuntimeErrorKind::NotCallable);
        };
        let kind = match self.heap.get(r) {
            Object::BoundMethod(bound) => Callee::Bound {
                receiver: bound.receiver,
                method: bound.method,
            },
            Object::Class(_) => Callee::Class,
            Object::Closure(_) => Callee::Closure,
            Object::Native(native) => Callee::Native(native.function),
            _ => return Err(RuntimeErrorKind::NotCallable),
        };

        let callee_slot = self.stack.len() - argc as usize - 1;
        match kind {
            Callee::Bound { receiver, method } => {
                self.stack[callee_slot] = receiver;
                self.call(method, argc)
            }
            Callee::Class => {
                // The class stays rooted in the callee slot until the
                // instance replaces it.
                let instance = self.alloc(Object::Instance(Instance {
                    class: r,
                    fields: Table::new(),
                }));
                self.stack[callee_slot] = Value::Obj(instance);
                match self.heap.class(r).methods.get(self.init_string) {
                    Some(initializer) => {
                        let initializer =
                            initializer.as_obj().expect("initializer is not a closure");
                        self.call(initializer, argc)
                    }
                    None if argc != 0 => Err(RuntimeErrorKind::ArityMismatch {
                        expected: 0,
                        got: argc,
                    }),
                    None => Ok(()),
                }
            }
            Callee::Closure => self.call(r, argc),
            Callee::Native(function) => {
                let result = function(&self.stack[callee_slot + 1..]);
                self.stack.truncate(callee_slot);
                self.push(result);
                Ok(())
            }
        }
    }

    /// `receiver.name(args)` without materializing a bound method.
    fn invoke(&mut self, name: ObjRef, argc: u8) -> Result<(), RuntimeErrorKind> {
        let receiver = self.peek(argc as usize);
        let Some(instance) = self.instance_of(receiver) else {
            return Err(RuntimeErrorKind::OnlyInstancesHaveMethods);
        };
        let instance = self.heap.instance(instance);
        if let Some(field) = instance.fields.get(name) {
            let callee_slot = self.stack.len() - argc as usize - 1;
            self.stack[callee_slot] = field;
            return self.call_value(field, argc);
        }
        let class = instance.class;
        self.invoke_from_class(class, name, argc)
    }

    fn invoke_from_class(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        argc: u8,
    ) -> Result<(), RuntimeErrorKind> {
        let Some(method) = self.heap.class(class).methods.get(name) else {
            return Err(RuntimeErrorKind::UndefinedProperty(self.name_of(name)));
        };
        self.call(method.as_obj().expect("method is not a closure"), argc)
    }

    /// Replace the receiver on top of the stack with `class.name` bound to it.
    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<(), RuntimeErrorKind> {
        let Some(method) = self.heap.class(class).methods.get(name) else {
            return Err(RuntimeErrorKind::UndefinedProperty(self.name_of(name)));
        };
        let bound = self.alloc(Object::BoundMethod(BoundMethod {
            receiver: self.peek(0),
            method: method.as_obj().expect("method is not a closure"),
        }));
        self.pop();
        self.push(Value::Obj(bound));
        Ok(())
    }

    fn define_method(&mut self, name: ObjRef) {
        let method = self.peek(0);
        let class = self
            .class_of(self.peek(1))
            .expect("method target is not a class");
        self.heap.class_mut(class).methods.set(name, method);
        self.pop();
    }

    // ── Upvalue manager ───────────────────────────────────────────────

    fn make_closure(&mut self, idx: u8, count: u16) {
        let function = self
            .read_constant(idx)
            .as_obj()
            .expect("closure operand is not a function");
        let (enclosing, base, mut ip) = {
            let frame = self.frame();
            (frame.closure, frame.slots, frame.ip)
        };

        let mut upvalues = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let code = &self.heap.function(self.frame().function).chunk.code;
            let (capture, next) = decode_capture(code, ip)
                .unwrap_or_else(|err| panic!("malformed bytecode: {err}"));
            ip = next;
            // New upvalues are rooted by the open chain, inherited ones by
            // the enclosing closure.
            let upvalue = if capture.is_local {
                self.capture_upvalue(base + capture.index as usize)
            } else {
                self.heap.closure(enclosing).upvalues[capture.index as usize]
            };
            upvalues.push(upvalue);
        }
        self.frame_mut().ip = ip;

        let closure = self.alloc(Object::Closure(Closure {
            function,
            upvalues: upvalues.into_boxed_slice(),
        }));
        self.push(Value::Obj(closure));
    }

    /// Find or create the open upvalue for stack slot `slot`.
    pub(crate) fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut prev = None;
        let mut cursor = self.open_upvalues;
        while let Some(r) = cursor {
            let upvalue = self.heap.upvalue(r);
            let open = upvalue.open_slot().expect("closed upvalue in open chain");
            if open == slot {
                return r;
            }
            if open < slot {
                break;
            }
            prev = Some(r);
            cursor = upvalue.next;
        }

        let created = self.alloc(Object::Upvalue(Upvalue::open(slot, cursor)));
        match prev {
            None => self.open_upvalues = Some(created),
            Some(prev) => self.heap.upvalue_mut(prev).next = Some(created),
        }
        created
    }

    /// Close every open upvalue at or above stack slot `last`.
    pub(crate) fn close_upvalues(&mut self, last: usize) {
        while let Some(r) = self.open_upvalues {
            let upvalue = self.heap.upvalue_mut(r);
            let slot = upvalue.open_slot().expect("closed upvalue in open chain");
            if slot < last {
                break;
            }
            upvalue.state = UpvalueState::Closed(self.stack[slot]);
            self.open_upvalues = upvalue.next.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InterpretError;
    use crate::{SharedBuffer, VmSettings};
    use crate::error::RuntimeErrorKind as K;
    use heap::HeapSettings;

    fn test_settings() -> VmSettings {
        VmSettings {
            heap: HeapSettings {
                initial_threshold: 4096,
                ..HeapSettings::default()
            },
            ..VmSettings::default()
        }
    }

    fn run_source(src: &str) -> Result<String, RuntimeErrorKind> {
        let out = SharedBuffer::new();
        let mut vm = Vm::with_output(
            test_settings(),
            Box::new(out.clone()),
            Box::new(std::io::sink()),
        );
        match vm.interpret(src) {
            Ok(()) => Ok(out.contents()),
            Err(InterpretError::Runtime(err)) => Err(err.kind),
            Err(InterpretError::Compile(err)) => panic!("compile error: {err}"),
        }
    }

    fn output(src: &str) -> String {
        run_source(src).expect("interpret error")
    }

    // ── Literals and arithmetic ──────────────────────────────────────

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(output("print 1 + 2 * 3;"), "7\n");
        assert_eq!(output("print (1 + 2) * 3;"), "9\n");
        assert_eq!(output("print 10 / 4 - -1;"), "3.5\n");
        assert_eq!(output("print 1 / 0;"), "inf\n");
    }

    #[test]
    fn comparison_and_equality() {
        assert_eq!(output("print 1 < 2; print 2 <= 1; print 3 >= 3;"), "true\nfalse\ntrue\n");
        assert_eq!(output("print nil == false; print 1 == 1; print \"a\" != \"b\";"), "false\ntrue\ntrue\n");
        assert_eq!(output("print 0 / 0 == 0 / 0;"), "false\n");
    }

    #[test]
    fn truthiness() {
        assert_eq!(output("print !nil; print !0; print !\"\"; print !false;"), "true\nfalse\nfalse\ntrue\n");
    }

    #[test]
    fn operand_errors() {
        assert_eq!(run_source("print 1 + nil;"), Err(K::OperandsMustBeNumbersOrStrings));
        assert_eq!(run_source("print \"a\" - \"b\";"), Err(K::OperandsMustBeNumbers));
        assert_eq!(run_source("print 1 < \"x\";"), Err(K::OperandsMustBeNumbers));
        assert_eq!(run_source("print -true;"), Err(K::OperandMustBeNumber));
    }

    // ── Globals and locals ───────────────────────────────────────────

    #[test]
    fn globals_define_get_set() {
        assert_eq!(output("var a = 1; a = a + 1; print a;"), "2\n");
        assert_eq!(output("var a = 1; var a = 5; print a;"), "5\n");
        assert_eq!(run_source("print missing;"), Err(K::UndefinedVariable("missing".into())));
    }

    #[test]
    fn set_of_undefined_global_leaves_table_unchanged() {
        let mut vm = Vm::with_output(
            test_settings(),
            Box::new(std::io::sink()),
            Box::new(std::io::sink()),
        );
        let result = vm.interpret("ghost = 1;");
        assert!(matches!(result, Err(InterpretError::Runtime(_))));
        assert!(vm.global("ghost").is_none());
        let result = vm.interpret("print ghost;");
        assert!(matches!(result, Err(InterpretError::Runtime(_))));
    }

    #[test]
    fn locals_and_shadowing() {
        let src = "var a = \"global\"; { var a = \"outer\"; { var a = \"inner\"; print a; } print a; } print a;";
        assert_eq!(output(src), "inner\nouter\nglobal\n");
    }

    // ── Control flow ─────────────────────────────────────────────────

    #[test]
    fn if_else_and_logic() {
        assert_eq!(output("if (1 > 2) print \"a\"; else print \"b\";"), "b\n");
        assert_eq!(output("print nil or \"x\"; print false and 1; print 1 and 2;"), "x\nfalse\n2\n");
    }

    #[test]
    fn loops() {
        assert_eq!(output("var i = 0; while (i < 3) { print i; i = i + 1; }"), "0\n1\n2\n");
        assert_eq!(output("for (var i = 0; i < 3; i = i + 1) print i;"), "0\n1\n2\n");
        assert_eq!(output("var n = 0; for (;n < 2;) n = n + 1; print n;"), "2\n");
    }

    // ── Functions and calls ──────────────────────────────────────────

    #[test]
    fn recursion() {
        let src = "fun fib(n) { if (n < 2) return n; return fib(n - 2) + fib(n - 1); } print fib(15);";
        assert_eq!(output(src), "610\n");
    }

    #[test]
    fn function_display() {
        assert_eq!(output("fun f() {} print f; print clock;"), "<fn f>\n<native fn>\n");
        assert_eq!(output("fun f() {} print f();"), "nil\n");
    }

    #[test]
    fn arity_mismatch() {
        assert_eq!(
            run_source("fun f(a, b) {} f(1);"),
            Err(K::ArityMismatch { expected: 2, got: 1 })
        );
    }

    #[test]
    fn calling_non_callables() {
        assert_eq!(run_source("\"str\"();"), Err(K::NotCallable));
        assert_eq!(run_source("nil();"), Err(K::NotCallable));
    }

    #[test]
    fn stack_overflow() {
        assert_eq!(run_source("fun f() { f(); } f();"), Err(K::StackOverflow));
    }

    // ── Closures and upvalues ────────────────────────────────────────

    #[test]
    fn closure_outlives_its_frame() {
        let src = "fun outer(){ var x=\"hi\"; fun inner(){ return x; } return inner; } print outer()();";
        assert_eq!(output(src), "hi\n");
    }

    #[test]
    fn closures_share_captured_variable() {
        let src = "
            var get; var set;
            fun make() {
                var v = 1;
                fun g() { return v; }
                fun s(n) { v = n; }
                get = g; set = s;
            }
            make();
            set(7);
            print get();
        ";
        assert_eq!(output(src), "7\n");
    }

    #[test]
    fn counter_keeps_state() {
        let src = "
            fun counter() { var n = 0; fun inc() { n = n + 1; return n; } return inc; }
            var c = counter();
            c(); c();
            print c();
        ";
        assert_eq!(output(src), "3\n");
    }

    #[test]
    fn loop_body_closures_capture_per_iteration() {
        let src = "
            var fs = nil; var gs = nil;
            for (var i = 0; i < 2; i = i + 1) {
                var j = i;
                fun f() { return j; }
                if (fs == nil) fs = f; else gs = f;
            }
            print fs(); print gs();
        ";
        assert_eq!(output(src), "0\n1\n");
    }

    #[test]
    fn nested_upvalues_pass_through() {
        let src = "
            fun a() { var x = \"deep\"; fun b() { fun c() { return x; } return c; } return b; }
            print a()()();
        ";
        assert_eq!(output(src), "deep\n");
    }

    #[test]
    fn capture_dedups_and_orders_chain() {
        let mut vm = Vm::new(test_settings());
        for value in [10.0, 11.0, 12.0] {
            vm.push(Value::Number(value));
        }
        let first = vm.capture_upvalue(1);
        let high = vm.capture_upvalue(2);
        let low = vm.capture_upvalue(0);
        assert_eq!(vm.capture_upvalue(1), first);

        let mut slots = Vec::new();
        let mut cursor = vm.open_upvalues;
        while let Some(r) = cursor {
            let upvalue = vm.heap.upvalue(r);
            slots.push(upvalue.open_slot().expect("open"));
            cursor = upvalue.next;
        }
        assert_eq!(slots, vec![2, 1, 0]);

        vm.close_upvalues(1);
        assert_eq!(vm.open_upvalues, Some(low));
        assert_eq!(vm.heap.upvalue(high).state, UpvalueState::Closed(Value::Number(12.0)));
        assert_eq!(vm.heap.upvalue(first).state, UpvalueState::Closed(Value::Number(11.0)));
        assert_eq!(vm.heap.upvalue(low).open_slot(), Some(0));
    }

    // ── Classes ──────────────────────────────────────────────────────

    #[test]
    fn instances_fields_and_methods() {
        let src = "
            class Point {
                init(x, y) { this.x = x; this.y = y; }
                sum() { return this.x + this.y; }
            }
            var p = Point(1, 2);
            print p.sum();
            p.x = 10;
            print p.sum();
            print p;
            print Point;
        ";
        assert_eq!(output(src), "3\n12\nPoint instance\nPoint\n");
    }

    #[test]
    fn bound_method_remembers_receiver() {
        let src = "
            class A { init(n) { this.n = n; } get() { return this.n; } }
            var m = A(5).get;
            print m;
            print m();
        ";
        assert_eq!(output(src), "<fn get>\n5\n");
    }

    #[test]
    fn initializer_returns_instance() {
        let src = "class A { init() { this.v = 1; return; } } var a = A(); print a.init();";
        assert_eq!(output(src), "A instance\n");
    }

    #[test]
    fn class_without_init_rejects_arguments() {
        assert_eq!(
            run_source("class A {} A(1);"),
            Err(K::ArityMismatch { expected: 0, got: 1 })
        );
        assert_eq!(output("class A {} print A();"), "A instance\n");
    }

    #[test]
    fn field_shadows_method_on_invoke() {
        let src = "
            class A { m() { return \"method\"; } }
            fun f() { return \"field\"; }
            var a = A();
            a.m = f;
            print a.m();
        ";
        assert_eq!(output(src), "field\n");
    }

    #[test]
    fn property_errors() {
        assert_eq!(run_source("var x = 1; print x.y;"), Err(K::OnlyInstancesHaveProperties));
        assert_eq!(run_source("var x = 1; x.y = 2;"), Err(K::OnlyInstancesHaveFields));
        assert_eq!(run_source("var x = 1; x.y();"), Err(K::OnlyInstancesHaveMethods));
        assert_eq!(
            run_source("class A {} print A().nope;"),
            Err(K::UndefinedProperty("nope".into()))
        );
        assert_eq!(
            run_source("class A {} A().nope();"),
            Err(K::UndefinedProperty("nope".into()))
        );
    }

    #[test]
    fn inheritance_and_super() {
        let src = "
            class A { hi() { return \"A.hi\"; } who() { return \"A\"; } }
            class B < A {
                who() { return \"B\"; }
                both() { return super.who() + this.who(); }
                sup() { var m = super.hi; return m(); }
            }
            var b = B();
            print b.hi();
            print b.both();
            print b.sup();
        ";
        assert_eq!(output(src), "A.hi\nAB\nA.hi\n");
    }

    #[test]
    fn inherited_methods_are_a_snapshot() {
        let mut vm = Vm::with_output(
            test_settings(),
            Box::new(std::io::sink()),
            Box::new(std::io::sink()),
        );
        vm.interpret("class A { a() {} } class B < A {} fun late() {}")
            .expect("run");
        let class = |vm: &Vm, name: &str| {
            vm.global(name).and_then(|v| v.as_obj()).expect("class global")
        };
        let (a, b) = (class(&vm, "A"), class(&vm, "B"));
        let late = vm.global("late").expect("late");
        let name = vm.copy_string("late");

        vm.heap.class_mut(a).methods.set(name, late);

        assert!(vm.heap.class(a).methods.contains(name));
        assert!(!vm.heap.class(b).methods.contains(name));
        assert_eq!(vm.heap.class(b).methods.len(), 1);
    }

    #[test]
    fn superclass_must_be_class() {
        assert_eq!(
            run_source("var NotClass = 1; class A < NotClass {}"),
            Err(K::SuperclassMustBeAClass)
        );
    }

    #[test]
    fn inherited_init_is_used() {
        let src = "
            class A { init(v) { this.v = v; } }
            class B < A {}
            print B(3).v;
        ";
        assert_eq!(output(src), "3\n");
    }

    // ── Strings ──────────────────────────────────────────────────────

    #[test]
    fn concatenation_interns() {
        assert_eq!(output("var a = \"foo\" + \"bar\"; print a == \"foobar\";"), "true\n");
        assert_eq!(output("print \"a\" + \"b\" + \"c\";"), "abc\n");
    }
}
