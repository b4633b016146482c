pub mod compiler;
pub mod debug;
pub mod error;
pub mod interning;
pub mod interpreter;
pub mod natives;
pub mod output;

use std::io::{self, Write};

use heap::{Heap, HeapSettings, NoRoots, RootProvider, ValueDisplay};
use object::{Closure, NativeFn, ObjRef, Object, Native, Table, Value};

use crate::error::{InterpretError, RuntimeError, RuntimeErrorKind, TraceLine};
use crate::interning::Interner;
use crate::interpreter::{CallFrame, FRAMES_MAX, STACK_MAX};

pub use crate::error::CompileError;
pub use crate::output::SharedBuffer;

/// Session configuration.
#[derive(Debug, Clone, Default)]
pub struct VmSettings {
    pub heap: HeapSettings,
    /// Log the stack and every executed instruction at trace level.
    pub trace_execution: bool,
    /// Log the disassembly of every compiled function at debug level.
    pub print_code: bool,
}

/// One interpreter session.
///
/// Owns the heap, the intern pool, globals and both stacks. Independent
/// sessions share nothing.
pub struct Vm {
    heap: Heap,
    strings: Interner,
    globals: Table,
    /// The interned `"init"` name, looked up on every class call.
    init_string: ObjRef,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    /// Head of the open-upvalue chain, highest stack slot first.
    open_upvalues: Option<ObjRef>,
    /// Objects the compiler holds outside the heap graph.
    compile_roots: Vec<Value>,
    settings: VmSettings,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
}

/// The session's root set, borrowed apart from the heap so the heap can
/// collect while the session is mid-operation.
pub(crate) struct Roots<'a> {
    stack: &'a [Value],
    frames: &'a [CallFrame],
    open_upvalues: Option<ObjRef>,
    globals: &'a Table,
    init_string: ObjRef,
    compile_roots: &'a [Value],
    strings: &'a mut Interner,
}

impl RootProvider for Roots<'_> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(Value)) {
        for &value in self.stack {
            visitor(value);
        }
        for frame in self.frames {
            visitor(Value::Obj(frame.closure));
        }
        if let Some(head) = self.open_upvalues {
            visitor(Value::Obj(head));
        }
        self.globals.trace(&mut |value| visitor(value));
        visitor(Value::Obj(self.init_string));
        for &value in self.compile_roots {
            visitor(value);
        }
    }

    fn retain_weak(&mut self, is_live: &dyn Fn(ObjRef) -> bool) {
        self.strings.retain(is_live);
    }
}

impl Vm {
    /// A session writing to stdout and stderr.
    pub fn new(settings: VmSettings) -> Self {
        Self::with_output(settings, Box::new(io::stdout()), Box::new(io::stderr()))
    }

    pub fn with_output(
        settings: VmSettings,
        out: Box<dyn Write>,
        err: Box<dyn Write>,
    ) -> Self {
        let mut heap = Heap::new(settings.heap.clone());
        let mut strings = Interner::new();

        // Nothing else lives yet, so there is nothing to root.
        let init_string = strings.intern_with(&mut heap, "init", &mut NoRoots);

        let mut vm = Self {
            heap,
            strings,
            globals: Table::new(),
            init_string,
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            open_upvalues: None,
            compile_roots: Vec::new(),
            settings,
            out,
            err,
        };
        vm.define_native("clock", natives::clock);
        vm
    }

    // ── Allocation and rooting ────────────────────────────────────────

    /// Allocate `object` on the heap. May collect.
    ///
    /// The new object is unreachable until the caller stores or pushes it.
    pub(crate) fn alloc(&mut self, object: Object) -> ObjRef {
        let mut roots = Roots {
            stack: &self.stack,
            frames: &self.frames,
            open_upvalues: self.open_upvalues,
            globals: &self.globals,
            init_string: self.init_string,
            compile_roots: &self.compile_roots,
            strings: &mut self.strings,
        };
        self.heap.allocate(object, &mut roots)
    }

    /// Keep `value` alive until the current compilation finishes.
    pub(crate) fn root(&mut self, value: Value) {
        if let Value::Obj(_) = value {
            self.compile_roots.push(value);
        }
    }

    /// Run a full collection now.
    pub fn collect_garbage(&mut self) {
        let mut roots = Roots {
            stack: &self.stack,
            frames: &self.frames,
            open_upvalues: self.open_upvalues,
            globals: &self.globals,
            init_string: self.init_string,
            compile_roots: &self.compile_roots,
            strings: &mut self.strings,
        };
        self.heap.collect(&mut roots);
    }

    #[inline(always)]
    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline(always)]
    pub(crate) fn pop(&mut self) -> Value {
        self.stack.pop().expect("value stack underflow")
    }

    #[inline(always)]
    pub(crate) fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    // ── Session API ───────────────────────────────────────────────────

    /// Compile `source` into a top-level function without running it.
    ///
    /// The function stays rooted until the next compile or interpret.
    pub fn compile(&mut self, source: &str) -> Result<ObjRef, CompileError> {
        self.compile_roots.clear();
        let result = compiler::compile(self, source);
        self.compile_roots.clear();
        if let Ok(function) = result {
            self.compile_roots.push(Value::Obj(function));
        }
        result
    }

    /// Compile and run `source`.
    ///
    /// Diagnostics and runtime error reports are written to the error sink
    /// before returning. After a runtime error the stacks are empty and the
    /// session can be used again.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function = match self.compile(source) {
            Ok(function) => function,
            Err(err) => {
                for diagnostic in &err.diagnostics {
                    self.report(format_args!("{diagnostic}"));
                }
                return Err(err.into());
            }
        };

        self.push(Value::Obj(function));
        self.compile_roots.clear();
        let closure = self.alloc(Object::Closure(Closure {
            function,
            upvalues: Box::new([]),
        }));
        self.pop();
        self.push(Value::Obj(closure));

        let result = self.call(closure, 0).and_then(|()| self.run());
        result.map_err(|kind| self.runtime_error(kind).into())
    }

    /// Install a host function as a global.
    pub fn define_native(&mut self, name: &str, function: NativeFn) {
        let name = self.copy_string(name);
        self.push(Value::Obj(name));
        let native = self.alloc(Object::Native(Native { function }));
        self.push(Value::Obj(native));
        self.globals.set(name, Value::Obj(native));
        self.pop();
        self.pop();
    }

    /// Current value of a global, if defined.
    pub fn global(&self, name: &str) -> Option<Value> {
        let key = self.strings.find(&self.heap, name)?;
        self.globals.get(key)
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn settings(&self) -> &VmSettings {
        &self.settings
    }

    pub fn display(&self, value: Value) -> ValueDisplay<'_> {
        self.heap.display(value)
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Number of strings in the intern pool.
    pub fn intern_count(&self) -> usize {
        self.strings.len()
    }

    // ── Errors ────────────────────────────────────────────────────────

    fn runtime_error(&mut self, kind: RuntimeErrorKind) -> RuntimeError {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                let function = self.heap.function(frame.function);
                TraceLine {
                    line: function.chunk.line_at(frame.ip.saturating_sub(1)),
                    function: function
                        .name
                        .map(|name| self.heap.string(name).as_str().to_string()),
                }
            })
            .collect();
        let error = RuntimeError { kind, trace };
        log::debug!("runtime error at frame depth {}", self.frames.len());
        self.report(format_args!("{error}"));
        self.reset_stack();
        error
    }

    fn reset_stack(&mut self) {
        // Closures that escaped the failed run keep their captured values.
        self.close_upvalues(0);
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues = None;
    }

    fn report(&mut self, message: std::fmt::Arguments<'_>) {
        if let Err(err) = writeln!(self.err, "{message}") {
            log::warn!("failed to write to error sink: {err}");
        }
    }
}
