//! Single-pass compiler: a Pratt parser that emits bytecode as it goes.
//!
//! Every heap object the compiler creates is rooted through
//! [`Vm::root`] until the session pushes the finished script.

use bytecode::{BytecodeBuilder, Capture, Label, OpCode};
use object::{Chunk, Function, ObjRef, Object, Value};
use parser::{Lexer, Token, TokenKind};

use crate::Vm;
use crate::debug;
use crate::error::{CompileError, Diagnostic, ErrorLocation};

const MAX_CONSTANTS: usize = 256;
const MAX_LOCALS: usize = 256;
const MAX_UPVALUES: usize = 256;
const MAX_ARGS: usize = 255;

/// Compile `source` into the top-level script function.
pub(crate) fn compile(vm: &mut Vm, source: &str) -> Result<ObjRef, CompileError> {
    let mut compiler = Compiler::new(vm, source);
    compiler.advance();
    while !compiler.matches(TokenKind::Eof) {
        compiler.declaration();
    }
    let (function, _) = compiler.end_function();

    if compiler.diagnostics.is_empty() {
        Ok(function)
    } else {
        Err(CompileError { diagnostics: compiler.diagnostics })
    }
}

// ── Precedence ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Self {
        match self {
            Self::None => Self::Assignment,
            Self::Assignment => Self::Or,
            Self::Or => Self::And,
            Self::And => Self::Equality,
            Self::Equality => Self::Comparison,
            Self::Comparison => Self::Term,
            Self::Term => Self::Factor,
            Self::Factor => Self::Unary,
            Self::Unary => Self::Call,
            Self::Call | Self::Primary => Self::Primary,
        }
    }

    /// Binding power of `kind` in infix position.
    fn of(kind: TokenKind) -> Self {
        match kind {
            TokenKind::LeftParen | TokenKind::Dot => Self::Call,
            TokenKind::Minus | TokenKind::Plus => Self::Term,
            TokenKind::Slash | TokenKind::Star => Self::Factor,
            TokenKind::BangEqual | TokenKind::EqualEqual => Self::Equality,
            TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => Self::Comparison,
            TokenKind::And => Self::And,
            TokenKind::Or => Self::Or,
            _ => Self::None,
        }
    }
}

// ── Per-function state ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

#[derive(Debug)]
struct Local<'src> {
    name: &'src str,
    /// `None` while the initializer is being compiled.
    depth: Option<usize>,
    is_captured: bool,
}

struct FunctionState<'src> {
    kind: FunctionKind,
    name: Option<ObjRef>,
    arity: usize,
    builder: BytecodeBuilder,
    constants: Vec<Value>,
    locals: Vec<Local<'src>>,
    upvalues: Vec<Capture>,
    scope_depth: usize,
}

impl<'src> FunctionState<'src> {
    fn new(kind: FunctionKind, name: Option<ObjRef>) -> Self {
        // Slot 0 holds the callee, or the receiver in methods.
        let receiver = match kind {
            FunctionKind::Method | FunctionKind::Initializer => "this",
            FunctionKind::Script | FunctionKind::Function => "",
        };
        Self {
            kind,
            name,
            arity: 0,
            builder: BytecodeBuilder::new(),
            constants: Vec::new(),
            locals: vec![Local { name: receiver, depth: Some(0), is_captured: false }],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

struct ClassState {
    has_superclass: bool,
}

// ── Compiler ─────────────────────────────────────────────────────────

struct Compiler<'src, 'vm> {
    vm: &'vm mut Vm,
    lexer: Lexer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    panic_mode: bool,
    diagnostics: Vec<Diagnostic>,
    /// Innermost function last.
    functions: Vec<FunctionState<'src>>,
    /// Innermost class last.
    classes: Vec<ClassState>,
}

impl<'src, 'vm> Compiler<'src, 'vm> {
    fn new(vm: &'vm mut Vm, source: &'src str) -> Self {
        Self {
            vm,
            lexer: Lexer::new(source),
            current: Token::synthetic(""),
            previous: Token::synthetic(""),
            panic_mode: false,
            diagnostics: Vec::new(),
            functions: vec![FunctionState::new(FunctionKind::Script, None)],
            classes: Vec::new(),
        }
    }

    fn state(&self) -> &FunctionState<'src> {
        self.functions.last().expect("no function being compiled")
    }

    fn state_mut(&mut self) -> &mut FunctionState<'src> {
        self.functions.last_mut().expect("no function being compiled")
    }

    // ── Token stream ─────────────────────────────────────────────────

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(self.current.lexeme);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let location = match token.kind {
            TokenKind::Eof => ErrorLocation::AtEnd,
            TokenKind::Error => ErrorLocation::Lexical,
            _ => ErrorLocation::At(token.lexeme.to_string()),
        };
        self.diagnostics.push(Diagnostic {
            line: token.line,
            location,
            message: message.to_string(),
        });
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    /// Skip to the next statement boundary after an error.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    // ── Emission ─────────────────────────────────────────────────────

    fn builder(&mut self) -> &mut BytecodeBuilder {
        let line = self.previous.line;
        let builder = &mut self.state_mut().builder;
        builder.mark_line(line);
        builder
    }

    fn emit(&mut self, op: OpCode) {
        self.builder().op(op);
    }

    fn emit_with(&mut self, op: OpCode, operand: u8) {
        self.builder().op_with(op, operand);
    }

    fn emit_jump(&mut self, op: OpCode) -> Label {
        self.builder().jump(op)
    }

    fn patch_jump(&mut self, label: Label) {
        if self.state_mut().builder.bind(label).is_err() {
            self.error("Too much code to jump over.");
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        if self.builder().loop_back(loop_start).is_err() {
            self.error("Loop body too large.");
        }
    }

    fn emit_return(&mut self) {
        if self.state().kind == FunctionKind::Initializer {
            self.emit_with(OpCode::GetLocal, 0);
        } else {
            self.emit(OpCode::Nil);
        }
        self.emit(OpCode::Return);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        if self.state().constants.len() == MAX_CONSTANTS {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        self.vm.root(value);
        let constants = &mut self.state_mut().constants;
        constants.push(value);
        (constants.len() - 1) as u8
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit_with(OpCode::Constant, idx);
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let name = self.vm.copy_string(name);
        self.make_constant(Value::Obj(name))
    }

    /// Finish the innermost function and allocate it.
    fn end_function(&mut self) -> (ObjRef, Vec<Capture>) {
        self.emit_return();
        let state = self.functions.pop().expect("no function being compiled");
        let (code, lines) = state.builder.finish();
        let function = self.vm.alloc(Object::Function(Function {
            arity: state.arity.min(MAX_ARGS) as u8,
            upvalue_count: state.upvalues.len(),
            name: state.name,
            chunk: Chunk { code, lines, constants: state.constants },
        }));
        self.vm.root(Value::Obj(function));

        if self.vm.settings().print_code && self.diagnostics.is_empty() {
            log::debug!("{}", debug::disassemble_function(self.vm.heap(), function));
        }
        (function, state.upvalues)
    }

    // ── Scopes and variables ─────────────────────────────────────────

    fn begin_scope(&mut self) {
        self.state_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let state = self.state_mut();
        state.scope_depth -= 1;
        let depth = state.scope_depth;
        while let Some(local) = self.state().locals.last() {
            if local.depth.is_some_and(|d| d <= depth) {
                break;
            }
            let op = if local.is_captured { OpCode::CloseUpvalue } else { OpCode::Pop };
            self.emit(op);
            self.state_mut().locals.pop();
        }
    }

    fn add_local(&mut self, name: &'src str) {
        if self.state().locals.len() == MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.state_mut().locals.push(Local { name, depth: None, is_captured: false });
    }

    fn declare_variable(&mut self) {
        let state = self.state();
        if state.scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        let duplicate = state
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth.is_none_or(|d| d >= state.scope_depth))
            .any(|local| local.name == name);
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.state().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.lexeme)
    }

    fn mark_initialized(&mut self) {
        let state = self.state_mut();
        if state.scope_depth == 0 {
            return;
        }
        let depth = state.scope_depth;
        if let Some(local) = state.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.state().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_with(OpCode::DefineGlobal, global);
    }

    fn resolve_local(&mut self, function: usize, name: &str) -> Option<u8> {
        let (slot, local) = self.functions[function]
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| local.name == name)?;
        if local.depth.is_none() {
            self.error("Can't read local variable in its own initializer.");
        }
        Some(slot as u8)
    }

    fn resolve_upvalue(&mut self, function: usize, name: &str) -> Option<u8> {
        let enclosing = function.checked_sub(1)?;
        if let Some(slot) = self.resolve_local(enclosing, name) {
            self.functions[enclosing].locals[slot as usize].is_captured = true;
            return Some(self.add_upvalue(function, Capture { is_local: true, index: slot }));
        }
        let index = self.resolve_upvalue(enclosing, name)?;
        Some(self.add_upvalue(function, Capture { is_local: false, index }))
    }

    fn add_upvalue(&mut self, function: usize, capture: Capture) -> u8 {
        let upvalues = &self.functions[function].upvalues;
        if let Some(existing) = upvalues.iter().position(|&c| c == capture) {
            return existing as u8;
        }
        if upvalues.len() == MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        let upvalues = &mut self.functions[function].upvalues;
        upvalues.push(capture);
        (upvalues.len() - 1) as u8
    }

    fn named_variable(&mut self, name: &'src str, can_assign: bool) {
        let top = self.functions.len() - 1;
        let (get, set, arg) = if let Some(slot) = self.resolve_local(top, name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue(top, name) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, slot)
        } else {
            let constant = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, constant)
        };

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_with(set, arg);
        } else {
            self.emit_with(get, arg);
        }
    }

    // ── Declarations ─────────────────────────────────────────────────

    fn declaration(&mut self) {
        if self.matches(TokenKind::Class) {
            self.class_declaration();
        } else if self.matches(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.previous.lexeme;
        let name_constant = self.identifier_constant(class_name);
        self.declare_variable();

        self.emit_with(OpCode::Class, name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassState { has_superclass: false });

        if self.matches(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            self.named_variable(self.previous.lexeme, false);
            if class_name == self.previous.lexeme {
                self.error("A class can't inherit from itself.");
            }

            self.begin_scope();
            self.add_local("super");
            self.define_variable(0);

            self.named_variable(class_name, false);
            self.emit(OpCode::Inherit);
            if let Some(class) = self.classes.last_mut() {
                class.has_superclass = true;
            }
        }

        self.named_variable(class_name, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit(OpCode::Pop);

        let class = self.classes.pop().expect("class state pushed above");
        if class.has_superclass {
            self.end_scope();
        }
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let name = self.identifier_constant(self.previous.lexeme);
        let kind = if self.previous.lexeme == "init" {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };
        self.function(kind);
        self.emit_with(OpCode::Method, name);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    /// Compile a parameter list and body; the name is the previous token.
    fn function(&mut self, kind: FunctionKind) {
        let name = self.vm.copy_string(self.previous.lexeme);
        self.vm.root(Value::Obj(name));
        self.functions.push(FunctionState::new(kind, Some(name)));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                self.state_mut().arity += 1;
                if self.state().arity > MAX_ARGS {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let (function, upvalues) = self.end_function();
        let idx = self.make_constant(Value::Obj(function));
        let line = self.previous.line;
        let builder = &mut self.state_mut().builder;
        builder.mark_line(line);
        builder.closure(idx, &upvalues);
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.matches(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    // ── Statements ───────────────────────────────────────────────────

    fn statement(&mut self) {
        if self.matches(TokenKind::Print) {
            self.print_statement();
        } else if self.matches(TokenKind::For) {
            self.for_statement();
        } else if self.matches(TokenKind::If) {
            self.if_statement();
        } else if self.matches(TokenKind::Return) {
            self.return_statement();
        } else if self.matches(TokenKind::While) {
            self.while_statement();
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(then_jump);
        self.emit(OpCode::Pop);
        if self.matches(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.state().builder.current_offset();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.matches(TokenKind::Semicolon) {
            // No initializer.
        } else if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.state().builder.current_offset();
        let mut exit_jump = None;
        if !self.matches(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit(OpCode::Pop);
        }

        if !self.matches(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.state().builder.current_offset();
            self.expression();
            self.emit(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit(OpCode::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.state().kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }

        if self.matches(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.state().kind == FunctionKind::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit(OpCode::Return);
        }
    }

    // ── Expressions ──────────────────────────────────────────────────

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix(self.previous.kind, can_assign) {
            self.error("Expect expression.");
            return;
        }

        while precedence <= Precedence::of(self.current.kind) {
            self.advance();
            self.infix(self.previous.kind, can_assign);
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    /// Run the prefix rule for `kind`; `false` if it has none.
    fn prefix(&mut self, kind: TokenKind, can_assign: bool) -> bool {
        match kind {
            TokenKind::LeftParen => self.grouping(),
            TokenKind::Minus | TokenKind::Bang => self.unary(),
            TokenKind::Number => self.number(),
            TokenKind::String => self.string(),
            TokenKind::Identifier => self.named_variable(self.previous.lexeme, can_assign),
            TokenKind::False | TokenKind::Nil | TokenKind::True => self.literal(),
            TokenKind::This => self.this(),
            TokenKind::Super => self.super_(),
            _ => return false,
        }
        true
    }

    fn infix(&mut self, kind: TokenKind, can_assign: bool) {
        match kind {
            TokenKind::LeftParen => self.call(),
            TokenKind::Dot => self.dot(can_assign),
            TokenKind::And => self.and(),
            TokenKind::Or => self.or(),
            _ => self.binary(),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self) {
        match self.previous.lexeme.parse::<f64>() {
            Ok(value) => self.emit_constant(Value::Number(value)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    fn string(&mut self) {
        let lexeme = self.previous.lexeme;
        let string = self.vm.copy_string(&lexeme[1..lexeme.len() - 1]);
        self.emit_constant(Value::Obj(string));
    }

    fn literal(&mut self) {
        match self.previous.kind {
            TokenKind::False => self.emit(OpCode::False),
            TokenKind::Nil => self.emit(OpCode::Nil),
            TokenKind::True => self.emit(OpCode::True),
            kind => unreachable!("{kind:?} is not a literal"),
        }
    }

    fn unary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit(OpCode::Not),
            TokenKind::Minus => self.emit(OpCode::Negate),
            kind => unreachable!("{kind:?} is not a unary operator"),
        }
    }

    fn binary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::of(operator).next());
        match operator {
            TokenKind::BangEqual => {
                self.emit(OpCode::Equal);
                self.emit(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit(OpCode::Equal),
            TokenKind::Greater => self.emit(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit(OpCode::Less);
                self.emit(OpCode::Not);
            }
            TokenKind::Less => self.emit(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit(OpCode::Greater);
                self.emit(OpCode::Not);
            }
            TokenKind::Plus => self.emit(OpCode::Add),
            TokenKind::Minus => self.emit(OpCode::Subtract),
            TokenKind::Star => self.emit(OpCode::Multiply),
            TokenKind::Slash => self.emit(OpCode::Divide),
            kind => unreachable!("{kind:?} is not a binary operator"),
        }
    }

    fn and(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count = 0usize;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == MAX_ARGS {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count.min(MAX_ARGS) as u8
    }

    fn call(&mut self) {
        let argc = self.argument_list();
        self.emit_with(OpCode::Call, argc);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name = self.identifier_constant(self.previous.lexeme);

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_with(OpCode::SetProperty, name);
        } else if self.matches(TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.builder().invoke(OpCode::Invoke, name, argc);
        } else {
            self.emit_with(OpCode::GetProperty, name);
        }
    }

    fn this(&mut self) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.named_variable("this", false);
    }

    fn super_(&mut self) {
        match self.classes.last() {
            None => self.error("Can't use 'super' outside of a class."),
            Some(class) if !class.has_superclass => {
                self.error("Can't use 'super' in a class with no superclass.");
            }
            Some(_) => {}
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let name = self.identifier_constant(self.previous.lexeme);

        self.named_variable("this", false);
        if self.matches(TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.named_variable("super", false);
            self.builder().invoke(OpCode::SuperInvoke, name, argc);
        } else {
            self.named_variable("super", false);
            self.emit_with(OpCode::GetSuper, name);
        }
    }
}
