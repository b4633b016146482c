use core::fmt;

// ── Runtime errors ────────────────────────────────────────────────────

/// A failure raised by the dispatch loop. Aborts the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    ArityMismatch { expected: u8, got: u8 },
    StackOverflow,
    UndefinedVariable(String),
    UndefinedProperty(String),
    OnlyInstancesHaveProperties,
    OnlyInstancesHaveFields,
    OnlyInstancesHaveMethods,
    NotCallable,
    SuperclassMustBeAClass,
    OperandsMustBeNumbers,
    OperandsMustBeNumbersOrStrings,
    OperandMustBeNumber,
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArityMismatch { expected, got } => {
                write!(f, "Expected {expected} arguments but got {got}.")
            }
            Self::StackOverflow => f.write_str("Stack overflow."),
            Self::UndefinedVariable(name) => {
                write!(f, "Undefined variable '{name}'.")
            }
            Self::UndefinedProperty(name) => {
                write!(f, "Undefined property '{name}'.")
            }
            Self::OnlyInstancesHaveProperties => {
                f.write_str("Only instances have properties.")
            }
            Self::OnlyInstancesHaveFields => {
                f.write_str("Only instances have fields.")
            }
            Self::OnlyInstancesHaveMethods => {
                f.write_str("Only instances have methods.")
            }
            Self::NotCallable => f.write_str("Can only call functions and classes."),
            Self::SuperclassMustBeAClass => {
                f.write_str("Superclass must be a class.")
            }
            Self::OperandsMustBeNumbers => f.write_str("Operands must be numbers."),
            Self::OperandsMustBeNumbersOrStrings => {
                f.write_str("Operands must be two numbers or two strings.")
            }
            Self::OperandMustBeNumber => f.write_str("Operand must be a number."),
        }
    }
}

/// One active frame at the time of a runtime error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLine {
    pub line: u32,
    /// `None` for top-level script code.
    pub function: Option<String>,
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "[line {}] in {name}()", self.line),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// A runtime error with the call stack it unwound, innermost frame first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub trace: Vec<TraceLine>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for line in &self.trace {
            write!(f, "\n{line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

// ── Compile errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    /// At the given token lexeme.
    At(String),
    AtEnd,
    /// Lexical error; the lexer already described the offending text.
    Lexical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub location: ErrorLocation,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;
        match &self.location {
            ErrorLocation::At(lexeme) => write!(f, " at '{lexeme}'")?,
            ErrorLocation::AtEnd => f.write_str(" at end")?,
            ErrorLocation::Lexical => {}
        }
        write!(f, ": {}", self.message)
    }
}

/// Every diagnostic reported while compiling one source unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

// ── Interpret ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpretError {
    Compile(CompileError),
    Runtime(RuntimeError),
}

impl InterpretError {
    /// Process exit status for the command-line driver.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Compile(_) => 65,
            Self::Runtime(_) => 70,
        }
    }
}

impl fmt::Display for InterpretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile(err) => write!(f, "{err}"),
            Self::Runtime(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for InterpretError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Compile(err) => Some(err),
            Self::Runtime(err) => Some(err),
        }
    }
}

impl From<CompileError> for InterpretError {
    fn from(err: CompileError) -> Self {
        Self::Compile(err)
    }
}

impl From<RuntimeError> for InterpretError {
    fn from(err: RuntimeError) -> Self {
        Self::Runtime(err)
    }
}
