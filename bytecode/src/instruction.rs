use core::fmt;

/// One captured variable of an `OP_CLOSURE` instruction.
///
/// `is_local` selects between a slot of the frame executing the instruction
/// and an upvalue already held by the enclosing closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub is_local: bool,
    pub index: u8,
}

/// A decoded instruction with its inline operands.
///
/// `Closure` only carries the capture count; the capture pairs follow the
/// instruction in the stream and are read with
/// [`decode_capture`](crate::decode_capture).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Constant { idx: u8 },
    Nil,
    True,
    False,
    Pop,
    GetLocal { slot: u8 },
    SetLocal { slot: u8 },
    GetGlobal { name: u8 },
    DefineGlobal { name: u8 },
    SetGlobal { name: u8 },
    GetUpvalue { slot: u8 },
    SetUpvalue { slot: u8 },
    GetProperty { name: u8 },
    SetProperty { name: u8 },
    GetSuper { name: u8 },
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    Print,
    Jump { offset: u16 },
    JumpIfFalse { offset: u16 },
    Loop { offset: u16 },
    Call { argc: u8 },
    Invoke { name: u8, argc: u8 },
    SuperInvoke { name: u8, argc: u8 },
    Closure { idx: u8, captures: u16 },
    CloseUpvalue,
    Return,
    Class { name: u8 },
    Inherit,
    Method { name: u8 },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant { idx } => write!(f, "Constant #{idx}"),
            Self::Nil => write!(f, "Nil"),
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Pop => write!(f, "Pop"),
            Self::GetLocal { slot } => write!(f, "GetLocal s{slot}"),
            Self::SetLocal { slot } => write!(f, "SetLocal s{slot}"),
            Self::GetGlobal { name } => write!(f, "GetGlobal #{name}"),
            Self::DefineGlobal { name } => write!(f, "DefineGlobal #{name}"),
            Self::SetGlobal { name } => write!(f, "SetGlobal #{name}"),
            Self::GetUpvalue { slot } => write!(f, "GetUpvalue u{slot}"),
            Self::SetUpvalue { slot } => write!(f, "SetUpvalue u{slot}"),
            Self::GetProperty { name } => write!(f, "GetProperty #{name}"),
            Self::SetProperty { name } => write!(f, "SetProperty #{name}"),
            Self::GetSuper { name } => write!(f, "GetSuper #{name}"),
            Self::Equal => write!(f, "Equal"),
            Self::Greater => write!(f, "Greater"),
            Self::Less => write!(f, "Less"),
            Self::Add => write!(f, "Add"),
            Self::Subtract => write!(f, "Subtract"),
            Self::Multiply => write!(f, "Multiply"),
            Self::Divide => write!(f, "Divide"),
            Self::Not => write!(f, "Not"),
            Self::Negate => write!(f, "Negate"),
            Self::Print => write!(f, "Print"),
            Self::Jump { offset } => write!(f, "Jump +{offset}"),
            Self::JumpIfFalse { offset } => write!(f, "JumpIfFalse +{offset}"),
            Self::Loop { offset } => write!(f, "Loop -{offset}"),
            Self::Call { argc } => write!(f, "Call ({argc})"),
            Self::Invoke { name, argc } => write!(f, "Invoke #{name} ({argc})"),
            Self::SuperInvoke { name, argc } => {
                write!(f, "SuperInvoke #{name} ({argc})")
            }
            Self::Closure { idx, captures } => {
                write!(f, "Closure #{idx} [{captures}]")
            }
            Self::CloseUpvalue => write!(f, "CloseUpvalue"),
            Self::Return => write!(f, "Return"),
            Self::Class { name } => write!(f, "Class #{name}"),
            Self::Inherit => write!(f, "Inherit"),
            Self::Method { name } => write!(f, "Method #{name}"),
        }
    }
}

impl fmt::Display for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local {
            write!(f, "local {}", self.index)
        } else {
            write!(f, "upvalue {}", self.index)
        }
    }
}
