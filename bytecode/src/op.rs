/// Bytecode opcodes.
///
/// Operands follow the opcode byte. Constant pool indices, local and upvalue
/// slots and argument counts are 8-bit. Jump offsets are 16-bit
/// little-endian and measured from the end of the jump instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Push a constant pool entry.
    /// Operands: `idx:u8`
    Constant = 0x00,
    Nil,
    True,
    False,
    Pop,

    /// Operands: `slot:u8` (frame relative)
    GetLocal,
    /// Operands: `slot:u8` (frame relative)
    SetLocal,

    /// Operands: `name:u8` (string constant)
    GetGlobal,
    /// Operands: `name:u8`
    DefineGlobal,
    /// Operands: `name:u8`
    SetGlobal,

    /// Operands: `slot:u8` (index into the closure's upvalue array)
    GetUpvalue,
    /// Operands: `slot:u8`
    SetUpvalue,

    /// Operands: `name:u8`
    GetProperty,
    /// Operands: `name:u8`
    SetProperty,
    /// Resolve a method on the superclass found on top of the stack.
    /// Operands: `name:u8`
    GetSuper,

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

    /// Operands: `offset:u16` (forward)
    Jump,
    /// Jump forward if the top of the stack is falsey. Does not pop.
    /// Operands: `offset:u16`
    JumpIfFalse,
    /// Operands: `offset:u16` (backward)
    Loop,

    /// Operands: `argc:u8`
    Call,
    /// Fused property lookup and call.
    /// Operands: `name:u8`, `argc:u8`
    Invoke,
    /// Fused superclass method lookup and call.
    /// Operands: `name:u8`, `argc:u8`
    SuperInvoke,

    /// Create a closure over a function constant.
    /// Operands: `idx:u8`, `count:u16` (LE), then `count` pairs of
    /// `is_local:u8`, `index:u8`.
    Closure,
    CloseUpvalue,
    Return,

    /// Operands: `name:u8`
    Class,
    Inherit,
    /// Operands: `name:u8`
    Method,
}

impl OpCode {
    pub const COUNT: usize = OpCode::Method as usize + 1;

    /// Human-readable mnemonic used by the disassembler.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Constant => "OP_CONSTANT",
            Self::Nil => "OP_NIL",
            Self::True => "OP_TRUE",
            Self::False => "OP_FALSE",
            Self::Pop => "OP_POP",
            Self::GetLocal => "OP_GET_LOCAL",
            Self::SetLocal => "OP_SET_LOCAL",
            Self::GetGlobal => "OP_GET_GLOBAL",
            Self::DefineGlobal => "OP_DEFINE_GLOBAL",
            Self::SetGlobal => "OP_SET_GLOBAL",
            Self::GetUpvalue => "OP_GET_UPVALUE",
            Self::SetUpvalue => "OP_SET_UPVALUE",
            Self::GetProperty => "OP_GET_PROPERTY",
            Self::SetProperty => "OP_SET_PROPERTY",
            Self::GetSuper => "OP_GET_SUPER",
            Self::Equal => "OP_EQUAL",
            Self::Greater => "OP_GREATER",
            Self::Less => "OP_LESS",
            Self::Add => "OP_ADD",
            Self::Subtract => "OP_SUBTRACT",
            Self::Multiply => "OP_MULTIPLY",
            Self::Divide => "OP_DIVIDE",
            Self::Not => "OP_NOT",
            Self::Negate => "OP_NEGATE",
            Self::Print => "OP_PRINT",
            Self::Jump => "OP_JUMP",
            Self::JumpIfFalse => "OP_JUMP_IF_FALSE",
            Self::Loop => "OP_LOOP",
            Self::Call => "OP_CALL",
            Self::Invoke => "OP_INVOKE",
            Self::SuperInvoke => "OP_SUPER_INVOKE",
            Self::Closure => "OP_CLOSURE",
            Self::CloseUpvalue => "OP_CLOSE_UPVALUE",
            Self::Return => "OP_RETURN",
            Self::Class => "OP_CLASS",
            Self::Inherit => "OP_INHERIT",
            Self::Method => "OP_METHOD",
        }
    }

    /// Whether this opcode takes exactly one `u8` operand.
    pub const fn has_byte_operand(self) -> bool {
        matches!(
            self,
            Self::Constant
                | Self::GetLocal
                | Self::SetLocal
                | Self::GetGlobal
                | Self::DefineGlobal
                | Self::SetGlobal
                | Self::GetUpvalue
                | Self::SetUpvalue
                | Self::GetProperty
                | Self::SetProperty
                | Self::GetSuper
                | Self::Call
                | Self::Class
                | Self::Method
        )
    }

    pub const fn is_jump(self) -> bool {
        matches!(self, Self::Jump | Self::JumpIfFalse | Self::Loop)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        use OpCode::*;
        const TABLE: [OpCode; OpCode::COUNT] = [
            Constant,
            Nil,
            True,
            False,
            Pop,
            GetLocal,
            SetLocal,
            GetGlobal,
            DefineGlobal,
            SetGlobal,
            GetUpvalue,
            SetUpvalue,
            GetProperty,
            SetProperty,
            GetSuper,
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
            Jump,
            JumpIfFalse,
            Loop,
            Call,
            Invoke,
            SuperInvoke,
            Closure,
            CloseUpvalue,
            Return,
            Class,
            Inherit,
            Method,
        ];
        TABLE.get(byte as usize).copied().ok_or(byte)
    }
}
