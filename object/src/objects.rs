use core::fmt;

use crate::chunk::Chunk;
use crate::table::Table;
use crate::Value;

/// Generation-checked handle to a heap slot.
///
/// `index` names the slot, `generation` the occupant. A slot's generation
/// is bumped whenever its object is freed, so a handle that outlived its
/// object no longer matches.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    index: u32,
    generation: u32,
}

impl ObjRef {
    #[inline(always)]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline(always)]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}g{}", self.index, self.generation)
    }
}

/// Heap object tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Str,
    Function,
    Closure,
    Upvalue,
    Class,
    Instance,
    BoundMethod,
    Native,
}

/// Host function callable from scripts. Receives the argument slots.
pub type NativeFn = fn(&[Value]) -> Value;

// ── Str ────────────────────────────────────────────────────────────

/// Immutable interned string with its cached FNV-1a hash.
#[derive(Debug)]
pub struct Str {
    pub chars: Box<str>,
    pub hash: u32,
}

impl Str {
    pub fn as_str(&self) -> &str {
        &self.chars
    }
}

// ── Function ───────────────────────────────────────────────────────

/// Compiled function. Immutable once the compiler hands it over.
#[derive(Debug)]
pub struct Function {
    pub arity: u8,
    pub upvalue_count: usize,
    /// `None` for top-level script code.
    pub name: Option<ObjRef>,
    pub chunk: Chunk,
}

// ── Closure ────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Closure {
    pub function: ObjRef,
    /// One entry per captured variable, fixed at creation.
    pub upvalues: Box<[ObjRef]>,
}

// ── Upvalue ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpvalueState {
    /// Aliases the value stack slot at this index.
    Open(usize),
    /// Owns the value copied out of the stack when the slot went away.
    Closed(Value),
}

#[derive(Debug)]
pub struct Upvalue {
    pub state: UpvalueState,
    /// Next open upvalue, at a strictly lower stack slot.
    pub next: Option<ObjRef>,
}

impl Upvalue {
    pub const fn open(slot: usize, next: Option<ObjRef>) -> Self {
        Self {
            state: UpvalueState::Open(slot),
            next,
        }
    }

    pub const fn open_slot(&self) -> Option<usize> {
        match self.state {
            UpvalueState::Open(slot) => Some(slot),
            UpvalueState::Closed(_) => None,
        }
    }
}

// ── Class / Instance / BoundMethod ─────────────────────────────────

#[derive(Debug)]
pub struct Class {
    pub name: ObjRef,
    /// Method name → closure.
    pub methods: Table,
}

#[derive(Debug)]
pub struct Instance {
    pub class: ObjRef,
    pub fields: Table,
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}

#[derive(Debug)]
pub struct Native {
    pub function: NativeFn,
}

// ── Object ─────────────────────────────────────────────────────────

/// Every heap-allocated entity.
#[derive(Debug)]
pub enum Object {
    Str(Str),
    Function(Function),
    Closure(Closure),
    Upvalue(Upvalue),
    Class(Class),
    Instance(Instance),
    BoundMethod(BoundMethod),
    Native(Native),
}

macro_rules! accessors {
    ($($variant:ident => $as_ref:ident, $as_mut:ident;)*) => {
        $(
            #[inline]
            pub fn $as_ref(&self) -> Option<&$variant> {
                match self {
                    Self::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            #[inline]
            pub fn $as_mut(&mut self) -> Option<&mut $variant> {
                match self {
                    Self::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        )*
    };
}

impl Object {
    pub const fn object_type(&self) -> ObjectType {
        match self {
            Self::Str(_) => ObjectType::Str,
            Self::Function(_) => ObjectType::Function,
            Self::Closure(_) => ObjectType::Closure,
            Self::Upvalue(_) => ObjectType::Upvalue,
            Self::Class(_) => ObjectType::Class,
            Self::Instance(_) => ObjectType::Instance,
            Self::BoundMethod(_) => ObjectType::BoundMethod,
            Self::Native(_) => ObjectType::Native,
        }
    }

    accessors! {
        Str => as_str, as_str_mut;
        Function => as_function, as_function_mut;
        Closure => as_closure, as_closure_mut;
        Upvalue => as_upvalue, as_upvalue_mut;
        Class => as_class, as_class_mut;
        Instance => as_instance, as_instance_mut;
        BoundMethod => as_bound_method, as_bound_method_mut;
        Native => as_native, as_native_mut;
    }

    /// Estimated bytes owned by this object, used for collection pacing.
    pub fn size_hint(&self) -> usize {
        let entry = size_of::<ObjRef>() + size_of::<Value>();
        let payload = match self {
            Self::Str(s) => s.chars.len(),
            Self::Function(f) => {
                f.chunk.code.len()
                    + f.chunk.lines.len()
                    + f.chunk.constants.len() * size_of::<Value>()
            }
            Self::Closure(c) => c.upvalues.len() * size_of::<ObjRef>(),
            Self::Class(c) => c.methods.len() * entry,
            Self::Instance(i) => i.fields.len() * entry,
            Self::Upvalue(_) | Self::BoundMethod(_) | Self::Native(_) => 0,
        };
        size_of::<Self>() + payload
    }

    /// Visit every object this one references.
    pub fn trace(&self, visit: &mut impl FnMut(ObjRef)) {
        let mut value = |v: Value| {
            if let Value::Obj(r) = v {
                visit(r);
            }
        };
        match self {
            Self::Str(_) | Self::Native(_) => {}
            Self::Function(f) => {
                if let Some(name) = f.name {
                    value(Value::Obj(name));
                }
                f.chunk.constants.iter().copied().for_each(&mut value);
            }
            Self::Closure(c) => {
                value(Value::Obj(c.function));
                for &up in c.upvalues.iter() {
                    value(Value::Obj(up));
                }
            }
            Self::Upvalue(u) => {
                if let UpvalueState::Closed(v) = u.state {
                    value(v);
                }
                if let Some(next) = u.next {
                    value(Value::Obj(next));
                }
            }
            Self::Class(c) => {
                value(Value::Obj(c.name));
                c.methods.trace(&mut value);
            }
            Self::Instance(i) => {
                value(Value::Obj(i.class));
                i.fields.trace(&mut value);
            }
            Self::BoundMethod(b) => {
                value(b.receiver);
                value(Value::Obj(b.method));
            }
        }
    }
}
