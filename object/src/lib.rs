mod value;
mod objects;
mod table;
mod chunk;

pub use value::{Value, format_number};
pub use objects::{
    ObjRef, ObjectType, Object, NativeFn,
    Str, Function, Closure, Upvalue, UpvalueState,
    Class, Instance, BoundMethod, Native,
};
pub use table::Table;
pub use chunk::Chunk;
