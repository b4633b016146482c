use core::fmt;

use object::{ObjRef, Object, Value, format_number};

use crate::Heap;

/// Display form of a value as `print` shows it.
pub struct ValueDisplay<'a> {
    heap: &'a Heap,
    value: Value,
}

impl<'a> ValueDisplay<'a> {
    pub(crate) fn new(heap: &'a Heap, value: Value) -> Self {
        Self { heap, value }
    }

    fn function(&self, f: &mut fmt::Formatter<'_>, r: ObjRef) -> fmt::Result {
        match self.heap.function(r).name {
            Some(name) => write!(f, "<fn {}>", self.heap.string(name).as_str()),
            None => f.write_str("<script>"),
        }
    }
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = match self.value {
            Value::Nil => return f.write_str("nil"),
            Value::Bool(b) => return write!(f, "{b}"),
            Value::Number(n) => return f.write_str(&format_number(n)),
            Value::Obj(r) => r,
        };
        match self.heap.get(r) {
            Object::Str(s) => f.write_str(s.as_str()),
            Object::Function(_) => self.function(f, r),
            Object::Closure(c) => self.function(f, c.function),
            Object::BoundMethod(b) => {
                self.function(f, self.heap.closure(b.method).function)
            }
            Object::Upvalue(_) => f.write_str("upvalue"),
            Object::Class(c) => f.write_str(self.heap.string(c.name).as_str()),
            Object::Instance(i) => {
                let class = self.heap.class(i.class);
                write!(f, "{} instance", self.heap.string(class.name).as_str())
            }
            Object::Native(_) => f.write_str("<native fn>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeapSettings, NoRoots};
    use object::{Chunk, Class, Function, Instance, Native, Str, Table};

    fn alloc_str(heap: &mut Heap, s: &str) -> ObjRef {
        heap.allocate(Object::Str(Str { chars: s.into(), hash: 0 }), &mut NoRoots)
    }

    fn function(name: Option<ObjRef>) -> Object {
        Object::Function(Function {
            arity: 0,
            upvalue_count: 0,
            name,
            chunk: Chunk::default(),
        })
    }

    #[test]
    fn primitives() {
        let heap = Heap::new(HeapSettings::default());
        assert_eq!(heap.display(Value::Nil).to_string(), "nil");
        assert_eq!(heap.display(Value::Bool(true)).to_string(), "true");
        assert_eq!(heap.display(Value::Number(2.5)).to_string(), "2.5");
    }

    #[test]
    fn objects() {
        let mut heap = Heap::new(HeapSettings::default());
        let name = alloc_str(&mut heap, "Pair");
        let class = heap.allocate(
            Object::Class(Class { name, methods: Table::new() }),
            &mut NoRoots,
        );
        let instance = heap.allocate(
            Object::Instance(Instance { class, fields: Table::new() }),
            &mut NoRoots,
        );
        let named = heap.allocate(function(Some(name)), &mut NoRoots);
        let script = heap.allocate(function(None), &mut NoRoots);
        fn zero(_: &[Value]) -> Value {
            Value::Number(0.0)
        }
        let native = heap.allocate(
            Object::Native(Native { function: zero }),
            &mut NoRoots,
        );

        let show = |r| heap.display(Value::Obj(r)).to_string();
        assert_eq!(show(name), "Pair");
        assert_eq!(show(class), "Pair");
        assert_eq!(show(instance), "Pair instance");
        assert_eq!(show(named), "<fn Pair>");
        assert_eq!(show(script), "<script>");
        assert_eq!(show(native), "<native fn>");
    }
}
