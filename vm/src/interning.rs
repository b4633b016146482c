//! String interning.
//!
//! Every string object is unique by content, so string equality anywhere in
//! the runtime is handle equality. The pool holds its strings weakly: the
//! collector prunes entries nobody else references.

use std::collections::HashMap;

use ahash::RandomState;
use heap::{Heap, RootProvider};
use object::{ObjRef, Object, Str, Value};

use crate::Vm;

/// 32-bit FNV-1a.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

/// Content-addressed pool of string handles, bucketed by FNV-1a hash.
pub(crate) struct Interner {
    buckets: HashMap<u32, Vec<ObjRef>, RandomState>,
    len: usize,
}

impl Interner {
    pub(crate) fn new() -> Self {
        Self {
            buckets: HashMap::default(),
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Look up an existing string by content.
    pub(crate) fn find(&self, heap: &Heap, chars: &str) -> Option<ObjRef> {
        self.find_hashed(heap, chars, fnv1a(chars.as_bytes()))
    }

    pub(crate) fn find_hashed(
        &self,
        heap: &Heap,
        chars: &str,
        hash: u32,
    ) -> Option<ObjRef> {
        self.buckets
            .get(&hash)?
            .iter()
            .copied()
            .find(|&r| heap.string(r).as_str() == chars)
    }

    pub(crate) fn insert(&mut self, hash: u32, string: ObjRef) {
        self.buckets.entry(hash).or_default().push(string);
        self.len += 1;
    }

    /// Drop every entry `is_live` rejects.
    pub(crate) fn retain(&mut self, is_live: &dyn Fn(ObjRef) -> bool) {
        let mut len = 0;
        self.buckets.retain(|_, bucket| {
            bucket.retain(|&r| is_live(r));
            len += bucket.len();
            !bucket.is_empty()
        });
        self.len = len;
    }

    /// Intern directly against a heap, for use before a session exists.
    pub(crate) fn intern_with(
        &mut self,
        heap: &mut Heap,
        chars: &str,
        roots: &mut dyn RootProvider,
    ) -> ObjRef {
        let hash = fnv1a(chars.as_bytes());
        if let Some(existing) = self.find_hashed(heap, chars, hash) {
            return existing;
        }
        let string = heap.allocate(
            Object::Str(Str { chars: chars.into(), hash }),
            roots,
        );
        self.insert(hash, string);
        string
    }
}

impl Vm {
    /// Intern a copy of `chars`. Used for literal text.
    pub fn copy_string(&mut self, chars: &str) -> ObjRef {
        let hash = fnv1a(chars.as_bytes());
        if let Some(existing) = self.strings.find_hashed(&self.heap, chars, hash) {
            return existing;
        }
        self.allocate_string(chars.into(), hash)
    }

    /// Intern `chars`, taking ownership. Used for computed text; the buffer
    /// is dropped if an equal string already exists.
    pub fn take_string(&mut self, chars: String) -> ObjRef {
        let hash = fnv1a(chars.as_bytes());
        if let Some(existing) = self.strings.find_hashed(&self.heap, &chars, hash) {
            return existing;
        }
        self.allocate_string(chars.into_boxed_str(), hash)
    }

    fn allocate_string(&mut self, chars: Box<str>, hash: u32) -> ObjRef {
        let string = self.alloc(Object::Str(Str { chars, hash }));
        // Rooted on the stack while the pool registers it.
        self.push(Value::Obj(string));
        self.strings.insert(hash, string);
        self.pop();
        string
    }
}
