use std::collections::HashMap;

use ahash::RandomState;

use crate::objects::ObjRef;
use crate::Value;

/// Identity-keyed map backing globals, fields and method tables.
///
/// Keys are interned strings, so comparing handles compares content.
#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: HashMap<ObjRef, Value, RandomState>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, key: ObjRef) -> Option<Value> {
        self.entries.get(&key).copied()
    }

    /// Insert or overwrite. Returns `true` if the key was not present.
    #[inline]
    pub fn set(&mut self, key: ObjRef, value: Value) -> bool {
        self.entries.insert(key, value).is_none()
    }

    /// Returns `true` if the key existed.
    #[inline]
    pub fn delete(&mut self, key: ObjRef) -> bool {
        self.entries.remove(&key).is_some()
    }

    pub fn contains(&self, key: ObjRef) -> bool {
        self.entries.contains_key(&key)
    }

    /// Copy every entry into `dest`, overwriting existing keys.
    pub fn add_all_into(&self, dest: &mut Table) {
        dest.entries
            .extend(self.entries.iter().map(|(&k, &v)| (k, v)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries.iter().map(|(&k, &v)| (k, v))
    }

    /// Visit every key and value as a [`Value`].
    pub fn trace(&self, visit: &mut impl FnMut(Value)) {
        for (&key, &value) in &self.entries {
            visit(Value::Obj(key));
            visit(value);
        }
    }
}
