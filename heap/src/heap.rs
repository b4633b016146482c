//! Arena heap with a tracing mark-and-sweep collector.
//!
//! Objects live in slots addressed by generation-checked [`ObjRef`]s. A freed
//! slot bumps its generation and goes on the free list, so a handle that
//! survived its object is caught on use instead of aliasing the next occupant.
//!
//! This crate is decoupled from the interpreter. Consumers provide:
//! - A [`RootProvider`] to supply live roots and prune weak tables.
//! - Object edges come from [`Object::trace`].

use std::mem;

use log::{debug, trace};
use object::{
    BoundMethod, Class, Closure, Function, Instance, Native, ObjRef, Object,
    Str, Upvalue, Value,
};

use crate::display::ValueDisplay;

// ── Public API types ──────────────────────────────────────────────────

/// Consumers implement this to provide GC roots.
///
/// Called at the start of every collection to discover live roots from VM
/// state (value stack, frames, globals, compiler temporaries).
pub trait RootProvider {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(Value));

    /// Called after marking and before sweeping. Weak tables drop every
    /// entry for which `is_live` returns false.
    fn retain_weak(&mut self, _is_live: &dyn Fn(ObjRef) -> bool) {}
}

/// Root provider with no roots. Collects everything.
pub struct NoRoots;

impl RootProvider for NoRoots {
    fn visit_roots(&mut self, _visitor: &mut dyn FnMut(Value)) {}
}

// ── Heap settings ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HeapSettings {
    /// Allocated bytes before the first collection, and the floor for every
    /// later threshold.
    pub initial_threshold: usize,
    /// After a collection the next threshold is `live bytes * growth_factor`.
    pub growth_factor: usize,
    /// Collect before every allocation.
    pub stress: bool,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            initial_threshold: 1024 * 1024, // 1 MiB
            growth_factor: 2,
            stress: false,
        }
    }
}

impl HeapSettings {
    #[inline]
    fn validate(&self) -> Result<(), &'static str> {
        if self.initial_threshold == 0 {
            return Err("initial_threshold must be > 0");
        }
        if self.growth_factor == 0 {
            return Err("growth_factor must be > 0");
        }
        Ok(())
    }
}

/// Cumulative collector statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub collections: usize,
    pub objects_freed: usize,
    pub bytes_freed: usize,
}

// ── Heap ──────────────────────────────────────────────────────────────

struct Entry {
    generation: u32,
    size: usize,
    object: Option<Object>,
}

pub struct Heap {
    entries: Vec<Entry>,
    /// Mark bits, parallel to `entries`.
    marks: Vec<bool>,
    free: Vec<u32>,
    gray: Vec<ObjRef>,
    live: usize,
    bytes_allocated: usize,
    next_gc: usize,
    settings: HeapSettings,
    stats: GcStats,
}

impl Heap {
    pub fn new(settings: HeapSettings) -> Self {
        settings.validate().expect("Invalid Heap Settings");
        Self {
            entries: Vec::new(),
            marks: Vec::new(),
            free: Vec::new(),
            gray: Vec::new(),
            live: 0,
            bytes_allocated: 0,
            next_gc: settings.initial_threshold,
            settings,
            stats: GcStats::default(),
        }
    }

    pub fn settings(&self) -> &HeapSettings {
        &self.settings
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.live
    }

    /// Allocate `object`, collecting first if the threshold is exceeded.
    ///
    /// Everything `object` references must already be reachable from
    /// `roots`; the new object itself is not, so the caller has to root the
    /// returned handle before the next allocation.
    pub fn allocate(
        &mut self,
        object: Object,
        roots: &mut dyn RootProvider,
    ) -> ObjRef {
        let size = object.size_hint();
        if self.settings.stress || self.bytes_allocated + size > self.next_gc {
            self.collect(roots);
        }

        let kind = object.object_type();
        self.bytes_allocated += size;
        self.live += 1;

        let handle = match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                debug_assert!(entry.object.is_none());
                entry.object = Some(object);
                entry.size = size;
                ObjRef::new(index, entry.generation)
            }
            None => {
                let index = u32::try_from(self.entries.len())
                    .expect("heap slot index overflow");
                self.entries.push(Entry {
                    generation: 0,
                    size,
                    object: Some(object),
                });
                self.marks.push(false);
                ObjRef::new(index, 0)
            }
        };

        trace!("allocate {handle:?} {kind:?} ({size} bytes)");
        handle
    }

    /// Run a full mark-and-sweep cycle.
    pub fn collect(&mut self, roots: &mut dyn RootProvider) {
        let before = self.bytes_allocated;
        debug!("gc begin: {before} bytes, {} objects", self.live);

        let mut gray = mem::take(&mut self.gray);
        {
            let entries = &self.entries;
            let marks = &mut self.marks;

            roots.visit_roots(&mut |value| {
                if let Value::Obj(r) = value {
                    mark(entries, marks, &mut gray, r);
                }
            });

            while let Some(r) = gray.pop() {
                let object = entries[r.index()]
                    .object
                    .as_ref()
                    .expect("gray object was freed");
                object.trace(&mut |child| mark(entries, marks, &mut gray, child));
            }
        }
        self.gray = gray;

        {
            let entries = &self.entries;
            let marks = &self.marks;
            roots.retain_weak(&|r| {
                entries
                    .get(r.index())
                    .is_some_and(|e| e.generation == r.generation())
                    && marks[r.index()]
            });
        }

        let (freed, bytes) = self.sweep();

        self.next_gc = self
            .bytes_allocated
            .saturating_mul(self.settings.growth_factor)
            .max(self.settings.initial_threshold);
        self.stats.collections += 1;
        self.stats.objects_freed += freed;
        self.stats.bytes_freed += bytes;

        debug!(
            "gc end: collected {bytes} bytes ({before} -> {}), {freed} objects, next at {}",
            self.bytes_allocated, self.next_gc
        );
    }

    fn sweep(&mut self) -> (usize, usize) {
        let mut freed = 0;
        let mut bytes = 0;
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.object.is_none() {
                continue;
            }
            if mem::take(&mut self.marks[index]) {
                continue;
            }
            entry.object = None;
            entry.generation = entry.generation.wrapping_add(1);
            bytes += entry.size;
            freed += 1;
            self.free.push(index as u32);
        }
        self.bytes_allocated -= bytes;
        self.live -= freed;
        (freed, bytes)
    }

    // ── Access ────────────────────────────────────────────────────────

    /// Whether `r` still names a live object.
    pub fn is_live(&self, r: ObjRef) -> bool {
        self.entries
            .get(r.index())
            .is_some_and(|e| e.generation == r.generation() && e.object.is_some())
    }

    pub fn get(&self, r: ObjRef) -> &Object {
        match self.entries.get(r.index()) {
            Some(Entry { generation, object: Some(object), .. })
                if *generation == r.generation() =>
            {
                object
            }
            _ => panic!("stale object handle {r:?}"),
        }
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Object {
        match self.entries.get_mut(r.index()) {
            Some(Entry { generation, object: Some(object), .. })
                if *generation == r.generation() =>
            {
                object
            }
            _ => panic!("stale object handle {r:?}"),
        }
    }

    pub fn display(&self, value: Value) -> ValueDisplay<'_> {
        ValueDisplay::new(self, value)
    }
}

fn mark(entries: &[Entry], marks: &mut [bool], gray: &mut Vec<ObjRef>, r: ObjRef) {
    let index = r.index();
    match entries.get(index) {
        Some(entry) if entry.generation == r.generation() && entry.object.is_some() => {}
        _ => panic!("stale object handle {r:?} reached during marking"),
    }
    if !marks[index] {
        marks[index] = true;
        gray.push(r);
    }
}

// ── Typed accessors ───────────────────────────────────────────────────

macro_rules! typed_accessors {
    ($($ty:ident => $get:ident, $get_mut:ident, $as_ref:ident, $as_mut:ident;)*) => {
        impl Heap {
            $(
                #[inline]
                pub fn $get(&self, r: ObjRef) -> &$ty {
                    self.get(r).$as_ref().unwrap_or_else(|| {
                        panic!(concat!("expected ", stringify!($ty), " at {:?}"), r)
                    })
                }

                #[inline]
                pub fn $get_mut(&mut self, r: ObjRef) -> &mut $ty {
                    self.get_mut(r).$as_mut().unwrap_or_else(|| {
                        panic!(concat!("expected ", stringify!($ty), " at {:?}"), r)
                    })
                }
            )*
        }
    };
}

typed_accessors! {
    Str => string, string_mut, as_str, as_str_mut;
    Function => function, function_mut, as_function, as_function_mut;
    Closure => closure, closure_mut, as_closure, as_closure_mut;
    Upvalue => upvalue, upvalue_mut, as_upvalue, as_upvalue_mut;
    Class => class, class_mut, as_class, as_class_mut;
    Instance => instance, instance_mut, as_instance, as_instance_mut;
    BoundMethod => bound_method, bound_method_mut, as_bound_method, as_bound_method_mut;
    Native => native, native_mut, as_native, as_native_mut;
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::{Table, UpvalueState};

    /// A simple root provider that holds a list of values.
    #[derive(Default)]
    struct TestRoots {
        roots: Vec<Value>,
        weak: Vec<ObjRef>,
    }

    impl RootProvider for TestRoots {
        fn visit_roots(&mut self, visitor: &mut dyn FnMut(Value)) {
            for &root in &self.roots {
                visitor(root);
            }
        }

        fn retain_weak(&mut self, is_live: &dyn Fn(ObjRef) -> bool) {
            self.weak.retain(|&r| is_live(r));
        }
    }

    fn test_settings() -> HeapSettings {
        HeapSettings {
            initial_threshold: 256,
            growth_factor: 2,
            stress: false,
        }
    }

    fn string(s: &str) -> Object {
        Object::Str(Str { chars: s.into(), hash: 0 })
    }

    #[test]
    fn allocation_is_accounted() {
        let mut heap = Heap::new(HeapSettings::default());
        let mut roots = TestRoots::default();
        let a = heap.allocate(string("abc"), &mut roots);
        assert!(heap.bytes_allocated() >= 3);
        assert_eq!(heap.object_count(), 1);
        assert_eq!(heap.string(a).as_str(), "abc");
    }

    #[test]
    fn collect_frees_unrooted_and_keeps_rooted() {
        let mut heap = Heap::new(HeapSettings::default());
        let mut roots = TestRoots::default();
        let kept = heap.allocate(string("kept"), &mut roots);
        roots.roots.push(Value::Obj(kept));
        let garbage = heap.allocate(string("garbage"), &mut roots);

        heap.collect(&mut roots);

        assert!(heap.is_live(kept));
        assert!(!heap.is_live(garbage));
        assert_eq!(heap.object_count(), 1);
        assert_eq!(heap.stats().collections, 1);
        assert_eq!(heap.stats().objects_freed, 1);
    }

    #[test]
    fn marking_follows_edges() {
        let mut heap = Heap::new(HeapSettings::default());
        let mut roots = TestRoots::default();
        let name = heap.allocate(string("Point"), &mut roots);
        roots.roots.push(Value::Obj(name));
        let class = heap.allocate(
            Object::Class(Class { name, methods: Table::new() }),
            &mut roots,
        );
        roots.roots.clear();
        roots.roots.push(Value::Obj(class));

        heap.collect(&mut roots);

        assert!(heap.is_live(class));
        assert!(heap.is_live(name));
    }

    #[test]
    fn cycles_are_collected() {
        let mut heap = Heap::new(HeapSettings::default());
        let mut roots = TestRoots::default();
        let name = heap.allocate(string("Node"), &mut roots);
        roots.roots.push(Value::Obj(name));
        let class = heap.allocate(
            Object::Class(Class { name, methods: Table::new() }),
            &mut roots,
        );
        roots.roots.push(Value::Obj(class));
        let instance = heap.allocate(
            Object::Instance(Instance { class, fields: Table::new() }),
            &mut roots,
        );
        heap.instance_mut(instance)
            .fields
            .set(name, Value::Obj(instance));

        roots.roots.clear();
        heap.collect(&mut roots);

        assert_eq!(heap.object_count(), 0);
        assert!(!heap.is_live(instance));
    }

    #[test]
    fn closed_upvalue_keeps_its_value() {
        let mut heap = Heap::new(HeapSettings::default());
        let mut roots = TestRoots::default();
        let s = heap.allocate(string("captured"), &mut roots);
        roots.roots.push(Value::Obj(s));
        let up = heap.allocate(
            Object::Upvalue(Upvalue {
                state: UpvalueState::Closed(Value::Obj(s)),
                next: None,
            }),
            &mut roots,
        );
        roots.roots = vec![Value::Obj(up)];

        heap.collect(&mut roots);
        assert!(heap.is_live(s));
    }

    #[test]
    fn freed_slot_is_reused_with_new_generation() {
        let mut heap = Heap::new(HeapSettings::default());
        let mut roots = TestRoots::default();
        let old = heap.allocate(string("old"), &mut roots);
        heap.collect(&mut roots);
        let new = heap.allocate(string("new"), &mut roots);

        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());
        assert!(!heap.is_live(old));
        assert_eq!(heap.string(new).as_str(), "new");
    }

    #[test]
    #[should_panic(expected = "stale object handle")]
    fn stale_handle_panics() {
        let mut heap = Heap::new(HeapSettings::default());
        let mut roots = TestRoots::default();
        let old = heap.allocate(string("old"), &mut roots);
        heap.collect(&mut roots);
        let _ = heap.allocate(string("new"), &mut roots);
        heap.get(old);
    }

    #[test]
    #[should_panic(expected = "expected Closure")]
    fn typed_accessor_checks_kind() {
        let mut heap = Heap::new(HeapSettings::default());
        let s = heap.allocate(string("x"), &mut NoRoots);
        heap.closure(s);
    }

    #[test]
    fn weak_entries_are_pruned() {
        let mut heap = Heap::new(HeapSettings::default());
        let mut roots = TestRoots::default();
        let kept = heap.allocate(string("kept"), &mut roots);
        let dropped = heap.allocate(string("dropped"), &mut roots);
        roots.roots.push(Value::Obj(kept));
        roots.weak = vec![kept, dropped];

        heap.collect(&mut roots);

        assert_eq!(roots.weak, vec![kept]);
    }

    #[test]
    fn threshold_triggers_collection_and_grows() {
        let mut heap = Heap::new(test_settings());
        let mut roots = TestRoots::default();
        for _ in 0..64 {
            heap.allocate(string("garbage garbage garbage"), &mut roots);
        }
        assert!(heap.stats().collections > 0);
        assert!(heap.next_gc() >= test_settings().initial_threshold);
        assert!(heap.bytes_allocated() <= heap.next_gc());
    }

    #[test]
    fn stress_collects_before_every_allocation() {
        let mut heap = Heap::new(HeapSettings { stress: true, ..test_settings() });
        let mut roots = TestRoots::default();
        for _ in 0..5 {
            heap.allocate(string("x"), &mut roots);
        }
        assert_eq!(heap.stats().collections, 5);
        assert_eq!(heap.object_count(), 1);
    }

    #[test]
    #[should_panic(expected = "Invalid Heap Settings")]
    fn zero_growth_is_rejected() {
        Heap::new(HeapSettings { growth_factor: 0, ..HeapSettings::default() });
    }
}
