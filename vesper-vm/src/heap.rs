// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The object heap.
//!
//! A slot arena owns every object; handles are slot indices and stay valid
//! until the object is swept. Live objects are additionally threaded onto
//! an intrusive list through their headers, which is what the sweep phase
//! walks. The heap also owns the string intern table, which holds weak
//! entries: the collector purges dead strings from it before sweeping.

use crate::object::{
    Class, Closure, Function, Instance, List, Obj, ObjKind, ObjRef, StrObj, Upvalue,
};
use crate::table::{StrKey, Table};
use crate::value::{Value, ValueDisplay};

/// First collection fires after a megabyte of live allocation.
const INITIAL_NEXT_GC: usize = 1024 * 1024;

/// Threshold multiplier applied after every collection.
const GC_GROW_FACTOR: usize = 2;

/// 32-bit FNV-1a, the hash every interned string carries.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<Obj>>,
    free: Vec<usize>,
    /// Head of the intrusive live-object list.
    head: Option<ObjRef>,
    /// Intern table: every live string, keyed by content hash. Weak.
    strings: Table,
    bytes_allocated: usize,
    next_gc: usize,
    stress: bool,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            next_gc: INITIAL_NEXT_GC,
            ..Self::default()
        }
    }

    /// Force a collection on every allocation. Test hook.
    pub fn set_stress(&mut self, stress: bool) {
        self.stress = stress;
    }

    /// Bytes currently charged against the collection threshold.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Charge `bytes` against the threshold ahead of an allocation or a
    /// container growth inside an already-allocated object.
    pub(crate) fn reserve(&mut self, bytes: usize) {
        self.bytes_allocated += bytes;
    }

    /// True when the next allocation must run a collection first.
    pub(crate) fn should_collect(&self) -> bool {
        self.stress || self.bytes_allocated > self.next_gc
    }

    /// Place an object into the arena and link it onto the live list.
    /// The caller has already charged `size` via [`Heap::reserve`] and run
    /// the collector if the threshold demanded it.
    pub(crate) fn alloc_raw(&mut self, kind: ObjKind, size: usize) -> ObjRef {
        let obj = Obj {
            marked: false,
            next: self.head,
            size,
            kind,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(obj);
                index
            }
            None => {
                self.slots.push(Some(obj));
                self.slots.len() - 1
            }
        };
        let handle = ObjRef(index as u32);
        self.head = Some(handle);
        handle
    }

    /// Look up an already-interned string by content.
    pub(crate) fn find_string(&self, text: &str, hash: u32) -> Option<ObjRef> {
        let slots = &self.slots;
        self.strings
            .find_key(hash, |obj| {
                matches!(
                    &slots[obj.index()],
                    Some(Obj { kind: ObjKind::Str(s), .. }) if &*s.chars == text
                )
            })
            .map(|key| key.obj)
    }

    /// Record a freshly created string in the intern table.
    pub(crate) fn register_string(&mut self, obj: ObjRef, hash: u32) {
        self.strings.set(StrKey { obj, hash }, Value::Nil);
    }

    /// Drop intern entries whose strings did not survive marking. Runs
    /// between tracing and sweeping.
    pub(crate) fn remove_unmarked_strings(&mut self) {
        let slots = &self.slots;
        self.strings
            .retain_keys(|obj| slots[obj.index()].as_ref().is_some_and(|o| o.marked));
    }

    /// Free every unmarked object, clear the mark on every survivor, and
    /// rescale the collection threshold.
    pub(crate) fn sweep(&mut self) {
        let mut link: Option<ObjRef> = None;
        let mut cursor = self.head;
        let mut survivors_head: Option<ObjRef> = None;

        while let Some(handle) = cursor {
            let index = handle.index();
            let obj = self.slots[index].as_mut().expect("live list holds a freed slot");
            let next = obj.next;
            if obj.marked {
                obj.marked = false;
                obj.next = None;
                match link {
                    Some(prev) => {
                        self.slots[prev.index()]
                            .as_mut()
                            .expect("live list holds a freed slot")
                            .next = Some(handle);
                    }
                    None => survivors_head = Some(handle),
                }
                link = Some(handle);
            } else {
                self.bytes_allocated -= obj.size;
                self.slots[index] = None;
                self.free.push(index);
            }
            cursor = next;
        }

        self.head = survivors_head;
        self.next_gc = self.bytes_allocated * GC_GROW_FACTOR;
    }

    pub fn get(&self, handle: ObjRef) -> &Obj {
        self.slots[handle.index()]
            .as_ref()
            .expect("use of freed object")
    }

    pub fn get_mut(&mut self, handle: ObjRef) -> &mut Obj {
        self.slots[handle.index()]
            .as_mut()
            .expect("use of freed object")
    }

    /// Fallible header lookup, used by the collector while marking.
    pub(crate) fn try_get_mut(&mut self, handle: ObjRef) -> Option<&mut Obj> {
        self.slots[handle.index()].as_mut()
    }

    pub fn as_str(&self, handle: ObjRef) -> &StrObj {
        match &self.get(handle).kind {
            ObjKind::Str(s) => s,
            _ => panic!("expected string object"),
        }
    }

    pub fn as_function(&self, handle: ObjRef) -> &Function {
        match &self.get(handle).kind {
            ObjKind::Function(f) => f,
            _ => panic!("expected function object"),
        }
    }

    pub fn as_closure(&self, handle: ObjRef) -> &Closure {
        match &self.get(handle).kind {
            ObjKind::Closure(c) => c,
            _ => panic!("expected closure object"),
        }
    }

    pub(crate) fn as_closure_mut(&mut self, handle: ObjRef) -> &mut Closure {
        match &mut self.get_mut(handle).kind {
            ObjKind::Closure(c) => c,
            _ => panic!("expected closure object"),
        }
    }

    pub fn as_upvalue(&self, handle: ObjRef) -> &Upvalue {
        match &self.get(handle).kind {
            ObjKind::Upvalue(u) => u,
            _ => panic!("expected upvalue object"),
        }
    }

    pub(crate) fn as_upvalue_mut(&mut self, handle: ObjRef) -> &mut Upvalue {
        match &mut self.get_mut(handle).kind {
            ObjKind::Upvalue(u) => u,
            _ => panic!("expected upvalue object"),
        }
    }

    pub fn as_class(&self, handle: ObjRef) -> &Class {
        match &self.get(handle).kind {
            ObjKind::Class(c) => c,
            _ => panic!("expected class object"),
        }
    }

    pub(crate) fn as_class_mut(&mut self, handle: ObjRef) -> &mut Class {
        match &mut self.get_mut(handle).kind {
            ObjKind::Class(c) => c,
            _ => panic!("expected class object"),
        }
    }

    pub fn as_instance(&self, handle: ObjRef) -> &Instance {
        match &self.get(handle).kind {
            ObjKind::Instance(i) => i,
            _ => panic!("expected instance object"),
        }
    }

    pub(crate) fn as_instance_mut(&mut self, handle: ObjRef) -> &mut Instance {
        match &mut self.get_mut(handle).kind {
            ObjKind::Instance(i) => i,
            _ => panic!("expected instance object"),
        }
    }

    pub fn as_list(&self, handle: ObjRef) -> &List {
        match &self.get(handle).kind {
            ObjKind::List(l) => l,
            _ => panic!("expected list object"),
        }
    }

    pub(crate) fn as_list_mut(&mut self, handle: ObjRef) -> &mut List {
        match &mut self.get_mut(handle).kind {
            ObjKind::List(l) => l,
            _ => panic!("expected list object"),
        }
    }

    /// The handle behind `value`, if it is a string object.
    pub fn string_obj(&self, value: Value) -> Option<ObjRef> {
        value
            .as_obj()
            .filter(|&obj| matches!(self.get(obj).kind, ObjKind::Str(_)))
    }

    /// The handle behind `value`, if it is a class object.
    pub fn class_obj(&self, value: Value) -> Option<ObjRef> {
        value
            .as_obj()
            .filter(|&obj| matches!(self.get(obj).kind, ObjKind::Class(_)))
    }

    /// The handle behind `value`, if it is an instance object.
    pub fn instance_obj(&self, value: Value) -> Option<ObjRef> {
        value
            .as_obj()
            .filter(|&obj| matches!(self.get(obj).kind, ObjKind::Instance(_)))
    }

    /// The handle behind `value`, if it is a list object.
    pub fn list_obj(&self, value: Value) -> Option<ObjRef> {
        value
            .as_obj()
            .filter(|&obj| matches!(self.get(obj).kind, ObjKind::List(_)))
    }

    /// Key a table operation by an interned string handle.
    pub fn str_key(&self, handle: ObjRef) -> StrKey {
        StrKey {
            obj: handle,
            hash: self.as_str(handle).hash,
        }
    }

    /// A `Display` adapter for `value` backed by this heap.
    pub fn display(&self, value: Value) -> ValueDisplay<'_> {
        ValueDisplay::new(self, value)
    }

    /// Walk the intrusive live list, yielding every object handle.
    pub fn live_objects(&self) -> impl Iterator<Item = ObjRef> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let handle = cursor?;
            cursor = self.get(handle).next;
            Some(handle)
        })
    }
}
