// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Heap object representation.
//!
//! Every object shares a header carrying its mark flag and the intrusive
//! link that threads it onto the heap's live list; the payload is one of
//! the [`ObjKind`] variants.

use std::mem;

use crate::chunk::Chunk;
use crate::table::Table;
use crate::value::Value;
use crate::vm::Vm;

/// Handle to a heap object. Copyable and stable for the object's lifetime;
/// comparing handles is identity comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjRef(pub(crate) u32);

impl ObjRef {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Signature every native function implements: the argument values, already
/// copied off the stack, go in; a result value or a runtime error comes out.
pub type NativeFn = fn(&mut Vm, &[Value]) -> crate::vm::Result<Value>;

/// Common object header plus kind-specific payload.
#[derive(Debug)]
pub struct Obj {
    pub(crate) marked: bool,
    pub(crate) next: Option<ObjRef>,
    pub(crate) size: usize,
    pub kind: ObjKind,
}

#[derive(Debug)]
pub enum ObjKind {
    Str(StrObj),
    Function(Function),
    Closure(Closure),
    Upvalue(Upvalue),
    Class(Class),
    Instance(Instance),
    BoundMethod(BoundMethod),
    Native(Native),
    List(List),
}

/// An immutable, interned string with its precomputed FNV-1a hash.
#[derive(Debug)]
pub struct StrObj {
    pub chars: Box<str>,
    pub hash: u32,
}

/// A compiled function body. Produced by the compiler, never mutated after.
#[derive(Debug)]
pub struct Function {
    pub arity: usize,
    pub upvalue_count: usize,
    pub chunk: Chunk,
    /// None for the top-level script.
    pub name: Option<ObjRef>,
}

/// A function paired with its captured environment.
#[derive(Debug)]
pub struct Closure {
    pub function: ObjRef,
    /// Exactly `function.upvalue_count` entries once construction finishes.
    pub upvalues: Vec<ObjRef>,
}

/// The indirection through which a closure reads a variable from an
/// enclosing scope. Open while the variable still lives in a stack slot,
/// closed (owning the value) after that slot is discarded. The transition
/// happens exactly once.
#[derive(Debug)]
pub enum Upvalue {
    Open {
        slot: usize,
        /// Link in the VM's open-upvalue list, sorted by descending slot.
        next: Option<ObjRef>,
    },
    Closed(Value),
}

#[derive(Debug)]
pub struct Class {
    pub name: ObjRef,
    pub methods: Table,
}

#[derive(Debug)]
pub struct Instance {
    pub class: ObjRef,
    pub fields: Table,
}

/// A method closure bound to the receiver it was accessed through.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}

pub struct Native {
    pub function: NativeFn,
}

impl std::fmt::Debug for Native {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<native fn>")
    }
}

/// A growable ordered sequence of values.
#[derive(Debug)]
pub struct List {
    pub items: Vec<Value>,
}

impl ObjKind {
    /// Estimated heap footprint, charged against the GC threshold when the
    /// object is allocated and credited back when it is swept.
    pub(crate) fn heap_size(&self) -> usize {
        let payload = match self {
            ObjKind::Str(s) => s.chars.len(),
            ObjKind::Function(f) => {
                f.chunk.code.capacity()
                    + f.chunk.constants.capacity() * mem::size_of::<Value>()
                    + f.chunk.lines.capacity() * mem::size_of::<u32>()
            }
            ObjKind::Closure(c) => c.upvalues.capacity() * mem::size_of::<ObjRef>(),
            ObjKind::Upvalue(_) => 0,
            ObjKind::Class(c) => c.methods.heap_size(),
            ObjKind::Instance(i) => i.fields.heap_size(),
            ObjKind::BoundMethod(_) => 0,
            ObjKind::Native(_) => 0,
            ObjKind::List(l) => l.items.capacity() * mem::size_of::<Value>(),
        };
        mem::size_of::<Obj>() + payload
    }
}
