// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Tri-color mark-sweep collection.
//!
//! White objects are unmarked, gray objects sit on the worklist with their
//! references still unwalked, black objects have been fully traced. A cycle
//! marks the VM's roots gray, drains the worklist, purges dead strings from
//! the weak intern table, then sweeps the heap's live list.

use crate::heap::Heap;
use crate::object::{ObjKind, ObjRef, Upvalue};
use crate::table::Table;
use crate::value::Value;
use crate::vm::Vm;

impl Vm {
    /// Run one full collection cycle. Runs synchronously inside an
    /// allocation; every object the engine still needs must be reachable
    /// from a root (stack, frames, open upvalues, globals, the `init`
    /// string, or the compiler's published roots) when this is entered.
    pub fn collect_garbage(&mut self) {
        let mut gray: Vec<ObjRef> = Vec::new();

        for value in self.stack.iter() {
            mark_value(&mut self.heap, &mut gray, *value);
        }
        for frame in &self.frames {
            mark_object(&mut self.heap, &mut gray, frame.closure);
        }
        let mut open = self.open_upvalues;
        while let Some(handle) = open {
            mark_object(&mut self.heap, &mut gray, handle);
            open = match *self.heap.as_upvalue(handle) {
                Upvalue::Open { next, .. } => next,
                Upvalue::Closed(_) => unreachable!("closed upvalue on the open list"),
            };
        }
        mark_table(&mut self.heap, &mut gray, &self.globals);
        if let Some(init) = self.init_string {
            mark_object(&mut self.heap, &mut gray, init);
        }
        for value in &self.compiler_roots {
            mark_value(&mut self.heap, &mut gray, *value);
        }

        while let Some(handle) = gray.pop() {
            blacken(&mut self.heap, &mut gray, handle);
        }

        self.heap.remove_unmarked_strings();
        self.heap.sweep();
    }
}

/// Mark a value's object, if it holds one.
fn mark_value(heap: &mut Heap, gray: &mut Vec<ObjRef>, value: Value) {
    if let Value::Obj(obj) = value {
        mark_object(heap, gray, obj);
    }
}

/// White → gray: set the mark flag and queue the object for tracing.
fn mark_object(heap: &mut Heap, gray: &mut Vec<ObjRef>, obj: ObjRef) {
    let Some(header) = heap.try_get_mut(obj) else {
        return;
    };
    if header.marked {
        return;
    }
    header.marked = true;
    gray.push(obj);
}

fn mark_table(heap: &mut Heap, gray: &mut Vec<ObjRef>, table: &Table) {
    for (key, value) in table.iter() {
        mark_object(heap, gray, key.obj);
        mark_value(heap, gray, value);
    }
}

/// Gray → black: mark everything the object references.
fn blacken(heap: &mut Heap, gray: &mut Vec<ObjRef>, obj: ObjRef) {
    let mut refs: Vec<Value> = Vec::new();
    match &heap.get(obj).kind {
        ObjKind::Str(_) | ObjKind::Native(_) => {}
        ObjKind::Function(function) => {
            if let Some(name) = function.name {
                refs.push(Value::Obj(name));
            }
            refs.extend(function.chunk.constants.iter().copied());
        }
        ObjKind::Closure(closure) => {
            refs.push(Value::Obj(closure.function));
            refs.extend(closure.upvalues.iter().map(|&u| Value::Obj(u)));
        }
        ObjKind::Upvalue(upvalue) => {
            if let Upvalue::Closed(value) = upvalue {
                refs.push(*value);
            }
        }
        ObjKind::Class(class) => {
            refs.push(Value::Obj(class.name));
            for (key, value) in class.methods.iter() {
                refs.push(Value::Obj(key.obj));
                refs.push(value);
            }
        }
        ObjKind::Instance(instance) => {
            refs.push(Value::Obj(instance.class));
            for (key, value) in instance.fields.iter() {
                refs.push(Value::Obj(key.obj));
                refs.push(value);
            }
        }
        ObjKind::BoundMethod(bound) => {
            refs.push(bound.receiver);
            refs.push(Value::Obj(bound.method));
        }
        ObjKind::List(list) => refs.extend(list.items.iter().copied()),
    }

    for value in refs {
        mark_value(heap, gray, value);
    }
}
