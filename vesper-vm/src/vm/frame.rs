// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Call frames.

use crate::object::ObjRef;

/// The activation record for one in-progress call.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    /// The closure being executed.
    pub closure: ObjRef,

    /// Instruction pointer: index of the next byte in the closure's
    /// function's chunk.
    pub ip: usize,

    /// Base of the frame in the value stack. Slot 0 holds the callee (the
    /// receiver, for methods), arguments follow, then locals and
    /// temporaries.
    pub slots: usize,
}

impl CallFrame {
    pub fn new(closure: ObjRef, slots: usize) -> Self {
        Self {
            closure,
            ip: 0,
            slots,
        }
    }
}
