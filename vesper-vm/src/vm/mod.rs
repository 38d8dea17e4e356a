// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Stack-based virtual machine for executing Vesper bytecode.

pub mod frame;
pub mod stack;

use std::fmt;
use std::io::{self, Write};
use std::time::Instant;

use smallvec::SmallVec;

use crate::compiler::compile;
use crate::heap::{Heap, fnv1a};
use crate::natives;
use crate::object::{
    BoundMethod, Class, Closure, Instance, List, NativeFn, ObjKind, ObjRef, StrObj, Upvalue,
};
use crate::opcode::Op;
use crate::table::Table;
use crate::value::Value;

pub use frame::CallFrame;
pub use stack::{STACK_MAX, ValueStack};

/// Maximum call depth.
pub const FRAMES_MAX: usize = 256;

/// Runtime error raised by the VM. `Display` gives the message the
/// interpreter prints ahead of the stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Internal invariant breach: an operand stack access went below the
    /// live region. Compiled code never triggers this.
    StackUnderflow,
    /// Call depth reached `FRAMES_MAX`.
    StackOverflow,
    /// Wrong number of arguments to a call.
    Arity { expected: usize, got: usize },
    /// Callee is not a closure, bound method, class, or native function.
    NotCallable,
    /// Arithmetic or comparison on a non-number.
    OperandsMustBeNumbers,
    /// Negation of a non-number.
    OperandMustBeNumber,
    /// `+` over mixed operand kinds.
    AddOperands,
    /// Property read on a non-instance.
    PropertyOnNonInstance,
    /// Field write on a non-instance.
    FieldOnNonInstance,
    /// Method invocation on a non-instance.
    MethodOnNonInstance,
    /// No such field or method on the receiver's class.
    UndefinedProperty(String),
    /// Read of an undefined global.
    UndefinedSymbol(String),
    /// Assignment to an undefined global.
    UndefinedVariable(String),
    /// Indexing applied to something that is not a list.
    ListTypeExpected,
    /// List index is not a number.
    ListIndexNotNumber,
    /// List index outside `[0, count)`.
    ListIndexOutOfRange,
    /// `<` clause names a non-class.
    SuperclassNotClass,
    /// Error raised by a native function.
    Native(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::StackUnderflow => write!(f, "stack underflow"),
            RuntimeError::StackOverflow => write!(f, "Stack overflow."),
            RuntimeError::Arity { expected, got } => {
                write!(f, "Expected {} argument but got {}.", expected, got)
            }
            RuntimeError::NotCallable => write!(f, "Can only call functions and classes."),
            RuntimeError::OperandsMustBeNumbers => write!(f, "Operand must be numbers."),
            RuntimeError::OperandMustBeNumber => write!(f, "Operand must be a number"),
            RuntimeError::AddOperands => {
                write!(f, "Operands must be two numbers or two strings.")
            }
            RuntimeError::PropertyOnNonInstance => write!(f, "Only instances have properties."),
            RuntimeError::FieldOnNonInstance => write!(f, "Only instances have fields."),
            RuntimeError::MethodOnNonInstance => write!(f, "Only instances have methods."),
            RuntimeError::UndefinedProperty(name) => {
                write!(f, "Undefined property '{}'.", name)
            }
            RuntimeError::UndefinedSymbol(name) => write!(f, "Undefined symbol '{}'.", name),
            RuntimeError::UndefinedVariable(name) => {
                write!(f, "Undefined variable '{}'.", name)
            }
            RuntimeError::ListTypeExpected => write!(f, "Invalid type to index into."),
            RuntimeError::ListIndexNotNumber => write!(f, "List index is not a number."),
            RuntimeError::ListIndexOutOfRange => write!(f, "List index out of range"),
            RuntimeError::SuperclassNotClass => write!(f, "Superclass must be a class."),
            RuntimeError::Native(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Result type for VM operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Overall outcome of [`Vm::interpret`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpretError {
    /// The compiler reported errors; nothing was executed.
    Compile,
    /// Execution stopped on a runtime error. The message and stack trace
    /// have already been written to stderr.
    Runtime(RuntimeError),
}

impl fmt::Display for InterpretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpretError::Compile => write!(f, "compile error"),
            InterpretError::Runtime(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for InterpretError {}

/// The Vesper virtual machine.
pub struct Vm {
    /// Object heap, including the string intern table.
    pub(crate) heap: Heap,

    /// Operand stack.
    pub(crate) stack: ValueStack,

    /// Call frames, innermost last.
    pub(crate) frames: Vec<CallFrame>,

    /// Global variables.
    pub(crate) globals: Table,

    /// Head of the open-upvalue list, sorted by descending stack slot.
    pub(crate) open_upvalues: Option<ObjRef>,

    /// The interned `"init"`, looked up on every class call.
    pub(crate) init_string: Option<ObjRef>,

    /// Values the in-progress compiler has asked the collector to keep.
    pub(crate) compiler_roots: Vec<Value>,

    start: Instant,
    stdout: Box<dyn Write>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Build a VM whose program output (`print`, `write`) goes to `stdout`
    /// instead of the process's standard output.
    pub fn with_output(stdout: Box<dyn Write>) -> Self {
        let mut vm = Self {
            heap: Heap::new(),
            stack: ValueStack::new(),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: None,
            init_string: None,
            compiler_roots: Vec::new(),
            start: Instant::now(),
            stdout,
        };
        vm.init_string = Some(vm.intern("init"));
        natives::register(&mut vm);
        vm
    }

    /// Compile and execute `source`.
    pub fn interpret(&mut self, source: &str) -> std::result::Result<(), InterpretError> {
        self.compiler_roots.clear();
        let Some(function) = compile(self, source) else {
            self.compiler_roots.clear();
            return Err(InterpretError::Compile);
        };
        self.stack.push(Value::Obj(function));
        self.compiler_roots.clear();

        let closure = self.alloc(ObjKind::Closure(Closure {
            function,
            upvalues: Vec::new(),
        }));
        self.stack.truncate(self.stack.len() - 1);
        self.stack.push(Value::Obj(closure));

        let outcome = self
            .call_closure(closure, 0)
            .and_then(|_| self.run());
        match outcome {
            Ok(()) => Ok(()),
            Err(error) => {
                self.report_runtime_error(&error);
                self.reset_stack();
                Err(InterpretError::Runtime(error))
            }
        }
    }

    /// Register a native function under a global name.
    pub fn define_native(&mut self, name: &str, function: NativeFn) {
        let name = self.intern(name);
        self.stack.push(Value::Obj(name));
        let native = self.alloc(ObjKind::Native(crate::object::Native { function }));
        self.stack.push(Value::Obj(native));
        let key = self.heap.str_key(name);
        self.globals.set(key, Value::Obj(native));
        self.stack.truncate(self.stack.len() - 2);
    }

    /// Intern `text`, returning the canonical string object. Two calls with
    /// equal content return the same handle.
    pub fn intern(&mut self, text: &str) -> ObjRef {
        let hash = fnv1a(text.as_bytes());
        if let Some(existing) = self.heap.find_string(text, hash) {
            return existing;
        }
        let obj = self.alloc(ObjKind::Str(StrObj {
            chars: text.into(),
            hash,
        }));
        self.heap.register_string(obj, hash);
        obj
    }

    /// Read access to the heap, mainly for tests and the disassembler.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Force a collection on every allocation.
    pub fn set_gc_stress(&mut self, stress: bool) {
        self.heap.set_stress(stress);
    }

    /// Allocate an object, running a collection first when the byte
    /// threshold (or stress mode) demands one. Anything reachable only
    /// from engine locals must already be on the stack at this point.
    pub(crate) fn alloc(&mut self, kind: ObjKind) -> ObjRef {
        let size = kind.heap_size();
        self.heap.reserve(size);
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.alloc_raw(kind, size)
    }

    pub(crate) fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Append to a list object, charging the collector for capacity growth.
    /// Both the list and the item must be stack-reachable: growth can
    /// trigger a collection.
    pub(crate) fn list_push(&mut self, list: ObjRef, item: Value) {
        let (len, capacity) = {
            let items = &self.heap.as_list(list).items;
            (items.len(), items.capacity())
        };
        if len == capacity {
            let grown = if capacity < 8 { 8 } else { capacity * 2 };
            let delta = (grown - capacity) * size_of::<Value>();
            self.heap.reserve(delta);
            if self.heap.should_collect() {
                self.collect_garbage();
            }
            self.heap.as_list_mut(list).items.reserve_exact(grown - len);
            self.heap.get_mut(list).size += delta;
        }
        self.heap.as_list_mut(list).items.push(item);
    }

    fn run(&mut self) -> Result<()> {
        loop {
            #[cfg(feature = "trace")]
            self.trace_instruction();

            let op = Op::from_byte(self.read_byte()).expect("undecodable opcode");
            match op {
                Op::Constant => {
                    let constant = self.read_constant();
                    self.stack.push(constant);
                }
                Op::Nil => self.stack.push(Value::Nil),
                Op::True => self.stack.push(Value::Bool(true)),
                Op::False => self.stack.push(Value::Bool(false)),
                Op::Pop => {
                    self.stack.pop()?;
                }

                Op::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slots;
                    let value = self.stack.get(base + slot)?;
                    self.stack.push(value);
                }
                Op::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slots;
                    let value = self.stack.peek(0)?;
                    self.stack.set(base + slot, value)?;
                }
                Op::GetGlobal => {
                    let name = self.read_string();
                    let key = self.heap.str_key(name);
                    match self.globals.get(key) {
                        Some(value) => self.stack.push(value),
                        None => {
                            return Err(RuntimeError::UndefinedSymbol(
                                self.heap.as_str(name).chars.to_string(),
                            ));
                        }
                    }
                }
                Op::DefineGlobal => {
                    let name = self.read_string();
                    let key = self.heap.str_key(name);
                    let value = self.stack.peek(0)?;
                    self.globals.set(key, value);
                    self.stack.pop()?;
                }
                Op::SetGlobal => {
                    let name = self.read_string();
                    let key = self.heap.str_key(name);
                    let value = self.stack.peek(0)?;
                    if self.globals.set(key, value) {
                        // Assignment must not implicitly declare.
                        self.globals.delete(key);
                        return Err(RuntimeError::UndefinedVariable(
                            self.heap.as_str(name).chars.to_string(),
                        ));
                    }
                }
                Op::GetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.heap.as_closure(self.frame().closure).upvalues[index];
                    let value = match *self.heap.as_upvalue(upvalue) {
                        Upvalue::Open { slot, .. } => self.stack.get(slot)?,
                        Upvalue::Closed(value) => value,
                    };
                    self.stack.push(value);
                }
                Op::SetUpvalue => {
                    let index = self.read_byte() as usize;
                    let value = self.stack.peek(0)?;
                    let upvalue = self.heap.as_closure(self.frame().closure).upvalues[index];
                    match self.heap.as_upvalue_mut(upvalue) {
                        Upvalue::Open { slot, .. } => {
                            let slot = *slot;
                            self.stack.set(slot, value)?;
                        }
                        Upvalue::Closed(stored) => *stored = value,
                    }
                }

                Op::GetProperty => {
                    let name = self.read_string();
                    let target = self.stack.peek(0)?;
                    let Some(instance) = self.heap.instance_obj(target) else {
                        return Err(RuntimeError::PropertyOnNonInstance);
                    };
                    let key = self.heap.str_key(name);
                    if let Some(value) = self.heap.as_instance(instance).fields.get(key) {
                        self.stack.pop()?;
                        self.stack.push(value);
                    } else {
                        let class = self.heap.as_instance(instance).class;
                        self.bind_method(class, name)?;
                    }
                }
                Op::SetProperty => {
                    let name = self.read_string();
                    let target = self.stack.peek(1)?;
                    let Some(instance) = self.heap.instance_obj(target) else {
                        return Err(RuntimeError::FieldOnNonInstance);
                    };
                    let key = self.heap.str_key(name);
                    let value = self.stack.peek(0)?;
                    self.set_instance_field(instance, key, value);
                    let value = self.stack.pop()?;
                    self.stack.pop()?;
                    self.stack.push(value);
                }
                Op::GetSuper => {
                    let name = self.read_string();
                    let superclass = self
                        .stack
                        .pop()?
                        .as_obj()
                        .expect("superclass slot holds a class");
                    self.bind_method(superclass, name)?;
                }

                Op::Equal => {
                    let b = self.stack.pop()?;
                    let a = self.stack.pop()?;
                    self.stack.push(Value::Bool(a == b));
                }
                Op::Greater => {
                    let (a, b) = self.pop_number_pair()?;
                    self.stack.push(Value::Bool(a > b));
                }
                Op::Less => {
                    let (a, b) = self.pop_number_pair()?;
                    self.stack.push(Value::Bool(a < b));
                }
                Op::Add => {
                    let rhs = self.stack.peek(0)?;
                    let lhs = self.stack.peek(1)?;
                    if let (Some(a), Some(b)) =
                        (self.heap.string_obj(lhs), self.heap.string_obj(rhs))
                    {
                        let text = format!(
                            "{}{}",
                            self.heap.as_str(a).chars,
                            self.heap.as_str(b).chars
                        );
                        let result = self.intern(&text);
                        self.stack.pop()?;
                        self.stack.pop()?;
                        self.stack.push(Value::Obj(result));
                    } else if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
                        self.stack.pop()?;
                        self.stack.pop()?;
                        self.stack.push(Value::Number(a + b));
                    } else {
                        return Err(RuntimeError::AddOperands);
                    }
                }
                Op::Subtract => {
                    let (a, b) = self.pop_number_pair()?;
                    self.stack.push(Value::Number(a - b));
                }
                Op::Multiply => {
                    let (a, b) = self.pop_number_pair()?;
                    self.stack.push(Value::Number(a * b));
                }
                Op::Divide => {
                    let (a, b) = self.pop_number_pair()?;
                    self.stack.push(Value::Number(a / b));
                }
                Op::Not => {
                    let value = self.stack.pop()?;
                    self.stack.push(Value::Bool(value.is_falsy()));
                }
                Op::Negate => {
                    if self.stack.peek(0)?.as_number().is_none() {
                        return Err(RuntimeError::OperandMustBeNumber);
                    }
                    let n = self.stack.pop()?.as_number().expect("checked number");
                    self.stack.push(Value::Number(-n));
                }

                Op::Print => {
                    let value = self.stack.pop()?;
                    self.write_value(value, false);
                }
                Op::Println => {
                    let value = self.stack.pop()?;
                    self.write_value(value, true);
                }

                Op::Jump => {
                    let offset = self.read_short() as usize;
                    self.frame_mut().ip += offset;
                }
                Op::JumpIfFalse => {
                    let offset = self.read_short() as usize;
                    if self.stack.peek(0)?.is_falsy() {
                        self.frame_mut().ip += offset;
                    }
                }
                Op::Loop => {
                    let offset = self.read_short() as usize;
                    self.frame_mut().ip -= offset;
                }

                Op::Call => {
                    let argc = self.read_byte() as usize;
                    let callee = self.stack.peek(argc)?;
                    self.call_value(callee, argc)?;
                }
                Op::Invoke => {
                    let name = self.read_string();
                    let argc = self.read_byte() as usize;
                    self.invoke(name, argc)?;
                }
                Op::SuperInvoke => {
                    let name = self.read_string();
                    let argc = self.read_byte() as usize;
                    let superclass = self
                        .stack
                        .pop()?
                        .as_obj()
                        .expect("superclass slot holds a class");
                    self.invoke_from_class(superclass, name, argc)?;
                }

                Op::Closure => {
                    let function = self
                        .read_constant()
                        .as_obj()
                        .expect("closure operand is a function constant");
                    let upvalue_count = self.heap.as_function(function).upvalue_count;
                    let closure = self.alloc(ObjKind::Closure(Closure {
                        function,
                        upvalues: Vec::with_capacity(upvalue_count),
                    }));
                    self.stack.push(Value::Obj(closure));
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() == 1;
                        let index = self.read_byte() as usize;
                        let upvalue = if is_local {
                            let base = self.frame().slots;
                            self.capture_upvalue(base + index)
                        } else {
                            self.heap.as_closure(self.frame().closure).upvalues[index]
                        };
                        self.heap.as_closure_mut(closure).upvalues.push(upvalue);
                    }
                }
                Op::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top)?;
                    self.stack.pop()?;
                }

                Op::ListInit => {
                    let count = self.read_byte() as usize;
                    let list = self.alloc(ObjKind::List(List { items: Vec::new() }));
                    // Keep the list visible to the collector while the
                    // appends below allocate.
                    self.stack.push(Value::Obj(list));
                    for distance in (1..=count).rev() {
                        let item = self.stack.peek(distance)?;
                        self.list_push(list, item);
                    }
                    self.stack.pop()?;
                    for _ in 0..count {
                        self.stack.pop()?;
                    }
                    self.stack.push(Value::Obj(list));
                }
                Op::ListGetIdx => {
                    let index = self.stack.pop()?;
                    let target = self.stack.pop()?;
                    let Some(list) = self.heap.list_obj(target) else {
                        return Err(RuntimeError::ListTypeExpected);
                    };
                    let index = self.check_list_index(list, index)?;
                    let value = self.heap.as_list(list).items[index];
                    self.stack.push(value);
                }
                Op::ListSetIdx => {
                    let item = self.stack.pop()?;
                    let index = self.stack.pop()?;
                    let target = self.stack.pop()?;
                    let Some(list) = self.heap.list_obj(target) else {
                        return Err(RuntimeError::ListTypeExpected);
                    };
                    let index = self.check_list_index(list, index)?;
                    self.heap.as_list_mut(list).items[index] = item;
                    self.stack.push(item);
                }

                Op::Return => {
                    let result = self.stack.pop()?;
                    let frame = self.frames.pop().expect("no active frame");
                    self.close_upvalues(frame.slots)?;
                    if self.frames.is_empty() {
                        self.stack.pop()?;
                        return Ok(());
                    }
                    self.stack.truncate(frame.slots);
                    self.stack.push(result);
                }

                Op::Class => {
                    let name = self.read_string();
                    let class = self.alloc(ObjKind::Class(Class {
                        name,
                        methods: Table::new(),
                    }));
                    self.stack.push(Value::Obj(class));
                }
                Op::Inherit => {
                    let superclass = self.stack.peek(1)?;
                    let Some(superclass) = self.heap.class_obj(superclass) else {
                        return Err(RuntimeError::SuperclassNotClass);
                    };
                    let subclass = self
                        .stack
                        .peek(0)?
                        .as_obj()
                        .expect("subclass on stack");
                    self.inherit_methods(superclass, subclass);
                    self.stack.pop()?;
                }
                Op::Method => {
                    let name = self.read_string();
                    self.define_method(name)?;
                }
            }
        }
    }

    // =========================================================================
    // Decoding
    // =========================================================================

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active frame");
        let function = self.heap.as_closure(frame.closure).function;
        let byte = self.heap.as_function(function).chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        let frame = self.frames.last().expect("no active frame");
        let function = self.heap.as_closure(frame.closure).function;
        self.heap.as_function(function).chunk.constants[index]
    }

    fn read_string(&mut self) -> ObjRef {
        self.read_constant()
            .as_obj()
            .expect("operand names a string constant")
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call_value(&mut self, callee: Value, argc: usize) -> Result<()> {
        enum Dispatch {
            Bound(Value, ObjRef),
            Class,
            Closure,
            Native(NativeFn),
            Other,
        }

        let Some(obj) = callee.as_obj() else {
            return Err(RuntimeError::NotCallable);
        };
        let dispatch = match &self.heap.get(obj).kind {
            ObjKind::BoundMethod(bound) => Dispatch::Bound(bound.receiver, bound.method),
            ObjKind::Class(_) => Dispatch::Class,
            ObjKind::Closure(_) => Dispatch::Closure,
            ObjKind::Native(native) => Dispatch::Native(native.function),
            _ => Dispatch::Other,
        };

        match dispatch {
            Dispatch::Bound(receiver, method) => {
                let slot = self.stack.len() - argc - 1;
                self.stack.set(slot, receiver)?;
                self.call_closure(method, argc)
            }
            Dispatch::Class => {
                let instance = self.alloc(ObjKind::Instance(Instance {
                    class: obj,
                    fields: Table::new(),
                }));
                let slot = self.stack.len() - argc - 1;
                self.stack.set(slot, Value::Obj(instance))?;

                let init = self.init_string.expect("init string interned at startup");
                let key = self.heap.str_key(init);
                if let Some(initializer) = self.heap.as_class(obj).methods.get(key) {
                    let closure = initializer.as_obj().expect("methods hold closures");
                    self.call_closure(closure, argc)
                } else if argc != 0 {
                    Err(RuntimeError::Arity {
                        expected: 0,
                        got: argc,
                    })
                } else {
                    Ok(())
                }
            }
            Dispatch::Closure => self.call_closure(obj, argc),
            Dispatch::Native(function) => {
                let base = self.stack.len() - argc;
                let args: SmallVec<[Value; 8]> = SmallVec::from_slice(self.stack.tail(base));
                let result = function(self, &args)?;
                self.stack.truncate(self.stack.len() - argc - 1);
                self.stack.push(result);
                Ok(())
            }
            Dispatch::Other => Err(RuntimeError::NotCallable),
        }
    }

    fn call_closure(&mut self, closure: ObjRef, argc: usize) -> Result<()> {
        let arity = {
            let function = self.heap.as_closure(closure).function;
            self.heap.as_function(function).arity
        };
        if argc != arity {
            return Err(RuntimeError::Arity {
                expected: arity,
                got: argc,
            });
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        let slots = self.stack.len() - argc - 1;
        self.frames.push(CallFrame::new(closure, slots));
        Ok(())
    }

    fn invoke(&mut self, name: ObjRef, argc: usize) -> Result<()> {
        let receiver = self.stack.peek(argc)?;
        let Some(instance) = self.heap.instance_obj(receiver) else {
            return Err(RuntimeError::MethodOnNonInstance);
        };
        let key = self.heap.str_key(name);
        if let Some(field) = self.heap.as_instance(instance).fields.get(key) {
            let slot = self.stack.len() - argc - 1;
            self.stack.set(slot, field)?;
            return self.call_value(field, argc);
        }
        let class = self.heap.as_instance(instance).class;
        self.invoke_from_class(class, name, argc)
    }

    fn invoke_from_class(&mut self, class: ObjRef, name: ObjRef, argc: usize) -> Result<()> {
        let key = self.heap.str_key(name);
        let Some(method) = self.heap.as_class(class).methods.get(key) else {
            return Err(RuntimeError::UndefinedProperty(
                self.heap.as_str(name).chars.to_string(),
            ));
        };
        let closure = method.as_obj().expect("methods hold closures");
        self.call_closure(closure, argc)
    }

    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<()> {
        let key = self.heap.str_key(name);
        let Some(method) = self.heap.as_class(class).methods.get(key) else {
            return Err(RuntimeError::UndefinedProperty(
                self.heap.as_str(name).chars.to_string(),
            ));
        };
        let receiver = self.stack.peek(0)?;
        let method = method.as_obj().expect("methods hold closures");
        let bound = self.alloc(ObjKind::BoundMethod(BoundMethod { receiver, method }));
        self.stack.pop()?;
        self.stack.push(Value::Obj(bound));
        Ok(())
    }

    // =========================================================================
    // Upvalues
    // =========================================================================

    /// Find or create the open upvalue for a stack slot, keeping the open
    /// list sorted by descending slot so at most one upvalue exists per
    /// slot.
    fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut prev: Option<ObjRef> = None;
        let mut cursor = self.open_upvalues;
        while let Some(handle) = cursor {
            let (existing, next) = match *self.heap.as_upvalue(handle) {
                Upvalue::Open { slot, next } => (slot, next),
                Upvalue::Closed(_) => unreachable!("closed upvalue on the open list"),
            };
            if existing == slot {
                return handle;
            }
            if existing < slot {
                break;
            }
            prev = Some(handle);
            cursor = next;
        }

        let created = self.alloc(ObjKind::Upvalue(Upvalue::Open { slot, next: cursor }));
        match prev {
            None => self.open_upvalues = Some(created),
            Some(prev) => match self.heap.as_upvalue_mut(prev) {
                Upvalue::Open { next, .. } => *next = Some(created),
                Upvalue::Closed(_) => unreachable!("closed upvalue on the open list"),
            },
        }
        created
    }

    /// Close every open upvalue whose slot is at or above `from_slot`,
    /// moving the slot's value into the upvalue itself.
    fn close_upvalues(&mut self, from_slot: usize) -> Result<()> {
        while let Some(handle) = self.open_upvalues {
            let (slot, next) = match *self.heap.as_upvalue(handle) {
                Upvalue::Open { slot, next } => (slot, next),
                Upvalue::Closed(_) => unreachable!("closed upvalue on the open list"),
            };
            if slot < from_slot {
                break;
            }
            let value = self.stack.get(slot)?;
            *self.heap.as_upvalue_mut(handle) = Upvalue::Closed(value);
            self.open_upvalues = next;
        }
        Ok(())
    }

    // =========================================================================
    // Classes & lists
    // =========================================================================

    fn define_method(&mut self, name: ObjRef) -> Result<()> {
        let method = self.stack.peek(0)?;
        let class = self
            .stack
            .peek(1)?
            .as_obj()
            .expect("method declaration targets a class");
        let key = self.heap.str_key(name);

        let before = self.heap.as_class(class).methods.heap_size();
        self.heap.as_class_mut(class).methods.set(key, method);
        let after = self.heap.as_class(class).methods.heap_size();
        if after > before {
            self.heap.reserve(after - before);
            self.heap.get_mut(class).size += after - before;
        }

        self.stack.pop()?;
        Ok(())
    }

    /// Copy the superclass's methods into the freshly declared subclass.
    /// The subclass table is empty at this point, so methods the subclass
    /// declares afterwards override what was copied.
    fn inherit_methods(&mut self, superclass: ObjRef, subclass: ObjRef) {
        let source = std::mem::take(&mut self.heap.as_class_mut(superclass).methods);
        let before = self.heap.as_class(subclass).methods.heap_size();
        self.heap.as_class_mut(subclass).methods.add_all(&source);
        let after = self.heap.as_class(subclass).methods.heap_size();
        self.heap.as_class_mut(superclass).methods = source;

        if after > before {
            self.heap.reserve(after - before);
            self.heap.get_mut(subclass).size += after - before;
        }
    }

    fn set_instance_field(&mut self, instance: ObjRef, key: crate::table::StrKey, value: Value) {
        let before = self.heap.as_instance(instance).fields.heap_size();
        self.heap.as_instance_mut(instance).fields.set(key, value);
        let after = self.heap.as_instance(instance).fields.heap_size();
        if after > before {
            self.heap.reserve(after - before);
            self.heap.get_mut(instance).size += after - before;
        }
    }

    fn check_list_index(&self, list: ObjRef, index: Value) -> Result<usize> {
        let Some(number) = index.as_number() else {
            return Err(RuntimeError::ListIndexNotNumber);
        };
        let index = number as i64;
        let count = self.heap.as_list(list).items.len() as i64;
        if index < 0 || index >= count {
            return Err(RuntimeError::ListIndexOutOfRange);
        }
        Ok(index as usize)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn pop_number_pair(&mut self) -> Result<(f64, f64)> {
        let (Some(b), Some(a)) = (
            self.stack.peek(0)?.as_number(),
            self.stack.peek(1)?.as_number(),
        ) else {
            return Err(RuntimeError::OperandsMustBeNumbers);
        };
        self.stack.pop()?;
        self.stack.pop()?;
        Ok((a, b))
    }

    fn write_value(&mut self, value: Value, newline: bool) {
        let _ = write!(self.stdout, "{}", self.heap.display(value));
        if newline {
            let _ = writeln!(self.stdout);
        }
        let _ = self.stdout.flush();
    }

    fn report_runtime_error(&self, error: &RuntimeError) {
        eprintln!("{error}");
        for frame in self.frames.iter().rev() {
            let function = self.heap.as_closure(frame.closure).function;
            let function = self.heap.as_function(function);
            let line = function.chunk.line(frame.ip.saturating_sub(1));
            match function.name {
                Some(name) => {
                    eprintln!("[line {}] in {}()", line, self.heap.as_str(name).chars)
                }
                None => eprintln!("[line {}] in script", line),
            }
        }
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues = None;
    }

    #[cfg(feature = "trace")]
    fn trace_instruction(&self) {
        use std::fmt::Write as _;

        let mut slots = String::from("          ");
        for value in self.stack.iter() {
            let _ = write!(slots, "[ {} ]", self.heap.display(*value));
        }
        println!("{slots}");

        let frame = self.frame();
        let function = self.heap.as_closure(frame.closure).function;
        let chunk = &self.heap.as_function(function).chunk;
        crate::debug::disassemble_instruction(&self.heap, chunk, frame.ip);
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
