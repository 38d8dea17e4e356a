// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The built-in native functions.
//!
//! All four are registered at VM startup. Natives report failure through
//! the ordinary runtime-error channel; the engine prints the message and a
//! stack trace like any other runtime error.

use crate::value::Value;
use crate::vm::{Result, RuntimeError, Vm};

pub(crate) fn register(vm: &mut Vm) {
    vm.define_native("clock", clock);
    vm.define_native("length", length);
    vm.define_native("append", append);
    vm.define_native("delete", delete);
}

/// `clock()`: seconds elapsed since the VM started.
fn clock(vm: &mut Vm, _args: &[Value]) -> Result<Value> {
    Ok(Value::Number(vm.elapsed_seconds()))
}

/// `length(list)`: number of elements.
fn length(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    if args.len() != 1 {
        return Err(RuntimeError::Native(format!(
            "insufficient arguments, need 1 got={}",
            args.len()
        )));
    }
    let Some(list) = vm.heap.list_obj(args[0]) else {
        return Err(RuntimeError::Native(
            "cannot get length of a non-list variable.".to_string(),
        ));
    };
    Ok(Value::Number(vm.heap.as_list(list).items.len() as f64))
}

/// `append(list, item)`: push `item` onto the end of `list`.
fn append(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    if args.len() != 2 {
        return Err(RuntimeError::Native(format!(
            "insufficient arguments, need 2 got={}",
            args.len()
        )));
    }
    let Some(list) = vm.heap.list_obj(args[0]) else {
        return Err(RuntimeError::Native(
            "cannot append item to non-list variable.".to_string(),
        ));
    };
    vm.list_push(list, args[1]);
    Ok(Value::Nil)
}

/// `delete(list, index)`: remove the element at `index`, shifting the
/// tail left.
fn delete(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    if args.len() != 2 {
        return Err(RuntimeError::Native(format!(
            "insufficient arguments, need 2 got={}",
            args.len()
        )));
    }
    let Some(list) = vm.heap.list_obj(args[0]) else {
        return Err(RuntimeError::Native(
            "cannot append item to non-list variable.".to_string(),
        ));
    };
    let Some(number) = args[1].as_number() else {
        return Err(RuntimeError::Native(
            "index cannot be a non-number value.".to_string(),
        ));
    };
    let index = number as i64;
    let count = vm.heap.as_list(list).items.len() as i64;
    if index < 0 || index >= count {
        return Err(RuntimeError::Native("index out of range.".to_string()));
    }
    vm.heap.as_list_mut(list).items.remove(index as usize);
    Ok(Value::Nil)
}
