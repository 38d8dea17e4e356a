// vesper-vm - Shared helpers for VM integration tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use vesper_vm::{InterpretError, Vm};

/// A `Write` handle the test can read back after the VM is done with its
/// boxed clone.
#[derive(Clone, Default)]
pub struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl SharedOutput {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("program output is UTF-8")
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A fresh VM wired to a capturable output buffer.
pub fn vm_with_capture() -> (Vm, SharedOutput) {
    let output = SharedOutput::default();
    let vm = Vm::with_output(Box::new(output.clone()));
    (vm, output)
}

/// Run a script on a fresh VM and return its stdout.
pub fn run(source: &str) -> Result<String, InterpretError> {
    let (mut vm, output) = vm_with_capture();
    vm.interpret(source)?;
    Ok(output.contents())
}

/// Like [`run`], with the collector forced on every allocation.
pub fn run_stressed(source: &str) -> Result<String, InterpretError> {
    let (mut vm, output) = vm_with_capture();
    vm.set_gc_stress(true);
    vm.interpret(source)?;
    Ok(output.contents())
}

pub fn expect_output(source: &str, expected: &str) {
    match run(source) {
        Ok(output) => assert_eq!(output, expected, "source: {source}"),
        Err(e) => panic!("script failed with {e:?}: {source}"),
    }
}

/// Assert the script stops with a runtime error carrying exactly `message`.
pub fn expect_runtime_error(source: &str, message: &str) {
    match run(source) {
        Err(InterpretError::Runtime(error)) => {
            assert_eq!(error.to_string(), message, "source: {source}");
        }
        other => panic!("expected runtime error '{message}', got {other:?}: {source}"),
    }
}

/// Assert the script is rejected by the compiler.
pub fn expect_compile_error(source: &str) {
    match run(source) {
        Err(InterpretError::Compile) => {}
        other => panic!("expected compile error, got {other:?}: {source}"),
    }
}
