// vesper-vm - VM error path tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Every runtime-error message the VM can produce, plus the compile-error
//! channel and the stack-reset behavior after a failure.

mod common;

use common::{expect_compile_error, expect_runtime_error, vm_with_capture};
use vesper_vm::{InterpretError, RuntimeError};

// =============================================================================
// Calls & arity
// =============================================================================

#[test]
fn arity_mismatch() {
    expect_runtime_error("fun f(a) {} f(1, 2);", "Expected 1 argument but got 2.");
    expect_runtime_error("fun f(a, b) {} f(1);", "Expected 2 argument but got 1.");
}

#[test]
fn initializer_arity() {
    expect_runtime_error(
        "class C { init(a) {} } C();",
        "Expected 1 argument but got 0.",
    );
    expect_runtime_error("class D {} D(1);", "Expected 0 argument but got 1.");
}

#[test]
fn unbounded_recursion_overflows_frames() {
    expect_runtime_error("fun f() { f(); } f();", "Stack overflow.");
}

#[test]
fn calling_non_callables() {
    expect_runtime_error("var x = 1; x();", "Can only call functions and classes.");
    expect_runtime_error("\"text\"();", "Can only call functions and classes.");
    expect_runtime_error("nil();", "Can only call functions and classes.");
    expect_runtime_error("[1]();", "Can only call functions and classes.");
}

#[test]
fn calling_non_callable_field() {
    expect_runtime_error(
        "class C {} var c = C(); c.f = 1; c.f();",
        "Can only call functions and classes.",
    );
}

// =============================================================================
// Operators
// =============================================================================

#[test]
fn comparison_requires_numbers() {
    expect_runtime_error("print 1 < \"a\";", "Operand must be numbers.");
    expect_runtime_error("print true > false;", "Operand must be numbers.");
}

#[test]
fn arithmetic_requires_numbers() {
    expect_runtime_error("print 1 - nil;", "Operand must be numbers.");
    expect_runtime_error("print \"a\" * 2;", "Operand must be numbers.");
    expect_runtime_error("print nil / 1;", "Operand must be numbers.");
}

#[test]
fn negate_requires_number() {
    expect_runtime_error("print -\"text\";", "Operand must be a number");
    expect_runtime_error("print -nil;", "Operand must be a number");
}

#[test]
fn add_requires_matching_kinds() {
    expect_runtime_error("print 1 + \"a\";", "Operands must be two numbers or two strings.");
    expect_runtime_error("print \"a\" + 1;", "Operands must be two numbers or two strings.");
    expect_runtime_error("print nil + nil;", "Operands must be two numbers or two strings.");
}

// =============================================================================
// Globals
// =============================================================================

#[test]
fn undefined_global_read() {
    expect_runtime_error("print missing;", "Undefined symbol 'missing'.");
}

#[test]
fn undefined_global_assignment() {
    expect_runtime_error("missing = 1;", "Undefined variable 'missing'.");
}

#[test]
fn failed_assignment_does_not_declare() {
    let (mut vm, _output) = vm_with_capture();
    assert!(matches!(
        vm.interpret("ghost = 1;"),
        Err(InterpretError::Runtime(RuntimeError::UndefinedVariable(_)))
    ));
    // The failed assignment must not have left the global behind.
    assert!(matches!(
        vm.interpret("print ghost;"),
        Err(InterpretError::Runtime(RuntimeError::UndefinedSymbol(_)))
    ));
}

// =============================================================================
// Properties & classes
// =============================================================================

#[test]
fn property_access_on_non_instances() {
    expect_runtime_error("var x = 1; print x.y;", "Only instances have properties.");
    expect_runtime_error("var x = 1; x.y = 2;", "Only instances have fields.");
    expect_runtime_error("var s = \"str\"; s.m();", "Only instances have methods.");
}

#[test]
fn undefined_property() {
    expect_runtime_error("class C {} print C().q;", "Undefined property 'q'.");
    expect_runtime_error("class C {} C().q();", "Undefined property 'q'.");
    expect_runtime_error(
        "class A { m() {} } class B < A { n() { return super.missing(); } } B().n();",
        "Undefined property 'missing'.",
    );
}

#[test]
fn inheriting_from_non_class() {
    expect_runtime_error("var NotAClass = 1; class B < NotAClass {}", "Superclass must be a class.");
    expect_runtime_error("fun f() {} class B < f {}", "Superclass must be a class.");
}

// =============================================================================
// Lists
// =============================================================================

#[test]
fn indexing_non_lists() {
    expect_runtime_error("var x = 1; print x[0];", "Invalid type to index into.");
    expect_runtime_error("\"abc\"[0] = 1;", "Invalid type to index into.");
}

#[test]
fn non_numeric_index() {
    expect_runtime_error("print [1, 2][nil];", "List index is not a number.");
    expect_runtime_error("[1, 2][\"0\"] = 5;", "List index is not a number.");
}

#[test]
fn index_out_of_range() {
    expect_runtime_error("print [1, 2][5];", "List index out of range");
    expect_runtime_error("print [1, 2][-1];", "List index out of range");
    expect_runtime_error("print [][0];", "List index out of range");
    expect_runtime_error("[1][3] = 9;", "List index out of range");
}

// =============================================================================
// Natives
// =============================================================================

#[test]
fn native_arity_messages() {
    expect_runtime_error("length();", "insufficient arguments, need 1 got=0");
    expect_runtime_error("length([1], [2]);", "insufficient arguments, need 1 got=2");
    expect_runtime_error("append([1]);", "insufficient arguments, need 2 got=1");
    expect_runtime_error("delete([1]);", "insufficient arguments, need 2 got=1");
}

#[test]
fn native_type_messages() {
    expect_runtime_error("length(1);", "cannot get length of a non-list variable.");
    expect_runtime_error("append(1, 2);", "cannot append item to non-list variable.");
    expect_runtime_error("delete(1, 0);", "cannot append item to non-list variable.");
    expect_runtime_error("delete([1], \"x\");", "index cannot be a non-number value.");
    expect_runtime_error("delete([1], 5);", "index out of range.");
    expect_runtime_error("delete([1], -1);", "index out of range.");
}

// =============================================================================
// Compile errors
// =============================================================================

#[test]
fn syntax_errors_are_compile_errors() {
    expect_compile_error("var;");
    expect_compile_error("print 1 +;");
    expect_compile_error("{ print 1;");
    expect_compile_error("fun f( { }");
    expect_compile_error("1 = 2;");
}

#[test]
fn misplaced_keywords_are_compile_errors() {
    expect_compile_error("return 1;");
    expect_compile_error("print this;");
    expect_compile_error("print super.m;");
    expect_compile_error("class C { m() { return super.m(); } }");
    expect_compile_error("class C < C {}");
}

#[test]
fn scope_errors_are_compile_errors() {
    expect_compile_error("{ var a = 1; var a = 2; }");
    expect_compile_error("{ var a = a; }");
    expect_compile_error("class C { init() { return 1; } }");
}

#[test]
fn vm_survives_a_runtime_error() {
    let (mut vm, output) = vm_with_capture();
    assert!(vm.interpret("print missing;").is_err());
    vm.interpret("print 1 + 1;").expect("vm usable after error");
    assert_eq!(output.contents(), "2\n");
}
