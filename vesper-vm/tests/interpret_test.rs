// vesper-vm - End-to-end interpreter tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Whole-pipeline tests: source text in, exact stdout back.

mod common;

use common::expect_output;

// =============================================================================
// Literals, arithmetic, printing
// =============================================================================

#[test]
fn prints_arithmetic() {
    expect_output("print 1 + 2;", "3\n");
    expect_output("print (5 - 3) * 4 / 2;", "4\n");
    expect_output("print -5 + 10;", "5\n");
    expect_output("print 2.5 * 2;", "5\n");
    expect_output("print 0.5;", "0.5\n");
}

#[test]
fn prints_literals() {
    expect_output("print nil;", "nil\n");
    expect_output("print true;", "true\n");
    expect_output("print false;", "false\n");
    expect_output("print \"hello\";", "hello\n");
}

#[test]
fn write_omits_newline() {
    expect_output("write \"a\"; write \"b\"; print \"\";", "ab\n");
    expect_output("write 1 + 2;", "3");
}

#[test]
fn negation_and_not() {
    expect_output("print !true;", "false\n");
    expect_output("print !nil;", "true\n");
    expect_output("print !0;", "false\n");
    expect_output("print --5;", "5\n");
}

// =============================================================================
// Equality & comparison
// =============================================================================

#[test]
fn equality() {
    expect_output("print 1 == 1;", "true\n");
    expect_output("print 1 == 2;", "false\n");
    expect_output("print 1 != 2;", "true\n");
    expect_output("print nil == false;", "false\n");
    expect_output("print \"a\" == \"a\";", "true\n");
    expect_output("print \"a\" == \"b\";", "false\n");
    expect_output("print \"1\" == 1;", "false\n");
}

#[test]
fn comparison() {
    expect_output("print 1 < 2;", "true\n");
    expect_output("print 2 > 2;", "false\n");
    expect_output("print 2 >= 2;", "true\n");
    expect_output("print 3 <= 2;", "false\n");
}

// =============================================================================
// Strings
// =============================================================================

#[test]
fn concatenation() {
    expect_output("var a = \"he\"; var b = \"llo\"; print a + b;", "hello\n");
    expect_output("print \"\" + \"x\" + \"\";", "x\n");
}

#[test]
fn interning_makes_concat_results_identical() {
    expect_output("print \"a\" + \"b\" == \"ab\";", "true\n");
}

// =============================================================================
// Variables & scope
// =============================================================================

#[test]
fn globals() {
    expect_output("var x = 1; x = x + 1; print x;", "2\n");
    expect_output("var x; print x;", "nil\n");
    expect_output("var x = 1; var y = x = 3; print y;", "3\n");
}

#[test]
fn locals_and_shadowing() {
    expect_output("{ var x = 10; print x; }", "10\n");
    expect_output("var x = 1; { var x = 2; print x; } print x;", "2\n1\n");
}

// =============================================================================
// Control flow
// =============================================================================

#[test]
fn if_else() {
    expect_output("if (true) print \"yes\"; else print \"no\";", "yes\n");
    expect_output("if (nil) print \"yes\"; else print \"no\";", "no\n");
    expect_output("if (false) print \"skipped\";", "");
}

#[test]
fn logical_operators_return_operands() {
    expect_output("print true and 2;", "2\n");
    expect_output("print nil and 1;", "nil\n");
    expect_output("print false or \"fallback\";", "fallback\n");
    expect_output("print 1 or 2;", "1\n");
}

#[test]
fn while_loop() {
    expect_output(
        "var i = 0; while (i < 3) { print i; i = i + 1; }",
        "0\n1\n2\n",
    );
}

#[test]
fn for_loop() {
    expect_output("for (var i = 0; i < 3; i = i + 1) print i;", "0\n1\n2\n");
    expect_output("var i = 0; for (; i < 2; i = i + 1) print i;", "0\n1\n");
}

// =============================================================================
// Functions
// =============================================================================

#[test]
fn function_calls() {
    expect_output("fun add(a, b) { return a + b; } print add(1, 2);", "3\n");
    expect_output("fun noop() {} print noop();", "nil\n");
    expect_output("fun f() {} print f;", "<fn f>\n");
    expect_output("print clock;", "<native fn>\n");
}

#[test]
fn recursion() {
    expect_output(
        "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(10);",
        "55\n",
    );
}

#[test]
fn returned_closure_reads_argument() {
    expect_output(
        "fun mk(n) { fun inner() { return n; } return inner; } print mk(7)();",
        "7\n",
    );
}

#[test]
fn counter_closure_advances() {
    expect_output(
        "fun c() { var i = 0; fun next() { i = i + 1; return i; } return next; } \
         var n = c(); print n(); print n(); print n();",
        "1\n2\n3\n",
    );
}
