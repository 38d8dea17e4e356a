// vesper-vm - Class and method dispatch tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Classes: fields, methods, initializers, inheritance, super dispatch.

mod common;

use common::expect_output;

#[test]
fn classes_and_instances_print() {
    expect_output("class Brew {} print Brew;", "Brew\n");
    expect_output("class Brew {} print Brew();", "<instance of Brew>\n");
}

#[test]
fn fields_read_write() {
    expect_output(
        "class Box {} var b = Box(); b.value = 3; print b.value;",
        "3\n",
    );
    // Assignment leaves the value as the expression result.
    expect_output("class Box {} var b = Box(); print b.value = 7;", "7\n");
    expect_output(
        "class Box {} var b = Box(); b.value = 1; b.value = b.value + 1; print b.value;",
        "2\n",
    );
}

#[test]
fn methods_and_this() {
    expect_output(
        "class Greeter { greet() { print \"hi\"; } } Greeter().greet();",
        "hi\n",
    );
    expect_output(
        "class Counter { bump() { this.n = this.n + 1; return this.n; } } \
         var c = Counter(); c.n = 0; print c.bump(); print c.bump();",
        "1\n2\n",
    );
}

#[test]
fn initializer_runs_and_returns_instance() {
    expect_output(
        "class Point { init(x, y) { this.x = x; this.y = y; } } \
         var p = Point(1, 2); print p.x + p.y;",
        "3\n",
    );
    expect_output(
        "class Point { init(x, y) { this.x = x; this.y = y; } } print Point(1, 2);",
        "<instance of Point>\n",
    );
    // An explicit bare return in init still yields the instance.
    expect_output(
        "class Early { init() { this.done = true; return; this.done = false; } } \
         print Early().done;",
        "true\n",
    );
}

#[test]
fn bound_methods_are_values() {
    expect_output(
        "class Speaker { say() { print this.word; } } \
         var s = Speaker(); s.word = \"bound\"; var m = s.say; m();",
        "bound\n",
    );
    expect_output(
        "class Speaker { say() {} } var s = Speaker(); print s.say;",
        "<fn say>\n",
    );
}

#[test]
fn callable_fields_shadow_methods() {
    expect_output(
        "fun shout() { print \"field\"; } \
         class Holder { shout() { print \"method\"; } } \
         var h = Holder(); h.shout = shout; h.shout();",
        "field\n",
    );
}

// =============================================================================
// Inheritance
// =============================================================================

#[test]
fn inherited_method_reachable_from_subclass() {
    expect_output(
        "class A { greet() { print \"hi\"; } } class B < A {} B().greet();",
        "hi\n",
    );
}

#[test]
fn subclass_override_wins() {
    expect_output(
        "class A { id() { return \"A\"; } } \
         class B < A { id() { return \"B\"; } } \
         print B().id(); print A().id();",
        "B\nA\n",
    );
}

#[test]
fn super_calls_superclass_method() {
    expect_output(
        "class A { m() { return \"A\"; } } \
         class B < A { m() { return \"B \" + super.m(); } } \
         print B().m();",
        "B A\n",
    );
}

#[test]
fn super_method_as_value() {
    expect_output(
        "class A { m() { return \"from A\"; } } \
         class B < A { grab() { var m = super.m; return m(); } } \
         print B().grab();",
        "from A\n",
    );
}

#[test]
fn inherited_initializer() {
    expect_output(
        "class A { init(v) { this.v = v; } } \
         class B < A {} \
         print B(9).v;",
        "9\n",
    );
}

#[test]
fn grandparent_methods_flow_down() {
    expect_output(
        "class A { m() { return 1; } } \
         class B < A {} \
         class C < B {} \
         print C().m();",
        "1\n",
    );
}
