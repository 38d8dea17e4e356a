// vesper-vm - List and native-function tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Lists: literals, indexing, and the list natives.

mod common;

use common::expect_output;

#[test]
fn literals_print() {
    expect_output("print [];", "[]\n");
    expect_output("print [10, 20, 30];", "[10, 20, 30]\n");
    expect_output("print [1, \"two\", nil, true];", "[1, two, nil, true]\n");
    expect_output("print [[1], [2]];", "[[1], [2]]\n");
}

#[test]
fn index_read_write() {
    expect_output("var xs = [10, 20, 30]; print xs[0]; print xs[2];", "10\n30\n");
    expect_output("var xs = [10, 20, 30]; xs[1] = 99; print xs[1];", "99\n");
    // Assignment expression yields the stored value.
    expect_output("var xs = [0]; print xs[0] = 5;", "5\n");
}

#[test]
fn index_truncates_doubles() {
    expect_output("var xs = [10, 20, 30]; print xs[1.9];", "20\n");
    expect_output("var xs = [10, 20, 30]; print xs[0.5];", "10\n");
}

#[test]
fn lists_are_truthy_and_compare_by_identity() {
    expect_output("if ([]) print \"truthy\";", "truthy\n");
    expect_output("var xs = [1]; var ys = xs; print xs == ys;", "true\n");
    expect_output("print [1] == [1];", "false\n");
}

#[test]
fn elements_are_expressions() {
    expect_output("var n = 2; print [n, n * 2, n == 2];", "[2, 4, true]\n");
}

// =============================================================================
// Natives
// =============================================================================

#[test]
fn length_counts_elements() {
    expect_output("print length([]);", "0\n");
    expect_output("print length([1, 2, 3]);", "3\n");
}

#[test]
fn append_grows_and_returns_nil() {
    expect_output("var xs = []; append(xs, 1); append(xs, 2); print xs;", "[1, 2]\n");
    expect_output("var xs = []; print append(xs, 1);", "nil\n");
}

#[test]
fn delete_shifts_tail_left() {
    expect_output("var xs = [1, 2, 3]; delete(xs, 0); print xs;", "[2, 3]\n");
    expect_output("var xs = [1, 2, 3]; delete(xs, 2); print xs;", "[1, 2]\n");
    expect_output("var xs = [1, 2, 3]; delete(xs, 1); print length(xs);", "2\n");
}

#[test]
fn append_then_delete_scenario() {
    expect_output(
        "var xs = [10, 20, 30]; append(xs, 40); delete(xs, 0); print xs[1]; print length(xs);",
        "30\n3\n",
    );
}

#[test]
fn clock_returns_number() {
    expect_output("print clock() >= 0;", "true\n");
    expect_output("var before = clock(); var after = clock(); print before <= after;", "true\n");
}

#[test]
fn lists_grow_past_initial_capacity() {
    expect_output(
        "var xs = []; for (var i = 0; i < 20; i = i + 1) append(xs, i); \
         print length(xs); print xs[19];",
        "20\n19\n",
    );
}
