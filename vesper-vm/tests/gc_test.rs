// vesper-vm - Garbage collector tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Collector behavior: interning canonicality, stress-mode output
//! stability, and reclamation of unreachable objects.

mod common;

use common::{run, run_stressed, vm_with_capture};
use vesper_vm::object::ObjKind;
use vesper_vm::Vm;

// =============================================================================
// Interning
// =============================================================================

#[test]
fn double_intern_is_pointer_identical() {
    let mut vm = Vm::new();
    let first = vm.intern("canonical");
    let second = vm.intern("canonical");
    assert_eq!(first, second);
    assert_ne!(vm.intern("other"), first);
}

#[test]
fn interning_survives_collection() {
    let mut vm = Vm::new();
    let kept = vm.intern("kept");
    // `kept` is unreachable from any root, so a collection frees it; the
    // intern table must not resurrect the dead entry afterwards.
    vm.collect_garbage();
    let again = vm.intern("kept");
    let _ = (kept, again);

    // A rooted string keeps its identity across collections.
    let mut vm = Vm::new();
    vm.interpret("var s = \"anchor\";").unwrap();
    let before = vm.intern("anchor");
    vm.collect_garbage();
    let after = vm.intern("anchor");
    assert_eq!(before, after);
}

#[test]
fn no_duplicate_live_strings_after_collection() {
    let (mut vm, _output) = vm_with_capture();
    vm.interpret(
        "var words = [\"a\", \"b\"]; \
         var joined = \"\"; \
         for (var i = 0; i < 30; i = i + 1) { joined = joined + \"ab\"; } \
         var again = \"a\" + \"b\";",
    )
    .unwrap();
    vm.collect_garbage();

    let mut contents: Vec<String> = Vec::new();
    for obj in vm.heap().live_objects() {
        if let ObjKind::Str(s) = &vm.heap().get(obj).kind {
            contents.push(s.chars.to_string());
        }
    }
    let mut deduped = contents.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(contents.len(), deduped.len(), "every live string is unique");
}

// =============================================================================
// Reclamation
// =============================================================================

#[test]
fn collection_reclaims_unreachable_objects() {
    let (mut vm, _output) = vm_with_capture();
    vm.interpret(
        "var keep = [1, 2, 3]; \
         for (var i = 0; i < 100; i = i + 1) { var garbage = [i, [i], \"gone\" + \"\"]; }",
    )
    .unwrap();

    let before = vm.heap().live_objects().count();
    vm.collect_garbage();
    let after = vm.heap().live_objects().count();
    assert!(after <= before);

    // The rooted list survived.
    let (mut vm2, output) = vm_with_capture();
    vm2.interpret("var keep = [1, 2, 3];").unwrap();
    vm2.collect_garbage();
    vm2.interpret("print keep;").unwrap();
    assert_eq!(output.contents(), "[1, 2, 3]\n");
}

#[test]
fn bytes_allocated_drops_after_collection() {
    let (mut vm, _output) = vm_with_capture();
    vm.interpret(
        "for (var i = 0; i < 200; i = i + 1) { var garbage = [1, 2, 3, 4, 5, 6, 7, 8]; }",
    )
    .unwrap();
    let before = vm.heap().bytes_allocated();
    vm.collect_garbage();
    assert!(vm.heap().bytes_allocated() < before);
}

// =============================================================================
// Stress mode: collecting on every allocation must not change output
// =============================================================================

#[test]
fn stress_mode_preserves_scenario_outputs() {
    let scenarios: &[(&str, &str)] = &[
        ("print 1 + 2;", "3\n"),
        ("var a = \"he\"; var b = \"llo\"; print a + b;", "hello\n"),
        (
            "fun mk(n) { fun inner() { return n; } return inner; } print mk(7)();",
            "7\n",
        ),
        (
            "class A { greet() { print \"hi\"; } } class B < A {} B().greet();",
            "hi\n",
        ),
        (
            "var xs = [10, 20, 30]; append(xs, 40); delete(xs, 0); print xs[1]; print length(xs);",
            "30\n3\n",
        ),
        (
            "fun c() { var i = 0; fun next() { i = i + 1; return i; } return next; } \
             var n = c(); print n(); print n(); print n();",
            "1\n2\n3\n",
        ),
    ];

    for (source, expected) in scenarios {
        let plain = run(source).expect("plain run succeeds");
        let stressed = run_stressed(source).expect("stressed run succeeds");
        assert_eq!(&plain, expected, "plain: {source}");
        assert_eq!(plain, stressed, "stress changed output: {source}");
    }
}

#[test]
fn stress_mode_handles_classes_closures_and_lists_together() {
    let source = "\
        class Node { init(value) { this.value = value; this.next = nil; } } \
        fun push(list, value) { \
          var node = Node(value); \
          node.next = list; \
          return node; \
        } \
        var head = nil; \
        for (var i = 0; i < 10; i = i + 1) { head = push(head, i); } \
        var sum = 0; \
        var cursor = head; \
        while (cursor != nil) { sum = sum + cursor.value; cursor = cursor.next; } \
        print sum; \
        var squares = []; \
        for (var i = 0; i < 5; i = i + 1) { append(squares, i * i); } \
        print squares; \
        fun adder(n) { fun add(m) { return n + m; } return add; } \
        print adder(2)(3);";
    let expected = "45\n[0, 1, 4, 9, 16]\n5\n";

    assert_eq!(run(source).unwrap(), expected);
    assert_eq!(run_stressed(source).unwrap(), expected);
}

#[test]
fn stress_mode_string_building() {
    let source = "\
        var s = \"\"; \
        for (var i = 0; i < 40; i = i + 1) { s = s + \"x\"; } \
        print s == \"\" + \"xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx\"; \
        print length([s]);";
    let expected = "true\n1\n";
    assert_eq!(run(source).unwrap(), expected);
    assert_eq!(run_stressed(source).unwrap(), expected);
}
