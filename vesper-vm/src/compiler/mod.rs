// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Source-to-bytecode compiler for Vesper.

pub mod codegen;
pub mod lexer;

pub use codegen::compile;
