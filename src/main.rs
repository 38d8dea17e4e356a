// vesper - A dynamically typed, class-based scripting language written in Rust
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process;

use vesper_vm::{InterpretError, Vm};

const COMPILE_ERROR_EXIT: i32 = 65;
const RUNTIME_ERROR_EXIT: i32 = 70;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Handle --version flag
    if args.len() == 2 && (args[1] == "--version" || args[1] == "-v") {
        println!("Vesper v0.1.0");
        return;
    }

    let mut vm = Vm::new();

    // If files provided, run them; otherwise start REPL
    if args.len() > 1 {
        run_files(&args[1..], &mut vm);
    } else {
        run_repl(&mut vm);
    }
}

/// Run a sequence of source files, stopping at the first failure
fn run_files(files: &[String], vm: &mut Vm) {
    for file_path in files {
        if let Err(code) = run_file(file_path, vm) {
            process::exit(code);
        }
    }
}

/// Run a single source file
fn run_file(file_path: &str, vm: &mut Vm) -> Result<(), i32> {
    let path = Path::new(file_path);

    // Validate file extension
    match path.extension().and_then(|e| e.to_str()) {
        Some("vsp") => {}
        Some(ext) => {
            eprintln!(
                "Error: unsupported file extension '.{}' for '{}'",
                ext, file_path
            );
            return Err(COMPILE_ERROR_EXIT);
        }
        None => {
            eprintln!(
                "Error: file '{}' has no extension (expected .vsp)",
                file_path
            );
            return Err(COMPILE_ERROR_EXIT);
        }
    }

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading '{}': {}", file_path, e);
            return Err(COMPILE_ERROR_EXIT);
        }
    };

    match vm.interpret(&source) {
        Ok(()) => Ok(()),
        Err(InterpretError::Compile) => Err(COMPILE_ERROR_EXIT),
        Err(InterpretError::Runtime(_)) => Err(RUNTIME_ERROR_EXIT),
    }
}

/// Run the interactive REPL
fn run_repl(vm: &mut Vm) {
    println!("Vesper v0.1.0");

    loop {
        print!("vesper> ");
        io::stdout().flush().unwrap();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                // Errors are already reported on stderr; keep the session.
                let _ = vm.interpret(input);
            }
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        }
    }
}
