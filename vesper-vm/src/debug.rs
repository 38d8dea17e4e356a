// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Chunk disassembler, used by the `trace` feature and by tests.

use crate::chunk::Chunk;
use crate::heap::Heap;
use crate::opcode::Op;

/// Disassemble a whole chunk under a header, returning the listing.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, name: &str) -> String {
    let mut listing = format!("== {} ==\n", name);
    let mut offset = 0;
    while offset < chunk.code.len() {
        let (text, next) = instruction_at(heap, chunk, offset);
        listing.push_str(&text);
        listing.push('\n');
        offset = next;
    }
    listing
}

/// Print the instruction at `offset` and return the next offset.
pub fn disassemble_instruction(heap: &Heap, chunk: &Chunk, offset: usize) -> usize {
    let (text, next) = instruction_at(heap, chunk, offset);
    println!("{text}");
    next
}

fn instruction_at(heap: &Heap, chunk: &Chunk, offset: usize) -> (String, usize) {
    let mut text = format!("{:04} ", offset);
    if offset > 0 && chunk.line(offset) == chunk.line(offset - 1) {
        text.push_str("   | ");
    } else {
        text.push_str(&format!("{:4} ", chunk.line(offset)));
    }

    let Some(op) = Op::from_byte(chunk.code[offset]) else {
        text.push_str(&format!("unknown opcode {}", chunk.code[offset]));
        return (text, offset + 1);
    };

    let next = match op {
        Op::Constant
        | Op::GetGlobal
        | Op::DefineGlobal
        | Op::SetGlobal
        | Op::GetProperty
        | Op::SetProperty
        | Op::GetSuper
        | Op::Class
        | Op::Method => {
            let index = chunk.code[offset + 1];
            let value = chunk.constants[index as usize];
            text.push_str(&format!(
                "{:<16} {:4} '{}'",
                op_name(op),
                index,
                heap.display(value)
            ));
            offset + 2
        }
        Op::GetLocal | Op::SetLocal | Op::GetUpvalue | Op::SetUpvalue | Op::Call
        | Op::ListInit => {
            let operand = chunk.code[offset + 1];
            text.push_str(&format!("{:<16} {:4}", op_name(op), operand));
            offset + 2
        }
        Op::Invoke | Op::SuperInvoke => {
            let index = chunk.code[offset + 1];
            let argc = chunk.code[offset + 2];
            let value = chunk.constants[index as usize];
            text.push_str(&format!(
                "{:<16} ({} args) {:4} '{}'",
                op_name(op),
                argc,
                index,
                heap.display(value)
            ));
            offset + 3
        }
        Op::Jump | Op::JumpIfFalse | Op::Loop => {
            let operand =
                u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]) as usize;
            let target = if op == Op::Loop {
                offset + 3 - operand
            } else {
                offset + 3 + operand
            };
            text.push_str(&format!("{:<16} {:4} -> {}", op_name(op), offset, target));
            offset + 3
        }
        Op::Closure => {
            let index = chunk.code[offset + 1];
            let value = chunk.constants[index as usize];
            text.push_str(&format!(
                "{:<16} {:4} '{}'",
                op_name(op),
                index,
                heap.display(value)
            ));
            let function = value.as_obj().expect("closure operand is a function");
            let upvalue_count = heap.as_function(function).upvalue_count;
            let mut cursor = offset + 2;
            for _ in 0..upvalue_count {
                let is_local = chunk.code[cursor];
                let slot = chunk.code[cursor + 1];
                text.push_str(&format!(
                    "\n{:04}    |                     {} {}",
                    cursor,
                    if is_local == 1 { "local" } else { "upvalue" },
                    slot
                ));
                cursor += 2;
            }
            cursor
        }
        _ => {
            text.push_str(op_name(op));
            offset + 1
        }
    };

    (text, next)
}

fn op_name(op: Op) -> &'static str {
    match op {
        Op::Constant => "OP_CONSTANT",
        Op::Nil => "OP_NIL",
        Op::True => "OP_TRUE",
        Op::False => "OP_FALSE",
        Op::Pop => "OP_POP",
        Op::GetLocal => "OP_GET_LOCAL",
        Op::SetLocal => "OP_SET_LOCAL",
        Op::GetGlobal => "OP_GET_GLOBAL",
        Op::DefineGlobal => "OP_DEFINE_GLOBAL",
        Op::SetGlobal => "OP_SET_GLOBAL",
        Op::GetUpvalue => "OP_GET_UPVALUE",
        Op::SetUpvalue => "OP_SET_UPVALUE",
        Op::GetProperty => "OP_GET_PROPERTY",
        Op::SetProperty => "OP_SET_PROPERTY",
        Op::GetSuper => "OP_GET_SUPER",
        Op::Equal => "OP_EQUAL",
        Op::Greater => "OP_GREATER",
        Op::Less => "OP_LESS",
        Op::Add => "OP_ADD",
        Op::Subtract => "OP_SUBTRACT",
        Op::Multiply => "OP_MULTIPLY",
        Op::Divide => "OP_DIVIDE",
        Op::Not => "OP_NOT",
        Op::Negate => "OP_NEGATE",
        Op::Print => "OP_PRINT",
        Op::Println => "OP_PRINTLN",
        Op::Jump => "OP_JUMP",
        Op::JumpIfFalse => "OP_JUMP_IF_FALSE",
        Op::Loop => "OP_LOOP",
        Op::Call => "OP_CALL",
        Op::Invoke => "OP_INVOKE",
        Op::SuperInvoke => "OP_SUPER_INVOKE",
        Op::Closure => "OP_CLOSURE",
        Op::CloseUpvalue => "OP_CLOSE_UPVALUE",
        Op::ListInit => "OP_LIST_INIT",
        Op::ListGetIdx => "OP_LIST_GETIDX",
        Op::ListSetIdx => "OP_LIST_SETIDX",
        Op::Return => "OP_RETURN",
        Op::Class => "OP_CLASS",
        Op::Inherit => "OP_INHERIT",
        Op::Method => "OP_METHOD",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Op;
    use crate::value::Value;

    #[test]
    fn lists_simple_chunk() {
        let heap = Heap::new();
        let mut chunk = Chunk::new();
        let index = chunk.add_constant(Value::Number(1.5)).unwrap();
        chunk.write_op(Op::Constant, 1);
        chunk.write(index, 1);
        chunk.write_op(Op::Negate, 1);
        chunk.write_op(Op::Return, 2);

        let listing = disassemble_chunk(&heap, &chunk, "test");
        assert!(listing.starts_with("== test ==\n"));
        assert!(listing.contains("OP_CONSTANT"));
        assert!(listing.contains("'1.5'"));
        assert!(listing.contains("OP_NEGATE"));
        assert!(listing.contains("OP_RETURN"));
    }
}
