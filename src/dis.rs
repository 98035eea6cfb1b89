//! Bytecode disassembler: renders a `CodeObject`'s instructions (and,
//! recursively, every nested function it carries as a constant) in the
//! debug text format described in the spec's External Interfaces
//! section.
use crate::bytecode::{self, *};
use crate::code::CodeObject;
use crate::value::{Object, Value};

/// Print a `CodeObject`'s disassembly, then recurse into every nested
/// function found among its constants.
pub fn dis(code: &CodeObject) {
    println!("----- Disassembly: {} -----", code.name);
    let mut ip = 0;
    while ip < code.code.len() {
        let (line, next_ip) = format_inst(code, ip);
        println!("{line}");
        ip = next_ip;
    }
    for constant in &code.constants {
        if let Value::Object(Object::Code(nested)) = constant {
            println!();
            dis(nested);
        }
    }
}

/// Format the instruction starting at `ip`, returning the rendered
/// line and the offset of the following instruction.
fn format_inst(code: &CodeObject, ip: usize) -> (String, usize) {
    let op = code.code[ip];
    let mnemonic = bytecode::mnemonic(op).unwrap_or("UNKNOWN");

    // (bytes making up the operand, operands column text, decoded
    // annotation, offset of the following instruction)
    let (operand_bytes, operands, decoded, next_ip): (Vec<u8>, String, String, usize) = match op {
        CONST => {
            let idx = code.code[ip + 1];
            let decoded = code.constants.get(idx as usize).map(|v| format!(" ({v})"));
            (vec![idx], idx.to_string(), decoded.unwrap_or_default(), ip + 2)
        }
        GET_GLOBAL | SET_GLOBAL => {
            let idx = code.code[ip + 1];
            (vec![idx], idx.to_string(), String::new(), ip + 2)
        }
        GET_LOCAL | SET_LOCAL => {
            let slot = code.code[ip + 1];
            let decoded = code.locals.get(slot as usize).map(|l| format!(" ({})", l.name));
            (vec![slot], slot.to_string(), decoded.unwrap_or_default(), ip + 2)
        }
        GET_CELL | SET_CELL | LOAD_CELL => {
            let idx = code.code[ip + 1];
            let decoded = code.cell_names.get(idx as usize).map(|n| format!(" ({n})"));
            (vec![idx], idx.to_string(), decoded.unwrap_or_default(), ip + 2)
        }
        COMPARE => {
            let idx = code.code[ip + 1];
            let decoded = format!(" ({})", bytecode::compare_op_symbol(idx));
            (vec![idx], idx.to_string(), decoded, ip + 2)
        }
        SCOPE_EXIT | CALL | MAKE_FUNCTION => {
            let n = code.code[ip + 1];
            (vec![n], n.to_string(), String::new(), ip + 2)
        }
        JMP | JMP_IF_FALSE => {
            let hi = code.code[ip + 1];
            let lo = code.code[ip + 2];
            let addr = u16::from_be_bytes([hi, lo]);
            (vec![hi, lo], format!("{addr:04x}"), String::new(), ip + 3)
        }
        _ => (vec![], String::new(), String::new(), ip + 1),
    };

    let hex: String =
        std::iter::once(op).chain(operand_bytes).map(|b| format!("{b:02x} ")).collect();
    let line = format!("{ip:04x} {hex:<12}{mnemonic:<14}{operands}{decoded}");
    (line, next_ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::parser::parse_optimistic;
    use crate::vm::Globals;

    #[test]
    fn disassembles_without_panicking() {
        let program = parse_optimistic("(def square (x) (* x x)) (square 3)");
        let mut globals = Globals::new();
        let code = compile(&program, &mut globals).expect("compile failed");
        dis(&code);
    }

    #[test]
    fn header_names_the_function() {
        let program = parse_optimistic("(+ 1 2)");
        let mut globals = Globals::new();
        let code = compile(&program, &mut globals).expect("compile failed");
        let (line, _) = format_inst(&code, 0);
        assert!(line.starts_with("0000"));
        assert_eq!(code.name, "main");
    }
}
