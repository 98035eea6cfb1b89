//! Opcode byte values and operand layout.
//!
//! One byte per opcode; jump addresses are inline big-endian `u16`s,
//! everything else is an inline `u8` index. Byte values match the
//! reference implementation this language is drawn from.

#![allow(non_upper_case_globals)]

pub const HALT: u8 = 0x00;
pub const CONST: u8 = 0x01;
pub const ADD: u8 = 0x02;
pub const SUB: u8 = 0x03;
pub const MUL: u8 = 0x04;
pub const DIV: u8 = 0x05;
pub const COMPARE: u8 = 0x06;
pub const JMP_IF_FALSE: u8 = 0x07;
pub const JMP: u8 = 0x08;
pub const GET_GLOBAL: u8 = 0x09;
pub const SET_GLOBAL: u8 = 0x10;
pub const POP: u8 = 0x11;
pub const GET_LOCAL: u8 = 0x12;
pub const SET_LOCAL: u8 = 0x13;
pub const SCOPE_EXIT: u8 = 0x14;
pub const CALL: u8 = 0x15;
pub const RETURN: u8 = 0x16;
pub const GET_CELL: u8 = 0x17;
pub const SET_CELL: u8 = 0x18;
pub const LOAD_CELL: u8 = 0x19;
pub const MAKE_FUNCTION: u8 = 0x20;

/// Returns the mnemonic for `op`, or `None` for an opcode this VM
/// doesn't know (a fatal "unknown opcode" error at runtime).
pub fn mnemonic(op: u8) -> Option<&'static str> {
    Some(match op {
        HALT => "HALT",
        CONST => "CONST",
        ADD => "ADD",
        SUB => "SUB",
        MUL => "MUL",
        DIV => "DIV",
        COMPARE => "COMPARE",
        JMP_IF_FALSE => "JMP_IF_FALSE",
        JMP => "JMP",
        GET_GLOBAL => "GET_GLOBAL",
        SET_GLOBAL => "SET_GLOBAL",
        POP => "POP",
        GET_LOCAL => "GET_LOCAL",
        SET_LOCAL => "SET_LOCAL",
        SCOPE_EXIT => "SCOPE_EXIT",
        CALL => "CALL",
        RETURN => "RETURN",
        GET_CELL => "GET_CELL",
        SET_CELL => "SET_CELL",
        LOAD_CELL => "LOAD_CELL",
        MAKE_FUNCTION => "MAKE_FUNCTION",
        _ => return None,
    })
}

/// The six comparison operators, in the opcode order `COMPARE`'s
/// operand byte indexes into.
pub const COMPARE_OPS: [&str; 6] = ["<", ">", "==", ">=", "<=", "!="];

pub fn compare_op_index(op: &str) -> Option<u8> {
    COMPARE_OPS.iter().position(|&o| o == op).map(|i| i as u8)
}

pub fn compare_op_symbol(index: u8) -> &'static str {
    COMPARE_OPS.get(index as usize).copied().unwrap_or("?")
}
