//! Bytecode emitter: the second pass over the AST. Reads the
//! classifications `scope.rs` already computed instead of re-deriving
//! them, staying aligned with the analyzer purely by entering/leaving
//! scopes in the same order (see `scope_form`).
use std::rc::Rc;

use crate::ast::Ast;
use crate::bytecode::*;
use crate::code::CodeObject;
use crate::value::{Object, Value};
use crate::vm::Globals;

use super::result::{CompileErr, CompileErrKind};
use super::scope::{scope_form, Alloc, Scope, ScopeAnalyzer, ScopeForm};

/// A function body always reserves slot 0 for the callee itself (the
/// `Function` value being invoked), whether or not the source gave it
/// a name. A named `def`/`var` lambda aliases this slot to its own
/// name so a recursive call can read it back with `GET_LOCAL`; an
/// anonymous `lambda` still burns the slot, it just never gets a name
/// a user program could reference.
const RESERVED_SELF_SLOT: &str = " self";

const MAX_CONSTANTS: usize = 256;
const MAX_LOCALS: usize = 256;

/// Compile a top-level program (parsed but not yet wrapped in the
/// implicit `begin`) into the `main` code object, using and mutating
/// `globals` as the running program's global variable table.
pub fn compile(program: &[Ast], globals: &mut Globals) -> Result<CodeObject, CompileErr> {
    let mut items = Vec::with_capacity(program.len() + 1);
    items.push(Ast::Symbol("begin".to_owned()));
    items.extend(program.iter().cloned());
    let wrapped = Ast::List(items);
    let scopes = ScopeAnalyzer::analyze(&wrapped)?;

    let mut compiler = Compiler {
        scopes,
        scope_stack: vec![0],
        next_scope_idx: 1,
        globals,
        current: CodeObject::new("main", 0),
    };
    let body = wrapped.as_list().expect("just constructed as a List");
    compiler.compile_begin(&body[1..], true)?;
    compiler.current.emit(HALT);
    Ok(compiler.current)
}

fn is_binary_op(op: &str) -> bool {
    matches!(op, "+" | "-" | "*" | "/")
}

struct Compiler<'g> {
    scopes: Vec<Scope>,
    /// Chain of analyzer scope indices from the global scope down to
    /// whichever one is active right now; `.last()` is current.
    scope_stack: Vec<usize>,
    /// The analyzer scope index the *next* scope-introducing form
    /// (`begin`/`def`/`lambda`/named `var` lambda) will get. Scopes are
    /// assigned in the same pre-order both passes walk the tree in, so
    /// this just needs to increment in lockstep — never re-derived.
    next_scope_idx: usize,
    globals: &'g mut Globals,
    /// The code object currently being emitted into. Compiling a
    /// nested function suspends this (via `std::mem::replace`) while
    /// its own body is compiled, then restores it.
    current: CodeObject,
}

impl<'g> Compiler<'g> {
    fn current_scope(&self) -> &Scope {
        &self.scopes[*self.scope_stack.last().expect("scope_stack is never empty")]
    }

    fn alloc_of(&self, name: &str) -> Alloc {
        self.current_scope().alloc_info.get(name).copied().unwrap_or(Alloc::Global)
    }

    fn enter_scope(&mut self) -> usize {
        let idx = self.next_scope_idx;
        self.next_scope_idx += 1;
        self.scope_stack.push(idx);
        idx
    }

    fn exit_scope(&mut self) {
        self.scope_stack.pop();
    }

    fn local_slot(&self, name: &str) -> Option<u8> {
        self.current.locals.iter().rposition(|l| l.name == name).map(|i| i as u8)
    }

    fn cell_idx(&self, name: &str) -> Option<u8> {
        self.current.cell_names.iter().rposition(|n| n == name).map(|i| i as u8)
    }

    fn add_const(&mut self, value: Value) -> Result<u8, CompileErr> {
        if let Some(idx) = self.current.constants.iter().position(|c| c.const_eq(&value)) {
            return Ok(idx as u8);
        }
        if self.current.constants.len() >= MAX_CONSTANTS {
            return Err(CompileErr::new(CompileErrKind::TooManyConstants));
        }
        Ok(self.current.add_const(value))
    }

    fn emit_const(&mut self, value: Value) -> Result<(), CompileErr> {
        let idx = self.add_const(value)?;
        self.current.emit(CONST);
        self.current.emit(idx);
        Ok(())
    }

    // -- dispatch ---------------------------------------------------

    fn compile_node(&mut self, node: &Ast) -> Result<(), CompileErr> {
        match node {
            Ast::Number(n) => self.emit_const(Value::Number(*n)),
            Ast::String(s) => self.emit_const(Value::new_string(s.clone())),
            Ast::Boolean(b) => self.emit_const(Value::Boolean(*b)),
            Ast::Symbol(name) => self.compile_symbol(name),
            Ast::List(items) => self.compile_list(items),
        }
    }

    fn compile_list(&mut self, items: &[Ast]) -> Result<(), CompileErr> {
        if items.is_empty() {
            return Err(CompileErr::new(CompileErrKind::MalformedForm("()")));
        }
        match scope_form(items) {
            Some(ScopeForm::Begin) => self.compile_begin(&items[1..], false),
            Some(ScopeForm::Def { name, params, body })
            | Some(ScopeForm::NamedLambda { name, params, body }) => {
                self.compile_lambda(Some(name), params, body)?;
                self.bind(name)
            }
            Some(ScopeForm::Lambda { params, body }) => self.compile_lambda(None, params, body),
            None => match items[0].symbol_name() {
                Some("var") => self.compile_var(items),
                Some("set") => self.compile_set(items),
                Some("if") => self.compile_if(items),
                Some("while") => self.compile_while(items),
                Some(op) if is_binary_op(op) => self.compile_binary(op, items),
                Some(op) if compare_op_index(op).is_some() => self.compile_compare(op, items),
                _ => self.compile_call(items),
            },
        }
    }

    fn compile_symbol(&mut self, name: &str) -> Result<(), CompileErr> {
        match self.alloc_of(name) {
            Alloc::Local => {
                let slot = self.local_slot(name).ok_or_else(|| CompileErr::reference(name))?;
                self.current.emit(GET_LOCAL);
                self.current.emit(slot);
            }
            Alloc::Cell => {
                let idx = self.cell_idx(name).ok_or_else(|| CompileErr::reference(name))?;
                self.current.emit(GET_CELL);
                self.current.emit(idx);
            }
            Alloc::Global => {
                let idx = self.globals.index_of(name).ok_or_else(|| CompileErr::reference(name))?;
                self.current.emit(GET_GLOBAL);
                self.current.emit(idx);
            }
        }
        Ok(())
    }

    // -- begin / sequencing ------------------------------------------

    /// `is_top_level` is true only for the synthetic `begin` wrapping
    /// the whole program: it runs directly in the global scope (no
    /// scope push, no `SCOPE_EXIT`), matching `ScopeAnalyzer::analyze`.
    fn compile_begin(&mut self, body: &[Ast], is_top_level: bool) -> Result<(), CompileErr> {
        if !is_top_level {
            self.enter_scope();
            self.current.scope_level += 1;
        }
        if body.is_empty() {
            self.emit_const(Value::Boolean(false))?;
        } else {
            self.compile_sequence(body)?;
        }
        if !is_top_level {
            self.leave_block()?;
            self.exit_scope();
        }
        Ok(())
    }

    /// Compile each expression in order. Every non-last expression that
    /// isn't a declaration gets a trailing `POP` to discard its value;
    /// the last expression's value (or a declaration's, wherever it
    /// falls) is left on the stack as the sequence's result.
    fn compile_sequence(&mut self, body: &[Ast]) -> Result<(), CompileErr> {
        if body.is_empty() {
            return Err(CompileErr::new(CompileErrKind::MalformedForm("begin")));
        }
        let last = body.len() - 1;
        for (i, expr) in body.iter().enumerate() {
            self.compile_node(expr)?;
            if i != last && !expr.is_declaration() {
                self.current.emit(POP);
            }
        }
        Ok(())
    }

    /// Pop every local declared at the current block-nesting level off
    /// the compile-time locals stack and emit `SCOPE_EXIT <count>`. If
    /// this block is a function's immediate body (`scope_level == 1`
    /// of a non-`main` code object), the params and the reserved
    /// callee slot are included too.
    fn leave_block(&mut self) -> Result<(), CompileErr> {
        let level = self.current.scope_level;
        let mut count: usize = 0;
        while matches!(self.current.locals.last(), Some(l) if l.scope_level == level) {
            self.current.locals.pop();
            count += 1;
        }
        let is_function_body = self.current.name != "main" && level == 1;
        if is_function_body {
            count += self.current.arity + 1;
        }
        if count > u8::MAX as usize {
            return Err(CompileErr::new(CompileErrKind::TooManyLocals));
        }
        self.current.emit(SCOPE_EXIT);
        self.current.emit(count as u8);
        self.current.scope_level -= 1;
        Ok(())
    }

    // -- var / set -----------------------------------------------------

    fn compile_var(&mut self, items: &[Ast]) -> Result<(), CompileErr> {
        let name = items
            .get(1)
            .and_then(Ast::symbol_name)
            .ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("var")))?;
        let init = items
            .get(2)
            .ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("var")))?;
        self.compile_node(init)?;
        self.bind(name)
    }

    /// Bind `name` to whatever value is currently on top of the stack,
    /// per its classification. `Local` keeps the value where it is (it
    /// *is* the slot); `Cell`/`Global` copy it into their backing
    /// storage and discard the transient copy with `POP`.
    fn bind(&mut self, name: &str) -> Result<(), CompileErr> {
        match self.alloc_of(name) {
            Alloc::Local => {
                if self.current.locals.len() >= MAX_LOCALS {
                    return Err(CompileErr::new(CompileErrKind::TooManyLocals));
                }
                self.current.add_local(name);
            }
            Alloc::Cell => {
                if self.current.cell_names.len() >= MAX_LOCALS {
                    return Err(CompileErr::new(CompileErrKind::TooManyLocals));
                }
                let idx = self.current.cell_names.len();
                self.current.cell_names.push(name.to_owned());
                self.current.emit(SET_CELL);
                self.current.emit(idx as u8);
                self.current.emit(POP);
            }
            Alloc::Global => {
                let idx = self.globals.define(name);
                self.current.emit(SET_GLOBAL);
                self.current.emit(idx);
                self.current.emit(POP);
            }
        }
        Ok(())
    }

    fn compile_set(&mut self, items: &[Ast]) -> Result<(), CompileErr> {
        let name = items
            .get(1)
            .and_then(Ast::symbol_name)
            .ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("set")))?;
        let value = items
            .get(2)
            .ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("set")))?;
        self.compile_node(value)?;
        // Setters never pop their own result here — `SET_LOCAL`,
        // `SET_CELL` and `SET_GLOBAL` all leave the assigned value on
        // top uniformly, so `set` is usable as an expression. A `begin`
        // pops it for us if `set` shows up as a non-last statement.
        match self.alloc_of(name) {
            Alloc::Local => {
                let slot = self.local_slot(name).ok_or_else(|| CompileErr::reference(name))?;
                self.current.emit(SET_LOCAL);
                self.current.emit(slot);
            }
            Alloc::Cell => {
                let idx = self.cell_idx(name).ok_or_else(|| CompileErr::reference(name))?;
                self.current.emit(SET_CELL);
                self.current.emit(idx);
            }
            Alloc::Global => {
                let idx =
                    self.globals.index_of(name).ok_or_else(|| CompileErr::reference(name))?;
                self.current.emit(SET_GLOBAL);
                self.current.emit(idx);
            }
        }
        Ok(())
    }

    // -- if / while ------------------------------------------------

    fn compile_if(&mut self, items: &[Ast]) -> Result<(), CompileErr> {
        let test =
            items.get(1).ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("if")))?;
        let consequent =
            items.get(2).ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("if")))?;
        let alternate = items.get(3);

        self.compile_node(test)?;
        self.current.emit(JMP_IF_FALSE);
        let else_jump = self.current.emit_jump_placeholder();

        self.compile_node(consequent)?;
        self.current.emit(JMP);
        let end_jump = self.current.emit_jump_placeholder();

        let else_addr = self.current.offset();
        self.current.patch_jump(else_jump, else_addr as u16);
        match alternate {
            Some(alt) => self.compile_node(alt)?,
            // No alternate: an `if` is an expression, so the missing
            // branch still needs to produce something.
            None => self.emit_const(Value::Boolean(false))?,
        }

        let end_addr = self.current.offset();
        self.current.patch_jump(end_jump, end_addr as u16);
        Ok(())
    }

    fn compile_while(&mut self, items: &[Ast]) -> Result<(), CompileErr> {
        let test = items
            .get(1)
            .ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("while")))?;
        let body = items
            .get(2)
            .ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("while")))?;

        let loop_start = self.current.offset();
        self.compile_node(test)?;
        self.current.emit(JMP_IF_FALSE);
        let exit_jump = self.current.emit_jump_placeholder();

        self.compile_node(body)?;
        // Every compiled expression leaves exactly one value on the
        // stack; without this POP that value would accumulate on every
        // iteration instead of being discarded between them.
        self.current.emit(POP);
        self.current.emit(JMP);
        let back_jump = self.current.emit_jump_placeholder();
        self.current.patch_jump(back_jump, loop_start as u16);

        let exit_addr = self.current.offset();
        self.current.patch_jump(exit_jump, exit_addr as u16);
        // `while` is an expression like any other; its value once the
        // loop is done is simply false.
        self.emit_const(Value::Boolean(false))?;
        Ok(())
    }

    // -- arithmetic / comparison / call ------------------------------

    fn compile_binary(&mut self, op: &str, items: &[Ast]) -> Result<(), CompileErr> {
        let lhs = items
            .get(1)
            .ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("binary operator")))?;
        let rhs = items
            .get(2)
            .ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("binary operator")))?;
        self.compile_node(lhs)?;
        self.compile_node(rhs)?;
        let opcode = match op {
            "+" => ADD,
            "-" => SUB,
            "*" => MUL,
            "/" => DIV,
            _ => unreachable!("caller already filtered to the four arithmetic operators"),
        };
        self.current.emit(opcode);
        Ok(())
    }

    fn compile_compare(&mut self, op: &str, items: &[Ast]) -> Result<(), CompileErr> {
        let lhs = items
            .get(1)
            .ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("comparison")))?;
        let rhs = items
            .get(2)
            .ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("comparison")))?;
        self.compile_node(lhs)?;
        self.compile_node(rhs)?;
        let idx = compare_op_index(op).expect("caller already verified this is a comparison op");
        self.current.emit(COMPARE);
        self.current.emit(idx);
        Ok(())
    }

    fn compile_call(&mut self, items: &[Ast]) -> Result<(), CompileErr> {
        self.compile_node(&items[0])?;
        for arg in &items[1..] {
            self.compile_node(arg)?;
        }
        let argc = items.len() - 1;
        if argc > u8::MAX as usize {
            return Err(CompileErr::new(CompileErrKind::MalformedForm("call")));
        }
        self.current.emit(CALL);
        self.current.emit(argc as u8);
        Ok(())
    }

    // -- functions ----------------------------------------------------

    /// Compile a `lambda`/`def`/named-`var`-lambda into a fresh code
    /// object, then emit the `LOAD_CELL`s and `CONST` + `MAKE_FUNCTION`
    /// pair in the *caller's* code object that turns it into a runtime
    /// `Function` value left on top of the stack. Binding the result to
    /// `self_name` (for `def`/named `var`) is the caller's job.
    fn compile_lambda(
        &mut self,
        self_name: Option<&str>,
        params: &[Ast],
        body: &[Ast],
    ) -> Result<(), CompileErr> {
        let func_idx = self.enter_scope();
        let arity = params.len();
        let code_name = self_name.unwrap_or("lambda").to_owned();
        let outer = std::mem::replace(&mut self.current, CodeObject::new(code_name, arity));

        let free_names: Vec<String> = self.scopes[func_idx].free.iter().cloned().collect();
        let owned_names: Vec<String> = self.scopes[func_idx].cells.iter().cloned().collect();
        self.current.free_count = free_names.len();
        self.current.cell_names = free_names.iter().cloned().chain(owned_names).collect();

        self.current.add_local(self_name.unwrap_or(RESERVED_SELF_SLOT));
        for param in params {
            let pname = param
                .symbol_name()
                .ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("lambda")))?;
            let slot = self.current.add_local(pname);
            if self.scopes[func_idx].alloc_info.get(pname) == Some(&Alloc::Cell) {
                let cell_idx = self
                    .current
                    .cell_names
                    .iter()
                    .position(|n| n == pname)
                    .expect("a captured param is seeded into cell_names above") as u8;
                self.current.emit(GET_LOCAL);
                self.current.emit(slot);
                self.current.emit(SET_CELL);
                self.current.emit(cell_idx);
                self.current.emit(POP);
            }
        }

        let body_is_begin = body.len() == 1
            && matches!(
                &body[0],
                Ast::List(items) if items.first().and_then(Ast::symbol_name) == Some("begin")
            );
        if body_is_begin {
            let items = body[0].as_list().expect("checked above");
            self.compile_begin(&items[1..], false)?;
        } else {
            self.compile_sequence(body)?;
            let total = arity + 1;
            if total > u8::MAX as usize {
                return Err(CompileErr::new(CompileErrKind::TooManyLocals));
            }
            self.current.emit(SCOPE_EXIT);
            self.current.emit(total as u8);
        }
        self.current.emit(RETURN);

        let finished = std::mem::replace(&mut self.current, outer);
        self.exit_scope();
        let free_count = finished.free_count;

        for free_name in &free_names {
            let idx = self
                .current
                .cell_names
                .iter()
                .position(|n| n == free_name)
                .ok_or_else(|| CompileErr::reference(free_name.clone()))?;
            self.current.emit(LOAD_CELL);
            self.current.emit(idx as u8);
        }
        let code_idx = self.add_const(Value::Object(Object::Code(Rc::new(finished))))?;
        self.current.emit(CONST);
        self.current.emit(code_idx);
        self.current.emit(MAKE_FUNCTION);
        self.current.emit(free_count as u8);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_optimistic;
    use crate::vm::VM;

    fn run(text: &str) -> Value {
        let program = parse_optimistic(text);
        let mut globals = Globals::new();
        crate::native::install_defaults(&mut globals);
        let code = compile(&program, &mut globals).unwrap_or_else(|err| {
            panic!("compile failed: {err}");
        });
        let mut vm = VM::new(globals);
        vm.exec(code).unwrap_or_else(|err| panic!("exec failed: {err}"))
    }

    fn run_number(text: &str) -> f64 {
        run(text).as_number().expect("expected a number result")
    }

    fn run_boolean(text: &str) -> bool {
        run(text).as_boolean().expect("expected a boolean result")
    }

    #[test]
    fn arithmetic() {
        assert_eq!(run_number("(+ 2 (* 3 4))"), 14.0);
        assert_eq!(run_number("(/ 10 4)"), 2.5);
    }

    #[test]
    fn global_var_and_set() {
        assert_eq!(run_number("(var x 10) (set x (+ x 5)) x"), 15.0);
    }

    #[test]
    fn if_without_alternate() {
        assert_eq!(run_boolean("(if (== 1 2) true)"), false);
    }

    #[test]
    fn while_loop_accumulates_in_locals() {
        assert_eq!(
            run_number(
                "(var i 0) (var count 0) \
                 (while (< i 10) (begin (set i (+ i 1)) (set count (+ count 1)))) \
                 count"
            ),
            10.0
        );
    }

    #[test]
    fn recursive_function() {
        assert_eq!(
            run_number(
                "(def factorial (x) (if (== x 1) 1 (* x (factorial (- x 1))))) (factorial 5)"
            ),
            120.0
        );
    }

    #[test]
    fn closure_over_block_owned_variable() {
        assert_eq!(
            run_number(
                "(var x 10) \
                 (def foo () x) \
                 (begin \
                   (var y 100) (var q 7) q (+ y x) \
                   (begin \
                     (var z 200) z \
                     (def bar () (+ y z)) \
                     (bar)))"
            ),
            300.0
        );
    }

    #[test]
    fn captured_parameter() {
        assert_eq!(
            run_number(
                "(def make_adder (n) (lambda (x) (+ x n))) \
                 (var add5 (make_adder 5)) \
                 (add5 10)"
            ),
            15.0
        );
    }

    #[test]
    fn native_functions() {
        assert_eq!(run_number("(native-square 6)"), 36.0);
        assert_eq!(run_number("(native-sum 3 4)"), 7.0);
        assert_eq!(run_number("y"), 20.0);
    }
}
