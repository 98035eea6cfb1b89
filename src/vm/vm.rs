//! The stack machine that runs compiled code objects.
use std::rc::Rc;

use crate::bytecode::{self, *};
use crate::code::CodeObject;
use crate::value::{Function, Object, Value};

use super::frame::Frame;
use super::globals::Globals;
use super::result::{RuntimeErr, RuntimeErrKind};

/// Maximum number of values live on the stack at once.
pub const STACK_LIMIT: usize = 512;
/// Maximum call-stack depth, overridable per `VM` (and, at the CLI
/// level, via `-x`/`--max-call-depth` or `EVA_MAX_CALL_DEPTH`).
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

pub struct VM {
    pub globals: Globals,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    max_call_depth: usize,
}

impl Default for VM {
    fn default() -> Self {
        Self::new(Globals::new())
    }
}

impl VM {
    pub fn new(globals: Globals) -> Self {
        Self::with_max_call_depth(globals, DEFAULT_MAX_CALL_DEPTH)
    }

    pub fn with_max_call_depth(globals: Globals, max_call_depth: usize) -> Self {
        Self { globals, stack: Vec::with_capacity(STACK_LIMIT), frames: vec![], max_call_depth }
    }

    /// Run a freshly compiled top-level code object to completion,
    /// returning the value of its last expression. Resets the value
    /// and call stacks first, so a VM can be reused across repeated
    /// top-level `exec` calls (as the REPL does) even after a prior
    /// call errored out mid-execution.
    pub fn exec(&mut self, code: CodeObject) -> Result<Value, RuntimeErr> {
        self.stack.clear();
        self.frames.clear();
        // `main` is never built via `MAKE_FUNCTION`, so nothing else
        // allocates the cells it owns (top-level `begin` locals
        // captured by a nested closure, e.g. spec scenario 7). Its
        // `free_count` is always 0, so every entry here is owned.
        let cells = (0..code.cell_names.len()).map(|_| Value::new_cell(Value::Number(0.0))).collect();
        let function = Rc::new(Function { code: Rc::new(code), cells });
        self.frames.push(Frame::new(function, self.stack.len()));
        self.run()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Parse, compile and run `program`, wrapping it in an implicit
    /// `begin` (via `compiler::compile`), against this VM's globals.
    /// This is the embedding host's main entry point.
    pub fn exec_source(&mut self, program: &str) -> Result<Value, crate::EvaError> {
        let ast = crate::parser::parse(program)?;
        let code = crate::compiler::compile(&ast, &mut self.globals)?;
        Ok(self.exec(code)?)
    }

    /// Register a native (host-provided) function, callable from Eva
    /// source under `name`. Must be called before `exec_source`.
    pub fn register_native(
        &mut self,
        name: impl Into<String>,
        arity: usize,
        handler: impl Fn(&[Value]) -> Value + 'static,
    ) {
        let name = name.into();
        let value = Value::new_native(name.clone(), arity, handler);
        self.globals.define_with(name, value);
    }

    /// Register a named numeric global constant, readable from Eva
    /// source. Must be called before `exec_source`.
    pub fn register_constant(&mut self, name: impl Into<String>, value: f64) {
        self.globals.define_with(name, Value::Number(value));
    }

    fn run(&mut self) -> Result<Value, RuntimeErr> {
        loop {
            let op = self.fetch()?;
            match op {
                HALT => {
                    let result = self.pop()?;
                    self.frames.pop();
                    return Ok(result);
                }
                CONST => {
                    let idx = self.fetch()?;
                    let value = self.code().constants[idx as usize].clone();
                    self.push(value)?;
                }
                ADD => self.add()?,
                SUB => self.binary_numeric(|a, b| a - b)?,
                MUL => self.binary_numeric(|a, b| a * b)?,
                DIV => self.binary_numeric(|a, b| a / b)?,
                COMPARE => {
                    let idx = self.fetch()?;
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let result = self.compare(&a, &b, idx)?;
                    self.push(Value::Boolean(result))?;
                }
                JMP_IF_FALSE => {
                    let addr = self.fetch_u16()?;
                    let cond = self.pop()?;
                    let truthy = cond
                        .is_truthy()
                        .ok_or_else(|| RuntimeErr::new(RuntimeErrKind::TypeMismatch("expected a boolean")))?;
                    if !truthy {
                        self.jump_to(addr);
                    }
                }
                JMP => {
                    let addr = self.fetch_u16()?;
                    self.jump_to(addr);
                }
                GET_GLOBAL => {
                    let idx = self.fetch()?;
                    let value = self.globals.get(idx).clone();
                    self.push(value)?;
                }
                SET_GLOBAL => {
                    let idx = self.fetch()?;
                    let value = self.peek(0)?.clone();
                    self.globals.set(idx, value);
                }
                POP => {
                    self.pop()?;
                }
                GET_LOCAL => {
                    let slot = self.fetch()?;
                    let bp = self.current_frame().base_pointer;
                    let value = self.stack[bp + slot as usize].clone();
                    self.push(value)?;
                }
                SET_LOCAL => {
                    let slot = self.fetch()?;
                    let bp = self.current_frame().base_pointer;
                    let value = self.peek(0)?.clone();
                    self.stack[bp + slot as usize] = value;
                }
                SCOPE_EXIT => {
                    let count = self.fetch()? as usize;
                    let result = self.pop()?;
                    let new_len = self
                        .stack
                        .len()
                        .checked_sub(count)
                        .ok_or_else(|| RuntimeErr::new(RuntimeErrKind::StackUnderflow))?;
                    self.stack.truncate(new_len);
                    self.push(result)?;
                }
                CALL => self.call(self.fetch()? as usize)?,
                RETURN => {
                    let result = self.pop()?;
                    let frame =
                        self.frames.pop().expect("RETURN always runs inside some frame");
                    self.stack.truncate(frame.base_pointer);
                    self.push(result)?;
                }
                GET_CELL => {
                    let idx = self.fetch()? as usize;
                    let cell = self.current_frame().function.cells[idx].clone();
                    let value = cell.borrow().clone();
                    self.push(value)?;
                }
                SET_CELL => {
                    let idx = self.fetch()? as usize;
                    let value = self.peek(0)?.clone();
                    let cell = self.current_frame().function.cells[idx].clone();
                    *cell.borrow_mut() = value;
                }
                LOAD_CELL => {
                    let idx = self.fetch()? as usize;
                    let cell = self.current_frame().function.cells[idx].clone();
                    self.push(Value::Object(Object::Cell(cell)))?;
                }
                MAKE_FUNCTION => self.make_function(self.fetch()? as usize)?,
                other => return Err(RuntimeErr::new(RuntimeErrKind::UnknownOpcode(other))),
            }
        }
    }

    // -- fetch / jump -------------------------------------------------

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("run() always has an active frame")
    }

    fn code(&self) -> &Rc<CodeObject> {
        &self.current_frame().function.code
    }

    fn fetch(&mut self) -> Result<u8, RuntimeErr> {
        let ip = self.current_frame().ip;
        let byte = *self
            .code()
            .code
            .get(ip)
            .ok_or_else(|| RuntimeErr::new(RuntimeErrKind::UnknownOpcode(bytecode::HALT)))?;
        self.frames.last_mut().unwrap().ip += 1;
        Ok(byte)
    }

    fn fetch_u16(&mut self) -> Result<u16, RuntimeErr> {
        let hi = self.fetch()?;
        let lo = self.fetch()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn jump_to(&mut self, addr: u16) {
        self.frames.last_mut().unwrap().ip = addr as usize;
    }

    // -- value stack --------------------------------------------------

    fn push(&mut self, value: Value) -> Result<(), RuntimeErr> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(RuntimeErr::new(RuntimeErrKind::StackOverflow));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeErr> {
        self.stack.pop().ok_or_else(|| RuntimeErr::new(RuntimeErrKind::StackUnderflow))
    }

    fn peek(&self, distance: usize) -> Result<&Value, RuntimeErr> {
        let len = self.stack.len();
        if distance >= len {
            return Err(RuntimeErr::new(RuntimeErrKind::StackUnderflow));
        }
        Ok(&self.stack[len - 1 - distance])
    }

    // -- arithmetic / comparison --------------------------------------

    /// `+` additionally concatenates two strings, dispatched on
    /// operand type rather than getting its own opcode.
    fn add(&mut self) -> Result<(), RuntimeErr> {
        let b = self.pop()?;
        let a = self.pop()?;
        match (&a, &b) {
            (Value::Object(Object::String(x)), Value::Object(Object::String(y))) => {
                self.push(Value::new_string(format!("{x}{y}")))
            }
            _ => {
                let a = a.as_number().ok_or_else(|| {
                    RuntimeErr::new(RuntimeErrKind::TypeMismatch("expected a number or string"))
                })?;
                let b = b.as_number().ok_or_else(|| {
                    RuntimeErr::new(RuntimeErrKind::TypeMismatch("expected a number or string"))
                })?;
                self.push(Value::Number(a + b))
            }
        }
    }

    fn binary_numeric(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeErr> {
        let b = self.pop()?;
        let a = self.pop()?;
        let a = a
            .as_number()
            .ok_or_else(|| RuntimeErr::new(RuntimeErrKind::TypeMismatch("expected a number")))?;
        let b = b
            .as_number()
            .ok_or_else(|| RuntimeErr::new(RuntimeErrKind::TypeMismatch("expected a number")))?;
        self.push(Value::Number(f(a, b)))
    }

    fn compare(&self, a: &Value, b: &Value, idx: u8) -> Result<bool, RuntimeErr> {
        let op = bytecode::compare_op_symbol(idx);
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => Ok(match op {
                "<" => x < y,
                ">" => x > y,
                "==" => x == y,
                ">=" => x >= y,
                "<=" => x <= y,
                "!=" => x != y,
                _ => return Err(RuntimeErr::new(RuntimeErrKind::UnknownOpcode(idx))),
            }),
            (Value::Boolean(x), Value::Boolean(y)) => match op {
                "==" => Ok(x == y),
                "!=" => Ok(x != y),
                _ => Err(RuntimeErr::new(RuntimeErrKind::TypeMismatch(
                    "booleans only support == and !=",
                ))),
            },
            (Value::Object(Object::String(x)), Value::Object(Object::String(y))) => Ok(match op {
                "<" => x.as_str() < y.as_str(),
                ">" => x.as_str() > y.as_str(),
                "==" => x == y,
                ">=" => x.as_str() >= y.as_str(),
                "<=" => x.as_str() <= y.as_str(),
                "!=" => x != y,
                _ => return Err(RuntimeErr::new(RuntimeErrKind::UnknownOpcode(idx))),
            }),
            _ => Err(RuntimeErr::new(RuntimeErrKind::TypeMismatch(
                "cannot compare operands of different or unsupported types",
            ))),
        }
    }

    // -- calls ----------------------------------------------------------

    fn call(&mut self, argc: usize) -> Result<(), RuntimeErr> {
        let callee_pos = self
            .stack
            .len()
            .checked_sub(argc + 1)
            .ok_or_else(|| RuntimeErr::new(RuntimeErrKind::StackUnderflow))?;
        let callee = self.stack[callee_pos].clone();
        match callee {
            Value::Object(Object::Function(function)) => {
                if function.code.arity != argc {
                    return Err(RuntimeErr::new(RuntimeErrKind::WrongArity {
                        expected: function.code.arity,
                        got: argc,
                    }));
                }
                if self.frames.len() >= self.max_call_depth {
                    return Err(RuntimeErr::new(RuntimeErrKind::CallStackOverflow));
                }
                self.frames.push(Frame::new(function, callee_pos));
                Ok(())
            }
            Value::Object(Object::Native(native)) => {
                if native.arity != argc {
                    return Err(RuntimeErr::new(RuntimeErrKind::WrongArity {
                        expected: native.arity,
                        got: argc,
                    }));
                }
                let args = self.stack[callee_pos + 1..].to_vec();
                let result = (native.handler)(&args);
                self.stack.truncate(callee_pos);
                self.push(result)
            }
            _ => Err(RuntimeErr::new(RuntimeErrKind::NotCallable)),
        }
    }

    fn make_function(&mut self, free_count: usize) -> Result<(), RuntimeErr> {
        let code_value = self.pop()?;
        let code = code_value
            .as_code()
            .ok_or_else(|| RuntimeErr::new(RuntimeErrKind::TypeMismatch("expected a code constant")))?
            .clone();
        let mut free_cells = Vec::with_capacity(free_count);
        for _ in 0..free_count {
            let value = self.pop()?;
            let cell = value
                .as_cell()
                .ok_or_else(|| {
                    RuntimeErr::new(RuntimeErrKind::TypeMismatch("expected a cell reference"))
                })?
                .clone();
            free_cells.push(cell);
        }
        // Popped in reverse of the order they were `LOAD_CELL`'d in.
        free_cells.reverse();
        let owned_count = code.cell_names.len() - free_count;
        let mut cells = free_cells;
        cells.extend((0..owned_count).map(|_| Value::new_cell(Value::Number(0.0))));
        self.push(Value::Object(Object::Function(Rc::new(Function { code, cells }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::parser::parse_optimistic;

    fn run(text: &str) -> Value {
        let program = parse_optimistic(text);
        let mut globals = Globals::new();
        let code = compile(&program, &mut globals).expect("compile failed");
        VM::new(globals).exec(code).expect("exec failed")
    }

    #[test]
    fn stack_empties_between_runs() {
        let mut globals = Globals::new();
        let code = compile(&parse_optimistic("(var x 1) x"), &mut globals).unwrap();
        let mut vm = VM::new(globals);
        let result = vm.exec(code).unwrap();
        assert_eq!(result.as_number(), Some(1.0));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn call_stack_overflow_is_reported() {
        let program = parse_optimistic("(def loop (n) (loop (+ n 1))) (loop 0)");
        let mut globals = Globals::new();
        let code = compile(&program, &mut globals).unwrap();
        let mut vm = VM::with_max_call_depth(globals, 64);
        let err = vm.exec(code).unwrap_err();
        assert_eq!(err.kind, RuntimeErrKind::CallStackOverflow);
    }

    #[test]
    fn type_mismatch_on_arithmetic() {
        let program = parse_optimistic(r#"(+ 1 "two")"#);
        let mut globals = Globals::new();
        let code = compile(&program, &mut globals).unwrap();
        let err = VM::new(globals).exec(code).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrKind::TypeMismatch(_)));
    }

    #[test]
    fn undefined_global_is_compile_time_reference_error() {
        let program = parse_optimistic("undefined_name");
        let mut globals = Globals::new();
        assert!(compile(&program, &mut globals).is_err());
    }

    #[test]
    fn string_comparison() {
        assert_eq!(run(r#"(== "a" "a")"#).as_boolean(), Some(true));
        assert_eq!(run(r#"(< "a" "b")"#).as_boolean(), Some(true));
    }

    #[test]
    fn string_concatenation_via_add() {
        assert_eq!(run(r#"(+ "foo" "bar")"#).as_string(), Some("foobar"));
    }
}
