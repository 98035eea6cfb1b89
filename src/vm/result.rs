use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeErr {
    pub kind: RuntimeErrKind,
}

impl RuntimeErr {
    pub fn new(kind: RuntimeErrKind) -> Self {
        Self { kind }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeErrKind {
    StackOverflow,
    StackUnderflow,
    CallStackOverflow,
    UnknownOpcode(u8),
    TypeMismatch(&'static str),
    NotCallable,
    WrongArity { expected: usize, got: usize },
}

impl RuntimeErrKind {
    /// The process exit code `run.rs`/`repl.rs` report for this error.
    /// `TypeMismatch` gets its own code; every other runtime error
    /// shares the general runtime-error code.
    pub fn exit_code(&self) -> i32 {
        match self {
            RuntimeErrKind::TypeMismatch(_) => 5,
            _ => 4,
        }
    }
}

impl fmt::Display for RuntimeErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RuntimeErrKind::StackOverflow => write!(f, "runtime error: stack overflow"),
            RuntimeErrKind::StackUnderflow => write!(f, "runtime error: stack underflow"),
            RuntimeErrKind::CallStackOverflow => {
                write!(f, "runtime error: call stack overflow (max call depth exceeded)")
            }
            RuntimeErrKind::UnknownOpcode(op) => {
                write!(f, "runtime error: unknown opcode 0x{op:02x}")
            }
            RuntimeErrKind::TypeMismatch(msg) => write!(f, "type error: {msg}"),
            RuntimeErrKind::NotCallable => write!(f, "runtime error: value is not callable"),
            RuntimeErrKind::WrongArity { expected, got } => {
                write!(f, "runtime error: expected {expected} argument(s), got {got}")
            }
        }
    }
}

impl std::error::Error for RuntimeErr {}
