//! Turns the result of running a program through a `VM` into a process
//! exit code, with the location-pointer diagnostics this package's CLI
//! tools print on parse/scan errors.
use std::fs;

use crate::compiler::CompileErrKind;
use crate::parser::ParseErrKind;
use crate::result::ExitResult;
use crate::scanner::{Location, ScanErrKind};
use crate::vm::{RuntimeErrKind, VM};
use crate::EvaError;

/// Evaluate `text` against `vm` and translate the result into a
/// process exit code.
pub fn run_text(vm: &mut VM, text: &str) -> ExitResult {
    Runner.exit(vm.exec_source(text))
}

/// Read `path` and evaluate it against `vm`.
pub fn run_file(vm: &mut VM, path: &str) -> ExitResult {
    match fs::read_to_string(path) {
        Ok(text) => run_text(vm, &text),
        Err(err) => Err((1, format!("could not read {path}: {err}"))),
    }
}

struct Runner;

impl Runner {
    /// Take the result of `VM::exec_source` and return an appropriate
    /// exit result, drilling into nested error kinds for a precise
    /// message and exit code.
    fn exit(&self, result: Result<crate::value::Value, EvaError>) -> ExitResult {
        match result {
            Ok(_) => Ok(None),
            Err(EvaError::Runtime(err)) => self.handle_runtime_err(err.kind),
            Err(EvaError::Compile(err)) => self.handle_compile_err(err.kind),
            Err(EvaError::Parse(err)) => self.handle_parse_err(err.kind),
        }
    }

    fn handle_runtime_err(&self, kind: RuntimeErrKind) -> ExitResult {
        let code = kind.exit_code();
        Err((code, format!("{}", crate::vm::RuntimeErr::new(kind))))
    }

    fn handle_compile_err(&self, kind: CompileErrKind) -> ExitResult {
        Err((3, format!("{kind}", kind = DisplayCompile(&kind))))
    }

    fn handle_parse_err(&self, kind: ParseErrKind) -> ExitResult {
        match kind {
            ParseErrKind::ScanErr(err) => self.handle_scan_err(err.kind, err.location),
            ParseErrKind::UnexpectedToken(token) => {
                Err((2, format!("parse error: unexpected token {token:?}")))
            }
            ParseErrKind::UnexpectedEndOfInput => {
                Err((2, "parse error: unexpected end of input".to_owned()))
            }
            ParseErrKind::EmptyList => Err((2, "parse error: empty list `()`".to_owned())),
        }
    }

    fn handle_scan_err(&self, kind: ScanErrKind, location: Location) -> ExitResult {
        let marker = location.col.saturating_sub(1);
        let message = match kind {
            ScanErrKind::UnexpectedCharacter(c) => {
                format!(
                    "{:>width$}^\nsyntax error: unexpected character at {location}: '{c}'",
                    "",
                    width = marker
                )
            }
            ScanErrKind::UnterminatedString => {
                format!(
                    "{:>width$}^\nsyntax error: unterminated string literal at {location}",
                    "",
                    width = marker
                )
            }
            ScanErrKind::UnmatchedOpeningParen => {
                format!(
                    "{:>width$}^\nsyntax error: unmatched opening paren at {location}",
                    "",
                    width = marker
                )
            }
            ScanErrKind::UnmatchedClosingParen => {
                format!(
                    "{:>width$}^\nsyntax error: unmatched closing paren at {location}",
                    "",
                    width = marker
                )
            }
        };
        Err((1, message))
    }
}

/// `CompileErrKind` already has a user-facing `Display`; this wrapper
/// just keeps the cascade above uniform with the other handlers.
struct DisplayCompile<'a>(&'a CompileErrKind);

impl std::fmt::Display for DisplayCompile<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::compiler::CompileErr::new(self.0.clone()).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_run_is_ok() {
        let mut vm = VM::default();
        assert!(run_text(&mut vm, "(+ 1 2)").is_ok());
    }

    #[test]
    fn reference_error_exits_three() {
        let mut vm = VM::default();
        let result = run_text(&mut vm, "undefined_name");
        assert_eq!(result.unwrap_err().0, 3);
    }

    #[test]
    fn scan_error_exits_one() {
        let mut vm = VM::default();
        let result = run_text(&mut vm, "\"unterminated");
        assert_eq!(result.unwrap_err().0, 1);
    }

    #[test]
    fn missing_file_exits_one() {
        let mut vm = VM::default();
        let result = run_file(&mut vm, "/nonexistent/path/to/nowhere.eva");
        assert_eq!(result.unwrap_err().0, 1);
    }
}
