//! Interactive read/eval/print loop backed by `rustyline`, evaluating
//! one line at a time against a persistent `VM` so `var`/`def`
//! bindings from earlier lines stay visible.
use std::path::Path;

use rustyline::error::ReadlineError;

use crate::result::ExitResult;
use crate::run;
use crate::vm::VM;

pub fn run_repl(history_path: Option<&Path>, dis: bool, debug: bool) -> ExitResult {
    let mut repl = Repl::new(history_path, VM::default(), dis, debug);
    repl.run()
}

struct Repl<'a> {
    reader: rustyline::Editor<()>,
    history_path: Option<&'a Path>,
    vm: VM,
    dis: bool,
    debug: bool,
}

impl<'a> Repl<'a> {
    fn new(history_path: Option<&'a Path>, mut vm: VM, dis: bool, debug: bool) -> Self {
        crate::native::install_defaults(&mut vm.globals);
        let reader = rustyline::Editor::<()>::new().expect("failed to initialize line editor");
        Repl { reader, history_path, vm, dis, debug }
    }

    fn run(&mut self) -> ExitResult {
        println!("Welcome to the Eva REPL (read/eval/print loop)");
        println!("Type an expression, then hit Enter to evaluate it");
        self.load_history();
        println!("Type .exit or .quit to exit");

        loop {
            match self.reader.readline("eva> ") {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    if let Some(result) = self.eval(line.trim()) {
                        break result;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break Ok(None),
                Err(err) => break Err((1, format!("could not read line: {err}"))),
            }
        }
    }

    /// Evaluate one line. Returns `None` to keep reading, `Some` to
    /// exit the loop with that result.
    fn eval(&mut self, text: &str) -> Option<ExitResult> {
        self.add_history_entry(text);
        match text {
            "?" | ".help" => {
                println!(".help  -> show this help");
                println!(".exit  -> exit the REPL");
                println!(".quit  -> exit the REPL");
                return None;
            }
            ".exit" | ".quit" => return Some(Ok(None)),
            _ => {}
        }

        if self.dis {
            if let Ok(ast) = crate::parser::parse(text) {
                if let Ok(code) = crate::compiler::compile(&ast, &mut self.vm.globals) {
                    crate::dis::dis(&code);
                }
            }
        }
        if self.debug {
            log::debug!("evaluating: {text}");
        }

        // A bad line reports an error but does not end the session;
        // only `.exit`/`.quit` or a read error (Ctrl-D, Ctrl-C) do.
        if let Err((_, message)) = run::run_text(&mut self.vm, text) {
            eprintln!("{message}");
        }
        None
    }

    fn load_history(&mut self) {
        if let Some(path) = self.history_path {
            if let Err(err) = self.reader.load_history(path) {
                eprintln!("could not load REPL history: {err}");
            }
        }
    }

    fn add_history_entry(&mut self, input: &str) {
        if let Some(path) = self.history_path {
            let _ = self.reader.add_history_entry(input);
            if let Err(err) = self.reader.save_history(path) {
                eprintln!("could not save REPL history: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_repl<'a>() -> Repl<'a> {
        Repl::new(None, VM::default(), false, false)
    }

    #[test]
    fn eval_arithmetic_keeps_reading() {
        let mut repl = new_repl();
        assert!(repl.eval("(+ 2 (* 3 4))").is_none());
    }

    #[test]
    fn eval_exit_ends_the_loop() {
        let mut repl = new_repl();
        assert_eq!(repl.eval(".exit"), Some(Ok(None)));
    }

    #[test]
    fn eval_reference_error_keeps_reading() {
        let mut repl = new_repl();
        // A bad line reports an error to stderr but doesn't end the session.
        assert!(repl.eval("undefined_name").is_none());
    }

    #[test]
    fn bindings_persist_across_lines() {
        let mut repl = new_repl();
        assert!(repl.eval("(var x 10)").is_none());
        assert!(repl.eval("(set x (+ x 5))").is_none());
    }
}
