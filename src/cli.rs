//! Command-line argument parsing: a `clap::Command` builder (matching
//! this package's house style, not the derive API).
use clap::{value_parser, Arg, ArgAction, Command};

use crate::vm::DEFAULT_MAX_CALL_DEPTH;

/// `default_value` wants a `&'static str`; leaking a handful of bytes
/// once per process for a CLI default is cheaper than threading a
/// `String` through `clap`'s builder API.
fn leaked(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

pub fn build_cli() -> Command {
    let expr_arg = Arg::new("expr")
        .short('e')
        .long("expr")
        .required(false)
        .num_args(1)
        .help("Evaluate a single expression string and exit");

    let file_arg = Arg::new("file")
        .short('f')
        .long("file")
        .required(false)
        .num_args(1)
        .help("Read and evaluate a source file and exit");

    Command::new("eva")
        .version("0.1.0")
        .about("Eva: an untyped Lisp-like expression language")
        .arg(&expr_arg)
        .arg(&file_arg)
        .arg(
            Arg::new("dis")
                .short('i')
                .long("dis")
                .action(ArgAction::SetTrue)
                .help("Disassemble every compiled function to stdout before running"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .action(ArgAction::SetTrue)
                .env("EVA_DEBUG")
                .help("Enable debug-level logging of the VM's fetch/execute loop"),
        )
        .arg(
            Arg::new("max_call_depth")
                .short('x')
                .long("max-call-depth")
                .default_value(leaked(DEFAULT_MAX_CALL_DEPTH.to_string()))
                .value_parser(value_parser!(usize))
                .env("EVA_MAX_CALL_DEPTH")
                .help("Maximum call/recursion depth"),
        )
        .group(clap::ArgGroup::new("mode").args(["expr", "file"]).multiple(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_expr_and_file_together() {
        let cli = build_cli();
        let result = cli.try_get_matches_from(["eva", "-e", "1", "-f", "a.eva"]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_expr() {
        let cli = build_cli();
        let matches = cli.try_get_matches_from(["eva", "-e", "(+ 1 2)"]).unwrap();
        assert_eq!(matches.get_one::<String>("expr").map(String::as_str), Some("(+ 1 2)"));
    }

    #[test]
    fn default_max_call_depth() {
        let cli = build_cli();
        let matches = cli.try_get_matches_from(["eva"]).unwrap();
        assert_eq!(matches.get_one::<usize>("max_call_depth").copied(), Some(DEFAULT_MAX_CALL_DEPTH));
    }
}
