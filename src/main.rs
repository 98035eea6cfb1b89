use std::path::PathBuf;
use std::process::ExitCode;

use eva::cli::build_cli;
use eva::config::CONFIG;
use eva::vm::VM;

fn main() -> ExitCode {
    env_logger::init();

    let matches = build_cli().get_matches();
    let debug = matches.get_flag("debug");
    let dis = matches.get_flag("dis");
    let max_call_depth = matches.get_one::<usize>("max_call_depth").copied().unwrap_or(0);

    {
        let mut config = CONFIG.write().expect("config lock poisoned");
        let _ = config.set_bool("debug", debug);
        let _ = config.set_bool("dis", dis);
        if max_call_depth > 0 {
            let _ = config.set_usize("max_call_depth", max_call_depth);
        }
    }

    let effective_max_call_depth = {
        let config = CONFIG.read().expect("config lock poisoned");
        config.get_usize("max_call_depth").unwrap_or(eva::vm::DEFAULT_MAX_CALL_DEPTH)
    };

    let mut vm = VM::with_max_call_depth(Default::default(), effective_max_call_depth);
    eva::native::install_defaults(&mut vm.globals);

    let result = if let Some(expr) = matches.get_one::<String>("expr") {
        run_one_shot(&mut vm, expr, dis)
    } else if let Some(path) = matches.get_one::<String>("file") {
        if dis {
            if let Ok(text) = std::fs::read_to_string(path) {
                disassemble(&mut vm, &text);
            }
        }
        eva::run::run_file(&mut vm, path)
    } else {
        let history_path = history_path();
        eva::repl::run_repl(history_path.as_deref(), dis, debug)
    };

    match result {
        Ok(None) => ExitCode::SUCCESS,
        Ok(Some(message)) => {
            println!("{message}");
            ExitCode::SUCCESS
        }
        Err((code, message)) => {
            eprintln!("{message}");
            ExitCode::from(code.clamp(0, 255) as u8)
        }
    }
}

fn run_one_shot(vm: &mut VM, expr: &str, dis: bool) -> eva::result::ExitResult {
    if dis {
        disassemble(vm, expr);
    }
    eva::run::run_text(vm, expr)
}

fn disassemble(vm: &mut VM, text: &str) {
    if let Ok(ast) = eva::parser::parse(text) {
        if let Ok(code) = eva::compiler::compile(&ast, &mut vm.globals) {
            eva::dis::dis(&code);
        }
    }
}

fn history_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("eva").join("repl-history"))
}
