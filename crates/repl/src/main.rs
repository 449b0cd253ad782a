//! skein - interactive driver for the Skein Scheme implementation.
//!
//! Modes:
//!   skein                  read-eval-print loop (default)
//!   skein -e               evaluate a program from standard input
//!   skein -f prog.scm      evaluate a program from a file
//!   skein -d [prog.scm]    dump compiled bytecode instead of evaluating
//!   skein --engine tree    select the tree-walking back-end (default: vm)
//!
//! The REPL reads lines until parentheses balance, evaluates, and prints
//! each non-void result. Evaluation errors abort only the current form;
//! installed definitions persist. In batch modes an error exits nonzero.

mod engine;

use clap::Parser as ClapParser;
use engine::{Engine, EngineKind};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use skeinc::bccompiler::ByteCodeCompiler;
use skeinc::bcdump;
use skeinc::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "skein")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Skein Scheme - REPL and program runner", long_about = None)]
struct Cli {
    /// Read a program from standard input and evaluate it
    #[arg(short = 'e', conflicts_with_all = ["file", "dump"])]
    eval_stdin: bool,

    /// Evaluate a program from a file
    #[arg(short = 'f', value_name = "PATH", conflicts_with = "dump")]
    file: Option<PathBuf>,

    /// Dump compiled bytecode for a file (standard input when no path)
    #[arg(short = 'd', value_name = "PATH", num_args = 0..=1)]
    dump: Option<Option<PathBuf>>,

    /// Evaluator back-end: tree or vm
    #[arg(long, value_name = "ENGINE", default_value = "vm", value_parser = parse_engine)]
    engine: EngineKind,
}

fn parse_engine(s: &str) -> Result<EngineKind, String> {
    s.parse()
}

fn main() {
    let cli = Cli::parse();

    if let Some(dump) = cli.dump {
        run_dump(dump.as_deref());
        return;
    }
    if cli.eval_stdin {
        run_source(&read_stdin(), cli.engine);
        return;
    }
    if let Some(path) = cli.file {
        run_source(&read_file(&path), cli.engine);
        return;
    }
    repl(cli.engine);
}

fn read_stdin() -> String {
    let mut source = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut source) {
        eprintln!("Error: failed to read standard input: {}", e);
        process::exit(1);
    }
    source
}

fn read_file(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

/// Evaluate a whole program; any error exits nonzero.
fn run_source(source: &str, kind: EngineKind) {
    let forms = match Parser::new(source).parse_program() {
        Ok(forms) => forms,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    let mut engine = Engine::new(kind);
    for form in &forms {
        match engine.eval(form) {
            Ok(Some(text)) => println!("{}", text),
            Ok(None) => {}
            Err(e) => {
                eprintln!("{}", e);
                process::exit(1);
            }
        }
    }
}

/// Compile each top-level form and print its bytecode.
fn run_dump(path: Option<&Path>) {
    let source = match path {
        Some(path) => read_file(path),
        None => read_stdin(),
    };
    let forms = match Parser::new(&source).parse_program() {
        Ok(forms) => forms,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    let mut compiler = ByteCodeCompiler::new();
    for form in &forms {
        match compiler.compile_toplevel(form) {
            Ok(entry) => print!("{}", bcdump::dump(compiler.graph(), entry)),
            Err(e) => {
                eprintln!("{}", e);
                process::exit(1);
            }
        }
    }
}

fn repl(kind: EngineKind) {
    let mut engine = Engine::new(kind);
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Error: failed to start line editor: {}", e);
            process::exit(1);
        }
    };

    loop {
        let input = match read_balanced(&mut editor) {
            Some(input) => input,
            None => return, // EOF
        };
        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(trimmed);

        let forms = match Parser::new(&input).parse_program() {
            Ok(forms) => forms,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };
        for form in &forms {
            match engine.eval(form) {
                Ok(Some(text)) => println!("{}", text),
                Ok(None) => {}
                Err(e) => {
                    eprintln!("{}", e);
                    break;
                }
            }
        }
    }
}

/// Read lines until parentheses balance. None on EOF.
fn read_balanced(editor: &mut DefaultEditor) -> Option<String> {
    let mut input = String::new();
    let mut depth = 0i32;
    loop {
        let prompt = if input.is_empty() { "~> " } else { ".. " };
        match editor.readline(prompt) {
            Ok(line) => {
                depth += paren_balance(&line);
                input.push_str(&line);
                input.push('\n');
                if depth < 0 {
                    eprintln!("parentheses mismatch");
                    input.clear();
                    depth = 0;
                    continue;
                }
                if depth == 0 {
                    return Some(input);
                }
            }
            Err(ReadlineError::Interrupted) => {
                input.clear();
                depth = 0;
            }
            Err(ReadlineError::Eof) => return None,
            Err(e) => {
                eprintln!("Error: {}", e);
                return None;
            }
        }
    }
}

/// Net parenthesis depth of one line, ignoring `;` comments.
fn paren_balance(line: &str) -> i32 {
    let mut depth = 0;
    for c in line.chars() {
        match c {
            ';' => break,
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paren_balance() {
        assert_eq!(paren_balance("(+ 1 2)"), 0);
        assert_eq!(paren_balance("(let ((x 1))"), 2);
        assert_eq!(paren_balance("))"), -2);
        assert_eq!(paren_balance("( ; comment )"), 1);
    }
}
