//! Skein compiler library.
//!
//! One front end (lexer, parser, AST, front-end passes) feeding three
//! back-ends:
//!
//! - `interp`: the tree-walking reference evaluator;
//! - `bccompiler` + `vm`: the CPS-linked bytecode compiler and its stack
//!   machine (with `bcdump` for inspecting compiled code);
//! - `codegen`: the native back-end, emitting textual LLVM IR linked
//!   against libskein_runtime.a.

pub mod ast;
pub mod bccompiler;
pub mod bcdump;
pub mod builtins;
pub mod bytecode;
pub mod codegen;
pub mod env;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod passes;
pub mod value;
pub mod vm;

pub use ast::{Datum, Expr};
pub use bccompiler::ByteCodeCompiler;
pub use codegen::{CodeGen, CodeGenError, codegen_program, mangle_name};
pub use error::{Error, Result};
pub use interp::Evaluator;
pub use parser::Parser;
pub use value::Value;
pub use vm::Vm;

// the VM's result type comes from the shared core
pub use skein_core::{TaggedValue, display_string};

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Compile source text to LLVM IR text.
pub fn compile_to_ir(source: &str) -> std::result::Result<String, String> {
    let forms = Parser::new(source)
        .parse_program()
        .map_err(|e| e.to_string())?;
    codegen_program(&forms).map_err(|e| e.to_string())
}

/// Locate the runtime archive to link against: an explicit path, the
/// `SKEIN_RUNTIME_LIB` environment variable, or `libskein_runtime.a`
/// beside the running binary (where cargo puts it for workspace builds).
pub fn find_runtime_lib(explicit: Option<&Path>) -> std::result::Result<PathBuf, String> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(format!("runtime library not found at {}", path.display()));
    }
    if let Ok(path) = std::env::var("SKEIN_RUNTIME_LIB") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        return Err(format!(
            "SKEIN_RUNTIME_LIB points at {}, which does not exist",
            path.display()
        ));
    }
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let candidate = dir.join("libskein_runtime.a");
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err("could not locate libskein_runtime.a; pass --runtime-lib or set SKEIN_RUNTIME_LIB"
        .to_string())
}

/// Compile a source file to an executable: emit IR, then link it against
/// the runtime archive with clang.
pub fn build_executable(
    source_path: &Path,
    output_path: &Path,
    keep_ir: bool,
    runtime_lib: Option<&Path>,
) -> std::result::Result<(), String> {
    let source = fs::read_to_string(source_path)
        .map_err(|e| format!("failed to read {}: {}", source_path.display(), e))?;
    let ir = compile_to_ir(&source)?;

    let ir_path = output_path.with_extension("ll");
    fs::write(&ir_path, ir).map_err(|e| format!("failed to write IR file: {}", e))?;

    let runtime = find_runtime_lib(runtime_lib)?;

    let mut clang = Command::new("clang");
    clang
        .arg("-O2")
        .arg(&ir_path)
        .arg(&runtime)
        .arg("-o")
        .arg(output_path);
    #[cfg(target_os = "linux")]
    clang.args(["-lpthread", "-ldl", "-lm"]);

    let output = clang
        .output()
        .map_err(|e| format!("failed to run clang: {}", e))?;

    if !keep_ir {
        fs::remove_file(&ir_path).ok();
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("clang failed:\n{}", stderr));
    }
    Ok(())
}
