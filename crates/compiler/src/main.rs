//! Skein native compiler CLI.
//!
//! `skeinc emit-ir` prints the LLVM IR for a program; `skeinc build` links
//! it against the runtime library into an executable.

use clap::{Parser as ClapParser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "skeinc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Skein native compiler - compile Scheme programs to executables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit LLVM IR for a program to standard output
    EmitIr {
        /// Input source file (standard input when omitted)
        input: Option<PathBuf>,
    },

    /// Compile a source file to an executable
    Build {
        /// Input source file
        input: PathBuf,

        /// Output executable path (defaults to the input filename without
        /// its extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep the intermediate IR file (.ll)
        #[arg(long)]
        keep_ir: bool,

        /// Path to libskein_runtime.a (otherwise SKEIN_RUNTIME_LIB or the
        /// archive beside this binary)
        #[arg(long, value_name = "PATH")]
        runtime_lib: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::EmitIr { input } => run_emit_ir(input.as_deref()),
        Commands::Build { input, output, keep_ir, runtime_lib } => {
            let output = output.unwrap_or_else(|| {
                PathBuf::from(input.file_stem().unwrap_or_default())
            });
            run_build(&input, &output, keep_ir, runtime_lib.as_deref());
        }
    }
}

fn read_source(input: Option<&Path>) -> String {
    let result = match input {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e)),
        None => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .map(|_| source)
                .map_err(|e| format!("failed to read standard input: {}", e))
        }
    };
    match result {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_emit_ir(input: Option<&Path>) {
    let source = read_source(input);
    match skeinc::compile_to_ir(&source) {
        Ok(ir) => print!("{}", ir),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_build(input: &Path, output: &Path, keep_ir: bool, runtime_lib: Option<&Path>) {
    match skeinc::build_executable(input, output, keep_ir, runtime_lib) {
        Ok(()) => {
            println!("Compiled {} -> {}", input.display(), output.display());
            if keep_ir {
                let ir_path = output.with_extension("ll");
                if ir_path.exists() {
                    println!("IR saved to {}", ir_path.display());
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
