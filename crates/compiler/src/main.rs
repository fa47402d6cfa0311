//! Lama Compiler CLI
//!
//! Command-line interface for compiling .lama programs to executables and
//! for running them on the stack-machine interpreter.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use std::io::{self, Read as _};
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "lamac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lama compiler - compile .lama programs to executables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .lama file to an executable
    Build {
        /// Input .lama source file
        input: PathBuf,

        /// Output executable path (defaults to input filename without .lama extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after writing the assembly file (.s)
        #[arg(short = 'S', long)]
        assembly_only: bool,

        /// Directory containing runtime.o (overrides config and LAMA_RUNTIME)
        #[arg(long)]
        runtime: Option<PathBuf>,

        /// Path to a configuration file (defaults to lama.toml next to the input)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compile a .lama file and run it on the stack-machine interpreter
    Run {
        /// Input .lama source file
        input: PathBuf,
    },

    /// Print the stack-machine program for a .lama file
    Sm {
        /// Input .lama source file
        input: PathBuf,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            assembly_only,
            runtime,
            config,
        } => {
            let output = output.unwrap_or_else(|| {
                let stem = input.file_stem().unwrap_or_default();
                PathBuf::from(stem)
            });
            run_build(&input, &output, assembly_only, runtime, config.as_deref());
        }
        Commands::Run { input } => run_run(&input),
        Commands::Sm { input } => run_sm(&input),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "lamac", &mut io::stdout());
}

/// Locate and load the configuration: an explicit --config path must exist;
/// otherwise a lama.toml next to the source is picked up when present.
fn load_config(input: &Path, config_path: Option<&Path>) -> Result<lamac::CompilerConfig, String> {
    if let Some(path) = config_path {
        return lamac::CompilerConfig::load(path);
    }
    let implicit = input.parent().unwrap_or(Path::new(".")).join("lama.toml");
    if implicit.exists() {
        return lamac::CompilerConfig::load(&implicit);
    }
    Ok(lamac::CompilerConfig::default())
}

fn run_build(
    input: &Path,
    output: &Path,
    assembly_only: bool,
    runtime: Option<PathBuf>,
    config_path: Option<&Path>,
) {
    let mut config = match load_config(input, config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    if let Some(dir) = runtime {
        config = config.with_runtime_dir(dir);
    }

    match lamac::compile_file(input, output, assembly_only, &config) {
        Ok(_) => {
            if assembly_only {
                println!(
                    "Compiled {} -> {}",
                    input.display(),
                    output.with_extension("s").display()
                );
            } else {
                println!("Compiled {} -> {}", input.display(), output.display());
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_run(input: &Path) {
    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", input.display(), e);
            process::exit(1);
        }
    };
    let prog = match lamac::compile_to_sm(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    // Whitespace-separated integers on stdin feed successive read () calls.
    let mut stdin = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut stdin) {
        eprintln!("Error: failed to read stdin: {}", e);
        process::exit(1);
    }
    let mut input_values = Vec::new();
    for word in stdin.split_whitespace() {
        match word.parse::<i32>() {
            Ok(n) => input_values.push(n),
            Err(_) => {
                eprintln!("Error: invalid input value '{}'", word);
                process::exit(1);
            }
        }
    }

    match lamac::interp::run(&prog, &input_values) {
        Ok(output) => {
            for value in output {
                println!("{}", value);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_sm(input: &Path) {
    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", input.display(), e);
            process::exit(1);
        }
    };
    match lamac::compile_to_sm(&source) {
        Ok(prog) => {
            for insn in prog {
                println!("{}", insn);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
