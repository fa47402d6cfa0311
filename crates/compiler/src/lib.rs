//! Lama Compiler Library
//!
//! Provides compilation from .lama source to x86 (32-bit) assembly and
//! executable binaries, in two stages: the AST is compiled to a
//! stack-machine program (`compile`), which is lowered to AT&T-syntax
//! assembly (`codegen`) and handed to the system C compiler together with
//! the runtime library. The stack-machine program can also be executed
//! directly (`interp`), which serves as the semantic oracle for the
//! generated code.

pub mod ast;
pub mod builtins;
pub mod codegen;
pub mod compile;
pub mod config;
pub mod interp;
pub mod parser;
pub mod sm;

pub use codegen::{CodeGen, CodeGenError};
pub use compile::{CompileError, compile_unit};
pub use config::CompilerConfig;
pub use parser::Parser;

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

/// Cache for the C compiler availability check; it only runs once per
/// process.
static CC_CHECKED: OnceLock<Result<(), String>> = OnceLock::new();

/// Check that the configured C compiler can be invoked at all. The
/// interesting failure (no 32-bit support) still surfaces from the link
/// step, but a missing compiler gets a direct message.
fn check_cc(cc: &str) -> Result<(), String> {
    CC_CHECKED
        .get_or_init(|| {
            let output = Command::new(cc).arg("--version").output().map_err(|e| {
                format!(
                    "failed to run {}: {}. A C compiler with 32-bit support is required.",
                    cc, e
                )
            })?;
            if !output.status.success() {
                return Err(format!(
                    "{} --version failed with exit code {:?}",
                    cc,
                    output.status.code()
                ));
            }
            Ok(())
        })
        .clone()
}

/// Compile source text to a stack-machine program.
pub fn compile_to_sm(source: &str) -> Result<Vec<sm::Insn>, String> {
    let unit = parser::parse(source)?;
    compile::compile_unit(&unit).map_err(|e| e.to_string())
}

/// Compile source text to an assembly listing (for testing and `--dump`
/// style use).
pub fn compile_to_asm(source: &str) -> Result<String, String> {
    let prog = compile_to_sm(source)?;
    codegen::generate(&prog).map_err(|e| e.to_string())
}

/// Compile a .lama source file to an executable.
///
/// Writes `<output>.s` next to the executable and invokes
/// `<cc> -g -m32 -o <output> <runtime>/runtime.o <output>.s`. With
/// `assembly_only` the process stops after writing the assembly file.
pub fn compile_file(
    source_path: &Path,
    output_path: &Path,
    assembly_only: bool,
    config: &CompilerConfig,
) -> Result<(), String> {
    let source = fs::read_to_string(source_path)
        .map_err(|e| format!("failed to read {}: {}", source_path.display(), e))?;

    let asm = compile_to_asm(&source)?;

    let asm_path = output_path.with_extension("s");
    fs::write(&asm_path, asm)
        .map_err(|e| format!("failed to write {}: {}", asm_path.display(), e))?;

    if assembly_only {
        return Ok(());
    }

    let cc = config.cc();
    check_cc(cc)?;

    let runtime = config.runtime_dir().join("runtime.o");
    let output = Command::new(cc)
        .arg("-g")
        .arg("-m32")
        .arg("-o")
        .arg(output_path)
        .arg(&runtime)
        .arg(&asm_path)
        .args(&config.cc_args)
        .output()
        .map_err(|e| format!("failed to run {}: {}", cc, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("linking failed:\n{}", stderr));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_compile_to_sm_pipeline() {
        let prog = compile_to_sm("write (1 + 2)").unwrap();
        assert!(sm::check(&prog).is_ok());
        assert_eq!(interp::run(&prog, &[]).unwrap(), vec![3]);
    }

    #[test]
    fn test_compile_to_asm_pipeline() {
        let asm = compile_to_asm("write (1)").unwrap();
        assert!(asm.contains("main:"));
    }

    #[test]
    fn test_parse_error_propagates() {
        let err = compile_to_asm("write (").unwrap_err();
        assert!(err.contains("expected"), "{}", err);
    }

    #[test]
    fn test_semantic_error_propagates() {
        let err = compile_to_asm("write (nope)").unwrap_err();
        assert!(err.contains("does not designate"), "{}", err);
    }

    #[test]
    fn test_compile_file_assembly_only() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("t.lama");
        let mut f = fs::File::create(&source_path).unwrap();
        writeln!(f, "write (42)").unwrap();

        let output_path = dir.path().join("t");
        compile_file(
            &source_path,
            &output_path,
            true,
            &CompilerConfig::default(),
        )
        .unwrap();

        let asm = fs::read_to_string(dir.path().join("t.s")).unwrap();
        assert!(asm.contains("# CONST 42"));
        assert!(!output_path.exists());
    }
}
