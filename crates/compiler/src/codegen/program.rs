//! Whole-program assembly
//!
//! Drives the per-instruction lowering over a complete SM program and
//! assembles the final text: the `.data` section (globals and interned
//! strings) followed by `.text` with `main` exported.

use super::{CodeGen, CodeGenError};
use crate::sm::Insn;
use std::fmt::Write as _;

impl CodeGen {
    /// Lower a complete SM program to an AT&T-syntax assembly listing.
    pub fn compile_program(&mut self, prog: &[Insn]) -> Result<String, CodeGenError> {
        for insn in prog {
            writeln!(self.output, "# {}", insn)?;
            self.lower(insn)?;
        }

        let mut asm = String::new();
        self.emit_data_section(&mut asm)?;
        writeln!(asm, "\t.text")?;
        writeln!(asm, "\t.global\tmain")?;
        asm.push_str(&self.output);
        Ok(asm)
    }
}

/// Convenience entry point: lower a program with a fresh generator.
pub fn generate(prog: &[Insn]) -> Result<String, CodeGenError> {
    CodeGen::new().compile_program(prog)
}
