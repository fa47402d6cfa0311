//! Call marshalling
//!
//! Calling convention is cdecl: arguments on the machine stack with the
//! first parameter at the lowest address, caller cleans up, result in
//! `%eax`. The SM stack holds the leftmost argument on top, so the operands
//! are popped top-first and the `pushl`s emitted in reverse pop order: the
//! top operand is pushed last and becomes the first parameter.
//!
//! Values below the arguments that live in registers would be clobbered by
//! the callee (the generated code uses the same four registers everywhere),
//! so they are pushed before the call and popped, in reverse, after it.

use super::state::Opnd;
use super::{CodeGen, CodeGenError};
use std::fmt::Write as _;

impl CodeGen {
    /// Lower a call to `f` taking `n` stack operands; pushes the result.
    pub(super) fn lower_call(&mut self, f: &str, n: usize) -> Result<(), CodeGenError> {
        let live = self.live_registers(n);
        for reg in &live {
            self.op1("pushl", reg)?;
        }

        let mut args = Vec::with_capacity(n);
        for _ in 0..n {
            args.push(self.pop()?);
        }
        for arg in args.iter().rev() {
            self.op1("pushl", arg)?;
        }

        writeln!(self.output, "\tcall\t{}", f)?;
        if n > 0 {
            writeln!(self.output, "\taddl\t${}, %esp", n * 4)?;
        }

        for reg in live.iter().rev() {
            self.op1("popl", reg)?;
        }

        let dst = self.push();
        self.op2("movl", &Opnd::Eax, &dst)
    }

    /// Lower a boxed-value constructor (`Barray` / `Bsexp`): like a call,
    /// but the element count is passed as an extra leading parameter and an
    /// s-expression also carries its tag hash as the trailing one.
    pub(super) fn lower_boxed(
        &mut self,
        f: &str,
        n: usize,
        tag: Option<i32>,
    ) -> Result<(), CodeGenError> {
        let live = self.live_registers(n);
        for reg in &live {
            self.op1("pushl", reg)?;
        }

        if let Some(hash) = tag {
            self.op1("pushl", &Opnd::Lit(hash))?;
        }
        let mut args = Vec::with_capacity(n);
        for _ in 0..n {
            args.push(self.pop()?);
        }
        for arg in args.iter().rev() {
            self.op1("pushl", arg)?;
        }

        // The count parameter includes the tag hash slot when present.
        let count = n + usize::from(tag.is_some());
        self.op1("pushl", &Opnd::Lit(count as i32))?;
        writeln!(self.output, "\tcall\t{}", f)?;
        writeln!(self.output, "\taddl\t${}, %esp", (count + 1) * 4)?;

        for reg in live.iter().rev() {
            self.op1("popl", reg)?;
        }

        let dst = self.push();
        self.op2("movl", &Opnd::Eax, &dst)
    }
}
