//! Per-instruction lowering
//!
//! One SM instruction at a time, each preceded in the output by a `# …`
//! comment naming it. Simple data movement and control flow live here;
//! binary operations and call marshalling have their own modules.

use super::state::Opnd;
use super::{CodeGen, CodeGenError};
use crate::builtins::tag_hash;
use crate::sm::Insn;
use std::fmt::Write as _;

impl CodeGen {
    /// `movl src, dst`, routing through `%eax` when both operands are in
    /// memory. A move onto itself emits nothing.
    pub(super) fn mov(&mut self, src: &Opnd, dst: &Opnd) -> Result<(), CodeGenError> {
        if src == dst {
            return Ok(());
        }
        if src.is_mem() && dst.is_mem() {
            self.op2("movl", src, &Opnd::Eax)?;
            self.op2("movl", &Opnd::Eax, dst)
        } else {
            self.op2("movl", src, dst)
        }
    }

    pub(super) fn op2(&mut self, mnemonic: &str, src: &Opnd, dst: &Opnd) -> Result<(), CodeGenError> {
        writeln!(self.output, "\t{}\t{}, {}", mnemonic, src, dst)?;
        Ok(())
    }

    pub(super) fn op1(&mut self, mnemonic: &str, opnd: &Opnd) -> Result<(), CodeGenError> {
        writeln!(self.output, "\t{}\t{}", mnemonic, opnd)?;
        Ok(())
    }

    pub(super) fn line(&mut self, text: &str) -> Result<(), CodeGenError> {
        writeln!(self.output, "\t{}", text)?;
        Ok(())
    }

    /// Lower one SM instruction.
    pub(super) fn lower(&mut self, insn: &Insn) -> Result<(), CodeGenError> {
        match insn {
            Insn::Const(n) => {
                let dst = self.push();
                self.op2("movl", &Opnd::Lit(*n), &dst)
            }

            Insn::Global(name) => {
                self.globals.insert(format!("global_{}", name));
                Ok(())
            }

            Insn::Ld(location) => {
                let src = self.loc(location)?;
                let dst = self.push();
                self.mov(&src, &dst)
            }

            Insn::Lda(location) => {
                let src = self.loc(location)?;
                let dst = self.push();
                if dst.is_mem() {
                    self.op2("leal", &src, &Opnd::Eax)?;
                    self.op2("movl", &Opnd::Eax, &dst)
                } else {
                    self.op2("leal", &src, &dst)
                }
            }

            Insn::St(location) => {
                let dst = self.loc(location)?;
                let value = self.peek()?;
                self.mov(&value, &dst)
            }

            Insn::Sti => self.lower_sti(),

            Insn::Binop(op) => self.lower_binop(*op),

            Insn::Label(l) => {
                if self.barrier {
                    // The fall-through stack is dead; restore the shape the
                    // jumps to this label recorded. A label nobody has
                    // jumped to yet (a loop body entered via the initial
                    // forward jump) keeps the stack from before the
                    // transfer, which is exactly what the loop runs with.
                    if let Some(snapshot) = self.stack_map.get(l) {
                        self.stack = snapshot.clone();
                    }
                    self.barrier = false;
                }
                writeln!(self.output, "{}:", l)?;
                Ok(())
            }

            Insn::Jmp(l) => {
                self.barrier = true;
                writeln!(self.output, "\tjmp\t{}", l)?;
                Ok(())
            }

            Insn::CJmp(cond, l) => {
                let value = self.pop()?;
                self.stack_map.insert(l.clone(), self.stack.clone());
                self.op2("cmpl", &Opnd::Lit(0), &value)?;
                writeln!(self.output, "\tj{}\t{}", cond.suffix(), l)?;
                Ok(())
            }

            Insn::Drop => {
                self.pop()?;
                Ok(())
            }

            Insn::Call(f, n) => self.lower_call(f, *n),

            Insn::Builtin(f, n) => self.lower_call(&format!("L{}", f), *n),

            Insn::String(s) => {
                let k = self.intern_string(s);
                let dst = self.push();
                let label = Opnd::Mem(format!("string_{}", k));
                if dst.is_mem() {
                    self.op2("leal", &label, &Opnd::Eax)?;
                    self.op2("movl", &Opnd::Eax, &dst)?;
                } else {
                    self.op2("leal", &label, &dst)?;
                }
                self.lower_call("Bstring", 1)
            }

            Insn::Elem => self.lower_call("Belem", 2),

            Insn::Sta => self.lower_call("Bsta", 3),

            Insn::Array(n) => self.lower_boxed("Barray", *n, None),

            Insn::Sexp(tag, n) => self.lower_boxed("Bsexp", *n, Some(tag_hash(tag))),

            Insn::Begin(name, _, locals) => {
                self.fun_label = name.clone();
                self.n_locals = *locals;
                self.stack.clear();
                self.stack_slots = 0;
                self.barrier = false;
                self.line("pushl\t%ebp")?;
                self.line("movl\t%esp, %ebp")?;
                writeln!(self.output, "\tsubl\t${}_SIZE, %esp", name)?;
                Ok(())
            }

            Insn::End => {
                if self.fun_label == "main" {
                    self.line("movl\t%ebp, %esp")?;
                    self.line("popl\t%ebp")?;
                    self.line("xorl\t%eax, %eax")?;
                } else {
                    let result = self.pop()?;
                    self.op2("movl", &result, &Opnd::Eax)?;
                    self.line("movl\t%ebp, %esp")?;
                    self.line("popl\t%ebp")?;
                }
                self.line("ret")?;
                writeln!(
                    self.output,
                    "\t.set\t{}_SIZE,\t{}",
                    self.fun_label,
                    (self.n_locals + self.stack_slots) * 4
                )?;
                self.barrier = true;
                Ok(())
            }

            Insn::Dup => Err(CodeGenError::Logic(format!(
                "codegeneration for instruction {} is not yet implemented",
                insn
            ))),
        }
    }

    /// Store through a reference: the address is below the value on the
    /// stack; the stored value is the result.
    fn lower_sti(&mut self) -> Result<(), CodeGenError> {
        let value = self.pop()?;
        let address = self.pop()?;

        let reference = match &address {
            Opnd::Reg(_) => address.clone(),
            _ => {
                self.op2("movl", &address, &Opnd::Edx)?;
                Opnd::Edx
            }
        };
        let cell = Opnd::Ind(0, Box::new(reference));

        if value.is_mem() {
            self.op2("movl", &value, &Opnd::Eax)?;
            self.op2("movl", &Opnd::Eax, &cell)?;
            let dst = self.push();
            self.op2("movl", &Opnd::Eax, &dst)
        } else {
            self.op2("movl", &value, &cell)?;
            let dst = self.push();
            self.mov(&value, &dst)
        }
    }
}
