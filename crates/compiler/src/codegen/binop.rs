//! Binary-operation lowering
//!
//! The right operand (`src`) is on top of the symbolic stack, the left
//! (`dst`) below it; the result ends up in `dst`'s slot, which is pushed
//! back. x86 rejects two memory operands in one instruction, so memory
//! destinations route through `%eax`.

use super::state::Opnd;
use super::{CodeGen, CodeGenError};
use crate::ast::BinOp;
use std::fmt::Write as _;

impl CodeGen {
    pub(super) fn lower_binop(&mut self, op: BinOp) -> Result<(), CodeGenError> {
        let src = self.pop()?;
        let dst = self.pop()?;

        match op {
            BinOp::Plus | BinOp::Minus | BinOp::Times | BinOp::Xor => {
                let mnemonic = match op {
                    BinOp::Plus => "addl",
                    BinOp::Minus => "subl",
                    BinOp::Times => "imull",
                    _ => "xorl",
                };
                if dst.is_mem() {
                    self.op2("movl", &dst, &Opnd::Eax)?;
                    self.op2(mnemonic, &src, &Opnd::Eax)?;
                    self.op2("movl", &Opnd::Eax, &dst)?;
                } else {
                    self.op2(mnemonic, &src, &dst)?;
                }
            }

            BinOp::And | BinOp::Or => {
                // Normalize both operands to 0/1, then combine.
                let mnemonic = if op == BinOp::And { "andl" } else { "orl" };
                self.op2("xorl", &Opnd::Eax, &Opnd::Eax)?;
                self.op2("cmpl", &Opnd::Lit(0), &dst)?;
                self.line("setne\t%al")?;
                self.op2("xorl", &Opnd::Edx, &Opnd::Edx)?;
                self.op2("cmpl", &Opnd::Lit(0), &src)?;
                self.line("setne\t%dl")?;
                self.op2(mnemonic, &Opnd::Edx, &Opnd::Eax)?;
                self.op2("movl", &Opnd::Eax, &dst)?;
            }

            BinOp::Div | BinOp::Mod => {
                self.op2("movl", &dst, &Opnd::Eax)?;
                self.line("cltd")?;
                self.op1("idivl", &src)?;
                let result = if op == BinOp::Div {
                    Opnd::Eax
                } else {
                    Opnd::Edx
                };
                self.op2("movl", &result, &dst)?;
            }

            BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Leq | BinOp::Gt | BinOp::Geq => {
                let suffix = match op {
                    BinOp::Lt => "l",
                    BinOp::Leq => "le",
                    BinOp::Eq => "e",
                    BinOp::Neq => "ne",
                    BinOp::Geq => "ge",
                    _ => "g",
                };
                self.op2("xorl", &Opnd::Eax, &Opnd::Eax)?;
                if src.is_mem() {
                    self.op2("movl", &dst, &Opnd::Edx)?;
                    self.op2("cmpl", &src, &Opnd::Edx)?;
                } else {
                    self.op2("cmpl", &src, &dst)?;
                }
                writeln!(self.output, "\tset{}\t%al", suffix)?;
                self.op2("movl", &Opnd::Eax, &dst)?;
            }
        }

        self.stack.push(dst);
        Ok(())
    }
}
