//! CodeGen state and operand model
//!
//! The lowerer mirrors the runtime operand stack at compile time: every SM
//! push allocates a symbolic operand (a hardware register while they last,
//! then frame slots above the locals), every pop releases one. The mapping
//! is a deterministic function of the stack shape, so any two control-flow
//! paths that reach a join with the same stack depth agree on where each
//! value lives.

use super::CodeGenError;
use crate::sm::Location;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Registers usable for stack values, in allocation order.
pub(super) const REGS: &[&str] = &["%ebx", "%ecx", "%esi", "%edi"];

/// A symbolic operand: where a compile-time stack value lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Opnd {
    /// Hardware register `REGS[i]`.
    Reg(usize),
    /// Frame slot. Non-negative: `-(i+1)*4(%ebp)`, i.e. locals and spill
    /// slots below the saved base pointer. Negative: caller-frame argument
    /// at `8+(-1-i)*4(%ebp)`.
    Stack(i32),
    /// Named memory location (a global or an interned string).
    Mem(String),
    /// Immediate.
    Lit(i32),
    /// Indirect through another operand: `off(opnd)`.
    Ind(i32, Box<Opnd>),
    /// Scratch registers, never allocated to stack values.
    Eax,
    Edx,
}

impl Opnd {
    /// Whether the operand is a memory reference. x86 allows at most one
    /// memory operand per instruction; `CodeGen::mov` and the binop lowering
    /// route through `%eax` when both sides are memory.
    pub(super) fn is_mem(&self) -> bool {
        matches!(self, Opnd::Stack(_) | Opnd::Mem(_) | Opnd::Ind(_, _))
    }
}

impl fmt::Display for Opnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opnd::Reg(i) => f.write_str(REGS[*i]),
            Opnd::Stack(i) => {
                if *i >= 0 {
                    write!(f, "-{}(%ebp)", (i + 1) * 4)
                } else {
                    write!(f, "{}(%ebp)", 8 + (-1 - i) * 4)
                }
            }
            Opnd::Mem(name) => f.write_str(name),
            Opnd::Lit(n) => write!(f, "${}", n),
            Opnd::Ind(off, inner) => write!(f, "{}({})", off, inner),
            Opnd::Eax => f.write_str("%eax"),
            Opnd::Edx => f.write_str("%edx"),
        }
    }
}

pub struct CodeGen {
    /// Text-section body, appended to as instructions are lowered.
    pub(super) output: String,
    /// The symbolic operand stack, top last.
    pub(super) stack: Vec<Opnd>,
    /// High-water mark of frame slots used by the current function,
    /// locals included.
    pub(super) stack_slots: usize,
    /// Global data slots, ordered for deterministic emission.
    pub(super) globals: BTreeSet<String>,
    /// Escaped string literals in interning order; literal k is `string_k`.
    pub(super) strings: Vec<String>,
    pub(super) string_index: HashMap<String, usize>,
    /// Set after an unconditional transfer: the current symbolic stack is
    /// dead and the next label re-establishes it from `stack_map`.
    pub(super) barrier: bool,
    /// Symbolic stack snapshots recorded at conditional-jump targets.
    pub(super) stack_map: HashMap<String, Vec<Opnd>>,
    pub(super) fun_label: String,
    pub(super) n_locals: usize,
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGen {
    pub fn new() -> Self {
        CodeGen {
            output: String::new(),
            stack: Vec::new(),
            stack_slots: 0,
            globals: BTreeSet::new(),
            strings: Vec::new(),
            string_index: HashMap::new(),
            barrier: false,
            stack_map: HashMap::new(),
            fun_label: String::new(),
            n_locals: 0,
        }
    }

    /// Pick the slot for a fresh stack value.
    ///
    /// The first four values live in `ebx, ecx, esi, edi`; after that they
    /// spill to frame slots just above the locals. The choice depends only
    /// on the current top of stack, which keeps the assignment in-order and
    /// reproducible.
    pub(super) fn allocate(&mut self) -> Opnd {
        let opnd = match self.stack.last() {
            None => Opnd::Reg(0),
            Some(Opnd::Stack(n)) if *n >= 0 => Opnd::Stack(n + 1),
            Some(Opnd::Reg(r)) if r + 1 < REGS.len() => Opnd::Reg(r + 1),
            Some(Opnd::Reg(_)) => Opnd::Stack(self.n_locals as i32),
            Some(_) => Opnd::Stack(0),
        };
        if let Opnd::Stack(n) = &opnd {
            if *n >= 0 {
                self.stack_slots = self.stack_slots.max((*n + 1) as usize);
            }
        }
        opnd
    }

    /// Allocate a slot and push it onto the symbolic stack.
    pub(super) fn push(&mut self) -> Opnd {
        let opnd = self.allocate();
        self.stack.push(opnd.clone());
        opnd
    }

    pub(super) fn pop(&mut self) -> Result<Opnd, CodeGenError> {
        self.stack
            .pop()
            .ok_or_else(|| CodeGenError::Logic("symbolic stack underflow".to_string()))
    }

    pub(super) fn peek(&self) -> Result<Opnd, CodeGenError> {
        self.stack
            .last()
            .cloned()
            .ok_or_else(|| CodeGenError::Logic("symbolic stack underflow".to_string()))
    }

    /// Registers holding values that survive a call consuming the top `n`
    /// stack entries. These are caller-saved around the call.
    pub(super) fn live_registers(&self, n: usize) -> Vec<Opnd> {
        let keep = self.stack.len().saturating_sub(n);
        self.stack[..keep]
            .iter()
            .filter(|o| matches!(o, Opnd::Reg(_)))
            .cloned()
            .collect()
    }

    /// The operand a resolved location denotes.
    pub(super) fn loc(&self, location: &Location) -> Result<Opnd, CodeGenError> {
        match location {
            Location::Arg(i) => Ok(Opnd::Stack(-(*i as i32) - 1)),
            Location::Local(i, _) => Ok(Opnd::Stack(*i as i32)),
            Location::Global(name, _) => Ok(Opnd::Mem(format!("global_{}", name))),
            Location::Fun(label, _) => Err(CodeGenError::Logic(format!(
                "function {} has no data location",
                label
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_display() {
        assert_eq!(Opnd::Reg(0).to_string(), "%ebx");
        assert_eq!(Opnd::Reg(3).to_string(), "%edi");
        assert_eq!(Opnd::Stack(0).to_string(), "-4(%ebp)");
        assert_eq!(Opnd::Stack(2).to_string(), "-12(%ebp)");
        assert_eq!(Opnd::Stack(-1).to_string(), "8(%ebp)");
        assert_eq!(Opnd::Stack(-2).to_string(), "12(%ebp)");
        assert_eq!(Opnd::Lit(-7).to_string(), "$-7");
        assert_eq!(Opnd::Mem("global_x".to_string()).to_string(), "global_x");
        assert_eq!(
            Opnd::Ind(0, Box::new(Opnd::Edx)).to_string(),
            "0(%edx)"
        );
    }

    #[test]
    fn test_allocation_walks_registers_then_spills() {
        let mut cg = CodeGen::new();
        cg.n_locals = 2;
        assert_eq!(cg.push(), Opnd::Reg(0));
        assert_eq!(cg.push(), Opnd::Reg(1));
        assert_eq!(cg.push(), Opnd::Reg(2));
        assert_eq!(cg.push(), Opnd::Reg(3));
        // Registers exhausted: spill just above the locals.
        assert_eq!(cg.push(), Opnd::Stack(2));
        assert_eq!(cg.push(), Opnd::Stack(3));
        assert_eq!(cg.stack_slots, 4);
    }

    #[test]
    fn test_allocation_reuses_freed_registers() {
        let mut cg = CodeGen::new();
        cg.push();
        cg.push();
        cg.pop().unwrap();
        assert_eq!(cg.push(), Opnd::Reg(1));
    }

    #[test]
    fn test_arg_locations() {
        let cg = CodeGen::new();
        let arg0 = cg.loc(&Location::Arg(0)).unwrap();
        let arg1 = cg.loc(&Location::Arg(1)).unwrap();
        // the leftmost argument sits at the lowest address
        assert_eq!(arg0.to_string(), "8(%ebp)");
        assert_eq!(arg1.to_string(), "12(%ebp)");
    }

    #[test]
    fn test_live_registers_excludes_consumed_args() {
        let mut cg = CodeGen::new();
        cg.push(); // Reg(0) survives
        cg.push(); // Reg(1), consumed by the call below
        cg.push(); // Reg(2), consumed
        assert_eq!(cg.live_registers(2), vec![Opnd::Reg(0)]);
        assert_eq!(cg.live_registers(0).len(), 3);
    }
}
