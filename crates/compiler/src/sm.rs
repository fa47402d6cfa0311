//! Stack-machine intermediate representation
//!
//! A compiled program is a flat `Vec<Insn>`: a linear instruction stream
//! with labels. The AST compiler in `compile.rs` produces it, the
//! interpreter in `interp.rs` executes it, and `codegen` lowers it to x86.

use crate::ast::BinOp;
use std::collections::HashSet;
use std::fmt;

/// Resolution of a source name to a storage class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// i-th argument of the current function.
    Arg(usize),
    /// i-th local slot of the current function; the flag records whether the
    /// binding is mutable (`var`) or not (`val`).
    Local(usize, bool),
    /// Named global with a mutability flag.
    Global(String, bool),
    /// A callable: function label and arity. Builtin labels start with `$`.
    Fun(String, usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Arg(i) => write!(f, "arg[{}]", i),
            Location::Local(i, _) => write!(f, "loc[{}]", i),
            Location::Global(name, _) => write!(f, "global {}", name),
            Location::Fun(label, arity) => write!(f, "fun {}/{}", label, arity),
        }
    }
}

/// Condition of a conditional jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Zero,
    NonZero,
}

impl Cond {
    /// The x86 condition-code suffix (`jz` / `jnz`).
    pub fn suffix(self) -> &'static str {
        match self {
            Cond::Zero => "z",
            Cond::NonZero => "nz",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    Const(i32),
    Binop(BinOp),
    String(String),
    Array(usize),
    Sexp(String, usize),
    /// Index a container: pops index and container, pushes the element.
    Elem,
    /// Indexed store: pops value, index, container; stores; pushes the value.
    Sta,
    Dup,
    Drop,
    Ld(Location),
    /// Push the address of a location (for store-through-reference).
    Lda(Location),
    /// Store the top of stack into a location; the value stays on the stack.
    St(Location),
    /// Store through a reference: pops value and address, pushes the value.
    Sti,
    /// Declare a named global; emitted in scope preludes, produces no code.
    Global(String),
    Label(String),
    Jmp(String),
    CJmp(Cond, String),
    Call(String, usize),
    /// Function prologue marker: name, argument count, local count.
    Begin(String, usize, usize),
    End,
    Builtin(String, usize),
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::Const(n) => write!(f, "CONST {}", n),
            Insn::Binop(op) => write!(f, "BINOP {}", op),
            Insn::String(s) => write!(f, "STRING {:?}", s),
            Insn::Array(n) => write!(f, "ARRAY {}", n),
            Insn::Sexp(tag, n) => write!(f, "SEXP {} {}", tag, n),
            Insn::Elem => write!(f, "ELEM"),
            Insn::Sta => write!(f, "STA"),
            Insn::Dup => write!(f, "DUP"),
            Insn::Drop => write!(f, "DROP"),
            Insn::Ld(loc) => write!(f, "LD {}", loc),
            Insn::Lda(loc) => write!(f, "LDA {}", loc),
            Insn::St(loc) => write!(f, "ST {}", loc),
            Insn::Sti => write!(f, "STI"),
            Insn::Global(name) => write!(f, "GLOBAL {}", name),
            Insn::Label(l) => write!(f, "LABEL {}", l),
            Insn::Jmp(l) => write!(f, "JMP {}", l),
            Insn::CJmp(c, l) => write!(f, "CJMP {} {}", c.suffix(), l),
            Insn::Call(label, n) => write!(f, "CALL {} {}", label, n),
            Insn::Begin(name, args, locals) => {
                write!(f, "BEGIN {} {} {}", name, args, locals)
            }
            Insn::End => write!(f, "END"),
            Insn::Builtin(name, n) => write!(f, "BUILTIN {} {}", name, n),
        }
    }
}

/// Structural well-formedness of a program: every jump and call target has a
/// matching label, and every function body is bracketed as
/// `LABEL f; BEGIN f …; …; END`.
pub fn check(prog: &[Insn]) -> Result<(), String> {
    let labels: HashSet<&str> = prog
        .iter()
        .filter_map(|i| match i {
            Insn::Label(l) => Some(l.as_str()),
            _ => None,
        })
        .collect();

    let mut in_function = false;
    let mut prev_label: Option<&str> = None;
    for insn in prog {
        match insn {
            Insn::Jmp(l) | Insn::CJmp(_, l) => {
                if !labels.contains(l.as_str()) {
                    return Err(format!("jump to undefined label {}", l));
                }
            }
            Insn::Call(label, _) => {
                if !labels.contains(label.as_str()) {
                    return Err(format!("call to undefined function {}", label));
                }
            }
            Insn::Begin(name, _, _) => {
                if in_function {
                    return Err(format!("BEGIN {} inside another function", name));
                }
                if prev_label != Some(name.as_str()) {
                    return Err(format!("BEGIN {} is not preceded by its label", name));
                }
                in_function = true;
            }
            Insn::End => {
                if !in_function {
                    return Err("END outside of a function".to_string());
                }
                in_function = false;
            }
            _ => {}
        }
        prev_label = match insn {
            Insn::Label(l) => Some(l.as_str()),
            _ => None,
        };
    }
    if in_function {
        return Err("unterminated function at end of program".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Insn::Const(42).to_string(), "CONST 42");
        assert_eq!(Insn::Binop(BinOp::Leq).to_string(), "BINOP <=");
        assert_eq!(
            Insn::CJmp(Cond::Zero, "L2".to_string()).to_string(),
            "CJMP z L2"
        );
        assert_eq!(
            Insn::Ld(Location::Local(1, true)).to_string(),
            "LD loc[1]"
        );
        assert_eq!(
            Insn::Begin("main".to_string(), 0, 2).to_string(),
            "BEGIN main 0 2"
        );
        assert_eq!(Insn::String("a\"b".to_string()).to_string(), "STRING \"a\\\"b\"");
    }

    #[test]
    fn test_check_accepts_minimal_program() {
        let prog = vec![
            Insn::Label("main".to_string()),
            Insn::Begin("main".to_string(), 0, 0),
            Insn::End,
        ];
        assert!(check(&prog).is_ok());
    }

    #[test]
    fn test_check_rejects_dangling_jump() {
        let prog = vec![
            Insn::Label("main".to_string()),
            Insn::Begin("main".to_string(), 0, 0),
            Insn::Jmp("L7".to_string()),
            Insn::End,
        ];
        assert!(check(&prog).unwrap_err().contains("L7"));
    }

    #[test]
    fn test_check_rejects_unlabelled_begin() {
        let prog = vec![Insn::Begin("main".to_string(), 0, 0), Insn::End];
        assert!(check(&prog).is_err());
    }
}
