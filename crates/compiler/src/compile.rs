//! AST to stack-machine compilation
//!
//! The compiler threads a continuation label through the traversal: a
//! subtree whose fall-through would otherwise need its own end label may
//! instead jump straight to the enclosing one. `compile_expr` returns
//! whether the subtree actually used the label it was given; the caller
//! emits the `LABEL` only in that case, so no dead labels and no
//! `JMP L / L:` pairs survive.
//!
//! Nested functions are not compiled in place. Each `fun` definition is
//! pushed onto a pending queue together with a snapshot of the symbol state
//! visible at its definition site, and the queue is drained at the top
//! level until no new functions appear. `main` is simply the first entry of
//! that queue, wrapping the whole unit.

use crate::ast::{Definition, Expr, Name};
use crate::builtins;
use crate::sm::{Cond, Insn, Location};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// A semantic error: unresolved name or name-kind mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
}

impl CompileError {
    fn bad_name(name: &Name, kind: &str) -> Self {
        let mut message = format!("the name \"{}\" does not designate a {}", name.id, kind);
        if let Some(span) = name.span {
            message.push_str(&format!(" at {}", span));
        }
        CompileError { message }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CompileError {}

/// Lexical symbol state: a stack of scopes, innermost last. Cloneable so a
/// pending function can capture the bindings visible at its definition site.
#[derive(Debug, Clone, Default)]
struct SymState {
    scopes: Vec<HashMap<String, Location>>,
}

impl SymState {
    fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn leave_scope(&mut self) {
        self.scopes.pop();
    }

    fn add_name(&mut self, name: &str, loc: Location) {
        self.scopes
            .last_mut()
            .expect("no open scope")
            .insert(name.to_string(), loc);
    }

    fn resolve(&self, name: &str) -> Option<Location> {
        for scope in self.scopes.iter().rev() {
            if let Some(loc) = scope.get(name) {
                return Some(loc.clone());
            }
        }
        // Builtins form the outermost, implicit scope.
        builtins::lookup(name).map(|(label, arity)| Location::Fun(label.to_string(), arity))
    }
}

/// A hoisted function waiting to be compiled.
struct PendingFun {
    label: String,
    args: Vec<Name>,
    body: Expr,
    sym: SymState,
}

/// Compilation state threaded through the traversal.
///
/// Scope state is saved and restored at scope boundaries, which preserves
/// the binding discipline: a subtree sees exactly the names its lexical
/// ancestors established, nothing that was defined after it was captured.
pub struct Compiler {
    next_label: usize,
    sym: SymState,
    n_locals: usize,
    pending: VecDeque<PendingFun>,
}

/// Scope depth at which mutable names become globals: the builtin scope is
/// implicit, so depth 2 is `main`'s argument scope plus the unit scope.
const TOP_LEVEL_DEPTH: usize = 2;

impl Compiler {
    fn new() -> Self {
        Compiler {
            next_label: 0,
            sym: SymState::default(),
            n_locals: 0,
            pending: VecDeque::new(),
        }
    }

    fn fresh_label(&mut self) -> String {
        let l = format!("L{}", self.next_label);
        self.next_label += 1;
        l
    }

    fn at_top_level(&self) -> bool {
        self.sym.scopes.len() == TOP_LEVEL_DEPTH
    }

    // -- name lookup -------------------------------------------------------

    /// Resolve a name to a readable value slot (mutable or not).
    fn lookup_val(&self, name: &Name) -> Result<Location, CompileError> {
        match self.sym.resolve(&name.id) {
            Some(Location::Fun(_, _)) | None => Err(CompileError::bad_name(name, "value")),
            Some(loc) => Ok(loc),
        }
    }

    /// Resolve a name to a mutable slot; rejects `val` bindings.
    fn lookup_var(&self, name: &Name) -> Result<Location, CompileError> {
        match self.sym.resolve(&name.id) {
            Some(loc @ (Location::Arg(_) | Location::Local(_, true) | Location::Global(_, true))) => {
                Ok(loc)
            }
            _ => Err(CompileError::bad_name(name, "variable")),
        }
    }

    /// Resolve a name to a callable.
    fn lookup_fun(&self, name: &Name) -> Result<(String, usize), CompileError> {
        match self.sym.resolve(&name.id) {
            Some(Location::Fun(label, arity)) => Ok((label, arity)),
            _ => Err(CompileError::bad_name(name, "function")),
        }
    }

    // -- definitions -------------------------------------------------------

    /// Bind a variable in the current scope. Returns the global slot name
    /// when the binding lands at the top level.
    fn add_var(&mut self, name: &Name, mutable: bool) -> Option<String> {
        if self.at_top_level() {
            self.sym
                .add_name(&name.id, Location::Global(name.id.clone(), mutable));
            Some(name.id.clone())
        } else {
            self.sym
                .add_name(&name.id, Location::Local(self.n_locals, mutable));
            self.n_locals += 1;
            None
        }
    }

    /// Allocate a label for a function definition and bind the name.
    fn add_fun(&mut self, name: &Name, arity: usize) -> String {
        let label = if self.at_top_level() {
            format!("L{}", name.id)
        } else {
            let id = self.next_label;
            self.next_label += 1;
            format!("L{}_{}", name.id, id)
        };
        self.sym
            .add_name(&name.id, Location::Fun(label.clone(), arity));
        label
    }

    /// Queue a function body for compilation, capturing the current symbol
    /// state so its lookups see its definition environment.
    fn remember_fun(&mut self, label: String, args: Vec<Name>, body: Expr) {
        let sym = self.sym.clone();
        self.pending.push_back(PendingFun {
            label,
            args,
            body,
            sym,
        });
    }

    // -- compilation -------------------------------------------------------

    /// Compile one pending function: `LABEL f; BEGIN f a l; body; END`.
    /// The local count is only known after the body is compiled, so the body
    /// goes to a side buffer first.
    fn compile_fun(&mut self, fun: PendingFun, code: &mut Vec<Insn>) -> Result<(), CompileError> {
        self.sym = fun.sym;
        self.n_locals = 0;
        self.sym.enter_scope();
        for (i, arg) in fun.args.iter().enumerate() {
            self.sym.add_name(&arg.id, Location::Arg(i));
        }

        let end_label = self.fresh_label();
        let mut body = Vec::new();
        let used = self.compile_expr(&end_label, &fun.body, &mut body)?;

        self.sym.leave_scope();

        code.push(Insn::Label(fun.label.clone()));
        code.push(Insn::Begin(fun.label, fun.args.len(), self.n_locals));
        code.append(&mut body);
        if used {
            code.push(Insn::Label(end_label));
        }
        code.push(Insn::End);
        Ok(())
    }

    /// Compile a subtree in non-tail position: give it a fresh continuation
    /// label and emit that label only if the subtree jumped to it.
    fn compile_fresh(&mut self, e: &Expr, code: &mut Vec<Insn>) -> Result<(), CompileError> {
        let label = self.fresh_label();
        if self.compile_expr(&label, e, code)? {
            code.push(Insn::Label(label));
        }
        Ok(())
    }

    /// Compile `e`, appending instructions to `code`. `lab` is the label the
    /// subtree's fall-through continuation lives at; the return value tells
    /// the caller whether the subtree jumped to it.
    fn compile_expr(
        &mut self,
        lab: &str,
        e: &Expr,
        code: &mut Vec<Insn>,
    ) -> Result<bool, CompileError> {
        match e {
            Expr::Skip => Ok(false),

            Expr::Const(n) => {
                code.push(Insn::Const(*n));
                Ok(false)
            }

            Expr::String(s) => {
                code.push(Insn::String(s.clone()));
                Ok(false)
            }

            Expr::Var(name) => {
                code.push(Insn::Ld(self.lookup_val(name)?));
                Ok(false)
            }

            Expr::Ref(name) => {
                code.push(Insn::Lda(self.lookup_var(name)?));
                Ok(false)
            }

            Expr::Binop(op, a, b) => {
                self.compile_fresh(a, code)?;
                self.compile_fresh(b, code)?;
                code.push(Insn::Binop(*op));
                Ok(false)
            }

            Expr::Set(name, value) => {
                self.compile_fresh(value, code)?;
                code.push(Insn::St(self.lookup_var(name)?));
                Ok(false)
            }

            Expr::Assn(lhs, rhs) => {
                self.compile_fresh(lhs, code)?;
                self.compile_fresh(rhs, code)?;
                code.push(match **lhs {
                    Expr::ElemRef(_, _) => Insn::Sta,
                    _ => Insn::Sti,
                });
                Ok(false)
            }

            Expr::Seq(a, b) => {
                self.compile_fresh(a, code)?;
                self.compile_expr(lab, b, code)
            }

            Expr::Ignore(inner) => {
                self.compile_fresh(inner, code)?;
                code.push(Insn::Drop);
                Ok(false)
            }

            Expr::If(cond, then_branch, else_branch) => {
                let else_label = self.fresh_label();
                self.compile_fresh(cond, code)?;
                code.push(Insn::CJmp(Cond::Zero, else_label.clone()));
                self.compile_fresh(then_branch, code)?;
                code.push(Insn::Jmp(lab.to_string()));
                code.push(Insn::Label(else_label));
                self.compile_expr(lab, else_branch, code)?;
                Ok(true)
            }

            Expr::While(cond, body) => {
                let cond_label = self.fresh_label();
                let body_label = self.fresh_label();
                code.push(Insn::Jmp(cond_label.clone()));
                code.push(Insn::Label(body_label.clone()));
                self.compile_expr(&cond_label, body, code)?;
                code.push(Insn::Label(cond_label));
                self.compile_fresh(cond, code)?;
                code.push(Insn::CJmp(Cond::NonZero, body_label));
                Ok(false)
            }

            Expr::DoWhile(body, cond) => {
                let body_label = self.fresh_label();
                code.push(Insn::Label(body_label.clone()));
                self.compile_fresh(body, code)?;
                self.compile_fresh(cond, code)?;
                code.push(Insn::CJmp(Cond::NonZero, body_label));
                Ok(false)
            }

            Expr::Call(name, args) => {
                let (label, _arity) = self.lookup_fun(name)?;
                self.compile_args(args, code)?;
                code.push(if label.starts_with('$') {
                    Insn::Builtin(label[1..].to_string(), args.len())
                } else {
                    Insn::Call(label, args.len())
                });
                Ok(false)
            }

            Expr::Builtin(name, args) => {
                self.compile_args(args, code)?;
                let name = name.strip_prefix('$').unwrap_or(name.as_str());
                code.push(Insn::Builtin(name.to_string(), args.len()));
                Ok(false)
            }

            Expr::Array(items) => {
                self.compile_args(items, code)?;
                code.push(Insn::Array(items.len()));
                Ok(false)
            }

            Expr::Sexp(tag, items) => {
                self.compile_args(items, code)?;
                code.push(Insn::Sexp(tag.clone(), items.len()));
                Ok(false)
            }

            Expr::Elem(container, index) => {
                self.compile_fresh(container, code)?;
                self.compile_fresh(index, code)?;
                code.push(Insn::Elem);
                Ok(false)
            }

            Expr::ElemRef(container, index) => {
                // The container/index pair itself is the reference.
                self.compile_fresh(container, code)?;
                self.compile_fresh(index, code)?;
                Ok(false)
            }

            Expr::Scope(defs, body) => {
                self.sym.enter_scope();

                let mut prelude = Vec::new();
                let mut functions = Vec::new();
                for def in defs {
                    match def {
                        Definition::Vars(names) => {
                            for name in names {
                                if let Some(global) = self.add_var(name, true) {
                                    prelude.push(Insn::Global(global));
                                }
                            }
                        }
                        Definition::Vals(names) => {
                            for name in names {
                                if let Some(global) = self.add_var(name, false) {
                                    prelude.push(Insn::Global(global));
                                }
                            }
                        }
                        Definition::Fun { name, args, body } => {
                            let label = self.add_fun(name, args.len());
                            functions.push((label, args.clone(), body.clone()));
                        }
                    }
                }
                // Second pass: capture the symbol state only after every
                // definition of the scope is bound, so functions can refer
                // to each other regardless of order.
                for (label, args, body) in functions {
                    self.remember_fun(label, args, body);
                }

                code.extend(prelude);
                let used = self.compile_expr(lab, body, code);
                self.sym.leave_scope();
                used
            }
        }
    }

    /// Evaluate call/constructor arguments right to left, leaving the
    /// leftmost argument on top of the stack.
    fn compile_args(&mut self, args: &[Expr], code: &mut Vec<Insn>) -> Result<(), CompileError> {
        for arg in args.iter().rev() {
            self.compile_fresh(arg, code)?;
        }
        Ok(())
    }
}

/// Compile a unit to a stack-machine program. The unit becomes the body of a
/// synthetic zero-argument `main`; hoisted functions follow it in definition
/// order.
pub fn compile_unit(unit: &Expr) -> Result<Vec<Insn>, CompileError> {
    let mut compiler = Compiler::new();
    compiler.pending.push_back(PendingFun {
        label: "main".to_string(),
        args: Vec::new(),
        body: unit.clone(),
        sym: SymState::default(),
    });

    let mut code = Vec::new();
    while let Some(fun) = compiler.pending.pop_front() {
        compiler.compile_fun(fun, &mut code)?;
    }
    Ok(code)
}
