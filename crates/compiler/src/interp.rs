//! Stack-machine interpreter
//!
//! Direct execution of the SM program, used as the semantic oracle: for any
//! accepted unit, interpreting the SM code and running the generated
//! executable must produce the same output. Containers have reference
//! semantics (stores through one alias are visible through another), matching
//! the boxed values of the runtime library.

use crate::ast::BinOp;
use crate::sm::{Cond, Insn, Location};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Str(Rc<RefCell<Vec<u8>>>),
    Arr(Rc<RefCell<Vec<Value>>>),
    Sexp(String, Rc<RefCell<Vec<Value>>>),
    /// Address of a mutable slot, produced by `LDA`.
    Ref(Target),
}

/// What a reference points at. Frame-relative targets carry the index of
/// their frame at the time the address was taken.
#[derive(Debug, Clone)]
pub enum Target {
    Global(String),
    Local(usize, usize),
    Arg(usize, usize),
}

impl Value {
    fn int(&self) -> Result<i32, String> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(format!("expected an integer, got {}", other.kind())),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "an integer",
            Value::Str(_) => "a string",
            Value::Arr(_) => "an array",
            Value::Sexp(_, _) => "an s-expression",
            Value::Ref(_) => "a reference",
        }
    }
}

struct Frame {
    args: Vec<Value>,
    locals: Vec<Value>,
}

/// Execute a program against a fixed input sequence; returns the values
/// written by the program in order.
pub fn run(prog: &[Insn], input: &[i32]) -> Result<Vec<i32>, String> {
    let labels: HashMap<&str, usize> = prog
        .iter()
        .enumerate()
        .filter_map(|(i, insn)| match insn {
            Insn::Label(l) => Some((l.as_str(), i)),
            _ => None,
        })
        .collect();
    let resolve = |l: &str| {
        labels
            .get(l)
            .copied()
            .ok_or_else(|| format!("jump to undefined label {}", l))
    };

    let mut stack: Vec<Value> = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();
    let mut rstack: Vec<usize> = Vec::new();
    let mut globals: HashMap<String, Value> = HashMap::new();
    let mut input = input.iter();
    let mut output = Vec::new();

    let mut pc = 0usize;
    loop {
        let insn = prog
            .get(pc)
            .ok_or_else(|| "program ran off the end".to_string())?;
        pc += 1;

        match insn {
            Insn::Label(_) => {}

            // A declared global starts as zero, like its .int 0 data slot.
            Insn::Global(name) => {
                globals.entry(name.clone()).or_insert(Value::Int(0));
            }

            Insn::Const(n) => stack.push(Value::Int(*n)),

            Insn::String(s) => {
                stack.push(Value::Str(Rc::new(RefCell::new(s.as_bytes().to_vec()))));
            }

            Insn::Array(n) => {
                let mut items = Vec::with_capacity(*n);
                for _ in 0..*n {
                    items.push(pop_val(&mut stack)?);
                }
                stack.push(Value::Arr(Rc::new(RefCell::new(items))));
            }

            Insn::Sexp(tag, n) => {
                let mut items = Vec::with_capacity(*n);
                for _ in 0..*n {
                    items.push(pop_val(&mut stack)?);
                }
                stack.push(Value::Sexp(tag.clone(), Rc::new(RefCell::new(items))));
            }

            Insn::Elem => {
                let index = pop_val(&mut stack)?.int()?;
                let container = pop_val(&mut stack)?;
                stack.push(index_container(&container, index)?);
            }

            Insn::Sta => {
                let value = pop_val(&mut stack)?;
                let index = pop_val(&mut stack)?.int()?;
                let container = pop_val(&mut stack)?;
                store_indexed(&container, index, value.clone())?;
                stack.push(value);
            }

            Insn::Dup => {
                let top = stack
                    .last()
                    .cloned()
                    .ok_or_else(|| "operand stack underflow".to_string())?;
                stack.push(top);
            }

            Insn::Drop => {
                pop_val(&mut stack)?;
            }

            Insn::Ld(loc) => {
                let value = match loc {
                    Location::Arg(i) => current(&frames)?.args[*i].clone(),
                    Location::Local(i, _) => current(&frames)?.locals[*i].clone(),
                    Location::Global(name, _) => globals
                        .get(name)
                        .cloned()
                        .ok_or_else(|| format!("undeclared global {}", name))?,
                    Location::Fun(label, _) => {
                        return Err(format!("cannot load a function ({})", label));
                    }
                };
                stack.push(value);
            }

            Insn::Lda(loc) => {
                let frame = frames.len().saturating_sub(1);
                let target = match loc {
                    Location::Arg(i) => Target::Arg(frame, *i),
                    Location::Local(i, _) => Target::Local(frame, *i),
                    Location::Global(name, _) => Target::Global(name.clone()),
                    Location::Fun(label, _) => {
                        return Err(format!("cannot take the address of a function ({})", label));
                    }
                };
                stack.push(Value::Ref(target));
            }

            Insn::St(loc) => {
                let value = stack
                    .last()
                    .cloned()
                    .ok_or_else(|| "operand stack underflow".to_string())?;
                match loc {
                    Location::Arg(i) => current_mut(&mut frames)?.args[*i] = value,
                    Location::Local(i, _) => current_mut(&mut frames)?.locals[*i] = value,
                    Location::Global(name, _) => {
                        globals.insert(name.clone(), value);
                    }
                    Location::Fun(label, _) => {
                        return Err(format!("cannot store into a function ({})", label));
                    }
                }
            }

            Insn::Sti => {
                let value = pop_val(&mut stack)?;
                let target = match pop_val(&mut stack)? {
                    Value::Ref(t) => t,
                    other => return Err(format!("STI through {}", other.kind())),
                };
                match target {
                    Target::Global(name) => {
                        globals.insert(name, value.clone());
                    }
                    Target::Local(frame, slot) => frames[frame].locals[slot] = value.clone(),
                    Target::Arg(frame, slot) => frames[frame].args[slot] = value.clone(),
                }
                stack.push(value);
            }

            Insn::Binop(op) => {
                let rhs = pop_val(&mut stack)?.int()?;
                let lhs = pop_val(&mut stack)?.int()?;
                stack.push(Value::Int(eval_binop(*op, lhs, rhs)?));
            }

            Insn::Jmp(l) => pc = resolve(l)?,

            Insn::CJmp(cond, l) => {
                let v = pop_val(&mut stack)?.int()?;
                let taken = match cond {
                    Cond::Zero => v == 0,
                    Cond::NonZero => v != 0,
                };
                if taken {
                    pc = resolve(l)?;
                }
            }

            Insn::Call(label, _) => {
                rstack.push(pc);
                pc = resolve(label)?;
            }

            Insn::Begin(_, n_args, n_locals) => {
                let mut args = Vec::with_capacity(*n_args);
                for _ in 0..*n_args {
                    args.push(pop_val(&mut stack)?);
                }
                frames.push(Frame {
                    args,
                    locals: vec![Value::Int(0); *n_locals],
                });
            }

            Insn::End => {
                if rstack.is_empty() {
                    return Ok(output);
                }
                let result = pop_val(&mut stack)?;
                frames.pop();
                pc = rstack.pop().unwrap();
                stack.push(result);
            }

            Insn::Builtin(name, n) => {
                let mut args = Vec::with_capacity(*n);
                for _ in 0..*n {
                    args.push(pop_val(&mut stack)?);
                }
                let result = match (name.as_str(), args.as_slice()) {
                    ("read", []) => {
                        let n = input.next().ok_or_else(|| "input exhausted".to_string())?;
                        Value::Int(*n)
                    }
                    ("write", [v]) => {
                        output.push(v.int()?);
                        Value::Int(0)
                    }
                    ("length", [v]) => {
                        let len = match v {
                            Value::Str(bytes) => bytes.borrow().len(),
                            Value::Arr(items) => items.borrow().len(),
                            Value::Sexp(_, items) => items.borrow().len(),
                            other => {
                                return Err(format!("length of {}", other.kind()));
                            }
                        };
                        Value::Int(len as i32)
                    }
                    _ => {
                        return Err(format!("unknown builtin {} of arity {}", name, n));
                    }
                };
                stack.push(result);
            }
        }
    }
}

fn pop_val(stack: &mut Vec<Value>) -> Result<Value, String> {
    stack
        .pop()
        .ok_or_else(|| "operand stack underflow".to_string())
}

fn current<'a>(frames: &'a [Frame]) -> Result<&'a Frame, String> {
    frames.last().ok_or_else(|| "no active frame".to_string())
}

fn current_mut<'a>(frames: &'a mut Vec<Frame>) -> Result<&'a mut Frame, String> {
    frames
        .last_mut()
        .ok_or_else(|| "no active frame".to_string())
}

fn check_index(len: usize, index: i32) -> Result<usize, String> {
    if index < 0 || index as usize >= len {
        return Err(format!("index {} out of bounds for length {}", index, len));
    }
    Ok(index as usize)
}

fn index_container(container: &Value, index: i32) -> Result<Value, String> {
    match container {
        Value::Arr(items) | Value::Sexp(_, items) => {
            let items = items.borrow();
            Ok(items[check_index(items.len(), index)?].clone())
        }
        Value::Str(bytes) => {
            let bytes = bytes.borrow();
            Ok(Value::Int(i32::from(bytes[check_index(bytes.len(), index)?])))
        }
        other => Err(format!("cannot index into {}", other.kind())),
    }
}

fn store_indexed(container: &Value, index: i32, value: Value) -> Result<(), String> {
    match container {
        Value::Arr(items) | Value::Sexp(_, items) => {
            let mut items = items.borrow_mut();
            let i = check_index(items.len(), index)?;
            items[i] = value;
            Ok(())
        }
        Value::Str(bytes) => {
            let mut bytes = bytes.borrow_mut();
            let i = check_index(bytes.len(), index)?;
            bytes[i] = value.int()? as u8;
            Ok(())
        }
        other => Err(format!("cannot store into {}", other.kind())),
    }
}

fn eval_binop(op: BinOp, lhs: i32, rhs: i32) -> Result<i32, String> {
    Ok(match op {
        BinOp::Plus => lhs.wrapping_add(rhs),
        BinOp::Minus => lhs.wrapping_sub(rhs),
        BinOp::Times => lhs.wrapping_mul(rhs),
        BinOp::Div => {
            if rhs == 0 {
                return Err("division by zero".to_string());
            }
            lhs.wrapping_div(rhs)
        }
        BinOp::Mod => {
            if rhs == 0 {
                return Err("division by zero".to_string());
            }
            lhs.wrapping_rem(rhs)
        }
        BinOp::Eq => i32::from(lhs == rhs),
        BinOp::Neq => i32::from(lhs != rhs),
        BinOp::Lt => i32::from(lhs < rhs),
        BinOp::Leq => i32::from(lhs <= rhs),
        BinOp::Gt => i32::from(lhs > rhs),
        BinOp::Geq => i32::from(lhs >= rhs),
        BinOp::And => i32::from(lhs != 0 && rhs != 0),
        BinOp::Or => i32::from(lhs != 0 || rhs != 0),
        BinOp::Xor => lhs ^ rhs,
    })
}
