//! x86 (32-bit) code generation
//!
//! Lowers the stack-machine program to textual AT&T-syntax assembly, to be
//! assembled and linked against the runtime library by the driver.
//!
//! # Key Concepts
//!
//! ## Symbolic stack
//!
//! There is no register allocator. Instead the generator mirrors the
//! operand stack at compile time: each slot of the mirror is annotated with
//! the x86 operand holding it (`ebx, ecx, esi, edi` in order, then frame
//! slots above the locals). Allocation depends only on the current top of
//! the mirror, so it is deterministic and agrees across control-flow paths
//! of equal depth. See `state.rs`.
//!
//! ## Barrier and stack map
//!
//! A conditional jump records the symbolic stack it jumps with; after an
//! unconditional transfer the current mirror is dead (`barrier`), and the
//! next label restores the recorded snapshot. On fall-through the snapshot
//! is ignored; both paths agree by construction.
//!
//! ## Frames
//!
//! `BEGIN` emits the prologue; the frame size is the assembler symbol
//! `<f>_SIZE`, defined by a `.set` next to the epilogue once the high-water
//! mark of locals plus spill slots is known. Arguments live at
//! `8+4i(%ebp)`, leftmost lowest, cdecl.
//!
//! # Module Structure
//!
//! - `state.rs`: the `CodeGen` state and the symbolic operand model
//! - `instructions.rs`: per-instruction dispatch, data movement, control flow
//! - `binop.rs`: arithmetic, logic and comparison lowering
//! - `calls.rs`: cdecl marshalling for calls and boxed-value constructors
//! - `globals.rs`: string interning/escaping and the `.data` section
//! - `program.rs`: whole-program driver
//! - `error.rs`: error types

mod binop;
mod calls;
mod error;
mod globals;
mod instructions;
mod program;
mod state;

pub use error::CodeGenError;
pub use program::generate;
pub use state::CodeGen;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_unit;
    use crate::parser::parse;
    use crate::sm::Insn;

    fn asm_for(source: &str) -> String {
        let unit = parse(source).unwrap();
        let prog = compile_unit(&unit).unwrap();
        generate(&prog).unwrap()
    }

    #[test]
    fn test_sections_and_entry() {
        let asm = asm_for("write (1)");
        assert!(asm.contains("\t.data"));
        assert!(asm.contains("\t.text"));
        assert!(asm.contains("\t.global\tmain"));
        assert!(asm.contains("main:"));
    }

    #[test]
    fn test_instruction_comments_precede_code() {
        let asm = asm_for("write (1 + 2)");
        assert!(asm.contains("# CONST 1"));
        assert!(asm.contains("# BINOP +"));
        assert!(asm.contains("# BUILTIN write 1"));
    }

    #[test]
    fn test_prologue_and_epilogue() {
        let asm = asm_for("write (1)");
        assert!(asm.contains("\tpushl\t%ebp"));
        assert!(asm.contains("\tmovl\t%esp, %ebp"));
        assert!(asm.contains("\tsubl\t$main_SIZE, %esp"));
        // main zeroes its exit code
        assert!(asm.contains("\txorl\t%eax, %eax"));
        assert!(asm.contains("\t.set\tmain_SIZE,"));
    }

    #[test]
    fn test_function_epilogue_returns_top_of_stack() {
        let asm = asm_for("fun f () { 7 } write (f ())");
        // f's single value lives in %ebx and moves to %eax before return
        assert!(asm.contains("\tmovl\t%ebx, %eax"));
        assert!(asm.contains("\t.set\tLf_SIZE,"));
    }

    #[test]
    fn test_global_variable_slot() {
        let asm = asm_for("var x; x := 1; write (x)");
        assert!(asm.contains("global_x:\t.int\t0"));
        assert!(asm.contains("\tmovl\t%ebx, global_x"));
    }

    #[test]
    fn test_binop_on_registers() {
        let asm = asm_for("write (1 + 2)");
        // both operands fit in registers: direct addl, source on the left
        assert!(asm.contains("\taddl\t%ecx, %ebx"));
    }

    #[test]
    fn test_division_uses_cltd_and_idivl() {
        let asm = asm_for("write (7 / 2); write (7 % 2)");
        assert!(asm.contains("\tcltd"));
        assert!(asm.contains("\tidivl\t%ecx"));
        // quotient from %eax, remainder from %edx
        assert!(asm.contains("\tmovl\t%eax, %ebx"));
        assert!(asm.contains("\tmovl\t%edx, %ebx"));
    }

    #[test]
    fn test_comparison_sets_flag_byte() {
        let asm = asm_for("write (1 < 2)");
        assert!(asm.contains("\txorl\t%eax, %eax"));
        assert!(asm.contains("\tcmpl\t%ecx, %ebx"));
        assert!(asm.contains("\tsetl\t%al"));
    }

    #[test]
    fn test_logical_and_normalizes_both_operands() {
        let asm = asm_for("write (3 && 4)");
        assert!(asm.contains("\tsetne\t%al"));
        assert!(asm.contains("\tsetne\t%dl"));
        assert!(asm.contains("\tandl\t%edx, %eax"));
    }

    #[test]
    fn test_builtin_call_is_runtime_entry() {
        let asm = asm_for("write (read ())");
        assert!(asm.contains("\tcall\tLread"));
        assert!(asm.contains("\tcall\tLwrite"));
        // one argument cleaned up after Lwrite
        assert!(asm.contains("\taddl\t$4, %esp"));
    }

    #[test]
    fn test_call_pushes_args_leftmost_last() {
        let asm = asm_for("fun sub (a, b) { a - b } write (sub (10, 4))");
        // Right-to-left evaluation puts 4 in %ebx and 10 (leftmost) in %ecx
        // on top; the pushes come out reversed, so 10 is pushed last and
        // lands at the lowest address, the first cdecl parameter.
        let pos_rhs = asm.find("\tpushl\t%ebx").unwrap();
        let pos_lhs = asm.find("\tpushl\t%ecx").unwrap();
        assert!(pos_rhs < pos_lhs);
        assert!(asm.contains("\tcall\tLsub"));
        assert!(asm.contains("\taddl\t$8, %esp"));
    }

    #[test]
    fn test_arguments_read_from_caller_frame() {
        let asm = asm_for("fun first (a, b) { a } write (first (1, 2))");
        assert!(asm.contains("\tmovl\t8(%ebp), %ebx"));
    }

    #[test]
    fn test_live_registers_saved_around_call() {
        // The outer addition keeps 1 in %ebx while f () is evaluated, so
        // %ebx is preserved around the call.
        let asm = asm_for("fun f () { 2 } write (1 + f ())");
        let call = asm.find("\tcall\tLf").unwrap();
        let save = asm[..call].rfind("\tpushl\t%ebx").unwrap();
        let restore_at = asm[call..].find("\tpopl\t%ebx").unwrap();
        assert!(save < call && restore_at > 0);
    }

    #[test]
    fn test_string_literal_is_interned_and_boxed() {
        let asm = asm_for("write (length (\"hello\")); write (length (\"hello\"))");
        assert!(asm.contains("string_0:\t.string\t\"hello\""));
        assert!(!asm.contains("string_1:"));
        assert!(asm.contains("\tleal\tstring_0, %ebx"));
        assert!(asm.contains("\tcall\tBstring"));
        assert!(asm.contains("\tcall\tLlength"));
    }

    #[test]
    fn test_string_escapes_in_data_section() {
        let asm = asm_for("write (length (\"a\tb\n\"))");
        assert!(asm.contains("string_0:\t.string\t\"a\\tb\\n\""));
    }

    #[test]
    fn test_array_constructor_passes_count_first() {
        let asm = asm_for("var a; a := [5, 6]; write (a[0])");
        assert!(asm.contains("\tpushl\t$2"));
        assert!(asm.contains("\tcall\tBarray"));
        // two elements plus the count word
        assert!(asm.contains("\taddl\t$12, %esp"));
        assert!(asm.contains("\tcall\tBelem"));
    }

    #[test]
    fn test_sexp_constructor_passes_tag_hash() {
        let asm = asm_for("var p; p := Pair (1, 2); write (p[0])");
        let hash = crate::builtins::tag_hash("Pair");
        assert!(asm.contains(&format!("\tpushl\t${}", hash)));
        // count includes the tag slot
        assert!(asm.contains("\tpushl\t$3"));
        assert!(asm.contains("\tcall\tBsexp"));
        assert!(asm.contains("\taddl\t$16, %esp"));
    }

    #[test]
    fn test_indexed_store_calls_bsta() {
        let asm = asm_for("var a; a := [1]; a[0] := 9");
        assert!(asm.contains("\tcall\tBsta"));
        assert!(asm.contains("\taddl\t$12, %esp"));
    }

    #[test]
    fn test_conditional_jump_shapes() {
        let asm = asm_for("var x; if x then write (1) else write (2) fi");
        assert!(asm.contains("\tcmpl\t$0, %ebx"));
        assert!(asm.contains("\tjz\t"));
        assert!(asm.contains("\tjmp\t"));
    }

    #[test]
    fn test_loop_jumps_on_nonzero() {
        let asm = asm_for("var i; while i do i := i - 1 od");
        assert!(asm.contains("\tjnz\t"));
    }

    #[test]
    fn test_locals_and_spills_sized_into_frame() {
        // one local, operands never deeper than the registers
        let asm = asm_for("fun f () { var y; y := 3; y } write (f ())");
        assert!(asm.contains("\tmovl\t%ebx, -4(%ebp)"));
        assert!(asm.contains("\t.set\tLf_SIZE,\t4"));
    }

    #[test]
    fn test_deep_expression_spills_past_registers() {
        // six operands alive at once: two must spill above the locals
        let asm = asm_for("write (1 + (2 + (3 + (4 + (5 + 6)))))");
        assert!(asm.contains("\tmovl\t$5, -4(%ebp)"));
        assert!(asm.contains("\tmovl\t$6, -8(%ebp)"));
    }

    #[test]
    fn test_store_through_reference_lowering() {
        use crate::ast::{Definition, Expr, Name};
        let unit = Expr::Scope(
            vec![Definition::Vars(vec![Name::new("x")])],
            Box::new(Expr::Ignore(Box::new(Expr::Assn(
                Box::new(Expr::Ref(Name::new("x"))),
                Box::new(Expr::Const(5)),
            )))),
        );
        let prog = compile_unit(&unit).unwrap();
        let asm = generate(&prog).unwrap();
        // address in %ebx, value in %ecx, stored through the reference
        assert!(asm.contains("\tleal\tglobal_x, %ebx"));
        assert!(asm.contains("\tmovl\t%ecx, 0(%ebx)"));
    }

    #[test]
    fn test_loop_below_live_operand_keeps_its_slot() {
        // The 1 stays in %ebx across the value-position scope, so the
        // loop's condition is allocated above it.
        let source = "write (1 + (var y; while y do skip od; 5))";
        let asm = asm_for(source);
        assert!(asm.contains("\tmovl\t-4(%ebp), %ecx"));
        let prog = compile_unit(&parse(source).unwrap()).unwrap();
        assert_eq!(crate::interp::run(&prog, &[]).unwrap(), vec![6]);
    }

    #[test]
    fn test_dup_has_no_lowering() {
        let err = generate(&[
            Insn::Label("main".to_string()),
            Insn::Begin("main".to_string(), 0, 0),
            Insn::Const(1),
            Insn::Dup,
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "codegeneration for instruction DUP is not yet implemented"
        );
    }

    #[test]
    fn test_generation_is_deterministic() {
        let source = "var x, y; fun f (n) { n * n } x := f (3); y := x; write (y)";
        assert_eq!(asm_for(source), asm_for(source));
    }
}
