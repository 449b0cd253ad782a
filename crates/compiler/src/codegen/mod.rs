//! Native code generation: textual LLVM IR.
//!
//! The program is lowered to a module of functions over 64-bit tagged
//! values and linked against the runtime library (libskein_runtime.a).
//!
//! # Lowering summary
//!
//! - Top-level lambda defines become module functions named by the decimal
//!   mangling (`set-box!` -> `set_45_box_33_`); other defines become i64
//!   module globals initialized in `main`.
//! - Every Scheme function takes the closure word as its first parameter.
//!   Direct calls to module functions pass 0; indirect calls mask the
//!   closure tag, arity-check against the closure header, load the code
//!   pointer and call through it.
//! - Inner lambdas are lifted (`@lam.N`); their free variables are loaded
//!   from the closure capture array on entry. Closures are built with
//!   `skein_alloc_closure` + one `skein_closure_set` per capture.
//! - Names assigned anywhere inside a top-level definition are boxed:
//!   initializers are wrapped in `@box`, assigned parameters are copied
//!   into a box on entry, reads load through the box and `set!` stores
//!   through it. A captured binding therefore shares one cell with its
//!   origin scope.
//! - Arithmetic and comparisons inline: add/sub/srem work on tagged words
//!   directly, multiplication pre-shifts one operand, division re-shifts
//!   the quotient, comparisons build the boolean tag (`zext` + `shl 5` +
//!   `or 5`).
//! - Compound quoted data is hoisted to module slots and built at the top
//!   of `main` with `cons` / `skein_intern_symbol`.
//!
//! # Module structure
//!
//! - `state.rs`: CodeGen struct, counters, mangling, string constants
//! - `runtime.rs`: runtime `declare` block and the builtin table
//! - `expr.rs`: per-expression lowering
//! - `program.rs`: module assembly, globals, quote hoisting, `main`
//! - `error.rs`: error type

mod error;
mod expr;
mod program;
mod runtime;
mod state;

pub use error::CodeGenError;
pub use state::{CodeGen, mangle_name};

use crate::ast::Expr;

/// Lower a parsed program to an IR module.
pub fn codegen_program(forms: &[Expr]) -> Result<String, CodeGenError> {
    CodeGen::new().codegen_program(forms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn gen_ir(src: &str) -> String {
        let forms = Parser::new(src).parse_program().expect("parse failed");
        codegen_program(&forms).expect("codegen failed")
    }

    fn gen_err(src: &str) -> String {
        let forms = Parser::new(src).parse_program().expect("parse failed");
        codegen_program(&forms).unwrap_err().to_string()
    }

    #[test]
    fn test_display_of_arithmetic() {
        let ir = gen_ir("(display (+ 1 (* 2 3)))");
        // fixnums are pre-shifted constants
        assert!(ir.contains("add i64"), "no inline add:\n{}", ir);
        assert!(ir.contains("ashr i64"), "mul must pre-shift:\n{}", ir);
        assert!(ir.contains("call i64 @display"), "missing display call:\n{}", ir);
        assert!(ir.contains("define i32 @main()"));
        assert!(ir.contains("ret i32 0"));
    }

    #[test]
    fn test_fixnum_constants_are_shifted() {
        let ir = gen_ir("(display 42)");
        assert!(ir.contains("336"), "42 must appear as 42<<3:\n{}", ir);
    }

    #[test]
    fn test_define_becomes_mangled_function() {
        let ir = gen_ir("(define (fact n) (if (= n 0) 1 (* n (fact (- n 1))))) (display (fact 6))");
        assert!(ir.contains("define i64 @fact(i64 %self, i64 %p0)"), "{}", ir);
        // recursive direct call passes a dummy closure word
        assert!(ir.contains("call i64 @fact(i64 0, i64 "), "{}", ir);
        // comparison builds the boolean tag
        assert!(ir.contains("icmp eq i64"), "{}", ir);
        assert!(ir.contains("shl i64"), "{}", ir);
    }

    #[test]
    fn test_mangled_name_with_punctuation() {
        let ir = gen_ir("(define (odd? n) (= (% n 2) 1)) (display (odd? 3))");
        assert!(ir.contains("define i64 @odd_63_"), "{}", ir);
        assert!(ir.contains("call i64 @odd_63_(i64 0"), "{}", ir);
    }

    #[test]
    fn test_if_lowered_with_phi() {
        let ir = gen_ir("(display (if #t 1 2))");
        assert!(ir.contains("icmp ne i64"), "branch on != #f:\n{}", ir);
        assert!(ir.contains("phi i64"), "{}", ir);
        // #f is the false word
        assert!(ir.contains(", 5"), "{}", ir);
    }

    #[test]
    fn test_lambda_lifted_with_captures() {
        let ir = gen_ir("(display ((let ((x 10)) (lambda (y) (+ x y))) 5))");
        assert!(ir.contains("define i64 @lam."), "no lifted lambda:\n{}", ir);
        assert!(ir.contains("call i64 @skein_alloc_closure"), "{}", ir);
        assert!(ir.contains("call void @skein_closure_set"), "{}", ir);
        // the lifted body loads its capture from the closure
        assert!(ir.contains("getelementptr inbounds %Closure"), "{}", ir);
    }

    #[test]
    fn test_indirect_call_checks_arity() {
        let ir = gen_ir("(display ((lambda (x) x) 4))");
        assert!(ir.contains("call void @skein_arity_error"), "{}", ir);
        assert!(ir.contains("unreachable"), "{}", ir);
        // tag mask then code-field load
        assert!(ir.contains("and i64"), "{}", ir);
        assert!(ir.contains("inttoptr i64"), "{}", ir);
    }

    #[test]
    fn test_assigned_variable_boxed() {
        let ir = gen_ir("(display (let ((x 1)) (begin (set! x 2) x)))");
        assert!(ir.contains("call i64 @box"), "assigned let binding must box:\n{}", ir);
        assert!(ir.contains("store i64"), "set! must store through the box:\n{}", ir);
    }

    #[test]
    fn test_assigned_param_boxed_on_entry() {
        let ir = gen_ir("(define (bump n) (begin (set! n (+ n 1)) n)) (display (bump 1))");
        assert!(ir.contains("call i64 @box(i64 %p0)"), "{}", ir);
    }

    #[test]
    fn test_counter_closure_shares_box() {
        let ir = gen_ir(
            "(display (let ((c (let ((x 0)) (lambda () (begin (set! x (+ x 1)) x))))) \
               (begin (c) (c) (c))))",
        );
        // the captured cell is the box itself
        assert!(ir.contains("call void @skein_closure_set"), "{}", ir);
        assert!(ir.contains("call i64 @box"), "{}", ir);
    }

    #[test]
    fn test_quote_atoms_inline() {
        let ir = gen_ir("(display '7)");
        assert!(ir.contains("56"), "quoted fixnum inline:\n{}", ir);
        let ir = gen_ir("(display '())");
        assert!(ir.contains("i64 13"), "nil word inline:\n{}", ir);
    }

    #[test]
    fn test_compound_quote_hoisted_and_initialized_in_main() {
        let ir = gen_ir("(display '(1 2 3))");
        assert!(ir.contains("@quote.0 = internal global i64"), "{}", ir);
        assert!(ir.contains("call i64 @cons"), "{}", ir);
        assert!(ir.contains("store i64"), "{}", ir);
        // initialization happens inside main, before the display
        let main_at = ir.find("define i32 @main()").unwrap();
        let cons_at = ir.rfind("call i64 @cons").unwrap();
        let display_at = ir.rfind("call i64 @display").unwrap();
        assert!(cons_at > main_at && cons_at < display_at, "{}", ir);
    }

    #[test]
    fn test_symbol_quote_interned() {
        let ir = gen_ir("(display (eq? 'a 'a))");
        assert!(ir.contains("call i64 @skein_intern_symbol"), "{}", ir);
        assert!(ir.contains("c\"a\\00\""), "{}", ir);
        assert!(ir.contains("call i64 @eq_63_"), "{}", ir);
    }

    #[test]
    fn test_runtime_builtin_calls_mangled_symbols() {
        let ir = gen_ir("(display (let ((b (box 0))) (begin (set-box! b 42) (unbox b))))");
        assert!(ir.contains("call i64 @set_45_box_33_"), "{}", ir);
        assert!(ir.contains("call i64 @unbox"), "{}", ir);
    }

    #[test]
    fn test_non_lambda_define_becomes_global() {
        let ir = gen_ir("(define limit 100) (display limit)");
        assert!(ir.contains("@g.limit = internal global i64"), "{}", ir);
        assert!(ir.contains("store i64 800, ptr @g.limit"), "{}", ir);
        assert!(ir.contains("load i64, ptr @g.limit"), "{}", ir);
    }

    #[test]
    fn test_letrec_compiles_through_normalization() {
        let ir = gen_ir(
            "(display (letrec ((f (lambda (n) (if (= n 0) 1 (* n (f (- n 1))))))) (f 5)))",
        );
        // f is boxed and captured by its own body
        assert!(ir.contains("call i64 @box"), "{}", ir);
        assert!(ir.contains("define i64 @lam."), "{}", ir);
    }

    #[test]
    fn test_runtime_declares_present() {
        let ir = gen_ir("(display 1)");
        assert!(ir.contains("declare i64 @display(i64)"), "{}", ir);
        assert!(ir.contains("declare i64 @cons(i64, i64)"), "{}", ir);
        assert!(ir.contains("declare i64 @skein_alloc_closure(i64, i64, i64)"), "{}", ir);
        assert!(ir.contains("%Closure = type { i64, i64, ptr, i64 }"), "{}", ir);
    }

    #[test]
    fn test_division_reshifts_quotient() {
        let ir = gen_ir("(display (/ 9 2))");
        assert!(ir.contains("sdiv i64"), "{}", ir);
        let sdiv_at = ir.find("sdiv i64").unwrap();
        let shl_after = ir[sdiv_at..].contains("shl i64");
        assert!(shl_after, "quotient must be re-tagged:\n{}", ir);
    }

    #[test]
    fn test_unknown_function_is_an_error() {
        let err = gen_err("(display (launch 1))");
        assert!(err.contains("could not find function: launch"), "{}", err);
    }

    #[test]
    fn test_unbound_variable_is_an_error() {
        let err = gen_err("(display nope)");
        assert!(err.contains("`nope` undefined"), "{}", err);
    }

    #[test]
    fn test_builtin_arity_checked_at_compile_time() {
        let err = gen_err("(display (cons 1))");
        assert!(err.contains("expect 2 arg(s), but got 1"), "{}", err);
        let err = gen_err("(display (+ 1 2 3))");
        assert!(err.contains("expect 2 arg(s), but got 3"), "{}", err);
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let err = gen_err("(define x 1) (define x 2) (display x)");
        assert!(err.contains("duplicate"), "{}", err);
    }

    #[test]
    fn test_module_function_as_value_wrapped() {
        let ir = gen_ir("(define (id x) x) (display ((lambda (f) (f 9)) id))");
        assert!(
            ir.contains("ptrtoint (ptr @id to i64)"),
            "function reference must wrap in a closure:\n{}",
            ir
        );
    }

    #[test]
    fn test_program_without_trailing_expression() {
        let ir = gen_ir("(define (f x) x)");
        assert!(ir.contains("define i64 @f"), "{}", ir);
        assert!(!ir.contains("call i64 @display"), "{}", ir);
        assert!(ir.contains("ret i32 0"), "{}", ir);
    }
}
