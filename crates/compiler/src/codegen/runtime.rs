//! Runtime function declarations for generated modules.
//!
//! The arithmetic/comparison primitives are inlined by the code generator
//! and never appear here. Everything else is an external symbol provided
//! by libskein_runtime.a, exported under the same decimal mangling the
//! code generator applies to identifiers.

/// Builtins provided by the runtime library: source name, linker symbol,
/// arity.
pub(super) static RUNTIME_BUILTINS: &[(&str, &str, usize)] = &[
    ("display", "display", 1),
    ("cons", "cons", 2),
    ("car", "car", 1),
    ("cdr", "cdr", 1),
    ("box", "box", 1),
    ("unbox", "unbox", 1),
    ("set-box!", "set_45_box_33_", 2),
    ("box?", "box_63_", 1),
    ("make-vector", "make_45_vector", 2),
    ("vector-ref", "vector_45_ref", 2),
    ("vector-set!", "vector_45_set_33_", 3),
    ("vector-length", "vector_45_length", 1),
    ("vector?", "vector_63_", 1),
    ("null?", "null_63_", 1),
    ("pair?", "pair_63_", 1),
    ("symbol?", "symbol_63_", 1),
    ("number?", "number_63_", 1),
    ("boolean?", "boolean_63_", 1),
    ("void?", "void_63_", 1),
    ("eq?", "eq_63_", 2),
];

/// Look up a runtime builtin by source name.
pub(super) fn runtime_builtin(name: &str) -> Option<(&'static str, usize)> {
    RUNTIME_BUILTINS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, sym, arity)| (*sym, *arity))
}

/// The `declare` block for a generated module.
pub(super) fn emit_runtime_decls(out: &mut String) {
    for (_, symbol, arity) in RUNTIME_BUILTINS {
        let params = vec!["i64"; *arity].join(", ");
        out.push_str(&format!("declare i64 @{}({})\n", symbol, params));
    }
    out.push_str("declare i64 @skein_alloc_closure(i64, i64, i64)\n");
    out.push_str("declare void @skein_closure_set(i64, i64, i64)\n");
    out.push_str("declare i64 @skein_intern_symbol(ptr)\n");
    out.push_str("declare void @skein_arity_error(i64, i64)\n");
}
