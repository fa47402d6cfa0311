//! Runtime builtins
//!
//! Builtins are callable from Lama source like ordinary functions; the
//! compiler recognizes them by their `$`-prefixed label and emits a
//! `BUILTIN` instruction instead of a `CALL`. At the x86 level a builtin
//! `name` is the runtime entry point `L<name>` with cdecl conventions.

/// (source name, function label, arity)
pub const BUILTINS: &[(&str, &str, usize)] = &[
    ("read", "$read", 0),
    ("write", "$write", 1),
    ("length", "$length", 1),
];

/// Look up a builtin by its source-level name.
pub fn lookup(name: &str) -> Option<(&'static str, usize)> {
    BUILTINS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|&(_, label, arity)| (label, arity))
}

/// Hash of an s-expression tag.
///
/// A polynomial rolling hash over the tag bytes with 32-bit wrapping
/// arithmetic. The runtime library dispatches pattern matches with the same
/// function, so the two must never diverge; `SEXP` lowering bakes the hash
/// into the generated code as an immediate.
pub fn tag_hash(tag: &str) -> i32 {
    tag.bytes()
        .fold(0i32, |h, b| h.wrapping_mul(31).wrapping_add(i32::from(b)))
}
