//! Evaluation and compilation error types.
//!
//! The kind set is closed: every failure any back-end can produce is one of
//! these. Errors unwind the current top-level form; the REPL keeps running,
//! batch modes exit nonzero.

/// Error raised by the parser, the evaluators, or code generation.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Tokenization or grammar mismatch.
    Parse(String),
    /// A variable reference or `set!` on a name with no binding.
    Unbound(String),
    /// Expected-kind mismatch (primitive operand not a number, call target
    /// not a procedure, `car` of a non-pair, ...).
    Type { expected: &'static str, got: String },
    /// Operand count does not match a lambda's or builtin's arity.
    Arity { expected: usize, got: usize },
    /// Operand count below a variadic builtin's minimum.
    ArityAtLeast { expected: usize, got: usize },
    /// A broken invariant inside the implementation itself.
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(msg) => write!(f, "parse error: {}", msg),
            Error::Unbound(name) => write!(f, "`{}` undefined", name),
            Error::Type { expected, got } => {
                write!(f, "type error: expected a {}, but got {}", expected, got)
            }
            Error::Arity { expected, got } => {
                write!(f, "arity error: expected {} arg(s), but got {}", expected, got)
            }
            Error::ArityAtLeast { expected, got } => {
                write!(f, "arity error: expected at least {} arg(s), but got {}", expected, got)
            }
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_strings() {
        assert_eq!(Error::Unbound("x".into()).to_string(), "`x` undefined");
        assert_eq!(
            Error::Type { expected: "number", got: "#t".into() }.to_string(),
            "type error: expected a number, but got #t"
        );
        assert_eq!(
            Error::Arity { expected: 2, got: 3 }.to_string(),
            "arity error: expected 2 arg(s), but got 3"
        );
    }
}
