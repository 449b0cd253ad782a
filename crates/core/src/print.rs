//! Pretty-printing of tagged values in datum syntax.
//!
//! Fixnums print in decimal, pairs as `(a b …)` or `(a b . t)`, vectors as
//! `#(a b …)`, boxes as `#&v`, booleans as `#t`/`#f`, nil as `()`, void as
//! `#void`, closures as `#<procedure>`, symbols bare.

use crate::value::TaggedValue;
use std::fmt::{self, Write};

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, *self)
    }
}

/// Render a value to a fresh string.
pub fn display_string(v: TaggedValue) -> String {
    let mut s = String::new();
    // Writing to a String cannot fail.
    let _ = write_value(&mut s, v);
    s
}

fn write_value<W: Write>(out: &mut W, v: TaggedValue) -> fmt::Result {
    if v.is_fixnum() {
        return write!(out, "{}", v.as_fixnum());
    }
    if v.is_bool() {
        return out.write_str(if v.as_bool() { "#t" } else { "#f" });
    }
    if v.is_nil() {
        return out.write_str("()");
    }
    if v.is_void() {
        return out.write_str("#void");
    }
    if v.is_undef() {
        return out.write_str("#undef");
    }
    if let Some(name) = v.symbol_name() {
        return out.write_str(name);
    }
    if let Some(pair) = v.as_pair() {
        out.write_char('(')?;
        write_value(out, pair.car)?;
        let mut it = pair.cdr;
        while let Some(p) = it.as_pair() {
            out.write_char(' ')?;
            write_value(out, p.car)?;
            it = p.cdr;
        }
        if !it.is_nil() {
            out.write_str(" . ")?;
            write_value(out, it)?;
        }
        return out.write_char(')');
    }
    if let Some(vec) = v.as_vector() {
        out.write_str("#(")?;
        for i in 0..vec.len {
            if i > 0 {
                out.write_char(' ')?;
            }
            write_value(out, v.vector_get(i).expect("index in range"))?;
        }
        return out.write_char(')');
    }
    if let Some(b) = v.as_box() {
        out.write_str("#&")?;
        return write_value(out, b.value);
    }
    if v.is_closure() {
        return out.write_str("#<procedure>");
    }
    out.write_str("#unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{TaggedValue, cons, intern, make_box, make_vector};

    fn fx(n: i64) -> TaggedValue {
        TaggedValue::fixnum(n)
    }

    fn list(items: &[TaggedValue]) -> TaggedValue {
        items
            .iter()
            .rev()
            .fold(TaggedValue::NIL, |tail, &v| cons(v, tail))
    }

    #[test]
    fn test_atoms() {
        assert_eq!(display_string(fx(42)), "42");
        assert_eq!(display_string(fx(-7)), "-7");
        assert_eq!(display_string(TaggedValue::TRUE), "#t");
        assert_eq!(display_string(TaggedValue::FALSE), "#f");
        assert_eq!(display_string(TaggedValue::NIL), "()");
        assert_eq!(display_string(TaggedValue::VOID), "#void");
        assert_eq!(display_string(intern("foo")), "foo");
    }

    #[test]
    fn test_proper_list() {
        let l = list(&[fx(1), fx(2), fx(3)]);
        assert_eq!(display_string(l), "(1 2 3)");
    }

    #[test]
    fn test_dotted_pair() {
        assert_eq!(display_string(cons(fx(1), fx(2))), "(1 . 2)");
        let l = cons(fx(1), cons(fx(2), fx(3)));
        assert_eq!(display_string(l), "(1 2 . 3)");
    }

    #[test]
    fn test_nested_list() {
        let inner = list(&[fx(2), fx(3)]);
        let l = list(&[fx(1), inner]);
        assert_eq!(display_string(l), "(1 (2 3))");
    }

    #[test]
    fn test_vector_and_box() {
        let v = make_vector(2, fx(0));
        v.vector_set(1, fx(5));
        assert_eq!(display_string(v), "#(0 5)");
        assert_eq!(display_string(make_vector(0, fx(0))), "#()");
        assert_eq!(display_string(make_box(fx(9))), "#&9");
    }
}
