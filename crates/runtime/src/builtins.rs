//! Builtin procedures callable from generated code.
//!
//! Arithmetic and comparisons are inlined by the code generator and never
//! reach the runtime; everything else lands here.

use crate::{bits, die, val};
use skein_core::{TaggedValue, cons as core_cons, display_string, make_box, make_vector};

/// Pretty-print a value to standard output, one per line.
#[unsafe(no_mangle)]
pub extern "C" fn display(v: i64) -> i64 {
    println!("{}", display_string(val(v)));
    bits(TaggedValue::VOID)
}

#[unsafe(no_mangle)]
pub extern "C" fn cons(car: i64, cdr: i64) -> i64 {
    bits(core_cons(val(car), val(cdr)))
}

#[unsafe(no_mangle)]
pub extern "C" fn car(v: i64) -> i64 {
    match val(v).as_pair() {
        Some(pair) => bits(pair.car),
        None => die(&format!(
            "type error: expected a cons cell, but got {}",
            display_string(val(v))
        )),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn cdr(v: i64) -> i64 {
    match val(v).as_pair() {
        Some(pair) => bits(pair.cdr),
        None => die(&format!(
            "type error: expected a cons cell, but got {}",
            display_string(val(v))
        )),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn r#box(v: i64) -> i64 {
    bits(make_box(val(v)))
}

#[unsafe(no_mangle)]
pub extern "C" fn unbox(v: i64) -> i64 {
    match val(v).as_box() {
        Some(cell) => bits(cell.value),
        None => die(&format!(
            "type error: expected a box, but got {}",
            display_string(val(v))
        )),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn set_45_box_33_(b: i64, v: i64) -> i64 {
    if !val(b).set_box(val(v)) {
        die(&format!(
            "type error: expected a box, but got {}",
            display_string(val(b))
        ));
    }
    bits(TaggedValue::VOID)
}

#[unsafe(no_mangle)]
pub extern "C" fn box_63_(v: i64) -> i64 {
    bits(TaggedValue::boolean(val(v).is_box()))
}

fn expect_fixnum(v: TaggedValue, who: &str) -> i64 {
    if !v.is_fixnum() {
        die(&format!(
            "type error: {} expected a number, but got {}",
            who,
            display_string(v)
        ));
    }
    v.as_fixnum()
}

#[unsafe(no_mangle)]
pub extern "C" fn make_45_vector(len: i64, fill: i64) -> i64 {
    let len = expect_fixnum(val(len), "make-vector");
    bits(make_vector(len, val(fill)))
}

fn vector_slot(v: TaggedValue, idx: TaggedValue, who: &str) -> (TaggedValue, i64) {
    let vec = match v.as_vector() {
        Some(vec) => vec,
        None => die(&format!(
            "type error: {} expected a vector, but got {}",
            who,
            display_string(v)
        )),
    };
    let i = expect_fixnum(idx, who);
    if i < 0 || i >= vec.len {
        die(&format!("{}: index {} out of range for length {}", who, i, vec.len));
    }
    (v, i)
}

#[unsafe(no_mangle)]
pub extern "C" fn vector_45_ref(v: i64, idx: i64) -> i64 {
    let (v, i) = vector_slot(val(v), val(idx), "vector-ref");
    bits(v.vector_get(i).expect("index checked"))
}

#[unsafe(no_mangle)]
pub extern "C" fn vector_45_set_33_(v: i64, idx: i64, value: i64) -> i64 {
    let (v, i) = vector_slot(val(v), val(idx), "vector-set!");
    v.vector_set(i, val(value));
    bits(TaggedValue::VOID)
}

#[unsafe(no_mangle)]
pub extern "C" fn vector_45_length(v: i64) -> i64 {
    match val(v).as_vector() {
        Some(vec) => bits(TaggedValue::fixnum(vec.len)),
        None => die(&format!(
            "type error: vector-length expected a vector, but got {}",
            display_string(val(v))
        )),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn vector_63_(v: i64) -> i64 {
    bits(TaggedValue::boolean(val(v).is_vector()))
}

#[unsafe(no_mangle)]
pub extern "C" fn null_63_(v: i64) -> i64 {
    bits(TaggedValue::boolean(val(v).is_nil()))
}

#[unsafe(no_mangle)]
pub extern "C" fn pair_63_(v: i64) -> i64 {
    bits(TaggedValue::boolean(val(v).is_pair()))
}

#[unsafe(no_mangle)]
pub extern "C" fn symbol_63_(v: i64) -> i64 {
    bits(TaggedValue::boolean(val(v).is_symbol()))
}

#[unsafe(no_mangle)]
pub extern "C" fn number_63_(v: i64) -> i64 {
    bits(TaggedValue::boolean(val(v).is_fixnum()))
}

#[unsafe(no_mangle)]
pub extern "C" fn boolean_63_(v: i64) -> i64 {
    bits(TaggedValue::boolean(val(v).is_bool()))
}

#[unsafe(no_mangle)]
pub extern "C" fn void_63_(v: i64) -> i64 {
    bits(TaggedValue::boolean(val(v).is_void()))
}

/// Pointer/payload identity.
#[unsafe(no_mangle)]
pub extern "C" fn eq_63_(a: i64, b: i64) -> i64 {
    bits(TaggedValue::boolean(a == b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cons_car_cdr_roundtrip() {
        let one = bits(TaggedValue::fixnum(1));
        let two = bits(TaggedValue::fixnum(2));
        let p = cons(one, two);
        assert_eq!(car(p), one);
        assert_eq!(cdr(p), two);
        assert_eq!(pair_63_(p), bits(TaggedValue::TRUE));
    }

    #[test]
    fn test_box_cell() {
        let b = r#box(bits(TaggedValue::fixnum(0)));
        set_45_box_33_(b, bits(TaggedValue::fixnum(42)));
        assert_eq!(unbox(b), bits(TaggedValue::fixnum(42)));
        assert_eq!(box_63_(b), bits(TaggedValue::TRUE));
    }

    #[test]
    fn test_vector_ops() {
        // lengths arrive tagged from compiled code
        let v = make_45_vector(bits(TaggedValue::fixnum(3)), bits(TaggedValue::fixnum(7)));
        assert_eq!(vector_45_length(v), bits(TaggedValue::fixnum(3)));
        vector_45_set_33_(v, bits(TaggedValue::fixnum(1)), bits(TaggedValue::fixnum(9)));
        assert_eq!(
            vector_45_ref(v, bits(TaggedValue::fixnum(1))),
            bits(TaggedValue::fixnum(9))
        );
    }

    #[test]
    fn test_predicates() {
        assert_eq!(null_63_(bits(TaggedValue::NIL)), bits(TaggedValue::TRUE));
        assert_eq!(number_63_(bits(TaggedValue::fixnum(5))), bits(TaggedValue::TRUE));
        assert_eq!(boolean_63_(bits(TaggedValue::FALSE)), bits(TaggedValue::TRUE));
        assert_eq!(void_63_(bits(TaggedValue::VOID)), bits(TaggedValue::TRUE));
        assert_eq!(number_63_(bits(TaggedValue::NIL)), bits(TaggedValue::FALSE));
    }

    #[test]
    fn test_eq_is_word_identity() {
        let a = cons(bits(TaggedValue::fixnum(1)), bits(TaggedValue::NIL));
        let b = cons(bits(TaggedValue::fixnum(1)), bits(TaggedValue::NIL));
        assert_eq!(eq_63_(a, a), bits(TaggedValue::TRUE));
        assert_eq!(eq_63_(a, b), bits(TaggedValue::FALSE));
        assert_eq!(
            eq_63_(bits(TaggedValue::fixnum(3)), bits(TaggedValue::fixnum(3))),
            bits(TaggedValue::TRUE)
        );
    }
}
