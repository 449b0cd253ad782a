//! Integration tests exercising the extern "C" surface the way generated
//! code does: raw i64 words in, raw i64 words out.

use skein_core::{TaggedValue, display_string};
use skein_runtime::*;

fn fx(n: i64) -> i64 {
    TaggedValue::fixnum(n).0 as i64
}

fn tv(bits: i64) -> TaggedValue {
    TaggedValue(bits as u64)
}

#[test]
fn test_list_construction_prints_like_scheme() {
    let nil = TaggedValue::NIL.0 as i64;
    let l = cons(fx(1), cons(fx(2), cons(fx(3), nil)));
    assert_eq!(display_string(tv(l)), "(1 2 3)");
    let dotted = cons(fx(1), fx(2));
    assert_eq!(display_string(tv(dotted)), "(1 . 2)");
}

#[test]
fn test_scenario_box_flow() {
    // (let ((b (box 0))) (set-box! b 42) (unbox b)) => 42
    let b = r#box(fx(0));
    set_45_box_33_(b, fx(42));
    assert_eq!(unbox(b), fx(42));
    assert_eq!(display_string(tv(unbox(b))), "42");
}

#[test]
fn test_vector_roundtrip_with_tagged_lengths() {
    let v = make_45_vector(fx(2), fx(0));
    vector_45_set_33_(v, fx(0), fx(10));
    vector_45_set_33_(v, fx(1), fx(20));
    assert_eq!(display_string(tv(v)), "#(10 20)");
    assert_eq!(vector_45_length(v), fx(2));
}

#[test]
fn test_closure_capture_through_c_surface() {
    let c = skein_alloc_closure(0x1000, 1, 1);
    skein_closure_set(c, 0, fx(99));
    let clos = tv(c).as_closure().expect("closure");
    assert_eq!(clos.free_vars()[0].as_fixnum(), 99);
    assert_eq!(display_string(tv(c)), "#<procedure>");
}

#[test]
fn test_symbols_are_eq_across_interning() {
    let a = unsafe { skein_intern_symbol(c"tag".as_ptr()) };
    let b = unsafe { skein_intern_symbol(c"tag".as_ptr()) };
    assert_eq!(eq_63_(a, b), TaggedValue::TRUE.0 as i64);
    assert_eq!(symbol_63_(a), TaggedValue::TRUE.0 as i64);
}
