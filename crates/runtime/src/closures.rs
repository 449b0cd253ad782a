//! Closure and symbol support for compiled code.
//!
//! The code generator allocates a closure first and then fills each
//! captured slot, so allocation does not need a variadic signature:
//!
//! ```text
//! %c = call i64 @skein_alloc_closure(i64 ptrtoint(@fn), i64 2, i64 1)
//! call void @skein_closure_set(i64 %c, i64 0, i64 %captured)
//! ```

use crate::{bits, die, val};
use skein_core::{TaggedValue, display_string, intern};
use std::ffi::CStr;
use std::os::raw::c_char;

/// Upper bound on captured values, against runaway generated code.
pub const MAX_CAPTURES: i64 = 1024;

/// Allocate a closure with `n_free` uninitialized capture slots.
/// `code` is the function address; `arity` and `n_free` are raw counts.
#[unsafe(no_mangle)]
pub extern "C" fn skein_alloc_closure(code: i64, arity: i64, n_free: i64) -> i64 {
    if !(0..=MAX_CAPTURES).contains(&n_free) {
        die(&format!("alloc_closure: bad capture count {}", n_free));
    }
    let free = vec![TaggedValue::UNDEF; n_free as usize];
    bits(skein_core::alloc_closure(code as u64, arity, &free))
}

/// Fill capture slot `index` of a closure built by `skein_alloc_closure`.
#[unsafe(no_mangle)]
pub extern "C" fn skein_closure_set(clos: i64, index: i64, value: i64) {
    let c = match val(clos).as_closure() {
        Some(c) => c,
        None => die(&format!(
            "closure_set: expected a closure, but got {}",
            display_string(val(clos))
        )),
    };
    if index < 0 || index >= c.n_free {
        die(&format!(
            "closure_set: slot {} out of range for {} capture(s)",
            index, c.n_free
        ));
    }
    unsafe { *c.free.add(index as usize) = val(value) };
}

/// Canonicalize a NUL-terminated name to its tagged Symbol. The pool is
/// process-lived; the same name always yields the same word.
///
/// # Safety
/// `name` must point to a valid NUL-terminated string. Generated code only
/// passes addresses of module string constants.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn skein_intern_symbol(name: *const c_char) -> i64 {
    if name.is_null() {
        die("intern_symbol: null name");
    }
    let s = unsafe { CStr::from_ptr(name) };
    match s.to_str() {
        Ok(s) => bits(intern(s)),
        Err(_) => die("intern_symbol: name is not valid UTF-8"),
    }
}

/// Report an indirect-call arity mismatch and exit.
#[unsafe(no_mangle)]
pub extern "C" fn skein_arity_error(expected: i64, got: i64) {
    die(&format!(
        "arity error: expected {} arg(s), but got {}",
        expected, got
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_fill_closure() {
        let c = skein_alloc_closure(0xbeef0, 2, 2);
        skein_closure_set(c, 0, bits(TaggedValue::fixnum(5)));
        skein_closure_set(c, 1, bits(TaggedValue::TRUE));
        let clos = val(c).as_closure().expect("closure tag");
        assert_eq!(clos.arity, 2);
        assert_eq!(clos.code, 0xbeef0);
        assert_eq!(clos.free_vars()[0].as_fixnum(), 5);
        assert_eq!(clos.free_vars()[1], TaggedValue::TRUE);
    }

    #[test]
    fn test_intern_symbol_identity() {
        let a = unsafe { skein_intern_symbol(c"hello".as_ptr()) };
        let b = unsafe { skein_intern_symbol(c"hello".as_ptr()) };
        let c = unsafe { skein_intern_symbol(c"world".as_ptr()) };
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(val(a).symbol_name(), Some("hello"));
    }
}
