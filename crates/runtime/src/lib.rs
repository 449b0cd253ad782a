//! Skein runtime library.
//!
//! The `extern "C"` surface the native back-end's generated IR links
//! against. Builtin procedures export under their source names mangled the
//! same way the code generator mangles identifiers (each non-alphanumeric
//! character becomes `_<decimal>_`), so `set-box!` is `set_45_box_33_`.
//!
//! All values crossing this boundary are tagged 64-bit words (see
//! skein-core). Contract violations (a non-pair to `car`, an out-of-range
//! vector index) print to stderr and exit nonzero: compiled programs have
//! no unwinding story, and partial results are never produced.

pub mod builtins;
pub mod closures;

pub use builtins::*;
pub use closures::*;

use skein_core::TaggedValue;

/// Reconstruct a tagged value from the raw wire word.
#[inline(always)]
pub(crate) fn val(bits: i64) -> TaggedValue {
    TaggedValue(bits as u64)
}

/// The raw wire word of a tagged value.
#[inline(always)]
pub(crate) fn bits(v: TaggedValue) -> i64 {
    v.0 as i64
}

/// Abort the program with a runtime diagnostic.
pub(crate) fn die(msg: &str) -> ! {
    eprintln!("{}", msg);
    std::process::exit(1);
}
