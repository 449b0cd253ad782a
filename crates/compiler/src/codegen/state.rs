//! Code generator state and name mangling.

use crate::ast::Datum;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use super::CodeGenError;

/// A module-level function produced from a top-level lambda define.
pub(super) struct FuncInfo {
    pub symbol: String,
    pub arity: usize,
}

pub struct CodeGen {
    /// Finished function definitions.
    pub(super) funcs: String,
    /// String constants (`@.str.N`).
    pub(super) string_globals: String,
    string_constants: HashMap<String, String>,
    /// Hoisted quote slots (`@quote.N = global i64 ...`).
    pub(super) quote_globals: String,
    /// Quote slots awaiting initialization in `main`, in discovery order.
    pub(super) quote_inits: Vec<(String, Rc<Datum>)>,
    quote_slots: HashMap<usize, String>,
    /// Scheme name -> module function, for top-level lambda defines.
    pub(super) functions: HashMap<String, FuncInfo>,
    /// Scheme name -> module global symbol, for other top-level defines.
    pub(super) global_vars: HashMap<String, String>,
    temp_counter: usize,
    label_counter: usize,
    string_counter: usize,
    quote_counter: usize,
    lambda_counter: usize,
}

impl CodeGen {
    pub fn new() -> Self {
        CodeGen {
            funcs: String::new(),
            string_globals: String::new(),
            string_constants: HashMap::new(),
            quote_globals: String::new(),
            quote_inits: Vec::new(),
            quote_slots: HashMap::new(),
            functions: HashMap::new(),
            global_vars: HashMap::new(),
            temp_counter: 0,
            label_counter: 0,
            string_counter: 0,
            quote_counter: 0,
            lambda_counter: 0,
        }
    }

    /// A fresh SSA temporary (unique module-wide).
    pub(super) fn fresh_temp(&mut self) -> String {
        self.temp_counter += 1;
        format!("%t{}", self.temp_counter)
    }

    /// A fresh basic-block label with the given stem.
    pub(super) fn fresh_label(&mut self, stem: &str) -> String {
        self.label_counter += 1;
        format!("{}{}", stem, self.label_counter)
    }

    /// A fresh lifted-lambda symbol.
    pub(super) fn fresh_lambda_symbol(&mut self) -> String {
        self.lambda_counter += 1;
        format!("lam.{}", self.lambda_counter)
    }

    /// Get or create a NUL-terminated string constant, deduplicated.
    pub(super) fn get_string_global(&mut self, s: &str) -> Result<String, CodeGenError> {
        if let Some(name) = self.string_constants.get(s) {
            return Ok(name.clone());
        }
        let name = format!("@.str.{}", self.string_counter);
        self.string_counter += 1;
        let escaped = escape_llvm_string(s)?;
        writeln!(
            &mut self.string_globals,
            "{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
            name,
            s.len() + 1,
            escaped
        )?;
        self.string_constants.insert(s.to_string(), name.clone());
        Ok(name)
    }

    /// Get or create the hoisted slot for a compound quote, one per quote
    /// node. The slot starts undefined and is filled at the top of `main`.
    pub(super) fn quote_global(&mut self, datum: &Rc<Datum>) -> Result<String, CodeGenError> {
        let key = Rc::as_ptr(datum) as usize;
        if let Some(name) = self.quote_slots.get(&key) {
            return Ok(name.clone());
        }
        let name = format!("@quote.{}", self.quote_counter);
        self.quote_counter += 1;
        writeln!(
            &mut self.quote_globals,
            "{} = internal global i64 {}",
            name,
            super::expr::UNDEF_WORD
        )?;
        self.quote_slots.insert(key, name.clone());
        self.quote_inits.push((name.clone(), Rc::clone(datum)));
        Ok(name)
    }
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

/// Mangle a Scheme identifier into a linkable symbol: every character
/// outside `[A-Za-z0-9_]` becomes `_<decimal>_`.
pub fn mangle_name(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            let _ = write!(&mut out, "_{}_", c as u32);
        }
    }
    out
}

/// Escape a string for an LLVM `c"..."` literal.
pub(super) fn escape_llvm_string(s: &str) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    for ch in s.chars() {
        match ch {
            ' '..='!' | '#'..='[' | ']'..='~' => out.push(ch),
            '\\' => out.push_str(r"\\"),
            '"' => out.push_str(r"\22"),
            _ => {
                for byte in ch.to_string().as_bytes() {
                    write!(&mut out, r"\{:02X}", byte)?;
                }
            }
        }
    }
    Ok(out)
}
