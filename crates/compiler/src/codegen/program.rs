//! Whole-program IR assembly.
//!
//! A program is a sequence of top-level forms. Lambda defines become
//! module functions under their mangled names; other defines become i64
//! module globals initialized at the top of `main`; remaining top-level
//! expressions run in `main` in order and the last value is displayed.
//! Hoisted quote data is built first, before any user code runs.

use crate::ast::{Datum, Expr};
use crate::passes;
use std::collections::HashSet;

use super::expr::{ExprGen, gen_function, FALSE_WORD, NIL_WORD, TRUE_WORD, UNDEF_WORD};
use super::runtime::emit_runtime_decls;
use super::state::{CodeGen, FuncInfo, mangle_name};
use super::CodeGenError;

impl CodeGen {
    /// Lower a whole program to an IR module.
    pub fn codegen_program(&mut self, forms: &[Expr]) -> Result<String, CodeGenError> {
        let forms: Vec<Expr> = forms.iter().map(passes::normalize).collect();

        // register every top-level definition before lowering anything, so
        // forward references resolve
        for form in &forms {
            if let Expr::Define { name, body } = form {
                if self.functions.contains_key(name) || self.global_vars.contains_key(name) {
                    return Err(CodeGenError::Logic(format!(
                        "duplicate top-level definition of `{}`",
                        name
                    )));
                }
                match &**body {
                    Expr::Lambda { params, .. } => {
                        self.functions.insert(
                            name.clone(),
                            FuncInfo { symbol: mangle_name(name), arity: params.len() },
                        );
                    }
                    _ => {
                        self.global_vars
                            .insert(name.clone(), format!("@g.{}", mangle_name(name)));
                    }
                }
            }
        }

        // module functions for lambda defines
        for form in &forms {
            if let Expr::Define { name, body } = form
                && let Expr::Lambda { params, body: lam_body } = &**body
            {
                let mut assigned = HashSet::new();
                passes::collect_assigned(body, &mut assigned);
                let symbol = self.functions[name].symbol.clone();
                gen_function(self, &symbol, params, lam_body, &[], &assigned)?;
            }
        }

        // main: global initializers, then the top-level expressions
        let mut assigned = HashSet::new();
        for form in &forms {
            match form {
                Expr::Define { body, .. } if !matches!(**body, Expr::Lambda { .. }) => {
                    passes::collect_assigned(body, &mut assigned);
                }
                Expr::Define { .. } => {}
                other => passes::collect_assigned(other, &mut assigned),
            }
        }

        let mut g = ExprGen::new(self, &assigned);
        let mut last = None;
        for form in &forms {
            match form {
                Expr::Define { name, body } => {
                    if let Expr::Lambda { .. } = &**body {
                        continue;
                    }
                    let value = g.lower(body)?;
                    let symbol = g.global_symbol(name)?;
                    g.line(format!("store i64 {}, ptr {}", value, symbol));
                }
                other => last = Some(g.lower(other)?),
            }
        }
        if let Some(value) = last {
            let r = g.fresh_temp();
            g.line(format!("{} = call i64 @display(i64 {})", r, value));
        }
        g.line("ret i32 0");
        let mut main_body = g.finish();

        // quote data is built before any user code
        let quote_inits = self.gen_quote_inits()?;
        let after_entry = main_body.find('\n').map(|i| i + 1).unwrap_or(0);
        main_body.insert_str(after_entry, &quote_inits);

        // assemble the module
        let mut out = String::new();
        out.push_str("%Closure = type { i64, i64, ptr, i64 }\n\n");
        if !self.string_globals.is_empty() {
            out.push_str(&self.string_globals);
            out.push('\n');
        }
        if !self.quote_globals.is_empty() {
            out.push_str(&self.quote_globals);
            out.push('\n');
        }
        let mut global_defs: Vec<_> = self.global_vars.values().cloned().collect();
        global_defs.sort();
        for symbol in &global_defs {
            out.push_str(&format!("{} = internal global i64 {}\n", symbol, UNDEF_WORD));
        }
        if !global_defs.is_empty() {
            out.push('\n');
        }
        emit_runtime_decls(&mut out);
        out.push('\n');
        out.push_str(&self.funcs);
        out.push_str(&format!("define i32 @main() {{\n{}}}\n", main_body));
        Ok(out)
    }

    /// Emit the initialization lines for every hoisted quote slot.
    fn gen_quote_inits(&mut self) -> Result<String, CodeGenError> {
        let mut out = String::new();
        let inits = std::mem::take(&mut self.quote_inits);
        for (slot, datum) in &inits {
            let value = self.gen_datum_build(&mut out, datum)?;
            out.push_str(&format!("  store i64 {}, ptr {}\n", value, slot));
        }
        Ok(out)
    }

    /// Build a datum bottom-up with runtime calls, returning its word.
    fn gen_datum_build(
        &mut self,
        out: &mut String,
        datum: &Datum,
    ) -> Result<String, CodeGenError> {
        match datum {
            Datum::Number(n) => Ok(n.wrapping_shl(3).to_string()),
            Datum::Boolean(true) => Ok(TRUE_WORD.to_string()),
            Datum::Boolean(false) => Ok(FALSE_WORD.to_string()),
            Datum::Nil => Ok(NIL_WORD.to_string()),
            Datum::Symbol(name) => {
                let str_global = self.get_string_global(name)?;
                let t = self.fresh_temp();
                out.push_str(&format!(
                    "  {} = call i64 @skein_intern_symbol(ptr {})\n",
                    t, str_global
                ));
                Ok(t)
            }
            Datum::Pair(car, cdr) => {
                let a = self.gen_datum_build(out, car)?;
                let b = self.gen_datum_build(out, cdr)?;
                let t = self.fresh_temp();
                out.push_str(&format!("  {} = call i64 @cons(i64 {}, i64 {})\n", t, a, b));
                Ok(t)
            }
        }
    }
}
