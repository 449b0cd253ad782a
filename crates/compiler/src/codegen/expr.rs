//! Per-expression lowering to IR.
//!
//! Every form produces one 64-bit tagged value. Locals live in SSA
//! temporaries; assigned names (per the CollectAssign set of the enclosing
//! top-level definition) hold a box instead, reads load through it and
//! `set!` stores through it. Lambdas are lifted to module functions taking
//! the closure word first; their free variables are loaded from the
//! closure's capture array on entry.

use crate::ast::{Datum, Expr};
use crate::bytecode::PrimOp;
use crate::passes;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::runtime::runtime_builtin;
use super::state::CodeGen;
use super::CodeGenError;

pub(super) const FALSE_WORD: i64 = 0b000101;
pub(super) const TRUE_WORD: i64 = 0b100101;
pub(super) const NIL_WORD: i64 = 0b01101;
pub(super) const VOID_WORD: i64 = 0b10101;
pub(super) const UNDEF_WORD: i64 = 0b11101;

fn fixnum_word(n: i64) -> i64 {
    n.wrapping_shl(3)
}

#[derive(Clone)]
struct Binding {
    ssa: String,
    /// The SSA value is a box word; reads load through it.
    boxed: bool,
}

pub(super) struct ExprGen<'a> {
    cg: &'a mut CodeGen,
    pub body: String,
    /// Label of the block currently being appended to (phi predecessors).
    block: String,
    table: HashMap<String, Binding>,
    assigned: &'a HashSet<String>,
}

impl<'a> ExprGen<'a> {
    pub(super) fn new(cg: &'a mut CodeGen, assigned: &'a HashSet<String>) -> Self {
        let mut g = ExprGen {
            cg,
            body: String::new(),
            block: String::new(),
            table: HashMap::new(),
            assigned,
        };
        g.label("entry");
        g
    }

    pub(super) fn line(&mut self, text: impl AsRef<str>) {
        self.body.push_str("  ");
        self.body.push_str(text.as_ref());
        self.body.push('\n');
    }

    pub(super) fn fresh_temp(&mut self) -> String {
        self.cg.fresh_temp()
    }

    /// The module symbol of a non-lambda top-level define.
    pub(super) fn global_symbol(&self, name: &str) -> Result<String, CodeGenError> {
        self.cg.global_vars.get(name).cloned().ok_or_else(|| {
            CodeGenError::Logic(format!("`{}` is not a module global", name))
        })
    }

    /// Consume the generator, yielding the accumulated body text.
    pub(super) fn finish(self) -> String {
        self.body
    }

    fn label(&mut self, label: impl Into<String>) {
        let label = label.into();
        self.body.push_str(&label);
        self.body.push_str(":\n");
        self.block = label;
    }

    pub(super) fn lower(&mut self, expr: &Expr) -> Result<String, CodeGenError> {
        match expr {
            Expr::Number(n) => Ok(fixnum_word(*n).to_string()),
            Expr::Boolean(true) => Ok(TRUE_WORD.to_string()),
            Expr::Boolean(false) => Ok(FALSE_WORD.to_string()),
            Expr::Undefined => Ok(UNDEF_WORD.to_string()),
            Expr::Var(name) => self.var_value(name),
            Expr::Quote(datum) => self.quote_value(datum),
            Expr::Begin(exprs) => {
                let mut last = VOID_WORD.to_string();
                for e in exprs {
                    last = self.lower(e)?;
                }
                Ok(last)
            }
            Expr::If { pred, then, els } => self.gen_if(pred, then, els),
            Expr::Let { bindings, body } => self.gen_let(bindings, body),
            Expr::SetBang { name, expr } => self.gen_set(name, expr),
            Expr::Lambda { params, body } => self.gen_lambda(params, body),
            Expr::Apply { operator, operands } => self.gen_apply(operator, operands),
            Expr::Define { .. } => Err(CodeGenError::Logic(
                "define is only allowed at top level".to_string(),
            )),
            Expr::LetRec { .. } => Err(CodeGenError::Logic(
                "letrec survived normalization".to_string(),
            )),
        }
    }

    /// Is `name` resolvable at module level (and thus never a capture)?
    fn is_module_level(&self, name: &str) -> bool {
        self.cg.functions.contains_key(name)
            || self.cg.global_vars.contains_key(name)
            || runtime_builtin(name).is_some()
            || PrimOp::from_name(name).is_some()
    }

    fn var_value(&mut self, name: &str) -> Result<String, CodeGenError> {
        if let Some(binding) = self.table.get(name).cloned() {
            return if binding.boxed {
                Ok(self.load_box(&binding.ssa))
            } else {
                Ok(binding.ssa)
            };
        }
        if let Some(symbol) = self.cg.global_vars.get(name).cloned() {
            let v = self.cg.fresh_temp();
            self.line(format!("{} = load i64, ptr {}", v, symbol));
            return Ok(v);
        }
        if let Some(info) = self.cg.functions.get(name) {
            // a module function used as a value: wrap it in a closure
            let (symbol, arity) = (info.symbol.clone(), info.arity);
            let c = self.cg.fresh_temp();
            self.line(format!(
                "{} = call i64 @skein_alloc_closure(i64 ptrtoint (ptr @{} to i64), i64 {}, i64 0)",
                c, symbol, arity
            ));
            return Ok(c);
        }
        if runtime_builtin(name).is_some() || PrimOp::from_name(name).is_some() {
            return Err(CodeGenError::Logic(format!(
                "builtin `{}` cannot be used as a value in compiled code",
                name
            )));
        }
        Err(CodeGenError::Logic(format!("`{}` undefined", name)))
    }

    fn load_box(&mut self, box_ssa: &str) -> String {
        let p = self.cg.fresh_temp();
        let q = self.cg.fresh_temp();
        let v = self.cg.fresh_temp();
        self.line(format!("{} = and i64 {}, -8", p, box_ssa));
        self.line(format!("{} = inttoptr i64 {} to ptr", q, p));
        self.line(format!("{} = load i64, ptr {}", v, q));
        v
    }

    fn store_box(&mut self, box_ssa: &str, value: &str) {
        let p = self.cg.fresh_temp();
        let q = self.cg.fresh_temp();
        self.line(format!("{} = and i64 {}, -8", p, box_ssa));
        self.line(format!("{} = inttoptr i64 {} to ptr", q, p));
        self.line(format!("store i64 {}, ptr {}", value, q));
    }

    fn quote_value(&mut self, datum: &Rc<Datum>) -> Result<String, CodeGenError> {
        match &**datum {
            Datum::Number(n) => Ok(fixnum_word(*n).to_string()),
            Datum::Boolean(true) => Ok(TRUE_WORD.to_string()),
            Datum::Boolean(false) => Ok(FALSE_WORD.to_string()),
            Datum::Nil => Ok(NIL_WORD.to_string()),
            Datum::Symbol(_) | Datum::Pair(_, _) => {
                // hoisted to a module slot, initialized at the top of main
                let slot = self.cg.quote_global(datum)?;
                let v = self.cg.fresh_temp();
                self.line(format!("{} = load i64, ptr {}", v, slot));
                Ok(v)
            }
        }
    }

    fn gen_if(&mut self, pred: &Expr, then: &Expr, els: &Expr) -> Result<String, CodeGenError> {
        let pred = self.lower(pred)?;
        let cond = self.cg.fresh_temp();
        self.line(format!("{} = icmp ne i64 {}, {}", cond, pred, FALSE_WORD));
        let thn = self.cg.fresh_label("thn");
        let els_label = self.cg.fresh_label("els");
        let fin = self.cg.fresh_label("fin");
        self.line(format!("br i1 {}, label %{}, label %{}", cond, thn, els_label));

        self.label(thn);
        let tv = self.lower(then)?;
        self.line(format!("br label %{}", fin));
        let thn_end = self.block.clone();

        self.label(els_label);
        let ev = self.lower(els)?;
        self.line(format!("br label %{}", fin));
        let els_end = self.block.clone();

        self.label(fin);
        let phi = self.cg.fresh_temp();
        self.line(format!(
            "{} = phi i64 [ {}, %{} ], [ {}, %{} ]",
            phi, tv, thn_end, ev, els_end
        ));
        Ok(phi)
    }

    fn gen_let(
        &mut self,
        bindings: &[(String, Expr)],
        body: &Expr,
    ) -> Result<String, CodeGenError> {
        // initializers run in the enclosing scope, left to right
        let mut prepared = Vec::with_capacity(bindings.len());
        for (name, init) in bindings {
            let v = self.lower(init)?;
            let binding = if self.assigned.contains(name) {
                let b = self.cg.fresh_temp();
                self.line(format!("{} = call i64 @box(i64 {})", b, v));
                Binding { ssa: b, boxed: true }
            } else {
                Binding { ssa: v, boxed: false }
            };
            prepared.push((name.clone(), binding));
        }
        let mut shadowed = Vec::with_capacity(prepared.len());
        for (name, binding) in prepared {
            shadowed.push((name.clone(), self.table.insert(name, binding)));
        }
        let result = self.lower(body)?;
        for (name, old) in shadowed.into_iter().rev() {
            match old {
                Some(binding) => self.table.insert(name, binding),
                None => self.table.remove(&name),
            };
        }
        Ok(result)
    }

    fn gen_set(&mut self, name: &str, expr: &Expr) -> Result<String, CodeGenError> {
        let value = self.lower(expr)?;
        if let Some(binding) = self.table.get(name).cloned() {
            if !binding.boxed {
                return Err(CodeGenError::Logic(format!(
                    "assignment to unboxed local `{}`",
                    name
                )));
            }
            self.store_box(&binding.ssa, &value);
            return Ok(VOID_WORD.to_string());
        }
        if let Some(symbol) = self.cg.global_vars.get(name).cloned() {
            self.line(format!("store i64 {}, ptr {}", value, symbol));
            return Ok(VOID_WORD.to_string());
        }
        if self.is_module_level(name) {
            return Err(CodeGenError::Logic(format!("cannot assign to `{}`", name)));
        }
        Err(CodeGenError::Logic(format!("`{}` undefined", name)))
    }

    fn gen_lambda(
        &mut self,
        params: &Rc<Vec<String>>,
        body: &Rc<Expr>,
    ) -> Result<String, CodeGenError> {
        let bound: HashSet<String> = params.iter().cloned().collect();
        let free = {
            let functions = &self.cg.functions;
            let global_vars = &self.cg.global_vars;
            passes::free_vars(body, &bound, &|name| {
                functions.contains_key(name)
                    || global_vars.contains_key(name)
                    || runtime_builtin(name).is_some()
                    || PrimOp::from_name(name).is_some()
            })
        };
        for fv in &free {
            if !self.table.contains_key(fv) {
                return Err(CodeGenError::Logic(format!("`{}` undefined", fv)));
            }
        }

        let symbol = self.cg.fresh_lambda_symbol();
        gen_function(self.cg, &symbol, params, body, &free, self.assigned)?;

        let c = self.cg.fresh_temp();
        self.line(format!(
            "{} = call i64 @skein_alloc_closure(i64 ptrtoint (ptr @{} to i64), i64 {}, i64 {})",
            c,
            symbol,
            params.len(),
            free.len()
        ));
        for (i, fv) in free.iter().enumerate() {
            // for boxed outers the box word itself is captured
            let captured = self.table[fv].ssa.clone();
            self.line(format!(
                "call void @skein_closure_set(i64 {}, i64 {}, i64 {})",
                c, i, captured
            ));
        }
        Ok(c)
    }

    fn gen_apply(
        &mut self,
        operator: &Expr,
        operands: &[Expr],
    ) -> Result<String, CodeGenError> {
        if let Expr::Var(name) = operator
            && !self.table.contains_key(name)
        {
            if let Some(op) = PrimOp::from_name(name) {
                check_arity(name, 2, operands.len())?;
                let a = self.lower(&operands[0])?;
                let b = self.lower(&operands[1])?;
                return Ok(self.gen_inline_prim(op, &a, &b));
            }
            if let Some((symbol, arity)) = runtime_builtin(name) {
                check_arity(name, arity, operands.len())?;
                let args = self.gen_args(operands)?;
                let r = self.cg.fresh_temp();
                self.line(format!("{} = call i64 @{}({})", r, symbol, int_args(&args)));
                return Ok(r);
            }
            if let Some(info) = self.cg.functions.get(name) {
                let (symbol, arity) = (info.symbol.clone(), info.arity);
                check_arity(name, arity, operands.len())?;
                let args = self.gen_args(operands)?;
                let r = self.cg.fresh_temp();
                let mut all = vec!["i64 0".to_string()];
                all.extend(args.iter().map(|a| format!("i64 {}", a)));
                self.line(format!("{} = call i64 @{}({})", r, symbol, all.join(", ")));
                return Ok(r);
            }
            if self.cg.global_vars.contains_key(name) {
                let args = self.gen_args(operands)?;
                let clos = self.var_value(name)?;
                return self.gen_indirect_call(&clos, &args);
            }
            return Err(CodeGenError::Logic(format!(
                "could not find function: {}",
                name
            )));
        }

        // operands first, operator last, matching the other back-ends
        let args = self.gen_args(operands)?;
        let clos = self.lower(operator)?;
        self.gen_indirect_call(&clos, &args)
    }

    fn gen_args(&mut self, operands: &[Expr]) -> Result<Vec<String>, CodeGenError> {
        let mut args = Vec::with_capacity(operands.len());
        for rand in operands {
            args.push(self.lower(rand)?);
        }
        Ok(args)
    }

    fn gen_indirect_call(
        &mut self,
        clos: &str,
        args: &[String],
    ) -> Result<String, CodeGenError> {
        let argc = args.len();
        let p = self.cg.fresh_temp();
        let cp = self.cg.fresh_temp();
        let arity_ptr = self.cg.fresh_temp();
        let arity = self.cg.fresh_temp();
        let ok = self.cg.fresh_temp();
        let call_label = self.cg.fresh_label("call");
        let bad_label = self.cg.fresh_label("badarity");

        self.line(format!("{} = and i64 {}, -8", p, clos));
        self.line(format!("{} = inttoptr i64 {} to ptr", cp, p));
        self.line(format!(
            "{} = getelementptr inbounds %Closure, ptr {}, i32 0, i32 0",
            arity_ptr, cp
        ));
        self.line(format!("{} = load i64, ptr {}", arity, arity_ptr));
        self.line(format!("{} = icmp eq i64 {}, {}", ok, arity, argc));
        self.line(format!(
            "br i1 {}, label %{}, label %{}",
            ok, call_label, bad_label
        ));

        self.label(bad_label);
        self.line(format!(
            "call void @skein_arity_error(i64 {}, i64 {})",
            arity, argc
        ));
        self.line("unreachable");

        self.label(call_label);
        let code_ptr = self.cg.fresh_temp();
        let code = self.cg.fresh_temp();
        let func = self.cg.fresh_temp();
        let r = self.cg.fresh_temp();
        self.line(format!(
            "{} = getelementptr inbounds %Closure, ptr {}, i32 0, i32 1",
            code_ptr, cp
        ));
        self.line(format!("{} = load i64, ptr {}", code, code_ptr));
        self.line(format!("{} = inttoptr i64 {} to ptr", func, code));
        let mut all = vec![format!("i64 {}", clos)];
        all.extend(args.iter().map(|a| format!("i64 {}", a)));
        self.line(format!("{} = call i64 {}({})", r, func, all.join(", ")));
        Ok(r)
    }

    fn gen_inline_prim(&mut self, op: PrimOp, a: &str, b: &str) -> String {
        match op {
            PrimOp::Add => {
                let r = self.cg.fresh_temp();
                self.line(format!("{} = add i64 {}, {}", r, a, b));
                r
            }
            PrimOp::Sub => {
                let r = self.cg.fresh_temp();
                self.line(format!("{} = sub i64 {}, {}", r, a, b));
                r
            }
            PrimOp::Mul => {
                // clear one tag before multiplying so the product stays tagged
                let s1 = self.cg.fresh_temp();
                let s2 = self.cg.fresh_temp();
                let m = self.cg.fresh_temp();
                let r = self.cg.fresh_temp();
                self.line(format!("{} = ashr i64 {}, 3", s1, a));
                self.line(format!("{} = ashr i64 {}, 3", s2, b));
                self.line(format!("{} = mul i64 {}, {}", m, s1, s2));
                self.line(format!("{} = shl i64 {}, 3", r, m));
                r
            }
            PrimOp::Div => {
                let d = self.cg.fresh_temp();
                let r = self.cg.fresh_temp();
                self.line(format!("{} = sdiv i64 {}, {}", d, a, b));
                self.line(format!("{} = shl i64 {}, 3", r, d));
                r
            }
            PrimOp::Mod => {
                let r = self.cg.fresh_temp();
                self.line(format!("{} = srem i64 {}, {}", r, a, b));
                r
            }
            PrimOp::Lt => self.gen_cmp("slt", a, b),
            PrimOp::Le => self.gen_cmp("sle", a, b),
            PrimOp::Eq => self.gen_cmp("eq", a, b),
            PrimOp::Gt => self.gen_cmp("sgt", a, b),
            PrimOp::Ge => self.gen_cmp("sge", a, b),
            PrimOp::Neq => self.gen_cmp("ne", a, b),
        }
    }

    fn gen_cmp(&mut self, cond: &str, a: &str, b: &str) -> String {
        let c = self.cg.fresh_temp();
        let z = self.cg.fresh_temp();
        let s = self.cg.fresh_temp();
        let r = self.cg.fresh_temp();
        self.line(format!("{} = icmp {} i64 {}, {}", c, cond, a, b));
        self.line(format!("{} = zext i1 {} to i64", z, c));
        self.line(format!("{} = shl i64 {}, 5", s, z));
        self.line(format!("{} = or i64 {}, {}", r, s, FALSE_WORD));
        r
    }
}

fn int_args(args: &[String]) -> String {
    args.iter()
        .map(|a| format!("i64 {}", a))
        .collect::<Vec<_>>()
        .join(", ")
}

fn check_arity(name: &str, expected: usize, got: usize) -> Result<(), CodeGenError> {
    if expected != got {
        return Err(CodeGenError::Logic(format!(
            "{}: expect {} arg(s), but got {}",
            name, expected, got
        )));
    }
    Ok(())
}

/// Generate one module function: the closure word first, then the
/// parameters. Free variables load from the capture array on entry;
/// assigned parameters are copied into fresh boxes.
pub(super) fn gen_function(
    cg: &mut CodeGen,
    symbol: &str,
    params: &[String],
    body: &Expr,
    free: &[String],
    assigned: &HashSet<String>,
) -> Result<(), CodeGenError> {
    let mut g = ExprGen::new(cg, assigned);

    if !free.is_empty() {
        let p = g.cg.fresh_temp();
        let cp = g.cg.fresh_temp();
        let fvs_ptr = g.cg.fresh_temp();
        let fvs = g.cg.fresh_temp();
        g.line(format!("{} = and i64 %self, -8", p));
        g.line(format!("{} = inttoptr i64 {} to ptr", cp, p));
        g.line(format!(
            "{} = getelementptr inbounds %Closure, ptr {}, i32 0, i32 2",
            fvs_ptr, cp
        ));
        g.line(format!("{} = load ptr, ptr {}", fvs, fvs_ptr));
        for (i, name) in free.iter().enumerate() {
            let ep = g.cg.fresh_temp();
            let v = g.cg.fresh_temp();
            g.line(format!(
                "{} = getelementptr inbounds i64, ptr {}, i64 {}",
                ep, fvs, i
            ));
            g.line(format!("{} = load i64, ptr {}", v, ep));
            // a boxed outer binding captures its box word
            g.table.insert(
                name.clone(),
                Binding { ssa: v, boxed: assigned.contains(name) },
            );
        }
    }

    for (i, param) in params.iter().enumerate() {
        let ssa = format!("%p{}", i);
        if assigned.contains(param) {
            let b = g.cg.fresh_temp();
            g.line(format!("{} = call i64 @box(i64 {})", b, ssa));
            g.table.insert(param.clone(), Binding { ssa: b, boxed: true });
        } else {
            g.table.insert(param.clone(), Binding { ssa, boxed: false });
        }
    }

    let result = g.lower(body)?;
    g.line(format!("ret i64 {}", result));
    let fn_body = std::mem::take(&mut g.body);

    let mut sig = vec!["i64 %self".to_string()];
    sig.extend((0..params.len()).map(|i| format!("i64 %p{}", i)));
    cg.funcs.push_str(&format!(
        "define i64 @{}({}) {{\n{}}}\n\n",
        symbol,
        sig.join(", "),
        fn_body
    ));
    Ok(())
}
