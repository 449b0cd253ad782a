//! The CPS-linked bytecode compiler.
//!
//! Each compile step receives the compile-time environment and the handle
//! of the continuation instruction — what runs after the compiled form has
//! left its result in the accumulator — and returns the entry handle of the
//! compiled form. The instruction arena and the top-frame layout persist
//! across top-level forms, so closures stored in globals stay valid for the
//! life of a session.
//!
//! Input is normalized first (letrec rewritten away, assigned locals
//! boxed), so compilation only deals with values, `let`, lambdas,
//! applications and top-frame stores.

use crate::ast::{Datum, Expr};
use crate::builtins::PRIMITIVE_NAMES;
use crate::bytecode::{CodeGraph, Instr, InstrId, PrimOp};
use crate::error::{Error, Result};
use crate::passes;
use std::collections::HashMap;
use std::rc::Rc;
use skein_core::TaggedValue;

/// Compile-time layout of the process-wide top frame.
struct GlobalFrame {
    slots: HashMap<String, usize>,
    names: Vec<String>,
}

impl GlobalFrame {
    fn new() -> Self {
        let mut frame = GlobalFrame { slots: HashMap::new(), names: Vec::new() };
        for name in PRIMITIVE_NAMES {
            frame.define(name);
        }
        frame
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    /// Slot of `name`, allocating one if this is the first sighting.
    fn define(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.slots.get(name) {
            return slot;
        }
        let slot = self.names.len();
        self.slots.insert(name.to_string(), slot);
        self.names.push(name.to_string());
        slot
    }
}

pub struct ByteCodeCompiler {
    graph: CodeGraph,
    globals: GlobalFrame,
    quote_cache: HashMap<usize, TaggedValue>,
}

/// Local frame layout: name -> slot offset within the frame.
type Frame = HashMap<String, usize>;

impl ByteCodeCompiler {
    pub fn new() -> Self {
        ByteCodeCompiler {
            graph: CodeGraph::new(),
            globals: GlobalFrame::new(),
            quote_cache: HashMap::new(),
        }
    }

    pub fn graph(&self) -> &CodeGraph {
        &self.graph
    }

    /// Number of top-frame slots the VM must provide.
    pub fn globals_len(&self) -> usize {
        self.globals.names.len()
    }

    /// Top-frame slot names, for runtime unbound-identifier reporting.
    pub fn global_names(&self) -> &[String] {
        &self.globals.names
    }

    /// Compile one top-level form, returning its entry handle.
    pub fn compile_toplevel(&mut self, expr: &Expr) -> Result<InstrId> {
        let halt = self.graph.emit(Instr::Halt);
        match expr {
            Expr::Define { name, body } => {
                let body = passes::convert_assignments(body);
                let slot = self.globals.define(name);
                let done = self.graph.emit(Instr::Imm(TaggedValue::VOID, halt));
                let store = self.graph.emit(Instr::GSet(slot, done));
                self.compile(&body, &Frame::new(), store)
            }
            _ => {
                let expr = passes::convert_assignments(expr);
                self.compile(&expr, &Frame::new(), halt)
            }
        }
    }

    fn compile(&mut self, expr: &Expr, env: &Frame, cont: InstrId) -> Result<InstrId> {
        match expr {
            Expr::Number(n) => {
                Ok(self.graph.emit(Instr::Imm(TaggedValue::fixnum(*n), cont)))
            }
            Expr::Boolean(b) => {
                Ok(self.graph.emit(Instr::Imm(TaggedValue::boolean(*b), cont)))
            }
            Expr::Undefined => Ok(self.graph.emit(Instr::Imm(TaggedValue::UNDEF, cont))),
            Expr::Quote(datum) => {
                let value = self.quote_value(datum);
                Ok(self.graph.emit(Instr::Imm(value, cont)))
            }
            Expr::Var(name) => match env.get(name) {
                Some(&offset) => Ok(self.graph.emit(Instr::MemRef(offset, cont))),
                None => {
                    let slot = self.globals.define(name);
                    Ok(self.graph.emit(Instr::GRef(slot, cont)))
                }
            },
            Expr::If { pred, then, els } => {
                let thnc = self.compile(then, env, cont)?;
                let elsc = self.compile(els, env, cont)?;
                let branch = self.graph.emit(Instr::Branch(thnc, elsc));
                self.compile(pred, env, branch)
            }
            Expr::Begin(exprs) => {
                if exprs.is_empty() {
                    return Ok(self.graph.emit(Instr::Imm(TaggedValue::VOID, cont)));
                }
                let mut next = cont;
                for e in exprs.iter().rev() {
                    next = self.compile(e, env, next)?;
                }
                Ok(next)
            }
            Expr::SetBang { name, expr } => {
                if env.contains_key(name) {
                    // assignment conversion boxes every assigned local
                    return Err(Error::Internal(format!(
                        "unconverted assignment to local `{}`",
                        name
                    )));
                }
                // only already-known top-frame names are assignable
                let slot = self
                    .globals
                    .lookup(name)
                    .ok_or_else(|| Error::Unbound(name.clone()))?;
                let done = self.graph.emit(Instr::Imm(TaggedValue::VOID, cont));
                let store = self.graph.emit(Instr::GSet(slot, done));
                self.compile(expr, env, store)
            }
            Expr::Let { bindings, body } => {
                // immediate application of a lambda over the bindings
                let desugared = Expr::Apply {
                    operator: Box::new(Expr::Lambda {
                        params: Rc::new(bindings.iter().map(|(n, _)| n.clone()).collect()),
                        body: Rc::new((**body).clone()),
                    }),
                    operands: bindings.iter().map(|(_, init)| init.clone()).collect(),
                };
                self.compile(&desugared, env, cont)
            }
            Expr::LetRec { .. } => Err(Error::Internal(
                "letrec survived normalization".to_string(),
            )),
            Expr::Define { .. } => {
                Err(Error::Parse("define is only allowed at top level".to_string()))
            }
            Expr::Lambda { params, body } => self.compile_lambda(params, body, env, cont),
            Expr::Apply { operator, operands } => {
                self.compile_apply(operator, operands, env, cont)
            }
        }
    }

    fn compile_lambda(
        &mut self,
        params: &Rc<Vec<String>>,
        body: &Expr,
        env: &Frame,
        cont: InstrId,
    ) -> Result<InstrId> {
        let bound = params.iter().cloned().collect();
        // anything not bound in the enclosing frame is a top-frame name
        let free = passes::free_vars(body, &bound, &|name| !env.contains_key(name));

        let mut captures = Vec::with_capacity(free.len());
        let mut inner = Frame::new();
        for (i, p) in params.iter().enumerate() {
            inner.insert(p.clone(), i);
        }
        for (j, name) in free.iter().enumerate() {
            captures.push(env[name]);
            inner.insert(name.clone(), params.len() + j);
        }

        let ret = self.graph.emit(Instr::Ret(params.len() + free.len()));
        let entry = self.compile(body, &inner, ret)?;
        Ok(self.graph.emit(Instr::Closure {
            code: entry,
            arity: params.len(),
            captures,
            next: cont,
        }))
    }

    fn compile_apply(
        &mut self,
        operator: &Expr,
        operands: &[Expr],
        env: &Frame,
        cont: InstrId,
    ) -> Result<InstrId> {
        // primitive fast path: binary application of a literal operator
        // name that is not locally shadowed
        if let Expr::Var(name) = operator
            && let Some(op) = PrimOp::from_name(name)
            && operands.len() == 2
            && !env.contains_key(name)
        {
            let pop = self.graph.emit(Instr::Pop(2, cont));
            let mut next = self.graph.emit(Instr::Prim(op, pop));
            for arg in operands.iter().rev() {
                let push = self.graph.emit(Instr::Push(next));
                next = self.compile(arg, env, push)?;
            }
            return Ok(next);
        }

        // general case: frame, operands left to right, operator, call
        let call = self.graph.emit(Instr::Call);
        let mut next = self.compile(operator, env, call)?;
        for arg in operands.iter().rev() {
            let push = self.graph.emit(Instr::Push(next));
            next = self.compile(arg, env, push)?;
        }
        Ok(self.graph.emit(Instr::Frame(cont, next)))
    }

    /// Convert a quoted datum to a tagged constant, once per quote node.
    fn quote_value(&mut self, datum: &Rc<Datum>) -> TaggedValue {
        let key = Rc::as_ptr(datum) as usize;
        if let Some(&v) = self.quote_cache.get(&key) {
            return v;
        }
        let value = datum_to_tagged(datum);
        self.quote_cache.insert(key, value);
        value
    }
}

impl Default for ByteCodeCompiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the tagged heap form of a datum.
pub fn datum_to_tagged(datum: &Datum) -> TaggedValue {
    match datum {
        Datum::Number(n) => TaggedValue::fixnum(*n),
        Datum::Boolean(b) => TaggedValue::boolean(*b),
        Datum::Symbol(name) => skein_core::intern(name),
        Datum::Nil => TaggedValue::NIL,
        Datum::Pair(car, cdr) => {
            skein_core::cons(datum_to_tagged(car), datum_to_tagged(cdr))
        }
    }
}
