//! The tree-walking evaluator: reference semantics by direct AST walk.
//!
//! Evaluation rules:
//! - only `#f` is false;
//! - application operands evaluate left to right, the operator last;
//! - quoted data converts once per quote node (memoized);
//! - letrec binds sentinels first, then fills slots left to right.

use crate::ast::{Datum, Expr};
use crate::builtins;
use crate::env::{Env, EnvRef};
use crate::error::{Error, Result};
use crate::value::{ClosureData, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub struct Evaluator {
    top: EnvRef<Value>,
    quote_cache: RefCell<HashMap<usize, Value>>,
}

impl Evaluator {
    /// An evaluator over a fresh top frame holding the builtins.
    pub fn new() -> Self {
        Evaluator {
            top: builtins::top_env(),
            quote_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Evaluate one top-level form. `define` installs a binding in the top
    /// frame (and persists across errors in later forms).
    pub fn eval_toplevel(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Define { name, body } => {
                let value = self.eval(body, &self.top)?;
                self.top.bind(name.clone(), value);
                Ok(Value::Void)
            }
            _ => self.eval(expr, &self.top),
        }
    }

    fn eval(&self, expr: &Expr, env: &EnvRef<Value>) -> Result<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Boolean(b) => Ok(Value::Boolean(*b)),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Var(name) => match env.find(name)? {
                Value::Undefined => Err(Error::Unbound(name.clone())),
                v => Ok(v),
            },
            Expr::Quote(datum) => Ok(self.datum_value(datum)),
            Expr::Define { .. } => Err(Error::Parse(
                "define is only allowed at top level".to_string(),
            )),
            Expr::SetBang { name, expr } => {
                let value = self.eval(expr, env)?;
                env.set(name, value)?;
                Ok(Value::Void)
            }
            Expr::Begin(exprs) => {
                let mut last = Value::Void;
                for e in exprs {
                    last = self.eval(e, env)?;
                }
                Ok(last)
            }
            Expr::If { pred, then, els } => {
                if self.eval(pred, env)?.is_truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(els, env)
                }
            }
            Expr::Let { bindings, body } => {
                // inits run in the enclosing scope, left to right
                let mut values = Vec::with_capacity(bindings.len());
                for (_, init) in bindings {
                    values.push(self.eval(init, env)?);
                }
                let inner = Env::extend(env);
                for ((name, _), value) in bindings.iter().zip(values) {
                    inner.bind(name.clone(), value);
                }
                self.eval(body, &inner)
            }
            Expr::LetRec { bindings, body } => {
                let inner = Env::extend(env);
                for (name, _) in bindings {
                    inner.bind(name.clone(), Value::Undefined);
                }
                for (name, init) in bindings {
                    let value = self.eval(init, &inner)?;
                    inner.bind(name.clone(), value);
                }
                self.eval(body, &inner)
            }
            Expr::Lambda { params, body } => Ok(Value::Closure(Rc::new(ClosureData {
                params: Rc::clone(params),
                body: Rc::clone(body),
                env: Rc::clone(env),
            }))),
            Expr::Apply { operator, operands } => {
                let mut args = Vec::with_capacity(operands.len());
                for rand in operands {
                    args.push(self.eval(rand, env)?);
                }
                let rator = self.eval(operator, env)?;
                self.apply(rator, args)
            }
        }
    }

    fn apply(&self, rator: Value, args: Vec<Value>) -> Result<Value> {
        match rator {
            Value::Closure(clos) => {
                if clos.params.len() != args.len() {
                    return Err(Error::Arity {
                        expected: clos.params.len(),
                        got: args.len(),
                    });
                }
                let frame = Env::extend(&clos.env);
                for (param, arg) in clos.params.iter().zip(args) {
                    frame.bind(param.clone(), arg);
                }
                self.eval(&clos.body, &frame)
            }
            Value::Procedure(proc) => (proc.func)(&args),
            other => Err(Error::Type {
                expected: "procedure",
                got: other.to_string(),
            }),
        }
    }

    /// Convert a quoted datum, once per quote node.
    fn datum_value(&self, datum: &Rc<Datum>) -> Value {
        let key = Rc::as_ptr(datum) as usize;
        if let Some(v) = self.quote_cache.borrow().get(&key) {
            return v.clone();
        }
        let value = convert_datum(datum);
        self.quote_cache.borrow_mut().insert(key, value.clone());
        value
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn convert_datum(datum: &Datum) -> Value {
    match datum {
        Datum::Number(n) => Value::Number(*n),
        Datum::Boolean(b) => Value::Boolean(*b),
        Datum::Symbol(name) => Value::symbol(name),
        Datum::Nil => Value::Nil,
        Datum::Pair(car, cdr) => Value::cons(convert_datum(car), convert_datum(cdr)),
    }
}
