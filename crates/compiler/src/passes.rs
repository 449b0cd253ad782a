//! Front-end passes shared by the bytecode and native back-ends.
//!
//! - `normalize` rewrites `letrec` into `let` over sentinel initializers
//!   followed by assignments, so later passes see only `let`.
//! - `collect_assigned` computes the names targeted by `set!` below a node.
//! - `convert_assignments` boxes assigned local bindings: initializers are
//!   wrapped in `(box ...)`, reads become `(unbox x)` and writes become
//!   `(set-box! x v)`. Closures then capture the box, so a captured
//!   variable mutated later is observed through the shared cell. Globals
//!   are left alone; the bytecode compiler handles them with top-frame
//!   stores.
//! - `free_vars` computes the free identifiers of an expression, excluding
//!   a caller-supplied global predicate.

use crate::ast::Expr;
use std::collections::{BTreeSet, HashSet};

/// Rewrite every `letrec` into `let` + `set!`:
///
/// ```text
/// (letrec ((x e1) (y e2)) body)
///   => (let ((x <undefined>) (y <undefined>))
///        (begin (set! x e1) (set! y e2) body))
/// ```
///
/// Combined with `convert_assignments` this boxes every letrec binding, so
/// the sentinel is observable only through a read-before-initialization.
pub fn normalize(expr: &Expr) -> Expr {
    match expr {
        Expr::LetRec { bindings, body } => {
            let names: Vec<_> = bindings.iter().map(|(n, _)| n.clone()).collect();
            let mut seq: Vec<Expr> = bindings
                .iter()
                .map(|(n, init)| Expr::SetBang {
                    name: n.clone(),
                    expr: Box::new(normalize(init)),
                })
                .collect();
            seq.push(normalize(body));
            Expr::Let {
                bindings: names.into_iter().map(|n| (n, Expr::Undefined)).collect(),
                body: Box::new(Expr::Begin(seq)),
            }
        }
        Expr::Define { name, body } => Expr::Define {
            name: name.clone(),
            body: Box::new(normalize(body)),
        },
        Expr::SetBang { name, expr } => Expr::SetBang {
            name: name.clone(),
            expr: Box::new(normalize(expr)),
        },
        Expr::Begin(exprs) => Expr::Begin(exprs.iter().map(normalize).collect()),
        Expr::If { pred, then, els } => Expr::If {
            pred: Box::new(normalize(pred)),
            then: Box::new(normalize(then)),
            els: Box::new(normalize(els)),
        },
        Expr::Let { bindings, body } => Expr::Let {
            bindings: bindings
                .iter()
                .map(|(n, e)| (n.clone(), normalize(e)))
                .collect(),
            body: Box::new(normalize(body)),
        },
        Expr::Lambda { params, body } => Expr::Lambda {
            params: std::rc::Rc::clone(params),
            body: std::rc::Rc::new(normalize(body)),
        },
        Expr::Apply { operator, operands } => Expr::Apply {
            operator: Box::new(normalize(operator)),
            operands: operands.iter().map(normalize).collect(),
        },
        Expr::Number(_)
        | Expr::Boolean(_)
        | Expr::Var(_)
        | Expr::Quote(_)
        | Expr::Undefined => expr.clone(),
    }
}

/// Collect every name that is the target of a `set!` anywhere below `expr`.
/// Name-based, so shadowed bindings of the same name are over-approximated;
/// boxing an unassigned binding is harmless.
pub fn collect_assigned(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::SetBang { name, expr } => {
            out.insert(name.clone());
            collect_assigned(expr, out);
        }
        Expr::Define { body, .. } => collect_assigned(body, out),
        Expr::Begin(exprs) => {
            for e in exprs {
                collect_assigned(e, out);
            }
        }
        Expr::If { pred, then, els } => {
            collect_assigned(pred, out);
            collect_assigned(then, out);
            collect_assigned(els, out);
        }
        Expr::Let { bindings, body } | Expr::LetRec { bindings, body } => {
            for (_, init) in bindings {
                collect_assigned(init, out);
            }
            collect_assigned(body, out);
        }
        Expr::Lambda { body, .. } => collect_assigned(body, out),
        Expr::Apply { operator, operands } => {
            collect_assigned(operator, out);
            for e in operands {
                collect_assigned(e, out);
            }
        }
        Expr::Number(_)
        | Expr::Boolean(_)
        | Expr::Var(_)
        | Expr::Quote(_)
        | Expr::Undefined => {}
    }
}

fn call1(name: &str, arg: Expr) -> Expr {
    Expr::Apply {
        operator: Box::new(Expr::Var(name.to_string())),
        operands: vec![arg],
    }
}

fn call2(name: &str, a: Expr, b: Expr) -> Expr {
    Expr::Apply {
        operator: Box::new(Expr::Var(name.to_string())),
        operands: vec![a, b],
    }
}

/// Box every assigned local binding. `boxed` is the set of in-scope names
/// whose binding currently holds a box rather than the value itself.
fn convert(expr: &Expr, boxed: &HashSet<String>) -> Expr {
    match expr {
        Expr::Var(name) if boxed.contains(name) => call1("unbox", expr.clone()),
        Expr::SetBang { name, expr: rhs } => {
            let rhs = convert(rhs, boxed);
            if boxed.contains(name) {
                call2("set-box!", Expr::Var(name.clone()), rhs)
            } else {
                // target is a global; the compiler stores into the top frame
                Expr::SetBang { name: name.clone(), expr: Box::new(rhs) }
            }
        }
        Expr::Let { bindings, body } => {
            let mut assigned = HashSet::new();
            collect_assigned(body, &mut assigned);
            let mut inner = boxed.clone();
            let mut converted = Vec::with_capacity(bindings.len());
            for (name, init) in bindings {
                let init = convert(init, boxed);
                if assigned.contains(name) {
                    converted.push((name.clone(), call1("box", init)));
                    inner.insert(name.clone());
                } else {
                    converted.push((name.clone(), init));
                    inner.remove(name);
                }
            }
            Expr::Let {
                bindings: converted,
                body: Box::new(convert(body, &inner)),
            }
        }
        Expr::Lambda { params, body } => {
            let mut assigned = HashSet::new();
            collect_assigned(body, &mut assigned);
            let rebound: Vec<_> = params
                .iter()
                .filter(|p| assigned.contains(*p))
                .cloned()
                .collect();
            let mut inner = boxed.clone();
            for p in params.iter() {
                inner.remove(p);
            }
            for p in &rebound {
                inner.insert(p.clone());
            }
            let new_body = convert(body, &inner);
            let new_body = if rebound.is_empty() {
                new_body
            } else {
                // re-bind each assigned parameter to a box over its value
                Expr::Let {
                    bindings: rebound
                        .iter()
                        .map(|p| (p.clone(), call1("box", Expr::Var(p.clone()))))
                        .collect(),
                    body: Box::new(new_body),
                }
            };
            Expr::Lambda {
                params: std::rc::Rc::clone(params),
                body: std::rc::Rc::new(new_body),
            }
        }
        Expr::Define { name, body } => Expr::Define {
            name: name.clone(),
            body: Box::new(convert(body, boxed)),
        },
        Expr::Begin(exprs) => Expr::Begin(exprs.iter().map(|e| convert(e, boxed)).collect()),
        Expr::If { pred, then, els } => Expr::If {
            pred: Box::new(convert(pred, boxed)),
            then: Box::new(convert(then, boxed)),
            els: Box::new(convert(els, boxed)),
        },
        Expr::Apply { operator, operands } => Expr::Apply {
            operator: Box::new(convert(operator, boxed)),
            operands: operands.iter().map(|e| convert(e, boxed)).collect(),
        },
        Expr::LetRec { .. } => {
            // normalize removes letrec before conversion
            convert(&normalize(expr), boxed)
        }
        Expr::Number(_)
        | Expr::Boolean(_)
        | Expr::Var(_)
        | Expr::Quote(_)
        | Expr::Undefined => expr.clone(),
    }
}

/// Assignment-convert `expr` (after normalizing away letrec).
pub fn convert_assignments(expr: &Expr) -> Expr {
    convert(&normalize(expr), &HashSet::new())
}

fn walk_free(
    expr: &Expr,
    bound: &HashSet<String>,
    is_global: &dyn Fn(&str) -> bool,
    out: &mut BTreeSet<String>,
) {
    match expr {
        Expr::Var(name) => {
            if !bound.contains(name) && !is_global(name) {
                out.insert(name.clone());
            }
        }
        Expr::SetBang { name, expr } => {
            // the target itself is a reference: assignment from an inner
            // lambda forces capture of the (boxed) binding
            if !bound.contains(name) && !is_global(name) {
                out.insert(name.clone());
            }
            walk_free(expr, bound, is_global, out);
        }
        Expr::Define { body, .. } => walk_free(body, bound, is_global, out),
        Expr::Begin(exprs) => {
            for e in exprs {
                walk_free(e, bound, is_global, out);
            }
        }
        Expr::If { pred, then, els } => {
            walk_free(pred, bound, is_global, out);
            walk_free(then, bound, is_global, out);
            walk_free(els, bound, is_global, out);
        }
        Expr::Let { bindings, body } => {
            for (_, init) in bindings {
                walk_free(init, bound, is_global, out);
            }
            let mut inner = bound.clone();
            inner.extend(bindings.iter().map(|(n, _)| n.clone()));
            walk_free(body, &inner, is_global, out);
        }
        Expr::LetRec { bindings, body } => {
            let mut inner = bound.clone();
            inner.extend(bindings.iter().map(|(n, _)| n.clone()));
            for (_, init) in bindings {
                walk_free(init, &inner, is_global, out);
            }
            walk_free(body, &inner, is_global, out);
        }
        Expr::Lambda { params, body } => {
            let mut inner = bound.clone();
            inner.extend(params.iter().cloned());
            walk_free(body, &inner, is_global, out);
        }
        Expr::Apply { operator, operands } => {
            walk_free(operator, bound, is_global, out);
            for e in operands {
                walk_free(e, bound, is_global, out);
            }
        }
        Expr::Number(_) | Expr::Boolean(_) | Expr::Quote(_) | Expr::Undefined => {}
    }
}

/// Free identifiers of `expr`, in sorted order: referenced names that are
/// neither bound below `expr` (starting from `bound`) nor global.
pub fn free_vars(
    expr: &Expr,
    bound: &HashSet<String>,
    is_global: &dyn Fn(&str) -> bool,
) -> Vec<String> {
    let mut out = BTreeSet::new();
    walk_free(expr, bound, is_global, &mut out);
    out.into_iter().collect()
}
