//! Built-in procedures for the tree-walking evaluator.
//!
//! The top frame is populated once at startup and holds every builtin as a
//! first-class `Procedure` value. Arithmetic folds left over two or more
//! numbers; comparisons and the structural operations have fixed arities.

use crate::env::{Env, EnvRef};
use crate::error::{Error, Result};
use crate::value::{ProcedureData, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn check_exact(args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(Error::Arity { expected, got: args.len() });
    }
    Ok(())
}

fn check_at_least(args: &[Value], expected: usize) -> Result<()> {
    if args.len() < expected {
        return Err(Error::ArityAtLeast { expected, got: args.len() });
    }
    Ok(())
}

fn expect_number(v: &Value) -> Result<i64> {
    match v {
        Value::Number(n) => Ok(*n),
        other => Err(Error::Type { expected: "number", got: other.to_string() }),
    }
}

fn fold_arith(args: &[Value], op: fn(i64, i64) -> Result<i64>) -> Result<Value> {
    check_at_least(args, 2)?;
    let mut acc = expect_number(&args[0])?;
    for v in &args[1..] {
        acc = op(acc, expect_number(v)?)?;
    }
    Ok(Value::Number(acc))
}

fn compare(args: &[Value], op: fn(i64, i64) -> bool) -> Result<Value> {
    check_exact(args, 2)?;
    let a = expect_number(&args[0])?;
    let b = expect_number(&args[1])?;
    Ok(Value::Boolean(op(a, b)))
}

fn nonzero(n: i64, what: &'static str) -> Result<i64> {
    if n == 0 {
        return Err(Error::Type { expected: what, got: "0".to_string() });
    }
    Ok(n)
}

fn prim_add(args: &[Value]) -> Result<Value> {
    fold_arith(args, |a, b| Ok(a.wrapping_add(b)))
}

fn prim_sub(args: &[Value]) -> Result<Value> {
    fold_arith(args, |a, b| Ok(a.wrapping_sub(b)))
}

fn prim_mul(args: &[Value]) -> Result<Value> {
    fold_arith(args, |a, b| Ok(a.wrapping_mul(b)))
}

fn prim_div(args: &[Value]) -> Result<Value> {
    fold_arith(args, |a, b| Ok(a / nonzero(b, "nonzero divisor")?))
}

fn prim_mod(args: &[Value]) -> Result<Value> {
    check_exact(args, 2)?;
    let a = expect_number(&args[0])?;
    let b = nonzero(expect_number(&args[1])?, "nonzero modulus")?;
    Ok(Value::Number(a % b))
}

fn prim_lt(args: &[Value]) -> Result<Value> {
    compare(args, |a, b| a < b)
}

fn prim_le(args: &[Value]) -> Result<Value> {
    compare(args, |a, b| a <= b)
}

fn prim_num_eq(args: &[Value]) -> Result<Value> {
    compare(args, |a, b| a == b)
}

fn prim_gt(args: &[Value]) -> Result<Value> {
    compare(args, |a, b| a > b)
}

fn prim_ge(args: &[Value]) -> Result<Value> {
    compare(args, |a, b| a >= b)
}

fn prim_num_ne(args: &[Value]) -> Result<Value> {
    compare(args, |a, b| a != b)
}

fn prim_cons(args: &[Value]) -> Result<Value> {
    check_exact(args, 2)?;
    Ok(Value::cons(args[0].clone(), args[1].clone()))
}

fn expect_cons(v: &Value) -> Result<&Rc<crate::value::ConsCell>> {
    match v {
        Value::Cons(cell) => Ok(cell),
        other => Err(Error::Type { expected: "cons cell", got: other.to_string() }),
    }
}

fn prim_car(args: &[Value]) -> Result<Value> {
    check_exact(args, 1)?;
    Ok(expect_cons(&args[0])?.car.clone())
}

fn prim_cdr(args: &[Value]) -> Result<Value> {
    check_exact(args, 1)?;
    Ok(expect_cons(&args[0])?.cdr.clone())
}

fn prim_box(args: &[Value]) -> Result<Value> {
    check_exact(args, 1)?;
    Ok(Value::Boxed(Rc::new(RefCell::new(args[0].clone()))))
}

fn expect_box(v: &Value) -> Result<&Rc<RefCell<Value>>> {
    match v {
        Value::Boxed(b) => Ok(b),
        other => Err(Error::Type { expected: "box", got: other.to_string() }),
    }
}

fn prim_unbox(args: &[Value]) -> Result<Value> {
    check_exact(args, 1)?;
    Ok(expect_box(&args[0])?.borrow().clone())
}

fn prim_set_box(args: &[Value]) -> Result<Value> {
    check_exact(args, 2)?;
    *expect_box(&args[0])?.borrow_mut() = args[1].clone();
    Ok(Value::Void)
}

fn expect_vector(v: &Value) -> Result<&Rc<RefCell<Vec<Value>>>> {
    match v {
        Value::Vector(items) => Ok(items),
        other => Err(Error::Type { expected: "vector", got: other.to_string() }),
    }
}

fn vector_index(v: &Value, len: usize) -> Result<usize> {
    let i = expect_number(v)?;
    if i < 0 || i as usize >= len {
        return Err(Error::Type {
            expected: "vector index in range",
            got: i.to_string(),
        });
    }
    Ok(i as usize)
}

fn prim_make_vector(args: &[Value]) -> Result<Value> {
    check_exact(args, 2)?;
    let len = expect_number(&args[0])?.max(0) as usize;
    Ok(Value::Vector(Rc::new(RefCell::new(vec![args[1].clone(); len]))))
}

fn prim_vector_ref(args: &[Value]) -> Result<Value> {
    check_exact(args, 2)?;
    let items = expect_vector(&args[0])?.borrow();
    let i = vector_index(&args[1], items.len())?;
    Ok(items[i].clone())
}

fn prim_vector_set(args: &[Value]) -> Result<Value> {
    check_exact(args, 3)?;
    let mut items = expect_vector(&args[0])?.borrow_mut();
    let i = vector_index(&args[1], items.len())?;
    items[i] = args[2].clone();
    Ok(Value::Void)
}

fn prim_vector_length(args: &[Value]) -> Result<Value> {
    check_exact(args, 1)?;
    Ok(Value::Number(expect_vector(&args[0])?.borrow().len() as i64))
}

fn type_predicate(args: &[Value], test: fn(&Value) -> bool) -> Result<Value> {
    check_exact(args, 1)?;
    Ok(Value::Boolean(test(&args[0])))
}

fn prim_null_q(args: &[Value]) -> Result<Value> {
    type_predicate(args, |v| matches!(v, Value::Nil))
}

fn prim_pair_q(args: &[Value]) -> Result<Value> {
    type_predicate(args, |v| matches!(v, Value::Cons(_)))
}

fn prim_symbol_q(args: &[Value]) -> Result<Value> {
    type_predicate(args, |v| matches!(v, Value::Symbol(_)))
}

fn prim_number_q(args: &[Value]) -> Result<Value> {
    type_predicate(args, |v| matches!(v, Value::Number(_)))
}

fn prim_boolean_q(args: &[Value]) -> Result<Value> {
    type_predicate(args, |v| matches!(v, Value::Boolean(_)))
}

fn prim_void_q(args: &[Value]) -> Result<Value> {
    type_predicate(args, |v| matches!(v, Value::Void))
}

fn prim_box_q(args: &[Value]) -> Result<Value> {
    type_predicate(args, |v| matches!(v, Value::Boxed(_)))
}

fn prim_vector_q(args: &[Value]) -> Result<Value> {
    type_predicate(args, |v| matches!(v, Value::Vector(_)))
}

fn prim_eq_q(args: &[Value]) -> Result<Value> {
    check_exact(args, 2)?;
    Ok(Value::Boolean(args[0].is_eq(&args[1])))
}

fn prim_display(args: &[Value]) -> Result<Value> {
    check_exact(args, 1)?;
    println!("{}", args[0]);
    Ok(Value::Void)
}

/// Names treated as primitive operators by both compilers.
pub const PRIMITIVE_NAMES: &[&str] = &[
    "+", "-", "*", "/", "%", "<", "<=", "=", ">", ">=", "!=", "cons", "car", "cdr", "box", "unbox",
    "set-box!", "box?", "make-vector", "vector-ref", "vector-set!", "vector-length", "vector?",
    "null?", "pair?", "symbol?", "number?", "boolean?", "void?", "eq?", "display",
];

/// Is `name` one of the builtin procedures?
pub fn is_builtin(name: &str) -> bool {
    PRIMITIVE_NAMES.contains(&name)
}

/// The builtin table: name plus host function, in `PRIMITIVE_NAMES` order.
pub fn builtin_table() -> Vec<(&'static str, fn(&[Value]) -> Result<Value>)> {
    vec![
        ("+", prim_add),
        ("-", prim_sub),
        ("*", prim_mul),
        ("/", prim_div),
        ("%", prim_mod),
        ("<", prim_lt),
        ("<=", prim_le),
        ("=", prim_num_eq),
        (">", prim_gt),
        (">=", prim_ge),
        ("!=", prim_num_ne),
        ("cons", prim_cons),
        ("car", prim_car),
        ("cdr", prim_cdr),
        ("box", prim_box),
        ("unbox", prim_unbox),
        ("set-box!", prim_set_box),
        ("box?", prim_box_q),
        ("make-vector", prim_make_vector),
        ("vector-ref", prim_vector_ref),
        ("vector-set!", prim_vector_set),
        ("vector-length", prim_vector_length),
        ("vector?", prim_vector_q),
        ("null?", prim_null_q),
        ("pair?", prim_pair_q),
        ("symbol?", prim_symbol_q),
        ("number?", prim_number_q),
        ("boolean?", prim_boolean_q),
        ("void?", prim_void_q),
        ("eq?", prim_eq_q),
        ("display", prim_display),
    ]
}

/// Build the initial top environment holding every builtin.
pub fn top_env() -> EnvRef<Value> {
    let env = Env::top();
    for (name, func) in builtin_table() {
        env.bind(name, Value::Procedure(Rc::new(ProcedureData { name, func })));
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: i64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_arithmetic_folds() {
        assert_eq!(prim_add(&[num(1), num(2), num(3)]).unwrap().to_string(), "6");
        assert_eq!(prim_sub(&[num(10), num(3), num(2)]).unwrap().to_string(), "5");
        assert_eq!(prim_mul(&[num(3), num(4)]).unwrap().to_string(), "12");
        assert_eq!(prim_div(&[num(20), num(5), num(2)]).unwrap().to_string(), "2");
        assert_eq!(prim_mod(&[num(7), num(3)]).unwrap().to_string(), "1");
    }

    #[test]
    fn test_arith_errors() {
        assert!(matches!(prim_add(&[num(1)]), Err(Error::ArityAtLeast { .. })));
        assert!(matches!(
            prim_add(&[num(1), Value::Boolean(true)]),
            Err(Error::Type { .. })
        ));
        assert!(matches!(prim_div(&[num(1), num(0)]), Err(Error::Type { .. })));
        assert!(matches!(prim_mod(&[num(1), num(0)]), Err(Error::Type { .. })));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(prim_lt(&[num(1), num(2)]).unwrap().to_string(), "#t");
        assert_eq!(prim_num_eq(&[num(3), num(3)]).unwrap().to_string(), "#t");
        assert_eq!(prim_ge(&[num(1), num(2)]).unwrap().to_string(), "#f");
        assert!(matches!(prim_lt(&[num(1)]), Err(Error::Arity { .. })));
    }

    #[test]
    fn test_pair_ops() {
        let p = prim_cons(&[num(1), num(2)]).unwrap();
        assert_eq!(prim_car(std::slice::from_ref(&p)).unwrap().to_string(), "1");
        assert_eq!(prim_cdr(std::slice::from_ref(&p)).unwrap().to_string(), "2");
        assert!(matches!(prim_car(&[num(1)]), Err(Error::Type { .. })));
    }

    #[test]
    fn test_box_ops() {
        let b = prim_box(&[num(0)]).unwrap();
        prim_set_box(&[b.clone(), num(42)]).unwrap();
        assert_eq!(prim_unbox(std::slice::from_ref(&b)).unwrap().to_string(), "42");
        assert_eq!(prim_box_q(std::slice::from_ref(&b)).unwrap().to_string(), "#t");
    }

    #[test]
    fn test_vector_ops() {
        let v = prim_make_vector(&[num(3), num(7)]).unwrap();
        assert_eq!(prim_vector_length(std::slice::from_ref(&v)).unwrap().to_string(), "3");
        prim_vector_set(&[v.clone(), num(1), num(9)]).unwrap();
        assert_eq!(prim_vector_ref(&[v.clone(), num(1)]).unwrap().to_string(), "9");
        assert!(prim_vector_ref(&[v.clone(), num(3)]).is_err());
        assert!(prim_vector_ref(&[v, num(-1)]).is_err());
    }

    #[test]
    fn test_predicates() {
        assert_eq!(prim_null_q(&[Value::Nil]).unwrap().to_string(), "#t");
        assert_eq!(prim_null_q(&[num(0)]).unwrap().to_string(), "#f");
        assert_eq!(prim_number_q(&[num(0)]).unwrap().to_string(), "#t");
        assert_eq!(prim_void_q(&[Value::Void]).unwrap().to_string(), "#t");
    }

    #[test]
    fn test_top_env_has_all_builtins() {
        let env = top_env();
        for name in PRIMITIVE_NAMES {
            assert!(env.find(name).is_ok(), "{} missing from top env", name);
        }
    }
}
