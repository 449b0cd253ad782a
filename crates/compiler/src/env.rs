//! Lexically scoped environments.
//!
//! A chain of frames from innermost to outermost. The parent link is a
//! shared reference: closures capture an environment chain that outlives
//! its syntactic scope. The tree evaluator instantiates `V` as a runtime
//! value; the bytecode compiler instantiates it as a stack slot.

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type EnvRef<V> = Rc<Env<V>>;

pub struct Env<V> {
    bindings: RefCell<HashMap<String, V>>,
    outer: Option<EnvRef<V>>,
}

impl<V: Clone> Env<V> {
    /// A fresh top frame with no parent.
    pub fn top() -> EnvRef<V> {
        Rc::new(Env {
            bindings: RefCell::new(HashMap::new()),
            outer: None,
        })
    }

    /// A fresh innermost frame linked to `outer`.
    pub fn extend(outer: &EnvRef<V>) -> EnvRef<V> {
        Rc::new(Env {
            bindings: RefCell::new(HashMap::new()),
            outer: Some(Rc::clone(outer)),
        })
    }

    /// Insert into this (the innermost) frame, shadowing outer bindings.
    pub fn bind(&self, name: impl Into<String>, value: V) {
        self.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Walk outward for `name`.
    pub fn find(&self, name: &str) -> Result<V> {
        if let Some(v) = self.bindings.borrow().get(name) {
            return Ok(v.clone());
        }
        match &self.outer {
            Some(outer) => outer.find(name),
            None => Err(Error::Unbound(name.to_string())),
        }
    }

    /// Overwrite `name` in whichever frame holds it.
    pub fn set(&self, name: &str, value: V) -> Result<()> {
        if let Some(slot) = self.bindings.borrow_mut().get_mut(name) {
            *slot = value;
            return Ok(());
        }
        match &self.outer {
            Some(outer) => outer.set(name, value),
            None => Err(Error::Unbound(name.to_string())),
        }
    }

    /// True if `name` is bound in this frame (not a parent).
    pub fn bound_here(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_find() {
        let env: EnvRef<i64> = Env::top();
        env.bind("x", 1);
        assert_eq!(env.find("x").unwrap(), 1);
        assert_eq!(env.find("y").unwrap_err(), Error::Unbound("y".into()));
    }

    #[test]
    fn test_lookup_walks_outward() {
        let top: EnvRef<i64> = Env::top();
        top.bind("x", 1);
        top.bind("y", 2);
        let inner = Env::extend(&top);
        inner.bind("x", 10);
        assert_eq!(inner.find("x").unwrap(), 10);
        assert_eq!(inner.find("y").unwrap(), 2);
        // shadowing does not touch the outer frame
        assert_eq!(top.find("x").unwrap(), 1);
    }

    #[test]
    fn test_set_writes_owning_frame() {
        let top: EnvRef<i64> = Env::top();
        top.bind("x", 1);
        let inner = Env::extend(&top);
        inner.set("x", 5).unwrap();
        assert_eq!(top.find("x").unwrap(), 5);
        assert!(inner.set("missing", 0).is_err());
    }

    #[test]
    fn test_chain_outlives_extension() {
        let top: EnvRef<i64> = Env::top();
        top.bind("x", 7);
        let captured = Env::extend(&top);
        drop(top);
        assert_eq!(captured.find("x").unwrap(), 7);
    }
}
