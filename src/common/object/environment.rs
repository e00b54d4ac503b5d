use std::{cell::RefCell, collections::HashMap, rc::Rc};

use super::Object;

pub type MutEnv = Rc<RefCell<Environment>>;

/// One level of the lexical scope chain. Scopes only ever point at their
/// parent, never at children.
#[derive(Debug, Default)]
pub struct Environment {
    store: HashMap<String, Object>,
    outer: Option<MutEnv>,
    in_loop: bool,
}

impl Environment {
    pub fn new() -> MutEnv {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn new_enclosed(outer: MutEnv) -> MutEnv {
        Rc::new(RefCell::new(Self {
            store: HashMap::new(),
            outer: Some(outer),
            in_loop: false,
        }))
    }

    /// An enclosed scope flagged as the body of a `for` loop.
    pub fn new_loop(outer: MutEnv) -> MutEnv {
        Rc::new(RefCell::new(Self {
            store: HashMap::new(),
            outer: Some(outer),
            in_loop: true,
        }))
    }

    pub fn get(&self, key: &str) -> Option<Object> {
        match self.store.get(key) {
            Some(value) => Some(value.clone()),
            None => self
                .outer
                .as_ref()
                .and_then(|outer| outer.borrow().get(key)),
        }
    }

    /// Binds `key` in this scope, shadowing any outer binding (`let`).
    pub fn set(&mut self, key: &str, value: Object) {
        self.store.insert(key.to_string(), value);
    }

    /// Rebinds `key` in the nearest scope that declares it; when no scope
    /// does, the root scope receives the new binding (`name = value`).
    pub fn assign(&mut self, key: &str, value: Object) {
        if let Some(slot) = self.store.get_mut(key) {
            *slot = value;
            return;
        }

        match &self.outer {
            Some(outer) => outer.borrow_mut().assign(key, value),
            None => self.set(key, value),
        }
    }

    pub fn is_in_loop(&self) -> bool {
        self.in_loop
            || self
                .outer
                .as_ref()
                .is_some_and(|outer| outer.borrow().is_in_loop())
    }
}
