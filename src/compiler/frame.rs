use std::{cell::RefCell, rc::Rc};

use crate::common::object::{Captured, Closure, Object};

use super::code::Instructions;

/// One activation of a closure on the VM.
#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    /// Stack slot of the first argument; locals follow it.
    pub base_pointer: usize,
    /// Locals that a closure has captured. Once captured, the cell is the
    /// variable and the stack slot is no longer read.
    captured: Vec<Option<Captured>>,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: 0,
            base_pointer,
            captured: vec![],
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.func.instructions
    }

    pub fn captured(&self, index: usize) -> Option<&Captured> {
        self.captured.get(index).and_then(Option::as_ref)
    }

    /// Returns the cell for local `index`, creating it from `value` on first
    /// capture.
    pub fn capture_local(&mut self, index: usize, value: Object) -> Captured {
        if self.captured.len() <= index {
            self.captured.resize(index + 1, None);
        }

        self.captured[index]
            .get_or_insert_with(|| Rc::new(RefCell::new(value)))
            .clone()
    }
}
