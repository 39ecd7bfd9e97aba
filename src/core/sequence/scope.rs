// src/core/sequence/scope.rs
//! Best-effort tracking of which callable a local name holds

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::core::ast::DeclId;

/// What the traversal knows about the value of an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A closure; `captured` is the environment at the lambda expression
    Lambda { operator: DeclId, captured: Rc<Bindings> },
    /// A function or method designated by name
    Function { decl: DeclId },
    Opaque,
}

impl Value {
    pub fn is_callable(&self) -> bool {
        !matches!(self, Value::Opaque)
    }
}

pub type Bindings = BTreeMap<String, Value>;

/// Nested block scopes of one function activation
#[derive(Debug, Clone)]
pub struct Environment {
    scopes: Vec<Bindings>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![Bindings::new()],
        }
    }

    /// Environment of a lambda body: its captures, then its own scope
    pub fn with_captures(captured: &Bindings) -> Self {
        Self {
            scopes: vec![captured.clone(), Bindings::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Bindings::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Declare `name` in the innermost scope
    pub fn bind(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    /// Assign to the nearest declaration of `name`, declaring it if absent
    pub fn assign(&mut self, name: &str, value: Value) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.bind(name, value);
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Flattened view with inner declarations shadowing outer ones
    pub fn snapshot(&self) -> Bindings {
        let mut flat = Bindings::new();
        for scope in &self.scopes {
            for (name, value) in scope {
                flat.insert(name.clone(), value.clone());
            }
        }
        flat
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
