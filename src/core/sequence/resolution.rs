// src/core/sequence/resolution.rs
use std::rc::Rc;

use crate::core::ast::{AstIndex, Callee, DeclId, Dispatch, FunctionDecl};
use crate::error::Result;
use super::filter::DiagramFilter;
use super::registry::{Entity, Registry};
use super::scope::{Bindings, Environment, Value};
use super::{ParticipantId, ResolutionKind};

/// Where a call lands
#[derive(Debug, Clone)]
pub struct Target<'a> {
    pub participant: ParticipantId,
    /// Declaration to descend into, if the callee has one
    pub function: Option<&'a FunctionDecl>,
    pub operation: String,
    /// Environment captured by a closure at its creation
    pub captured: Option<Rc<Bindings>>,
}

#[derive(Debug, Clone)]
pub enum Resolution<'a> {
    Resolved(Target<'a>),
    StaticTypeOnly(Target<'a>),
    Approximate(Target<'a>),
    Unresolved { name: String },
    /// Resolved, but the diagram filters exclude the callee
    Filtered,
}

impl<'a> Resolution<'a> {
    /// How precisely the callee is known; `None` when there is no target
    pub fn kind(&self) -> Option<ResolutionKind> {
        match self {
            Resolution::Resolved(_) => Some(ResolutionKind::Exact),
            Resolution::StaticTypeOnly(_) => Some(ResolutionKind::StaticTypeOnly),
            Resolution::Approximate(_) => Some(ResolutionKind::Approximate),
            Resolution::Unresolved { .. } | Resolution::Filtered => None,
        }
    }
}

/// Maps call expressions to participants
pub struct CallResolver<'a, 'f> {
    ast: &'a AstIndex,
    filter: &'f dyn DiagramFilter,
}

impl<'a, 'f> CallResolver<'a, 'f> {
    pub fn new(ast: &'a AstIndex, filter: &'f dyn DiagramFilter) -> Self {
        Self { ast, filter }
    }

    /// Resolve a named callee; `Callee::Expr` must be evaluated by the
    /// caller and passed to [`CallResolver::resolve_value`]
    pub fn resolve_callee(&self, registry: &mut Registry, callee: &'a Callee, env: &Environment) -> Result<Resolution<'a>> {
        match callee {
            Callee::Decl { decl, template_args, dispatch } => {
                self.resolve_decl(registry, *decl, template_args, *dispatch, None)
            }
            Callee::Var { name } => match env.lookup(name) {
                Some(value) => {
                    let value = value.clone();
                    self.resolve_value(registry, &value, name)
                }
                None => Ok(Resolution::Unresolved { name: name.clone() }),
            },
            Callee::Unresolved { template: Some(template), .. } => {
                // The primary template stands in; only the message records
                // the approximation
                let (decl, function) = self.ast.function(*template)?;
                let participant = registry.intern(Entity::Decl(decl), self.ast, self.filter)?;
                if participant.is_tombstone() {
                    return Ok(Resolution::Filtered);
                }
                Ok(Resolution::Approximate(Target {
                    participant,
                    function: Some(function),
                    operation: registry.operation(participant),
                    captured: None,
                }))
            }
            Callee::Unresolved { name, template: None } => Ok(Resolution::Unresolved { name: name.clone() }),
            Callee::Expr { .. } => Ok(Resolution::Unresolved { name: "<expression>".to_string() }),
        }
    }

    /// Resolve the callable a value designates
    pub fn resolve_value(&self, registry: &mut Registry, value: &Value, name: &str) -> Result<Resolution<'a>> {
        match value {
            Value::Lambda { operator, captured } => {
                self.resolve_decl(registry, *operator, &[], Dispatch::Static, Some(Rc::clone(captured)))
            }
            Value::Function { decl } => self.resolve_decl(registry, *decl, &[], Dispatch::Static, None),
            Value::Opaque => Ok(Resolution::Unresolved { name: name.to_string() }),
        }
    }

    /// Object construction: the constructor when known, else the class
    pub fn resolve_construct(&self, registry: &mut Registry, class: DeclId, ctor: Option<DeclId>) -> Result<Resolution<'a>> {
        if let Some(ctor) = ctor {
            return self.resolve_decl(registry, ctor, &[], Dispatch::Static, None);
        }

        let decl = self.ast.decl(class)?;
        let participant = registry.intern(Entity::Decl(decl), self.ast, self.filter)?;
        if participant.is_tombstone() {
            return Ok(Resolution::Filtered);
        }
        Ok(Resolution::Resolved(Target {
            participant,
            function: None,
            operation: registry.operation(participant),
            captured: None,
        }))
    }

    /// Target of `co_await`: the awaiter's `await_resume` when known,
    /// otherwise the awaiting coroutine's own state
    pub fn resolve_awaiter(&self, registry: &mut Registry, awaiter: Option<DeclId>, coroutine: ParticipantId) -> Result<Resolution<'a>> {
        if let Some(awaiter) = awaiter {
            return self.resolve_decl(registry, awaiter, &[], Dispatch::Static, None);
        }

        let participant = registry.intern(Entity::CoroutineState { coroutine }, self.ast, self.filter)?;
        Ok(Resolution::Resolved(Target {
            participant,
            function: None,
            operation: "co_await".to_string(),
            captured: None,
        }))
    }

    fn resolve_decl(
        &self,
        registry: &mut Registry,
        id: DeclId,
        template_args: &[String],
        dispatch: Dispatch,
        captured: Option<Rc<Bindings>>,
    ) -> Result<Resolution<'a>> {
        let (decl, function) = self.ast.function(id)?;

        let entity = if template_args.is_empty() {
            Entity::Decl(decl)
        } else {
            Entity::Instantiation { decl, template_args }
        };
        let participant = registry.intern(entity, self.ast, self.filter)?;
        if participant.is_tombstone() {
            return Ok(Resolution::Filtered);
        }

        let target = Target {
            participant,
            function: Some(function),
            operation: registry.operation(participant),
            captured,
        };
        Ok(match dispatch {
            Dispatch::Virtual => Resolution::StaticTypeOnly(target),
            Dispatch::Static => Resolution::Resolved(target),
        })
    }
}
