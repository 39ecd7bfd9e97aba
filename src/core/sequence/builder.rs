// src/core/sequence/builder.rs
use std::mem;
use std::rc::Rc;
use tracing::debug;

use crate::config::{SequenceDiagramConfig, UnresolvedCallPolicy};
use crate::core::ast::{
    AstIndex, AsyncExpr, CallExpr, Callee, CoAwaitExpr, ConstructExpr, Decl, Expr, FunctionDecl,
    SourceLocation, Stmt,
};
use crate::error::{SeqwrightError, Result};
use super::context::{BranchKind, ContextStack, ControlFrame, FrameGuard, LoopKind};
use super::filter::DiagramFilter;
use super::recursion::{CallPath, PathEntry};
use super::registry::{Entity, Registry};
use super::resolution::{CallResolver, Resolution, Target};
use super::scope::{Environment, Value};
use super::{Message, MessageKind, MessageScope, MessageSequence, ParticipantId, ParticipantKind, ResolutionKind};

#[derive(Debug, Clone, Copy)]
pub struct BuilderOptions {
    pub generate_return_messages: bool,
    pub generate_condition_text: bool,
    pub generate_message_comments: bool,
    pub inline_lambda_messages: bool,
    pub unresolved_calls: UnresolvedCallPolicy,
    pub max_depth: Option<usize>,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            generate_return_messages: false,
            generate_condition_text: true,
            generate_message_comments: false,
            inline_lambda_messages: false,
            unresolved_calls: UnresolvedCallPolicy::Elide,
            max_depth: None,
        }
    }
}

impl From<&SequenceDiagramConfig> for BuilderOptions {
    fn from(config: &SequenceDiagramConfig) -> Self {
        Self {
            generate_return_messages: config.generate_return_messages,
            generate_condition_text: config.generate_condition_text,
            generate_message_comments: config.generate_message_comments,
            inline_lambda_messages: config.inline_lambda_messages,
            unresolved_calls: config.unresolved_calls,
            max_depth: config.max_depth,
        }
    }
}

/// Whether the rest of a statement list still executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

enum Descent {
    Traversed,
    /// No body to descend into (declaration only, class, external)
    NoBody,
    /// Refused by the recursion or depth guard
    Truncated,
}

/// Depth-first walk from entry points, emitting messages in source order
pub struct SequenceBuilder<'a, 'r> {
    ast: &'a AstIndex,
    registry: &'r mut Registry,
    filter: &'r dyn DiagramFilter,
    options: BuilderOptions,
    contexts: ContextStack,
    call_path: CallPath,
    env: Environment,
    caller: ParticipantId,
    /// Participant that called the current activation
    return_to: Option<ParticipantId>,
    scope: MessageScope,
    /// Inlined lambda bodies currently on the call path
    inlined: usize,
    sequence: MessageSequence,
}

impl<'a, 'r> SequenceBuilder<'a, 'r> {
    pub fn new(
        ast: &'a AstIndex,
        registry: &'r mut Registry,
        filter: &'r dyn DiagramFilter,
        options: BuilderOptions,
    ) -> Self {
        Self {
            ast,
            registry,
            filter,
            options,
            contexts: ContextStack::new(),
            call_path: CallPath::new(options.max_depth),
            env: Environment::new(),
            caller: ParticipantId::TOMBSTONE,
            return_to: None,
            scope: MessageScope::Normal,
            inlined: 0,
            sequence: MessageSequence::default(),
        }
    }

    /// Traverse one entry point, appending to the sequence built so far
    pub fn traverse(&mut self, entry: &'a Decl) -> Result<()> {
        let function = entry.as_function().ok_or_else(|| {
            SeqwrightError::MalformedAst(format!("entry point {} is not callable", entry.name))
        })?;
        let body = function.body.as_ref().ok_or_else(|| {
            SeqwrightError::MalformedAst(format!("entry point {} has no body", entry.name))
        })?;

        let participant = self.registry.intern(Entity::Decl(entry), self.ast, self.filter)?;
        if participant.is_tombstone() {
            return Err(SeqwrightError::EntryPointNotFound(format!(
                "{} is excluded by the diagram filters", entry.name
            )));
        }
        self.sequence.entry_points.push(participant);

        let operation = self.registry.operation(participant);
        let _guard = match self.call_path.enter(participant, &operation) {
            PathEntry::Entered(guard) => guard,
            PathEntry::Recursive | PathEntry::DepthLimit => return Ok(()),
        };

        debug!("Traversing entry point {}", operation);
        self.caller = participant;
        self.return_to = None;
        self.env = Environment::new();
        self.scope = MessageScope::Normal;

        self.visit_function_body(function, body, &operation)?;
        Ok(())
    }

    pub fn finish(self) -> MessageSequence {
        self.sequence
    }

    fn resolver(&self) -> CallResolver<'a, 'r> {
        CallResolver::new(self.ast, self.filter)
    }

    fn label(&self, text: Option<String>) -> Option<String> {
        if self.options.generate_condition_text {
            text
        } else {
            None
        }
    }

    fn scoped<T>(&mut self, visit: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.env.push_scope();
        let result = visit(self);
        self.env.pop_scope();
        result
    }

    fn visit_function_body(&mut self, function: &'a FunctionDecl, body: &'a Stmt, operation: &str) -> Result<Flow> {
        let _coroutine = if function.is_coroutine {
            let block = self.contexts.next_block();
            Some(self.contexts.enter(ControlFrame::Coroutine {
                block,
                label: Some(operation.to_string()),
            }))
        } else {
            None
        };

        self.visit_stmt(body)
    }

    fn visit_block(&mut self, stmts: &'a [Stmt]) -> Result<Flow> {
        for stmt in stmts {
            if self.visit_stmt(stmt)? == Flow::Exit {
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Compound { body } => self.scoped(|this| this.visit_block(body)),
            Stmt::Expr { expr } => {
                self.visit_expr(expr)?;
                Ok(Flow::Continue)
            }
            Stmt::VarDecl { name, init } => {
                let value = match init {
                    Some(init) => self.visit_expr(init)?,
                    None => Value::Opaque,
                };
                self.env.bind(name, value);
                Ok(Flow::Continue)
            }
            Stmt::If { .. } => {
                self.visit_if(stmt)?;
                Ok(Flow::Continue)
            }
            Stmt::Switch { cond, cases, .. } => {
                let block = self.contexts.next_block();
                let total = cases.len();
                if cases.is_empty() {
                    self.visit_condition(cond)?;
                }
                for (index, case) in cases.iter().enumerate() {
                    let label = match &case.label {
                        Some(label) => format!("case {}", label),
                        None => "default".to_string(),
                    };
                    let _frame = self.contexts.enter(ControlFrame::Branch {
                        block,
                        kind: BranchKind::Switch,
                        index,
                        total,
                        label: self.label(Some(label)),
                    });
                    // The selector is drawn inside the first case's frame
                    if index == 0 {
                        self.visit_condition(cond)?;
                    }
                    self.scoped(|this| this.visit_block(&case.body))?;
                }
                Ok(Flow::Continue)
            }
            Stmt::While { cond, body, cond_text } => {
                let _frame = self.enter_loop(LoopKind::While, cond_text);
                self.visit_condition(cond)?;
                self.visit_stmt(body)?;
                Ok(Flow::Continue)
            }
            Stmt::DoWhile { body, cond, cond_text } => {
                let _frame = self.enter_loop(LoopKind::DoWhile, cond_text);
                self.visit_stmt(body)?;
                self.visit_condition(cond)?;
                Ok(Flow::Continue)
            }
            Stmt::For { init, cond, inc, body, cond_text } => self.scoped(|this| {
                if let Some(init) = init {
                    this.visit_stmt(init)?;
                }
                let _frame = this.enter_loop(LoopKind::For, cond_text);
                if let Some(cond) = cond {
                    this.visit_condition(cond)?;
                }
                this.visit_stmt(body)?;
                if let Some(inc) = inc {
                    this.visit_expr(inc)?;
                }
                Ok(Flow::Continue)
            }),
            Stmt::ForRange { range, body, cond_text } => {
                self.visit_expr(range)?;
                let _frame = self.enter_loop(LoopKind::ForRange, cond_text);
                self.visit_stmt(body)?;
                Ok(Flow::Continue)
            }
            Stmt::Try { body, handlers } => {
                let flow = self.visit_stmt(body)?;
                let block = self.contexts.next_block();
                for (handler, clause) in handlers.iter().enumerate() {
                    let label = clause.exception.clone().unwrap_or_else(|| "...".to_string());
                    let _frame = self.contexts.enter(ControlFrame::TryCatch {
                        block,
                        handler,
                        label: Some(label),
                    });
                    self.visit_stmt(&clause.body)?;
                }
                Ok(flow)
            }
            Stmt::Return { value } | Stmt::CoReturn { value } => {
                if let Some(value) = value {
                    self.visit_expr(value)?;
                }
                Ok(Flow::Exit)
            }
            Stmt::Break | Stmt::Continue => Ok(Flow::Exit),
            Stmt::Null => Ok(Flow::Continue),
        }
    }

    fn enter_loop(&self, kind: LoopKind, cond_text: &Option<String>) -> FrameGuard {
        let block = self.contexts.next_block();
        self.contexts.enter(ControlFrame::Loop {
            block,
            kind,
            label: self.label(cond_text.clone()),
        })
    }

    /// An if/else-if/else chain becomes one block with one branch frame
    /// per alternative
    fn visit_if(&mut self, stmt: &'a Stmt) -> Result<()> {
        let mut alternatives: Vec<(Option<&'a Expr>, Option<&'a String>, &'a Stmt)> = Vec::new();
        let mut constexpr_chain = false;
        let mut current = stmt;

        while let Stmt::If { cond, then, otherwise, constexpr, cond_text } = current {
            constexpr_chain |= *constexpr;
            alternatives.push((Some(cond), cond_text.as_ref(), &**then));
            match otherwise.as_deref() {
                Some(next @ Stmt::If { .. }) => current = next,
                Some(last) => {
                    alternatives.push((None, None, last));
                    break;
                }
                None => break,
            }
        }

        let kind = if constexpr_chain { BranchKind::Constexpr } else { BranchKind::If };
        let total = alternatives.len();

        let block = self.contexts.next_block();
        for (index, (cond, cond_text, branch)) in alternatives.into_iter().enumerate() {
            let label = match cond {
                Some(_) => cond_text.cloned(),
                None => Some("else".to_string()),
            };
            let _frame = self.contexts.enter(ControlFrame::Branch {
                block,
                kind,
                index,
                total,
                label: self.label(label),
            });
            if let Some(cond) = cond {
                self.visit_condition(cond)?;
            }
            self.visit_stmt(branch)?;
        }
        Ok(())
    }

    fn visit_condition(&mut self, expr: &'a Expr) -> Result<()> {
        let saved = mem::replace(&mut self.scope, MessageScope::Condition);
        let result = self.visit_expr(expr);
        self.scope = saved;
        result.map(|_| ())
    }

    fn visit_args(&mut self, args: &'a [Expr]) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.visit_expr(arg)).collect()
    }

    fn visit_expr(&mut self, expr: &'a Expr) -> Result<Value> {
        match expr {
            Expr::Call(call) => self.visit_call(call),
            Expr::Construct(construct) => self.visit_construct(construct),
            Expr::Lambda(lambda) => Ok(Value::Lambda {
                operator: lambda.operator,
                captured: Rc::new(self.env.snapshot()),
            }),
            Expr::CoAwait(co_await) => self.visit_co_await(co_await),
            Expr::CoYield { operand, location } => {
                self.visit_expr(operand)?;
                if self.options.generate_return_messages {
                    if let Some(parent) = self.return_to {
                        self.push_message(self.caller, parent, "co_yield".to_string(), MessageKind::Response, location.as_ref());
                    }
                }
                Ok(Value::Opaque)
            }
            Expr::Async(launch) => self.visit_async(launch),
            Expr::DeclRef { decl } => Ok(Value::Function { decl: *decl }),
            Expr::Var { name } => Ok(self.env.lookup(name).cloned().unwrap_or(Value::Opaque)),
            Expr::Assign { target, value } => {
                let value = self.visit_expr(value)?;
                self.env.assign(target, value.clone());
                Ok(value)
            }
            Expr::Conditional { cond, then, otherwise, cond_text } => {
                let block = self.contexts.next_block();
                let branches = [(then, cond_text.clone()), (otherwise, Some("else".to_string()))];
                for (index, (branch, label)) in branches.into_iter().enumerate() {
                    let _frame = self.contexts.enter(ControlFrame::Branch {
                        block,
                        kind: BranchKind::Conditional,
                        index,
                        total: 2,
                        label: self.label(label),
                    });
                    if index == 0 {
                        self.visit_condition(cond)?;
                    }
                    self.visit_expr(branch)?;
                }
                Ok(Value::Opaque)
            }
            Expr::Opaque { children } => {
                for child in children {
                    self.visit_expr(child)?;
                }
                Ok(Value::Opaque)
            }
        }
    }

    fn visit_call(&mut self, call: &'a CallExpr) -> Result<Value> {
        let callee_value = match &call.callee {
            Callee::Expr { expr } => Some(self.visit_expr(expr)?),
            _ => None,
        };
        if let Some(object) = &call.object {
            self.visit_expr(object)?;
        }
        let args = self.visit_args(&call.args)?;

        let resolver = self.resolver();
        let resolution = match callee_value {
            Some(value) => resolver.resolve_value(self.registry, &value, "<expression>")?,
            None => resolver.resolve_callee(self.registry, &call.callee, &self.env)?,
        };

        self.dispatch(resolution, MessageKind::Call, &args, call.location.as_ref(), call.comment.as_deref())
    }

    fn visit_construct(&mut self, construct: &'a ConstructExpr) -> Result<Value> {
        let args = self.visit_args(&construct.args)?;

        // Wrappers such as std::function take over the callable they are
        // built from
        let passthrough = match args.as_slice() {
            [value] if value.is_callable() => Some(value.clone()),
            _ => None,
        };
        let dispatch_args: &[Value] = if passthrough.is_some() { &[] } else { &args };

        let resolution = self.resolver().resolve_construct(self.registry, construct.class, construct.ctor)?;
        self.dispatch(
            resolution,
            MessageKind::Call,
            dispatch_args,
            construct.location.as_ref(),
            construct.comment.as_deref(),
        )?;

        Ok(passthrough.unwrap_or(Value::Opaque))
    }

    fn visit_co_await(&mut self, co_await: &'a CoAwaitExpr) -> Result<Value> {
        self.visit_expr(&co_await.operand)?;
        let resolution = self.resolver().resolve_awaiter(self.registry, co_await.awaiter, self.caller)?;
        self.dispatch(resolution, MessageKind::CoAwait, &[], co_await.location.as_ref(), None)
    }

    fn visit_async(&mut self, launch: &'a AsyncExpr) -> Result<Value> {
        let callable = self.visit_expr(&launch.callable)?;
        let args = self.visit_args(&launch.args)?;
        let resolution = self.resolver().resolve_value(self.registry, &callable, &launch.launcher)?;
        self.dispatch(resolution, MessageKind::AsyncCall, &args, launch.location.as_ref(), None)
    }

    fn dispatch(
        &mut self,
        resolution: Resolution<'a>,
        kind: MessageKind,
        args: &[Value],
        location: Option<&SourceLocation>,
        comment: Option<&str>,
    ) -> Result<Value> {
        let resolution_kind = resolution.kind().unwrap_or(ResolutionKind::External);
        let target = match resolution {
            Resolution::Resolved(target) | Resolution::StaticTypeOnly(target) | Resolution::Approximate(target) => target,
            Resolution::Filtered => {
                self.invoke_lambda_args(args, location)?;
                return Ok(Value::Opaque);
            }
            Resolution::Unresolved { name } => match self.external_target(&name)? {
                Some(target) => target,
                None => {
                    debug!("Eliding unresolved call to {}", name);
                    self.invoke_lambda_args(args, location)?;
                    return Ok(Value::Opaque);
                }
            },
        };

        // An inlined lambda gets no message; its body runs as the caller
        let inlined = self.options.inline_lambda_messages
            && self.registry.get(target.participant).map_or(false, |p| p.kind == ParticipantKind::Lambda);
        let emitted = if inlined {
            None
        } else {
            self.emit_call(&target, kind, resolution_kind, location)
        };
        if let (Some(index), Some(comment)) = (emitted, comment) {
            if self.options.generate_message_comments {
                match location {
                    Some(site) => {
                        self.sequence.attach_note(site, comment);
                    }
                    None => self.sequence.messages[index].note = Some(comment.trim().to_string()),
                }
            }
        }

        match self.descend(&target, args, inlined)? {
            Descent::NoBody => self.invoke_lambda_args(args, location)?,
            Descent::Traversed | Descent::Truncated => {}
        }

        if emitted.is_some() && kind != MessageKind::AsyncCall && self.options.generate_return_messages {
            let return_type = self
                .registry
                .get(target.participant)
                .and_then(|p| p.return_type.clone())
                .unwrap_or_default();
            self.push_message(target.participant, self.caller, return_type, MessageKind::Response, None);
        }

        Ok(Value::Opaque)
    }

    /// Lambdas handed to a callee that is not traversed are assumed to be
    /// invoked by it, so they are drawn as called from here
    fn invoke_lambda_args(&mut self, args: &[Value], location: Option<&SourceLocation>) -> Result<()> {
        for value in args {
            if let Value::Lambda { .. } = value {
                let resolution = self.resolver().resolve_value(self.registry, value, "lambda")?;
                self.dispatch(resolution, MessageKind::Call, &[], location, None)?;
            }
        }
        Ok(())
    }

    fn external_target(&mut self, name: &str) -> Result<Option<Target<'a>>> {
        if self.options.unresolved_calls == UnresolvedCallPolicy::Elide {
            return Ok(None);
        }

        let participant = self.registry.intern(Entity::External { name }, self.ast, self.filter)?;
        if participant.is_tombstone() {
            return Ok(None);
        }
        Ok(Some(Target {
            participant,
            function: None,
            operation: self.registry.operation(participant),
            captured: None,
        }))
    }

    fn descend(&mut self, target: &Target<'a>, args: &[Value], inlined: bool) -> Result<Descent> {
        let Some(function) = target.function else {
            return Ok(Descent::NoBody);
        };
        let Some(body) = function.body.as_ref() else {
            return Ok(Descent::NoBody);
        };

        let _guard = match self.call_path.enter(target.participant, &target.operation) {
            PathEntry::Entered(guard) => guard,
            PathEntry::Recursive => {
                debug!("Not re-entering {} already on the call path", target.operation);
                return Ok(Descent::Truncated);
            }
            PathEntry::DepthLimit => {
                debug!("Depth limit reached at {}", target.operation);
                return Ok(Descent::Truncated);
            }
        };

        let mut env = match &target.captured {
            Some(captured) => Environment::with_captures(captured),
            None => Environment::new(),
        };
        for (param, value) in function.params.iter().zip(args) {
            if !param.name.is_empty() && value.is_callable() {
                env.bind(&param.name, value.clone());
            }
        }

        let saved_env = mem::replace(&mut self.env, env);
        let saved_caller = self.caller;
        let saved_return = self.return_to;
        let saved_scope = self.scope;
        if inlined {
            self.inlined += 1;
        } else {
            self.caller = target.participant;
            self.return_to = Some(saved_caller);
            self.scope = MessageScope::Normal;
        }

        let result = self.visit_function_body(function, body, &target.operation);

        if inlined {
            self.inlined -= 1;
        }
        self.env = saved_env;
        self.caller = saved_caller;
        self.return_to = saved_return;
        self.scope = saved_scope;

        result.map(|_| Descent::Traversed)
    }

    fn message_depth(&self) -> usize {
        self.call_path.depth().saturating_sub(1 + self.inlined)
    }

    fn emit_call(
        &mut self,
        target: &Target<'a>,
        kind: MessageKind,
        resolution: ResolutionKind,
        location: Option<&SourceLocation>,
    ) -> Option<usize> {
        if !self.registry.is_visible(self.caller) || !self.registry.is_visible(target.participant) {
            return None;
        }

        let return_type = self.registry.get(target.participant).and_then(|p| p.return_type.clone());
        Some(self.sequence.push(Message {
            from: self.caller,
            to: target.participant,
            operation: target.operation.clone(),
            kind,
            context: self.contexts.current(),
            depth: self.message_depth(),
            scope: self.scope,
            resolution,
            location: location.cloned(),
            return_type,
            note: None,
        }))
    }

    fn push_message(
        &mut self,
        from: ParticipantId,
        to: ParticipantId,
        operation: String,
        kind: MessageKind,
        location: Option<&SourceLocation>,
    ) {
        self.sequence.push(Message {
            from,
            to,
            operation,
            kind,
            context: self.contexts.current(),
            depth: self.message_depth(),
            scope: MessageScope::Normal,
            resolution: ResolutionKind::Exact,
            location: location.cloned(),
            return_type: None,
            note: None,
        });
    }
}
