// src/core/ast/index.rs
use std::collections::{HashMap, HashSet};

use crate::error::{SeqwrightError, Result};
use super::{Callee, Decl, DeclId, Expr, FunctionDecl, Stmt, TranslationUnit};

/// Read-only lookup structure over every declaration of the loaded dumps
///
/// Declaration order is preserved (translation unit order, then the order
/// inside each unit) so entry point selection is deterministic.
#[derive(Debug, Default)]
pub struct AstIndex {
    decls: Vec<Decl>,
    by_id: HashMap<DeclId, usize>,
}

impl AstIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge translation units, keeping one copy per declaration id
    pub fn from_units(units: Vec<TranslationUnit>) -> Self {
        let mut index = Self::new();
        for unit in units {
            for decl in unit.decls {
                index.insert(decl);
            }
        }
        index
    }

    /// Insert a declaration; a later copy replaces an earlier one only if
    /// it brings a body the earlier one lacked
    pub fn insert(&mut self, decl: Decl) {
        match self.by_id.get(&decl.id) {
            Some(&pos) => {
                if !self.decls[pos].has_body() && decl.has_body() {
                    self.decls[pos] = decl;
                }
            }
            None => {
                self.by_id.insert(decl.id, self.decls.len());
                self.decls.push(decl);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn decls(&self) -> impl Iterator<Item = &Decl> {
        self.decls.iter()
    }

    pub fn get(&self, id: DeclId) -> Option<&Decl> {
        self.by_id.get(&id).map(|&pos| &self.decls[pos])
    }

    /// Look up a declaration that the input claims exists
    pub fn decl(&self, id: DeclId) -> Result<&Decl> {
        self.get(id).ok_or_else(|| {
            SeqwrightError::MalformedAst(format!("reference to unknown declaration {}", id))
        })
    }

    /// Look up a function or method declaration
    pub fn function(&self, id: DeclId) -> Result<(&Decl, &FunctionDecl)> {
        let decl = self.decl(id)?;
        match decl.as_function() {
            Some(function) => Ok((decl, function)),
            None => Err(SeqwrightError::MalformedAst(format!(
                "declaration {} ({}) is not callable",
                id, decl.name
            ))),
        }
    }

    /// Every declaration id that some body calls directly
    pub fn directly_called(&self) -> HashSet<DeclId> {
        let mut called = HashSet::new();
        for decl in &self.decls {
            called.extend(self.callees_of(decl));
        }
        called
    }

    /// Declaration ids called or referenced directly from one body
    pub fn callees_of(&self, decl: &Decl) -> HashSet<DeclId> {
        let mut called = HashSet::new();
        if let Some(body) = decl.as_function().and_then(|f| f.body.as_ref()) {
            collect_stmt_callees(body, &mut called);
        }
        called
    }
}

fn collect_stmt_callees(stmt: &Stmt, out: &mut HashSet<DeclId>) {
    match stmt {
        Stmt::Compound { body } => body.iter().for_each(|s| collect_stmt_callees(s, out)),
        Stmt::Expr { expr } => collect_expr_callees(expr, out),
        Stmt::VarDecl { init, .. } => {
            if let Some(init) = init {
                collect_expr_callees(init, out);
            }
        }
        Stmt::If { cond, then, otherwise, .. } => {
            collect_expr_callees(cond, out);
            collect_stmt_callees(then, out);
            if let Some(otherwise) = otherwise {
                collect_stmt_callees(otherwise, out);
            }
        }
        Stmt::Switch { cond, cases, .. } => {
            collect_expr_callees(cond, out);
            for case in cases {
                case.body.iter().for_each(|s| collect_stmt_callees(s, out));
            }
        }
        Stmt::While { cond, body, .. } | Stmt::DoWhile { body, cond, .. } => {
            collect_expr_callees(cond, out);
            collect_stmt_callees(body, out);
        }
        Stmt::For { init, cond, inc, body, .. } => {
            if let Some(init) = init {
                collect_stmt_callees(init, out);
            }
            for e in cond.iter().chain(inc.iter()) {
                collect_expr_callees(e, out);
            }
            collect_stmt_callees(body, out);
        }
        Stmt::ForRange { range, body, .. } => {
            collect_expr_callees(range, out);
            collect_stmt_callees(body, out);
        }
        Stmt::Try { body, handlers } => {
            collect_stmt_callees(body, out);
            for handler in handlers {
                collect_stmt_callees(&handler.body, out);
            }
        }
        Stmt::Return { value } | Stmt::CoReturn { value } => {
            if let Some(value) = value {
                collect_expr_callees(value, out);
            }
        }
        Stmt::Break | Stmt::Continue | Stmt::Null => {}
    }
}

fn collect_expr_callees(expr: &Expr, out: &mut HashSet<DeclId>) {
    match expr {
        Expr::Call(call) => {
            match &call.callee {
                Callee::Decl { decl, .. } => {
                    out.insert(*decl);
                }
                Callee::Expr { expr } => collect_expr_callees(expr, out),
                Callee::Var { .. } | Callee::Unresolved { .. } => {}
            }
            if let Some(object) = &call.object {
                collect_expr_callees(object, out);
            }
            call.args.iter().for_each(|a| collect_expr_callees(a, out));
        }
        Expr::Construct(construct) => {
            if let Some(ctor) = construct.ctor {
                out.insert(ctor);
            }
            construct.args.iter().for_each(|a| collect_expr_callees(a, out));
        }
        Expr::CoAwait(co_await) => collect_expr_callees(&co_await.operand, out),
        Expr::CoYield { operand, .. } => collect_expr_callees(operand, out),
        Expr::Async(launch) => {
            collect_expr_callees(&launch.callable, out);
            launch.args.iter().for_each(|a| collect_expr_callees(a, out));
        }
        Expr::DeclRef { decl } => {
            out.insert(*decl);
        }
        Expr::Assign { value, .. } => collect_expr_callees(value, out),
        Expr::Conditional { cond, then, otherwise, .. } => {
            collect_expr_callees(cond, out);
            collect_expr_callees(then, out);
            collect_expr_callees(otherwise, out);
        }
        Expr::Opaque { children } => children.iter().for_each(|c| collect_expr_callees(c, out)),
        Expr::Lambda(_) | Expr::Var { .. } => {}
    }
}
