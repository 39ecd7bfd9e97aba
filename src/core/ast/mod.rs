// src/core/ast/mod.rs
//! Front-end syntax tree model
//!
//! The compiler front-end exports one JSON document per translation unit.
//! Everything in here is already resolved: declarations carry their
//! qualified scope, template arguments and bodies, and call expressions
//! point at the declaration the compiler picked.

mod index;
mod loader;

#[cfg(test)]
pub mod fixtures;

use std::path::PathBuf;
use serde::{Serialize, Deserialize};

pub use index::AstIndex;
pub use loader::AstLoader;

/// Stable declaration identifier assigned by the front-end
pub type DeclId = u64;

/// Position of a declaration or expression in the source tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(default)]
    pub file: PathBuf,
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

/// One exported translation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub file: PathBuf,
    #[serde(default)]
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decl {
    pub id: DeclId,
    /// Unqualified name (empty for anonymous records)
    #[serde(default)]
    pub name: String,
    /// Enclosing namespace, `::` separated
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub location: Option<SourceLocation>,
    /// Concrete template arguments for specializations/instantiations
    #[serde(default)]
    pub template_args: Vec<String>,
    /// Primary template this declaration was instantiated from
    #[serde(default)]
    pub instantiated_from: Option<DeclId>,
    /// Raw comment annotations, e.g. `\uml{skip}`
    #[serde(default)]
    pub annotations: Vec<String>,
    #[serde(flatten)]
    pub kind: DeclKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeclKind {
    Record(RecordDecl),
    #[serde(alias = "method")]
    Function(FunctionDecl),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordDecl {
    #[serde(default)]
    pub is_struct: bool,
    #[serde(default)]
    pub is_lambda: bool,
    /// Enclosing function or record for local, nested and closure types
    #[serde(default)]
    pub parent: Option<DeclId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    /// Owning record for methods
    #[serde(default)]
    pub owner: Option<DeclId>,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default = "default_return_type")]
    pub return_type: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_constructor: bool,
    #[serde(default)]
    pub is_destructor: bool,
    #[serde(default)]
    pub is_operator: bool,
    #[serde(default)]
    pub is_coroutine: bool,
    #[serde(default)]
    pub body: Option<Stmt>,
}

fn default_return_type() -> String {
    "void".to_string()
}

impl Default for FunctionDecl {
    fn default() -> Self {
        Self {
            owner: None,
            params: Vec::new(),
            return_type: default_return_type(),
            is_static: false,
            is_const: false,
            is_virtual: false,
            is_constructor: false,
            is_destructor: false,
            is_operator: false,
            is_coroutine: false,
            body: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl Decl {
    pub fn as_function(&self) -> Option<&FunctionDecl> {
        match &self.kind {
            DeclKind::Function(f) => Some(f),
            DeclKind::Record(_) => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordDecl> {
        match &self.kind {
            DeclKind::Record(r) => Some(r),
            DeclKind::Function(_) => None,
        }
    }

    pub fn has_body(&self) -> bool {
        self.as_function().map_or(false, |f| f.body.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    Compound {
        #[serde(default)]
        body: Vec<Stmt>,
    },
    Expr {
        expr: Expr,
    },
    VarDecl {
        name: String,
        #[serde(default)]
        init: Option<Expr>,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        #[serde(default)]
        otherwise: Option<Box<Stmt>>,
        /// `if constexpr` / `if consteval`
        #[serde(default)]
        constexpr: bool,
        #[serde(default)]
        cond_text: Option<String>,
    },
    Switch {
        cond: Expr,
        #[serde(default)]
        cases: Vec<SwitchCase>,
        #[serde(default)]
        cond_text: Option<String>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        #[serde(default)]
        cond_text: Option<String>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
        #[serde(default)]
        cond_text: Option<String>,
    },
    For {
        #[serde(default)]
        init: Option<Box<Stmt>>,
        #[serde(default)]
        cond: Option<Expr>,
        #[serde(default)]
        inc: Option<Expr>,
        body: Box<Stmt>,
        #[serde(default)]
        cond_text: Option<String>,
    },
    ForRange {
        range: Expr,
        body: Box<Stmt>,
        #[serde(default)]
        cond_text: Option<String>,
    },
    Try {
        body: Box<Stmt>,
        #[serde(default)]
        handlers: Vec<CatchHandler>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    CoReturn {
        #[serde(default)]
        value: Option<Expr>,
    },
    Break,
    Continue,
    Null,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` for `default:`
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchHandler {
    /// Caught exception declaration text, `None` for `catch (...)`
    #[serde(default)]
    pub exception: Option<String>,
    pub body: Stmt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Call(CallExpr),
    Construct(ConstructExpr),
    Lambda(LambdaExpr),
    CoAwait(CoAwaitExpr),
    CoYield {
        operand: Box<Expr>,
        #[serde(default)]
        location: Option<SourceLocation>,
    },
    Async(AsyncExpr),
    /// Reference to a function, e.g. `&foo` or `foo` passed as a value
    DeclRef {
        decl: DeclId,
    },
    Var {
        name: String,
    },
    Assign {
        target: String,
        value: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
        #[serde(default)]
        cond_text: Option<String>,
    },
    /// Anything else; sub-expressions are listed in evaluation order
    Opaque {
        #[serde(default)]
        children: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallExpr {
    pub callee: Callee,
    /// Implicit object argument for member calls
    #[serde(default)]
    pub object: Option<Box<Expr>>,
    #[serde(default)]
    pub args: Vec<Expr>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
    /// Comment the front-end associated with this call site
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum Callee {
    Decl {
        decl: DeclId,
        /// Explicit or deduced arguments when `decl` is a primary template
        #[serde(default)]
        template_args: Vec<String>,
        #[serde(default)]
        dispatch: Dispatch,
    },
    Var {
        name: String,
    },
    Expr {
        expr: Box<Expr>,
    },
    Unresolved {
        name: String,
        /// Primary template the dependent name most likely refers to
        #[serde(default)]
        template: Option<DeclId>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    #[default]
    Static,
    Virtual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructExpr {
    pub class: DeclId,
    #[serde(default)]
    pub ctor: Option<DeclId>,
    #[serde(default)]
    pub args: Vec<Expr>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaExpr {
    /// The closure type's `operator()` declaration, which owns the body
    pub operator: DeclId,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoAwaitExpr {
    pub operand: Box<Expr>,
    /// The awaiter's `await_resume` declaration, when known
    #[serde(default)]
    pub awaiter: Option<DeclId>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncExpr {
    /// e.g. `std::async`, `std::thread`
    #[serde(default)]
    pub launcher: String,
    pub callable: Box<Expr>,
    #[serde(default)]
    pub args: Vec<Expr>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}
