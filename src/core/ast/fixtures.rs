// src/core/ast/fixtures.rs
//! Small constructors for building syntax trees in tests

use std::path::PathBuf;

use super::*;

pub const TEST_FILE: &str = "src/test.cc";

pub fn unit(decls: Vec<Decl>) -> TranslationUnit {
    TranslationUnit {
        file: PathBuf::from(TEST_FILE),
        decls,
    }
}

pub fn loc(line: u32, column: u32) -> SourceLocation {
    SourceLocation::new(TEST_FILE, line, column)
}

fn base(id: DeclId, name: &str, kind: DeclKind) -> Decl {
    Decl {
        id,
        name: name.to_string(),
        namespace: String::new(),
        location: Some(loc(id as u32, 1)),
        template_args: Vec::new(),
        instantiated_from: None,
        annotations: Vec::new(),
        kind,
    }
}

fn params_of(params: Vec<(&str, &str)>) -> Vec<Param> {
    params
        .into_iter()
        .map(|(ty, name)| Param {
            name: name.to_string(),
            ty: ty.to_string(),
        })
        .collect()
}

/// Free function; `params` are `(type, name)` pairs
pub fn function(id: DeclId, name: &str, params: Vec<(&str, &str)>, body: Option<Stmt>) -> Decl {
    base(id, name, DeclKind::Function(FunctionDecl {
        params: params_of(params),
        body,
        ..FunctionDecl::default()
    }))
}

pub fn method(id: DeclId, owner: DeclId, name: &str, params: Vec<(&str, &str)>, body: Option<Stmt>) -> Decl {
    base(id, name, DeclKind::Function(FunctionDecl {
        owner: Some(owner),
        params: params_of(params),
        body,
        ..FunctionDecl::default()
    }))
}

pub fn record(id: DeclId, name: &str) -> Decl {
    base(id, name, DeclKind::Record(RecordDecl::default()))
}

/// Closure record plus its `operator()` declared inside `parent`
pub fn closure(record_id: DeclId, operator_id: DeclId, parent: DeclId, at: SourceLocation, body: Stmt) -> Vec<Decl> {
    let mut class = base(record_id, "", DeclKind::Record(RecordDecl {
        is_lambda: true,
        parent: Some(parent),
        ..RecordDecl::default()
    }));
    class.location = Some(at.clone());

    let mut operator = method(operator_id, record_id, "operator()", vec![], Some(body));
    operator.location = Some(at);
    if let DeclKind::Function(f) = &mut operator.kind {
        f.is_const = true;
        f.is_operator = true;
    }

    vec![class, operator]
}

pub fn in_namespace(mut decl: Decl, namespace: &str) -> Decl {
    decl.namespace = namespace.to_string();
    decl
}

pub fn with_template_args(mut decl: Decl, args: &[&str], primary: Option<DeclId>) -> Decl {
    decl.template_args = args.iter().map(|a| a.to_string()).collect();
    decl.instantiated_from = primary;
    decl
}

pub fn with_flags(mut decl: Decl, update: impl FnOnce(&mut FunctionDecl)) -> Decl {
    if let DeclKind::Function(f) = &mut decl.kind {
        update(f);
    }
    decl
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    Stmt::Compound { body: stmts }
}

pub fn expr(e: Expr) -> Stmt {
    Stmt::Expr { expr: e }
}

pub fn var(name: &str, init: Expr) -> Stmt {
    Stmt::VarDecl {
        name: name.to_string(),
        init: Some(init),
    }
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return { value }
}

pub fn opaque() -> Expr {
    Expr::Opaque { children: vec![] }
}

fn call_expr(callee: Callee, args: Vec<Expr>) -> Expr {
    Expr::Call(CallExpr {
        callee,
        object: None,
        args,
        location: None,
        comment: None,
    })
}

pub fn call(decl: DeclId) -> Expr {
    call_with(decl, vec![])
}

pub fn call_with(decl: DeclId, args: Vec<Expr>) -> Expr {
    call_expr(Callee::Decl {
        decl,
        template_args: vec![],
        dispatch: Dispatch::Static,
    }, args)
}

pub fn call_at(decl: DeclId, at: SourceLocation, comment: Option<&str>) -> Expr {
    Expr::Call(CallExpr {
        callee: Callee::Decl {
            decl,
            template_args: vec![],
            dispatch: Dispatch::Static,
        },
        object: None,
        args: vec![],
        location: Some(at),
        comment: comment.map(|c| c.to_string()),
    })
}

pub fn call_template(decl: DeclId, args: &[&str]) -> Expr {
    call_expr(Callee::Decl {
        decl,
        template_args: args.iter().map(|a| a.to_string()).collect(),
        dispatch: Dispatch::Static,
    }, vec![])
}

pub fn virtual_call(decl: DeclId) -> Expr {
    call_expr(Callee::Decl {
        decl,
        template_args: vec![],
        dispatch: Dispatch::Virtual,
    }, vec![])
}

pub fn call_var(name: &str) -> Expr {
    call_expr(Callee::Var { name: name.to_string() }, vec![])
}

pub fn unresolved(name: &str, template: Option<DeclId>) -> Expr {
    call_expr(Callee::Unresolved {
        name: name.to_string(),
        template,
    }, vec![])
}

/// Call the value of an arbitrary expression, e.g. `[]{ ... }()`
pub fn invoke(callee: Expr) -> Expr {
    call_expr(Callee::Expr { expr: Box::new(callee) }, vec![])
}

pub fn lambda(operator: DeclId) -> Expr {
    Expr::Lambda(LambdaExpr {
        operator,
        location: None,
    })
}

pub fn decl_ref(decl: DeclId) -> Expr {
    Expr::DeclRef { decl }
}

pub fn if_else(cond: Expr, then: Vec<Stmt>, otherwise: Option<Vec<Stmt>>) -> Stmt {
    Stmt::If {
        cond,
        then: Box::new(block(then)),
        otherwise: otherwise.map(|o| Box::new(block(o))),
        constexpr: false,
        cond_text: None,
    }
}
