// src/core/sequence/naming.rs
//! Deterministic names for declarations, including anonymous ones

use crate::core::ast::{AstIndex, Decl, DeclKind, FunctionDecl};
use crate::error::{SeqwrightError, Result};
use super::ParticipantKind;

/// Records nest through `parent`; deeper chains than this are cyclic input
const MAX_SCOPE_DEPTH: usize = 64;

/// Names derived for a function, method or lambda call operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableNames {
    pub kind: ParticipantKind,
    pub qualified_name: String,
    pub full_name: String,
    pub operation: String,
    pub namespace: String,
    /// Set for methods: the record whose lifeline they are drawn on
    pub owner: Option<u64>,
}

pub fn templated(name: &str, args: &[String]) -> String {
    if args.is_empty() {
        name.to_string()
    } else {
        format!("{}<{}>", name, args.join(","))
    }
}

pub fn join_scope(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", scope, name)
    }
}

/// `(int,const std::string &) const`
pub fn signature(function: &FunctionDecl) -> String {
    let params: Vec<&str> = function.params.iter().map(|p| p.ty.as_str()).collect();
    let constness = if function.is_const { " const" } else { "" };
    format!("({}){}", params.join(","), constness)
}

/// Qualified name of a record, naming closures and anonymous records after
/// their enclosing scope and source position
pub fn record_name(ast: &AstIndex, decl: &Decl) -> Result<String> {
    record_name_at(ast, decl, 0)
}

fn record_name_at(ast: &AstIndex, decl: &Decl, depth: usize) -> Result<String> {
    if depth > MAX_SCOPE_DEPTH {
        return Err(SeqwrightError::MalformedAst(format!(
            "scope chain of declaration {} does not terminate", decl.id
        )));
    }

    let record = decl.as_record().ok_or_else(|| {
        SeqwrightError::MalformedAst(format!("declaration {} is not a record", decl.id))
    })?;

    let scope = match record.parent {
        Some(parent_id) => {
            let parent = ast.decl(parent_id)?;
            match &parent.kind {
                DeclKind::Function(function) => {
                    callable_names_at(ast, parent, function, &parent.template_args, depth + 1)?.full_name
                }
                DeclKind::Record(_) => record_name_at(ast, parent, depth + 1)?,
            }
        }
        None => decl.namespace.clone(),
    };

    let local = if record.is_lambda {
        format!("lambda@{}", position(decl))
    } else if decl.name.is_empty() {
        format!("(anonymous@{})", position(decl))
    } else {
        templated(&decl.name, &decl.template_args)
    };

    Ok(join_scope(&scope, &local))
}

fn position(decl: &Decl) -> String {
    match &decl.location {
        Some(location) => format!("{}:{}", location.line, location.column),
        None => format!("decl{}", decl.id),
    }
}

/// Names of a callable, with `template_args` overriding the declaration's
/// own arguments (used for call-site instantiations of a primary template)
pub fn callable_names(
    ast: &AstIndex,
    decl: &Decl,
    function: &FunctionDecl,
    template_args: &[String],
) -> Result<CallableNames> {
    callable_names_at(ast, decl, function, template_args, 0)
}

fn callable_names_at(
    ast: &AstIndex,
    decl: &Decl,
    function: &FunctionDecl,
    template_args: &[String],
    depth: usize,
) -> Result<CallableNames> {
    let name = templated(&decl.name, template_args);
    let signature = signature(function);

    let Some(owner_id) = function.owner else {
        let qualified_name = join_scope(&decl.namespace, &name);
        return Ok(CallableNames {
            kind: ParticipantKind::Function,
            full_name: format!("{}{}", qualified_name, signature),
            qualified_name,
            operation: format!("{}{}", name, signature),
            namespace: decl.namespace.clone(),
            owner: None,
        });
    };

    let owner = ast.decl(owner_id)?;
    let record = owner.as_record().ok_or_else(|| {
        SeqwrightError::MalformedAst(format!(
            "owner {} of method {} is not a record", owner_id, decl.name
        ))
    })?;
    let owner_name = record_name_at(ast, owner, depth + 1)?;
    let namespace = if decl.namespace.is_empty() {
        owner.namespace.clone()
    } else {
        decl.namespace.clone()
    };

    if record.is_lambda {
        // The closure is its own lifeline; its call operator has no
        // separate identity in the diagram
        return Ok(CallableNames {
            kind: ParticipantKind::Lambda,
            qualified_name: owner_name.clone(),
            full_name: owner_name,
            operation: format!("{}{}", name, signature),
            namespace,
            owner: None,
        });
    }

    let qualified_name = join_scope(&owner_name, &name);
    Ok(CallableNames {
        kind: ParticipantKind::Method,
        full_name: format!("{}{}", qualified_name, signature),
        qualified_name,
        operation: format!("{}{}", name, signature),
        namespace,
        owner: Some(owner_id),
    })
}

/// Strip a trailing template argument list: `Adder<int,int>` -> `Adder`
pub fn strip_template_args(name: &str) -> &str {
    if !name.ends_with('>') {
        return name;
    }
    let mut depth = 0usize;
    for (i, c) in name.char_indices().rev() {
        match c {
            '>' => depth += 1,
            '<' => {
                depth -= 1;
                if depth == 0 {
                    return &name[..i];
                }
            }
            _ => {}
        }
    }
    name
}

/// Does a user-written selector name this callable?
///
/// Accepts the qualified name (every overload), the full name with
/// signature (one overload) or the qualified name without template
/// arguments (every instantiation).
pub fn selector_matches(selector: &str, qualified_name: &str, full_name: &str) -> bool {
    let selector = selector.trim();
    selector == qualified_name
        || selector == full_name
        || selector == strip_template_args(qualified_name)
}
