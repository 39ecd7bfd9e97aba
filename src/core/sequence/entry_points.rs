// src/core/sequence/entry_points.rs
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use tracing::debug;

use crate::config::{EntryPointSpec, SequenceDiagramConfig};
use crate::core::ast::{AstIndex, Decl, DeclId, RecordDecl};
use crate::error::{SeqwrightError, Result};
use super::naming;

/// Turns configured start points into the declarations to traverse
pub struct EntryPointDetector<'a> {
    ast: &'a AstIndex,
}

impl<'a> EntryPointDetector<'a> {
    pub fn new(ast: &'a AstIndex) -> Self {
        Self { ast }
    }

    /// Entry points of a diagram: its `start_from` list, or when that is
    /// empty, the outermost callers of its `to` target
    pub fn detect_for(&self, config: &SequenceDiagramConfig) -> Result<Vec<&'a Decl>> {
        match (&config.to, config.start_from.is_empty()) {
            (Some(to), true) => self.callers_reaching(to),
            _ => self.detect_entry_points(&config.start_from),
        }
    }

    /// Resolve every configured start point, in order, without duplicates
    pub fn detect_entry_points(&self, specs: &[EntryPointSpec]) -> Result<Vec<&'a Decl>> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for spec in specs {
            let found = match spec {
                EntryPointSpec::Function(selector) => self.functions_named(selector)?,
                EntryPointSpec::TranslationUnit(file) => self.roots_of(file)?,
            };
            for decl in found {
                if seen.insert(decl.id) {
                    entries.push(decl);
                }
            }
        }

        debug!("Resolved {} entry points", entries.len());
        Ok(entries)
    }

    /// Functions defined anywhere that reach a function matching
    /// `selector` through direct calls and that nothing else calls; when
    /// every such caller is itself called (e.g. a cycle) all of them
    pub fn callers_reaching(&self, selector: &str) -> Result<Vec<&'a Decl>> {
        let targets: HashSet<DeclId> = self.matching(selector)?.iter().map(|d| d.id).collect();
        if targets.is_empty() {
            return Err(SeqwrightError::EntryPointNotFound(selector.to_string()));
        }

        let mut callers: HashMap<DeclId, Vec<DeclId>> = HashMap::new();
        for decl in self.ast.decls() {
            for callee in self.ast.callees_of(decl) {
                callers.entry(callee).or_default().push(decl.id);
            }
            // A lambda runs on behalf of the function that defines it
            if let Some(parent) = self.lambda_parent(decl) {
                callers.entry(decl.id).or_default().push(parent);
            }
        }

        let mut reached = HashSet::new();
        let mut queue: VecDeque<DeclId> = targets.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            for &caller in callers.get(&id).into_iter().flatten() {
                if reached.insert(caller) {
                    queue.push_back(caller);
                }
            }
        }

        let candidates: Vec<&'a Decl> = self
            .ast
            .decls()
            .filter(|d| reached.contains(&d.id) && !targets.contains(&d.id))
            .filter(|d| d.has_body() && !self.is_lambda_operator(d))
            .collect();
        if candidates.is_empty() {
            return Err(SeqwrightError::EntryPointNotFound(format!("no callers of {}", selector)));
        }

        let roots: Vec<&'a Decl> = candidates.iter().copied().filter(|d| !callers.contains_key(&d.id)).collect();
        debug!("Found {} callers reaching {}, {} of them roots", candidates.len(), selector, roots.len());
        Ok(if roots.is_empty() { candidates } else { roots })
    }

    /// Every overload matching `selector`, in declaration order
    fn functions_named(&self, selector: &str) -> Result<Vec<&'a Decl>> {
        let matches = self.matching(selector)?;
        if matches.is_empty() {
            return Err(SeqwrightError::EntryPointNotFound(selector.to_string()));
        }

        let defined: Vec<&'a Decl> = matches.into_iter().filter(|d| d.has_body()).collect();
        if defined.is_empty() {
            return Err(SeqwrightError::MalformedAst(format!(
                "entry point {} has no definition in the loaded dumps", selector
            )));
        }
        Ok(defined)
    }

    /// Functions defined in `file` that nothing else calls; when every
    /// function is called (e.g. mutual recursion) all of them
    fn roots_of(&self, file: &Path) -> Result<Vec<&'a Decl>> {
        let defined: Vec<&'a Decl> = self
            .ast
            .decls()
            .filter(|d| d.has_body() && !self.is_lambda_operator(d))
            .filter(|d| d.location.as_ref().map_or(false, |l| l.file.ends_with(file)))
            .collect();

        if defined.is_empty() {
            return Err(SeqwrightError::EntryPointNotFound(format!(
                "no functions defined in {}", file.display()
            )));
        }

        let called = self.ast.directly_called();
        let roots: Vec<&'a Decl> = defined.iter().copied().filter(|d| !called.contains(&d.id)).collect();

        Ok(if roots.is_empty() { defined } else { roots })
    }

    fn matching(&self, selector: &str) -> Result<Vec<&'a Decl>> {
        let mut matches = Vec::new();
        for decl in self.ast.decls() {
            let Some(function) = decl.as_function() else { continue };
            let names = naming::callable_names(self.ast, decl, function, &decl.template_args)?;
            if naming::selector_matches(selector, &names.qualified_name, &names.full_name) {
                matches.push(decl);
            }
        }
        Ok(matches)
    }

    fn is_lambda_operator(&self, decl: &Decl) -> bool {
        self.lambda_closure(decl).is_some()
    }

    /// Function a lambda call operator is defined in
    fn lambda_parent(&self, decl: &Decl) -> Option<DeclId> {
        self.lambda_closure(decl).and_then(|record| record.parent)
    }

    fn lambda_closure(&self, decl: &Decl) -> Option<&'a RecordDecl> {
        decl.as_function()
            .and_then(|f| f.owner)
            .and_then(|owner| self.ast.get(owner))
            .and_then(|owner| owner.as_record())
            .filter(|record| record.is_lambda)
    }
}
