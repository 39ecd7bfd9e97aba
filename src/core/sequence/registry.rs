// src/core/sequence/registry.rs
use std::collections::HashMap;
use sha2::{Sha256, Digest};
use tracing::debug;

use crate::core::ast::{AstIndex, Decl, DeclId, DeclKind, FunctionDecl, RecordDecl};
use crate::error::{SeqwrightError, Result};
use super::filter::{DiagramFilter, FilterCandidate};
use super::naming::{self, CallableNames};
use super::{Participant, ParticipantId, ParticipantKind};

/// Something that can become a participant
#[derive(Debug, Clone, Copy)]
pub enum Entity<'a> {
    /// A function, method, lambda call operator or record
    Decl(&'a Decl),
    /// A primary template called with concrete call-site arguments
    Instantiation { decl: &'a Decl, template_args: &'a [String] },
    /// The promise/handle side of a coroutine
    CoroutineState { coroutine: ParticipantId },
    /// A callee the front-end could not resolve
    External { name: &'a str },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryOptions {
    /// Draw free functions on one lifeline per source file
    pub combine_free_functions_into_file_participants: bool,
}

/// Interns participants for one diagram pass
///
/// The same entity always maps to the same id; entities rejected by the
/// diagram filter map to [`ParticipantId::TOMBSTONE`].
#[derive(Debug, Default)]
pub struct Registry {
    options: RegistryOptions,
    participants: Vec<Participant>,
    by_id: HashMap<ParticipantId, usize>,
    by_key: HashMap<String, ParticipantId>,
    decl_cache: HashMap<(DeclId, Vec<String>), ParticipantId>,
}

impl Registry {
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn intern(&mut self, entity: Entity<'_>, ast: &AstIndex, filter: &dyn DiagramFilter) -> Result<ParticipantId> {
        match entity {
            Entity::Decl(decl) => self.intern_decl(decl, &[], ast, filter),
            Entity::Instantiation { decl, template_args } => {
                if decl.template_args.is_empty() {
                    self.intern_decl(decl, template_args, ast, filter)
                } else {
                    self.intern_decl(decl, &[], ast, filter)
                }
            }
            Entity::CoroutineState { coroutine } => self.intern_coroutine_state(coroutine),
            Entity::External { name } => self.intern_external(name, filter),
        }
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.by_id.get(&id).map(|&pos| &self.participants[pos])
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn is_visible(&self, id: ParticipantId) -> bool {
        !id.is_tombstone() && self.by_id.contains_key(&id)
    }

    pub fn operation(&self, id: ParticipantId) -> String {
        self.get(id).map(|p| p.operation.clone()).unwrap_or_default()
    }

    /// Participants a user-written name selector refers to
    pub fn find(&self, selector: &str) -> Vec<ParticipantId> {
        self.participants
            .iter()
            .filter(|p| naming::selector_matches(selector, &p.qualified_name, &p.full_name))
            .map(|p| p.id)
            .collect()
    }

    fn intern_decl(&mut self, decl: &Decl, call_site_args: &[String], ast: &AstIndex, filter: &dyn DiagramFilter) -> Result<ParticipantId> {
        let cache_key = (decl.id, call_site_args.to_vec());
        if let Some(&id) = self.decl_cache.get(&cache_key) {
            return Ok(id);
        }

        let id = match &decl.kind {
            DeclKind::Record(record) => self.intern_record(decl, record, ast, filter)?,
            DeclKind::Function(function) => self.intern_callable(decl, function, call_site_args, ast, filter)?,
        };

        self.decl_cache.insert(cache_key, id);
        Ok(id)
    }

    fn intern_record(&mut self, decl: &Decl, record: &RecordDecl, ast: &AstIndex, filter: &dyn DiagramFilter) -> Result<ParticipantId> {
        let qualified_name = naming::record_name(ast, decl)?;
        let kind = if record.is_lambda { ParticipantKind::Lambda } else { ParticipantKind::Class };

        let candidate = FilterCandidate {
            kind,
            qualified_name: &qualified_name,
            namespace: &decl.namespace,
            file: decl.location.as_ref().map(|l| l.file.as_path()),
            annotations: &decl.annotations,
        };
        if !filter.should_include(&candidate) {
            debug!("Filtered out {}", qualified_name);
            return Ok(ParticipantId::TOMBSTONE);
        }

        let instantiated_from = match decl.instantiated_from {
            Some(primary) => {
                let primary = self.intern_decl(ast.decl(primary)?, &[], ast, filter)?;
                self.visible(primary)
            }
            None => None,
        };

        Ok(self.insert(Participant {
            id: ParticipantId::TOMBSTONE,
            kind,
            key: String::new(),
            operation: format!("{}()", naming::templated(&decl.name, &decl.template_args)),
            full_name: qualified_name.clone(),
            qualified_name,
            namespace: decl.namespace.clone(),
            location: decl.location.clone(),
            owner: None,
            instantiated_from,
            return_type: None,
            is_static: false,
        }))
    }

    fn intern_callable(
        &mut self,
        decl: &Decl,
        function: &FunctionDecl,
        call_site_args: &[String],
        ast: &AstIndex,
        filter: &dyn DiagramFilter,
    ) -> Result<ParticipantId> {
        let template_args = if call_site_args.is_empty() { &decl.template_args[..] } else { call_site_args };
        let names: CallableNames = naming::callable_names(ast, decl, function, template_args)?;

        // Lambdas are filtered through their closure so annotations on
        // either side apply
        let mut annotations = decl.annotations.clone();
        if let Some(owner) = function.owner {
            annotations.extend(ast.decl(owner)?.annotations.iter().cloned());
        }
        let candidate = FilterCandidate {
            kind: names.kind,
            qualified_name: &names.qualified_name,
            namespace: &names.namespace,
            file: decl.location.as_ref().map(|l| l.file.as_path()),
            annotations: &annotations,
        };
        if !filter.should_include(&candidate) {
            debug!("Filtered out {}", names.full_name);
            return Ok(ParticipantId::TOMBSTONE);
        }

        let owner = match names.owner {
            Some(owner_id) => {
                let owner = self.intern_decl(ast.decl(owner_id)?, &[], ast, filter)?;
                if owner.is_tombstone() {
                    return Ok(ParticipantId::TOMBSTONE);
                }
                Some(owner)
            }
            None if names.kind == ParticipantKind::Function
                && self.options.combine_free_functions_into_file_participants =>
            {
                decl.location.as_ref().map(|l| self.intern_file(&l.file.display().to_string()))
            }
            None => None,
        };

        let primary = if !call_site_args.is_empty() {
            Some(self.intern_decl(decl, &[], ast, filter)?)
        } else {
            match decl.instantiated_from {
                Some(primary) => Some(self.intern_decl(ast.decl(primary)?, &[], ast, filter)?),
                None => None,
            }
        };
        let instantiated_from = primary.and_then(|id| self.visible(id));

        Ok(self.insert(Participant {
            id: ParticipantId::TOMBSTONE,
            kind: names.kind,
            key: String::new(),
            qualified_name: names.qualified_name,
            full_name: names.full_name,
            operation: names.operation,
            namespace: names.namespace,
            location: decl.location.clone(),
            owner,
            instantiated_from,
            return_type: Some(function.return_type.clone()),
            is_static: function.is_static,
        }))
    }

    fn intern_file(&mut self, file: &str) -> ParticipantId {
        self.insert(Participant {
            id: ParticipantId::TOMBSTONE,
            kind: ParticipantKind::File,
            key: String::new(),
            qualified_name: file.to_string(),
            full_name: file.to_string(),
            operation: String::new(),
            namespace: String::new(),
            location: None,
            owner: None,
            instantiated_from: None,
            return_type: None,
            is_static: false,
        })
    }

    fn intern_coroutine_state(&mut self, coroutine: ParticipantId) -> Result<ParticipantId> {
        let base = self.get(coroutine).cloned().ok_or_else(|| {
            SeqwrightError::MalformedAst(format!("coroutine state for unknown participant {}", coroutine))
        })?;

        let name = format!("{}::<coroutine state>", base.full_name);
        Ok(self.insert(Participant {
            id: ParticipantId::TOMBSTONE,
            kind: ParticipantKind::CoroutineState,
            key: String::new(),
            qualified_name: name.clone(),
            full_name: name,
            operation: "co_await".to_string(),
            namespace: base.namespace,
            location: base.location,
            owner: None,
            instantiated_from: None,
            return_type: None,
            is_static: false,
        }))
    }

    fn intern_external(&mut self, name: &str, filter: &dyn DiagramFilter) -> Result<ParticipantId> {
        let namespace = name.rsplit_once("::").map(|(ns, _)| ns).unwrap_or_default();
        let candidate = FilterCandidate {
            kind: ParticipantKind::External,
            qualified_name: name,
            namespace,
            file: None,
            annotations: &[],
        };
        if !filter.should_include(&candidate) {
            return Ok(ParticipantId::TOMBSTONE);
        }

        let short = name.rsplit("::").next().unwrap_or(name);
        Ok(self.insert(Participant {
            id: ParticipantId::TOMBSTONE,
            kind: ParticipantKind::External,
            key: String::new(),
            qualified_name: name.to_string(),
            full_name: name.to_string(),
            operation: format!("{}()", short),
            namespace: namespace.to_string(),
            location: None,
            owner: None,
            instantiated_from: None,
            return_type: None,
            is_static: false,
        }))
    }

    fn visible(&self, id: ParticipantId) -> Option<ParticipantId> {
        if self.is_visible(id) { Some(id) } else { None }
    }

    /// Store a participant under its key, assigning its id; an existing
    /// participant with the same key is reused
    fn insert(&mut self, mut participant: Participant) -> ParticipantId {
        let key = format!("{}:{}", participant.kind.tag(), participant.full_name);
        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }

        let id = self.allocate_id(&key);
        participant.id = id;
        participant.key = key.clone();

        self.by_key.insert(key, id);
        self.by_id.insert(id, self.participants.len());
        self.participants.push(participant);
        id
    }

    fn allocate_id(&self, key: &str) -> ParticipantId {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let mut raw = u64::from_be_bytes(bytes);

        // Probe past the tombstone and any (unlikely) hash collision
        while raw == 0 || self.by_id.contains_key(&ParticipantId::from_raw(raw)) {
            raw = raw.wrapping_add(1);
        }
        ParticipantId::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterRules;
    use crate::core::ast::fixtures::*;
    use crate::core::sequence::filter::{ConfigFilter, IncludeAll};

    fn factorial_index() -> AstIndex {
        AstIndex::from_units(vec![unit(vec![
            record(1, "Factorial"),
            with_template_args(record(2, "Factorial"), &["3"], Some(1)),
            with_template_args(record(3, "Factorial"), &["2"], Some(1)),
            method(4, 2, "print", vec![("int", "x")], Some(block(vec![]))),
            method(5, 3, "print", vec![("int", "x")], Some(block(vec![]))),
        ])])
    }

    #[test]
    fn test_interning_is_idempotent() {
        let index = factorial_index();
        let mut registry = Registry::default();

        let decl = index.decl(4).unwrap();
        let first = registry.intern(Entity::Decl(decl), &index, &IncludeAll).unwrap();
        let second = registry.intern(Entity::Decl(decl), &index, &IncludeAll).unwrap();

        assert_eq!(first, second);
        assert!(!first.is_tombstone());
        // method plus its owner class plus the primary template
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_distinct_instantiations_are_distinct_participants() {
        let index = factorial_index();
        let mut registry = Registry::default();

        let print3 = registry.intern(Entity::Decl(index.decl(4).unwrap()), &index, &IncludeAll).unwrap();
        let print2 = registry.intern(Entity::Decl(index.decl(5).unwrap()), &index, &IncludeAll).unwrap();

        assert_ne!(print3, print2);
        let p3 = registry.get(print3).unwrap();
        let p2 = registry.get(print2).unwrap();
        assert_eq!(p3.full_name, "Factorial<3>::print(int)");
        assert_eq!(p2.full_name, "Factorial<2>::print(int)");
        assert_ne!(p3.owner, p2.owner);

        let class3 = p3.owner.unwrap();
        let primary = registry.get(class3).unwrap().instantiated_from.unwrap();
        assert_eq!(registry.get(primary).unwrap().full_name, "Factorial");
    }

    #[test]
    fn test_call_site_template_args_create_instantiation() {
        let index = AstIndex::from_units(vec![unit(vec![
            in_namespace(function(1, "add", vec![("T", "a")], Some(block(vec![]))), "ns"),
        ])]);
        let mut registry = Registry::default();
        let decl = index.decl(1).unwrap();
        let int_args = vec!["int".to_string()];

        let instantiation = registry.intern(
            Entity::Instantiation { decl, template_args: &int_args },
            &index,
            &IncludeAll,
        ).unwrap();

        let participant = registry.get(instantiation).unwrap();
        assert_eq!(participant.full_name, "ns::add<int>(T)");
        let primary = participant.instantiated_from.unwrap();
        assert_eq!(registry.get(primary).unwrap().full_name, "ns::add(T)");
    }

    #[test]
    fn test_filtered_entity_is_tombstone_and_not_stored() {
        let index = AstIndex::from_units(vec![unit(vec![
            in_namespace(function(1, "sort", vec![], None), "std"),
        ])]);
        let exclude = FilterRules {
            namespaces: vec!["std".to_string()],
            ..FilterRules::default()
        };
        let filter = ConfigFilter::new(&FilterRules::default(), &exclude, None).unwrap();
        let mut registry = Registry::default();

        let id = registry.intern(Entity::Decl(index.decl(1).unwrap()), &index, &filter).unwrap();

        assert!(id.is_tombstone());
        assert!(!registry.is_visible(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_method_of_filtered_class_is_tombstone() {
        let index = AstIndex::from_units(vec![unit(vec![
            in_namespace(record(1, "vector"), "std"),
            in_namespace(method(2, 1, "push_back", vec![], None), "app"),
        ])]);
        let exclude = FilterRules {
            elements: vec!["std::vector".to_string()],
            ..FilterRules::default()
        };
        let filter = ConfigFilter::new(&FilterRules::default(), &exclude, None).unwrap();
        let mut registry = Registry::default();

        let id = registry.intern(Entity::Decl(index.decl(2).unwrap()), &index, &filter).unwrap();
        assert!(id.is_tombstone());
    }

    #[test]
    fn test_ids_are_deterministic_across_registries() {
        let index = factorial_index();
        let decl = index.decl(5).unwrap();

        let mut first = Registry::default();
        let mut second = Registry::default();
        // Different interning order must not change ids
        second.intern(Entity::Decl(index.decl(4).unwrap()), &index, &IncludeAll).unwrap();

        let a = first.intern(Entity::Decl(decl), &index, &IncludeAll).unwrap();
        let b = second.intern(Entity::Decl(decl), &index, &IncludeAll).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_free_functions_combined_into_file_participant() {
        let index = AstIndex::from_units(vec![unit(vec![
            function(1, "f", vec![], Some(block(vec![]))),
            function(2, "g", vec![], Some(block(vec![]))),
        ])]);
        let mut registry = Registry::new(RegistryOptions {
            combine_free_functions_into_file_participants: true,
        });

        let f = registry.intern(Entity::Decl(index.decl(1).unwrap()), &index, &IncludeAll).unwrap();
        let g = registry.intern(Entity::Decl(index.decl(2).unwrap()), &index, &IncludeAll).unwrap();

        let f_owner = registry.get(f).unwrap().owner.unwrap();
        assert_eq!(Some(f_owner), registry.get(g).unwrap().owner);
        let file = registry.get(f_owner).unwrap();
        assert_eq!(file.kind, ParticipantKind::File);
        assert_eq!(file.full_name, TEST_FILE);
    }

    #[test]
    fn test_external_and_coroutine_state_participants() {
        let index = AstIndex::from_units(vec![unit(vec![
            with_flags(function(1, "task", vec![], Some(block(vec![]))), |f| f.is_coroutine = true),
        ])]);
        let mut registry = Registry::default();

        let external = registry.intern(Entity::External { name: "lib::opaque_call" }, &index, &IncludeAll).unwrap();
        assert_eq!(registry.get(external).unwrap().operation, "opaque_call()");
        assert_eq!(registry.get(external).unwrap().namespace, "lib");

        let task = registry.intern(Entity::Decl(index.decl(1).unwrap()), &index, &IncludeAll).unwrap();
        let state = registry.intern(Entity::CoroutineState { coroutine: task }, &index, &IncludeAll).unwrap();
        assert_eq!(registry.get(state).unwrap().kind, ParticipantKind::CoroutineState);
        assert_eq!(
            registry.intern(Entity::CoroutineState { coroutine: task }, &index, &IncludeAll).unwrap(),
            state
        );
    }

    #[test]
    fn test_find_by_selector() {
        let index = factorial_index();
        let mut registry = Registry::default();
        registry.intern(Entity::Decl(index.decl(4).unwrap()), &index, &IncludeAll).unwrap();
        registry.intern(Entity::Decl(index.decl(5).unwrap()), &index, &IncludeAll).unwrap();

        assert_eq!(registry.find("Factorial<2>::print").len(), 1);
        assert_eq!(registry.find("Factorial<3>::print(int)").len(), 1);
        assert!(registry.find("Other::print").is_empty());
    }
}
