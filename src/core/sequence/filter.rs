// src/core/sequence/filter.rs
use std::path::{Path, PathBuf};
use regex::Regex;

use crate::config::FilterRules;
use crate::error::Result;
use super::ParticipantKind;

/// Comment annotation that hides a declaration from every diagram
const SKIP_ANNOTATION: &str = "uml{skip}";

/// What a filter gets to see about an entity before it becomes a participant
#[derive(Debug, Clone)]
pub struct FilterCandidate<'a> {
    pub kind: ParticipantKind,
    pub qualified_name: &'a str,
    pub namespace: &'a str,
    pub file: Option<&'a Path>,
    pub annotations: &'a [String],
}

/// Decides which entities may appear in a diagram
pub trait DiagramFilter: Send + Sync {
    fn should_include(&self, candidate: &FilterCandidate<'_>) -> bool;
}

/// Accepts everything except explicitly skipped declarations
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeAll;

impl DiagramFilter for IncludeAll {
    fn should_include(&self, candidate: &FilterCandidate<'_>) -> bool {
        !is_skipped(candidate)
    }
}

fn is_skipped(candidate: &FilterCandidate<'_>) -> bool {
    candidate.annotations.iter().any(|a| a.contains(SKIP_ANNOTATION))
}

#[derive(Debug, Default)]
struct CompiledRules {
    namespaces: Vec<String>,
    paths: Vec<PathBuf>,
    elements: Vec<Regex>,
}

impl CompiledRules {
    fn compile(rules: &FilterRules) -> Result<Self> {
        let elements = rules
            .elements
            .iter()
            .map(|pattern| Regex::new(&format!("^(?:{})$", pattern)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            namespaces: rules.namespaces.clone(),
            paths: rules.paths.clone(),
            elements,
        })
    }

    fn is_empty(&self) -> bool {
        self.namespaces.is_empty() && self.paths.is_empty() && self.elements.is_empty()
    }

    fn matches(&self, candidate: &FilterCandidate<'_>, file: Option<&Path>) -> bool {
        let in_namespace = self.namespaces.iter().any(|ns| {
            candidate.namespace == ns || candidate.namespace.starts_with(&format!("{}::", ns))
        });
        let in_path = match file {
            Some(file) => self.paths.iter().any(|p| file.starts_with(p)),
            None => false,
        };
        let is_element = self.elements.iter().any(|re| re.is_match(candidate.qualified_name));

        in_namespace || in_path || is_element
    }
}

/// Include/exclude rules from a diagram's configuration
///
/// An empty include list admits everything. Excludes always win.
#[derive(Debug)]
pub struct ConfigFilter {
    include: CompiledRules,
    exclude: CompiledRules,
    root: Option<PathBuf>,
}

impl ConfigFilter {
    pub fn new(include: &FilterRules, exclude: &FilterRules, root: Option<&Path>) -> Result<Self> {
        Ok(Self {
            include: CompiledRules::compile(include)?,
            exclude: CompiledRules::compile(exclude)?,
            root: root.map(Path::to_path_buf),
        })
    }

    fn relative<'p>(&self, file: &'p Path) -> &'p Path {
        match &self.root {
            Some(root) => file.strip_prefix(root).unwrap_or(file),
            None => file,
        }
    }
}

impl DiagramFilter for ConfigFilter {
    fn should_include(&self, candidate: &FilterCandidate<'_>) -> bool {
        if is_skipped(candidate) {
            return false;
        }

        let file = candidate.file.map(|f| self.relative(f));
        if !self.include.is_empty() && !self.include.matches(candidate, file) {
            return false;
        }

        !self.exclude.matches(candidate, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate<'a>(qualified_name: &'a str, namespace: &'a str, file: Option<&'a Path>) -> FilterCandidate<'a> {
        FilterCandidate {
            kind: ParticipantKind::Function,
            qualified_name,
            namespace,
            file,
            annotations: &[],
        }
    }

    #[test]
    fn test_empty_rules_include_everything() {
        let filter = ConfigFilter::new(&FilterRules::default(), &FilterRules::default(), None).unwrap();
        assert!(filter.should_include(&candidate("std::vector<int>::push_back", "std", None)));
    }

    #[test]
    fn test_namespace_include_covers_nested_namespaces() {
        let include = FilterRules {
            namespaces: vec!["clanguml::t20001".to_string()],
            ..FilterRules::default()
        };
        let filter = ConfigFilter::new(&include, &FilterRules::default(), None).unwrap();

        assert!(filter.should_include(&candidate("clanguml::t20001::detail::f", "clanguml::t20001::detail", None)));
        assert!(!filter.should_include(&candidate("clanguml::t20001x::f", "clanguml::t20001x", None)));
        assert!(!filter.should_include(&candidate("std::sort", "std", None)));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let include = FilterRules {
            namespaces: vec!["app".to_string()],
            ..FilterRules::default()
        };
        let exclude = FilterRules {
            elements: vec![r"app::detail::.*".to_string()],
            ..FilterRules::default()
        };
        let filter = ConfigFilter::new(&include, &exclude, None).unwrap();

        assert!(filter.should_include(&candidate("app::run", "app", None)));
        assert!(!filter.should_include(&candidate("app::detail::helper", "app::detail", None)));
    }

    #[test]
    fn test_paths_are_relative_to_root() {
        let exclude = FilterRules {
            paths: vec![PathBuf::from("third_party")],
            ..FilterRules::default()
        };
        let filter = ConfigFilter::new(&FilterRules::default(), &exclude, Some(Path::new("/work/project"))).unwrap();

        let vendored = Path::new("/work/project/third_party/json.hpp");
        let own = Path::new("/work/project/src/main.cc");
        assert!(!filter.should_include(&candidate("nlohmann::parse", "nlohmann", Some(vendored))));
        assert!(filter.should_include(&candidate("main", "", Some(own))));
    }

    #[test]
    fn test_skip_annotation_always_excludes() {
        let annotations = vec!["\\uml{skip}".to_string()];
        let mut skipped = candidate("A::helper", "", None);
        skipped.annotations = &annotations;

        assert!(!IncludeAll.should_include(&skipped));
        let filter = ConfigFilter::new(&FilterRules::default(), &FilterRules::default(), None).unwrap();
        assert!(!filter.should_include(&skipped));
    }

    #[test]
    fn test_invalid_element_pattern_is_an_error() {
        let include = FilterRules {
            elements: vec!["ns::(".to_string()],
            ..FilterRules::default()
        };
        assert!(ConfigFilter::new(&include, &FilterRules::default(), None).is_err());
    }
}
