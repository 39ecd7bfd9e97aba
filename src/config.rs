use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{SeqwrightError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Sequence diagrams to generate, by name
    #[serde(default)]
    pub diagrams: BTreeMap<String, SequenceDiagramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Exported AST dumps (files or directories)
    #[serde(default)]
    pub ast_paths: Vec<PathBuf>,

    /// Diagram output directory
    pub output_dir: PathBuf,

    /// Source root that path filters are relative to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Formats written for every diagram
    pub formats: Vec<OutputFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Plantuml,
    Mermaid,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Plantuml => "puml",
            OutputFormat::Mermaid => "mmd",
            OutputFormat::Json => "json",
        }
    }
}

/// Where a diagram starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPointSpec {
    /// Qualified name, optionally with signature or template arguments
    Function(String),
    /// Every function defined in the file that no other code calls
    TranslationUnit(PathBuf),
}

/// How several entry points are laid out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiplexMode {
    /// One sequence covering every entry point in order
    #[default]
    Merged,
    /// One sequence per entry point
    Chains,
}

/// What to do with calls the front-end could not resolve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedCallPolicy {
    #[default]
    Elide,
    /// Draw them against an external participant named after the callee
    External,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRules {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,

    /// Source paths, relative to the project root
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<PathBuf>,

    /// Regular expressions matched against qualified names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<String>,
}

impl FilterRules {
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty() && self.paths.is_empty() && self.elements.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceDiagramConfig {
    #[serde(default)]
    pub mode: MultiplexMode,

    /// In chains mode, keep only the call chains reaching this function.
    /// Without `start_from`, every outermost caller of it is an entry point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    #[serde(default)]
    pub generate_return_messages: bool,

    #[serde(default = "default_true")]
    pub generate_condition_text: bool,

    #[serde(default)]
    pub generate_message_comments: bool,

    #[serde(default)]
    pub combine_free_functions_into_file_participants: bool,

    /// Draw calls made inside a lambda as made by the function that
    /// invokes it, without a lifeline for the lambda
    #[serde(default)]
    pub inline_lambda_messages: bool,

    #[serde(default)]
    pub unresolved_calls: UnresolvedCallPolicy,

    /// Stop descending below this many nested calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,

    #[serde(default)]
    pub start_from: Vec<EntryPointSpec>,

    #[serde(default, skip_serializing_if = "FilterRules::is_empty")]
    pub include: FilterRules,

    #[serde(default, skip_serializing_if = "FilterRules::is_empty")]
    pub exclude: FilterRules,
}

fn default_true() -> bool {
    true
}

impl SequenceDiagramConfig {
    /// A diagram defined only by its `to` target is always split into chains
    pub fn effective_mode(&self) -> MultiplexMode {
        if self.start_from.is_empty() && self.to.is_some() {
            MultiplexMode::Chains
        } else {
            self.mode
        }
    }

    pub fn starting_from(entry: EntryPointSpec) -> Self {
        Self {
            mode: MultiplexMode::default(),
            to: None,
            generate_return_messages: false,
            generate_condition_text: true,
            generate_message_comments: false,
            combine_free_functions_into_file_participants: false,
            inline_lambda_messages: false,
            unresolved_calls: UnresolvedCallPolicy::default(),
            max_depth: None,
            start_from: vec![entry],
            include: FilterRules::default(),
            exclude: FilterRules::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut diagrams = BTreeMap::new();
        diagrams.insert(
            "main_sequence".to_string(),
            SequenceDiagramConfig {
                exclude: FilterRules {
                    namespaces: vec!["std".to_string()],
                    ..FilterRules::default()
                },
                ..SequenceDiagramConfig::starting_from(EntryPointSpec::Function("main".to_string()))
            },
        );

        Self {
            project: ProjectConfig {
                name: "Unnamed Project".to_string(),
                ast_paths: vec![PathBuf::from("build/ast")],
                output_dir: PathBuf::from("docs/diagrams"),
                root: None,
            },
            output: OutputConfig {
                formats: vec![OutputFormat::Plantuml],
            },
            diagrams,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| SeqwrightError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SeqwrightError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                let candidates = [
                    "Seqwright.toml",
                    "seqwright.toml",
                    ".seqwright.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    /// Reject diagram definitions that cannot produce anything
    pub fn validate(&self) -> Result<()> {
        for (name, diagram) in &self.diagrams {
            if diagram.start_from.is_empty() && diagram.to.is_none() {
                return Err(SeqwrightError::Config(format!(
                    "diagram '{}' has neither start_from entries nor a 'to' target", name
                )));
            }
            if diagram.to.is_some() && diagram.effective_mode() != MultiplexMode::Chains {
                return Err(SeqwrightError::Config(format!(
                    "diagram '{}' sets 'to' but is not in chains mode", name
                )));
            }
            if diagram.max_depth == Some(0) {
                return Err(SeqwrightError::Config(format!(
                    "diagram '{}' has max_depth = 0", name
                )));
            }
        }
        Ok(())
    }
}
