// src/core/ast/loader.rs
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use ignore::WalkBuilder;
use sha2::{Sha256, Digest};
use tracing::{debug, info};

use crate::error::{SeqwrightError, Result};
use super::{AstIndex, TranslationUnit};

/// Loads exported translation unit dumps from files and directories
pub struct AstLoader {
    /// Content hashes of dumps already loaded
    seen: HashSet<String>,
    /// Skip dumps larger than this (in bytes)
    max_file_size: usize,
}

impl AstLoader {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
            max_file_size: 256 * 1024 * 1024,
        }
    }

    /// Load every dump reachable from `paths` into one index
    pub async fn load_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<AstIndex> {
        let mut units = Vec::new();

        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                units.extend(self.load_directory(path).await?);
            } else if let Some(unit) = self.load_file(path).await? {
                units.push(unit);
            }
        }

        let index = AstIndex::from_units(units);
        info!("Loaded {} declarations", index.len());
        Ok(index)
    }

    /// Load all `*.json` dumps below a directory, in path order
    pub async fn load_directory<P: AsRef<Path>>(&mut self, dir: P) -> Result<Vec<TranslationUnit>> {
        let walker = WalkBuilder::new(dir)
            .hidden(false)
            .git_ignore(true)
            .build();

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| SeqwrightError::FileSystem(e.to_string()))?;
            let path = entry.path();
            if path.is_file() && self.is_dump(path) {
                files.push(path.to_path_buf());
            }
        }
        files.sort();

        let mut units = Vec::new();
        for file in files {
            if let Some(unit) = self.load_file(&file).await? {
                units.push(unit);
            }
        }
        Ok(units)
    }

    /// Load a single dump; returns `None` for an already-seen duplicate
    pub async fn load_file<P: AsRef<Path>>(&mut self, file_path: P) -> Result<Option<TranslationUnit>> {
        let path = file_path.as_ref();
        let content = std::fs::read_to_string(path)?;

        if content.len() > self.max_file_size {
            return Err(SeqwrightError::FileSystem(
                format!("AST dump {} exceeds maximum size limit", path.display())
            ));
        }

        let hash = self.calculate_hash(&content);
        if !self.seen.insert(hash) {
            debug!("Skipping duplicate AST dump {}", path.display());
            return Ok(None);
        }

        let unit: TranslationUnit = serde_json::from_str(&content)
            .map_err(|e| SeqwrightError::MalformedAst(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded {} declarations from {}", unit.decls.len(), path.display());

        Ok(Some(unit))
    }

    fn is_dump(&self, path: &Path) -> bool {
        path.extension().and_then(|ext| ext.to_str()) == Some("json")
    }

    /// Calculate SHA256 hash of content
    fn calculate_hash(&self, content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl Default for AstLoader {
    fn default() -> Self {
        Self::new()
    }
}
