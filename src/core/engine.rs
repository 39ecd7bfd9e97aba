// src/core/engine.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result};
use tracing::{info, warn, debug};

use crate::config::{Config, OutputFormat};
use crate::error::SeqwrightError;
use super::ast::{AstIndex, AstLoader};
use super::render::renderer_for;
use super::sequence::{EntryPointDetector, SequenceDiagram, SequenceDiagramGenerator};

/// Main orchestration engine for Seqwright
pub struct Engine {
    config: Config,
}

impl Engine {
    /// Create a new engine instance from a config file (or the defaults)
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        debug!("Loaded configuration: {:?}", config);
        Ok(Self { config })
    }

    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write a default configuration file
    pub async fn init(&self, path: Option<PathBuf>) -> Result<()> {
        let target_dir = match path {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };
        info!("Initializing Seqwright in: {}", target_dir.display());

        std::fs::create_dir_all(&target_dir)
            .with_context(|| format!("Failed to create {}", target_dir.display()))?;

        let config_file = target_dir.join("Seqwright.toml");
        if config_file.exists() {
            anyhow::bail!("{} already exists", config_file.display());
        }

        Config::default().save(&config_file)?;
        info!("✅ Wrote {}", config_file.display());
        Ok(())
    }

    /// Generate the selected diagrams (all of them when `diagrams` is empty)
    pub async fn generate(
        &self,
        ast: Vec<PathBuf>,
        output: Option<PathBuf>,
        diagrams: Vec<String>,
        formats: Vec<OutputFormat>,
    ) -> Result<Vec<PathBuf>> {
        let output_dir = output.unwrap_or_else(|| self.config.project.output_dir.clone());
        let formats = if formats.is_empty() { self.config.output.formats.clone() } else { formats };
        let selected = self.select_diagrams(&diagrams)?;

        info!("🔍 Loading AST dumps...");
        let index = Arc::new(self.load_ast(ast).await?);

        info!("🧭 Generating {} diagrams...", selected.len());
        let mut tasks = Vec::new();
        for name in &selected {
            let index = Arc::clone(&index);
            let name = name.clone();
            let diagram_config = self.config.diagrams[&name].clone();
            let root = self.config.project.root.clone();

            tasks.push(tokio::task::spawn_blocking(move || {
                SequenceDiagramGenerator::new(&index).generate(&name, &diagram_config, root.as_deref())
            }));
        }

        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

        let mut written = Vec::new();
        let mut failed = 0;
        for (name, task) in selected.iter().zip(tasks) {
            let result = task
                .await
                .map_err(|e| SeqwrightError::Diagram { name: name.clone(), reason: e.to_string() })
                .and_then(|generated| generated);

            match result {
                Ok(diagram) => match self.write_diagram(&diagram, &output_dir, &formats) {
                    Ok(files) => written.extend(files),
                    Err(e) => {
                        warn!("❌ Failed to write diagram {}: {}", name, e);
                        failed += 1;
                    }
                },
                Err(e) => {
                    warn!("❌ {}", e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            anyhow::bail!("{} of {} diagrams failed", failed, selected.len());
        }

        info!("✅ Wrote {} files to {}", written.len(), output_dir.display());
        Ok(written)
    }

    /// Print the configured diagrams and where they start
    pub async fn list(&self) -> Result<()> {
        if self.config.diagrams.is_empty() {
            println!("No diagrams configured");
            return Ok(());
        }

        for (name, diagram) in &self.config.diagrams {
            println!("{} ({:?})", name, diagram.mode);
            for entry in &diagram.start_from {
                println!("  start_from: {:?}", entry);
            }
            if let Some(to) = &diagram.to {
                println!("  to: {}", to);
            }
        }
        Ok(())
    }

    /// Resolve every diagram's entry points against the AST database
    pub async fn check(&self, ast: Vec<PathBuf>) -> Result<()> {
        self.config.validate()?;
        let index = self.load_ast(ast).await?;
        let detector = EntryPointDetector::new(&index);

        let mut problems = 0;
        for (name, diagram) in &self.config.diagrams {
            match detector.detect_for(diagram) {
                Ok(entries) => info!("✅ {}: {} entry points", name, entries.len()),
                Err(e) => {
                    warn!("❌ {}: {}", name, e);
                    problems += 1;
                }
            }
        }

        if problems > 0 {
            anyhow::bail!("{} diagrams have unresolvable entry points", problems);
        }
        Ok(())
    }

    fn select_diagrams(&self, requested: &[String]) -> Result<Vec<String>> {
        if requested.is_empty() {
            return Ok(self.config.diagrams.keys().cloned().collect());
        }

        for name in requested {
            if !self.config.diagrams.contains_key(name) {
                return Err(SeqwrightError::Config(format!("Unknown diagram: {}", name)).into());
            }
        }
        Ok(requested.to_vec())
    }

    async fn load_ast(&self, ast: Vec<PathBuf>) -> Result<AstIndex> {
        let paths = if ast.is_empty() { self.config.project.ast_paths.clone() } else { ast };
        if paths.is_empty() {
            anyhow::bail!("No AST paths given and none configured");
        }

        let index = AstLoader::new().load_paths(&paths).await?;
        if index.is_empty() {
            warn!("⚠️ No declarations found in {:?}", paths);
        }
        Ok(index)
    }

    fn write_diagram(&self, diagram: &SequenceDiagram, output_dir: &Path, formats: &[OutputFormat]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for format in formats {
            let renderer = renderer_for(*format);
            let content = renderer.render(diagram)?;
            let file = output_dir.join(format!("{}.{}", diagram.name, renderer.extension()));
            std::fs::write(&file, content)
                .with_context(|| format!("Failed to write {}", file.display()))?;
            debug!("Wrote {}", file.display());
            files.push(file);
        }
        Ok(files)
    }
}
