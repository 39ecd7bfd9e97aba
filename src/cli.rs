use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use crate::config::OutputFormat;
use crate::core::Engine;

#[derive(Parser)]
#[command(name = "seqwright")]
#[command(about = "Sequence diagrams reconstructed from C/C++ syntax trees")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Generate sequence diagrams
    Generate {
        /// AST dump files or directories (overrides the configured ones)
        #[arg(short, long)]
        ast: Vec<PathBuf>,

        /// Output directory for diagrams
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only generate these diagrams
        #[arg(short, long)]
        diagram: Vec<String>,

        /// Output formats (overrides the configured ones)
        #[arg(short, long, value_enum)]
        format: Vec<OutputFormat>,
    },

    /// List configured diagrams
    List,

    /// Check that every diagram's entry points resolve
    Check {
        /// AST dump files or directories (overrides the configured ones)
        #[arg(short, long)]
        ast: Vec<PathBuf>,
    },
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path } => {
                engine.init(path).await
            }
            Commands::Generate { ast, output, diagram, format } => {
                engine.generate(ast, output, diagram, format).await.map(|_| ())
            }
            Commands::List => {
                engine.list().await
            }
            Commands::Check { ast } => {
                engine.check(ast).await
            }
        }
    }
}
