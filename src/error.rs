use thiserror::Error;

/// Main error type for Seqwright operations
#[derive(Error, Debug)]
pub enum SeqwrightError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed AST: {0}")]
    MalformedAst(String),

    #[error("Entry point not found: {0}")]
    EntryPointNotFound(String),

    #[error("Diagram '{name}' failed: {reason}")]
    Diagram { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid filter pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Render error: {0}")]
    Render(#[from] std::fmt::Error),
}

pub type Result<T> = std::result::Result<T, SeqwrightError>;
