use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid root path: {}", .0.display())]
    InvalidRoot(PathBuf),

    #[error("Config file error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Enrichment error: {0}")]
    Enrichment(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Analysis cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ArchError>;
