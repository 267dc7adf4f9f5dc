use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Embedding provider failed: {0}")]
    EmbeddingProvider(String),

    #[error("Corpus snapshot '{0}' contains no documents")]
    EmptyCorpus(String),

    #[error("Dense artifact at {} is corrupt ({reason}); rerun the build with --force to replace it", path.display())]
    CacheCorruption { path: PathBuf, reason: String },

    #[error("Index consistency violated: {0}")]
    IndexConsistency(String),

    #[error("Lexical backend unavailable: {0}")]
    ExternalBackend(String),

    #[error("No dense artifact built for {0}; run `mosaic index` first")]
    NotBuilt(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Build cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
