//! Domain types shared by the lexical and dense backends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub type DocId = String;

/// A corpus document.
///
/// - `id`: stable identity, unique within a corpus snapshot
/// - `title`: optional heading (BEIR corpora carry one, plain text corpora don't)
/// - `text`: the document body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    #[serde(default)]
    pub title: String,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), title: String::new(), text: text.into() }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Text handed to both the embedder and the lexical analyzer.
    ///
    /// `title\ntext` when both are present, otherwise whichever is non-empty.
    pub fn contents(&self) -> String {
        let title = self.title.trim();
        let text = self.text.trim();
        match (title.is_empty(), text.is_empty()) {
            (false, false) => format!("{title}\n{text}"),
            (false, true) => title.to_string(),
            _ => text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub text: String,
}

impl Query {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

/// Which retrieval backend serves a request.
///
/// Closed on purpose: combining backends belongs to callers issuing one
/// request per backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Lexical,
    Dense,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Lexical => f.write_str("lexical"),
            Backend::Dense => f.write_str("dense"),
        }
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lexical" | "bm25" | "sparse" => Ok(Backend::Lexical),
            "dense" | "vector" => Ok(Backend::Dense),
            other => Err(Error::InvalidRequest(format!("unknown backend '{other}' (expected lexical or dense)"))),
        }
    }
}

/// Similarity metric of a dense artifact.
///
/// Both are served by an inner-product scan; `Cosine` stores unit-length
/// vectors and normalizes queries the same way.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    InnerProduct,
}

impl SimilarityMetric {
    pub fn normalizes(self) -> bool {
        matches!(self, SimilarityMetric::Cosine)
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Cosine => f.write_str("cosine"),
            SimilarityMetric::InnerProduct => f.write_str("inner_product"),
        }
    }
}

/// Raw backend output: a document id and an engine-specific score where
/// higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: DocId,
    pub score: f32,
    pub source: Backend,
}

/// One ranked entry of a retrieval response. `rank` starts at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub document_id: DocId,
    pub score: f32,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query_text: String,
    pub backend: Backend,
    pub top_k: usize,
}

impl RetrievalRequest {
    pub fn new(query_text: impl Into<String>, backend: Backend, top_k: usize) -> Self {
        Self { query_text: query_text.into(), backend, top_k }
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::InvalidRequest("top_k must be at least 1".into()));
        }
        if self.query_text.trim().is_empty() {
            return Err(Error::InvalidRequest("query_text must not be empty".into()));
        }
        Ok(())
    }
}

/// Cache key of a dense artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub corpus_snapshot_id: String,
    pub model_version: String,
}

impl ArtifactKey {
    pub fn new(corpus_snapshot_id: impl Into<String>, model_version: impl Into<String>) -> Self {
        Self { corpus_snapshot_id: corpus_snapshot_id.into(), model_version: model_version.into() }
    }

    /// Filesystem-safe directory name, `<snapshot>__<model>__<hash8>`.
    ///
    /// Sanitizing can map distinct keys onto the same text, so the suffix is
    /// taken from the unsanitized key.
    pub fn dir_name(&self) -> String {
        let raw = format!("{}\u{0}{}", self.corpus_snapshot_id, self.model_version);
        let digest = blake3::hash(raw.as_bytes()).to_hex();
        format!(
            "{}__{}__{}",
            sanitize(&self.corpus_snapshot_id),
            sanitize(&self.model_version),
            &digest.as_str()[..8]
        )
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.corpus_snapshot_id, self.model_version)
    }
}

fn sanitize(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .take(64)
        .collect();
    if cleaned.is_empty() { "_".to_string() } else { cleaned }
}
