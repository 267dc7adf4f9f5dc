use crate::error::Result;
use crate::types::{Document, SearchHit};

/// Text → fixed-length vector, deterministic for one `model_version`.
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier of the model and its version; part of the artifact key.
    fn model_version(&self) -> &str;
    fn dim(&self) -> usize;
    /// Output order matches input order.
    fn embed_many(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_many(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Query-and-score contract of an external full-text engine.
pub trait LexicalEngine: Send + Sync {
    /// Up to `top_k` hits, already ranked by the engine.
    fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>>;

    /// `title\ntext` for a stored document, if the engine keeps one.
    fn document_text(&self, _id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

pub type DocumentIter<'a> = Box<dyn Iterator<Item = Result<Document>> + 'a>;

/// A finite, restartable document sequence.
///
/// Every call to `documents` must yield the same documents in the same order
/// for the same `snapshot_id`.
pub trait CorpusSource: Send + Sync {
    fn snapshot_id(&self) -> &str;
    fn documents(&self) -> Result<DocumentIter<'_>>;
}
