//! Single entry point over the lexical and dense backends.
//!
//! A request names exactly one backend. Raw backend scores are passed
//! through untouched; results are only deduplicated, ordered and ranked.

use std::collections::HashSet;
use std::time::Instant;

use mosaic_core::error::{Error, Result};
use mosaic_core::traits::LexicalEngine;
use mosaic_core::types::{Backend, RetrievalRequest, ScoredResult, SearchHit};
use mosaic_vector::DenseRetriever;

#[derive(Default)]
pub struct RetrievalEngine {
    lexical: Option<Box<dyn LexicalEngine>>,
    dense: Option<DenseRetriever>,
}

impl RetrievalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lexical(mut self, engine: Box<dyn LexicalEngine>) -> Self {
        self.lexical = Some(engine);
        self
    }

    pub fn with_dense(mut self, retriever: DenseRetriever) -> Self {
        self.dense = Some(retriever);
        self
    }

    pub fn has_backend(&self, backend: Backend) -> bool {
        match backend {
            Backend::Lexical => self.lexical.is_some(),
            Backend::Dense => self.dense.is_some(),
        }
    }

    pub fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<ScoredResult>> {
        request.validate()?;
        let start = Instant::now();
        let hits = match request.backend {
            Backend::Lexical => self
                .lexical
                .as_ref()
                .ok_or_else(|| Error::ExternalBackend("no lexical engine configured; build one with `mosaic index`".into()))?
                .search(&request.query_text, request.top_k)?,
            Backend::Dense => self
                .dense
                .as_ref()
                .ok_or_else(|| Error::NotBuilt("the dense backend".into()))?
                .search(&request.query_text, request.top_k)?,
        };
        let results = rank_hits(hits, request.top_k);
        tracing::debug!(
            backend = %request.backend,
            top_k = request.top_k,
            returned = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "retrieve"
        );
        Ok(results)
    }

    /// `title\ntext` of a stored document, looked up in the lexical engine.
    pub fn document_text(&self, id: &str) -> Result<Option<String>> {
        match &self.lexical {
            Some(engine) => engine.document_text(id),
            None => Ok(None),
        }
    }
}

/// Stable sort by descending score, keep each id's best entry, cut to
/// `top_k` and number ranks from 1.
pub fn rank_hits(mut hits: Vec<SearchHit>, top_k: usize) -> Vec<ScoredResult> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| seen.insert(hit.id.clone()))
        .take(top_k)
        .enumerate()
        .map(|(i, hit)| ScoredResult { document_id: hit.id, score: hit.score, rank: i + 1 })
        .collect()
}
