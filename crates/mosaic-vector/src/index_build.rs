use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use mosaic_core::error::{Error, Result};
use mosaic_core::traits::{CorpusSource, EmbeddingProvider};
use mosaic_core::types::{ArtifactKey, DocId, SimilarityMetric};

use crate::artifact::DenseIndexArtifact;
use crate::flat::{l2_normalize, FlatIndex};

pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Shared flag checked between embedding batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self { Self::default() }
    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// Embeds a corpus snapshot into an in-memory [`DenseIndexArtifact`].
///
/// Documents are streamed in the source's order and embedded `batch_size` at
/// a time; vector `i` and id `i` always come from the same document.
pub struct DenseIndexBuilder<'a> {
    provider: &'a dyn EmbeddingProvider,
    metric: SimilarityMetric,
    batch_size: usize,
    cancel: Option<CancelToken>,
    show_progress: bool,
}

impl<'a> DenseIndexBuilder<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider, metric: SimilarityMetric) -> Self {
        Self { provider, metric, batch_size: DEFAULT_BATCH_SIZE, cancel: None, show_progress: true }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn build(&self, corpus: &dyn CorpusSource) -> Result<DenseIndexArtifact> {
        let key = ArtifactKey::new(corpus.snapshot_id(), self.provider.model_version());
        let start = Instant::now();
        tracing::info!(%key, metric = %self.metric, batch_size = self.batch_size, "building dense index");

        let pb = if self.show_progress { ProgressBar::new_spinner() } else { ProgressBar::hidden() };
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} documents embedded ({per_sec}) {msg}") {
            pb.set_style(style);
        }

        let mut batch = Batch { index: FlatIndex::new(self.provider.dim()), ids: Vec::new(), pending_ids: Vec::new(), pending_texts: Vec::new() };
        let mut seen: HashSet<DocId> = HashSet::new();
        for document in corpus.documents()? {
            self.check_cancelled()?;
            let document = document?;
            validate_id(&document.id, batch.ids.len() + batch.pending_ids.len())?;
            if !seen.insert(document.id.clone()) {
                return Err(Error::Corpus(format!("duplicate document id '{}' in snapshot {}", document.id, key.corpus_snapshot_id)));
            }
            batch.pending_texts.push(document.contents());
            batch.pending_ids.push(document.id);
            if batch.pending_ids.len() >= self.batch_size {
                self.check_cancelled()?;
                self.flush(&mut batch)?;
                pb.set_position(batch.ids.len() as u64);
            }
        }
        if !batch.pending_ids.is_empty() {
            self.check_cancelled()?;
            self.flush(&mut batch)?;
        }
        if batch.ids.is_empty() {
            pb.finish_and_clear();
            return Err(Error::EmptyCorpus(key.corpus_snapshot_id));
        }

        let artifact = DenseIndexArtifact::assemble(key, self.metric, batch.index, batch.ids)?;
        pb.finish_with_message("done");
        tracing::info!(
            vectors = artifact.len(),
            dimension = artifact.meta.dimension,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "dense index built"
        );
        Ok(artifact)
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => {
                tracing::info!("dense build cancelled");
                Err(Error::Cancelled)
            }
            _ => Ok(()),
        }
    }

    fn flush(&self, batch: &mut Batch) -> Result<()> {
        let first = batch.ids.len();
        let vectors = self
            .provider
            .embed_many(&batch.pending_texts)
            .map_err(|e| Error::EmbeddingProvider(format!("documents {}..{}: {e:#}", first, first + batch.pending_texts.len())))?;
        if vectors.len() != batch.pending_texts.len() {
            return Err(Error::EmbeddingProvider(format!(
                "asked for {} vectors, got {}",
                batch.pending_texts.len(),
                vectors.len()
            )));
        }
        let dim = batch.index.dim();
        for (offset, mut vector) in vectors.into_iter().enumerate() {
            if vector.len() != dim {
                return Err(Error::EmbeddingProvider(format!(
                    "document '{}' embedded with dimension {}, expected {dim}",
                    batch.pending_ids[offset],
                    vector.len()
                )));
            }
            if self.metric.normalizes() { l2_normalize(&mut vector); }
            batch.index.add(&vector)?;
        }
        batch.ids.append(&mut batch.pending_ids);
        batch.pending_texts.clear();
        tracing::debug!(embedded = batch.ids.len(), "embedded batch");
        Ok(())
    }
}

struct Batch {
    index: FlatIndex,
    ids: Vec<DocId>,
    pending_ids: Vec<DocId>,
    pending_texts: Vec<String>,
}

fn validate_id(id: &str, position: usize) -> Result<()> {
    if id.is_empty() {
        return Err(Error::Corpus(format!("document #{position} has an empty id")));
    }
    if id.contains(['\n', '\r']) {
        return Err(Error::Corpus(format!("document #{position} id {id:?} spans several lines")));
    }
    Ok(())
}
