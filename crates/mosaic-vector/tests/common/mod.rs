#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use mosaic_core::corpus::InMemoryCorpus;
use mosaic_core::traits::EmbeddingProvider;
use mosaic_embed::HashEmbedder;

pub fn pets_corpus() -> InMemoryCorpus {
    InMemoryCorpus::from_pairs("pets", [("d1", "cats are mammals"), ("d2", "dogs are mammals"), ("d3", "rockets reach orbit")])
}

pub fn numbered_corpus(snapshot: &str, n: usize) -> InMemoryCorpus {
    InMemoryCorpus::from_pairs(snapshot, (1..=n).map(|i| (format!("doc{i}"), format!("document number {i} about topic {}", i % 3))))
}

/// Exact vectors for known texts, hashed trigrams for everything else.
pub struct TableEmbedder {
    version: String,
    table: HashMap<String, Vec<f32>>,
    fallback: HashEmbedder,
}

impl TableEmbedder {
    pub fn new(dim: usize, entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            version: format!("table-d{dim}"),
            table: entries.iter().map(|(t, v)| (t.to_string(), v.clone())).collect(),
            fallback: HashEmbedder::new(dim),
        }
    }
}

impl EmbeddingProvider for TableEmbedder {
    fn model_version(&self) -> &str { &self.version }
    fn dim(&self) -> usize { self.fallback.dim() }
    fn embed_many(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.table.get(t).cloned().unwrap_or_else(|| self.fallback.embed_text(t))).collect())
    }
}

/// Fails once the `fail_at`-th document (1-based) reaches the provider.
pub struct FailingEmbedder {
    inner: HashEmbedder,
    fail_at: usize,
    seen: AtomicUsize,
}

impl FailingEmbedder {
    pub fn new(dim: usize, fail_at: usize) -> Self {
        Self { inner: HashEmbedder::new(dim), fail_at, seen: AtomicUsize::new(0) }
    }
}

impl EmbeddingProvider for FailingEmbedder {
    fn model_version(&self) -> &str { self.inner.model_version() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn embed_many(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let before = self.seen.fetch_add(texts.len(), Ordering::SeqCst);
        if before < self.fail_at && self.fail_at <= before + texts.len() {
            return Err(anyhow!("provider crashed on document {}", self.fail_at));
        }
        self.inner.embed_many(texts)
    }
}

/// Counts calls and sleeps in each one to widen race windows.
pub struct SlowEmbedder {
    inner: HashEmbedder,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl SlowEmbedder {
    pub fn new(dim: usize, delay: Duration) -> Self {
        Self { inner: HashEmbedder::new(dim), delay, calls: AtomicUsize::new(0) }
    }
}

impl EmbeddingProvider for SlowEmbedder {
    fn model_version(&self) -> &str { self.inner.model_version() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn embed_many(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.embed_many(texts)
    }
}

/// Returns vectors one element short.
pub struct ShortEmbedder(pub HashEmbedder);

impl EmbeddingProvider for ShortEmbedder {
    fn model_version(&self) -> &str { "short" }
    fn dim(&self) -> usize { self.0.dim() }
    fn embed_many(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| { let mut v = self.0.embed_text(t); v.pop(); v }).collect())
    }
}
