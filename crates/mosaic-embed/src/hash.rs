use std::hash::Hasher;
use twox_hash::XxHash64;

use mosaic_core::traits::EmbeddingProvider;

/// Offline embedder: hashed character trigrams of each lowercased word
/// (padded with `#`), counted into `dim` buckets and L2-normalized.
///
/// Needs no model files, so tests and CI can build dense indexes. Words that
/// share stems share most trigrams, which keeps related texts close.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    version: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, version: format!("hash-trigram-v1-d{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let chars: Vec<char> = std::iter::once('#').chain(word.to_lowercase().chars()).chain(std::iter::once('#')).collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                let mut hasher = XxHash64::with_seed(0);
                hasher.write(gram.as_bytes());
                v[(hasher.finish() % self.dim as u64) as usize] += 1.0;
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v { *x /= norm; }
        }
        v
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn model_version(&self) -> &str { &self.version }
    fn dim(&self) -> usize { self.dim }

    fn embed_many(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
