//! Embedding providers: an offline hashed-trigram embedder and BGE-M3 on candle.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

use mosaic_core::config::{expand_path, DenseSettings};
use mosaic_core::traits::EmbeddingProvider;

mod device;
mod hash;
mod model;
mod pool;
mod tokenize;

pub use hash::HashEmbedder;
pub use model::BgeM3Embedder;
pub use pool::masked_mean_l2;

/// True when `APP_USE_FAKE_EMBEDDINGS` is `1` or `true`.
pub fn fake_embeddings_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Provider named by `dense.model`; `hash` (or `APP_USE_FAKE_EMBEDDINGS=1`) selects [`HashEmbedder`].
pub fn load_embedder(settings: &DenseSettings) -> Result<Box<dyn EmbeddingProvider>> {
    if fake_embeddings_requested() || settings.model.eq_ignore_ascii_case("hash") {
        tracing::info!(dim = settings.dimension, "using hash embedder");
        return Ok(Box::new(HashEmbedder::new(settings.dimension)));
    }
    let dir = resolve_model_dir(settings)?;
    Ok(Box::new(BgeM3Embedder::load(&dir, settings.max_len)?))
}

fn resolve_model_dir(settings: &DenseSettings) -> Result<PathBuf> {
    let mut candidates: Vec<(&str, PathBuf)> = Vec::new();
    if let Some(dir) = &settings.model_dir { candidates.push(("dense.model_dir", expand_path(dir))); }
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") { candidates.push(("APP_MODEL_DIR", PathBuf::from(dir))); }
    if let Ok(dir) = std::env::var("MODEL_DIR") { candidates.push(("MODEL_DIR", PathBuf::from(dir))); }
    candidates.push(("default", Path::new("models").join(&settings.model)));

    for (source, path) in &candidates {
        if path.exists() {
            tracing::info!(source = *source, dir = %path.display(), "using model dir");
            return Ok(path.clone());
        }
    }
    Err(anyhow!(
        "Could not locate model directory for '{}' (tried {}); set dense.model_dir or APP_MODEL_DIR, or use dense.model = \"hash\"",
        settings.model,
        candidates.iter().map(|(_, p)| p.display().to_string()).collect::<Vec<_>>().join(", ")
    ))
}
