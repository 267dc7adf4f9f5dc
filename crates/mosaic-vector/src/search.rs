use std::path::Path;
use std::sync::Arc;

use mosaic_core::error::{Error, Result};
use mosaic_core::traits::EmbeddingProvider;
use mosaic_core::types::{Backend, SearchHit};

use crate::artifact::{ArtifactMeta, DenseIndexArtifact};
use crate::flat::l2_normalize;

/// Exhaustive similarity search over a loaded artifact.
pub struct DenseRetriever {
    artifact: DenseIndexArtifact,
    provider: Arc<dyn EmbeddingProvider>,
}

impl DenseRetriever {
    /// Load the artifact in `dir`; the provider must be the one it was built with.
    pub fn open(dir: &Path, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let artifact = DenseIndexArtifact::load(dir)?;
        Self::from_artifact(artifact, provider)
    }

    pub fn from_artifact(artifact: DenseIndexArtifact, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if artifact.meta.model_version != provider.model_version() {
            return Err(Error::InvalidConfig(format!(
                "artifact was built with model '{}' but the configured provider is '{}'",
                artifact.meta.model_version,
                provider.model_version()
            )));
        }
        if artifact.meta.dimension != provider.dim() {
            return Err(Error::InvalidConfig(format!(
                "artifact dimension {} does not match provider dimension {}",
                artifact.meta.dimension,
                provider.dim()
            )));
        }
        tracing::debug!(vectors = artifact.len(), model = %artifact.meta.model_version, "dense retriever ready");
        Ok(Self { artifact, provider })
    }

    pub fn meta(&self) -> &ArtifactMeta { &self.artifact.meta }
    pub fn len(&self) -> usize { self.artifact.len() }
    pub fn is_empty(&self) -> bool { self.artifact.is_empty() }

    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.provider.embed(query).map_err(|e| Error::EmbeddingProvider(format!("query embedding failed: {e:#}")))?;
        if vector.len() != self.artifact.meta.dimension {
            return Err(Error::EmbeddingProvider(format!(
                "query embedded with dimension {}, artifact has {}",
                vector.len(),
                self.artifact.meta.dimension
            )));
        }
        self.search_vector(vector, top_k)
    }

    /// Search with an already embedded query; normalization recorded in the
    /// artifact is applied here.
    pub fn search_vector(&self, mut vector: Vec<f32>, top_k: usize) -> Result<Vec<SearchHit>> {
        if self.artifact.meta.normalized {
            l2_normalize(&mut vector);
        }
        self.artifact
            .index
            .search(&vector, top_k)?
            .into_iter()
            .map(|(pos, score)| {
                let id = self
                    .artifact
                    .id_at(pos)
                    .ok_or_else(|| Error::IndexConsistency(format!("vector position {pos} has no id mapping")))?;
                Ok(SearchHit { id: id.to_string(), score, source: Backend::Dense })
            })
            .collect()
    }
}
