//! Content-addressed cache of dense artifacts keyed by
//! `(corpus_snapshot_id, model_version)`.
//!
//! Builds run in a `.staging-*` directory under the cache root and are
//! published with one directory rename, so an artifact directory is either
//! absent or complete. Replacing an existing artifact first moves it into a
//! `.retired-*` directory; if the process dies between the two renames,
//! `purge_staging` moves it back. Concurrent callers for the same key serialize on a
//! per-key lock and the losers reuse the winner's artifact.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use mosaic_core::error::{Error, Result};
use mosaic_core::traits::{CorpusSource, EmbeddingProvider};
use mosaic_core::types::{ArtifactKey, SimilarityMetric};

use crate::artifact::{read_vector_header, ArtifactMeta, HEADER_LEN, IDS_FILE, META_FILE, VECTORS_FILE};
use crate::index_build::{CancelToken, DenseIndexBuilder, DEFAULT_BATCH_SIZE};

const STAGING_PREFIX: &str = ".staging-";
const RETIRED_PREFIX: &str = ".retired-";
const RETIRED_ARTIFACT: &str = "artifact";

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactStatus {
    Missing,
    Valid(ArtifactMeta),
    /// Present but failing validation; the reason is human readable.
    Invalid(String),
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Rebuild even when a valid artifact exists.
    pub force: bool,
    pub cancel: Option<CancelToken>,
    pub show_progress: bool,
}

pub struct IndexCacheManager {
    root: PathBuf,
    metric: SimilarityMetric,
    batch_size: usize,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    builds: AtomicUsize,
}

impl IndexCacheManager {
    pub fn new(root: impl Into<PathBuf>, metric: SimilarityMetric) -> Self {
        Self { root: root.into(), metric, batch_size: DEFAULT_BATCH_SIZE, locks: Mutex::new(HashMap::new()), builds: AtomicUsize::new(0) }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn root(&self) -> &Path { &self.root }
    pub fn metric(&self) -> SimilarityMetric { self.metric }

    /// Builds started by this manager, successful or not.
    pub fn build_count(&self) -> usize { self.builds.load(Ordering::SeqCst) }

    pub fn artifact_dir(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.dir_name())
    }

    pub fn status(&self, key: &ArtifactKey) -> ArtifactStatus {
        let dir = self.artifact_dir(key);
        if !dir.exists() {
            return ArtifactStatus::Missing;
        }
        match self.check(&dir, key) {
            Ok(meta) => ArtifactStatus::Valid(meta),
            Err(reason) => ArtifactStatus::Invalid(reason),
        }
    }

    fn check(&self, dir: &Path, key: &ArtifactKey) -> std::result::Result<ArtifactMeta, String> {
        let meta = ArtifactMeta::read(dir).map_err(|e| format!("unreadable {META_FILE}: {e}"))?;
        if meta.key() != *key {
            return Err(format!("metadata is for {}, expected {key}", meta.key()));
        }
        if meta.similarity_metric != self.metric {
            return Err(format!("built for metric {}, configured metric is {}", meta.similarity_metric, self.metric));
        }
        let ids = fs::read_to_string(dir.join(IDS_FILE)).map_err(|e| format!("unreadable {IDS_FILE}: {e}"))?;
        let id_count = ids.lines().count();
        if id_count != meta.vector_count {
            return Err(format!("{IDS_FILE} has {id_count} entries, metadata declares {}", meta.vector_count));
        }
        let header = read_vector_header(dir).map_err(|e| format!("unreadable {VECTORS_FILE} header: {e}"))?;
        if header.count != meta.vector_count || header.dimension != meta.dimension {
            return Err(format!(
                "{VECTORS_FILE} holds {}×{}, metadata declares {}×{}",
                header.count, header.dimension, meta.vector_count, meta.dimension
            ));
        }
        let len = fs::metadata(dir.join(VECTORS_FILE)).map_err(|e| e.to_string())?.len();
        if len != HEADER_LEN + header.data_len() {
            return Err(format!("{VECTORS_FILE} is {len} bytes, expected {}", HEADER_LEN + header.data_len()));
        }
        Ok(meta)
    }

    /// Location of a valid artifact, never building.
    pub fn resolve(&self, key: &ArtifactKey) -> Result<PathBuf> {
        match self.status(key) {
            ArtifactStatus::Valid(_) => Ok(self.artifact_dir(key)),
            ArtifactStatus::Missing => Err(Error::NotBuilt(key.to_string())),
            ArtifactStatus::Invalid(reason) => Err(Error::CacheCorruption { path: self.artifact_dir(key), reason }),
        }
    }

    pub fn resolve_or_build(&self, corpus: &dyn CorpusSource, provider: &dyn EmbeddingProvider) -> Result<PathBuf> {
        self.resolve_or_build_with(corpus, provider, &BuildOptions::default())
    }

    pub fn resolve_or_build_with(
        &self,
        corpus: &dyn CorpusSource,
        provider: &dyn EmbeddingProvider,
        options: &BuildOptions,
    ) -> Result<PathBuf> {
        let key = ArtifactKey::new(corpus.snapshot_id(), provider.model_version());
        let dir = self.artifact_dir(&key);
        let lock = self.key_lock(&key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let prior = self.status(&key);
        match &prior {
            ArtifactStatus::Valid(meta) if !options.force => {
                tracing::info!(%key, vectors = meta.vector_count, "dense cache hit");
                return Ok(dir);
            }
            ArtifactStatus::Valid(_) => tracing::info!(%key, "forced rebuild over valid artifact"),
            ArtifactStatus::Invalid(reason) => tracing::warn!(%key, %reason, "replacing invalid dense artifact"),
            ArtifactStatus::Missing => tracing::info!(%key, "dense cache miss"),
        }

        fs::create_dir_all(&self.root)?;
        let staging = tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir_in(&self.root)?;
        let mut builder = DenseIndexBuilder::new(provider, self.metric)
            .batch_size(self.batch_size)
            .show_progress(options.show_progress);
        if let Some(token) = &options.cancel {
            builder = builder.cancel_token(token.clone());
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        let artifact = match builder.build(corpus) {
            Ok(artifact) => artifact,
            Err(e) => {
                return Err(match (prior, e) {
                    (ArtifactStatus::Invalid(reason), Error::Corpus(msg)) => Error::CacheCorruption {
                        path: dir,
                        reason: format!("{reason}; rebuilding failed because the corpus is unreadable: {msg}"),
                    },
                    (ArtifactStatus::Invalid(reason), Error::Io(io)) => Error::CacheCorruption {
                        path: dir,
                        reason: format!("{reason}; rebuilding failed because the corpus is unreadable: {io}"),
                    },
                    (_, e) => e,
                });
            }
        };
        artifact.persist(staging.path())?;
        publish(&self.root, staging.path(), &dir)?;
        tracing::info!(%key, dir = %dir.display(), vectors = artifact.len(), "published dense artifact");
        Ok(dir)
    }

    /// Remove staging and retired directories left behind by crashed
    /// processes. A retired artifact whose slot is empty (crash between the
    /// two renames of `publish`) is moved back first. Only call while no build
    /// is running against this root.
    pub fn purge_staging(&self) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if (name.starts_with(STAGING_PREFIX) || name.starts_with(RETIRED_PREFIX)) && entry.file_type()?.is_dir() {
                if name.starts_with(RETIRED_PREFIX) {
                    self.restore_retired(&entry.path())?;
                }
                fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        if removed > 0 { tracing::info!(removed, root = %self.root.display(), "purged stale staging directories"); }
        Ok(removed)
    }

    fn restore_retired(&self, retired: &Path) -> Result<()> {
        let old = retired.join(RETIRED_ARTIFACT);
        let Ok(meta) = ArtifactMeta::read(&old) else { return Ok(()) };
        let target = self.artifact_dir(&meta.key());
        if !target.exists() {
            fs::rename(&old, &target)?;
            tracing::warn!(key = %meta.key(), dir = %target.display(), "restored artifact orphaned by an interrupted publish");
        }
        Ok(())
    }

    fn key_lock(&self, key: &ArtifactKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.dir_name()).or_default().clone()
    }
}

/// Swap `staged` into `target`. An existing target is first moved aside into
/// a retired directory and restored if the final rename fails.
fn publish(root: &Path, staged: &Path, target: &Path) -> Result<()> {
    if !target.exists() {
        fs::rename(staged, target)?;
        return Ok(());
    }
    let retired = tempfile::Builder::new().prefix(RETIRED_PREFIX).tempdir_in(root)?;
    let old = retired.path().join(RETIRED_ARTIFACT);
    fs::rename(target, &old)?;
    if let Err(e) = fs::rename(staged, target) {
        if let Err(restore) = fs::rename(&old, target) {
            tracing::error!(error = %restore, target = %target.display(), "could not restore previous artifact");
        }
        return Err(e.into());
    }
    Ok(())
}
