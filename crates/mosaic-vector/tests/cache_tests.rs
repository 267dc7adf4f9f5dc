mod common;

use std::fs;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;

use mosaic_core::corpus::JsonlCorpus;
use mosaic_core::error::Error;
use mosaic_core::traits::{CorpusSource, EmbeddingProvider};
use mosaic_core::types::{ArtifactKey, SimilarityMetric};
use mosaic_embed::HashEmbedder;
use mosaic_vector::{ArtifactStatus, BuildOptions, CancelToken, IndexCacheManager};

use common::{numbered_corpus, pets_corpus, FailingEmbedder, SlowEmbedder};

fn key_of(corpus: &dyn CorpusSource, provider: &dyn EmbeddingProvider) -> ArtifactKey {
    ArtifactKey::new(corpus.snapshot_id(), provider.model_version())
}

fn entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir).unwrap().map(|e| e.unwrap().file_name().to_string_lossy().to_string()).collect();
    names.sort();
    names
}

#[test]
fn second_call_reuses_the_artifact() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCacheManager::new(tmp.path(), SimilarityMetric::Cosine);
    let corpus = pets_corpus();
    let embedder = HashEmbedder::new(32);

    let first = cache.resolve_or_build(&corpus, &embedder).unwrap();
    let second = cache.resolve_or_build(&corpus, &embedder).unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.build_count(), 1);
    assert!(matches!(cache.status(&key_of(&corpus, &embedder)), ArtifactStatus::Valid(meta) if meta.vector_count == 3));
    assert_eq!(entries(tmp.path()).len(), 1, "no staging directories remain");
}

#[test]
fn model_change_builds_a_new_artifact() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCacheManager::new(tmp.path(), SimilarityMetric::Cosine);
    let corpus = pets_corpus();

    let a = cache.resolve_or_build(&corpus, &HashEmbedder::new(32)).unwrap();
    let b = cache.resolve_or_build(&corpus, &HashEmbedder::new(64)).unwrap();
    assert_ne!(a, b);
    assert_eq!(cache.build_count(), 2);
    assert!(matches!(cache.status(&key_of(&corpus, &HashEmbedder::new(32))), ArtifactStatus::Valid(_)));
    assert!(matches!(cache.status(&key_of(&corpus, &HashEmbedder::new(64))), ArtifactStatus::Valid(_)));
}

#[test]
fn failed_build_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCacheManager::new(tmp.path(), SimilarityMetric::Cosine).with_batch_size(2);
    let corpus = numbered_corpus("ten", 10);
    let failing = FailingEmbedder::new(16, 5);

    let err = cache.resolve_or_build(&corpus, &failing).unwrap_err();
    assert!(matches!(err, Error::EmbeddingProvider(_)), "{err:?}");
    let key = key_of(&corpus, &failing);
    assert_eq!(cache.status(&key), ArtifactStatus::Missing);
    assert!(matches!(cache.resolve(&key), Err(Error::NotBuilt(_))));
    assert!(entries(tmp.path()).is_empty(), "staging directory was cleaned up: {:?}", entries(tmp.path()));
}

#[test]
fn concurrent_callers_share_one_build() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCacheManager::new(tmp.path(), SimilarityMetric::Cosine);
    let corpus = pets_corpus();
    let embedder = SlowEmbedder::new(32, Duration::from_millis(100));

    let paths: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4).map(|_| s.spawn(|| cache.resolve_or_build(&corpus, &embedder))).collect();
        handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
    });
    assert!(paths.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(cache.build_count(), 1);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn truncated_id_table_is_detected_and_rebuilt() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCacheManager::new(tmp.path(), SimilarityMetric::Cosine);
    let corpus = pets_corpus();
    let embedder = HashEmbedder::new(32);
    let dir = cache.resolve_or_build(&corpus, &embedder).unwrap();

    fs::write(dir.join("ids.txt"), "d1\nd2\n").unwrap();
    let key = key_of(&corpus, &embedder);
    assert!(matches!(cache.status(&key), ArtifactStatus::Invalid(reason) if reason.contains("ids.txt")));
    assert!(matches!(cache.resolve(&key), Err(Error::CacheCorruption { .. })));

    let rebuilt = cache.resolve_or_build(&corpus, &embedder).unwrap();
    assert_eq!(rebuilt, dir);
    assert_eq!(cache.build_count(), 2);
    assert!(matches!(cache.status(&key), ArtifactStatus::Valid(_)));
    assert_eq!(fs::read_to_string(dir.join("ids.txt")).unwrap(), "d1\nd2\nd3\n");
    assert_eq!(entries(tmp.path()).len(), 1, "retired artifact was removed");
}

#[test]
fn truncated_vector_file_is_detected() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCacheManager::new(tmp.path(), SimilarityMetric::Cosine);
    let corpus = pets_corpus();
    let embedder = HashEmbedder::new(32);
    let dir = cache.resolve_or_build(&corpus, &embedder).unwrap();

    let bytes = fs::read(dir.join("vectors.bin")).unwrap();
    fs::write(dir.join("vectors.bin"), &bytes[..bytes.len() - 4]).unwrap();
    assert!(matches!(cache.status(&key_of(&corpus, &embedder)), ArtifactStatus::Invalid(_)));
}

#[test]
fn metric_mismatch_is_invalid() {
    let tmp = TempDir::new().unwrap();
    let corpus = pets_corpus();
    let embedder = HashEmbedder::new(32);
    IndexCacheManager::new(tmp.path(), SimilarityMetric::Cosine).resolve_or_build(&corpus, &embedder).unwrap();

    let ip = IndexCacheManager::new(tmp.path(), SimilarityMetric::InnerProduct);
    assert!(matches!(ip.status(&key_of(&corpus, &embedder)), ArtifactStatus::Invalid(reason) if reason.contains("metric")));
}

#[test]
fn failed_forced_rebuild_keeps_prior_artifact() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCacheManager::new(tmp.path(), SimilarityMetric::Cosine);
    let corpus = numbered_corpus("ten", 10);
    let good = HashEmbedder::new(16);
    cache.resolve_or_build(&corpus, &good).unwrap();
    let key = key_of(&corpus, &good);
    let ArtifactStatus::Valid(before) = cache.status(&key) else { panic!("expected a valid artifact") };

    // same model version, so the forced build targets the same key
    let failing = FailingEmbedder::new(16, 5);
    let options = BuildOptions { force: true, ..BuildOptions::default() };
    assert!(cache.resolve_or_build_with(&corpus, &failing, &options).is_err());
    assert_eq!(cache.status(&key), ArtifactStatus::Valid(before));
    assert_eq!(entries(tmp.path()).len(), 1);
}

#[test]
fn forced_rebuild_replaces_valid_artifact() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCacheManager::new(tmp.path(), SimilarityMetric::Cosine);
    let corpus = pets_corpus();
    let embedder = HashEmbedder::new(16);
    cache.resolve_or_build(&corpus, &embedder).unwrap();
    let options = BuildOptions { force: true, ..BuildOptions::default() };
    cache.resolve_or_build_with(&corpus, &embedder, &options).unwrap();
    assert_eq!(cache.build_count(), 2);
    assert!(matches!(cache.status(&key_of(&corpus, &embedder)), ArtifactStatus::Valid(_)));
}

#[test]
fn unreadable_corpus_with_corrupt_artifact_is_cache_corruption() {
    let tmp = TempDir::new().unwrap();
    let corpus_path = tmp.path().join("corpus.jsonl");
    fs::write(&corpus_path, "{\"_id\": \"d1\", \"text\": \"cats are mammals\"}\n{\"_id\": \"d2\", \"text\": \"dogs\"}\n").unwrap();
    let corpus = JsonlCorpus::open(&corpus_path).unwrap();
    let cache = IndexCacheManager::new(tmp.path().join("cache"), SimilarityMetric::Cosine);
    let embedder = HashEmbedder::new(16);
    let dir = cache.resolve_or_build(&corpus, &embedder).unwrap();

    fs::write(dir.join("ids.txt"), "d1\n").unwrap();
    fs::remove_file(&corpus_path).unwrap();
    match cache.resolve_or_build(&corpus, &embedder) {
        Err(Error::CacheCorruption { path, .. }) => assert_eq!(path, dir),
        other => panic!("expected CacheCorruption, got {other:?}"),
    }
}

#[test]
fn cancelled_build_publishes_nothing() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCacheManager::new(tmp.path(), SimilarityMetric::Cosine);
    let corpus = pets_corpus();
    let embedder = HashEmbedder::new(16);
    let token = CancelToken::new();
    token.cancel();
    let options = BuildOptions { cancel: Some(token), ..BuildOptions::default() };
    assert!(matches!(cache.resolve_or_build_with(&corpus, &embedder, &options), Err(Error::Cancelled)));
    assert_eq!(cache.status(&key_of(&corpus, &embedder)), ArtifactStatus::Missing);
}

#[test]
fn purge_removes_leftover_staging() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join(".staging-crashed/x")).unwrap();
    fs::create_dir_all(tmp.path().join("keep")).unwrap();
    let cache = IndexCacheManager::new(tmp.path(), SimilarityMetric::Cosine);
    assert_eq!(cache.purge_staging().unwrap(), 1);
    assert_eq!(entries(tmp.path()), vec!["keep".to_string()]);
    assert_eq!(IndexCacheManager::new(tmp.path().join("absent"), SimilarityMetric::Cosine).purge_staging().unwrap(), 0);
}

#[test]
fn purge_restores_artifact_left_between_publish_renames() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCacheManager::new(tmp.path(), SimilarityMetric::Cosine);
    let corpus = pets_corpus();
    let embedder = HashEmbedder::new(16);
    let dir = cache.resolve_or_build(&corpus, &embedder).unwrap();
    let key = key_of(&corpus, &embedder);

    // crash after the old artifact was moved aside, before the new one landed
    fs::create_dir_all(tmp.path().join(".retired-crashed")).unwrap();
    fs::rename(&dir, tmp.path().join(".retired-crashed/artifact")).unwrap();
    assert_eq!(cache.status(&key), ArtifactStatus::Missing);

    assert_eq!(cache.purge_staging().unwrap(), 1);
    assert!(matches!(cache.status(&key), ArtifactStatus::Valid(_)));
    assert_eq!(entries(tmp.path()), vec![key.dir_name()]);
}
