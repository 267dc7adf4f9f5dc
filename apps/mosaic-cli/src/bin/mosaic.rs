use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use tracing_subscriber::EnvFilter;

use mosaic_core::config::{Config, Settings};
use mosaic_core::corpus::{BeirDataset, Limited, TextDirCorpus};
use mosaic_core::traits::{CorpusSource, EmbeddingProvider};
use mosaic_core::types::{ArtifactKey, Backend, Query, RetrievalRequest};
use mosaic_embed::load_embedder;
use mosaic_retrieval::RetrievalEngine;
use mosaic_text::{LexicalIndexer, TantivyLexicalEngine};
use mosaic_vector::{ArtifactStatus, BuildOptions, DenseRetriever, IndexCacheManager};

const USAGE: &str = "Usage: mosaic <command> [options]

Commands:
  index  [--dataset DIR] [--limit N] [--force] [--skip-lexical]
  search <query> [--backend lexical|dense] [--limit K] [--dataset DIR] [--index-limit N]
  status [--dataset DIR] [--index-limit N] [--purge]
  sanity [--dataset DIR] [--index-limit N]

DIR is a BEIR dataset (corpus.jsonl, queries.jsonl, qrels/test.tsv) or a
directory of .txt files. --limit / --index-limit restrict the dense index to
the first N documents.";

const SNIPPET_CHARS: usize = 120;

#[derive(Debug, Default)]
struct Args {
    positional: Vec<String>,
    dataset: Option<PathBuf>,
    limit: Option<usize>,
    index_limit: Option<usize>,
    backend: Option<Backend>,
    force: bool,
    skip_lexical: bool,
    purge: bool,
}

fn parse_args(raw: &[String]) -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut i = 0;
    let value = |i: usize, flag: &str| raw.get(i + 1).cloned().ok_or_else(|| anyhow!("{flag} requires a value"));
    let number = |i: usize, flag: &str| -> anyhow::Result<usize> {
        value(i, flag)?.parse::<usize>().map_err(|_| anyhow!("{flag} requires a number"))
    };
    while i < raw.len() {
        match raw[i].as_str() {
            "--dataset" | "-d" => { args.dataset = Some(PathBuf::from(value(i, "--dataset")?)); i += 1; }
            "--limit" | "-k" => { args.limit = Some(number(i, "--limit")?); i += 1; }
            "--index-limit" => { args.index_limit = Some(number(i, "--index-limit")?); i += 1; }
            "--backend" | "-b" => { args.backend = Some(value(i, "--backend")?.parse()?); i += 1; }
            "--force" | "-f" => args.force = true,
            "--skip-lexical" | "-s" => args.skip_lexical = true,
            "--purge" => args.purge = true,
            flag if flag.starts_with('-') => bail!("unknown option {flag}\n\n{USAGE}"),
            other => args.positional.push(other.to_string()),
        }
        i += 1;
    }
    Ok(args)
}

/// A corpus plus, for BEIR datasets, its test queries.
enum Dataset {
    Beir(BeirDataset),
    Text(TextDirCorpus),
}

impl Dataset {
    fn open(dir: &Path) -> anyhow::Result<Self> {
        if dir.join("corpus.jsonl").exists() {
            Ok(Dataset::Beir(BeirDataset::load(dir)?))
        } else {
            Ok(Dataset::Text(TextDirCorpus::open(dir).with_context(|| format!("no BEIR dataset or .txt directory at {}", dir.display()))?))
        }
    }

    fn corpus(&self) -> &dyn CorpusSource {
        match self {
            Dataset::Beir(ds) => &ds.corpus,
            Dataset::Text(corpus) => corpus,
        }
    }

    fn first_query(&self) -> Option<&Query> {
        match self {
            Dataset::Beir(ds) => ds.first_query(),
            Dataset::Text(_) => None,
        }
    }
}

/// The corpus the dense index covers: all of it, or its first `limit` documents.
fn dense_corpus<'a>(dataset: &'a Dataset, limit: Option<usize>) -> Box<dyn CorpusSource + 'a> {
    match limit {
        Some(n) => Box::new(Limited::new(dataset.corpus(), n)),
        None => Box::new(dataset.corpus()),
    }
}

struct App {
    settings: Settings,
    args: Args,
}

impl App {
    fn dataset(&self) -> anyhow::Result<Dataset> {
        let dir = self.args.dataset.clone().unwrap_or_else(|| self.settings.dataset_dir());
        Dataset::open(&dir)
    }

    fn cache(&self) -> IndexCacheManager {
        IndexCacheManager::new(self.settings.dense_cache_dir(), self.settings.dense.metric).with_batch_size(self.settings.dense.batch_size)
    }

    fn index(&self) -> anyhow::Result<()> {
        let dataset = self.dataset()?;
        println!("📚 Corpus snapshot: {}", dataset.corpus().snapshot_id());

        if self.args.skip_lexical {
            println!("⚠️  Skipping lexical indexing (--skip-lexical)");
        } else {
            let dir = self.settings.lexical_index_dir();
            let count = LexicalIndexer::create(&dir)?.index_corpus(dataset.corpus())?;
            println!("📊 Indexed {} documents into Tantivy at {}", count, dir.display());
        }

        let embedder = load_embedder(&self.settings.dense)?;
        let corpus = dense_corpus(&dataset, self.args.limit);
        if let Some(n) = self.args.limit { println!("🔢 Limiting dense indexing to {} documents", n); }
        let options = BuildOptions { force: self.args.force, show_progress: true, ..BuildOptions::default() };
        let dir = self.cache().resolve_or_build_with(corpus.as_ref(), embedder.as_ref(), &options)?;
        println!("📦 Dense artifact: {}", dir.display());
        println!("\n✅ Indexing completed successfully!");
        println!("💡 To search, use: mosaic search '<query>'");
        Ok(())
    }

    /// Engine over whichever backends are built; a missing one only fails
    /// requests that name it.
    fn engine(&self, dataset: &Dataset, embedder: Arc<dyn EmbeddingProvider>) -> anyhow::Result<RetrievalEngine> {
        let mut engine = RetrievalEngine::new();
        match TantivyLexicalEngine::open(self.settings.lexical_index_dir()) {
            Ok(lexical) => engine = engine.with_lexical(Box::new(lexical)),
            Err(e) => tracing::warn!(error = %e, "lexical backend unavailable"),
        }
        let corpus = dense_corpus(dataset, self.args.index_limit);
        let key = ArtifactKey::new(corpus.snapshot_id(), embedder.model_version());
        match self.cache().resolve(&key) {
            Ok(dir) => engine = engine.with_dense(DenseRetriever::open(&dir, embedder)?),
            Err(e) => tracing::warn!(error = %e, "dense backend unavailable"),
        }
        Ok(engine)
    }

    fn search(&self) -> anyhow::Result<()> {
        let query = self.args.positional.join(" ");
        if query.trim().is_empty() { bail!("search needs a query\n\n{USAGE}"); }
        let dataset = self.dataset()?;
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(load_embedder(&self.settings.dense)?);
        let engine = self.engine(&dataset, embedder)?;
        let top_k = self.args.limit.unwrap_or(self.settings.search.default_top_k);
        let backends = match self.args.backend {
            Some(b) => vec![b],
            None => vec![Backend::Lexical, Backend::Dense],
        };
        println!("🔍 Query: {}", query);
        for backend in backends {
            print_results(&engine, &RetrievalRequest::new(query.clone(), backend, top_k))?;
        }
        Ok(())
    }

    fn status(&self) -> anyhow::Result<()> {
        let cache = self.cache();
        if self.args.purge {
            println!("🧹 Removed {} stale staging directories", cache.purge_staging()?);
        }
        match TantivyLexicalEngine::open(self.settings.lexical_index_dir()) {
            Ok(engine) => println!("📊 Lexical index: {} documents", engine.num_docs()),
            Err(e) => println!("⚠️  Lexical index: {}", e),
        }
        let dataset = self.dataset()?;
        let embedder = load_embedder(&self.settings.dense)?;
        let corpus = dense_corpus(&dataset, self.args.index_limit);
        let key = ArtifactKey::new(corpus.snapshot_id(), embedder.model_version());
        println!("🔑 Dense key: {}", key);
        match cache.status(&key) {
            ArtifactStatus::Valid(meta) => println!(
                "✅ Dense artifact: {} vectors × {} ({}, built {}) at {}",
                meta.vector_count,
                meta.dimension,
                meta.similarity_metric,
                meta.built_at,
                cache.artifact_dir(&key).display()
            ),
            ArtifactStatus::Missing => println!("⚠️  Dense artifact: not built (run `mosaic index`)"),
            ArtifactStatus::Invalid(reason) => println!("❌ Dense artifact invalid: {} (run `mosaic index --force`)", reason),
        }
        Ok(())
    }

    fn sanity(&self) -> anyhow::Result<()> {
        let dataset = self.dataset()?;
        let query = dataset.first_query().cloned().ok_or_else(|| anyhow!("sanity needs a BEIR dataset with test queries"))?;
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(load_embedder(&self.settings.dense)?);
        let engine = self.engine(&dataset, embedder)?;
        println!("❓ Query {}: {}", query.id, query.text);
        for backend in [Backend::Lexical, Backend::Dense] {
            print_results(&engine, &RetrievalRequest::new(query.text.clone(), backend, 3))?;
        }
        Ok(())
    }
}

fn print_results(engine: &RetrievalEngine, request: &RetrievalRequest) -> anyhow::Result<()> {
    let results = engine.retrieve(request)?;
    println!("\n== {} top-{} ({} results) ==", request.backend, request.top_k, results.len());
    for r in results {
        let text = engine.document_text(&r.document_id)?.unwrap_or_default();
        println!("  {}. score={:.4}  id={}", r.rank, r.score, r.document_id);
        if !text.is_empty() { println!("     📝 {}", snippet(&text)); }
    }
    Ok(())
}

/// Whitespace runs collapsed to one space, cut at `SNIPPET_CHARS` with `...`.
fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let raw: Vec<String> = env::args().skip(1).collect();
    let Some((cmd, rest)) = raw.split_first() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let app = App { settings: config.settings()?, args: parse_args(rest)? };
    match cmd.as_str() {
        "index" => app.index(),
        "search" => app.search(),
        "status" => app.status(),
        "sanity" => app.sanity(),
        "help" | "--help" | "-h" => { println!("{USAGE}"); Ok(()) }
        other => { eprintln!("Unknown command: {}\n\n{USAGE}", other); std::process::exit(1); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_collapses_whitespace() {
        assert_eq!(snippet("  Cats\n\tare   mammals \r\n"), "Cats are mammals");
    }

    #[test]
    fn snippet_marks_truncation() {
        let long = "é".repeat(SNIPPET_CHARS + 5);
        let cut = snippet(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), SNIPPET_CHARS + 3);
        assert_eq!(snippet(&"a".repeat(SNIPPET_CHARS)), "a".repeat(SNIPPET_CHARS));
    }
}
