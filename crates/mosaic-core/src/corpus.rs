//! Corpus sources and BEIR dataset loading.
//!
//! Every source is restartable: `documents()` reopens its backing store and
//! yields the same order each time, which is what keeps a dense artifact's
//! position → id table meaningful across builds.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::traits::{CorpusSource, DocumentIter};
use crate::types::{Document, Query};

/// qid → doc id → relevance grade.
pub type Qrels = BTreeMap<String, BTreeMap<String, i32>>;

impl<C: CorpusSource + ?Sized> CorpusSource for Box<C> {
    fn snapshot_id(&self) -> &str { (**self).snapshot_id() }
    fn documents(&self) -> Result<DocumentIter<'_>> { (**self).documents() }
}

impl<C: CorpusSource + ?Sized> CorpusSource for &C {
    fn snapshot_id(&self) -> &str { (**self).snapshot_id() }
    fn documents(&self) -> Result<DocumentIter<'_>> { (**self).documents() }
}

#[derive(Debug, Clone)]
pub struct InMemoryCorpus {
    snapshot_id: String,
    docs: Vec<Document>,
}

impl InMemoryCorpus {
    pub fn new(snapshot_id: impl Into<String>, docs: Vec<Document>) -> Self {
        Self { snapshot_id: snapshot_id.into(), docs }
    }

    pub fn from_pairs<I, K, V>(snapshot_id: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(snapshot_id, pairs.into_iter().map(|(id, text)| Document::new(id, text)).collect())
    }

    pub fn len(&self) -> usize { self.docs.len() }
    pub fn is_empty(&self) -> bool { self.docs.is_empty() }
}

impl CorpusSource for InMemoryCorpus {
    fn snapshot_id(&self) -> &str { &self.snapshot_id }

    fn documents(&self) -> Result<DocumentIter<'_>> {
        Ok(Box::new(self.docs.iter().cloned().map(Ok)))
    }
}

/// BEIR `corpus.jsonl`: one `{"_id", "title", "text"}` object per line.
#[derive(Debug, Clone)]
pub struct JsonlCorpus {
    path: PathBuf,
    snapshot_id: String,
}

impl JsonlCorpus {
    /// The snapshot id is `<file stem>-<blake3 prefix>` so an edited file
    /// never reuses a stale artifact.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(|e| Error::Corpus(format!("cannot open {}: {e}", path.display())))?;
        let mut hasher = blake3::Hasher::new();
        std::io::copy(&mut file, &mut hasher)?;
        let digest = hasher.finalize().to_hex();
        let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "corpus".to_string());
        let snapshot_id = format!("{stem}-{}", &digest.as_str()[..16]);
        tracing::debug!(path = %path.display(), %snapshot_id, "opened jsonl corpus");
        Ok(Self { path, snapshot_id })
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl CorpusSource for JsonlCorpus {
    fn snapshot_id(&self) -> &str { &self.snapshot_id }

    fn documents(&self) -> Result<DocumentIter<'_>> {
        let file = File::open(&self.path)
            .map_err(|e| Error::Corpus(format!("corpus snapshot {} no longer readable at {}: {e}", self.snapshot_id, self.path.display())))?;
        let path = self.path.clone();
        let iter = BufReader::new(file).lines().enumerate().filter_map(move |(i, line)| match line {
            Err(e) => Some(Err(Error::Io(e))),
            Ok(l) if l.trim().is_empty() => None,
            Ok(l) => Some(parse_corpus_line(&l).map_err(|e| Error::Corpus(format!("{}:{}: {e}", path.display(), i + 1)))),
        });
        Ok(Box::new(iter))
    }
}

fn parse_corpus_line(line: &str) -> std::result::Result<Document, String> {
    let obj: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let id = first_field(&obj, &["_id", "id"]).ok_or_else(|| "missing '_id'".to_string())?;
    let title = first_field(&obj, &["title"]).unwrap_or_default();
    let text = first_field(&obj, &["text", "contents"]).unwrap_or_default();
    Ok(Document { id, title, text })
}

/// First present, non-empty field among `keys`, stringifying numbers.
fn first_field(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Every `*.txt` below a directory; ids are relative paths without extension.
#[derive(Debug, Clone)]
pub struct TextDirCorpus {
    root: PathBuf,
    files: Vec<(String, PathBuf)>,
    snapshot_id: String,
}

impl TextDirCorpus {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::Corpus(format!("{} is not a directory", root.display())));
        }
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
            .collect();
        paths.sort();
        let mut hasher = blake3::Hasher::new();
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let rel = path.strip_prefix(&root).unwrap_or(&path).with_extension("");
            let id = rel.to_string_lossy().replace('\\', "/");
            hasher.update(id.as_bytes());
            hasher.update(&[0]);
            hasher.update(&fs::read(&path)?);
            files.push((id, path));
        }
        let name = root.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "txt".to_string());
        let snapshot_id = format!("{name}-{}", &hasher.finalize().to_hex().as_str()[..16]);
        Ok(Self { root, files, snapshot_id })
    }

    pub fn root(&self) -> &Path { &self.root }
    pub fn len(&self) -> usize { self.files.len() }
    pub fn is_empty(&self) -> bool { self.files.is_empty() }
}

impl CorpusSource for TextDirCorpus {
    fn snapshot_id(&self) -> &str { &self.snapshot_id }

    fn documents(&self) -> Result<DocumentIter<'_>> {
        Ok(Box::new(self.files.iter().map(|(id, path)| {
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(_) => String::from_utf8_lossy(&fs::read(path)?).to_string(),
            };
            Ok(Document::new(id.clone(), content))
        })))
    }
}

/// The first `limit` documents of another source, under its own snapshot id.
pub struct Limited<C> {
    inner: C,
    limit: usize,
    snapshot_id: String,
}

impl<C: CorpusSource> Limited<C> {
    pub fn new(inner: C, limit: usize) -> Self {
        let snapshot_id = format!("{}-first{limit}", inner.snapshot_id());
        Self { inner, limit, snapshot_id }
    }
}

impl<C: CorpusSource> CorpusSource for Limited<C> {
    fn snapshot_id(&self) -> &str { &self.snapshot_id }

    fn documents(&self) -> Result<DocumentIter<'_>> {
        Ok(Box::new(self.inner.documents()?.take(self.limit)))
    }
}

/// `queries.jsonl` in file order; text comes from `text` or `query`.
pub fn load_queries(path: &Path) -> Result<Vec<Query>> {
    let file = File::open(path).map_err(|e| Error::Corpus(format!("cannot open {}: {e}", path.display())))?;
    let mut queries = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let obj: Value = serde_json::from_str(&line).map_err(|e| Error::Corpus(format!("{}:{}: {e}", path.display(), i + 1)))?;
        let id = first_field(&obj, &["_id", "id"]).ok_or_else(|| Error::Corpus(format!("{}:{}: missing '_id'", path.display(), i + 1)))?;
        let text = first_field(&obj, &["text", "query"]).unwrap_or_default();
        queries.push(Query { id, text });
    }
    Ok(queries)
}

/// Whitespace-separated qrels: BEIR's `qid docid rel` or TREC's
/// `qid iter docid rel`. Shorter lines are skipped.
pub fn load_qrels(path: &Path) -> Result<Qrels> {
    read_qrels(path).map(|(_, qrels)| qrels)
}

/// Qrels plus their query ids in first-seen file order.
fn read_qrels(path: &Path) -> Result<(Vec<String>, Qrels)> {
    let file = File::open(path).map_err(|e| Error::Corpus(format!("cannot open {}: {e}", path.display())))?;
    let mut order = Vec::new();
    let mut qrels = Qrels::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (qid, docid, rel) = match parts.as_slice() {
            [qid, docid, rel] => (*qid, *docid, *rel),
            [qid, _, docid, rel, ..] => (*qid, *docid, *rel),
            _ => continue,
        };
        let rel: i32 = match rel.parse() {
            Ok(rel) => rel,
            // `query-id corpus-id score` header
            Err(_) if i == 0 => continue,
            Err(e) => return Err(Error::Corpus(format!("{}:{}: bad relevance '{rel}': {e}", path.display(), i + 1))),
        };
        if !qrels.contains_key(qid) {
            order.push(qid.to_string());
        }
        qrels.entry(qid.to_string()).or_default().insert(docid.to_string(), rel);
    }
    Ok((order, qrels))
}

/// A BEIR dataset directory restricted to its test split.
pub struct BeirDataset {
    pub corpus: JsonlCorpus,
    /// Test queries, i.e. those judged in `qrels/test.tsv`, in qrels file order.
    pub queries: Vec<Query>,
    pub qrels: Qrels,
}

impl BeirDataset {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let corpus_path = dir.join("corpus.jsonl");
        let queries_path = dir.join("queries.jsonl");
        let qrels_path = dir.join("qrels").join("test.tsv");
        for p in [&corpus_path, &queries_path, &qrels_path] {
            if !p.exists() {
                return Err(Error::Corpus(format!(
                    "dataset not found under {}: expected corpus.jsonl, queries.jsonl and qrels/test.tsv (missing {})",
                    dir.display(),
                    p.display()
                )));
            }
        }
        let corpus = JsonlCorpus::open(&corpus_path)?;
        let all: HashMap<String, String> = load_queries(&queries_path)?.into_iter().map(|q| (q.id, q.text)).collect();
        let (order, qrels) = read_qrels(&qrels_path)?;
        let queries = order.iter().map(|qid| Query::new(qid.clone(), all.get(qid).cloned().unwrap_or_default())).collect();
        Ok(Self { corpus, queries, qrels })
    }

    pub fn first_query(&self) -> Option<&Query> {
        self.queries.first()
    }
}
