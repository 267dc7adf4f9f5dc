use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tantivy::{doc, Index, IndexWriter};

use mosaic_core::error::{Error, Result};
use mosaic_core::traits::CorpusSource;

use crate::tantivy_utils::{backend_err, build_schema, fields, register_tokenizer, Fields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Builds a fresh lexical index, replacing whatever was in `dir`.
pub struct LexicalIndexer {
	dir: PathBuf,
	index: Index,
	fields: Fields,
}

impl LexicalIndexer {
	pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
		let dir = dir.as_ref().to_path_buf();
		if dir.exists() { std::fs::remove_dir_all(&dir)?; }
		std::fs::create_dir_all(&dir)?;
		let schema = build_schema();
		let index = Index::create_in_dir(&dir, schema.clone()).map_err(|e| backend_err("create index", e))?;
		register_tokenizer(&index);
		let fields = fields(&schema)?;
		Ok(Self { dir, index, fields })
	}

	/// Index every document of `corpus`; returns the document count.
	/// Ids must be unique, otherwise nothing is committed.
	pub fn index_corpus(&self, corpus: &dyn CorpusSource) -> Result<usize> {
		let mut writer: IndexWriter = self.index.writer(WRITER_HEAP_BYTES).map_err(|e| backend_err("open writer", e))?;
		let mut count = 0usize;
		let mut seen = HashSet::new();
		for document in corpus.documents()? {
			let document = document?;
			if document.id.is_empty() {
				return Err(Error::Corpus(format!("document #{count} has an empty id")));
			}
			if !seen.insert(document.id.clone()) {
				return Err(Error::Corpus(format!("duplicate document id '{}' in snapshot {}", document.id, corpus.snapshot_id())));
			}
			let contents = document.contents();
			writer
				.add_document(doc!(
					self.fields.id => document.id,
					self.fields.title => document.title,
					self.fields.body => document.text,
					self.fields.contents => contents,
				))
				.map_err(|e| backend_err("add document", e))?;
			count += 1;
			if count % 100_000 == 0 { tracing::debug!(count, "lexical indexing progress"); }
		}
		writer.commit().map_err(|e| backend_err("commit", e))?;
		tracing::info!(count, dir = %self.dir.display(), snapshot = corpus.snapshot_id(), "lexical index committed");
		Ok(count)
	}
}
