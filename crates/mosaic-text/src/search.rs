use std::path::Path;

use tantivy::collector::TopDocs;
use tantivy::query::{QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument, Term};

use mosaic_core::error::{Error, Result};
use mosaic_core::traits::LexicalEngine;
use mosaic_core::types::{Backend, Document, SearchHit};

use crate::tantivy_utils::{backend_err, fields, register_tokenizer, Fields};

/// Read-only BM25 search over an index built by [`crate::LexicalIndexer`].
pub struct TantivyLexicalEngine {
	index: Index,
	reader: IndexReader,
	fields: Fields,
}

impl TantivyLexicalEngine {
	pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
		let dir = dir.as_ref();
		if !dir.join("meta.json").exists() {
			return Err(Error::ExternalBackend(format!(
				"no lexical index at {}; run `mosaic index` to build it",
				dir.display()
			)));
		}
		let index = Index::open_in_dir(dir).map_err(|e| backend_err(&format!("open {}", dir.display()), e))?;
		register_tokenizer(&index);
		let fields = fields(&index.schema())?;
		let reader: IndexReader = index
			.reader_builder()
			.reload_policy(ReloadPolicy::Manual)
			.try_into()
			.map_err(|e| backend_err("open reader", e))?;
		Ok(Self { index, reader, fields })
	}

	pub fn num_docs(&self) -> u64 {
		self.reader.searcher().num_docs()
	}

	fn stored(&self, doc: &TantivyDocument, field: tantivy::schema::Field) -> String {
		doc.get_first(field).and_then(|v| v.as_str()).unwrap_or("").to_string()
	}
}

impl LexicalEngine for TantivyLexicalEngine {
	fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
		if top_k == 0 { return Ok(Vec::new()); }
		let searcher = self.reader.searcher();
		let parser = QueryParser::for_index(&self.index, vec![self.fields.contents]);
		let (parsed, errors) = parser.parse_query_lenient(query);
		if !errors.is_empty() { tracing::debug!(?errors, "lenient query parse dropped clauses"); }
		let top_docs = searcher.search(&parsed, &TopDocs::with_limit(top_k)).map_err(|e| backend_err("search", e))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(|e| backend_err("fetch document", e))?;
			hits.push(SearchHit { id: self.stored(&doc, self.fields.id), score, source: Backend::Lexical });
		}
		Ok(hits)
	}

	fn document_text(&self, id: &str) -> Result<Option<String>> {
		let searcher = self.reader.searcher();
		let query = TermQuery::new(Term::from_field_text(self.fields.id, id), IndexRecordOption::Basic);
		let top = searcher.search(&query, &TopDocs::with_limit(1)).map_err(|e| backend_err("lookup", e))?;
		let Some((_, addr)) = top.into_iter().next() else { return Ok(None) };
		let doc: TantivyDocument = searcher.doc(addr).map_err(|e| backend_err("fetch document", e))?;
		let document = Document::new(id, self.stored(&doc, self.fields.body)).with_title(self.stored(&doc, self.fields.title));
		Ok(Some(document.contents()))
	}
}
