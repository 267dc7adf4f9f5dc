use std::fmt::Display;

use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use mosaic_core::error::Error;

pub const ANALYZER: &str = "en_stem_stop";

const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

/// Field handles of the lexical schema.
#[derive(Debug, Clone, Copy)]
pub struct Fields {
	pub id: Field,
	pub title: Field,
	pub body: Field,
	/// `title\ntext`, analyzed, not stored.
	pub contents: Field,
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("id", STRING | STORED);
	schema_builder.add_text_field("title", STORED);
	schema_builder.add_text_field("body", STORED);
	let indexing = TextFieldIndexing::default().set_tokenizer(ANALYZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	schema_builder.add_text_field("contents", TextOptions::default().set_indexing_options(indexing));
	schema_builder.build()
}

pub fn fields(schema: &Schema) -> Result<Fields, Error> {
	let get = |name: &str| schema.get_field(name).map_err(|e| backend_err("schema", e));
	Ok(Fields { id: get("id")?, title: get("title")?, body: get("body")?, contents: get("contents")? })
}

pub fn register_tokenizer(index: &Index) {
	let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(40))
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.filter(Stemmer::new(Language::English))
		.build();
	index.tokenizers().register(ANALYZER, analyzer);
}

pub(crate) fn backend_err(context: &str, e: impl Display) -> Error {
	Error::ExternalBackend(format!("{context}: {e}"))
}
