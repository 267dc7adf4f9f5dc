//! mosaic-text
//!
//! Tantivy-backed lexical index: `index` builds it from a corpus source,
//! `search` serves it through the `LexicalEngine` contract.
pub mod tantivy_utils;
pub mod index;
pub mod search;

pub use index::LexicalIndexer;
pub use search::TantivyLexicalEngine;
