//! Dense retrieval: a flat inner-product index with a position → id table,
//! its on-disk artifact format, the builder that fills it from a corpus, the
//! content-addressed cache that publishes artifacts atomically, and the
//! query-side retriever.

pub mod artifact;
pub mod cache;
pub mod flat;
pub mod index_build;
pub mod search;

pub use artifact::{ArtifactMeta, DenseIndexArtifact};
pub use cache::{ArtifactStatus, BuildOptions, IndexCacheManager};
pub use flat::FlatIndex;
pub use index_build::{CancelToken, DenseIndexBuilder};
pub use search::DenseRetriever;
