//! mosaic-core
//!
//! Shared vocabulary of the retrieval workspace: domain types, the error
//! taxonomy, the collaborator traits (embedding provider, lexical engine,
//! corpus source), configuration and the corpus sources themselves.

pub mod config;
pub mod corpus;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
