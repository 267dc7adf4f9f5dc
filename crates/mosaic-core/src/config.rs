//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`
//! and `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_DENSE__BATCH_SIZE=32`). Provides helpers to expand `~` and `${VAR}`
//! and to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::SimilarityMetric;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            other => tracing::debug!(env = other, "no environment overlay for RUST_ENV"),
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed view of the merged configuration, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub dense: DenseSettings,
    pub search: SearchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// BEIR-style dataset directory: `corpus.jsonl`, `queries.jsonl`, `qrels/test.tsv`.
    pub dataset_dir: String,
    pub dense_cache_dir: String,
    pub lexical_index_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            dataset_dir: "data/cache/fever".to_string(),
            dense_cache_dir: "data/indexes/dense".to_string(),
            lexical_index_dir: "data/indexes/tantivy".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseSettings {
    /// `hash` selects the offline trigram embedder; anything else names a model directory layout.
    pub model: String,
    pub model_dir: Option<String>,
    /// Only used by the hash embedder; real models report their own.
    pub dimension: usize,
    pub metric: SimilarityMetric,
    pub batch_size: usize,
    pub max_len: usize,
}

impl Default for DenseSettings {
    fn default() -> Self {
        Self {
            model: "hash".to_string(),
            model_dir: None,
            dimension: 1024,
            metric: SimilarityMetric::Cosine,
            batch_size: 64,
            max_len: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_top_k: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { default_top_k: 10 }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.dense.batch_size, "dense.batch_size"),
            (self.dense.dimension, "dense.dimension"),
            (self.dense.max_len, "dense.max_len"),
            (self.search.default_top_k, "search.default_top_k"),
        ];
        for (value, key) in checks {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{key} must be at least 1")));
            }
        }
        if self.dense.model.trim().is_empty() {
            return Err(Error::InvalidConfig("dense.model must not be empty".into()));
        }
        Ok(())
    }

    pub fn dataset_dir(&self) -> PathBuf {
        expand_path(&self.data.dataset_dir)
    }

    pub fn dense_cache_dir(&self) -> PathBuf {
        expand_path(&self.data.dense_cache_dir)
    }

    pub fn lexical_index_dir(&self) -> PathBuf {
        expand_path(&self.data.lexical_index_dir)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
