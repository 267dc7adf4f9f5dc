//! On-disk dense artifact.
//!
//! An artifact directory holds three files:
//!
//! - `vectors.bin`: `"MOSV"`, `u32` format version, `u32` dimension,
//!   `u64` vector count (all little-endian), then `count × dimension`
//!   little-endian `f32`s in insertion order
//! - `ids.txt`: one document id per line; line `i` belongs to vector `i`
//! - `meta.json`: [`ArtifactMeta`], written last
//!
//! Directories are only ever published whole (see [`crate::cache`]), so a
//! reader either sees all three files of one build or none.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use mosaic_core::error::{Error, Result};
use mosaic_core::types::{ArtifactKey, DocId, SimilarityMetric};

use crate::flat::FlatIndex;

pub const FORMAT_VERSION: u32 = 1;
pub const VECTORS_FILE: &str = "vectors.bin";
pub const IDS_FILE: &str = "ids.txt";
pub const META_FILE: &str = "meta.json";

const MAGIC: &[u8; 4] = b"MOSV";
pub const HEADER_LEN: u64 = 20;
const WRITE_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub format_version: u32,
    pub corpus_snapshot_id: String,
    pub model_version: String,
    pub dimension: usize,
    pub similarity_metric: SimilarityMetric,
    /// Stored vectors are unit length; queries must be normalized too.
    pub normalized: bool,
    pub vector_count: usize,
    /// blake3 of `vectors.bin`.
    pub checksum: String,
    pub built_at: String,
}

impl ArtifactMeta {
    pub fn key(&self) -> ArtifactKey {
        ArtifactKey::new(self.corpus_snapshot_id.clone(), self.model_version.clone())
    }

    pub fn read(dir: &Path) -> Result<Self> {
        let raw = fs::read(dir.join(META_FILE))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorHeader {
    pub format_version: u32,
    pub dimension: usize,
    pub count: usize,
}

impl VectorHeader {
    pub fn data_len(&self) -> u64 {
        (self.count as u64) * (self.dimension as u64) * 4
    }

    fn parse(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < HEADER_LEN as usize {
            return Err(format!("{VECTORS_FILE} is shorter than its header"));
        }
        if &bytes[..4] != MAGIC {
            return Err(format!("{VECTORS_FILE} has bad magic bytes"));
        }
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[12..20]);
        Ok(Self { format_version: u32_at(4), dimension: u32_at(8) as usize, count: u64::from_le_bytes(count) as usize })
    }
}

/// Header of `dir/vectors.bin` without reading the payload.
pub fn read_vector_header(dir: &Path) -> Result<VectorHeader> {
    let mut buf = [0u8; HEADER_LEN as usize];
    File::open(dir.join(VECTORS_FILE))?.read_exact(&mut buf)?;
    VectorHeader::parse(&buf).map_err(|reason| Error::CacheCorruption { path: dir.to_path_buf(), reason })
}

fn write_vectors<W: Write>(index: &FlatIndex, w: &mut W) -> io::Result<()> {
    w.write_all(MAGIC)?;
    w.write_all(&FORMAT_VERSION.to_le_bytes())?;
    w.write_all(&(index.dim() as u32).to_le_bytes())?;
    w.write_all(&(index.len() as u64).to_le_bytes())?;
    let mut buf = Vec::with_capacity(WRITE_CHUNK * 4);
    for chunk in index.as_slice().chunks(WRITE_CHUNK) {
        buf.clear();
        for x in chunk { buf.extend_from_slice(&x.to_le_bytes()); }
        w.write_all(&buf)?;
    }
    Ok(())
}

/// blake3 of the bytes `persist` writes to `vectors.bin`.
pub fn vector_checksum(index: &FlatIndex) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    write_vectors(index, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Vectors, their id table and metadata of one build.
#[derive(Debug, Clone)]
pub struct DenseIndexArtifact {
    pub meta: ArtifactMeta,
    pub index: FlatIndex,
    pub ids: Vec<DocId>,
}

impl DenseIndexArtifact {
    pub(crate) fn assemble(
        key: ArtifactKey,
        metric: SimilarityMetric,
        index: FlatIndex,
        ids: Vec<DocId>,
    ) -> Result<Self> {
        if index.len() != ids.len() {
            return Err(Error::IndexConsistency(format!("{} vectors but {} ids", index.len(), ids.len())));
        }
        let meta = ArtifactMeta {
            format_version: FORMAT_VERSION,
            corpus_snapshot_id: key.corpus_snapshot_id,
            model_version: key.model_version,
            dimension: index.dim(),
            similarity_metric: metric,
            normalized: metric.normalizes(),
            vector_count: index.len(),
            checksum: vector_checksum(&index)?,
            built_at: Utc::now().to_rfc3339(),
        };
        Ok(Self { meta, index, ids })
    }

    pub fn len(&self) -> usize { self.ids.len() }
    pub fn is_empty(&self) -> bool { self.ids.is_empty() }

    pub fn id_at(&self, pos: usize) -> Option<&str> {
        self.ids.get(pos).map(String::as_str)
    }

    /// Write all three files into an existing directory, metadata last.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        let file = File::create(dir.join(VECTORS_FILE))?;
        let mut w = BufWriter::new(file);
        write_vectors(&self.index, &mut w)?;
        w.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        let mut ids = BufWriter::new(File::create(dir.join(IDS_FILE))?);
        for id in &self.ids {
            ids.write_all(id.as_bytes())?;
            ids.write_all(b"\n")?;
        }
        ids.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        fs::write(dir.join(META_FILE), serde_json::to_vec_pretty(&self.meta)?)?;
        tracing::debug!(dir = %dir.display(), vectors = self.len(), "persisted dense artifact");
        Ok(())
    }

    /// Load and fully verify an artifact directory.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.join(META_FILE).exists() {
            return Err(Error::NotBuilt(dir.display().to_string()));
        }
        let corrupt = |reason: String| Error::CacheCorruption { path: dir.to_path_buf(), reason };
        let meta = ArtifactMeta::read(dir).map_err(|e| corrupt(format!("unreadable {META_FILE}: {e}")))?;

        let bytes = fs::read(dir.join(VECTORS_FILE)).map_err(|e| corrupt(format!("unreadable {VECTORS_FILE}: {e}")))?;
        let checksum = blake3::hash(&bytes).to_hex().to_string();
        if checksum != meta.checksum {
            return Err(corrupt(format!("{VECTORS_FILE} checksum {checksum} does not match recorded {}", meta.checksum)));
        }
        let header = VectorHeader::parse(&bytes).map_err(corrupt)?;
        if header.count != meta.vector_count || header.dimension != meta.dimension {
            return Err(corrupt(format!(
                "{VECTORS_FILE} holds {}×{}, metadata declares {}×{}",
                header.count, header.dimension, meta.vector_count, meta.dimension
            )));
        }
        let payload = &bytes[HEADER_LEN as usize..];
        if payload.len() as u64 != header.data_len() {
            return Err(corrupt(format!("{VECTORS_FILE} payload is {} bytes, expected {}", payload.len(), header.data_len())));
        }
        let data: Vec<f32> = payload.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
        let index = FlatIndex::from_raw(meta.dimension, data).map_err(|e| corrupt(e.to_string()))?;

        let ids_raw = fs::read_to_string(dir.join(IDS_FILE)).map_err(|e| corrupt(format!("unreadable {IDS_FILE}: {e}")))?;
        let ids: Vec<DocId> = ids_raw.lines().map(str::to_string).collect();
        if ids.len() != meta.vector_count {
            return Err(corrupt(format!("{IDS_FILE} has {} entries, metadata declares {}", ids.len(), meta.vector_count)));
        }
        Ok(Self { meta, index, ids })
    }
}
