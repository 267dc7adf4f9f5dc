use std::cmp::Ordering;

use mosaic_core::error::{Error, Result};

/// Exhaustive inner-product index over row-major `f32` vectors.
///
/// Positions are insertion order; the index itself knows nothing about
/// document ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, data: Vec::new() }
    }

    pub fn with_capacity(dim: usize, vectors: usize) -> Self {
        Self { dim, data: Vec::with_capacity(dim * vectors) }
    }

    pub fn from_raw(dim: usize, data: Vec<f32>) -> Result<Self> {
        if dim == 0 || data.len() % dim != 0 {
            return Err(Error::IndexConsistency(format!("{} floats do not form rows of dimension {dim}", data.len())));
        }
        Ok(Self { dim, data })
    }

    pub fn dim(&self) -> usize { self.dim }
    pub fn len(&self) -> usize { if self.dim == 0 { 0 } else { self.data.len() / self.dim } }
    pub fn is_empty(&self) -> bool { self.data.is_empty() }
    pub fn as_slice(&self) -> &[f32] { &self.data }

    /// Append a vector; returns its position.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        if vector.len() != self.dim {
            return Err(Error::IndexConsistency(format!("vector has dimension {}, index expects {}", vector.len(), self.dim)));
        }
        let pos = self.len();
        self.data.extend_from_slice(vector);
        Ok(pos)
    }

    pub fn vector(&self, pos: usize) -> Option<&[f32]> {
        let start = pos.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    /// Top `k` positions by descending inner product; equal scores keep the
    /// lower position first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dim {
            return Err(Error::IndexConsistency(format!("query has dimension {}, index expects {}", query.len(), self.dim)));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(usize, f32)> = self.data.chunks_exact(self.dim).map(|row| dot(row, query)).enumerate().collect();
        let by_rank = |a: &(usize, f32), b: &(usize, f32)| -> Ordering { b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)) };
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_by(by_rank);
        Ok(scored)
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale to unit length; zero vectors are left as they are.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() { *x /= norm; }
    }
}
