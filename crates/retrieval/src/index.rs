//! Exact inner-product vector index
//!
//! Vectors are stored row-major in one flat buffer. Positions are assigned in
//! insertion order and never change.

use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Append-only flat index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append vectors and return the positions they were given
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Range<usize>> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dim,
                actual: bad.len(),
            });
        }
        let start = self.len();
        self.data.reserve(vectors.len() * self.dim);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(start..self.len())
    }

    /// Top `k` positions by inner product, best first, ties by position
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dim {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }
        if k == 0 || self.dim == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(position, row)| (position, dot(row, query)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_vec(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read(path).await?;
        let index: FlatIndex = serde_json::from_slice(&content)?;
        if index.dim > 0 && index.data.len() % index.dim != 0 {
            return Err(RetrievalError::Search(format!(
                "corrupt index at {}: {} values for dimension {}",
                path.display(),
                index.data.len(),
                index.dim
            )));
        }
        Ok(index)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_add_assigns_positions() {
        let mut index = FlatIndex::new(2);
        assert_eq!(index.add(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap(), 0..2);
        assert_eq!(index.add(&[vec![0.5, 0.5]]).unwrap(), 2..3);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_add_rejects_wrong_dimension() {
        let mut index = FlatIndex::new(2);
        let err = index.add(&[vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch { expected: 2, actual: 1 }
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_orders_by_score_then_position() {
        let mut index = FlatIndex::new(2);
        index
            .add(&[vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0], vec![0.6, 0.8]])
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert!((hits[2].1 - 0.6).abs() < 1e-6);

        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
        assert_eq!(index.search(&[1.0, 0.0], 10).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("src").join("index.json");
        let mut index = FlatIndex::new(3);
        index.add(&[vec![1.0, 2.0, 3.0]]).unwrap();
        index.save(&path).await.unwrap();

        let loaded = FlatIndex::load(&path).await.unwrap();
        assert_eq!(loaded, index);
    }
}
