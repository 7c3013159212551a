//! E5-style embedding wrapper
//!
//! E5 models expect `passage: ` before indexed text and `query: ` before
//! search text, and are compared by inner product on unit vectors.

use async_trait::async_trait;

use crate::error::PortError;
use crate::ports::{EmbedDocuments, EmbedQuery, Embedder};

const PASSAGE_PREFIX: &str = "passage: ";
const QUERY_PREFIX: &str = "query: ";

/// Adds role prefixes and L2-normalizes every vector from the inner embedder
pub struct PrefixedEmbedder<E> {
    inner: E,
}

impl<E: Embedder> PrefixedEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

#[async_trait]
impl<E: Embedder> EmbedDocuments for PrefixedEmbedder<E> {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PortError> {
        let prefixed: Vec<String> = texts
            .iter()
            .map(|t| format!("{}{}", PASSAGE_PREFIX, t))
            .collect();
        let mut vectors = self.inner.embed_documents(&prefixed).await?;
        vectors.iter_mut().for_each(|v| l2_normalize(v));
        Ok(vectors)
    }
}

#[async_trait]
impl<E: Embedder> EmbedQuery for PrefixedEmbedder<E> {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, PortError> {
        let mut vector = self
            .inner
            .embed_query(&format!("{}{}", QUERY_PREFIX, text))
            .await?;
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

impl<E: Embedder> Embedder for PrefixedEmbedder<E> {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}
