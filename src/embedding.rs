use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};

/// Face embedding produced by the external model: an ordered, fixed-length
/// float vector. Vectors from the same identity are expected to be close
/// under cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap a raw vector, checking it against the deployment dimension.
    pub fn new(values: Vec<f32>, expected_dim: usize) -> EngineResult<Self> {
        if values.len() != expected_dim {
            return Err(EngineError::DimensionMismatch {
                expected: expected_dim,
                found: values.len(),
            });
        }
        Ok(Self(values))
    }

    /// Wrap a raw vector without a dimension check. For probes whose length
    /// is validated against a peer embedding at compare time.
    pub fn from_raw(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}
