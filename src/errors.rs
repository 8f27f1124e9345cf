use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level failure taxonomy. Every variant is local to the call that
/// produced it; `TransientCapture` is the only retry-worthy kind, the rest
/// are terminal for the call.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("no face detected in image")]
    NoFaceDetected,

    #[error("expected a single face, found {0}")]
    MultipleFaces(usize),

    #[error("missing, invalid or revoked credential")]
    Unauthorized,

    #[error("transient capture failure: {0}")]
    TransientCapture(String),

    #[error("storage failure at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("storage codec failure: {0}")]
    StorageCodec(#[from] postcard::Error),
}
