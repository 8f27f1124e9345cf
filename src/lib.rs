pub mod config;
pub mod credential;
pub mod embedding;
pub mod errors;
pub mod livescan;
pub mod matcher;
pub mod search;
pub mod service;
pub mod store;
pub mod vision;

// Re-export the main surface for convenience
pub use embedding::Embedding;
pub use errors::{EngineError, EngineResult};
pub use livescan::{LiveScanController, ScanOptions, ScanState};
pub use matcher::Comparison;
pub use search::MatchResult;
pub use service::FaceGate;
pub use store::{EmbeddingStore, Identity};
