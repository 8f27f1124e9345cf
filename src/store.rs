use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::embedding::Embedding;
use crate::errors::{EngineError, EngineResult};

/// One enrolled identity. Immutable after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
    pub name: String,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
}

/// Append-only store of enrolled identities.
///
/// Inserts validate shape and assign ids monotonically; reads are full-scan
/// snapshots and never re-validate. When opened with a backing file the
/// whole table is rewritten postcard-encoded after each mutation, so a
/// failed write never leaves a partial row behind.
#[derive(Debug)]
pub struct EmbeddingStore {
    records: Vec<Identity>,
    next_id: u64,
    dimension: usize,
    path: Option<PathBuf>,
}

impl EmbeddingStore {
    pub fn in_memory(dimension: usize) -> Self {
        Self {
            records: Vec::new(),
            next_id: 1,
            dimension,
            path: None,
        }
    }

    /// Open a file-backed store, loading any existing records.
    pub fn open(path: impl Into<PathBuf>, dimension: usize) -> EngineResult<Self> {
        let path = path.into();
        let records: Vec<Identity> = if path.exists() {
            let data = fs::read(&path).map_err(|source| EngineError::Storage {
                path: path.clone(),
                source,
            })?;
            postcard::from_bytes(&data)?
        } else {
            Vec::new()
        };
        let next_id = records.iter().map(|r| r.id).max().map_or(1, |m| m + 1);
        debug!("loaded {} identities from {}", records.len(), path.display());
        Ok(Self {
            records,
            next_id,
            dimension,
            path: Some(path),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Enroll a new identity. Name and dimension are checked here, never at
    /// read time.
    pub fn insert(&mut self, name: &str, embedding: Embedding) -> EngineResult<Identity> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation(
                "identity name must not be empty".into(),
            ));
        }
        if embedding.dim() != self.dimension {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension,
                found: embedding.dim(),
            });
        }

        let identity = Identity {
            id: self.next_id,
            name: name.to_string(),
            embedding,
            created_at: Utc::now(),
        };
        self.records.push(identity.clone());
        if let Err(err) = self.persist() {
            self.records.pop();
            return Err(err);
        }
        self.next_id += 1;
        Ok(identity)
    }

    /// Snapshot of all identities, most recent enrollment first. Equal
    /// timestamps resolve to the later-assigned id.
    pub fn list_all(&self) -> Vec<Identity> {
        let mut out = self.records.clone();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }

    /// Records in insertion order, for scanning.
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.records.iter()
    }

    /// Administrative removal of one identity. Enrollment is otherwise
    /// append-only.
    pub fn remove(&mut self, id: u64) -> EngineResult<()> {
        let Some(pos) = self.records.iter().position(|r| r.id == id) else {
            return Err(EngineError::Validation(format!("no identity with id {id}")));
        };
        let removed = self.records.remove(pos);
        if let Err(err) = self.persist() {
            self.records.insert(pos, removed);
            return Err(err);
        }
        Ok(())
    }

    /// Drop every record and the backing file.
    pub fn purge(&mut self) -> EngineResult<()> {
        self.records.clear();
        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path).map_err(|source| EngineError::Storage {
                    path: path.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn persist(&self) -> EngineResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| EngineError::Storage {
                path: path.clone(),
                source,
            })?;
        }
        let data = postcard::to_allocvec(&self.records)?;
        fs::write(path, data).map_err(|source| EngineError::Storage {
            path: path.clone(),
            source,
        })
    }
}
