use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::errors::{EngineError, EngineResult};

const SECRET_PREFIX: &str = "fg_";
const SECRET_BYTES: usize = 32;
const SALT_BYTES: usize = 16;
/// Leading fragment of the plaintext kept for display, `fg_` included.
const DISPLAY_PREFIX_LEN: usize = 8;

/// Persisted credential row. The plaintext secret is never stored; only its
/// salted hash is retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialRecord {
    id: u64,
    secret_hash: [u8; 32],
    salt: [u8; SALT_BYTES],
    prefix: String,
    label: String,
    created_at: DateTime<Utc>,
}

/// Non-secret view of an issued credential, safe to enumerate.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialInfo {
    pub id: u64,
    pub prefix: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

impl From<&CredentialRecord> for CredentialInfo {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            id: record.id,
            prefix: record.prefix.clone(),
            label: record.label.clone(),
            created_at: record.created_at,
        }
    }
}

/// Issues and validates API secrets.
///
/// `issue` hands the plaintext out exactly once; afterwards only the salted
/// hash exists, so a revoked credential can never validate again.
#[derive(Debug)]
pub struct CredentialStore {
    records: Vec<CredentialRecord>,
    next_id: u64,
    path: Option<PathBuf>,
}

impl CredentialStore {
    pub fn in_memory() -> Self {
        Self {
            records: Vec::new(),
            next_id: 1,
            path: None,
        }
    }

    /// Open a file-backed store, loading any existing records.
    pub fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        let records: Vec<CredentialRecord> = if path.exists() {
            let data = fs::read(&path).map_err(|source| EngineError::Storage {
                path: path.clone(),
                source,
            })?;
            postcard::from_bytes(&data)?
        } else {
            Vec::new()
        };
        let next_id = records.iter().map(|r| r.id).max().map_or(1, |m| m + 1);
        debug!(
            "loaded {} credentials from {}",
            records.len(),
            path.display()
        );
        Ok(Self {
            records,
            next_id,
            path: Some(path),
        })
    }

    /// Issue a fresh credential. Returns the plaintext secret and the
    /// non-secret record view; the plaintext is not recoverable afterwards.
    pub fn issue(&mut self, label: &str) -> EngineResult<(String, CredentialInfo)> {
        if label.trim().is_empty() {
            return Err(EngineError::Validation(
                "credential label must not be empty".into(),
            ));
        }

        let mut secret = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut secret);
        let plaintext = format!("{SECRET_PREFIX}{}", hex::encode(secret));

        let mut salt = [0u8; SALT_BYTES];
        OsRng.fill_bytes(&mut salt);

        let record = CredentialRecord {
            id: self.next_id,
            secret_hash: salted_hash(&salt, &plaintext),
            salt,
            prefix: plaintext[..DISPLAY_PREFIX_LEN].to_string(),
            label: label.to_string(),
            created_at: Utc::now(),
        };
        let description = CredentialInfo::from(&record);

        self.records.push(record);
        if let Err(err) = self.persist() {
            self.records.pop();
            return Err(err);
        }
        self.next_id += 1;

        info!(
            "issued credential {} ({}…) for '{}'",
            description.id, description.prefix, description.label
        );
        Ok((plaintext, description))
    }

    /// Check a presented secret against every active credential.
    ///
    /// Fails closed on malformed input. The scan always visits the whole
    /// table and folds per-record constant-time comparisons, so the position
    /// of the matching record is not observable through early exit.
    pub fn validate(&self, presented: &str) -> bool {
        if !presented.starts_with(SECRET_PREFIX)
            || presented.len() != SECRET_PREFIX.len() + SECRET_BYTES * 2
        {
            return false;
        }

        let mut matched = false;
        for record in &self.records {
            let candidate = salted_hash(&record.salt, presented);
            matched |= bool::from(candidate.ct_eq(&record.secret_hash));
        }
        matched
    }

    /// Hard-delete a credential; its plaintext can never validate again.
    pub fn revoke(&mut self, id: u64) -> EngineResult<()> {
        let Some(pos) = self.records.iter().position(|r| r.id == id) else {
            return Err(EngineError::Validation(format!(
                "no credential with id {id}"
            )));
        };
        let removed = self.records.remove(pos);
        if let Err(err) = self.persist() {
            self.records.insert(pos, removed);
            return Err(err);
        }
        info!("revoked credential {id}");
        Ok(())
    }

    /// Enumerate credentials without secrets or hashes.
    pub fn list(&self) -> Vec<CredentialInfo> {
        self.records.iter().map(CredentialInfo::from).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
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

fn salted_hash(salt: &[u8], plaintext: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(plaintext.as_bytes());
    hasher.finalize().into()
}
