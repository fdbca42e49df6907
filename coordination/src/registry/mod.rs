//! Artifact Registry: where finished runs are handed off
//!
//! Accepted runs store the candidate with its paired test suite; exhausted
//! runs store the full attempt history for later inspection. Records are
//! keyed by the objective fingerprint and `put` overwrites.

use crate::artifact::TestSuite;
use crate::escalation::state::EscalationAttempt;
use crate::router::task_classifier::TaskCategory;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry record could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("Test suite for {fingerprint} was not generated against the stored candidate")]
    Unpaired { fingerprint: String },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// What a finished run hands to the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistryRecord {
    Accepted {
        fingerprint: String,
        objective: String,
        category: TaskCategory,
        candidate: String,
        test_suite: TestSuite,
        attempts_used: usize,
        recorded_at: DateTime<Utc>,
    },
    Exhausted {
        fingerprint: String,
        objective: String,
        category: TaskCategory,
        last_candidate: String,
        last_error: String,
        attempts: Vec<EscalationAttempt>,
        recorded_at: DateTime<Utc>,
    },
}

impl RegistryRecord {
    pub fn fingerprint(&self) -> &str {
        match self {
            Self::Accepted { fingerprint, .. } | Self::Exhausted { fingerprint, .. } => fingerprint,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Reject accepted records whose suite belongs to another candidate.
    pub fn check_pairing(&self) -> RegistryResult<()> {
        match self {
            Self::Accepted {
                fingerprint,
                candidate,
                test_suite,
                ..
            } if !test_suite.matches(candidate) => Err(RegistryError::Unpaired {
                fingerprint: fingerprint.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Key-value store for finished runs.
#[async_trait]
pub trait ArtifactRegistry: Send + Sync {
    async fn put(&self, record: RegistryRecord) -> RegistryResult<()>;
    async fn get(&self, fingerprint: &str) -> RegistryResult<Option<RegistryRecord>>;
}

pub type SharedRegistry = Arc<dyn ArtifactRegistry>;

fn validate_fingerprint(fingerprint: &str) -> RegistryResult<()> {
    if fingerprint.is_empty() || !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(RegistryError::InvalidFingerprint(fingerprint.to_string()));
    }
    Ok(())
}

/// Process-local registry.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    records: Mutex<HashMap<String, RegistryRecord>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactRegistry for InMemoryRegistry {
    async fn put(&self, record: RegistryRecord) -> RegistryResult<()> {
        record.check_pairing()?;
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.insert(record.fingerprint().to_string(), record);
        Ok(())
    }

    async fn get(&self, fingerprint: &str) -> RegistryResult<Option<RegistryRecord>> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records.get(fingerprint).cloned())
    }
}

/// One pretty-printed JSON file per fingerprint under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.root.join(format!("{fingerprint}.json"))
    }
}

#[async_trait]
impl ArtifactRegistry for DirectoryRegistry {
    async fn put(&self, record: RegistryRecord) -> RegistryResult<()> {
        validate_fingerprint(record.fingerprint())?;
        record.check_pairing()?;

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(record.fingerprint());
        let body = serde_json::to_vec_pretty(&record)?;

        // Each writer gets its own temp file; the last rename wins.
        let root = self.root.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> RegistryResult<()> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".record-")
                .suffix(".tmp")
                .tempfile_in(&root)?;
            tmp.write_all(&body)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| RegistryError::Io(std::io::Error::other(e)))??;
        debug!(path = %path.display(), accepted = record.is_accepted(), "Registry record written");
        Ok(())
    }

    async fn get(&self, fingerprint: &str) -> RegistryResult<Option<RegistryRecord>> {
        validate_fingerprint(fingerprint)?;
        match tokio::fs::read(self.path_for(fingerprint)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
