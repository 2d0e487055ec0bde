//! Progress ledger: which stages of which jobs completed successfully.
//!
//! Three independent ledgers are kept:
//!
//! - preprocess: `(job, preprocessor) -> bool`
//! - process: `job -> bool` (a job has exactly one processor)
//! - postprocess: `(job, postprocessor) -> bool`
//!
//! An absent key reads as `false` (never run).
//!
//! # Single writer
//!
//! The file-backed store holds no lock on disk. Two `algae` processes
//! pointed at the same progress file will overwrite each other's updates.
//! Run one invocation at a time per progress file.

use crate::error::{Result, StorageError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Current on-disk ledger format
pub const PROGRESS_VERSION: u32 = 1;

/// Persisted progress record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub version: u32,
    #[serde(default)]
    pub preprocess: BTreeMap<String, BTreeMap<String, bool>>,
    #[serde(default)]
    pub process: BTreeMap<String, bool>,
    #[serde(default)]
    pub postprocess: BTreeMap<String, BTreeMap<String, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            version: PROGRESS_VERSION,
            preprocess: BTreeMap::new(),
            process: BTreeMap::new(),
            postprocess: BTreeMap::new(),
            updated_at: None,
        }
    }
}

impl ProgressRecord {
    pub fn query_pre(&self, job: &str, stage: &str) -> bool {
        lookup(&self.preprocess, job, stage)
    }

    pub fn query_process(&self, job: &str) -> bool {
        self.process.get(job).copied().unwrap_or(false)
    }

    pub fn query_post(&self, job: &str, stage: &str) -> bool {
        lookup(&self.postprocess, job, stage)
    }

    pub fn set_pre(&mut self, job: &str, stage: &str, success: bool) {
        insert(&mut self.preprocess, job, stage, success);
        self.updated_at = Some(Utc::now());
    }

    pub fn set_process(&mut self, job: &str, success: bool) {
        self.process.insert(job.to_string(), success);
        self.updated_at = Some(Utc::now());
    }

    pub fn set_post(&mut self, job: &str, stage: &str, success: bool) {
        insert(&mut self.postprocess, job, stage, success);
        self.updated_at = Some(Utc::now());
    }
}

fn lookup(ledger: &BTreeMap<String, BTreeMap<String, bool>>, job: &str, stage: &str) -> bool {
    ledger
        .get(job)
        .and_then(|stages| stages.get(stage))
        .copied()
        .unwrap_or(false)
}

fn insert(
    ledger: &mut BTreeMap<String, BTreeMap<String, bool>>,
    job: &str,
    stage: &str,
    success: bool,
) {
    ledger
        .entry(job.to_string())
        .or_default()
        .insert(stage.to_string(), success);
}

/// Progress store port.
///
/// Queries and updates are synchronous; every update is visible to the next
/// query on the same store.
pub trait ProgressStore: Send + Sync {
    fn query_pre(&self, job: &str, stage: &str) -> bool;
    fn query_process(&self, job: &str) -> bool;
    fn query_post(&self, job: &str, stage: &str) -> bool;

    fn update_pre(&self, job: &str, stage: &str, success: bool) -> Result<()>;
    fn update_process(&self, job: &str, success: bool) -> Result<()>;
    fn update_post(&self, job: &str, stage: &str, success: bool) -> Result<()>;

    /// Forget every entry (all queries return `false` afterwards)
    fn reset(&self) -> Result<()>;

    /// Copy of the current ledger
    fn snapshot(&self) -> ProgressRecord;
}

/// Volatile progress store (tests, dry runs)
#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    record: Mutex<ProgressRecord>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: ProgressRecord) -> Self {
        Self {
            record: Mutex::new(record),
        }
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn query_pre(&self, job: &str, stage: &str) -> bool {
        self.record.lock().query_pre(job, stage)
    }

    fn query_process(&self, job: &str) -> bool {
        self.record.lock().query_process(job)
    }

    fn query_post(&self, job: &str, stage: &str) -> bool {
        self.record.lock().query_post(job, stage)
    }

    fn update_pre(&self, job: &str, stage: &str, success: bool) -> Result<()> {
        self.record.lock().set_pre(job, stage, success);
        Ok(())
    }

    fn update_process(&self, job: &str, success: bool) -> Result<()> {
        self.record.lock().set_process(job, success);
        Ok(())
    }

    fn update_post(&self, job: &str, stage: &str, success: bool) -> Result<()> {
        self.record.lock().set_post(job, stage, success);
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        *self.record.lock() = ProgressRecord::default();
        Ok(())
    }

    fn snapshot(&self) -> ProgressRecord {
        self.record.lock().clone()
    }
}

/// JSON-file progress store.
///
/// Loaded once at open; every update rewrites the whole ledger through a
/// temporary file in the same directory followed by a rename, so a killed
/// process leaves either the previous or the new ledger on disk.
///
/// Not safe for concurrent invocations against the same file (see module
/// docs).
#[derive(Debug)]
pub struct JsonProgressStore {
    path: PathBuf,
    record: Mutex<ProgressRecord>,
}

impl JsonProgressStore {
    /// Open the ledger at `path`; a missing file is an empty ledger
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let record = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let record: ProgressRecord = serde_json::from_str(&content)?;
            if record.version != PROGRESS_VERSION {
                return Err(StorageError::serialization(format!(
                    "Unsupported progress ledger version {} in {} (expected {})",
                    record.version,
                    path.display(),
                    PROGRESS_VERSION
                )));
            }
            debug!("Loaded progress ledger from {}", path.display());
            record
        } else {
            info!(
                "No progress ledger at {}, starting fresh",
                path.display()
            );
            ProgressRecord::default()
        };

        Ok(Self {
            path,
            record: Mutex::new(record),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` and persist while still holding the lock
    fn modify(&self, f: impl FnOnce(&mut ProgressRecord)) -> Result<()> {
        let mut record = self.record.lock();
        f(&mut record);
        persist_atomically(&self.path, &record)
    }
}

fn persist_atomically(path: &Path, record: &ProgressRecord) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    serde_json::to_writer_pretty(&mut tmp, record)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

impl ProgressStore for JsonProgressStore {
    fn query_pre(&self, job: &str, stage: &str) -> bool {
        self.record.lock().query_pre(job, stage)
    }

    fn query_process(&self, job: &str) -> bool {
        self.record.lock().query_process(job)
    }

    fn query_post(&self, job: &str, stage: &str) -> bool {
        self.record.lock().query_post(job, stage)
    }

    fn update_pre(&self, job: &str, stage: &str, success: bool) -> Result<()> {
        self.modify(|r| r.set_pre(job, stage, success))
    }

    fn update_process(&self, job: &str, success: bool) -> Result<()> {
        self.modify(|r| r.set_process(job, success))
    }

    fn update_post(&self, job: &str, stage: &str, success: bool) -> Result<()> {
        self.modify(|r| r.set_post(job, stage, success))
    }

    fn reset(&self) -> Result<()> {
        self.modify(|r| *r = ProgressRecord::default())
    }

    fn snapshot(&self) -> ProgressRecord {
        self.record.lock().clone()
    }
}
