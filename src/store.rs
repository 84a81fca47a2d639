//! Durable storage for per-image tag and crop state.
//!
//! The [`RecordStore`] trait is the persistence medium: a record store
//! addressable by `(project, image)`. Only the user-editable fields are
//! stored ([`StoredRecord`]); status is always derived and native
//! dimensions are always re-read from the file, so neither is persisted.
//!
//! ## Storage
//!
//! [`JsonStore`] keeps one pretty-printed JSON document per project at
//! `<root>/<project>.json`:
//!
//! ```json
//! {
//!   "version": 1,
//!   "records": {
//!     "beach.jpg": {
//!       "size_group": "Wedding",
//!       "size": "4x6",
//!       "crop_box": { "x": 0, "y": 166, "width": 4000, "height": 2667 },
//!       "is_cropped": true,
//!       "fingerprint": "9f86d08…"
//!     }
//!   }
//! }
//! ```
//!
//! Every write replaces the document atomically (temp file + rename), so a
//! crash mid-write leaves the previous document intact.
//!
//! Records are decoded one at a time. A record with bad fields is skipped
//! on load with a warning, and kept verbatim in the file until that image
//! is written again. A document that cannot be parsed at all, or carries
//! another version, loads as empty; the next write first moves it aside to
//! `<project>.json.unreadable` instead of overwriting it.

use crate::catalog::is_plain_name;
use crate::geometry::ImageRect;
use crate::tag::ImageId;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Version of the project document format. Bump this when the stored
/// fields change incompatibly.
const STORE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid project name: {0:?}")]
    InvalidProjectName(String),
}

/// Persisted fields of one image record.
///
/// Fields are stored raw, without the invariants
/// [`ImageRecord`](crate::tag::ImageRecord) enforces, so that violations in
/// hand-edited or stale documents are detected on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_box: Option<ImageRect>,
    #[serde(default)]
    pub is_cropped: bool,
    /// SHA-256 of the source file when the record was last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// A structured record store addressable by `(project, image)`.
///
/// Implementations must make each call atomic: a failed write leaves the
/// previously stored state readable.
pub trait RecordStore: Send + Sync {
    fn load_project(&self, project: &str) -> Result<BTreeMap<ImageId, StoredRecord>, StoreError>;

    fn write_record(
        &self,
        project: &str,
        id: &ImageId,
        record: &StoredRecord,
    ) -> Result<(), StoreError>;

    fn remove_record(&self, project: &str, id: &ImageId) -> Result<(), StoreError>;

    fn delete_project(&self, project: &str) -> Result<(), StoreError>;
}

/// On-disk document. Records stay as raw JSON so one malformed entry
/// cannot take the others down with it.
#[derive(Debug, Serialize, Deserialize)]
struct ProjectDocument {
    version: u32,
    records: BTreeMap<ImageId, serde_json::Value>,
}

enum ReadOutcome {
    Missing,
    Readable(ProjectDocument),
    Unreadable(String),
}

impl ProjectDocument {
    fn empty() -> Self {
        Self {
            version: STORE_VERSION,
            records: BTreeMap::new(),
        }
    }
}

/// JSON-file record store, one document per project.
pub struct JsonStore {
    root: PathBuf,
    // Serializes read-modify-write cycles across projects sharing this store.
    lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a project's document.
    pub fn project_path(&self, project: &str) -> Result<PathBuf, StoreError> {
        if !is_plain_name(project) {
            return Err(StoreError::InvalidProjectName(project.to_string()));
        }
        Ok(self.root.join(format!("{project}.json")))
    }

    fn read_document(&self, path: &Path) -> Result<ReadOutcome, StoreError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ReadOutcome::Missing),
            Err(e) => return Err(e.into()),
        };
        let document: ProjectDocument = match serde_json::from_str(&content) {
            Ok(d) => d,
            Err(e) => return Ok(ReadOutcome::Unreadable(e.to_string())),
        };
        if document.version != STORE_VERSION {
            return Ok(ReadOutcome::Unreadable(format!(
                "version {} (expected {STORE_VERSION})",
                document.version
            )));
        }
        Ok(ReadOutcome::Readable(document))
    }

    /// Replace a project document atomically.
    fn write_document(&self, path: &Path, document: &ProjectDocument) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_string_pretty(document)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })?;
        Ok(())
    }

    /// Move an unreadable document out of the way, never over an earlier one.
    fn set_aside(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let mut aside = path.with_extension("json.unreadable");
        let mut n = 1;
        while aside.exists() {
            aside = path.with_extension(format!("json.unreadable.{n}"));
            n += 1;
        }
        fs::rename(path, &aside)?;
        Ok(aside)
    }

    fn update(
        &self,
        project: &str,
        apply: impl FnOnce(&mut BTreeMap<ImageId, serde_json::Value>),
    ) -> Result<(), StoreError> {
        let path = self.project_path(project)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut document = match self.read_document(&path)? {
            ReadOutcome::Missing => ProjectDocument::empty(),
            ReadOutcome::Readable(document) => document,
            ReadOutcome::Unreadable(reason) => {
                let aside = self.set_aside(&path)?;
                warn!(
                    "moved unreadable project file {} to {} ({reason})",
                    path.display(),
                    aside.display()
                );
                ProjectDocument::empty()
            }
        };
        apply(&mut document.records);
        self.write_document(&path, &document)
    }
}

/// Decode each raw record on its own, skipping the ones that do not fit.
fn decode_records(
    path: &Path,
    raw: BTreeMap<ImageId, serde_json::Value>,
) -> BTreeMap<ImageId, StoredRecord> {
    raw.into_iter()
        .filter_map(|(id, value)| match serde_json::from_value(value) {
            Ok(record) => Some((id, record)),
            Err(e) => {
                warn!("skipping unreadable record {id} in {}: {e}", path.display());
                None
            }
        })
        .collect()
}

impl RecordStore for JsonStore {
    fn load_project(&self, project: &str) -> Result<BTreeMap<ImageId, StoredRecord>, StoreError> {
        let path = self.project_path(project)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.read_document(&path)? {
            ReadOutcome::Missing => Ok(BTreeMap::new()),
            ReadOutcome::Readable(document) => Ok(decode_records(&path, document.records)),
            ReadOutcome::Unreadable(reason) => {
                warn!("ignoring unreadable project file {}: {reason}", path.display());
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_record(
        &self,
        project: &str,
        id: &ImageId,
        record: &StoredRecord,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(record)?;
        self.update(project, |records| {
            records.insert(id.clone(), value);
        })
    }

    fn remove_record(&self, project: &str, id: &ImageId) -> Result<(), StoreError> {
        self.update(project, |records| {
            records.remove(id);
        })
    }

    fn delete_project(&self, project: &str) -> Result<(), StoreError> {
        let path = self.project_path(project)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
