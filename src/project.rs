//! A project: one input directory of photos and their tag/crop records.
//!
//! ## Loading
//!
//! [`Project::open`] scans the input directory (top level only, photo
//! extensions only, sorted by name), reads each file's dimensions through
//! the image backend, fingerprints its contents with SHA-256, and merges
//! whatever the [`RecordStore`] holds for the project:
//!
//! | Stored state | Result |
//! |---|---|
//! | none | fresh untagged record |
//! | valid against the catalog | restored as-is |
//! | violates a record invariant | tags and crop dropped, `is_cropped` kept |
//! | fingerprint differs from the file | crop dropped, tags kept |
//! | file no longer present | stored record removed |
//! | file present but unreadable | skipped; stored and in-memory record left alone |
//!
//! One bad record never blocks the rest; every repair is listed in the
//! returned [`LoadReport`]. Native dimensions always come from the file,
//! never from storage.
//!
//! ## Mutations
//!
//! Every mutation locks the project, applies the change to a copy of the
//! record, writes the copy through to the store, and only then commits it
//! in memory. A validation error or a failed write leaves both memory and
//! storage untouched, and the lock linearizes concurrent edits.
//! [`Project::rescan`] takes the same lock for its merge, after the files
//! have been inspected.

use crate::catalog::SizeCatalog;
use crate::config::ScanConfig;
use crate::geometry::ImageRect;
use crate::imaging::{Dimensions, ImageBackend};
use crate::store::{RecordStore, StoreError, StoredRecord};
use crate::tag::{CorruptStateError, CropSettings, ImageId, ImageRecord, Status, TagError};
use log::{debug, info, warn};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Tag(#[from] TagError),
    #[error("Input directory not found: {0}")]
    InputNotFound(PathBuf),
    #[error("No image {0} in this project")]
    UnknownImage(ImageId),
}

/// Where a project's photos live and which files count as photos.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectOptions {
    pub name: String,
    pub input_dir: PathBuf,
    /// Lowercase extensions without the dot.
    pub extensions: Vec<String>,
}

impl ProjectOptions {
    pub fn new(name: impl Into<String>, input_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            input_dir: input_dir.into(),
            extensions: ScanConfig::default().extensions,
        }
    }

    pub fn with_extensions(mut self, extensions: &[String]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_lowercase()).collect();
        self
    }
}

/// Why a stored record was changed while loading.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairReason {
    /// The stored fields broke a record invariant; tags and crop were reset.
    Corrupt(CorruptStateError),
    /// The file changed since the crop was placed; the crop was dropped.
    SourceChanged,
}

impl fmt::Display for RepairReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairReason::Corrupt(e) => write!(f, "{e}"),
            RepairReason::SourceChanged => f.write_str("file changed, crop dropped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Repair {
    pub id: ImageId,
    pub reason: RepairReason,
}

/// What loading or rescanning a project found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Photos seen for the first time.
    pub added: Vec<ImageId>,
    pub repaired: Vec<Repair>,
    /// Photos that could not be identified or read, with the reason.
    pub unreadable: Vec<(ImageId, String)>,
    /// Records dropped because their file disappeared.
    pub removed: Vec<ImageId>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.repaired.is_empty() && self.unreadable.is_empty() && self.removed.is_empty()
    }
}

/// Number of records in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub untagged: usize,
    pub partial: usize,
    pub tagged: usize,
    pub exported: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.untagged + self.partial + self.tagged + self.exported
    }
}

struct ProjectState {
    catalog: Arc<SizeCatalog>,
    records: BTreeMap<ImageId, ImageRecord>,
}

pub struct Project {
    name: String,
    input_dir: PathBuf,
    extensions: Vec<String>,
    settings: CropSettings,
    store: Arc<dyn RecordStore>,
    state: Mutex<ProjectState>,
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

fn has_photo_extension(path: &Path, extensions: &[String]) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
}

/// List photo files directly inside `input_dir`, sorted by file name.
pub fn scan_photos(
    input_dir: &Path,
    extensions: &[String],
) -> Result<Vec<(ImageId, PathBuf)>, ProjectError> {
    if !input_dir.is_dir() {
        return Err(ProjectError::InputNotFound(input_dir.to_path_buf()));
    }
    let mut photos = Vec::new();
    for entry in WalkDir::new(input_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if !has_photo_extension(&path, extensions) {
            continue;
        }
        let Some(id) = path
            .strip_prefix(input_dir)
            .ok()
            .and_then(ImageId::from_relative)
        else {
            debug!("skipping {}: name is not valid UTF-8", path.display());
            continue;
        };
        photos.push((id, path));
    }
    Ok(photos)
}

/// Result of merging the files on disk with previously known state.
struct Reconciled {
    records: BTreeMap<ImageId, ImageRecord>,
    report: LoadReport,
    writes: Vec<(ImageId, StoredRecord)>,
}

/// Native dimensions and fingerprint of one file, or why they could not
/// be read.
type Inspection = Result<(Dimensions, String), String>;

/// Identify and hash every file. This is the slow part of loading and runs
/// without the project lock.
fn inspect_files(
    files: &[(ImageId, PathBuf)],
    backend: &dyn ImageBackend,
) -> Vec<(ImageId, Inspection)> {
    files
        .par_iter()
        .map(|(id, path)| {
            let inspection = backend
                .identify(path)
                .map_err(|e| e.to_string())
                .and_then(|dims| hash_file(path).map(|h| (dims, h)).map_err(|e| e.to_string()));
            (id.clone(), inspection)
        })
        .collect()
}

fn reconcile(
    inspected: &[(ImageId, Inspection)],
    previous: &BTreeMap<ImageId, StoredRecord>,
    catalog: &SizeCatalog,
    settings: &CropSettings,
) -> Reconciled {
    let mut out = Reconciled {
        records: BTreeMap::new(),
        report: LoadReport::default(),
        writes: Vec::new(),
    };

    for (id, inspection) in inspected {
        let (native, fingerprint) = match inspection {
            Ok((native, fingerprint)) => (*native, fingerprint.clone()),
            Err(reason) => {
                warn!("cannot read {id}: {reason}");
                out.report.unreadable.push((id.clone(), reason.clone()));
                continue;
            }
        };

        let Some(stored) = previous.get(id) else {
            out.report.added.push(id.clone());
            out.records
                .insert(id.clone(), ImageRecord::new(id.clone(), native, Some(fingerprint)));
            continue;
        };

        let mut candidate = stored.clone();
        let source_changed = stored
            .fingerprint
            .as_ref()
            .is_some_and(|old| *old != fingerprint);
        if source_changed && candidate.crop_box.take().is_some() {
            warn!("{id} changed on disk; dropping its crop box");
            out.report.repaired.push(Repair {
                id: id.clone(),
                reason: RepairReason::SourceChanged,
            });
        }

        let record = match ImageRecord::restore(
            id.clone(),
            &candidate,
            native,
            Some(fingerprint.clone()),
            catalog,
            settings,
        ) {
            Ok(record) => record,
            Err(e) => {
                warn!("resetting tags: {e}");
                out.report.repaired.push(Repair {
                    id: id.clone(),
                    reason: RepairReason::Corrupt(e),
                });
                let mut fresh = ImageRecord::new(id.clone(), native, Some(fingerprint));
                if stored.is_cropped {
                    fresh.mark_exported();
                }
                fresh
            }
        };

        let stored_now = record.to_stored();
        if stored_now != *stored {
            out.writes.push((id.clone(), stored_now));
        }
        out.records.insert(id.clone(), record);
    }
    out
}

impl Project {
    /// Scan the input directory and merge stored state.
    pub fn open(
        options: ProjectOptions,
        catalog: Arc<SizeCatalog>,
        settings: CropSettings,
        store: Arc<dyn RecordStore>,
        backend: &dyn ImageBackend,
    ) -> Result<(Self, LoadReport), ProjectError> {
        let files = scan_photos(&options.input_dir, &options.extensions)?;
        debug!(
            "found {} photos in {}",
            files.len(),
            options.input_dir.display()
        );
        let stored = store.load_project(&options.name)?;
        let inspected = inspect_files(&files, backend);

        let project = Self {
            name: options.name,
            input_dir: options.input_dir,
            extensions: options.extensions,
            settings,
            store,
            state: Mutex::new(ProjectState {
                catalog,
                records: BTreeMap::new(),
            }),
        };
        let report = {
            let mut state = project.lock();
            let reconciled = reconcile(&inspected, &stored, &state.catalog, &project.settings);
            project.commit_reconciled(&mut state, reconciled, &files, stored.keys())?
        };
        info!(
            "opened project {} with {} photos",
            project.name,
            project.lock().records.len()
        );
        Ok((project, report))
    }

    /// Re-scan the input directory: pick up new photos, forget deleted
    /// ones, and drop crops of photos that changed on disk.
    ///
    /// Files are inspected without the lock; the merge runs under it against
    /// the records as they are at that point, so edits made while the
    /// inspection was running are kept.
    pub fn rescan(&self, backend: &dyn ImageBackend) -> Result<LoadReport, ProjectError> {
        let files = scan_photos(&self.input_dir, &self.extensions)?;
        let inspected = inspect_files(&files, backend);

        let mut state = self.lock();
        let previous: BTreeMap<ImageId, StoredRecord> = state
            .records
            .iter()
            .map(|(id, r)| (id.clone(), r.to_stored()))
            .collect();
        let reconciled = reconcile(&inspected, &previous, &state.catalog, &self.settings);
        self.commit_reconciled(&mut state, reconciled, &files, previous.keys())
    }

    /// Persist the outcome of a reconcile pass, then install its records.
    ///
    /// Runs under the project lock. A file that could not be read keeps
    /// whatever record memory already had for it.
    fn commit_reconciled<'a>(
        &self,
        state: &mut ProjectState,
        reconciled: Reconciled,
        files: &[(ImageId, PathBuf)],
        known: impl Iterator<Item = &'a ImageId>,
    ) -> Result<LoadReport, ProjectError> {
        let Reconciled {
            mut records,
            mut report,
            writes,
        } = reconciled;

        for (id, stored) in &writes {
            self.store.write_record(&self.name, id, stored)?;
        }

        let on_disk: BTreeSet<&ImageId> = files.iter().map(|(id, _)| id).collect();
        for id in known {
            if !on_disk.contains(id) {
                self.store.remove_record(&self.name, id)?;
                info!("{id} is gone from {}; forgetting it", self.input_dir.display());
                report.removed.push(id.clone());
            }
        }

        for (id, _) in &report.unreadable {
            if let Some(record) = state.records.remove(id) {
                records.insert(id.clone(), record);
            }
        }
        state.records = records;
        Ok(report)
    }

    fn lock(&self) -> MutexGuard<'_, ProjectState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to one record and write it through before committing.
    fn mutate<T>(
        &self,
        id: &ImageId,
        change: impl FnOnce(&mut ImageRecord, &SizeCatalog, &CropSettings) -> Result<T, TagError>,
    ) -> Result<T, ProjectError> {
        let mut state = self.lock();
        let current = state
            .records
            .get(id)
            .ok_or_else(|| ProjectError::UnknownImage(id.clone()))?;
        let mut updated = current.clone();
        let out = change(&mut updated, &state.catalog, &self.settings)?;
        self.store
            .write_record(&self.name, id, &updated.to_stored())?;
        state.records.insert(id.clone(), updated);
        Ok(out)
    }

    pub fn set_tags(&self, id: &ImageId, group: &str, size: &str) -> Result<(), ProjectError> {
        self.mutate(id, |r, catalog, settings| {
            r.set_tags(catalog, settings, group, size)
        })
    }

    pub fn set_size_group(&self, id: &ImageId, group: &str) -> Result<(), ProjectError> {
        self.mutate(id, |r, catalog, _| r.set_size_group(catalog, group))
    }

    pub fn clear_tags(&self, id: &ImageId) -> Result<(), ProjectError> {
        self.mutate(id, |r, _, _| {
            r.clear_tags();
            Ok(())
        })
    }

    /// Store a manual crop; returns the rectangle actually stored.
    pub fn set_crop_box(&self, id: &ImageId, rect: ImageRect) -> Result<ImageRect, ProjectError> {
        self.mutate(id, |r, catalog, settings| {
            r.set_crop_box(catalog, settings, rect)
        })
    }

    pub fn clear_crop_box(&self, id: &ImageId) -> Result<(), ProjectError> {
        self.mutate(id, |r, _, _| {
            r.clear_crop_box();
            Ok(())
        })
    }

    pub fn mark_exported(&self, id: &ImageId) -> Result<(), ProjectError> {
        self.mutate(id, |r, _, _| {
            r.mark_exported();
            Ok(())
        })
    }

    /// Swap in a reloaded catalog, re-validating every record against it.
    ///
    /// Records whose group disappeared become untagged, records whose size
    /// disappeared keep only their group, and crops that no longer match a
    /// changed ratio are dropped. Each change is persisted. Returns the ids
    /// that changed.
    pub fn replace_catalog(&self, catalog: Arc<SizeCatalog>) -> Result<Vec<ImageId>, ProjectError> {
        let mut state = self.lock();
        let mut changed = Vec::new();
        let ids: Vec<ImageId> = state.records.keys().cloned().collect();
        for id in ids {
            let Some(current) = state.records.get(&id) else {
                continue;
            };
            let mut updated = current.clone();
            if updated.reconcile(&catalog, &self.settings) {
                self.store
                    .write_record(&self.name, &id, &updated.to_stored())?;
                state.records.insert(id.clone(), updated);
                changed.push(id);
            }
        }
        state.catalog = catalog;
        if !changed.is_empty() {
            info!("catalog reload changed {} records", changed.len());
        }
        Ok(changed)
    }

    /// Forget the project's stored state.
    pub fn delete(self) -> Result<(), ProjectError> {
        self.store.delete_project(&self.name)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn settings(&self) -> &CropSettings {
        &self.settings
    }

    pub fn catalog(&self) -> Arc<SizeCatalog> {
        self.lock().catalog.clone()
    }

    pub fn source_path(&self, id: &ImageId) -> PathBuf {
        self.input_dir.join(id.as_str())
    }

    /// Snapshot of one record.
    pub fn record(&self, id: &ImageId) -> Option<ImageRecord> {
        self.lock().records.get(id).cloned()
    }

    /// Snapshot of all records, sorted by id.
    pub fn records(&self) -> Vec<ImageRecord> {
        self.lock().records.values().cloned().collect()
    }

    /// Snapshot of records ready for export (tagged or exported), sorted by id.
    pub fn exportable(&self) -> Vec<ImageRecord> {
        self.lock()
            .records
            .values()
            .filter(|r| matches!(r.status(), Status::Tagged | Status::Exported))
            .cloned()
            .collect()
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.lock().records.values() {
            match record.status() {
                Status::Untagged => counts.untagged += 1,
                Status::Partial => counts.partial += 1,
                Status::Tagged => counts.tagged += 1,
                Status::Exported => counts.exported += 1,
            }
        }
        counts
    }
}
