//! Batch export: cut every tagged photo to its print size.
//!
//! For each exportable record (tagged or already exported), in `ImageId`
//! order:
//!
//! 1. **Cancel check.** A cancelled run leaves the remaining photos alone.
//! 2. **Decode** the source through the backend and confirm its dimensions
//!    still match the loaded record (a file edited after loading fails
//!    with [`ExportError::SourceChanged`] rather than being cut with stale
//!    geometry).
//! 3. **Resolve** the crop with [`CropEngine`]. Saliency fallbacks are
//!    logged here, not treated as failures.
//! 4. **Write** `<output>/<group>/<size>/<stem>.jpg` through the backend.
//! 5. **Mark exported** on the project (write-through).
//!
//! Photos are processed in parallel with rayon; each worker reads an
//! immutable snapshot of its record. A failure at any step is recorded in
//! the [`ExportReport`] and the batch carries on. Progress is streamed as
//! [`ExportEvent`]s when a sender is supplied.

use crate::config::ExportConfig;
use crate::geometry::ImageRect;
use crate::imaging::{CropParams, Dimensions, ImageBackend, Quality};
use crate::project::Project;
use crate::resolve::{CropEngine, CropSource, Saliency};
use crate::tag::{ImageId, ImageRecord, TagError};
use log::{info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Source changed since it was loaded: expected {expected}, found {found}")]
    SourceChanged {
        expected: Dimensions,
        found: Dimensions,
    },
    #[error(transparent)]
    Resolve(#[from] TagError),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("Output {path} is also written by {other}")]
    OutputCollision { path: PathBuf, other: ImageId },
    #[error("Could not record export: {0}")]
    Persist(String),
}

/// Cooperative cancellation shared between the caller and export workers.
///
/// Checked once per photo, before any work on it starts, so a photo is
/// either fully exported or untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub output_root: PathBuf,
    pub quality: Quality,
    pub stamp: bool,
}

impl ExportOptions {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            quality: Quality::default(),
            stamp: false,
        }
    }

    pub fn from_config(output_root: impl Into<PathBuf>, config: &ExportConfig) -> Self {
        Self {
            output_root: output_root.into(),
            quality: Quality::new(config.quality),
            stamp: config.date_stamp,
        }
    }
}

/// Progress events emitted during export.
#[derive(Debug, Clone)]
pub enum ExportEvent {
    Started { total: usize },
    Exported(ExportedImage),
    Failed { id: ImageId, error: ExportError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportedImage {
    pub id: ImageId,
    pub output: PathBuf,
    pub crop: ImageRect,
    pub source: CropSource,
}

/// Outcome of one export run. Every exportable photo lands in exactly one
/// list; each list is sorted by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    pub exported: Vec<ExportedImage>,
    pub failed: Vec<(ImageId, ExportError)>,
    pub cancelled: Vec<ImageId>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    pub fn total(&self) -> usize {
        self.exported.len() + self.failed.len() + self.cancelled.len()
    }
}

/// Where a tagged photo's print is written: `<root>/<group>/<size>/<stem>.jpg`.
///
/// Returns `None` for records without a full size tag.
pub fn output_path(root: &Path, record: &ImageRecord) -> Option<PathBuf> {
    let tag = record.tag();
    let (group, size) = (tag.group()?, tag.size()?);
    Some(
        root.join(group)
            .join(size)
            .join(format!("{}.jpg", record.id().file_stem())),
    )
}

enum Outcome {
    Exported(ExportedImage),
    Failed(ExportError),
    Cancelled,
}

/// Pair each record with its output path; later records that would
/// overwrite an earlier one's output get the collision error instead.
fn plan_outputs(
    records: Vec<ImageRecord>,
    root: &Path,
) -> Vec<(ImageRecord, Result<PathBuf, ExportError>)> {
    let mut claimed: HashMap<PathBuf, ImageId> = HashMap::new();
    records
        .into_iter()
        .map(|record| {
            let planned = match output_path(root, &record) {
                None => Err(ExportError::Resolve(TagError::Untagged(record.id().clone()))),
                Some(path) => match claimed.get(&path) {
                    Some(other) => Err(ExportError::OutputCollision {
                        path,
                        other: other.clone(),
                    }),
                    None => {
                        claimed.insert(path.clone(), record.id().clone());
                        Ok(path)
                    }
                },
            };
            (record, planned)
        })
        .collect()
}

fn export_one(
    project: &Project,
    engine: &CropEngine<'_>,
    backend: &dyn ImageBackend,
    record: &ImageRecord,
    output: PathBuf,
    options: &ExportOptions,
) -> Result<ExportedImage, ExportError> {
    let source = project.source_path(record.id());
    let image = backend
        .decode(&source)
        .map_err(|e| ExportError::Decode(e.to_string()))?;

    let found = Dimensions {
        width: image.width(),
        height: image.height(),
    };
    if found != record.native() {
        return Err(ExportError::SourceChanged {
            expected: record.native(),
            found,
        });
    }

    let resolved = engine.resolve(record, &image)?;
    if let CropSource::Fallback(reason) = &resolved.source {
        warn!(
            "{}: automatic crop unavailable ({reason}); using centered crop",
            record.id()
        );
    }

    let params = CropParams {
        source,
        output: output.clone(),
        crop: resolved.rect,
        quality: options.quality,
        stamp: options.stamp,
    };
    backend
        .write_crop(&image, &params)
        .map_err(|e| ExportError::Encode(e.to_string()))?;

    project
        .mark_exported(record.id())
        .map_err(|e| ExportError::Persist(e.to_string()))?;

    Ok(ExportedImage {
        id: record.id().clone(),
        output,
        crop: resolved.rect,
        source: resolved.source,
    })
}

/// Export every tagged photo of `project`. Never fails as a whole; see
/// the [module docs](self) for the per-photo steps.
pub fn export_project(
    project: &Project,
    backend: &dyn ImageBackend,
    saliency: &dyn Saliency,
    options: &ExportOptions,
    cancel: &CancelToken,
    events: Option<Sender<ExportEvent>>,
) -> ExportReport {
    let catalog = project.catalog();
    let engine = CropEngine::new(&catalog, *project.settings(), backend, saliency);
    let plans = plan_outputs(project.exportable(), &options.output_root);

    let emit = |event: ExportEvent| {
        if let Some(tx) = &events {
            tx.send(event).ok();
        }
    };
    emit(ExportEvent::Started { total: plans.len() });
    info!(
        "exporting {} photos to {}",
        plans.len(),
        options.output_root.display()
    );

    let outcomes: Vec<(ImageId, Outcome)> = plans
        .into_par_iter()
        .map(|(record, planned)| {
            let id = record.id().clone();
            if cancel.is_cancelled() {
                return (id, Outcome::Cancelled);
            }
            let result = planned.and_then(|output| {
                export_one(project, &engine, backend, &record, output, options)
            });
            match result {
                Ok(exported) => {
                    emit(ExportEvent::Exported(exported.clone()));
                    (id, Outcome::Exported(exported))
                }
                Err(error) => {
                    warn!("{id}: export failed: {error}");
                    emit(ExportEvent::Failed {
                        id: id.clone(),
                        error: error.clone(),
                    });
                    (id, Outcome::Failed(error))
                }
            }
        })
        .collect();

    let mut report = ExportReport::default();
    for (id, outcome) in outcomes {
        match outcome {
            Outcome::Exported(exported) => report.exported.push(exported),
            Outcome::Failed(error) => report.failed.push((id, error)),
            Outcome::Cancelled => report.cancelled.push(id),
        }
    }
    info!(
        "export finished: {} written, {} failed, {} cancelled",
        report.exported.len(),
        report.failed.len(),
        report.cancelled.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::AnalysisRect;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::resolve::SaliencyError;
    use crate::tag::Status;
    use crate::test_helpers::ProjectFixture;
    use image::DynamicImage;

    fn id(s: &str) -> ImageId {
        ImageId::new(s)
    }

    /// Saliency stub: the largest window of the target ratio, top-left.
    fn left_window(image: &DynamicImage, ratio: f64) -> Result<AnalysisRect, SaliencyError> {
        let (w, h) = (image.width() as f64, image.height() as f64);
        let (ww, wh) = if h * ratio <= w {
            (h * ratio, h)
        } else {
            (w, w / ratio)
        };
        Ok(AnalysisRect::new(0, 0, ww.round() as i32, wh.round() as i32))
    }

    fn failing(_: &DynamicImage, _: f64) -> Result<AnalysisRect, SaliencyError> {
        Err(SaliencyError::Failed("model missing".into()))
    }

    fn tag_all(project: &Project, names: &[&str], group: &str, size: &str) {
        for name in names {
            project.set_tags(&id(name), group, size).unwrap();
        }
    }

    fn export(fixture: &ProjectFixture, project: &Project) -> ExportReport {
        export_project(
            project,
            &fixture.backend,
            &left_window,
            &ExportOptions::new(fixture.output_dir()),
            &CancelToken::new(),
            None,
        )
    }

    // =========================================================================
    // Happy path
    // =========================================================================

    #[test]
    fn exports_tagged_photos_to_group_size_paths() {
        let fixture = ProjectFixture::new(&["a.jpg", "b.png", "c.jpg"]);
        let project = fixture.open();
        project.set_tags(&id("a.jpg"), "Album", "4x6").unwrap();
        project.set_tags(&id("b.png"), "Travel", "Square").unwrap();
        project.set_size_group(&id("c.jpg"), "Album").unwrap();

        let report = export(&fixture, &project);

        assert!(report.is_complete());
        assert_eq!(report.exported.len(), 2);
        assert_eq!(
            report.exported[0].output,
            fixture.output_dir().join("Album/4x6/a.jpg")
        );
        assert_eq!(
            report.exported[1].output,
            fixture.output_dir().join("Travel/Square/b.jpg")
        );
        // 4000x3000 → 600x450 analysis, 600x400 window scaled back by 4000/600
        assert_eq!(report.exported[0].crop, ImageRect::new(0, 0, 4000, 2667));
        assert_eq!(report.exported[1].crop, ImageRect::new(0, 0, 3000, 3000));
        assert_eq!(report.exported[0].source, CropSource::Saliency);

        assert_eq!(project.record(&id("a.jpg")).unwrap().status(), Status::Exported);
        assert_eq!(project.record(&id("c.jpg")).unwrap().status(), Status::Partial);
        assert!(fixture.store.stored("test", "a.jpg").unwrap().is_cropped);
    }

    #[test]
    fn write_params_carry_quality_and_stamp() {
        let fixture = ProjectFixture::new(&["a.jpg"]);
        let project = fixture.open();
        tag_all(&project, &["a.jpg"], "Album", "5x7");

        let options = ExportOptions {
            output_root: fixture.output_dir(),
            quality: Quality::new(80),
            stamp: true,
        };
        export_project(
            &project,
            &fixture.backend,
            &left_window,
            &options,
            &CancelToken::new(),
            None,
        );

        let writes = fixture.backend.writes();
        assert_eq!(writes.len(), 1);
        assert!(matches!(
            &writes[0],
            RecordedOp::WriteCrop { source, quality: 80, stamp: true, .. } if source == "a.jpg"
        ));
    }

    #[test]
    fn manual_crop_is_used_verbatim() {
        let fixture = ProjectFixture::new(&["a.jpg"]);
        let project = fixture.open();
        tag_all(&project, &["a.jpg"], "Album", "4x6");
        let manual = project
            .set_crop_box(&id("a.jpg"), ImageRect::new(300, 200, 1500, 1000))
            .unwrap();

        let report = export(&fixture, &project);
        assert_eq!(report.exported[0].crop, manual);
        assert_eq!(report.exported[0].source, CropSource::Manual);
        assert!(
            !fixture
                .backend
                .get_operations()
                .iter()
                .any(|op| matches!(op, RecordedOp::Downscale { .. }))
        );
    }

    #[test]
    fn saliency_failure_falls_back_and_still_exports() {
        let fixture = ProjectFixture::new(&["a.jpg"]);
        let project = fixture.open();
        tag_all(&project, &["a.jpg"], "Album", "4x6");

        let report = export_project(
            &project,
            &fixture.backend,
            &failing,
            &ExportOptions::new(fixture.output_dir()),
            &CancelToken::new(),
            None,
        );
        assert!(report.is_complete());
        assert_eq!(report.exported[0].crop, ImageRect::new(0, 166, 4000, 2667));
        assert!(matches!(report.exported[0].source, CropSource::Fallback(_)));
    }

    #[test]
    fn already_exported_photos_are_exported_again() {
        let fixture = ProjectFixture::new(&["a.jpg"]);
        let project = fixture.open();
        tag_all(&project, &["a.jpg"], "Album", "4x6");
        export(&fixture, &project);
        let report = export(&fixture, &project);
        assert_eq!(report.exported.len(), 1);
        assert_eq!(fixture.backend.writes().len(), 2);
    }

    // =========================================================================
    // Failure isolation
    // =========================================================================

    #[test]
    fn one_encode_failure_does_not_abort_batch() {
        let backend = MockBackend::new().failing_write("b.jpg");
        let fixture = ProjectFixture::with_backend(&["a.jpg", "b.jpg", "c.jpg"], backend);
        let project = fixture.open();
        tag_all(&project, &["a.jpg", "b.jpg", "c.jpg"], "Album", "4x6");

        let report = export(&fixture, &project);

        assert_eq!(report.exported.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, id("b.jpg"));
        assert!(matches!(report.failed[0].1, ExportError::Encode(_)));
        assert!(project.record(&id("a.jpg")).unwrap().is_cropped());
        assert!(!project.record(&id("b.jpg")).unwrap().is_cropped());
        assert!(project.record(&id("c.jpg")).unwrap().is_cropped());
    }

    #[test]
    fn changed_source_dimensions_fail_that_photo() {
        let backend = MockBackend::new().decoding_as(
            "a.jpg",
            Dimensions {
                width: 3000,
                height: 4000,
            },
        );
        let fixture = ProjectFixture::with_backend(&["a.jpg", "b.jpg"], backend);
        let project = fixture.open();
        tag_all(&project, &["a.jpg", "b.jpg"], "Album", "4x6");

        let report = export(&fixture, &project);
        assert_eq!(report.exported.len(), 1);
        assert!(matches!(
            report.failed[0].1,
            ExportError::SourceChanged { found: Dimensions { width: 3000, .. }, .. }
        ));
        assert_eq!(fixture.backend.writes().len(), 1);
    }

    #[test]
    fn same_stem_in_same_size_collides() {
        let fixture = ProjectFixture::new(&["a.jpg", "a.png"]);
        let project = fixture.open();
        tag_all(&project, &["a.jpg", "a.png"], "Album", "4x6");

        let report = export(&fixture, &project);
        assert_eq!(report.exported.len(), 1);
        assert_eq!(report.exported[0].id, id("a.jpg"));
        assert!(matches!(
            &report.failed[0],
            (failed, ExportError::OutputCollision { other, .. })
                if *failed == id("a.png") && *other == id("a.jpg")
        ));
    }

    #[test]
    fn persist_failure_is_reported() {
        let fixture = ProjectFixture::new(&["a.jpg"]);
        let project = fixture.open();
        tag_all(&project, &["a.jpg"], "Album", "4x6");
        fixture.store.set_failing(true);

        let report = export(&fixture, &project);
        assert!(matches!(report.failed[0].1, ExportError::Persist(_)));
        assert!(!project.record(&id("a.jpg")).unwrap().is_cropped());
    }

    // =========================================================================
    // Cancellation and events
    // =========================================================================

    #[test]
    fn cancelled_before_start_touches_nothing() {
        let fixture = ProjectFixture::new(&["a.jpg", "b.jpg"]);
        let project = fixture.open();
        tag_all(&project, &["a.jpg", "b.jpg"], "Album", "4x6");

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = export_project(
            &project,
            &fixture.backend,
            &left_window,
            &ExportOptions::new(fixture.output_dir()),
            &cancel,
            None,
        );
        assert_eq!(report.cancelled, vec![id("a.jpg"), id("b.jpg")]);
        assert!(fixture.backend.writes().is_empty());
        assert_eq!(project.status_counts().exported, 0);
    }

    #[test]
    fn cancel_between_photos_keeps_finished_ones() {
        let fixture = ProjectFixture::new(&["a.jpg", "b.jpg", "c.jpg"]);
        let project = fixture.open();
        tag_all(&project, &["a.jpg", "b.jpg", "c.jpg"], "Album", "4x6");

        let cancel = CancelToken::new();
        let cancel_after_first = |image: &DynamicImage,
                                  ratio: f64|
         -> Result<AnalysisRect, SaliencyError> {
            cancel.cancel();
            left_window(image, ratio)
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap();
        let report = pool.install(|| {
            export_project(
                &project,
                &fixture.backend,
                &cancel_after_first,
                &ExportOptions::new(fixture.output_dir()),
                &cancel,
                None,
            )
        });

        assert_eq!(report.exported.len(), 1);
        assert_eq!(report.cancelled, vec![id("b.jpg"), id("c.jpg")]);
        assert!(project.record(&id("a.jpg")).unwrap().is_cropped());
        assert!(!project.record(&id("b.jpg")).unwrap().is_cropped());
    }

    #[test]
    fn events_report_start_and_each_photo() {
        let backend = MockBackend::new().failing_write("b.jpg");
        let fixture = ProjectFixture::with_backend(&["a.jpg", "b.jpg"], backend);
        let project = fixture.open();
        tag_all(&project, &["a.jpg", "b.jpg"], "Album", "4x6");

        let (tx, rx) = std::sync::mpsc::channel();
        export_project(
            &project,
            &fixture.backend,
            &left_window,
            &ExportOptions::new(fixture.output_dir()),
            &CancelToken::new(),
            Some(tx),
        );
        let events: Vec<ExportEvent> = rx.iter().collect();

        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ExportEvent::Started { total: 2 }));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ExportEvent::Exported(_)))
                .count(),
            1
        );
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ExportEvent::Failed { id: failed, .. } if *failed == id("b.jpg")))
        );
    }

    #[test]
    fn output_path_requires_full_tag() {
        let fixture = ProjectFixture::new(&["dir.photo.jpeg"]);
        let project = fixture.open();
        let root = Path::new("/out");
        let record = project.record(&id("dir.photo.jpeg")).unwrap();
        assert_eq!(output_path(root, &record), None);

        project.set_tags(&id("dir.photo.jpeg"), "Travel", "9x6").unwrap();
        let record = project.record(&id("dir.photo.jpeg")).unwrap();
        assert_eq!(
            output_path(root, &record),
            Some(PathBuf::from("/out/Travel/9x6/dir.photo.jpg"))
        );
    }
}
