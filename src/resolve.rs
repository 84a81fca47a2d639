//! Crop resolution: the rectangle each photo is cut to at export time.
//!
//! ```text
//! record ── crop box set? ──yes──▶ Manual (returned as stored)
//!               │ no
//!               ▼
//!       target ratio from the size tag
//!               │
//!       native long edge > analysis_max_edge? ──yes──▶ downscale (backend)
//!               │                                         │
//!               ▼                                         ▼
//!       saliency.suggest_crop(analysis image, ratio)  ◀───┘
//!               │ ok                      │ err / degenerate
//!               ▼                         ▼
//!       scale back × factor        Fallback: largest centered
//!       clamp to native bounds     rectangle with the ratio
//!       repair ratio (center)
//!               │
//!               ▼
//!           Saliency
//! ```
//!
//! Saliency failure is never an error here: the fallback always yields a
//! usable rectangle, and the failure travels in [`CropSource::Fallback`]
//! so the caller decides whether to log it.

use crate::catalog::SizeCatalog;
use crate::geometry::{
    AnalysisRect, Anchor, ImageRect, clamp_to_bounds, constrain_ratio, largest_rect_with_ratio,
    ratio_matches,
};
use crate::imaging::ImageBackend;
use crate::imaging::calculations::analysis_dimensions;
use crate::tag::{CropSettings, ImageRecord, Tag, TagError};
use crate::transform::analysis_to_image;
use image::DynamicImage;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaliencyError {
    #[error("Image {width}x{height} is too small for ratio {ratio:.3}")]
    ImageTooSmall { width: u32, height: u32, ratio: f64 },
    #[error("Saliency returned an empty rectangle {0}")]
    Degenerate(AnalysisRect),
    #[error("Could not prepare analysis image: {0}")]
    Downscale(String),
    #[error("Saliency failed: {0}")]
    Failed(String),
}

/// Scores sub-rectangles of an image and suggests the best crop.
///
/// `suggest_crop` receives the analysis image and returns a rectangle in
/// that image's pixel space whose ratio is close to `target_ratio`.
/// Any closure with the same signature is a `Saliency`.
pub trait Saliency: Sync {
    fn suggest_crop(
        &self,
        image: &DynamicImage,
        target_ratio: f64,
    ) -> Result<AnalysisRect, SaliencyError>;
}

impl<F> Saliency for F
where
    F: Fn(&DynamicImage, f64) -> Result<AnalysisRect, SaliencyError> + Sync,
{
    fn suggest_crop(
        &self,
        image: &DynamicImage,
        target_ratio: f64,
    ) -> Result<AnalysisRect, SaliencyError> {
        self(image, target_ratio)
    }
}

/// Where a resolved crop came from.
#[derive(Debug, Clone, PartialEq)]
pub enum CropSource {
    /// The record's manual crop box.
    Manual,
    /// The saliency strategy's suggestion, scaled to image space.
    Saliency,
    /// The centered fallback, after the saliency strategy failed.
    Fallback(SaliencyError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCrop {
    /// Always inside the native bounds, never degenerate.
    pub rect: ImageRect,
    pub source: CropSource,
}

/// Resolves the authoritative crop for tagged records.
pub struct CropEngine<'a> {
    catalog: &'a SizeCatalog,
    settings: CropSettings,
    backend: &'a dyn ImageBackend,
    saliency: &'a dyn Saliency,
}

impl<'a> CropEngine<'a> {
    pub fn new(
        catalog: &'a SizeCatalog,
        settings: CropSettings,
        backend: &'a dyn ImageBackend,
        saliency: &'a dyn Saliency,
    ) -> Self {
        Self {
            catalog,
            settings,
            backend,
            saliency,
        }
    }

    /// Resolve the crop for `record`, given its decoded full-resolution image.
    ///
    /// Deterministic: an unmodified record and image always resolve to the
    /// same rectangle (given a deterministic saliency strategy). Fails only
    /// when the record has no usable size tag.
    pub fn resolve(
        &self,
        record: &ImageRecord,
        full_image: &DynamicImage,
    ) -> Result<ResolvedCrop, TagError> {
        if let Some(rect) = record.crop_box() {
            return Ok(ResolvedCrop {
                rect,
                source: CropSource::Manual,
            });
        }

        let ratio = self.target_ratio(record)?;
        let bounds = record.native_bounds();
        match self.suggest(record, full_image, ratio, bounds) {
            Ok(rect) => Ok(ResolvedCrop {
                rect,
                source: CropSource::Saliency,
            }),
            Err(error) => Ok(ResolvedCrop {
                rect: largest_rect_with_ratio(bounds, ratio),
                source: CropSource::Fallback(error),
            }),
        }
    }

    fn target_ratio(&self, record: &ImageRecord) -> Result<f64, TagError> {
        match record.tag() {
            Tag::Full { group, size } => {
                self.catalog
                    .ratio_of(group, size)
                    .ok_or_else(|| TagError::InvalidSize {
                        group: group.clone(),
                        size: size.clone(),
                    })
            }
            _ => Err(TagError::Untagged(record.id().clone())),
        }
    }

    fn suggest(
        &self,
        record: &ImageRecord,
        full_image: &DynamicImage,
        ratio: f64,
        bounds: ImageRect,
    ) -> Result<ImageRect, SaliencyError> {
        let (analysis_size, factor) =
            analysis_dimensions(record.native(), self.settings.analysis_max_edge);
        let analysis: Cow<'_, DynamicImage> = if analysis_size == record.native() {
            Cow::Borrowed(full_image)
        } else {
            Cow::Owned(
                self.backend
                    .downscale(full_image, analysis_size)
                    .map_err(|e| SaliencyError::Downscale(e.to_string()))?,
            )
        };

        let suggested = self.saliency.suggest_crop(&analysis, ratio)?;
        if suggested.is_degenerate() {
            return Err(SaliencyError::Degenerate(suggested));
        }

        let mut rect = clamp_to_bounds(analysis_to_image(suggested, factor), bounds);
        if !ratio_matches(&rect, ratio, self.settings.ratio_tolerance) {
            rect = constrain_ratio(rect, ratio, Anchor::Center);
        }
        if rect.is_degenerate() {
            return Err(SaliencyError::Degenerate(suggested));
        }
        Ok(rect)
    }
}
