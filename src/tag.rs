//! Per-image tag and crop state.
//!
//! Every source photo has one [`ImageRecord`]. A record carries a [`Tag`]
//! (which size group and print size the photo is destined for), an optional
//! manual crop box in full-resolution image space, and whether it has been
//! exported at least once. Its [`Status`] is never stored; it is projected
//! from those fields on demand.
//!
//! ## Tag states
//!
//! ```text
//!              set_size_group            set_tags
//! Untagged ───────────────────▶ Partial ──────────▶ Full ──▶ (crop box allowed)
//!     ▲                            │                 │
//!     └──────── clear_tags ────────┴─────────────────┘
//! ```
//!
//! `Tag` is a closed sum type: a size without its group cannot be
//! represented, and `Full` is only constructed after the pair is checked
//! against the [`SizeCatalog`].
//!
//! ## Invariants held by every record
//!
//! - A crop box exists only under a `Full` tag.
//! - A crop box lies inside the native bounds and its aspect ratio is within
//!   `ratio_tolerance` of the tagged size's ratio.
//! - `is_cropped` only ever goes false → true, via [`ImageRecord::mark_exported`].
//!   Re-tagging or re-cropping an exported photo leaves it set: it means
//!   "exported at least once", not "the output is current".
//!
//! Every mutating method is all-or-nothing: on error the record is
//! unchanged.

use crate::catalog::SizeCatalog;
use crate::config::CropConfig;
use crate::geometry::{Anchor, ImageRect, constrain_ratio, clamp_to_bounds, ratio_matches};
use crate::imaging::Dimensions;
use crate::store::StoredRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};
use thiserror::Error;

/// Stable identity of a source photo: its path relative to the project's
/// input directory, with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an identity from a path relative to the input directory.
    ///
    /// Returns `None` for paths that escape the directory or are not UTF-8.
    pub fn from_relative(path: &Path) -> Option<Self> {
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?),
                Component::CurDir => {}
                _ => return None,
            }
        }
        (!parts.is_empty()).then(|| Self(parts.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name without directories or extension, used for output names.
    pub fn file_stem(&self) -> &str {
        let name = self.0.rsplit('/').next().unwrap_or(&self.0);
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which size group and print size a photo is tagged with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Tag {
    #[default]
    Untagged,
    /// Group chosen, size not yet.
    Partial { group: String },
    /// Group and a size that belongs to it.
    Full { group: String, size: String },
}

impl Tag {
    pub fn group(&self) -> Option<&str> {
        match self {
            Tag::Untagged => None,
            Tag::Partial { group } | Tag::Full { group, .. } => Some(group),
        }
    }

    pub fn size(&self) -> Option<&str> {
        match self {
            Tag::Full { size, .. } => Some(size),
            _ => None,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Tag::Full { .. })
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Untagged => f.write_str("-"),
            Tag::Partial { group } => write!(f, "{group}/?"),
            Tag::Full { group, size } => write!(f, "{group}/{size}"),
        }
    }
}

/// Derived lifecycle status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    Untagged,
    Partial,
    Tagged,
    Exported,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Untagged => "untagged",
            Status::Partial => "partial",
            Status::Tagged => "tagged",
            Status::Exported => "exported",
        })
    }
}

/// Validation errors from tag and crop mutations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TagError {
    #[error("Size {size:?} is not part of size group {group:?}")]
    InvalidSize { group: String, size: String },
    #[error("Unknown size group {0:?}")]
    UnknownSizeGroup(String),
    #[error("{0} has no size tag")]
    Untagged(ImageId),
    #[error("Crop {rect} is smaller than {min_area}px² inside the image")]
    OutOfBounds { rect: ImageRect, min_area: u32 },
}

/// A stored record that violates a record invariant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorruptStateError {
    #[error("{id}: size {size:?} stored without a size group")]
    SizeWithoutGroup { id: ImageId, size: String },
    #[error("{id}: unknown size group {group:?}")]
    UnknownGroup { id: ImageId, group: String },
    #[error("{id}: size {size:?} is not part of size group {group:?}")]
    InvalidSize {
        id: ImageId,
        group: String,
        size: String,
    },
    #[error("{id}: crop box {rect} stored without a size tag")]
    CropWithoutSize { id: ImageId, rect: ImageRect },
    #[error("{id}: crop box {rect} lies outside the {native} image")]
    CropOutOfBounds {
        id: ImageId,
        rect: ImageRect,
        native: Dimensions,
    },
    #[error("{id}: crop box {rect} does not match ratio {expected:.3}")]
    CropRatioMismatch {
        id: ImageId,
        rect: ImageRect,
        expected: f64,
    },
}

/// Numeric knobs for crop validation and analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropSettings {
    /// Relative ratio error tolerated before a crop counts as mismatched.
    pub ratio_tolerance: f64,
    /// Minimum area of a manual crop after clamping.
    pub min_area: u32,
    /// Longest edge of the saliency analysis copy.
    pub analysis_max_edge: u32,
}

impl Default for CropSettings {
    fn default() -> Self {
        Self::from(&CropConfig::default())
    }
}

impl From<&CropConfig> for CropSettings {
    fn from(config: &CropConfig) -> Self {
        Self {
            ratio_tolerance: config.ratio_tolerance,
            min_area: config.min_area,
            analysis_max_edge: config.analysis_max_edge,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    id: ImageId,
    tag: Tag,
    crop_box: Option<ImageRect>,
    is_cropped: bool,
    native: Dimensions,
    fingerprint: Option<String>,
}

impl ImageRecord {
    /// A fresh, untagged record for a newly scanned photo.
    pub fn new(id: ImageId, native: Dimensions, fingerprint: Option<String>) -> Self {
        Self {
            id,
            tag: Tag::Untagged,
            crop_box: None,
            is_cropped: false,
            native,
            fingerprint,
        }
    }

    pub fn id(&self) -> &ImageId {
        &self.id
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn crop_box(&self) -> Option<ImageRect> {
        self.crop_box
    }

    pub fn is_cropped(&self) -> bool {
        self.is_cropped
    }

    pub fn native(&self) -> Dimensions {
        self.native
    }

    pub fn native_bounds(&self) -> ImageRect {
        ImageRect::from_size(self.native.width, self.native.height)
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn status(&self) -> Status {
        match (&self.tag, self.is_cropped) {
            (Tag::Untagged, _) => Status::Untagged,
            (Tag::Partial { .. }, _) => Status::Partial,
            (Tag::Full { .. }, false) => Status::Tagged,
            (Tag::Full { .. }, true) => Status::Exported,
        }
    }

    /// Ratio of the tagged size, if the record is fully tagged with a
    /// pair the catalog still knows.
    pub fn size_ratio(&self, catalog: &SizeCatalog) -> Option<f64> {
        match &self.tag {
            Tag::Full { group, size } => catalog.ratio_of(group, size),
            _ => None,
        }
    }

    /// Tag with a group and a size belonging to it.
    ///
    /// A stored crop box whose ratio no longer matches the new size is
    /// dropped; the tag always wins over a stale manual crop.
    pub fn set_tags(
        &mut self,
        catalog: &SizeCatalog,
        settings: &CropSettings,
        group: &str,
        size: &str,
    ) -> Result<(), TagError> {
        let spec = catalog
            .group(group)
            .ok_or_else(|| TagError::UnknownSizeGroup(group.to_string()))?
            .size(size)
            .ok_or_else(|| TagError::InvalidSize {
                group: group.to_string(),
                size: size.to_string(),
            })?;

        if let Some(crop) = self.crop_box
            && !ratio_matches(&crop, spec.ratio, settings.ratio_tolerance)
        {
            self.crop_box = None;
        }
        self.tag = Tag::Full {
            group: group.to_string(),
            size: size.to_string(),
        };
        Ok(())
    }

    /// Tag with a group only, leaving the size undecided.
    ///
    /// Any crop box is dropped: without a size there is no ratio for it.
    pub fn set_size_group(&mut self, catalog: &SizeCatalog, group: &str) -> Result<(), TagError> {
        if catalog.group(group).is_none() {
            return Err(TagError::UnknownSizeGroup(group.to_string()));
        }
        self.tag = Tag::Partial {
            group: group.to_string(),
        };
        self.crop_box = None;
        Ok(())
    }

    /// Clear group, size, and crop box together.
    pub fn clear_tags(&mut self) {
        self.tag = Tag::Untagged;
        self.crop_box = None;
    }

    /// Store a manual crop box given in full-resolution image space.
    ///
    /// The rectangle is normalized and clamped into the native bounds, so a
    /// box straddling an edge is moved inside rather than rejected. Only a
    /// box whose clamped area falls below `min_area` is rejected. Rounding
    /// drift away from the size ratio is repaired around the box's center.
    /// Returns the rectangle actually stored.
    pub fn set_crop_box(
        &mut self,
        catalog: &SizeCatalog,
        settings: &CropSettings,
        rect: ImageRect,
    ) -> Result<ImageRect, TagError> {
        let Tag::Full { group, size } = &self.tag else {
            return Err(TagError::Untagged(self.id.clone()));
        };
        let ratio = catalog
            .ratio_of(group, size)
            .ok_or_else(|| TagError::InvalidSize {
                group: group.clone(),
                size: size.clone(),
            })?;

        let too_small = |r: &ImageRect| r.is_degenerate() || r.area() < settings.min_area as i64;
        let mut clamped = clamp_to_bounds(rect.normalized(), self.native_bounds());
        if !too_small(&clamped) && !ratio_matches(&clamped, ratio, settings.ratio_tolerance) {
            clamped = constrain_ratio(clamped, ratio, Anchor::Center);
        }
        if too_small(&clamped) {
            return Err(TagError::OutOfBounds {
                rect: clamped,
                min_area: settings.min_area,
            });
        }

        self.crop_box = Some(clamped);
        Ok(clamped)
    }

    /// Drop the manual crop box; export falls back to the automatic crop.
    pub fn clear_crop_box(&mut self) {
        self.crop_box = None;
    }

    /// Record a successful export. There is no way back to `false`.
    pub fn mark_exported(&mut self) {
        self.is_cropped = true;
    }

    /// The persisted form of this record.
    pub fn to_stored(&self) -> StoredRecord {
        StoredRecord {
            size_group: self.tag.group().map(String::from),
            size: self.tag.size().map(String::from),
            crop_box: self.crop_box,
            is_cropped: self.is_cropped,
            fingerprint: self.fingerprint.clone(),
        }
    }

    /// Rebuild a record from its persisted form.
    ///
    /// `native` and `fingerprint` come from the file on disk, never from
    /// storage. Fails if the stored fields violate a record invariant
    /// against the current catalog.
    pub fn restore(
        id: ImageId,
        stored: &StoredRecord,
        native: Dimensions,
        fingerprint: Option<String>,
        catalog: &SizeCatalog,
        settings: &CropSettings,
    ) -> Result<Self, CorruptStateError> {
        let tag = match (&stored.size_group, &stored.size) {
            (None, None) => Tag::Untagged,
            (None, Some(size)) => {
                return Err(CorruptStateError::SizeWithoutGroup {
                    id,
                    size: size.clone(),
                });
            }
            (Some(group), size) => {
                let Some(spec_group) = catalog.group(group) else {
                    return Err(CorruptStateError::UnknownGroup {
                        id,
                        group: group.clone(),
                    });
                };
                match size {
                    None => Tag::Partial {
                        group: group.clone(),
                    },
                    Some(size) if spec_group.size(size).is_some() => Tag::Full {
                        group: group.clone(),
                        size: size.clone(),
                    },
                    Some(size) => {
                        return Err(CorruptStateError::InvalidSize {
                            id,
                            group: group.clone(),
                            size: size.clone(),
                        });
                    }
                }
            }
        };

        let record = Self {
            id,
            tag,
            crop_box: stored.crop_box,
            is_cropped: stored.is_cropped,
            native,
            fingerprint,
        };
        if let Some(rect) = record.crop_box {
            record.check_crop(rect, catalog, settings)?;
        }
        Ok(record)
    }

    fn check_crop(
        &self,
        rect: ImageRect,
        catalog: &SizeCatalog,
        settings: &CropSettings,
    ) -> Result<(), CorruptStateError> {
        let Some(expected) = self.size_ratio(catalog) else {
            return Err(CorruptStateError::CropWithoutSize {
                id: self.id.clone(),
                rect,
            });
        };
        if rect.is_degenerate() || !self.native_bounds().contains(&rect) {
            return Err(CorruptStateError::CropOutOfBounds {
                id: self.id.clone(),
                rect,
                native: self.native,
            });
        }
        if !ratio_matches(&rect, expected, settings.ratio_tolerance) {
            return Err(CorruptStateError::CropRatioMismatch {
                id: self.id.clone(),
                rect,
                expected,
            });
        }
        Ok(())
    }

    /// Re-validate against a replacement catalog.
    ///
    /// A removed group clears the tag entirely; a removed size falls back
    /// to the group alone; a size whose ratio changed keeps its tag but
    /// loses a crop box that no longer matches. Returns whether anything
    /// changed.
    pub fn reconcile(&mut self, catalog: &SizeCatalog, settings: &CropSettings) -> bool {
        let before = self.clone();
        match self.tag.clone() {
            Tag::Untagged => {}
            Tag::Partial { group } => {
                if catalog.group(&group).is_none() {
                    self.clear_tags();
                }
            }
            Tag::Full { group, size } => match catalog.group(&group) {
                None => self.clear_tags(),
                Some(g) => match g.size(&size) {
                    None => {
                        self.tag = Tag::Partial { group };
                        self.crop_box = None;
                    }
                    Some(spec) => {
                        if let Some(crop) = self.crop_box
                            && !ratio_matches(&crop, spec.ratio, settings.ratio_tolerance)
                        {
                            self.crop_box = None;
                        }
                    }
                },
            },
        }
        *self != before
    }
}
