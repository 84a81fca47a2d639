//! Image backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the four operations the rest of the
//! crate needs from an image library: identify, decode, downscale, and
//! crop-and-write. Nothing outside a backend touches raw pixels.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust and built on
//! the `image` crate.

use super::params::CropParams;
use image::DynamicImage;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Stamping requested but no stamp is installed")]
    StampUnavailable,
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Decorates a cropped image before it is encoded (e.g. a date stamp).
///
/// Stamps are external collaborators: the crate only decides *whether* to
/// stamp, never what the stamp looks like.
pub trait Stamp: Send + Sync {
    fn apply(&self, image: &mut DynamicImage, source: &Path) -> Result<(), BackendError>;
}

/// Trait for image processing backends.
///
/// Backends must be `Sync`: the export orchestrator shares one backend
/// across its rayon workers.
pub trait ImageBackend: Sync {
    /// Get image dimensions without decoding pixel data.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode the full-resolution image.
    fn decode(&self, path: &Path) -> Result<DynamicImage, BackendError>;

    /// Resample to exactly `size` with a quality-preserving filter.
    fn downscale(
        &self,
        image: &DynamicImage,
        size: Dimensions,
    ) -> Result<DynamicImage, BackendError>;

    /// Crop, optionally stamp, encode, and write to `params.output`.
    fn write_crop(&self, image: &DynamicImage, params: &CropParams) -> Result<(), BackendError>;
}
