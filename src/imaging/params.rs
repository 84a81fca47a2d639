//! Parameter types for image operations.
//!
//! These structs describe *what* to write, not *how*. They are the interface
//! between the export orchestrator (which decides what each output file
//! holds) and the [`backend`](super::backend) (which does the pixel work).
//!
//! - [`Quality`]: JPEG encoding quality (1–100, default 95). Clamped on construction.
//! - [`CropParams`]: everything one export writes: source, output path, crop, quality, stamping.

use crate::geometry::ImageRect;
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(95)
    }
}

/// Parameters for a crop + encode operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CropParams {
    /// Source file the pixels were decoded from (stampers read its metadata).
    pub source: PathBuf,
    pub output: PathBuf,
    /// Region to keep, in full-resolution image space.
    pub crop: ImageRect,
    pub quality: Quality,
    /// Apply the backend's stamp collaborator before encoding.
    pub stamp: bool,
}
