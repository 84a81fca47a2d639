//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` (header only) |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` (pure Rust decoders) |
//! | Downscale | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Crop | `DynamicImage::crop_imm` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//!
//! Output files are written to a sibling `.partial` file and renamed into
//! place, so an interrupted export never leaves a truncated JPEG behind.

use super::backend::{BackendError, Dimensions, ImageBackend, Stamp};
use super::params::CropParams;
use crate::geometry::{ImageRect, clamp_to_bounds};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in and known to work.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Default)]
pub struct RustBackend {
    stamp: Option<Box<dyn Stamp>>,
}

impl RustBackend {
    pub fn new() -> Self {
        Self { stamp: None }
    }

    /// Install a stamp collaborator used when [`CropParams::stamp`] is set.
    pub fn with_stamp(mut self, stamp: Box<dyn Stamp>) -> Self {
        self.stamp = Some(stamp);
        self
    }

    pub fn has_stamp(&self) -> bool {
        self.stamp.is_some()
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{name}.partial"))
}

/// Encode as JPEG into `path` via a temp file + rename.
fn save_jpeg(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let rgb = img.to_rgb8();
    let tmp = partial_path(path);

    let written = (|| -> Result<(), BackendError> {
        let mut writer = BufWriter::new(fs::File::create(&tmp)?);
        JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100) as u8)
            .write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {e}")))?;
        writer.flush()?;
        Ok(())
    })();

    match written {
        Ok(()) => fs::rename(&tmp, path).map_err(BackendError::Io),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
        })?;
        Ok(Dimensions { width, height })
    }

    fn decode(&self, path: &Path) -> Result<DynamicImage, BackendError> {
        ImageReader::open(path)
            .map_err(BackendError::Io)?
            .with_guessed_format()
            .map_err(BackendError::Io)?
            .decode()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!(
                    "Failed to decode {}: {}",
                    path.display(),
                    e
                ))
            })
    }

    fn downscale(
        &self,
        image: &DynamicImage,
        size: Dimensions,
    ) -> Result<DynamicImage, BackendError> {
        if size.width == 0 || size.height == 0 {
            return Err(BackendError::ProcessingFailed(format!(
                "Cannot downscale to {size}"
            )));
        }
        Ok(image.resize_exact(size.width, size.height, FilterType::Lanczos3))
    }

    fn write_crop(&self, image: &DynamicImage, params: &CropParams) -> Result<(), BackendError> {
        let bounds = ImageRect::from_size(image.width(), image.height());
        let crop = clamp_to_bounds(params.crop, bounds);
        if crop.is_degenerate() {
            return Err(BackendError::ProcessingFailed(format!(
                "Crop {} is empty inside {}x{}",
                params.crop,
                image.width(),
                image.height()
            )));
        }

        let mut cropped = image.crop_imm(
            crop.x as u32,
            crop.y as u32,
            crop.width as u32,
            crop.height as u32,
        );
        if params.stamp {
            let stamp = self.stamp.as_ref().ok_or(BackendError::StampUnavailable)?;
            stamp.apply(&mut cropped, &params.source)?;
        }
        save_jpeg(&cropped, &params.output, params.quality.value())
    }
}
