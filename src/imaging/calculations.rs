//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::backend::Dimensions;

/// Calculate the size of the saliency analysis copy.
///
/// Images whose longer edge exceeds `max_edge` are scaled so the longer edge
/// equals `max_edge`, preserving aspect ratio. Smaller images are analysed at
/// their native size.
///
/// # Returns
/// * `(dimensions, factor)` - Analysis size and the factor that maps analysis
///   pixels back to native pixels (`native long edge / analysis long edge`)
///
/// # Examples
/// ```
/// # use printcrop::imaging::{Dimensions, calculations::analysis_dimensions};
/// let (dims, factor) = analysis_dimensions(Dimensions { width: 4000, height: 3000 }, 600);
/// assert_eq!((dims.width, dims.height), (600, 450));
/// assert!((factor - 4000.0 / 600.0).abs() < 1e-9);
/// ```
pub fn analysis_dimensions(original: Dimensions, max_edge: u32) -> (Dimensions, f64) {
    let longer_edge = original.width.max(original.height);
    if longer_edge <= max_edge || max_edge == 0 {
        return (original, 1.0);
    }

    let ratio = max_edge as f64 / longer_edge as f64;
    let dims = if original.width >= original.height {
        // Landscape or square
        Dimensions {
            width: max_edge,
            height: ((original.height as f64 * ratio).round() as u32).max(1),
        }
    } else {
        // Portrait
        Dimensions {
            width: ((original.width as f64 * ratio).round() as u32).max(1),
            height: max_edge,
        }
    };
    (dims, longer_edge as f64 / max_edge as f64)
}

/// Calculate the preview size of an image shown inside a container.
///
/// Fits the whole image, preserves aspect ratio, and never upscales: an image
/// already smaller than the container keeps its native size.
pub fn fit_within(original: Dimensions, container: Dimensions) -> Dimensions {
    if original.width == 0 || original.height == 0 {
        return original;
    }
    let scale = (container.width as f64 / original.width as f64)
        .min(container.height as f64 / original.height as f64)
        .min(1.0);
    Dimensions {
        width: ((original.width as f64 * scale).round() as u32).max(1),
        height: ((original.height as f64 * scale).round() as u32).max(1),
    }
}
