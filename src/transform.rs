//! Conversions between display, thumbnail, image, and analysis space.
//!
//! A crop is edited over a scaled preview but stored at full resolution.
//! Three spaces are involved and must never be conflated:
//!
//! ```text
//! display space     overlay widget pixels (thumbnail centered inside it)
//!     │  subtract centering offset (1:1, translation only)
//!     ▼
//! thumbnail space   pixels of the scaled preview image
//!     │  divide by scale factor (thumbnail px / image px)
//!     ▼
//! image space       pixels of the original, full-resolution file
//! ```
//!
//! Going down the chain and back up again is stable to within one pixel per
//! field for every scale factor up to 1.0. Previews never upscale (see
//! [`fit_within`](crate::imaging::calculations::fit_within)), so that covers
//! every factor a [`Viewport`] produces.
//!
//! The fourth space, analysis space, is the downscaled copy the crop engine
//! hands to saliency scoring; [`analysis_to_image`] maps results back.

use crate::geometry::{
    AnalysisRect, DisplayRect, DisplaySpace, ImageRect, Point, Rect, Space, ThumbnailRect,
    ThumbnailSpace, clamp_to_bounds,
};
use crate::imaging::Dimensions;
use crate::imaging::calculations::fit_within;

/// Translation from display space to thumbnail space.
///
/// Non-negative when the thumbnail is smaller than its container and centered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

/// Ratio of thumbnail pixels to image pixels. Always finite and positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    /// Factor for a thumbnail rendered from an image, measured on the width.
    pub fn between(thumbnail: Dimensions, full: Dimensions) -> Option<Self> {
        if full.width == 0 {
            return None;
        }
        Self::new(thumbnail.width as f64 / full.width as f64)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

fn scale(v: i32, factor: f64) -> i32 {
    (v as f64 * factor).round() as i32
}

fn scale_rect<A: Space, B: Space>(rect: Rect<A>, factor: f64) -> Rect<B> {
    Rect::new(
        scale(rect.x, factor),
        scale(rect.y, factor),
        scale(rect.width, factor),
        scale(rect.height, factor),
    )
}

/// Centering offset of a thumbnail inside a container.
pub fn centering_offset(container: Dimensions, thumbnail: Dimensions) -> Offset {
    Offset {
        dx: (container.width as i32 - thumbnail.width as i32) / 2,
        dy: (container.height as i32 - thumbnail.height as i32) / 2,
    }
}

/// Display point → thumbnail point. Translation only.
pub fn to_thumbnail_point(point: Point<DisplaySpace>, offset: Offset) -> Point<ThumbnailSpace> {
    Point::new(point.x - offset.dx, point.y - offset.dy)
}

/// Display rectangle → thumbnail rectangle. Translation only.
pub fn to_thumbnail_rect(rect: DisplayRect, offset: Offset) -> ThumbnailRect {
    rect.translate(-offset.dx, -offset.dy).cast()
}

/// Thumbnail rectangle → display rectangle, for drawing the overlay.
pub fn to_display_rect(rect: ThumbnailRect, offset: Offset) -> DisplayRect {
    rect.translate(offset.dx, offset.dy).cast()
}

/// Thumbnail rectangle → image rectangle (each field divided by `scale`).
///
/// The result is not clamped; run it through
/// [`clamp_to_bounds`](crate::geometry::clamp_to_bounds) against the native
/// image size before storing it.
///
/// Round trips through [`to_thumbnail`] stay within one pixel only for
/// `scale <= 1.0`. Above that, neighbouring thumbnail pixels land on the
/// same image pixel and the error grows with the scale.
pub fn to_full_image(rect: ThumbnailRect, scale: ScaleFactor) -> ImageRect {
    scale_rect(rect, 1.0 / scale.value())
}

/// Image rectangle → thumbnail rectangle (each field multiplied by `scale`).
///
/// Same round-trip limit as [`to_full_image`]: exact to a pixel for
/// `scale <= 1.0` only.
pub fn to_thumbnail(rect: ImageRect, scale: ScaleFactor) -> ThumbnailRect {
    scale_rect(rect, scale.value())
}

/// Analysis rectangle → image rectangle, given the downscale factor
/// (`native long edge / analysis long edge`, 1.0 when nothing was scaled).
pub fn analysis_to_image(rect: AnalysisRect, downscale_factor: f64) -> ImageRect {
    scale_rect(rect, downscale_factor)
}

/// The three spaces of one preview: an overlay container, the thumbnail
/// centered in it, and the native image the thumbnail was scaled from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub container: Dimensions,
    pub thumbnail: Dimensions,
    pub native: Dimensions,
}

impl Viewport {
    /// Lay out a preview of `native` inside `container`, fit without upscaling.
    pub fn fit(container: Dimensions, native: Dimensions) -> Self {
        Self {
            container,
            thumbnail: fit_within(native, container),
            native,
        }
    }

    pub fn offset(&self) -> Offset {
        centering_offset(self.container, self.thumbnail)
    }

    pub fn scale(&self) -> Option<ScaleFactor> {
        ScaleFactor::between(self.thumbnail, self.native)
    }

    pub fn native_bounds(&self) -> ImageRect {
        ImageRect::from_size(self.native.width, self.native.height)
    }

    /// Overlay rectangle → stored image rectangle, clamped to the native size.
    pub fn display_to_image(&self, rect: DisplayRect) -> Option<ImageRect> {
        let scale = self.scale()?;
        let thumb = to_thumbnail_rect(rect.normalized(), self.offset());
        Some(clamp_to_bounds(to_full_image(thumb, scale), self.native_bounds()))
    }

    /// Stored image rectangle → overlay rectangle for drawing.
    pub fn image_to_display(&self, rect: ImageRect) -> Option<DisplayRect> {
        let scale = self.scale()?;
        Some(to_display_rect(to_thumbnail(rect, scale), self.offset()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn within_one_px(a: ThumbnailRect, b: ThumbnailRect) -> bool {
        (a.x - b.x).abs() <= 1
            && (a.y - b.y).abs() <= 1
            && (a.width - b.width).abs() <= 1
            && (a.height - b.height).abs() <= 1
    }

    // =========================================================================
    // Display ↔ thumbnail
    // =========================================================================

    #[test]
    fn display_point_subtracts_offset() {
        let p = to_thumbnail_point(Point::new(150, 40), Offset { dx: 50, dy: 0 });
        assert_eq!((p.x, p.y), (100, 40));
    }

    #[test]
    fn centering_offset_letterboxes() {
        // 400x300 thumbnail in a 500x300 container → 50px bars left and right
        assert_eq!(
            centering_offset(dims(500, 300), dims(400, 300)),
            Offset { dx: 50, dy: 0 }
        );
    }

    #[test]
    fn display_rect_round_trips_through_thumbnail() {
        let offset = Offset { dx: 12, dy: 7 };
        let rect = DisplayRect::new(40, 30, 120, 80);
        assert_eq!(to_display_rect(to_thumbnail_rect(rect, offset), offset), rect);
    }

    // =========================================================================
    // Thumbnail ↔ image
    // =========================================================================

    #[test]
    fn to_full_image_divides_by_scale() {
        let scale = ScaleFactor::new(0.1).unwrap();
        let full = to_full_image(ThumbnailRect::new(10, 20, 60, 40), scale);
        assert_eq!(full, ImageRect::new(100, 200, 600, 400));
    }

    #[test]
    fn round_trip_stays_within_one_pixel() {
        let factors = [1.0, 0.5, 0.3333, 0.15, 0.1, 0.0667, 0.05, 0.0123];
        let rects = [
            ThumbnailRect::new(0, 0, 1, 1),
            ThumbnailRect::new(3, 7, 11, 13),
            ThumbnailRect::new(17, 5, 233, 155),
            ThumbnailRect::new(101, 99, 299, 201),
            ThumbnailRect::new(-5, -9, 40, 27),
        ];
        for f in factors {
            let scale = ScaleFactor::new(f).unwrap();
            for r in rects {
                let back = to_thumbnail(to_full_image(r, scale), scale);
                assert!(within_one_px(r, back), "{r} → {back} at scale {f}");
            }
        }
    }

    #[test]
    fn round_trip_above_unit_scale_can_drift() {
        let scale = ScaleFactor::new(4.0).unwrap();
        let r = ThumbnailRect::new(2, 2, 2, 2);
        let full = to_full_image(r, scale);
        assert_eq!(full, ImageRect::new(1, 1, 1, 1));
        let back = to_thumbnail(full, scale);
        assert_eq!(back, ThumbnailRect::new(4, 4, 4, 4));
        assert!(!within_one_px(r, back));
    }

    #[test]
    fn scale_factor_rejects_non_positive() {
        assert!(ScaleFactor::new(0.0).is_none());
        assert!(ScaleFactor::new(-1.0).is_none());
        assert!(ScaleFactor::new(f64::NAN).is_none());
        assert!(ScaleFactor::between(dims(100, 100), dims(0, 0)).is_none());
    }

    #[test]
    fn analysis_scales_back_by_downscale_factor() {
        let r = analysis_to_image(AnalysisRect::new(100, 50, 900, 600), 4000.0 / 600.0);
        assert_eq!(r, ImageRect::new(667, 333, 6000, 4000));
    }

    // =========================================================================
    // Viewport
    // =========================================================================

    #[test]
    fn viewport_maps_overlay_to_clamped_image_rect() {
        // 4000x3000 image previewed in a 500x300 box → 400x300 thumbnail, 50px bars
        let vp = Viewport::fit(dims(500, 300), dims(4000, 3000));
        assert_eq!(vp.thumbnail, dims(400, 300));
        assert_eq!(vp.offset(), Offset { dx: 50, dy: 0 });

        let image = vp.display_to_image(DisplayRect::new(50, 0, 300, 200)).unwrap();
        assert_eq!(image, ImageRect::new(0, 0, 3000, 2000));

        // Dragged partly off the right edge of the thumbnail → clamped inside
        let image = vp.display_to_image(DisplayRect::new(300, 100, 300, 200)).unwrap();
        assert_eq!(image, ImageRect::new(1000, 1000, 3000, 2000));
    }

    #[test]
    fn viewport_draws_stored_crop_back_onto_overlay() {
        let vp = Viewport::fit(dims(500, 300), dims(4000, 3000));
        let display = vp.image_to_display(ImageRect::new(1000, 1000, 2000, 1000)).unwrap();
        assert_eq!(display, DisplayRect::new(150, 100, 200, 100));
    }
}
