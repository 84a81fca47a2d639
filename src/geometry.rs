//! Rectangle and point primitives, aspect-ratio math, and clamping.
//!
//! Every rectangle carries the coordinate space it lives in as a phantom
//! type parameter, so a thumbnail rectangle can never be handed to code that
//! expects full-resolution image coordinates:
//!
//! | Space | Marker | Meaning |
//! |---|---|---|
//! | Display | [`DisplaySpace`] | Pixels of the interactive overlay as rendered on screen |
//! | Thumbnail | [`ThumbnailSpace`] | Pixels within the scaled, centered preview image |
//! | Image | [`ImageSpace`] | Pixels of the original, full-resolution image |
//! | Analysis | [`AnalysisSpace`] | Pixels of the downscaled copy handed to saliency scoring |
//!
//! Conversions between spaces live in [`transform`](crate::transform).
//! Everything here is pure: no I/O, no allocation beyond the values returned.
//!
//! Coordinates are integer pixels. Ratios are always `width / height`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Marker trait for coordinate spaces.
pub trait Space: Copy + Clone + fmt::Debug + Default + PartialEq + Eq + Hash + 'static {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DisplaySpace;
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ThumbnailSpace;
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ImageSpace;
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AnalysisSpace;

impl Space for DisplaySpace {}
impl Space for ThumbnailSpace {}
impl Space for ImageSpace {}
impl Space for AnalysisSpace {}

pub type DisplayRect = Rect<DisplaySpace>;
pub type ThumbnailRect = Rect<ThumbnailSpace>;
pub type ImageRect = Rect<ImageSpace>;
pub type AnalysisRect = Rect<AnalysisSpace>;

/// A point in coordinate space `S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point<S: Space> {
    pub x: i32,
    pub y: i32,
    space: PhantomData<S>,
}

impl<S: Space> Point<S> {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            space: PhantomData,
        }
    }
}

/// An axis-aligned rectangle in coordinate space `S`.
///
/// Finalized rectangles have positive width and height. While a crop is being
/// dragged the extents may go zero or negative; [`Rect::normalized`] repairs
/// that before the rectangle is committed anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Rect<S: Space> {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    #[serde(skip)]
    space: PhantomData<S>,
}

impl<S: Space> Rect<S> {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            space: PhantomData,
        }
    }

    /// Rectangle anchored at the origin with the given extents.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, saturate(width), saturate(height))
    }

    /// Right edge, saturating at `i32::MAX`.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> i64 {
        if self.is_degenerate() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Width over height. Zero for degenerate rectangles.
    pub fn ratio(&self) -> f64 {
        if self.is_degenerate() {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    pub fn translate(self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// True when `other` lies entirely inside `self`.
    ///
    /// Edges are compared in `i64`, so stored values near `i32::MAX` cannot
    /// wrap into range.
    pub fn contains(&self, other: &Rect<S>) -> bool {
        let edges = |r: &Rect<S>| {
            (
                r.x as i64,
                r.y as i64,
                r.x as i64 + r.width as i64,
                r.y as i64 + r.height as i64,
            )
        };
        let (x0, y0, x1, y1) = edges(self);
        let (ox0, oy0, ox1, oy1) = edges(other);
        ox0 >= x0 && oy0 >= y0 && ox1 <= x1 && oy1 <= y1
    }

    /// Flip negative extents so the rectangle covers the same area with a
    /// top-left origin. A drag past the anchor produces negative extents.
    pub fn normalized(self) -> Self {
        let (x, width) = if self.width < 0 {
            (self.x.saturating_add(self.width), self.width.saturating_neg())
        } else {
            (self.x, self.width)
        };
        let (y, height) = if self.height < 0 {
            (self.y.saturating_add(self.height), self.height.saturating_neg())
        } else {
            (self.y, self.height)
        };
        Self::new(x, y, width, height)
    }

    /// Re-tag the rectangle with another space. Only the transform layer
    /// knows when the numbers actually mean the same thing in both.
    pub(crate) fn cast<T: Space>(self) -> Rect<T> {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

impl<S: Space> fmt::Display for Rect<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// The fixed point of an interactive resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

fn saturate(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

fn round_px(v: f64) -> i32 {
    v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

/// Relative error of `actual` against `target`.
pub fn ratio_error(actual: f64, target: f64) -> f64 {
    ((actual - target) / target).abs()
}

/// True when `rect`'s ratio is within `tolerance` relative error of `target`.
pub fn ratio_matches<S: Space>(rect: &Rect<S>, target: f64, tolerance: f64) -> bool {
    !rect.is_degenerate() && ratio_error(rect.ratio(), target) <= tolerance
}

/// Translate and, if necessary, shrink `rect` so it lies inside `bounds`.
///
/// Position is adjusted first; a dimension only shrinks when `rect` is
/// larger than `bounds` along it. Degenerate input stays degenerate so the
/// caller can reject it.
pub fn clamp_to_bounds<S: Space>(rect: Rect<S>, bounds: Rect<S>) -> Rect<S> {
    let bounds = bounds.normalized();
    let width = rect.width.min(bounds.width);
    let height = rect.height.min(bounds.height);
    let x = rect.x.clamp(bounds.x, bounds.right() - width.max(0));
    let y = rect.y.clamp(bounds.y, bounds.bottom() - height.max(0));
    Rect::new(x, y, width, height)
}

/// The centered rectangle of maximal area with aspect `ratio` inside `bounds`.
///
/// ```
/// # use printcrop::geometry::{ImageRect, largest_rect_with_ratio};
/// let r = largest_rect_with_ratio(ImageRect::from_size(4000, 3000), 1.5);
/// assert_eq!((r.x, r.y, r.width, r.height), (0, 166, 4000, 2667));
/// ```
pub fn largest_rect_with_ratio<S: Space>(bounds: Rect<S>, ratio: f64) -> Rect<S> {
    let bounds = bounds.normalized();
    let (width, height) = if bounds.ratio() > ratio {
        // Bounds are wider: full height, trimmed width
        let h = bounds.height.max(1);
        (round_px(h as f64 * ratio).clamp(1, bounds.width.max(1)), h)
    } else {
        let w = bounds.width.max(1);
        (w, round_px(w as f64 / ratio).clamp(1, bounds.height.max(1)))
    };
    Rect::new(
        bounds.x + (bounds.width - width) / 2,
        bounds.y + (bounds.height - height) / 2,
        width,
        height,
    )
}

/// Adjust `rect` so its aspect matches `ratio`, keeping `anchor` fixed.
///
/// The dimension that is too long for `ratio` is shortened, so the result
/// always fits inside the (normalized) input rectangle. Each extent is
/// floored at 1 pixel.
pub fn constrain_ratio<S: Space>(rect: Rect<S>, ratio: f64, anchor: Anchor) -> Rect<S> {
    let r = rect.normalized();
    let (w0, h0) = (r.width.max(1), r.height.max(1));

    let (width, height) = if (w0 as f64 / h0 as f64) > ratio {
        (round_px(h0 as f64 * ratio).clamp(1, w0), h0)
    } else {
        (w0, round_px(w0 as f64 / ratio).clamp(1, h0))
    };

    let (dx, dy) = match anchor {
        Anchor::TopLeft => (0, 0),
        Anchor::TopRight => (w0 - width, 0),
        Anchor::BottomLeft => (0, h0 - height),
        Anchor::BottomRight => (w0 - width, h0 - height),
        Anchor::Center => ((w0 - width) / 2, (h0 - height) / 2),
    };
    let (x, y) = (r.x.saturating_add(dx), r.y.saturating_add(dy));
    Rect::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> ImageRect {
        ImageRect::new(x, y, w, h)
    }

    // =========================================================================
    // Rect basics
    // =========================================================================

    #[test]
    fn normalized_flips_negative_extents() {
        let r = rect(100, 100, -40, -20).normalized();
        assert_eq!(r, rect(60, 80, 40, 20));
    }

    #[test]
    fn edges_near_i32_max_do_not_wrap() {
        let bounds = rect(0, 0, 4000, 3000);
        let far = rect(2_147_483_000, 0, 3000, 2000);
        assert_eq!(far.right(), i32::MAX);
        assert!(!bounds.contains(&far));
        assert!(!bounds.contains(&rect(0, i32::MAX - 10, 100, 100)));
    }

    #[test]
    fn extreme_extents_saturate() {
        let r = rect(i32::MIN + 5, 0, -100, i32::MIN).normalized();
        assert_eq!((r.x, r.width), (i32::MIN, 100));
        assert_eq!(r.height, i32::MAX);
        assert_eq!(rect(i32::MAX - 1, 0, 1, 1).translate(10, 0).x, i32::MAX);
    }

    #[test]
    fn degenerate_rect_has_zero_area_and_ratio() {
        let r = rect(0, 0, 0, 10);
        assert!(r.is_degenerate());
        assert_eq!(r.area(), 0);
        assert_eq!(r.ratio(), 0.0);
    }

    #[test]
    fn rect_serializes_without_space_marker() {
        let json = serde_json::to_string(&rect(1, 2, 3, 4)).unwrap();
        assert_eq!(json, r#"{"x":1,"y":2,"width":3,"height":4}"#);
        let back: ImageRect = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rect(1, 2, 3, 4));
    }

    // =========================================================================
    // clamp_to_bounds
    // =========================================================================

    #[test]
    fn clamp_translates_without_shrinking_when_it_fits() {
        let bounds = rect(0, 0, 1000, 800);
        let clamped = clamp_to_bounds(rect(900, -50, 300, 200), bounds);
        assert_eq!(clamped, rect(700, 0, 300, 200));
    }

    #[test]
    fn clamp_shrinks_only_oversized_dimension() {
        let bounds = rect(0, 0, 1000, 800);
        let clamped = clamp_to_bounds(rect(-10, 100, 1500, 200), bounds);
        assert_eq!(clamped, rect(0, 100, 1000, 200));
    }

    #[test]
    fn clamp_respects_bounds_origin() {
        let bounds = rect(50, 40, 200, 100);
        let clamped = clamp_to_bounds(rect(0, 0, 20, 20), bounds);
        assert_eq!(clamped, rect(50, 40, 20, 20));
        assert!(bounds.contains(&clamped));
    }

    #[test]
    fn clamp_inside_is_identity() {
        let bounds = rect(0, 0, 100, 100);
        assert_eq!(clamp_to_bounds(rect(10, 10, 50, 50), bounds), rect(10, 10, 50, 50));
    }

    // =========================================================================
    // largest_rect_with_ratio
    // =========================================================================

    #[test]
    fn largest_rect_wide_bounds_uses_full_height() {
        let r = largest_rect_with_ratio(rect(0, 0, 4000, 2000), 1.5);
        assert_eq!(r, rect(500, 0, 3000, 2000));
    }

    #[test]
    fn largest_rect_tall_bounds_uses_full_width() {
        let r = largest_rect_with_ratio(rect(0, 0, 3000, 4000), 1.5);
        assert_eq!(r.width, 3000);
        assert_eq!(r.height, 2000);
        assert_eq!(r.y, 1000);
    }

    #[test]
    fn largest_rect_is_contained_with_matching_ratio() {
        let bounds_list = [
            (4000, 3000),
            (3000, 4000),
            (6000, 4000),
            (1024, 768),
            (5472, 3648),
            (800, 801),
        ];
        let ratios = [1.5, 1.4, 1.25, 1.0, 0.8, 2.0 / 3.0, 5.0 / 7.0];
        for (w, h) in bounds_list {
            let bounds = ImageRect::from_size(w, h);
            for ratio in ratios {
                let r = largest_rect_with_ratio(bounds, ratio);
                assert!(bounds.contains(&r), "{r} escapes {bounds} at ratio {ratio}");
                assert!(
                    ratio_error(r.ratio(), ratio) <= 0.001,
                    "{r} ratio {} vs {ratio}",
                    r.ratio()
                );
            }
        }
    }

    #[test]
    fn largest_rect_same_ratio_fills_bounds() {
        let r = largest_rect_with_ratio(rect(0, 0, 600, 400), 1.5);
        assert_eq!(r, rect(0, 0, 600, 400));
    }

    // =========================================================================
    // constrain_ratio
    // =========================================================================

    #[test]
    fn constrain_top_left_keeps_origin() {
        let r = constrain_ratio(rect(10, 20, 400, 400), 2.0, Anchor::TopLeft);
        assert_eq!(r, rect(10, 20, 400, 200));
    }

    #[test]
    fn constrain_bottom_right_keeps_far_corner() {
        let r = constrain_ratio(rect(0, 0, 400, 400), 2.0, Anchor::BottomRight);
        assert_eq!(r, rect(0, 200, 400, 200));
        assert_eq!((r.right(), r.bottom()), (400, 400));
    }

    #[test]
    fn constrain_top_right_keeps_right_edge() {
        let r = constrain_ratio(rect(0, 0, 400, 100), 2.0, Anchor::TopRight);
        assert_eq!(r, rect(200, 0, 200, 100));
    }

    #[test]
    fn constrain_center_keeps_center() {
        let r = constrain_ratio(rect(0, 0, 4000, 3000), 1.5, Anchor::Center);
        assert_eq!(r.width, 4000);
        assert_eq!(r.height, 2667);
        assert_eq!(r.y, 166);
    }

    #[test]
    fn constrain_repairs_degenerate_drag() {
        let r = constrain_ratio(rect(50, 50, 0, -30), 1.5, Anchor::TopLeft);
        assert!(r.width >= 1 && r.height >= 1);
    }

    #[test]
    fn constrain_never_goes_below_one_pixel() {
        let r = constrain_ratio(rect(0, 0, 1, 1), 100.0, Anchor::TopLeft);
        assert_eq!((r.width, r.height), (1, 1));
    }
}
