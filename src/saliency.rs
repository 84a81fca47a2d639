//! Default saliency strategy: pick the busiest window.
//!
//! [`EnergySaliency`] scores every candidate crop by the total luma
//! gradient inside it. Detail, edges, and texture carry energy; sky, walls,
//! and out-of-focus background carry almost none. The candidate window is
//! always the largest rectangle of the target ratio that fits the image,
//! so only one axis is free and the search is a single slide along it.
//!
//! Window sums come from a summed-area table, making each candidate O(1)
//! and the whole search linear in the pixel count of the analysis image.

use crate::geometry::{AnalysisRect, largest_rect_with_ratio, ratio_error};
use crate::resolve::{Saliency, SaliencyError};
use image::{DynamicImage, GrayImage};

/// Largest relative ratio error a window may have before the image
/// counts as too small to hold the target shape.
const MAX_WINDOW_RATIO_ERROR: f64 = 0.02;

/// Gradient-energy saliency with a sliding window.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergySaliency;

impl EnergySaliency {
    pub fn new() -> Self {
        Self
    }
}

/// Per-pixel energy: absolute luma difference to the right and below.
fn energy_map(luma: &GrayImage) -> Vec<u64> {
    let (w, h) = luma.dimensions();
    let mut energy = vec![0u64; (w as usize) * (h as usize)];
    for y in 0..h {
        for x in 0..w {
            let here = luma.get_pixel(x, y)[0] as i32;
            let dx = if x + 1 < w {
                (luma.get_pixel(x + 1, y)[0] as i32 - here).unsigned_abs()
            } else {
                0
            };
            let dy = if y + 1 < h {
                (luma.get_pixel(x, y + 1)[0] as i32 - here).unsigned_abs()
            } else {
                0
            };
            energy[(y as usize) * (w as usize) + x as usize] = (dx + dy) as u64;
        }
    }
    energy
}

/// Summed-area table over a `w`×`h` grid, with a zero row and column.
struct SummedArea {
    stride: usize,
    sums: Vec<u64>,
}

impl SummedArea {
    fn new(values: &[u64], w: usize, h: usize) -> Self {
        let stride = w + 1;
        let mut sums = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            for x in 0..w {
                row += values[y * w + x];
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { stride, sums }
    }

    /// Sum over `[x, x+w) × [y, y+h)`.
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        let at = |x: usize, y: usize| self.sums[y * self.stride + x];
        at(x + w, y + h) + at(x, y) - at(x + w, y) - at(x, y + h)
    }
}

impl Saliency for EnergySaliency {
    fn suggest_crop(
        &self,
        image: &DynamicImage,
        target_ratio: f64,
    ) -> Result<AnalysisRect, SaliencyError> {
        let (w, h) = (image.width(), image.height());
        let too_small = || SaliencyError::ImageTooSmall {
            width: w,
            height: h,
            ratio: target_ratio,
        };
        if w == 0 || h == 0 || !(target_ratio.is_finite() && target_ratio > 0.0) {
            return Err(too_small());
        }

        let window = largest_rect_with_ratio(AnalysisRect::from_size(w, h), target_ratio);
        if ratio_error(window.ratio(), target_ratio) > MAX_WINDOW_RATIO_ERROR {
            return Err(too_small());
        }

        let luma = image.to_luma8();
        let table = SummedArea::new(&energy_map(&luma), w as usize, h as usize);
        let (ww, wh) = (window.width as usize, window.height as usize);

        let mut best = (0usize, 0usize);
        let mut best_score = None;
        for y in 0..=(h as usize - wh) {
            for x in 0..=(w as usize - ww) {
                let score = table.window(x, y, ww, wh);
                if best_score.is_none_or(|b| score > b) {
                    best_score = Some(score);
                    best = (x, y);
                }
            }
        }

        Ok(AnalysisRect::new(
            best.0 as i32,
            best.1 as i32,
            window.width,
            window.height,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    /// Flat grey image with a checkerboard patch at `(px, py)`.
    fn image_with_detail(w: u32, h: u32, px: u32, py: u32, size: u32) -> DynamicImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([128]));
        for y in py..(py + size).min(h) {
            for x in px..(px + size).min(w) {
                let v = if (x + y) % 2 == 0 { 0 } else { 255 };
                img.put_pixel(x, y, Luma([v]));
            }
        }
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn window_follows_detail_horizontally() {
        // 600x300 at ratio 1.0 → 300x300 window sliding along x
        let img = image_with_detail(600, 300, 500, 100, 60);
        let rect = EnergySaliency.suggest_crop(&img, 1.0).unwrap();
        assert_eq!((rect.width, rect.height), (300, 300));
        assert_eq!(rect.y, 0);
        assert!(rect.x >= 260, "window at {rect} misses the detail");
        assert!(rect.right() <= 600);
    }

    #[test]
    fn window_follows_detail_vertically() {
        // 300x600 at ratio 1.5 → 300x200 window sliding along y
        let img = image_with_detail(300, 600, 100, 40, 50);
        let rect = EnergySaliency.suggest_crop(&img, 1.5).unwrap();
        assert_eq!((rect.width, rect.height), (300, 200));
        assert_eq!(rect.x, 0);
        assert!(rect.y <= 40 && rect.bottom() >= 90, "window at {rect}");
    }

    #[test]
    fn flat_image_picks_first_window() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 200, Rgb([10, 20, 30])));
        let rect = EnergySaliency.suggest_crop(&img, 1.0).unwrap();
        assert_eq!(rect, AnalysisRect::new(0, 0, 200, 200));
    }

    #[test]
    fn matching_aspect_returns_full_frame() {
        let img = image_with_detail(300, 200, 10, 10, 20);
        let rect = EnergySaliency.suggest_crop(&img, 1.5).unwrap();
        assert_eq!(rect, AnalysisRect::new(0, 0, 300, 200));
    }

    #[test]
    fn tiny_image_is_too_small() {
        let img = DynamicImage::new_luma8(3, 2);
        assert!(matches!(
            EnergySaliency.suggest_crop(&img, 1.4),
            Err(SaliencyError::ImageTooSmall { .. })
        ));
        let empty = DynamicImage::new_luma8(0, 0);
        assert!(EnergySaliency.suggest_crop(&empty, 1.0).is_err());
    }

    #[test]
    fn summed_area_window_sums() {
        let values: Vec<u64> = (1..=12).collect(); // 4x3 grid
        let table = SummedArea::new(&values, 4, 3);
        assert_eq!(table.window(0, 0, 4, 3), 78);
        assert_eq!(table.window(1, 1, 2, 2), 6 + 7 + 10 + 11);
        assert_eq!(table.window(3, 2, 1, 1), 12);
    }
}
