//! Image normalization for OCR.
//!
//! Fixed stage order, each stage consuming its predecessor's grayscale
//! output: local contrast enhancement, denoising, deskew, sharpening, and a
//! final adaptive binarization. Intermediate images can be persisted for
//! inspection; persistence is a pure side channel and never feeds back into
//! the pipeline.

use crate::Result;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{adaptive_threshold, otsu_level};
use imageproc::filter::{filter3x3, median_filter};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Below this many foreground pixels, skew estimation is meaningless: a
/// near-blank page would produce a spurious rotation, so deskew is a no-op.
const MIN_FOREGROUND_PIXELS: usize = 50;

/// Fixed high-pass sharpening kernel.
const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// Adaptive binarization block radius (35px window).
const ADAPTIVE_BLOCK_RADIUS: u32 = 17;

/// Contrast enhancement: histogram clip limit relative to a uniform bin.
const CLAHE_CLIP_LIMIT: f64 = 2.0;

/// Contrast enhancement tile grid (8×8).
const CLAHE_TILE_GRID: u32 = 8;

/// Output of [`normalize_page`]: the OCR-ready binary image plus metadata.
#[derive(Debug, Clone)]
pub struct NormalizedPage {
    pub image: GrayImage,
    /// Rotation applied to correct skew, in degrees. Positive values
    /// counter-rotate text that rises left-to-right in image coordinates.
    pub deskew_angle: f64,
    /// Stage name → persisted debug image path. Empty unless requested.
    pub debug_paths: BTreeMap<String, String>,
}

/// Tile-based, clip-limited local histogram equalization.
///
/// The imaging crates in use only offer global equalization, which washes
/// out on invoices where a stamp or shadow dominates the histogram; local
/// tiles with a clip limit boost faint print without amplifying noise.
fn enhance_contrast(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tile_w = width.div_ceil(CLAHE_TILE_GRID).max(1);
    let tile_h = height.div_ceil(CLAHE_TILE_GRID).max(1);
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let count = (x1 - x0) * (y1 - y0);

            let limit = ((CLAHE_CLIP_LIMIT * count as f64 / 256.0).max(1.0)) as u32;
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > limit {
                    excess += *bin - limit;
                    *bin = limit;
                }
            }
            let bonus = excess / 256;
            let remainder = excess % 256;
            for (index, bin) in hist.iter_mut().enumerate() {
                *bin += bonus + u32::from((index as u32) < remainder);
            }

            let lut = &mut luts[(ty * tiles_x + tx) as usize];
            let mut cdf = 0u64;
            for (index, &bin) in hist.iter().enumerate() {
                cdf += bin as u64;
                lut[index] = ((cdf * 255) / count.max(1) as u64).min(255) as u8;
            }
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let value = gray.get_pixel(x, y)[0] as usize;

            let fx = ((x as f64 + 0.5) / tile_w as f64 - 0.5).clamp(0.0, (tiles_x - 1) as f64);
            let fy = ((y as f64 + 0.5) / tile_h as f64 - 0.5).clamp(0.0, (tiles_y - 1) as f64);
            let x0 = fx.floor() as u32;
            let y0 = fy.floor() as u32;
            let x1 = (x0 + 1).min(tiles_x - 1);
            let y1 = (y0 + 1).min(tiles_y - 1);
            let wx = fx - x0 as f64;
            let wy = fy - y0 as f64;

            let at = |ty: u32, tx: u32| luts[(ty * tiles_x + tx) as usize][value] as f64;
            let top = at(y0, x0) * (1.0 - wx) + at(y0, x1) * wx;
            let bottom = at(y1, x0) * (1.0 - wx) + at(y1, x1) * wx;
            let blended = top * (1.0 - wy) + bottom * wy;
            out.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

fn denoise(gray: &GrayImage) -> GrayImage {
    median_filter(gray, 1, 1)
}

fn sharpen(gray: &GrayImage) -> GrayImage {
    filter3x3::<Luma<u8>, f32, u8>(gray, &SHARPEN_KERNEL)
}

fn adaptive_binarize(gray: &GrayImage) -> GrayImage {
    adaptive_threshold(gray, ADAPTIVE_BLOCK_RADIUS)
}

/// Angle of the dominant edge of the foreground's minimum-area bounding
/// rectangle, folded into `(-45, 45]` degrees.
fn foreground_skew(points: &[Point<i32>]) -> f64 {
    let corners = min_area_rect(points);

    let edge = |a: Point<i32>, b: Point<i32>| {
        let dx = (b.x - a.x) as f64;
        let dy = (b.y - a.y) as f64;
        (dx, dy, dx * dx + dy * dy)
    };
    let (dx1, dy1, len1) = edge(corners[0], corners[1]);
    let (dx2, dy2, len2) = edge(corners[1], corners[2]);
    let (dx, dy) = if len1 >= len2 { (dx1, dy1) } else { (dx2, dy2) };

    let mut angle = dy.atan2(dx).to_degrees();
    while angle > 90.0 {
        angle -= 180.0;
    }
    while angle <= -90.0 {
        angle += 180.0;
    }
    // Skew beyond ±45° folds into the complementary quadrant.
    if angle > 45.0 {
        angle -= 90.0;
    } else if angle < -45.0 {
        angle += 90.0;
    }
    angle
}

/// Estimate and correct page rotation. Returns the corrected image and the
/// applied angle in degrees (0.0 when the page is too empty to estimate).
fn deskew(gray: &GrayImage) -> (GrayImage, f64) {
    let mut inverted = gray.clone();
    for pixel in inverted.pixels_mut() {
        pixel[0] = 255 - pixel[0];
    }
    let level = otsu_level(&inverted);

    let mut points = Vec::new();
    for (x, y, pixel) in inverted.enumerate_pixels() {
        if pixel[0] > level {
            points.push(Point::new(x as i32, y as i32));
        }
    }
    if points.len() < MIN_FOREGROUND_PIXELS {
        return (gray.clone(), 0.0);
    }

    let angle = -foreground_skew(&points);
    if angle == 0.0 {
        return (gray.clone(), 0.0);
    }

    let rotated = rotate_about_center(
        gray,
        (-angle).to_radians() as f32,
        Interpolation::Bicubic,
        Luma([255u8]),
    );
    (rotated, angle)
}

/// Write one debug stage image, creating the directory on first use.
fn save_debug_image(dir: &Path, name: &str, image: &GrayImage) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    image
        .save(&path)
        .map_err(|e| crate::TabulaireError::ImageProcessing {
            message: format!("Failed to write debug image '{}': {}", path.display(), e),
            source: Some(Box::new(e)),
        })?;
    Ok(path)
}

/// Normalize one raster page into an OCR-ready binary image.
///
/// Stages run in fixed order on the grayscale form: contrast enhancement,
/// denoising, deskew, sharpening, adaptive binarization. When `debug_dir`
/// is given, every intermediate is persisted there as a numbered PNG.
pub fn normalize_page(page: &DynamicImage, debug_dir: Option<&Path>) -> Result<NormalizedPage> {
    let gray = page.to_luma8();
    let contrasted = enhance_contrast(&gray);
    let denoised = denoise(&contrasted);
    let (deskewed, deskew_angle) = deskew(&denoised);
    let sharpened = sharpen(&deskewed);
    let binary = adaptive_binarize(&sharpened);

    tracing::debug!(
        width = binary.width(),
        height = binary.height(),
        deskew_angle,
        "page normalized"
    );

    let mut debug_paths = BTreeMap::new();
    if let Some(dir) = debug_dir {
        let stages: [(&str, &str, &GrayImage); 6] = [
            ("gray", "01_gray.png", &gray),
            ("contrast", "02_contrast.png", &contrasted),
            ("denoise", "03_denoise.png", &denoised),
            ("deskew", "04_deskew.png", &deskewed),
            ("sharpen", "05_sharpen.png", &sharpened),
            ("final_binary", "06_final_binary.png", &binary),
        ];
        for (stage, file_name, stage_image) in stages {
            let path = save_debug_image(dir, file_name, stage_image)?;
            debug_paths.insert(stage.to_string(), path.display().to_string());
        }
    }

    Ok(NormalizedPage {
        image: binary,
        deskew_angle,
        debug_paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_page(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([255u8]))
    }

    #[test]
    fn test_deskew_blank_page_is_noop() {
        let page = white_page(200, 200);
        let (out, angle) = deskew(&page);
        assert_eq!(angle, 0.0);
        assert_eq!(out.dimensions(), (200, 200));
    }

    #[test]
    fn test_deskew_guard_below_foreground_floor() {
        let mut page = white_page(200, 200);
        // 30 dark pixels: under the 50-pixel floor.
        for i in 0..30 {
            page.put_pixel(10 + i, 100, Luma([0u8]));
        }
        let (_, angle) = deskew(&page);
        assert_eq!(angle, 0.0);
    }

    #[test]
    fn test_deskew_horizontal_text_block_measures_zero() {
        let mut page = white_page(300, 100);
        for x in 50..250 {
            for y in 45..55 {
                page.put_pixel(x, y, Luma([0u8]));
            }
        }
        let (out, angle) = deskew(&page);
        assert!(angle.abs() < 1e-9, "axis-aligned block must not rotate, got {angle}");
        assert_eq!(out.dimensions(), (300, 100));
    }

    #[test]
    fn test_foreground_skew_folds_vertical_into_zero() {
        // A tall thin column: dominant edge is vertical (90°), which folds
        // into the complementary quadrant.
        let points: Vec<Point<i32>> = (0..200)
            .flat_map(|y| [Point::new(10, y), Point::new(12, y)])
            .collect();
        let angle = foreground_skew(&points);
        assert!(angle.abs() < 1e-9, "got {angle}");
    }

    #[test]
    fn test_adaptive_binarize_output_is_binary() {
        let mut page = white_page(64, 64);
        for x in 10..30 {
            for y in 10..20 {
                page.put_pixel(x, y, Luma([40u8]));
            }
        }
        let binary = adaptive_binarize(&page);
        assert!(binary.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_enhance_contrast_preserves_dimensions_and_polarity() {
        let mut page = white_page(80, 80);
        for x in 0..40 {
            for y in 0..80 {
                page.put_pixel(x, y, Luma([30u8]));
            }
        }
        let enhanced = enhance_contrast(&page);
        assert_eq!(enhanced.dimensions(), (80, 80));
        // Dark half stays darker than the light half.
        let left: u64 = (0..40u32).map(|x| enhanced.get_pixel(x, 40)[0] as u64).sum();
        let right: u64 = (40..80u32).map(|x| enhanced.get_pixel(x, 40)[0] as u64).sum();
        assert!(left < right);
    }

    #[test]
    fn test_enhance_contrast_deterministic() {
        let mut page = white_page(50, 50);
        for i in 0..50u32 {
            page.put_pixel(i, i, Luma([(i * 5) as u8]));
        }
        assert_eq!(enhance_contrast(&page), enhance_contrast(&page));
    }

    #[test]
    fn test_normalize_page_without_debug() {
        let page = DynamicImage::ImageLuma8(white_page(120, 90));
        let normalized = normalize_page(&page, None).unwrap();
        assert_eq!(normalized.image.dimensions(), (120, 90));
        assert_eq!(normalized.deskew_angle, 0.0);
        assert!(normalized.debug_paths.is_empty());
    }

    #[test]
    fn test_normalize_page_persists_debug_stages() {
        let dir = tempfile::tempdir().unwrap();
        let page = DynamicImage::ImageLuma8(white_page(64, 64));
        let normalized = normalize_page(&page, Some(dir.path())).unwrap();

        assert_eq!(normalized.debug_paths.len(), 6);
        for stage in ["gray", "contrast", "denoise", "deskew", "sharpen", "final_binary"] {
            let path = normalized.debug_paths.get(stage).expect("stage path recorded");
            assert!(std::path::Path::new(path).exists(), "missing {stage}");
        }
        assert!(dir.path().join("01_gray.png").exists());
        assert!(dir.path().join("06_final_binary.png").exists());
    }
}
