//! Luminance to bitmap thresholding.
//!
//! `Hybrid` computes a black point per 8x8 block and thresholds each block
//! against the mean of its 5x5 block neighbourhood, which copes with uneven
//! lighting. `Global` uses a single Otsu threshold from the histogram.

use serde::{Deserialize, Serialize};

use super::image::{Bitmap, LumaImage};

const BLOCK: usize = 8;
const MIN_DYNAMIC_RANGE: u8 = 24;
/// Below this size in either dimension `Hybrid` degrades to `Global`
const MIN_HYBRID_DIM: usize = BLOCK * 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binarizer {
    Hybrid,
    Global,
}

impl Binarizer {
    pub const ALL: [Binarizer; 2] = [Binarizer::Hybrid, Binarizer::Global];

    pub fn apply(self, luma: &LumaImage) -> Bitmap {
        match self {
            Binarizer::Hybrid => hybrid(luma),
            Binarizer::Global => global(luma),
        }
    }
}

pub fn global(luma: &LumaImage) -> Bitmap {
    let threshold = otsu_threshold(luma.as_raw());
    Bitmap::from_fn(luma.width(), luma.height(), |x, y| luma.get(x, y) <= threshold)
}

/// Otsu's method: the threshold maximising between-class variance
pub fn otsu_threshold(samples: &[u8]) -> u8 {
    let mut hist = [0u32; 256];
    for &p in samples {
        hist[p as usize] += 1;
    }

    let total = samples.len() as f64;
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut best_threshold = 0u8;
    let mut best_variance = 0.0f64;
    let mut weight_bg = 0.0f64;
    let mut sum_bg = 0.0f64;

    for (t, &count) in hist.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }

        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if between > best_variance {
            best_variance = between;
            best_threshold = t as u8;
        }
    }

    best_threshold
}

pub fn hybrid(luma: &LumaImage) -> Bitmap {
    let (w, h) = (luma.width(), luma.height());
    if w < MIN_HYBRID_DIM || h < MIN_HYBRID_DIM {
        return global(luma);
    }

    let blocks_x = w.div_ceil(BLOCK);
    let blocks_y = h.div_ceil(BLOCK);
    let black_points = black_points(luma, blocks_x, blocks_y);

    // per-block threshold: mean black point over the clamped 5x5 neighbourhood
    let mut thresholds = vec![0u8; blocks_x * blocks_y];
    for by in 0..blocks_y {
        let top = by.clamp(2, blocks_y - 3);
        for bx in 0..blocks_x {
            let left = bx.clamp(2, blocks_x - 3);
            let mut sum = 0u32;
            for ny in top - 2..=top + 2 {
                for nx in left - 2..=left + 2 {
                    sum += black_points[ny * blocks_x + nx] as u32;
                }
            }
            thresholds[by * blocks_x + bx] = (sum / 25) as u8;
        }
    }

    Bitmap::from_fn(w, h, |x, y| {
        luma.get(x, y) <= thresholds[(y / BLOCK) * blocks_x + x / BLOCK]
    })
}

fn black_points(luma: &LumaImage, blocks_x: usize, blocks_y: usize) -> Vec<u8> {
    let (w, h) = (luma.width(), luma.height());
    let mut points = vec![0u8; blocks_x * blocks_y];

    for by in 0..blocks_y {
        // edge blocks are shifted inward so every block samples a full 8x8
        let y0 = (by * BLOCK).min(h - BLOCK);
        for bx in 0..blocks_x {
            let x0 = (bx * BLOCK).min(w - BLOCK);
            let (mut sum, mut min, mut max) = (0u32, u8::MAX, u8::MIN);
            for y in y0..y0 + BLOCK {
                for &p in &luma.row(y)[x0..x0 + BLOCK] {
                    sum += p as u32;
                    min = min.min(p);
                    max = max.max(p);
                }
            }

            let mut average = (sum / (BLOCK * BLOCK) as u32) as u8;
            if max - min <= MIN_DYNAMIC_RANGE {
                // flat block: assume background unless the neighbours say it sits in a dark area
                average = min / 2;
                if by > 0 && bx > 0 {
                    let above = points[(by - 1) * blocks_x + bx] as u32;
                    let left = points[by * blocks_x + bx - 1] as u32;
                    let diag = points[(by - 1) * blocks_x + bx - 1] as u32;
                    let neighbours = ((above + 2 * left + diag) / 4) as u8;
                    if min < neighbours {
                        average = neighbours;
                    }
                }
            }
            points[by * blocks_x + bx] = average;
        }
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(w: usize, h: usize, cell: usize, dark: u8, light: u8) -> LumaImage {
        let data = (0..h)
            .flat_map(|y| (0..w).map(move |x| if (x / cell + y / cell) % 2 == 0 { dark } else { light }))
            .collect();
        LumaImage::from_raw(w, h, data)
    }

    #[test]
    fn otsu_splits_bimodal_histogram() {
        let mut samples: Vec<u8> = (0..50).collect();
        samples.extend((0..50).map(|i| 200 + (i % 56) as u8));
        let t = otsu_threshold(&samples);
        assert!((49..200).contains(&t), "otsu threshold was {}", t);
    }

    #[test]
    fn global_marks_dark_cells() {
        let luma = checkerboard(16, 16, 4, 20, 230);
        let bitmap = global(&luma);
        assert!(bitmap.is_dark(0, 0));
        assert!(!bitmap.is_dark(4, 0));
    }

    #[test]
    fn hybrid_handles_lighting_gradient() {
        // dark cells brighten from 0 to 60 left to right, light cells sit 120 above them
        let (w, h, cell) = (96, 64, 8);
        let data = (0..h)
            .flat_map(|y| {
                (0..w).map(move |x| {
                    let base = (x * 60 / w) as u8;
                    if (x / cell + y / cell) % 2 == 0 {
                        base
                    } else {
                        base + 120
                    }
                })
            })
            .collect();
        let luma = LumaImage::from_raw(w, h, data);
        let bitmap = hybrid(&luma);
        for y in (0..h).step_by(cell) {
            for x in (0..w).step_by(cell) {
                let expected = (x / cell + y / cell) % 2 == 0;
                assert_eq!(bitmap.is_dark(x + 3, y + 3), expected, "cell at {},{}", x, y);
            }
        }
    }

    #[test]
    fn hybrid_falls_back_on_small_images() {
        let luma = checkerboard(16, 16, 4, 10, 240);
        assert_eq!(hybrid(&luma), global(&luma));
    }

    #[test]
    fn uniform_white_stays_light() {
        let luma = LumaImage::from_raw(48, 48, vec![255; 48 * 48]);
        let bitmap = hybrid(&luma);
        assert!((0..48).all(|y| bitmap.row(y).iter().all(|dark| !dark)));
    }
}
