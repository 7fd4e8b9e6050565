//! Blockwise structural similarity backend.
//!
//! Tolerates diffuse low-amplitude noise (compression, subpixel rendering),
//! while any block whose structure actually changed contributes all of its
//! differing pixels. SSIM barely reacts to a flat brightness shift, so inside
//! blocks that still look similar a pixel counts when its YIQ distance exceeds
//! the colour threshold.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::color::{over_white, yiq_delta, MAX_YIQ_DELTA};
use super::{DiffAlgorithm, ImagePair, DIFF_COLOR};

const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralConfig {
    /// Edge length of the square comparison window, in pixels.
    pub block_size: u32,
    /// Blocks scoring below this SSIM count as changed.
    pub min_similarity: f64,
    /// Colour threshold, 0.0 - 1.0, applied inside similar blocks.
    pub threshold: f64,
}

impl Default for StructuralConfig {
    fn default() -> Self {
        StructuralConfig {
            block_size: 8,
            min_similarity: 0.95,
            threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Structural {
    config: StructuralConfig,
}

impl Structural {
    pub fn new(config: StructuralConfig) -> Self {
        Structural { config }
    }

    pub fn config(&self) -> &StructuralConfig {
        &self.config
    }
}

/// Running sums for one channel of one block.
#[derive(Default, Clone, Copy)]
struct Moments {
    a: f64,
    b: f64,
    aa: f64,
    bb: f64,
    ab: f64,
}

impl Moments {
    fn push(&mut self, a: f64, b: f64) {
        self.a += a;
        self.b += b;
        self.aa += a * a;
        self.bb += b * b;
        self.ab += a * b;
    }

    fn ssim(&self, n: f64) -> f64 {
        let (mean_a, mean_b) = (self.a / n, self.b / n);
        let var_a = self.aa / n - mean_a * mean_a;
        let var_b = self.bb / n - mean_b * mean_b;
        let cov = self.ab / n - mean_a * mean_b;
        ((2.0 * mean_a * mean_b + C1) * (2.0 * cov + C2))
            / ((mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2))
    }
}

/// SSIM of one block; the lowest score over the red, green and blue planes.
///
/// `None` when every pixel of the block is masked.
fn block_similarity(pair: &ImagePair, x0: u32, y0: u32, x1: u32, y1: u32) -> Option<f64> {
    let mut channels = [Moments::default(); 3];
    let mut n = 0u32;

    for y in y0..y1 {
        for x in x0..x1 {
            if pair.is_ignored(x, y) {
                continue;
            }
            let a = over_white(pair.baseline.get_pixel(x, y).0);
            let b = over_white(pair.image.get_pixel(x, y).0);
            for (c, m) in channels.iter_mut().enumerate() {
                m.push(a[c], b[c]);
            }
            n += 1;
        }
    }

    (n > 0).then(|| {
        channels
            .iter()
            .map(|m| m.ssim(f64::from(n)))
            .fold(f64::INFINITY, f64::min)
    })
}

impl DiffAlgorithm for Structural {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn count_mismatches(&self, pair: &ImagePair, diff: &mut RgbaImage) -> u64 {
        let (width, height) = pair.overlap();
        let block = self.config.block_size.max(1);
        let max_delta = MAX_YIQ_DELTA * self.config.threshold * self.config.threshold;
        let mut count = 0;

        for y0 in (0..height).step_by(block as usize) {
            for x0 in (0..width).step_by(block as usize) {
                let (x1, y1) = ((x0 + block).min(width), (y0 + block).min(height));

                let differing: Vec<(u32, u32)> = (y0..y1)
                    .flat_map(|y| (x0..x1).map(move |x| (x, y)))
                    .filter(|&(x, y)| {
                        !pair.is_ignored(x, y)
                            && pair.baseline.get_pixel(x, y) != pair.image.get_pixel(x, y)
                    })
                    .collect();
                if differing.is_empty() {
                    continue;
                }

                let similar = block_similarity(pair, x0, y0, x1, y1)
                    .is_some_and(|s| s >= self.config.min_similarity);

                for (x, y) in differing {
                    let counted = !similar
                        || yiq_delta(
                            pair.baseline.get_pixel(x, y).0,
                            pair.image.get_pixel(x, y).0,
                            false,
                        )
                        .abs()
                            > max_delta;
                    if counted {
                        diff.put_pixel(x, y, DIFF_COLOR);
                        count += 1;
                    }
                }
            }
        }
        count
    }
}
