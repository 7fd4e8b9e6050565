//! Exact pixel threshold backend.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::color::{antialiased, yiq_delta, MAX_YIQ_DELTA};
use super::{DiffAlgorithm, ImagePair, AA_COLOR, DIFF_COLOR};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelmatchConfig {
    /// Matching threshold, 0.0 - 1.0. Smaller is more sensitive.
    pub threshold: f64,
    /// Excuse differences that look like antialiasing.
    pub ignore_antialiasing: bool,
}

impl Default for PixelmatchConfig {
    fn default() -> Self {
        PixelmatchConfig {
            threshold: 0.1,
            ignore_antialiasing: true,
        }
    }
}

/// Pixelmatch-style comparison in YIQ space.
#[derive(Debug, Clone, Default)]
pub struct Pixelmatch {
    config: PixelmatchConfig,
}

impl Pixelmatch {
    pub fn new(config: PixelmatchConfig) -> Self {
        Pixelmatch { config }
    }

    pub fn config(&self) -> &PixelmatchConfig {
        &self.config
    }

    fn max_delta(&self) -> f64 {
        MAX_YIQ_DELTA * self.config.threshold * self.config.threshold
    }
}

impl DiffAlgorithm for Pixelmatch {
    fn name(&self) -> &'static str {
        "pixelmatch"
    }

    fn count_mismatches(&self, pair: &ImagePair, diff: &mut RgbaImage) -> u64 {
        let (width, height) = pair.overlap();
        let max_delta = self.max_delta();
        let mut count = 0;

        for y in 0..height {
            for x in 0..width {
                if pair.is_ignored(x, y) {
                    continue;
                }
                let delta = yiq_delta(
                    pair.baseline.get_pixel(x, y).0,
                    pair.image.get_pixel(x, y).0,
                    false,
                );
                if delta.abs() <= max_delta {
                    continue;
                }

                let excused = self.config.ignore_antialiasing
                    && (antialiased(&pair.baseline, x, y, width, height, &pair.image)
                        || antialiased(&pair.image, x, y, width, height, &pair.baseline));
                if excused {
                    diff.put_pixel(x, y, AA_COLOR);
                } else {
                    diff.put_pixel(x, y, DIFF_COLOR);
                    count += 1;
                }
            }
        }
        count
    }
}
