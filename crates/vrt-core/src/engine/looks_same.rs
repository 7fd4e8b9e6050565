//! Perceptual color distance backend (CIEDE2000).

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::color::{antialiased, ciede2000, to_lab};
use super::{DiffAlgorithm, ImagePair, AA_COLOR, DIFF_COLOR};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookSameConfig {
    /// Count every changed pixel, ignoring `tolerance`.
    pub strict: bool,
    /// Smallest CIEDE2000 distance that counts as a difference.
    pub tolerance: f64,
    pub ignore_antialiasing: bool,
}

impl Default for LookSameConfig {
    fn default() -> Self {
        LookSameConfig {
            strict: false,
            tolerance: 2.3,
            ignore_antialiasing: true,
        }
    }
}

/// Comparison by just-noticeable color difference.
#[derive(Debug, Clone, Default)]
pub struct LookSame {
    config: LookSameConfig,
}

impl LookSame {
    pub fn new(config: LookSameConfig) -> Self {
        LookSame { config }
    }

    pub fn config(&self) -> &LookSameConfig {
        &self.config
    }

    fn differs(&self, a: [u8; 4], b: [u8; 4]) -> bool {
        if a == b {
            return false;
        }
        if self.config.strict {
            return true;
        }
        ciede2000(to_lab(a), to_lab(b)) >= self.config.tolerance
    }
}

impl DiffAlgorithm for LookSame {
    fn name(&self) -> &'static str {
        "looks-same"
    }

    fn count_mismatches(&self, pair: &ImagePair, diff: &mut RgbaImage) -> u64 {
        let (width, height) = pair.overlap();
        let mut count = 0;

        for (x, y) in pair.differing_pixels() {
            if !self.differs(pair.baseline.get_pixel(x, y).0, pair.image.get_pixel(x, y).0) {
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
        count
    }
}
