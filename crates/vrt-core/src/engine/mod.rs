//! Pixel diff engine.
//!
//! [`PixelDiffEngine`] owns everything the backends share: loading images,
//! canvas padding, ignore masking, out-of-overlap counting, status policy and
//! diff persistence. A backend is a [`DiffAlgorithm`] that only decides which
//! pixels inside the overlap differ.
//!
//! | Backend        | Decision rule                                   |
//! |----------------|-------------------------------------------------|
//! | [`Pixelmatch`] | YIQ distance against a squared threshold        |
//! | [`LookSame`]   | CIEDE2000 distance against a JND tolerance      |
//! | [`Structural`] | blockwise SSIM against a similarity floor       |

pub mod color;
pub mod looks_same;
pub mod pixelmatch;
pub mod structural;

use std::sync::Arc;

use async_trait::async_trait;
use image::{imageops, Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::domain::{DiffResult, IgnoreArea, ImageCompareInput, TestStatus};
use crate::error::{CompareError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::store::{ImageKind, ImageStore};

pub use looks_same::{LookSame, LookSameConfig};
pub use pixelmatch::{Pixelmatch, PixelmatchConfig};
pub use structural::{Structural, StructuralConfig};

/// Color of counted mismatches in the diff image.
pub const DIFF_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
/// Color of differences excused as antialiasing.
pub const AA_COLOR: Rgba<u8> = Rgba([255, 255, 0, 255]);
/// Opacity of the grayscale baseline drawn under the highlights.
const BACKGROUND_ALPHA: f64 = 0.1;
/// Largest canvas (in pixels) a comparison will allocate.
pub const MAX_CANVAS_PIXELS: u64 = 1 << 25;

/// Anything that can turn a comparison request into a [`DiffResult`].
#[async_trait]
pub trait ImageComparator: Send + Sync {
    async fn get_diff(&self, input: &ImageCompareInput) -> Result<DiffResult>;
}

/// Per-pixel decision rule of a backend.
pub trait DiffAlgorithm: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Count mismatched, unmasked pixels inside the overlap of `pair` and
    /// paint them (and excused antialiasing) onto `diff`.
    fn count_mismatches(&self, pair: &ImagePair, diff: &mut RgbaImage) -> u64;

    /// Compare two decoded images.
    fn diff(&self, baseline: &RgbaImage, image: &RgbaImage, areas: &[IgnoreArea]) -> PixelDiff {
        let pair = ImagePair::new(baseline, image, areas);
        let mut diff = faded_background(&pair.baseline);

        let mut mismatched = if pair.baseline == pair.image {
            0
        } else {
            self.count_mismatches(&pair, &mut diff)
        };
        mismatched += count_outside_overlap(&pair, &mut diff);

        PixelDiff {
            mismatched,
            width: pair.width(),
            height: pair.height(),
            same_dimension: pair.is_same_dimension(),
            image: diff,
        }
    }
}

/// Raw outcome of comparing two images.
#[derive(Debug, Clone)]
pub struct PixelDiff {
    pub mismatched: u64,
    /// Canvas width.
    pub width: u32,
    /// Canvas height.
    pub height: u32,
    pub same_dimension: bool,
    /// Rendered diff visualization, canvas sized.
    pub image: RgbaImage,
}

impl PixelDiff {
    /// Mismatched share of the canvas in percent. 0 for an empty canvas.
    pub fn diff_percent(&self) -> f64 {
        let area = u64::from(self.width) * u64::from(self.height);
        if area == 0 {
            return 0.0;
        }
        self.mismatched as f64 / area as f64 * 100.0
    }
}

/// Reject image pairs whose shared canvas exceeds [`MAX_CANVAS_PIXELS`].
///
/// A 1xN baseline against an Nx1 candidate needs an NxN canvas, so the check
/// runs on dimensions before anything is allocated.
pub fn check_canvas(baseline: (u32, u32), image: (u32, u32)) -> Result<()> {
    let (width, height) = (baseline.0.max(image.0), baseline.1.max(image.1));
    if u64::from(width) * u64::from(height) > MAX_CANVAS_PIXELS {
        return Err(CompareError::CanvasTooLarge {
            width,
            height,
            limit: MAX_CANVAS_PIXELS,
        });
    }
    Ok(())
}

/// `ok` when the mismatch share is within tolerance, else `unresolved`.
pub fn status_for(diff_percent: f64, tolerance_percent: f64) -> TestStatus {
    if diff_percent <= tolerance_percent {
        TestStatus::Ok
    } else {
        TestStatus::Unresolved
    }
}

/// Rasterized ignore areas for one canvas.
#[derive(Debug, Clone)]
struct IgnoreMask {
    width: u32,
    bits: Vec<bool>,
}

impl IgnoreMask {
    fn new(areas: &[IgnoreArea], width: u32, height: u32) -> Self {
        let clipped: Vec<_> = areas.iter().filter_map(|a| a.clip(width, height)).collect();
        if clipped.is_empty() {
            return IgnoreMask {
                width,
                bits: Vec::new(),
            };
        }

        let mut bits = vec![false; width as usize * height as usize];
        for (x0, y0, x1, y1) in clipped {
            for y in y0..y1 {
                let row = y as usize * width as usize;
                bits[row + x0 as usize..row + x1 as usize].fill(true);
            }
        }
        IgnoreMask { width, bits }
    }

    fn contains(&self, x: u32, y: u32) -> bool {
        !self.bits.is_empty() && self.bits[y as usize * self.width as usize + x as usize]
    }
}

/// Baseline and candidate placed at the origin of a shared canvas.
///
/// The canvas spans the larger of each dimension; area not covered by an
/// image is transparent.
#[derive(Debug, Clone)]
pub struct ImagePair {
    pub baseline: RgbaImage,
    pub image: RgbaImage,
    overlap: (u32, u32),
    same_dimension: bool,
    mask: IgnoreMask,
}

impl ImagePair {
    pub fn new(baseline: &RgbaImage, image: &RgbaImage, areas: &[IgnoreArea]) -> Self {
        let (bw, bh) = baseline.dimensions();
        let (iw, ih) = image.dimensions();
        let (width, height) = (bw.max(iw), bh.max(ih));

        ImagePair {
            baseline: pad(baseline, width, height),
            image: pad(image, width, height),
            overlap: (bw.min(iw), bh.min(ih)),
            same_dimension: (bw, bh) == (iw, ih),
            mask: IgnoreMask::new(areas, width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.baseline.width()
    }

    pub fn height(&self) -> u32 {
        self.baseline.height()
    }

    /// Size of the region covered by both images.
    pub fn overlap(&self) -> (u32, u32) {
        self.overlap
    }

    pub fn is_same_dimension(&self) -> bool {
        self.same_dimension
    }

    /// Whether `(x, y)` lies in any ignore area.
    pub fn is_ignored(&self, x: u32, y: u32) -> bool {
        self.mask.contains(x, y)
    }

    /// Coordinates of the unmasked overlap pixels whose RGBA values differ.
    pub fn differing_pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let (ow, oh) = self.overlap;
        (0..oh)
            .flat_map(move |y| (0..ow).map(move |x| (x, y)))
            .filter(move |&(x, y)| {
                !self.is_ignored(x, y) && self.baseline.get_pixel(x, y) != self.image.get_pixel(x, y)
            })
    }
}

fn pad(img: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    let mut canvas = RgbaImage::new(width, height);
    imageops::replace(&mut canvas, img, 0, 0);
    canvas
}

/// Grayscale copy of `img`, faded toward white.
fn faded_background(img: &RgbaImage) -> RgbaImage {
    RgbaImage::from_fn(img.width(), img.height(), |x, y| {
        let px = img.get_pixel(x, y).0;
        let alpha = BACKGROUND_ALPHA * f64::from(px[3]) / 255.0;
        let value = color::blend(color::rgb2y(px[0].into(), px[1].into(), px[2].into()), alpha);
        let v = value.round().clamp(0.0, 255.0) as u8;
        Rgba([v, v, v, 255])
    })
}

fn count_outside_overlap(pair: &ImagePair, diff: &mut RgbaImage) -> u64 {
    if pair.is_same_dimension() {
        return 0;
    }
    let (ow, oh) = pair.overlap();
    let mut count = 0;
    for y in 0..pair.height() {
        for x in 0..pair.width() {
            if (x < ow && y < oh) || pair.is_ignored(x, y) {
                continue;
            }
            diff.put_pixel(x, y, DIFF_COLOR);
            count += 1;
        }
    }
    count
}

/// Store-backed comparator for one [`DiffAlgorithm`].
pub struct PixelDiffEngine<A> {
    store: Arc<dyn ImageStore>,
    algorithm: A,
}

pub type PixelmatchComparator = PixelDiffEngine<Pixelmatch>;
pub type LookSameComparator = PixelDiffEngine<LookSame>;
pub type StructuralComparator = PixelDiffEngine<Structural>;

impl<A: DiffAlgorithm> PixelDiffEngine<A> {
    pub fn new(store: Arc<dyn ImageStore>, algorithm: A) -> Self {
        PixelDiffEngine { store, algorithm }
    }

    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    async fn persist_diff(&self, diff: &RgbaImage) -> Option<String> {
        match self.store.save_image(ImageKind::Diff, diff).await {
            Ok(name) => Some(name),
            Err(e) => {
                warn!(engine = self.algorithm.name(), error = %e, "failed to persist diff image");
                None
            }
        }
    }
}

#[async_trait]
impl<A> ImageComparator for PixelDiffEngine<A>
where
    A: DiffAlgorithm + Clone + 'static,
{
    async fn get_diff(&self, input: &ImageCompareInput) -> Result<DiffResult> {
        let engine = self.algorithm.name();

        let Some(baseline_name) = input.baseline.as_deref() else {
            debug!(engine, image = %input.image, "no baseline, new test");
            return Ok(DiffResult::no_baseline());
        };
        let Some(baseline) = self.store.get_image(baseline_name).await? else {
            warn!(engine, baseline = %baseline_name, "baseline missing from store, treating as new");
            return Ok(DiffResult::no_baseline());
        };
        let image = self
            .store
            .get_image(&input.image)
            .await?
            .ok_or_else(|| CompareError::ImageNotFound(input.image.clone()))?;

        check_canvas(baseline.dimensions(), image.dimensions())?;

        let algorithm = self.algorithm.clone();
        let areas = input.ignore_areas.clone();
        let diff =
            tokio::task::spawn_blocking(move || algorithm.diff(&baseline, &image, &areas)).await?;

        let diff_percent = diff.diff_percent();
        let diff_name = if input.save_diff_as_file && diff.mismatched > 0 {
            self.persist_diff(&diff.image).await
        } else {
            None
        };

        let result = DiffResult {
            status: status_for(diff_percent, input.diff_tollerance_percent),
            diff_name,
            pixel_mis_match_count: diff.mismatched,
            diff_percent,
            is_same_dimension: diff.same_dimension,
            vlm_description: None,
        };

        METRICS.inc_comparisons();
        obs::emit_comparison_finished(engine, &result);
        Ok(result)
    }
}
