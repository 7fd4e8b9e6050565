//! Comparison request and result types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a compared screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// No baseline existed; the candidate becomes the first baseline.
    New,
    /// Candidate accepted as equivalent to the baseline.
    Ok,
    /// Differences need a human decision.
    Unresolved,
    /// A human accepted the differences. Never produced by comparison.
    Approved,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::New => "new",
            TestStatus::Ok => "ok",
            TestStatus::Unresolved => "unresolved",
            TestStatus::Approved => "approved",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one comparison.
///
/// # Invariants
///
/// `status == New` exactly when no baseline was available. `diff_name` is
/// set only when a diff artifact was actually written. The numeric fields
/// always come from the pixel stage; semantic verification may change
/// `status` and `vlm_description` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub status: TestStatus,
    /// Store identifier of the persisted diff image.
    pub diff_name: Option<String>,
    pub pixel_mis_match_count: u64,
    /// Mismatched share of the compared canvas, 0.0 - 100.0.
    pub diff_percent: f64,
    /// `false` when baseline and candidate resolutions differ.
    pub is_same_dimension: bool,
    /// Judge explanation, or a failure marker when the judge could not answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlm_description: Option<String>,
}

impl DiffResult {
    /// Result for a comparison without a baseline.
    pub fn no_baseline() -> Self {
        DiffResult {
            status: TestStatus::New,
            diff_name: None,
            pixel_mis_match_count: 0,
            diff_percent: 0.0,
            is_same_dimension: true,
            vlm_description: None,
        }
    }

    /// Result for two equivalent images.
    pub fn equal() -> Self {
        DiffResult {
            status: TestStatus::Ok,
            ..Self::no_baseline()
        }
    }
}

/// Axis-aligned rectangle excluded from mismatch counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreArea {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl IgnoreArea {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        IgnoreArea {
            x,
            y,
            width,
            height,
        }
    }

    /// Half-open pixel bounds `(x0, y0, x1, y1)` clipped to a canvas, or
    /// `None` when nothing of the area is on it.
    pub fn clip(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x.saturating_add(self.width).min(width);
        let y1 = self.y.saturating_add(self.height).min(height);
        (self.x < x1 && self.y < y1).then_some((self.x, self.y, x1, y1))
    }
}

/// A comparison request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCompareInput {
    /// Stored baseline name; `None` means this is a new test.
    pub baseline: Option<String>,
    /// Stored candidate name.
    pub image: String,
    /// Largest `diff_percent` still accepted as `ok`.
    pub diff_tollerance_percent: f64,
    #[serde(default)]
    pub ignore_areas: Vec<IgnoreArea>,
    /// Persist a diff image when mismatches are found.
    #[serde(default)]
    pub save_diff_as_file: bool,
}

impl ImageCompareInput {
    pub fn new(baseline: Option<&str>, image: &str) -> Self {
        ImageCompareInput {
            baseline: baseline.map(str::to_string),
            image: image.to_string(),
            diff_tollerance_percent: 0.0,
            ignore_areas: Vec::new(),
            save_diff_as_file: false,
        }
    }

    pub fn with_tolerance(mut self, percent: f64) -> Self {
        self.diff_tollerance_percent = percent;
        self
    }

    pub fn with_ignore_area(mut self, area: IgnoreArea) -> Self {
        self.ignore_areas.push(area);
        self
    }

    pub fn with_saved_diff(mut self, save: bool) -> Self {
        self.save_diff_as_file = save;
        self
    }
}
