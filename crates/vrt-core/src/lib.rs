//! VRT Core Library
//!
//! Screenshot comparison for visual regression testing: three pixel diff
//! engines behind one [`ImageComparator`] contract, and a [`VlmVerifier`] that
//! lets a vision-language judge resolve borderline diffs.

pub mod compare;
pub mod domain;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod store;
pub mod telemetry;
pub mod verify;

pub use compare::{CompareService, ImageComparison};

pub use domain::{DiffResult, IgnoreArea, ImageCompareInput, TestStatus};

pub use engine::{
    check_canvas, status_for, DiffAlgorithm, ImageComparator, ImagePair, LookSame,
    LookSameComparator, LookSameConfig, PixelDiff, PixelDiffEngine, Pixelmatch,
    PixelmatchComparator, PixelmatchConfig, Structural, StructuralComparator, StructuralConfig,
    MAX_CANVAS_PIXELS,
};

pub use error::{CompareError, Result};

pub use metrics::{Metrics, METRICS};

pub use obs::ComparisonSpan;

pub use store::{
    decode_image, encode_png, FsImageStore, ImageKind, ImageStore, MemoryImageStore, StoreError,
};

pub use verify::{arbitrate, degrade, VlmVerifier, NO_DESCRIPTION, VLM_FAILURE_PREFIX};

pub use vlm_judge;
