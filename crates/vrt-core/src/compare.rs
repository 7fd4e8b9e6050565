//! Engine selection and batch comparison.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use vlm_judge::{parse_config, ProviderRegistry};

use crate::domain::{DiffResult, ImageCompareInput};
use crate::engine::{
    ImageComparator, LookSame, LookSameConfig, PixelDiffEngine, Pixelmatch, PixelmatchConfig,
    Structural, StructuralConfig,
};
use crate::error::{CompareError, Result};
use crate::metrics::METRICS;
use crate::obs::ComparisonSpan;
use crate::store::ImageStore;
use crate::verify::VlmVerifier;

/// Comparison engine configured for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageComparison {
    #[default]
    Pixelmatch,
    LookSame,
    Structural,
    /// Pixelmatch, with unresolved results adjudicated by a judge.
    Vlm,
}

impl ImageComparison {
    pub const ALL: [ImageComparison; 4] = [
        ImageComparison::Pixelmatch,
        ImageComparison::LookSame,
        ImageComparison::Structural,
        ImageComparison::Vlm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageComparison::Pixelmatch => "pixelmatch",
            ImageComparison::LookSame => "lookSame",
            ImageComparison::Structural => "structural",
            ImageComparison::Vlm => "vlm",
        }
    }
}

impl fmt::Display for ImageComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageComparison {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "pixelmatch" => Ok(ImageComparison::Pixelmatch),
            "looksame" | "lookssame" => Ok(ImageComparison::LookSame),
            "structural" => Ok(ImageComparison::Structural),
            "vlm" => Ok(ImageComparison::Vlm),
            _ => Err(format!(
                "unknown comparison engine '{s}' (expected one of: pixelmatch, lookSame, structural, vlm)"
            )),
        }
    }
}

/// Entry point for running comparisons against one image store.
///
/// Engine configs arrive as raw JSON strings and are resolved per call, so a
/// single service can serve projects with different settings.
#[derive(Clone)]
pub struct CompareService {
    store: Arc<dyn ImageStore>,
    verifier: Arc<VlmVerifier>,
}

impl CompareService {
    pub fn new(store: Arc<dyn ImageStore>, providers: ProviderRegistry) -> Self {
        let verifier = Arc::new(VlmVerifier::new(Arc::clone(&store), providers));
        Self { store, verifier }
    }

    /// Service whose `vlm` engine is a preassembled verifier.
    pub fn with_verifier(store: Arc<dyn ImageStore>, verifier: VlmVerifier) -> Self {
        Self {
            store,
            verifier: Arc::new(verifier),
        }
    }

    pub fn store(&self) -> &Arc<dyn ImageStore> {
        &self.store
    }

    /// Pixel comparator for `comparison` with `raw_config` resolved over its
    /// defaults. `None` for [`ImageComparison::Vlm`], which needs a judge config.
    pub fn comparator(
        &self,
        comparison: ImageComparison,
        raw_config: &str,
    ) -> Option<Arc<dyn ImageComparator>> {
        let store = Arc::clone(&self.store);
        let comparator: Arc<dyn ImageComparator> = match comparison {
            ImageComparison::Pixelmatch => {
                let config = parse_config(raw_config, &PixelmatchConfig::default());
                Arc::new(PixelDiffEngine::new(store, Pixelmatch::new(config)))
            }
            ImageComparison::LookSame => {
                let config = parse_config(raw_config, &LookSameConfig::default());
                Arc::new(PixelDiffEngine::new(store, LookSame::new(config)))
            }
            ImageComparison::Structural => {
                let config = parse_config(raw_config, &StructuralConfig::default());
                Arc::new(PixelDiffEngine::new(store, Structural::new(config)))
            }
            ImageComparison::Vlm => return None,
        };
        Some(comparator)
    }

    /// Compare one input with the selected engine.
    pub async fn get_diff(
        &self,
        input: &ImageCompareInput,
        comparison: ImageComparison,
        raw_config: &str,
    ) -> Result<DiffResult> {
        let span = ComparisonSpan::new(comparison.as_str());
        span.wrap(async {
            debug!(image = %input.image, baseline = ?input.baseline, "comparison started");
            match self.comparator(comparison, raw_config) {
                Some(comparator) => comparator.get_diff(input).await,
                None => {
                    let config = VlmVerifier::parse_config(raw_config);
                    self.verifier.get_diff(input, &config).await
                }
            }
        })
        .await
    }

    /// Compare many inputs concurrently.
    ///
    /// Results come back in input order. A failing comparison only fails its
    /// own slot.
    pub async fn compare_batch(
        &self,
        inputs: Vec<ImageCompareInput>,
        comparison: ImageComparison,
        raw_config: &str,
    ) -> Vec<Result<DiffResult>> {
        let total = inputs.len();
        let raw_config: Arc<str> = Arc::from(raw_config);

        let mut join_set = JoinSet::new();
        for (idx, input) in inputs.into_iter().enumerate() {
            let service = self.clone();
            let raw_config = Arc::clone(&raw_config);
            join_set.spawn(async move {
                let result = service.get_diff(&input, comparison, &raw_config).await;
                (idx, result)
            });
        }

        let mut slots: Vec<Option<Result<DiffResult>>> = (0..total).map(|_| None).collect();
        let mut join_failure = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => {
                    warn!(error = %e, "comparison task join error");
                    join_failure = Some(e.to_string());
                }
            }
        }

        METRICS.flush();
        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(CompareError::Task(
                        join_failure
                            .clone()
                            .unwrap_or_else(|| "comparison task did not complete".to_string()),
                    ))
                })
            })
            .collect()
    }
}

impl fmt::Debug for CompareService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompareService")
            .field("providers", self.verifier.providers())
            .finish_non_exhaustive()
    }
}
