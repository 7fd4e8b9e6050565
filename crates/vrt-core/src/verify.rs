//! Semantic verification of borderline pixel diffs.
//!
//! [`VlmVerifier`] runs a pixel comparison first and only consults a judge
//! when the result is `unresolved`:
//!
//! ```text
//! new / ok ─────────────────────────────► returned as is
//! unresolved ─┬─ images unavailable ────► unresolved (unchanged)
//!             ├─ judge failed ──────────► unresolved + "VLM analysis failed: .."
//!             ├─ identical ─────────────► ok + description
//!             └─ different ─────────────► unresolved + description
//! ```
//!
//! Pixel evidence (counts, percent, diff name) always passes through intact.

use std::fmt::Display;
use std::sync::Arc;

use tracing::{debug, warn};
use vlm_judge::{
    decode_verdict, parse_config, ProviderRegistry, VlmConfig, VlmError, VlmVerdict,
};

use crate::domain::{DiffResult, ImageCompareInput, TestStatus};
use crate::engine::{ImageComparator, Pixelmatch, PixelmatchComparator};
use crate::error::Result;
use crate::metrics::METRICS;
use crate::obs;
use crate::store::{encode_png, ImageStore};

/// Prefix of `vlm_description` when the judge could not deliver a verdict.
pub const VLM_FAILURE_PREFIX: &str = "VLM analysis failed";
/// Description recorded when a verdict comes back with a blank one.
pub const NO_DESCRIPTION: &str = "No description provided";

/// Pixel comparison followed by judge adjudication.
pub struct VlmVerifier {
    store: Arc<dyn ImageStore>,
    pixel: Arc<dyn ImageComparator>,
    providers: ProviderRegistry,
}

impl VlmVerifier {
    /// Verifier using the default pixelmatch comparison as its first stage.
    pub fn new(store: Arc<dyn ImageStore>, providers: ProviderRegistry) -> Self {
        let pixel = Arc::new(PixelmatchComparator::new(
            Arc::clone(&store),
            Pixelmatch::default(),
        ));
        Self {
            store,
            pixel,
            providers,
        }
    }

    /// Replace the first-stage comparator.
    pub fn with_pixel_comparator(mut self, pixel: Arc<dyn ImageComparator>) -> Self {
        self.pixel = pixel;
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Resolve a raw JSON config over the judge defaults.
    pub fn parse_config(raw: &str) -> VlmConfig {
        parse_config(raw, &VlmConfig::default())
    }

    pub async fn get_diff(
        &self,
        input: &ImageCompareInput,
        config: &VlmConfig,
    ) -> Result<DiffResult> {
        // The judge needs the diff image, so it is always persisted.
        let input = ImageCompareInput {
            save_diff_as_file: true,
            ..input.clone()
        };
        let pixel = self.pixel.get_diff(&input).await?;
        if pixel.status != TestStatus::Unresolved {
            return Ok(pixel);
        }

        match self.adjudicate(&input, &pixel, config).await {
            Ok(Some(verdict)) => {
                obs::emit_vlm_verdict(config.provider, verdict.identical);
                if verdict.identical {
                    METRICS.inc_vlm_overrides();
                }
                Ok(arbitrate(pixel, verdict))
            }
            Ok(None) => Ok(pixel),
            Err(e) => {
                METRICS.inc_vlm_failures();
                obs::emit_vlm_degraded(config.provider, &e);
                Ok(degrade(pixel, &e))
            }
        }
    }

    /// Ask the configured judge about an unresolved result.
    ///
    /// `Ok(None)` when one of the three images is unavailable.
    async fn adjudicate(
        &self,
        input: &ImageCompareInput,
        pixel: &DiffResult,
        config: &VlmConfig,
    ) -> Result<Option<VlmVerdict>> {
        let Some(images) = self.load_images(input, pixel).await? else {
            warn!(image = %input.image, "missing images for VLM analysis, keeping pixel result");
            return Ok(None);
        };

        obs::emit_vlm_requested(config.provider, &config.model, pixel.diff_percent);
        METRICS.inc_vlm_requests();

        let response = self.providers.generate(config, &images).await?;
        let text = response
            .text(config.use_thinking)
            .ok_or(VlmError::EmptyResponse)?;
        debug!(response = %text, "VLM response");

        Ok(Some(decode_verdict(text)?))
    }

    /// Fetch baseline, candidate and diff in that order and PNG-encode them.
    async fn load_images(
        &self,
        input: &ImageCompareInput,
        pixel: &DiffResult,
    ) -> Result<Option<Vec<Vec<u8>>>> {
        let names = [
            input.baseline.as_deref(),
            Some(input.image.as_str()),
            pixel.diff_name.as_deref(),
        ];

        let mut images = Vec::with_capacity(names.len());
        for name in names {
            let image = match name {
                Some(name) => self.store.get_image(name).await?,
                None => None,
            };
            images.push(image);
        }

        images
            .into_iter()
            .map(|image| image.map(|img| encode_png(&img)).transpose())
            .collect::<std::result::Result<Option<Vec<_>>, _>>()
            .map_err(Into::into)
    }
}

/// Apply a judge verdict to an unresolved pixel result.
pub fn arbitrate(pixel: DiffResult, verdict: VlmVerdict) -> DiffResult {
    let description = if verdict.description.trim().is_empty() {
        NO_DESCRIPTION.to_string()
    } else {
        verdict.description
    };
    DiffResult {
        status: if verdict.identical {
            TestStatus::Ok
        } else {
            TestStatus::Unresolved
        },
        vlm_description: Some(description),
        ..pixel
    }
}

/// Keep the pixel result, annotated with why the judge could not decide.
pub fn degrade(pixel: DiffResult, error: &dyn Display) -> DiffResult {
    DiffResult {
        vlm_description: Some(format!("{VLM_FAILURE_PREFIX}: {error}")),
        ..pixel
    }
}
