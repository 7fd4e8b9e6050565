//! Shared fakes for vrt-core integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use vrt_core::vlm_judge::{
    ProviderKind, ProviderRegistry, VlmConfig, VlmError, VlmProvider, VlmProviderResponse,
};
use vrt_core::{DiffResult, ImageComparator, ImageCompareInput, TestStatus};

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

pub fn solid(width: u32, height: u32, px: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(width, height, px)
}

pub fn with_rect(base: &RgbaImage, x: u32, y: u32, w: u32, h: u32, px: Rgba<u8>) -> RgbaImage {
    let mut img = base.clone();
    for yy in y..y + h {
        for xx in x..x + w {
            img.put_pixel(xx, yy, px);
        }
    }
    img
}

/// What a [`ScriptedProvider`] answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Text {
        content: Option<String>,
        thinking: Option<String>,
    },
    Fail(String),
}

/// Judge double that returns one scripted reply and records every call.
pub struct ScriptedProvider {
    reply: Reply,
    calls: AtomicUsize,
    images: Mutex<Vec<Vec<Vec<u8>>>>,
    configs: Mutex<Vec<VlmConfig>>,
}

impl ScriptedProvider {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            images: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
        })
    }

    /// Provider answering with `content` only.
    pub fn answering(content: &str) -> Arc<Self> {
        Self::new(Reply::Text {
            content: Some(content.to_string()),
            thinking: None,
        })
    }

    pub fn verdict(identical: bool, description: &str) -> Arc<Self> {
        Self::answering(
            &serde_json::json!({ "identical": identical, "description": description }).to_string(),
        )
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::new(Reply::Fail(message.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Image payloads of each call.
    pub fn images(&self) -> Vec<Vec<Vec<u8>>> {
        self.images.lock().unwrap().clone()
    }

    pub fn configs(&self) -> Vec<VlmConfig> {
        self.configs.lock().unwrap().clone()
    }

    /// Registry routing every provider kind to `self`.
    pub fn registry(self: &Arc<Self>) -> ProviderRegistry {
        ProviderRegistry::new()
            .with_provider(ProviderKind::Ollama, Arc::clone(self) as Arc<dyn VlmProvider>)
            .with_provider(ProviderKind::Gemini, Arc::clone(self) as Arc<dyn VlmProvider>)
    }
}

#[async_trait]
impl VlmProvider for ScriptedProvider {
    async fn generate(
        &self,
        config: &VlmConfig,
        images: &[Vec<u8>],
    ) -> Result<VlmProviderResponse, VlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images.lock().unwrap().push(images.to_vec());
        self.configs.lock().unwrap().push(config.clone());
        match &self.reply {
            Reply::Text { content, thinking } => Ok(VlmProviderResponse {
                content: content.clone(),
                thinking: thinking.clone(),
            }),
            Reply::Fail(message) => Err(VlmError::Http(message.clone())),
        }
    }
}

/// Comparator double returning a fixed result and recording its inputs.
pub struct StubComparator {
    result: DiffResult,
    seen: Mutex<Vec<ImageCompareInput>>,
}

impl StubComparator {
    pub fn new(result: DiffResult) -> Arc<Self> {
        Arc::new(Self {
            result,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<ImageCompareInput> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageComparator for StubComparator {
    async fn get_diff(&self, input: &ImageCompareInput) -> vrt_core::Result<DiffResult> {
        self.seen.lock().unwrap().push(input.clone());
        Ok(self.result.clone())
    }
}

/// Unresolved result pointing at `diff_name`, with 2.5% of pixels changed.
pub fn unresolved_result(diff_name: Option<&str>) -> DiffResult {
    DiffResult {
        status: TestStatus::Unresolved,
        diff_name: diff_name.map(str::to_string),
        pixel_mis_match_count: 250,
        diff_percent: 2.5,
        is_same_dimension: true,
        vlm_description: None,
    }
}
