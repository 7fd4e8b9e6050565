//! Image storage seam.
//!
//! Comparisons only ever see images by name. [`FsImageStore`] keeps them in a
//! flat directory; [`MemoryImageStore`] is the in-process fake used by tests
//! and embedders.

pub mod fs;
pub mod memory;

use std::fmt;
use std::io::Cursor;

use async_trait::async_trait;
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use fs::FsImageStore;
pub use memory::MemoryImageStore;

/// Role of a stored image. Part of every generated name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Baseline,
    Screenshot,
    Diff,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Baseline => "baseline",
            ImageKind::Screenshot => "screenshot",
            ImageKind::Diff => "diff",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from image store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid image name: {0:?}")]
    InvalidName(String),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Named image storage.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Load and decode the image called `name`. `Ok(None)` when it does not exist.
    async fn get_image(&self, name: &str) -> StoreResult<Option<RgbaImage>>;

    /// Persist `image` and return the name it can be fetched under.
    async fn save_image(&self, kind: ImageKind, image: &RgbaImage) -> StoreResult<String>;
}

/// Encode an image as PNG.
pub fn encode_png(image: &RgbaImage) -> StoreResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Decode PNG or JPEG bytes into RGBA.
pub fn decode_image(bytes: &[u8]) -> StoreResult<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}
