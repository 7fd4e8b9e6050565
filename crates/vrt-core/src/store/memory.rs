//! In-memory image store for tests and embedding.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use image::RgbaImage;

use super::{ImageKind, ImageStore, StoreError, StoreResult};

/// Image store backed by a `HashMap`, with fetch bookkeeping.
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    images: Mutex<HashMap<String, RgbaImage>>,
    fetches: Mutex<Vec<String>>,
    saved: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, image: RgbaImage) {
        self.images.lock().unwrap().insert(name.to_string(), image);
    }

    pub fn with_image(self, name: &str, image: RgbaImage) -> Self {
        self.insert(name, image);
        self
    }

    pub fn remove(&self, name: &str) -> Option<RgbaImage> {
        self.images.lock().unwrap().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.images.lock().unwrap().contains_key(name)
    }

    /// Names passed to `get_image`, in call order.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    /// Number of successful `save_image` calls.
    pub fn saved(&self) -> usize {
        self.saved.load(Ordering::SeqCst)
    }

    /// Make every following `save_image` fail with an I/O error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn get_image(&self, name: &str) -> StoreResult<Option<RgbaImage>> {
        self.fetches.lock().unwrap().push(name.to_string());
        Ok(self.images.lock().unwrap().get(name).cloned())
    }

    async fn save_image(&self, kind: ImageKind, image: &RgbaImage) -> StoreResult<String> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "store is read-only",
            )));
        }
        let n = self.saved.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("{kind}-{n}.png");
        self.insert(&name, image.clone());
        Ok(name)
    }
}
