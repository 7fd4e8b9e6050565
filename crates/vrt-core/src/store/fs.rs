use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::RgbaImage;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{decode_image, encode_png, ImageKind, ImageStore, StoreError, StoreResult};

/// Directory-backed image store.
///
/// Layout: `<root>/<name>`, flat. Saved images are PNG files called
/// `<sha256 hex>.<kind>.png`, so saving identical pixels twice yields one file.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn image_path(&self, name: &str) -> StoreResult<PathBuf> {
        let invalid = name.is_empty()
            || name.contains(['/', '\\', '\0'])
            || name.contains("..");
        if invalid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn get_image(&self, name: &str) -> StoreResult<Option<RgbaImage>> {
        let path = self.image_path(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode_image(&bytes).map(Some)
    }

    async fn save_image(&self, kind: ImageKind, image: &RgbaImage) -> StoreResult<String> {
        let bytes = encode_png(image)?;
        let name = format!("{}.{}.png", hex::encode(Sha256::digest(&bytes)), kind);
        let path = self.image_path(&name)?;
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            if path.exists() {
                return Ok(());
            }
            // Temp file in the same directory, then rename.
            let mut tmp = NamedTempFile::new_in(&root)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(io::Error::other)??;

        debug!(image = %name, kind = %kind, "image saved");
        Ok(name)
    }
}
