//! Channel logo cache.
//!
//! Remote logos are downloaded once, scaled to a fixed 16:9 thumbnail and
//! stored as `<cache_dir>/<channel id>.jpg`. The returned path is the public
//! URL path under which the daemon serves the cache directory. Entries are
//! never refreshed: a cached file wins even if the playlist later points the
//! channel at a different image.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::config::LogoConfig;
use crate::error::{CatalogError, Result};

/// Distinguishes concurrent partial writes of the same logo.
static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct LogoCache {
    cache_dir: PathBuf,
    public_prefix: String,
    fallback: String,
    width: u32,
    height: u32,
    client: reqwest::Client,
}

impl LogoCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::from_config(&LogoConfig {
            cache_dir: cache_dir.into(),
            ..LogoConfig::default()
        })
    }

    pub fn from_config(config: &LogoConfig) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
            public_prefix: config.public_prefix.trim_end_matches('/').to_string(),
            fallback: config.fallback.clone(),
            width: config.width,
            height: config.height,
            client: reqwest::Client::new(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// On-disk location of the cached logo for `id`.
    pub fn cached_file(&self, id: &str) -> PathBuf {
        self.cache_dir.join(format!("{id}.jpg"))
    }

    /// URL path under which the cached logo for `id` is served.
    pub fn public_path(&self, id: &str) -> String {
        format!("{}/{id}.jpg", self.public_prefix)
    }

    /// Resolves the logo of channel `id` to a servable path.
    ///
    /// Always yields a usable path: on any failure the fallback image is
    /// returned together with the error so the caller can log it.
    pub async fn resolve(&self, id: &str, raw_reference: &str) -> (String, Option<CatalogError>) {
        if raw_reference.is_empty() {
            return (self.fallback.clone(), None);
        }
        match self.fetch_and_store(id, raw_reference).await {
            Ok(path) => (path, None),
            Err(e) => (self.fallback.clone(), Some(e)),
        }
    }

    async fn fetch_and_store(&self, id: &str, url: &str) -> Result<String> {
        let target = self.cached_file(id);
        if is_file(&target).await {
            return Ok(self.public_path(id));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::logo(id, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::logo(id, format!("HTTP {status} from {url}")));
        }
        let bytes = response.bytes().await.map_err(|e| CatalogError::logo(id, e))?;

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| CatalogError::logo(id, e))?;

        let (width, height) = (self.width, self.height);
        let dest = target.clone();
        tokio::task::spawn_blocking(move || write_thumbnail(&bytes, width, height, &dest))
            .await
            .map_err(|e| CatalogError::logo(id, e))?
            .map_err(|e| CatalogError::logo(id, e))?;

        debug!("Cached logo for {} at {}", id, target.display());
        Ok(self.public_path(id))
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Decodes `bytes`, scales to exactly `width`x`height` and writes a JPEG to
/// `dest`. The file only appears at `dest` once fully written.
fn write_thumbnail(
    bytes: &[u8],
    width: u32,
    height: u32,
    dest: &Path,
) -> std::result::Result<(), String> {
    let img = image::load_from_memory(bytes).map_err(|e| format!("image decode error: {e}"))?;
    let resized = img.resize_exact(width, height, FilterType::Lanczos3);

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|e| format!("JPEG encode error: {e}"))?;

    let part = dest.with_extension(format!(
        "{}.part",
        PART_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&part, buffer.into_inner()).map_err(|e| e.to_string())?;
    std::fs::rename(&part, dest).map_err(|e| {
        let _ = std::fs::remove_file(&part);
        e.to_string()
    })
}
