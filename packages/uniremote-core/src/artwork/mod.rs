//! Two-tier artwork cache.
//!
//! - Memory tier: LRU bounded by entry count and decoded-pixel cost, updated
//!   synchronously on [`ArtworkCache::store`]
//! - Disk tier: one JPEG per key under the cache directory, written and read
//!   on a serial background queue, never evicted here
//!
//! Keys are artist/album/genre names. They are normalized once
//! ([`normalize_key`]) and the normalized form names both the memory entry and
//! the file, so [`ArtworkCache::preload`] recovers the same keys after a restart.

mod disk;
mod image;
mod memory;

pub use self::image::ArtworkImage;

use std::fmt;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::disk::DiskTier;
use self::memory::MemoryTier;
use crate::protocol_constants::{
    ARTWORK_COST_LIMIT_BYTES, ARTWORK_COUNT_LIMIT, ARTWORK_DIR_NAME, ARTWORK_JPEG_QUALITY,
};
use crate::runtime::TokioSpawner;

/// Which listing an artwork belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtworkKind {
    Artist,
    Album,
}

impl fmt::Display for ArtworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Artist => f.write_str("artist"),
            Self::Album => f.write_str("album"),
        }
    }
}

/// Artwork decode and persistence failures.
#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("artwork key is empty")]
    EmptyKey,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid image: {0}")]
    Image(#[from] ::image::ImageError),
    #[error("artwork I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("artwork disk queue is closed")]
    QueueClosed,
}

/// Configuration for the artwork cache.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ArtworkCacheConfig {
    /// Directory of the disk tier.
    pub cache_dir: PathBuf,

    /// Maximum number of images kept in memory.
    pub count_limit: usize,

    /// Maximum total decoded bytes kept in memory.
    pub cost_limit_bytes: usize,

    /// JPEG quality (1-100) for persisted images.
    pub jpeg_quality: u8,
}

impl ArtworkCacheConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.count_limit == 0 {
            return Err("artwork.count_limit must be >= 1".to_string());
        }
        if self.cost_limit_bytes == 0 {
            return Err("artwork.cost_limit_bytes must be >= 1".to_string());
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err("artwork.jpeg_quality must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

impl Default for ArtworkCacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir()
                .join("uniremote")
                .join(ARTWORK_DIR_NAME),
            count_limit: ARTWORK_COUNT_LIMIT,
            cost_limit_bytes: ARTWORK_COST_LIMIT_BYTES,
            jpeg_quality: ARTWORK_JPEG_QUALITY,
        }
    }
}

/// Normalizes a name into a cache key safe to use as a file name.
///
/// Trims whitespace, replaces path separators, characters reserved on common
/// filesystems and control characters with `_`, and replaces a leading dot.
/// Returns `None` for keys that are empty after trimming.
pub fn normalize_key(key: &str) -> Option<String> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut normalized: String = trimmed
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if normalized.starts_with('.') {
        normalized.replace_range(..1, "_");
    }
    Some(normalized)
}

/// Memory + disk artwork cache.
pub struct ArtworkCache {
    memory: Mutex<MemoryTier>,
    disk: DiskTier,
    count_limit: usize,
}

impl ArtworkCache {
    /// Creates the cache directory and starts the disk queue.
    ///
    /// # Errors
    ///
    /// Returns [`ArtworkError::Io`] if the cache directory cannot be created.
    pub fn new(config: &ArtworkCacheConfig, spawner: &TokioSpawner) -> Result<Self, ArtworkError> {
        let disk = DiskTier::start(config.cache_dir.clone(), config.jpeg_quality, spawner)?;
        log::info!(
            "[Artwork] Cache at {} ({} entries / {} MiB in memory)",
            config.cache_dir.display(),
            config.count_limit,
            config.cost_limit_bytes / (1024 * 1024)
        );
        Ok(Self {
            memory: Mutex::new(MemoryTier::new(config.count_limit, config.cost_limit_bytes)),
            disk,
            count_limit: config.count_limit,
        })
    }

    /// Memory-only probe. Never touches the disk.
    pub fn lookup_cached(&self, key: &str) -> Option<ArtworkImage> {
        let key = normalize_key(key)?;
        self.memory.lock().get(&key)
    }

    /// Looks `key` up in memory, then on disk.
    ///
    /// A disk hit is promoted into the memory tier. The disk read is queued
    /// behind any pending writes.
    pub async fn lookup(&self, key: &str) -> Option<ArtworkImage> {
        let key = normalize_key(key)?;
        if let Some(image) = self.memory.lock().get(&key) {
            return Some(image);
        }

        match self.disk.read(key.clone()).await {
            Ok(Some(image)) => {
                self.memory.lock().insert(key, image.clone());
                Some(image)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("[Artwork] Disk lookup for {} failed: {}", key, e);
                None
            }
        }
    }

    /// Stores `image` under `key`.
    ///
    /// The memory tier is updated before this returns; the disk write is
    /// queued and its failures are only logged.
    ///
    /// # Errors
    ///
    /// Returns [`ArtworkError::EmptyKey`] if `key` is blank.
    pub fn store(&self, image: ArtworkImage, key: &str) -> Result<(), ArtworkError> {
        let key = normalize_key(key).ok_or(ArtworkError::EmptyKey)?;
        if !self.memory.lock().insert(key.clone(), image.clone()) {
            log::debug!(
                "[Artwork] {} ({} bytes) exceeds the memory cost limit; disk only",
                key,
                image.cost()
            );
        }
        self.disk.write(key, image);
        Ok(())
    }

    /// Decodes a base64 payload and stores it under `key`.
    ///
    /// # Errors
    ///
    /// Returns the decode error, or [`ArtworkError::EmptyKey`].
    pub fn store_base64(&self, data: &str, key: &str) -> Result<ArtworkImage, ArtworkError> {
        if normalize_key(key).is_none() {
            return Err(ArtworkError::EmptyKey);
        }
        let image = ArtworkImage::from_base64(data)?;
        self.store(image.clone(), key)?;
        Ok(image)
    }

    /// Warms the memory tier from the disk tier, up to the count limit.
    ///
    /// Entries already in memory are left untouched. Returns how many entries
    /// were loaded.
    ///
    /// # Errors
    ///
    /// Returns [`ArtworkError::QueueClosed`] if the disk queue is gone.
    pub async fn preload(&self) -> Result<usize, ArtworkError> {
        let entries = self.disk.preload(self.count_limit).await?;
        let mut memory = self.memory.lock();
        let mut loaded = 0;
        for (key, image) in entries {
            if !memory.contains(&key) && memory.insert(key, image) {
                loaded += 1;
            }
        }
        log::info!("[Artwork] Preloaded {} image(s) from disk", loaded);
        Ok(loaded)
    }

    /// Whether `key` is in memory or on disk. Does not decode.
    pub fn has_image(&self, key: &str) -> bool {
        let Some(key) = normalize_key(key) else {
            return false;
        };
        self.memory.lock().contains(&key) || self.disk.exists(&key)
    }

    /// Resolves once every disk job queued before it has completed.
    ///
    /// # Errors
    ///
    /// Returns [`ArtworkError::QueueClosed`] if the disk queue is gone.
    pub async fn flush(&self) -> Result<(), ArtworkError> {
        self.disk.flush().await
    }

    /// Number of images in the memory tier.
    pub fn memory_len(&self) -> usize {
        self.memory.lock().len()
    }

    /// Total decoded bytes in the memory tier.
    pub fn memory_cost(&self) -> usize {
        self.memory.lock().total_cost()
    }

    /// File backing `key`, whether or not it exists yet.
    pub fn file_path(&self, key: &str) -> Option<PathBuf> {
        normalize_key(key).map(|key| self.disk.path_for(&key))
    }
}
