//! Disk tier: one JPEG file per key, all I/O on a serial job queue.
//!
//! Jobs run one at a time in submission order on the blocking pool, so a read
//! queued after a write for the same key observes the write.

use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};

use super::{ArtworkError, ArtworkImage};
use crate::protocol_constants::ARTWORK_FILE_EXTENSION;
use crate::runtime::{TaskSpawner, TokioSpawner};

enum DiskJob {
    Write {
        key: String,
        image: ArtworkImage,
    },
    Read {
        key: String,
        reply: oneshot::Sender<Option<ArtworkImage>>,
    },
    Preload {
        limit: usize,
        reply: oneshot::Sender<Vec<(String, ArtworkImage)>>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct DiskTier {
    dir: PathBuf,
    jobs: mpsc::UnboundedSender<DiskJob>,
}

impl DiskTier {
    /// Creates the directory and starts the I/O worker.
    ///
    /// The worker exits once the tier is dropped and the queue drained.
    pub(crate) fn start(
        dir: PathBuf,
        jpeg_quality: u8,
        spawner: &TokioSpawner,
    ) -> Result<Self, ArtworkError> {
        std::fs::create_dir_all(&dir)?;

        let (jobs, mut rx) = mpsc::unbounded_channel::<DiskJob>();
        let worker_dir = dir.clone();
        spawner.spawn(async move {
            while let Some(job) = rx.recv().await {
                let dir = worker_dir.clone();
                let result =
                    tokio::task::spawn_blocking(move || run_job(&dir, jpeg_quality, job)).await;
                if let Err(e) = result {
                    log::error!("[Artwork] Disk job panicked: {}", e);
                }
            }
            log::debug!("[Artwork] Disk queue closed");
        });

        Ok(Self { dir, jobs })
    }

    pub(crate) fn path_for(&self, key: &str) -> PathBuf {
        file_path(&self.dir, key)
    }

    pub(crate) fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    /// Queues an encode-and-write. Failures are logged by the worker.
    pub(crate) fn write(&self, key: String, image: ArtworkImage) {
        if self.jobs.send(DiskJob::Write { key, image }).is_err() {
            log::warn!("[Artwork] Disk queue closed; write dropped");
        }
    }

    pub(crate) async fn read(&self, key: String) -> Result<Option<ArtworkImage>, ArtworkError> {
        let (reply, rx) = oneshot::channel();
        self.submit(DiskJob::Read { key, reply })?;
        rx.await.map_err(|_| ArtworkError::QueueClosed)
    }

    pub(crate) async fn preload(
        &self,
        limit: usize,
    ) -> Result<Vec<(String, ArtworkImage)>, ArtworkError> {
        let (reply, rx) = oneshot::channel();
        self.submit(DiskJob::Preload { limit, reply })?;
        rx.await.map_err(|_| ArtworkError::QueueClosed)
    }

    pub(crate) async fn flush(&self) -> Result<(), ArtworkError> {
        let (reply, rx) = oneshot::channel();
        self.submit(DiskJob::Flush { reply })?;
        rx.await.map_err(|_| ArtworkError::QueueClosed)
    }

    fn submit(&self, job: DiskJob) -> Result<(), ArtworkError> {
        self.jobs.send(job).map_err(|_| ArtworkError::QueueClosed)
    }
}

fn file_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{}", key, ARTWORK_FILE_EXTENSION))
}

fn run_job(dir: &Path, jpeg_quality: u8, job: DiskJob) {
    match job {
        DiskJob::Write { key, image } => {
            if let Err(e) = write_file(dir, &key, &image, jpeg_quality) {
                log::warn!("[Artwork] Failed to persist {}: {}", key, e);
            }
        }
        DiskJob::Read { key, reply } => {
            let image = match read_file(&file_path(dir, &key)) {
                Ok(image) => image,
                Err(e) => {
                    log::warn!("[Artwork] Failed to read {} from disk: {}", key, e);
                    None
                }
            };
            let _ = reply.send(image);
        }
        DiskJob::Preload { limit, reply } => {
            let entries = match scan(dir, limit) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("[Artwork] Failed to scan {}: {}", dir.display(), e);
                    Vec::new()
                }
            };
            let _ = reply.send(entries);
        }
        DiskJob::Flush { reply } => {
            let _ = reply.send(());
        }
    }
}

/// Encodes to a temp file and renames it over the target.
fn write_file(
    dir: &Path,
    key: &str,
    image: &ArtworkImage,
    jpeg_quality: u8,
) -> Result<(), ArtworkError> {
    let jpeg = image.to_jpeg(jpeg_quality)?;
    let path = file_path(dir, key);
    let temp_path = dir.join(format!(".{}.tmp", key));
    std::fs::write(&temp_path, jpeg)?;
    std::fs::rename(&temp_path, &path)?;
    Ok(())
}

fn read_file(path: &Path) -> Result<Option<ArtworkImage>, ArtworkError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(ArtworkImage::from_bytes(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn scan(dir: &Path, limit: usize) -> Result<Vec<(String, ArtworkImage)>, ArtworkError> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        if entries.len() >= limit {
            break;
        }
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(ARTWORK_FILE_EXTENSION) {
            continue;
        }
        let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        match read_file(&path) {
            Ok(Some(image)) => entries.push((key.to_string(), image)),
            Ok(None) => {}
            Err(e) => log::debug!("[Artwork] Skipping unreadable {}: {}", path.display(), e),
        }
    }
    Ok(entries)
}
