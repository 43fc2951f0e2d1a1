use std::collections::HashMap;
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{ByteRange, MediaBody, MediaCacheConfig, MediaOrigin, MediaState};
use crate::domain::{MediaId, UtcDateTime};
use crate::error::ServiceError;
use crate::http_client::{DownloadClient, HttpRequest};

const MEDIA_EXTENSION: &str = "media";
const PART_EXTENSION: &str = "part";

#[derive(Debug, Clone)]
struct CachedFile {
    path: PathBuf,
    size_bytes: u64,
}

type DownloadOutcome = Option<Result<CachedFile, ServiceError>>;

struct CachedRecord {
    file: CachedFile,
    created_at: UtcDateTime,
    generation: u64,
    eviction: AbortHandle,
}

enum Slot {
    Downloading(watch::Receiver<DownloadOutcome>),
    Cached(CachedRecord),
}

/// Counts reported by [`MediaCache::initialize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InitReport {
    pub swept_parts: usize,
    pub adopted: usize,
    /// Files already older than the TTL, deleted instead of adopted.
    pub expired: usize,
}

struct Shared {
    config: MediaCacheConfig,
    origin: Arc<dyn MediaOrigin>,
    downloader: Arc<dyn DownloadClient>,
    slots: Mutex<HashMap<MediaId, Slot>>,
    generation: AtomicU64,
}

/// Disk-backed media cache with one in-flight download per key.
///
/// File placement and removal both happen while the slot map is locked, so an
/// eviction can never delete a file that a newer download just placed.
#[derive(Clone)]
pub struct MediaCache {
    shared: Arc<Shared>,
}

impl fmt::Debug for MediaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaCache")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl MediaCache {
    pub fn new(
        config: MediaCacheConfig,
        origin: Arc<dyn MediaOrigin>,
        downloader: Arc<dyn DownloadClient>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                origin,
                downloader,
                slots: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &MediaCacheConfig {
        &self.shared.config
    }

    /// Deterministic on-disk location of a cached key.
    pub fn path_for(&self, id: &MediaId) -> PathBuf {
        self.shared.final_path(id)
    }

    /// Create the cache directory, delete leftover `.part` files and adopt
    /// complete files from a previous run.
    ///
    /// An adopted file keeps its age: its modification time is its creation
    /// time, and it is evicted once that plus the TTL has passed. Files
    /// already past that point are deleted here.
    pub async fn initialize(&self) -> Result<InitReport, ServiceError> {
        let directory = &self.shared.config.directory;
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(io_failure("create media directory"))?;

        let mut report = InitReport::default();
        let mut entries = tokio::fs::read_dir(directory)
            .await
            .map_err(io_failure("list media directory"))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_failure("list media directory"))?
        {
            let path = entry.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(PART_EXTENSION) => {
                    remove_file_logged(&path).await;
                    report.swept_parts += 1;
                }
                Some(MEDIA_EXTENSION) => {
                    let Some(id) = path
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .and_then(|stem| MediaId::parse(stem).ok())
                    else {
                        continue;
                    };
                    let metadata = entry
                        .metadata()
                        .await
                        .map_err(io_failure("inspect cached media"))?;
                    if !metadata.is_file() {
                        continue;
                    }

                    let modified = metadata
                        .modified()
                        .map_err(io_failure("inspect cached media"))?;
                    let age = SystemTime::now()
                        .duration_since(modified)
                        .unwrap_or(Duration::ZERO);

                    let mut slots = self.shared.slots.lock().await;
                    if slots.contains_key(&id) {
                        continue;
                    }
                    let remaining = self.shared.config.ttl.saturating_sub(age);
                    if remaining.is_zero() {
                        remove_file_logged(&path).await;
                        debug!(media_id = %id, age_secs = age.as_secs(), "expired media removed at startup");
                        report.expired += 1;
                        continue;
                    }

                    let file = CachedFile {
                        path,
                        size_bytes: metadata.len(),
                    };
                    let record = self
                        .shared
                        .arm_eviction(&id, file, UtcDateTime::from(modified), remaining);
                    slots.insert(id, Slot::Cached(record));
                    report.adopted += 1;
                }
                _ => {}
            }
        }

        info!(
            directory = %directory.display(),
            swept_parts = report.swept_parts,
            adopted = report.adopted,
            expired = report.expired,
            "media cache initialized"
        );
        Ok(report)
    }

    /// Serve the whole file, or exactly the requested range of it.
    #[instrument(skip_all, fields(media_id = %id))]
    pub async fn serve(&self, id: &MediaId, range: Option<ByteRange>) -> Result<MediaBody, ServiceError> {
        let cached = self.ensure_cached(id).await?;
        let total = cached.size_bytes;
        let content_range = range.map(|range| range.resolve(total)).transpose()?;

        let mut file = tokio::fs::File::open(&cached.path)
            .await
            .map_err(|error| {
                ServiceError::download_failed(format!(
                    "cached media for '{id}' is no longer readable: {error}"
                ))
            })?;

        let bytes = match content_range {
            None => {
                let mut bytes = Vec::with_capacity(usize::try_from(total).unwrap_or(0));
                file.read_to_end(&mut bytes)
                    .await
                    .map_err(io_failure("read cached media"))?;
                bytes
            }
            Some(range) => {
                file.seek(SeekFrom::Start(range.start))
                    .await
                    .map_err(io_failure("seek cached media"))?;
                let mut bytes = vec![0_u8; usize::try_from(range.len()).unwrap_or(0)];
                file.read_exact(&mut bytes)
                    .await
                    .map_err(io_failure("read cached media range"))?;
                bytes
            }
        };

        Ok(MediaBody {
            bytes,
            total,
            content_range,
        })
    }

    pub async fn state(&self, id: &MediaId) -> MediaState {
        let slots = self.shared.slots.lock().await;
        match slots.get(id) {
            None => MediaState::Absent,
            Some(Slot::Downloading(_)) => MediaState::Downloading,
            Some(Slot::Cached(record)) => MediaState::Cached {
                size_bytes: record.file.size_bytes,
                created_at: record.created_at,
                expires_at: record.created_at.saturating_add(self.shared.config.ttl),
            },
        }
    }

    /// Drop any cached copy and download again, re-arming the eviction timer.
    pub async fn refresh(&self, id: &MediaId) -> Result<MediaState, ServiceError> {
        self.evict(id).await;
        self.ensure_cached(id).await?;
        Ok(self.state(id).await)
    }

    /// Remove a cached key now. Returns `false` when nothing was cached.
    pub async fn evict(&self, id: &MediaId) -> bool {
        let mut slots = self.shared.slots.lock().await;
        if !matches!(slots.get(id), Some(Slot::Cached(_))) {
            return false;
        }
        if let Some(Slot::Cached(record)) = slots.remove(id) {
            record.eviction.abort();
            remove_file_logged(&record.file.path).await;
            info!(media_id = %id, "media evicted on request");
        }
        true
    }

    async fn ensure_cached(&self, id: &MediaId) -> Result<CachedFile, ServiceError> {
        let mut receiver = {
            let mut slots = self.shared.slots.lock().await;
            match slots.get(id) {
                Some(Slot::Cached(record)) => {
                    debug!(media_id = %id, "media cache hit");
                    return Ok(record.file.clone());
                }
                Some(Slot::Downloading(receiver)) => {
                    debug!(media_id = %id, "joining in-flight download");
                    receiver.clone()
                }
                None => {
                    let (sender, receiver) = watch::channel(None);
                    slots.insert(id.clone(), Slot::Downloading(receiver.clone()));

                    let shared = Arc::clone(&self.shared);
                    let key = id.clone();
                    tokio::spawn(async move {
                        let outcome = shared.download(&key).await;
                        if let Err(error) = &outcome {
                            warn!(media_id = %key, error = %error, "media download failed");
                            shared.clear_downloading(&key).await;
                        }
                        sender.send_replace(Some(outcome));
                    });
                    receiver
                }
            }
        };

        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map(|value| (*value).clone());
        match outcome {
            Ok(Some(result)) => result,
            _ => {
                self.shared.clear_downloading(id).await;
                Err(ServiceError::download_failed(format!(
                    "download of '{id}' ended without a result"
                )))
            }
        }
    }
}

impl Shared {
    fn final_path(&self, id: &MediaId) -> PathBuf {
        self.config
            .directory
            .join(format!("{}.{MEDIA_EXTENSION}", id.as_str()))
    }

    fn part_path(&self, id: &MediaId) -> PathBuf {
        self.config
            .directory
            .join(format!("{}.{}.{PART_EXTENSION}", id.as_str(), Uuid::new_v4().simple()))
    }

    async fn download(self: &Arc<Self>, id: &MediaId) -> Result<CachedFile, ServiceError> {
        let source = self.origin.resolve(id).await?;
        if source.is_expired(UtcDateTime::now()) {
            return Err(ServiceError::download_failed(format!(
                "media url for '{id}' has expired"
            )));
        }

        tokio::fs::create_dir_all(&self.config.directory)
            .await
            .map_err(io_failure("create media directory"))?;

        let part = PartFile::new(self.part_path(id));
        let mut file = tokio::fs::File::create(part.path())
            .await
            .map_err(io_failure("create temporary media file"))?;

        let timeout = self.config.download_timeout;
        let request = HttpRequest::get(source.url.clone()).with_timeout(timeout);
        let written = match tokio::time::timeout(timeout, self.downloader.download(request, &mut file)).await {
            Err(_) => {
                return Err(ServiceError::download_failed(format!(
                    "download of '{id}' timed out after {}s",
                    timeout.as_secs()
                )))
            }
            Ok(Err(error)) => {
                return Err(ServiceError::download_failed(format!(
                    "download of '{id}' failed: {error}"
                )))
            }
            Ok(Ok(written)) => written,
        };

        file.flush().await.map_err(io_failure("flush media file"))?;
        file.sync_all().await.map_err(io_failure("sync media file"))?;
        drop(file);

        if let Some(expected) = source.content_length {
            if expected != written {
                return Err(ServiceError::download_failed(format!(
                    "download of '{id}' was truncated: {written} of {expected} bytes"
                )));
            }
        }

        self.place(id, part, written).await
    }

    async fn place(self: &Arc<Self>, id: &MediaId, part: PartFile, size_bytes: u64) -> Result<CachedFile, ServiceError> {
        let final_path = self.final_path(id);
        let mut slots = self.slots.lock().await;

        tokio::fs::rename(part.path(), &final_path)
            .await
            .map_err(io_failure("move media into place"))?;
        part.disarm();

        let file = CachedFile {
            path: final_path,
            size_bytes,
        };
        let record = self.arm_eviction(id, file.clone(), UtcDateTime::now(), self.config.ttl);
        if let Some(Slot::Cached(previous)) = slots.insert(id.clone(), Slot::Cached(record)) {
            previous.eviction.abort();
        }

        info!(media_id = %id, size_bytes, ttl_secs = self.config.ttl.as_secs(), "media cached");
        Ok(file)
    }

    /// Start the eviction timer for a file created at `created_at`, firing
    /// after `remaining`.
    fn arm_eviction(
        self: &Arc<Self>,
        id: &MediaId,
        file: CachedFile,
        created_at: UtcDateTime,
        remaining: Duration,
    ) -> CachedRecord {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let shared = Arc::downgrade(self);
        let key = id.clone();

        let timer = tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            if let Some(shared) = shared.upgrade() {
                shared.expire(&key, generation).await;
            }
        });

        CachedRecord {
            file,
            created_at,
            generation,
            eviction: timer.abort_handle(),
        }
    }

    async fn expire(&self, id: &MediaId, generation: u64) {
        let mut slots = self.slots.lock().await;
        let current = matches!(
            slots.get(id),
            Some(Slot::Cached(record)) if record.generation == generation
        );
        if !current {
            debug!(media_id = %id, generation, "stale eviction timer ignored");
            return;
        }

        if let Some(Slot::Cached(record)) = slots.remove(id) {
            remove_file_logged(&record.file.path).await;
            info!(media_id = %id, "media evicted after ttl");
        }
    }

    async fn clear_downloading(&self, id: &MediaId) {
        let mut slots = self.slots.lock().await;
        if matches!(slots.get(id), Some(Slot::Downloading(_))) {
            slots.remove(id);
        }
    }
}

/// Temporary download target, removed on drop unless moved into place.
struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(error) = std::fs::remove_file(&self.path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %error, "failed to remove temporary media file");
            }
        }
    }
}

async fn remove_file_logged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            warn!(path = %path.display(), error = %error, "failed to delete media file");
        }
    }
}

fn io_failure(context: &'static str) -> impl Fn(std::io::Error) -> ServiceError {
    move |error| ServiceError::download_failed(format!("{context}: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_file_is_removed_unless_disarmed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dropped = dir.path().join("a.1.part");
        let kept = dir.path().join("b.2.part");
        std::fs::write(&dropped, b"x").expect("write");
        std::fs::write(&kept, b"y").expect("write");

        drop(PartFile::new(dropped.clone()));
        PartFile::new(kept.clone()).disarm();

        assert!(!dropped.exists());
        assert!(kept.exists());
    }

    #[test]
    fn io_failure_maps_to_download_failed() {
        let error = io_failure("read")(std::io::Error::other("disk gone"));
        assert_eq!(error.kind(), crate::ServiceErrorKind::DownloadFailed);
        assert_eq!(error.message(), "read: disk gone");
    }
}
