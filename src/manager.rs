//! High-level upload/download front end over the transfer pipeline.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use url::Url;

use crate::controller::{EventKind, TransferController, TransferEvent, TransferObserver};
use crate::error::{Result, TransferError};
use crate::pipeline::{ConcurrencyOptions, Pipeline, StageContext, WorkItem};
use crate::randomfile::FileHandleCache;
use crate::retry::RetryPolicy;
use crate::stages::{
    AemCompleteUpload, AemInitiateUpload, CloseFiles, CreateTransferParts, FilterUnsupported,
    GetAssetMetadata, JoinTransferParts, Transfer,
};
use crate::tracker::TransferTracker;
use crate::types::asset::{Asset, AssetMetadata, TransferAsset, VersionOptions};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_CONCURRENT: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 16;
const DEFAULT_WRITE_BLOCK_SIZE: usize = 1024 * 1024;
const DEFAULT_RECONNECT_MAX: u32 = 5;
const INITIATE_MAX_BATCH: usize = 100;

/// A per-file progress event, as surfaced to callers.
#[derive(Debug, Clone)]
pub struct FileEvent {
    /// The filename sent to the target service.
    pub file_name: String,
    /// Total size in bytes.
    pub file_size: u64,
    /// Folder portion of the target path.
    pub target_folder: String,
    /// Full target path.
    pub target_file: String,
    /// MIME type, when known.
    pub mime_type: Option<String>,
    /// Cumulative bytes transferred, for progress events.
    pub transferred: Option<u64>,
}

impl FileEvent {
    fn from_event(event: &TransferEvent) -> Option<Self> {
        let asset = &event.asset;
        let metadata = asset.metadata()?;
        let target = asset.target();
        let (target_folder, target_file) = match target.file_path() {
            Some(path) => (
                path.parent()
                    .map(|parent| parent.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "/".to_string()),
                path.to_string_lossy().into_owned(),
            ),
            None => (target.folder_path(), target.full_path()),
        };
        Some(Self {
            file_name: metadata.filename().to_string(),
            file_size: metadata.content_length(),
            target_folder,
            target_file,
            mime_type: metadata.content_type().map(str::to_string),
            transferred: event.transferred,
        })
    }
}

/// Receives per-file lifecycle events during a transfer.
///
/// All methods default to no-ops so implementors can pick the events they
/// care about.
pub trait FileEventListener: Send + Sync {
    /// The first byte of a file is about to transfer.
    fn file_start(&self, _event: &FileEvent) {}
    /// A part of the file finished transferring.
    fn file_progress(&self, _event: &FileEvent) {}
    /// Every byte of the file has transferred.
    fn file_end(&self, _event: &FileEvent) {}
}

struct FileEventAdapter {
    listener: Arc<dyn FileEventListener>,
}

impl TransferObserver for FileEventAdapter {
    fn on_event(&self, event: &TransferEvent) {
        let Some(file_event) = FileEvent::from_event(event) else {
            return;
        };
        match event.kind {
            EventKind::TransferStart => self.listener.file_start(&file_event),
            EventKind::TransferProgress => self.listener.file_progress(&file_event),
            EventKind::TransferComplete => self.listener.file_end(&file_event),
            _ => {}
        }
    }
}

/// One failed asset in a [`TransferSummary`].
#[derive(Debug, Clone)]
pub struct TransferFailure {
    /// Identity of the failed asset (source and target URLs).
    pub asset: String,
    /// The error message.
    pub message: String,
}

/// Outcome of an [`TransferManager::upload_files`] or
/// [`TransferManager::download_files`] run.
#[derive(Debug)]
pub struct TransferSummary {
    /// Assets that transferred completely.
    pub completed: usize,
    /// Assets withdrawn after an error.
    pub failed: usize,
    /// Details for each failed asset.
    pub errors: Vec<TransferFailure>,
    /// Capability probe: false exactly when the service reported that
    /// direct binary upload is not supported.
    pub direct_binary_enabled: bool,
}

#[derive(Default)]
struct SummaryCollector {
    completed: Mutex<usize>,
    errors: Mutex<Vec<TransferFailure>>,
}

impl TransferObserver for SummaryCollector {
    fn on_event(&self, event: &TransferEvent) {
        match event.kind {
            EventKind::TransferComplete => {
                *self.completed.lock().expect("summary lock poisoned") += 1;
            }
            EventKind::Error => {
                self.errors
                    .lock()
                    .expect("summary lock poisoned")
                    .push(TransferFailure {
                        asset: event.asset.identity(),
                        message: event.error.clone().unwrap_or_default(),
                    });
            }
            _ => {}
        }
    }
}

/// The source of one file to upload.
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// Read from a local file.
    Path(PathBuf),
    /// Use an in-memory payload.
    Blob(Bytes),
}

/// One file in an upload request.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub(crate) file_name: String,
    pub(crate) file_size: u64,
    pub(crate) source: UploadSource,
    pub(crate) target_url: Option<Url>,
    pub(crate) version_options: Option<VersionOptions>,
}

/// Builder for [`UploadFile`].
#[derive(Debug, Default)]
pub struct UploadFileBuilder {
    file_name: Option<String>,
    file_size: Option<u64>,
    file_path: Option<PathBuf>,
    blob: Option<Bytes>,
    target_url: Option<Url>,
    version_options: Option<VersionOptions>,
}

impl UploadFileBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filename to create in the target folder.
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Set the file size in bytes.
    pub fn file_size(mut self, file_size: u64) -> Self {
        self.file_size = Some(file_size);
        self
    }

    /// Read the upload from a local file.
    pub fn file_path(mut self, file_path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    /// Upload an in-memory payload.
    pub fn blob(mut self, blob: Bytes) -> Self {
        self.blob = Some(blob);
        self
    }

    /// Override the target URL instead of deriving it from the folder.
    pub fn target_url(mut self, target_url: Url) -> Self {
        self.target_url = Some(target_url);
        self
    }

    /// Attach versioning directives for the complete call.
    pub fn version_options(mut self, version_options: VersionOptions) -> Self {
        self.version_options = Some(version_options);
        self
    }

    /// Build the upload file description.
    pub fn build(self) -> Result<UploadFile> {
        let file_name = self
            .file_name
            .ok_or_else(|| TransferError::MissingField("file_name".to_string()))?;
        if file_name.trim().is_empty() {
            return Err(TransferError::InvalidParameter {
                field: "file_name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        let file_size = self
            .file_size
            .ok_or_else(|| TransferError::MissingField("file_size".to_string()))?;
        let source = match (self.file_path, self.blob) {
            (Some(path), None) => UploadSource::Path(path),
            (None, Some(blob)) => UploadSource::Blob(blob),
            (None, None) => return Err(TransferError::MissingField("file_path or blob".to_string())),
            (Some(_), Some(_)) => {
                return Err(TransferError::InvalidParameter {
                    field: "file_path".to_string(),
                    reason: "set either file_path or blob, not both".to_string(),
                });
            }
        };
        Ok(UploadFile {
            file_name,
            file_size,
            source,
            target_url: self.target_url,
            version_options: self.version_options,
        })
    }
}

/// An upload request: a target folder plus the files bound for it.
#[derive(Debug)]
pub struct UploadRequest {
    pub(crate) folder_url: Url,
    pub(crate) files: Vec<UploadFile>,
    pub(crate) headers: HeaderMap,
}

/// Builder for [`UploadRequest`].
#[derive(Debug, Default)]
pub struct UploadRequestBuilder {
    folder_url: Option<Url>,
    files: Vec<UploadFile>,
    headers: HeaderMap,
}

impl UploadRequestBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target folder URL.
    pub fn folder_url(mut self, folder_url: Url) -> Self {
        self.folder_url = Some(folder_url);
        self
    }

    /// Add a file to upload.
    pub fn file(mut self, file: UploadFile) -> Self {
        self.files.push(file);
        self
    }

    /// Add request headers sent on every call (e.g. authorization or a
    /// csrf-token).
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Build the request.
    pub fn build(self) -> Result<UploadRequest> {
        let folder_url = self
            .folder_url
            .ok_or_else(|| TransferError::MissingField("folder_url".to_string()))?;
        if self.files.is_empty() {
            return Err(TransferError::MissingField("files".to_string()));
        }
        Ok(UploadRequest {
            folder_url,
            files: self.files,
            headers: self.headers,
        })
    }
}

/// One file in a download request.
#[derive(Debug, Clone)]
pub struct DownloadFile {
    pub(crate) source_url: Url,
    pub(crate) target_path: PathBuf,
}

impl DownloadFile {
    /// Download `source_url` to `target_path`.
    pub fn new(source_url: Url, target_path: impl Into<PathBuf>) -> Self {
        Self {
            source_url,
            target_path: target_path.into(),
        }
    }
}

/// A download request: ranged GETs into local files.
#[derive(Debug)]
pub struct DownloadRequest {
    pub(crate) files: Vec<DownloadFile>,
    pub(crate) headers: HeaderMap,
}

impl DownloadRequest {
    /// Create a request for the given downloads.
    pub fn new(files: Vec<DownloadFile>) -> Self {
        Self {
            files,
            headers: HeaderMap::new(),
        }
    }

    /// Add request headers sent on every call.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Drives whole transfers through the staged pipeline.
///
/// # Examples
/// ```no_run
/// # use httptransfer::{TransferManagerBuilder, UploadFileBuilder, UploadRequestBuilder};
/// # async fn example() -> httptransfer::Result<()> {
/// let manager = TransferManagerBuilder::new().max_concurrent(8).build()?;
/// let request = UploadRequestBuilder::new()
///     .folder_url("https://author.example.com/content/dam/folder".parse().unwrap())
///     .file(
///         UploadFileBuilder::new()
///             .file_name("photo.jpg")
///             .file_size(1024)
///             .file_path("/tmp/photo.jpg")
///             .build()?,
///     )
///     .build()?;
/// let summary = manager.upload_files(request).await?;
/// println!("uploaded {} file(s)", summary.completed);
/// # Ok(())
/// # }
/// ```
pub struct TransferManager {
    http: reqwest::Client,
    concurrent: bool,
    max_concurrent: usize,
    preferred_part_size: Option<u64>,
    retry: RetryPolicy,
    queue_capacity: usize,
    write_block_size: usize,
    reconnect_max: u32,
    file_listeners: Vec<Arc<dyn FileEventListener>>,
    observers: Vec<(Option<EventKind>, Arc<dyn TransferObserver>)>,
}

/// Builder for [`TransferManager`].
#[derive(Default)]
pub struct TransferManagerBuilder {
    http: Option<reqwest::Client>,
    concurrent: Option<bool>,
    max_concurrent: Option<usize>,
    preferred_part_size: Option<u64>,
    retry: Option<RetryPolicy>,
    queue_capacity: Option<usize>,
    write_block_size: Option<usize>,
    reconnect_max: Option<u32>,
    file_listeners: Vec<Arc<dyn FileEventListener>>,
    observers: Vec<(Option<EventKind>, Arc<dyn TransferObserver>)>,
}

impl TransferManagerBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply a custom HTTP client.
    ///
    /// The default client enforces TLS 1.2, sets connect and read
    /// timeouts, and identifies itself with a crate user-agent; a custom
    /// client uses whatever it was built with.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Process assets concurrently (default: true).
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = Some(concurrent);
        self
    }

    /// Most part transfers in flight at once (default: 4).
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = Some(max_concurrent.max(1));
        self
    }

    /// Preferred part size in bytes for splitting.
    pub fn preferred_part_size(mut self, preferred_part_size: u64) -> Self {
        self.preferred_part_size = Some(preferred_part_size);
        self
    }

    /// Retry policy for HTTP operations (default: environment defaults).
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Capacity of the per-stream chunk queue (default: 16).
    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = Some(queue_capacity.max(1));
        self
    }

    /// Chunk size for streamed downloads (default: 1 MiB).
    pub fn write_block_size(mut self, write_block_size: usize) -> Self {
        self.write_block_size = Some(write_block_size.max(1));
        self
    }

    /// How many times a broken download stream may reconnect (default: 5).
    pub fn reconnect_max(mut self, reconnect_max: u32) -> Self {
        self.reconnect_max = Some(reconnect_max);
        self
    }

    /// Attach a per-file event listener.
    pub fn file_listener(mut self, listener: Arc<dyn FileEventListener>) -> Self {
        self.file_listeners.push(listener);
        self
    }

    /// Subscribe a raw observer to one event kind.
    pub fn observer(mut self, kind: EventKind, observer: Arc<dyn TransferObserver>) -> Self {
        self.observers.push((Some(kind), observer));
        self
    }

    /// Subscribe a raw observer to every event kind.
    pub fn observer_all(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observers.push((None, observer));
        self
    }

    /// Build the manager, constructing the default HTTP client if none was
    /// supplied.
    pub fn build(self) -> Result<TransferManager> {
        let retry = self.retry.unwrap_or_else(RetryPolicy::from_env);
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
                .read_timeout(retry.effective_socket_timeout())
                .min_tls_version(reqwest::tls::Version::TLS_1_2)
                .user_agent(format!("httptransfer/{}", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(TransferError::from)?,
        };
        Ok(TransferManager {
            http,
            concurrent: self.concurrent.unwrap_or(true),
            max_concurrent: self.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT),
            preferred_part_size: self.preferred_part_size,
            retry,
            queue_capacity: self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            write_block_size: self.write_block_size.unwrap_or(DEFAULT_WRITE_BLOCK_SIZE),
            reconnect_max: self.reconnect_max.unwrap_or(DEFAULT_RECONNECT_MAX),
            file_listeners: self.file_listeners,
            observers: self.observers,
        })
    }
}

impl TransferManager {
    /// Create a manager with default settings.
    pub fn new() -> Result<Self> {
        TransferManagerBuilder::new().build()
    }

    /// Upload files to a target folder via direct binary upload.
    ///
    /// Drives every file through the full pipeline: unsupported-asset
    /// filtering, metadata acquisition, folder-batched initiate, part
    /// splitting, concurrent part PUTs, join, complete, and file-handle
    /// teardown. Per-file failures surface as error events and in the
    /// summary; sibling files keep going.
    pub async fn upload_files(&self, request: UploadRequest) -> Result<TransferSummary> {
        let mut source = Vec::with_capacity(request.files.len());
        for file in request.files {
            let target_url = match file.target_url {
                Some(url) => url,
                None => join_folder(&request.folder_url, &file.file_name)?,
            };
            let target = Asset::with_headers(target_url, request.headers.clone());
            let (source_asset, blob) = match file.source {
                UploadSource::Path(path) => (Asset::from_path(&path)?, None),
                UploadSource::Blob(blob) => (Asset::blob(&file.file_name), Some(blob)),
            };
            let mut asset = TransferAsset::new(source_asset, target);
            asset.set_metadata(AssetMetadata::new(file.file_name, None, file.file_size));
            if let Some(blob) = blob {
                asset.set_blob(blob);
            }
            if let Some(version_options) = file.version_options {
                asset.set_version_options(version_options);
            }
            source.push(WorkItem::Asset(asset));
        }

        let pipeline = Pipeline::new()
            .stage(Arc::new(FilterUnsupported), ConcurrencyOptions::serial())
            .stage(Arc::new(GetAssetMetadata), ConcurrencyOptions::serial())
            .stage(
                Arc::new(AemInitiateUpload),
                ConcurrencyOptions::batched(INITIATE_MAX_BATCH),
            )
            .stage(Arc::new(CreateTransferParts), ConcurrencyOptions::serial())
            .stage(
                Arc::new(Transfer),
                ConcurrencyOptions::concurrent(self.effective_concurrency()),
            )
            .stage(Arc::new(JoinTransferParts), ConcurrencyOptions::serial())
            .stage(Arc::new(AemCompleteUpload), ConcurrencyOptions::serial())
            .stage(Arc::new(CloseFiles), ConcurrencyOptions::serial());

        self.run(pipeline, source, request.headers).await
    }

    /// Download files to local paths with ranged GETs.
    ///
    /// Sources that accept ranged requests are split into windows and
    /// fetched concurrently; others stream once from the start.
    pub async fn download_files(&self, request: DownloadRequest) -> Result<TransferSummary> {
        let mut source = Vec::with_capacity(request.files.len());
        for file in request.files {
            let source_asset = Asset::with_headers(file.source_url, request.headers.clone());
            let target = Asset::from_path(&file.target_path)?;
            source.push(WorkItem::Asset(TransferAsset::new(source_asset, target)));
        }

        let pipeline = Pipeline::new()
            .stage(Arc::new(GetAssetMetadata), ConcurrencyOptions::serial())
            .stage(Arc::new(CreateTransferParts), ConcurrencyOptions::serial())
            .stage(
                Arc::new(Transfer),
                ConcurrencyOptions::concurrent(self.effective_concurrency()),
            )
            .stage(Arc::new(JoinTransferParts), ConcurrencyOptions::serial())
            .stage(Arc::new(CloseFiles), ConcurrencyOptions::serial());

        self.run(pipeline, source, request.headers).await
    }

    fn effective_concurrency(&self) -> usize {
        if self.concurrent { self.max_concurrent } else { 1 }
    }

    async fn run(
        &self,
        pipeline: Pipeline,
        source: Vec<WorkItem>,
        headers: HeaderMap,
    ) -> Result<TransferSummary> {
        let controller = TransferController::new();
        let collector = Arc::new(SummaryCollector::default());
        controller.subscribe_all(Arc::clone(&collector) as Arc<dyn TransferObserver>);
        for (kind, observer) in &self.observers {
            match kind {
                Some(kind) => controller.subscribe(*kind, Arc::clone(observer)),
                None => controller.subscribe_all(Arc::clone(observer)),
            }
        }
        for listener in &self.file_listeners {
            let adapter = Arc::new(FileEventAdapter {
                listener: Arc::clone(listener),
            });
            controller.subscribe(EventKind::TransferStart, adapter.clone());
            controller.subscribe(EventKind::TransferProgress, adapter.clone());
            controller.subscribe(EventKind::TransferComplete, adapter);
        }

        let ctx = Arc::new(StageContext {
            http: self.http.clone(),
            controller: controller.clone(),
            tracker: TransferTracker::new(),
            files: FileHandleCache::new(),
            retry: self.retry.clone(),
            preferred_part_size: self.preferred_part_size,
            queue_capacity: self.queue_capacity,
            write_block_size: self.write_block_size,
            reconnect_max: self.reconnect_max,
            headers,
        });

        pipeline.execute(source, ctx).await?;

        let completed = *collector.completed.lock().expect("summary lock poisoned");
        let errors = collector
            .errors
            .lock()
            .expect("summary lock poisoned")
            .clone();
        Ok(TransferSummary {
            completed,
            failed: errors.len(),
            errors,
            direct_binary_enabled: controller.direct_binary_enabled(),
        })
    }
}

impl std::fmt::Debug for TransferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferManager")
            .field("concurrent", &self.concurrent)
            .field("max_concurrent", &self.max_concurrent)
            .field("preferred_part_size", &self.preferred_part_size)
            .field("queue_capacity", &self.queue_capacity)
            .field("write_block_size", &self.write_block_size)
            .field("reconnect_max", &self.reconnect_max)
            .finish_non_exhaustive()
    }
}

fn join_folder(folder: &Url, file_name: &str) -> Result<Url> {
    let mut url = folder.clone();
    url.path_segments_mut()
        .map_err(|_| TransferError::InvalidUrl(format!("cannot-be-a-base URL: {folder}")))?
        .pop_if_empty()
        .push(file_name);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_folder_handles_trailing_slash() {
        let folder = Url::parse("http://host/path/to").unwrap();
        assert_eq!(
            join_folder(&folder, "file-1.jpg").unwrap().as_str(),
            "http://host/path/to/file-1.jpg"
        );

        let folder = Url::parse("http://host/path/to/").unwrap();
        assert_eq!(
            join_folder(&folder, "file-1.jpg").unwrap().as_str(),
            "http://host/path/to/file-1.jpg"
        );
    }

    #[test]
    fn join_folder_encodes_name() {
        let folder = Url::parse("http://host/dam").unwrap();
        let url = join_folder(&folder, "my photo.jpg").unwrap();
        assert_eq!(url.as_str(), "http://host/dam/my%20photo.jpg");
    }

    #[test]
    fn upload_file_builder_requires_source() {
        let result = UploadFileBuilder::new()
            .file_name("a.jpg")
            .file_size(10)
            .build();
        assert!(matches!(result, Err(TransferError::MissingField(_))));
    }

    #[test]
    fn upload_file_builder_rejects_two_sources() {
        let result = UploadFileBuilder::new()
            .file_name("a.jpg")
            .file_size(10)
            .file_path("/tmp/a.jpg")
            .blob(Bytes::from_static(b"x"))
            .build();
        assert!(matches!(result, Err(TransferError::InvalidParameter { .. })));
    }

    #[test]
    fn upload_file_builder_rejects_empty_name() {
        let result = UploadFileBuilder::new()
            .file_name("  ")
            .file_size(10)
            .file_path("/tmp/a.jpg")
            .build();
        assert!(matches!(result, Err(TransferError::InvalidParameter { .. })));
    }

    #[test]
    fn upload_request_builder_requires_files() {
        let result = UploadRequestBuilder::new()
            .folder_url("http://host/dam".parse().unwrap())
            .build();
        assert!(matches!(result, Err(TransferError::MissingField(_))));
    }

    #[test]
    fn manager_builder_defaults() {
        let manager = TransferManagerBuilder::new().build().unwrap();
        assert!(manager.concurrent);
        assert_eq!(manager.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(manager.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(manager.write_block_size, DEFAULT_WRITE_BLOCK_SIZE);
        assert_eq!(manager.reconnect_max, DEFAULT_RECONNECT_MAX);
    }

    #[test]
    fn serial_manager_uses_single_transfer_slot() {
        let manager = TransferManagerBuilder::new()
            .concurrent(false)
            .max_concurrent(8)
            .build()
            .unwrap();
        assert_eq!(manager.effective_concurrency(), 1);
    }

    #[test]
    fn max_concurrent_clamped_to_one() {
        let manager = TransferManagerBuilder::new()
            .max_concurrent(0)
            .build()
            .unwrap();
        assert_eq!(manager.max_concurrent, 1);
    }

    #[test]
    fn debug_omits_internals() {
        let manager = TransferManagerBuilder::new().build().unwrap();
        let debug = format!("{manager:?}");
        assert!(debug.contains("TransferManager"));
        assert!(debug.contains("max_concurrent"));
    }

    #[test]
    fn file_event_from_transfer_event() {
        let mut asset = TransferAsset::new(
            Asset::blob("file-1.jpg"),
            Asset::new("http://host/path/to/file-1.jpg".parse().unwrap()),
        );
        asset.set_metadata(AssetMetadata::new(
            "file-1.jpg",
            Some("image/jpeg".to_string()),
            12,
        ));
        let event = TransferEvent {
            kind: EventKind::TransferProgress,
            stage: "transfer".to_string(),
            asset,
            range: None,
            transferred: Some(12),
            error: None,
        };
        let file_event = FileEvent::from_event(&event).unwrap();
        assert_eq!(file_event.file_name, "file-1.jpg");
        assert_eq!(file_event.file_size, 12);
        assert_eq!(file_event.target_folder, "/path/to");
        assert_eq!(file_event.target_file, "/path/to/file-1.jpg");
        assert_eq!(file_event.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(file_event.transferred, Some(12));
    }
}
