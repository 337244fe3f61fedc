//! Transfer endpoints and the per-asset state flowing through the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use reqwest::header::HeaderMap;
use url::Url;

use crate::error::{Result, TransferError};
use crate::types::multipart::MultipartTarget;

/// A source or target endpoint for a binary object.
///
/// Wraps a `file`, `http`, `https`, or opaque `blob` URL together with any
/// extra request headers to send when talking to it. Immutable.
#[derive(Debug, Clone)]
pub struct Asset {
    url: Url,
    headers: HeaderMap,
}

impl Asset {
    /// Create an asset for a URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: HeaderMap::new(),
        }
    }

    /// Create an asset for a URL with extra request headers.
    pub fn with_headers(url: Url, headers: HeaderMap) -> Self {
        Self { url, headers }
    }

    /// Create an asset for a local filesystem path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let url = Url::from_file_path(path).map_err(|_| {
            TransferError::InvalidUrl(format!("not an absolute path: {}", path.display()))
        })?;
        Ok(Self::new(url))
    }

    /// Create an asset for an in-memory binary object.
    ///
    /// The URL only provides identity; the bytes travel on the owning
    /// [`TransferAsset`].
    pub fn blob(name: &str) -> Self {
        let sanitized = name.replace(' ', "%20");
        let url = Url::parse(&format!("blob:{sanitized}"))
            .or_else(|_| Url::parse("blob:inline"))
            .expect("blob: URL is always parseable");
        Self::new(url)
    }

    /// The endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Extra request headers for this endpoint.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// True for `file://` endpoints.
    pub fn is_file(&self) -> bool {
        self.url.scheme() == "file"
    }

    /// True for `http://` and `https://` endpoints.
    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    /// The filesystem path for `file://` endpoints.
    pub fn file_path(&self) -> Option<PathBuf> {
        if self.is_file() {
            self.url.to_file_path().ok()
        } else {
            None
        }
    }

    /// The last path segment, percent-decoded.
    pub fn filename(&self) -> Option<String> {
        let segment = self.url.path_segments()?.next_back()?;
        if segment.is_empty() {
            return None;
        }
        Some(percent_decode_str(segment).decode_utf8_lossy().into_owned())
    }

    /// The URL with the last path segment removed.
    pub fn folder_url(&self) -> Option<Url> {
        let mut folder = self.url.clone();
        folder.path_segments_mut().ok()?.pop();
        folder.set_query(None);
        folder.set_fragment(None);
        Some(folder)
    }

    /// The decoded folder path (e.g. `/path/to` for `/path/to/file.jpg`).
    pub fn folder_path(&self) -> String {
        let path = percent_decode_str(self.url.path())
            .decode_utf8_lossy()
            .into_owned();
        match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
        }
    }

    /// The decoded full path (e.g. `/path/to/file.jpg`).
    pub fn full_path(&self) -> String {
        percent_decode_str(self.url.path())
            .decode_utf8_lossy()
            .into_owned()
    }
}

/// Descriptive metadata for one asset.
#[derive(Debug, Clone)]
pub struct AssetMetadata {
    filename: String,
    content_type: Option<String>,
    content_length: u64,
}

impl AssetMetadata {
    /// Create metadata for an asset.
    pub fn new(filename: impl Into<String>, content_type: Option<String>, content_length: u64) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            content_length,
        }
    }

    /// The filename sent to the target service.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The MIME type, when known.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Total size in bytes.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub(crate) fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }
}

/// Version information used as a precondition on ranged reads.
#[derive(Debug, Clone, Default)]
pub struct AssetVersion {
    /// Last modification time (`If-Unmodified-Since`).
    pub last_modified: Option<DateTime<Utc>>,
    /// Entity tag (`If-Match`).
    pub etag: Option<String>,
}

/// Versioning directives for the complete-upload call.
#[derive(Debug, Clone, Default)]
pub struct VersionOptions {
    /// Create a new version when the target already exists.
    pub create_version: bool,
    /// Label for the created version.
    pub version_label: Option<String>,
    /// Comment for the created version.
    pub version_comment: Option<String>,
    /// Replace the existing asset instead of versioning it.
    pub replace: bool,
}

/// One transfer: a source/target pair plus everything learned about it as
/// it moves through the pipeline.
///
/// Cloning is cheap; the multipart target and blob payload are shared.
/// Identity is the (source URL, target URL) pair.
#[derive(Debug, Clone)]
pub struct TransferAsset {
    source: Asset,
    target: Asset,
    metadata: Option<AssetMetadata>,
    version: Option<AssetVersion>,
    accept_ranges: bool,
    multipart: Option<Arc<MultipartTarget>>,
    blob: Option<Bytes>,
    version_options: Option<VersionOptions>,
}

impl TransferAsset {
    /// Create a transfer for the given endpoints.
    pub fn new(source: Asset, target: Asset) -> Self {
        Self {
            source,
            target,
            metadata: None,
            version: None,
            accept_ranges: false,
            multipart: None,
            blob: None,
            version_options: None,
        }
    }

    /// The source endpoint.
    pub fn source(&self) -> &Asset {
        &self.source
    }

    /// The target endpoint.
    pub fn target(&self) -> &Asset {
        &self.target
    }

    /// Metadata, once acquired.
    pub fn metadata(&self) -> Option<&AssetMetadata> {
        self.metadata.as_ref()
    }

    /// Source version information, once acquired.
    pub fn version(&self) -> Option<&AssetVersion> {
        self.version.as_ref()
    }

    /// Whether the source honors ranged requests.
    pub fn accept_ranges(&self) -> bool {
        self.accept_ranges
    }

    /// The multipart target, once the upload has been initiated.
    pub fn multipart(&self) -> Option<&Arc<MultipartTarget>> {
        self.multipart.as_ref()
    }

    /// The in-memory payload for blob sources.
    pub fn blob(&self) -> Option<&Bytes> {
        self.blob.as_ref()
    }

    /// Versioning directives for the complete call.
    pub fn version_options(&self) -> Option<&VersionOptions> {
        self.version_options.as_ref()
    }

    /// Total size in bytes, when metadata is present.
    pub fn content_length(&self) -> Option<u64> {
        self.metadata.as_ref().map(AssetMetadata::content_length)
    }

    /// MIME type, when known.
    pub fn content_type(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(AssetMetadata::content_type)
    }

    /// Filename: from metadata when present, else the target URL.
    pub fn filename(&self) -> Option<String> {
        match &self.metadata {
            Some(meta) => Some(meta.filename().to_string()),
            None => self.target.filename(),
        }
    }

    /// Stable identity string for the (source, target) pair.
    pub fn identity(&self) -> String {
        format!("{} -> {}", self.source.url(), self.target.url())
    }

    /// Attach metadata. Called by the metadata stage or the request builder.
    pub fn set_metadata(&mut self, metadata: AssetMetadata) {
        self.metadata = Some(metadata);
    }

    /// Set the MIME type, keeping other metadata fields.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        if let Some(meta) = &mut self.metadata {
            meta.set_content_type(content_type);
        }
    }

    /// Attach source version information.
    pub fn set_version(&mut self, version: AssetVersion) {
        self.version = Some(version);
    }

    /// Record whether the source honors ranged requests.
    pub fn set_accept_ranges(&mut self, accept_ranges: bool) {
        self.accept_ranges = accept_ranges;
    }

    /// Attach the multipart target produced by the initiate call.
    pub fn set_multipart(&mut self, multipart: Arc<MultipartTarget>) {
        self.multipart = Some(multipart);
    }

    /// Attach an in-memory payload.
    pub fn set_blob(&mut self, blob: Bytes) {
        self.blob = Some(blob);
    }

    /// Attach versioning directives.
    pub fn set_version_options(&mut self, options: VersionOptions) {
        self.version_options = Some(options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_asset(url: &str) -> Asset {
        Asset::new(Url::parse(url).unwrap())
    }

    #[test]
    fn scheme_predicates() {
        assert!(http_asset("http://host/a").is_http());
        assert!(http_asset("https://host/a").is_http());
        assert!(!http_asset("https://host/a").is_file());
        let file = Asset::from_path(Path::new("/tmp/a.bin")).unwrap();
        assert!(file.is_file());
        assert!(!file.is_http());
        assert_eq!(file.file_path(), Some(PathBuf::from("/tmp/a.bin")));
    }

    #[test]
    fn from_path_rejects_relative() {
        assert!(Asset::from_path(Path::new("relative/a.bin")).is_err());
    }

    #[test]
    fn filename_decodes_last_segment() {
        let asset = http_asset("http://host/path/to/file-1.jpg");
        assert_eq!(asset.filename(), Some("file-1.jpg".to_string()));

        let asset = http_asset("http://host/path/my%20file.jpg");
        assert_eq!(asset.filename(), Some("my file.jpg".to_string()));
    }

    #[test]
    fn folder_url_drops_last_segment() {
        let asset = http_asset("http://host/path/to/file-1.jpg");
        let folder = asset.folder_url().unwrap();
        assert_eq!(folder.as_str(), "http://host/path/to");
    }

    #[test]
    fn folder_and_full_paths() {
        let asset = http_asset("http://host/path/to/file-1.jpg");
        assert_eq!(asset.folder_path(), "/path/to");
        assert_eq!(asset.full_path(), "/path/to/file-1.jpg");

        let root = http_asset("http://host/file.jpg");
        assert_eq!(root.folder_path(), "/");
    }

    #[test]
    fn blob_asset_has_identity() {
        let asset = Asset::blob("file-1.jpg");
        assert_eq!(asset.url().scheme(), "blob");
        assert!(!asset.is_http());
        assert!(!asset.is_file());

        // Spaces must not break URL construction.
        let asset = Asset::blob("my photo.jpg");
        assert_eq!(asset.url().scheme(), "blob");
    }

    #[test]
    fn transfer_asset_accessors() {
        let source = Asset::from_path(Path::new("/tmp/in.jpg")).unwrap();
        let target = http_asset("http://host/path/to/file-1.jpg");
        let mut asset = TransferAsset::new(source, target);
        assert!(asset.metadata().is_none());
        assert_eq!(asset.filename(), Some("file-1.jpg".to_string()));

        asset.set_metadata(AssetMetadata::new("renamed.jpg", None, 12));
        assert_eq!(asset.content_length(), Some(12));
        assert_eq!(asset.filename(), Some("renamed.jpg".to_string()));
        assert_eq!(asset.content_type(), None);

        asset.set_content_type("image/jpeg");
        assert_eq!(asset.content_type(), Some("image/jpeg"));
    }

    #[test]
    fn identity_includes_both_endpoints() {
        let a = TransferAsset::new(
            http_asset("http://host/a"),
            http_asset("http://host/target/1"),
        );
        let b = TransferAsset::new(
            http_asset("http://host/a"),
            http_asset("http://host/target/2"),
        );
        assert_ne!(a.identity(), b.identity());
    }
}
