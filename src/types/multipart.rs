//! Multipart upload targets, transfer parts, and the initiate wire format.

use serde::Deserialize;
use url::Url;

use crate::error::{Result, TransferError};
use crate::interval::Interval;
use crate::types::asset::TransferAsset;

/// The broker's description of how to split an asset and where to send
/// its parts.
///
/// Produced by the initiate call, shared read-only by all subsequent
/// stages. The `upload_token` is opaque and echoed back on complete.
#[derive(Debug, Clone)]
pub struct MultipartTarget {
    upload_urls: Vec<Url>,
    min_part_size: u64,
    max_part_size: u64,
    complete_url: Url,
    upload_token: String,
}

impl MultipartTarget {
    /// Create a multipart target, validating its invariants.
    pub fn new(
        upload_urls: Vec<Url>,
        min_part_size: u64,
        max_part_size: u64,
        complete_url: Url,
        upload_token: impl Into<String>,
    ) -> Result<Self> {
        if upload_urls.is_empty() {
            return Err(TransferError::IllegalArgument(
                "multipart target requires at least one upload URL".to_string(),
            ));
        }
        if min_part_size < 1 || min_part_size > max_part_size {
            return Err(TransferError::IllegalArgument(format!(
                "invalid part size bounds: min {min_part_size}, max {max_part_size}"
            )));
        }
        Ok(Self {
            upload_urls,
            min_part_size,
            max_part_size,
            complete_url,
            upload_token: upload_token.into(),
        })
    }

    /// The ordered pre-signed upload URLs.
    pub fn upload_urls(&self) -> &[Url] {
        &self.upload_urls
    }

    /// Smallest part the service accepts.
    pub fn min_part_size(&self) -> u64 {
        self.min_part_size
    }

    /// Largest part the service accepts.
    pub fn max_part_size(&self) -> u64 {
        self.max_part_size
    }

    /// Where to POST the complete call.
    pub fn complete_url(&self) -> &Url {
        &self.complete_url
    }

    /// Opaque token echoed back on complete.
    pub fn upload_token(&self) -> &str {
        &self.upload_token
    }
}

/// One contiguous byte range of a [`TransferAsset`], bound for one URL.
#[derive(Debug, Clone)]
pub struct TransferPart {
    asset: TransferAsset,
    target_urls: Vec<Url>,
    range: Interval,
}

impl TransferPart {
    /// Create a part, validating it against the asset's metadata.
    pub fn new(asset: TransferAsset, target_urls: Vec<Url>, range: Interval) -> Result<Self> {
        if target_urls.is_empty() {
            return Err(TransferError::IllegalArgument(
                "transfer part requires at least one target URL".to_string(),
            ));
        }
        if range.is_empty() {
            return Err(TransferError::IllegalArgument(format!(
                "transfer part range {range} is empty"
            )));
        }
        let content_length = asset.content_length().ok_or_else(|| {
            TransferError::IllegalArgument("transfer part requires asset metadata".to_string())
        })?;
        if range.end() > content_length {
            return Err(TransferError::IllegalArgument(format!(
                "transfer part range {range} exceeds content length {content_length}"
            )));
        }
        Ok(Self {
            asset,
            target_urls,
            range,
        })
    }

    /// The asset this part belongs to.
    pub fn asset(&self) -> &TransferAsset {
        &self.asset
    }

    /// Give back the owned asset (after the part has been recorded).
    pub fn into_asset(self) -> TransferAsset {
        self.asset
    }

    /// The candidate URLs for this part. Only the first is ever used.
    pub fn target_urls(&self) -> &[Url] {
        &self.target_urls
    }

    /// The URL this part is actually sent to.
    pub fn url(&self) -> &Url {
        &self.target_urls[0]
    }

    /// The byte range this part covers.
    pub fn range(&self) -> Interval {
        self.range
    }
}

/// Initiate response body: `{completeURI, files: [...]}`.
#[derive(Debug, Deserialize)]
pub(crate) struct InitiateUploadResponse {
    #[serde(rename = "completeURI", default)]
    pub complete_uri: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<InitiateUploadFile>>,
}

/// Per-file record in the initiate response.
#[derive(Debug, Deserialize)]
pub(crate) struct InitiateUploadFile {
    #[serde(rename = "fileName", default)]
    pub file_name: Option<String>,
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
    #[serde(rename = "uploadToken", default)]
    pub upload_token: Option<String>,
    #[serde(rename = "uploadURIs", default)]
    pub upload_uris: Vec<String>,
    #[serde(rename = "minPartSize", default)]
    pub min_part_size: Option<u64>,
    #[serde(rename = "maxPartSize", default)]
    pub max_part_size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::asset::{Asset, AssetMetadata};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn asset_with_length(len: u64) -> TransferAsset {
        let mut asset = TransferAsset::new(
            Asset::new(url("http://host/src/file.bin")),
            Asset::new(url("http://host/dst/file.bin")),
        );
        asset.set_metadata(AssetMetadata::new("file.bin", None, len));
        asset
    }

    #[test]
    fn multipart_target_validates_bounds() {
        let urls = vec![url("http://blob/u1")];
        assert!(MultipartTarget::new(urls.clone(), 1, 100, url("http://host/c"), "t").is_ok());
        assert!(MultipartTarget::new(urls.clone(), 0, 100, url("http://host/c"), "t").is_err());
        assert!(MultipartTarget::new(urls, 200, 100, url("http://host/c"), "t").is_err());
        assert!(MultipartTarget::new(vec![], 1, 100, url("http://host/c"), "t").is_err());
    }

    #[test]
    fn part_validates_range_against_metadata() {
        let asset = asset_with_length(100);
        let urls = vec![url("http://blob/u1")];

        let part = TransferPart::new(
            asset.clone(),
            urls.clone(),
            Interval::new(0, 100).unwrap(),
        );
        assert!(part.is_ok());

        let err = TransferPart::new(asset.clone(), urls.clone(), Interval::new(0, 101).unwrap())
            .unwrap_err();
        assert!(matches!(err, TransferError::IllegalArgument(_)));

        let err =
            TransferPart::new(asset.clone(), urls, Interval::new(50, 50).unwrap()).unwrap_err();
        assert!(matches!(err, TransferError::IllegalArgument(_)));

        let err = TransferPart::new(asset, vec![], Interval::new(0, 10).unwrap()).unwrap_err();
        assert!(matches!(err, TransferError::IllegalArgument(_)));
    }

    #[test]
    fn part_requires_metadata() {
        let asset = TransferAsset::new(
            Asset::new(url("http://host/src")),
            Asset::new(url("http://host/dst")),
        );
        let err = TransferPart::new(
            asset,
            vec![url("http://blob/u1")],
            Interval::new(0, 10).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::IllegalArgument(_)));
    }

    #[test]
    fn part_url_is_first_target() {
        let asset = asset_with_length(10);
        let part = TransferPart::new(
            asset,
            vec![url("http://blob/u1"), url("http://blob/u2")],
            Interval::new(0, 10).unwrap(),
        )
        .unwrap();
        assert_eq!(part.url().as_str(), "http://blob/u1");
        assert_eq!(part.target_urls().len(), 2);
    }

    #[test]
    fn deserialize_initiate_response() {
        let json = r#"{
            "completeURI": "/content/dam.completeUpload.json",
            "files": [{
                "fileName": "file-1.jpg",
                "mimeType": "image/jpeg",
                "uploadToken": "upload-token",
                "uploadURIs": ["https://blob.example.com/u1"],
                "minPartSize": 1,
                "maxPartSize": 10000
            }]
        }"#;
        let resp: InitiateUploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            resp.complete_uri.as_deref(),
            Some("/content/dam.completeUpload.json")
        );
        let files = resp.files.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name.as_deref(), Some("file-1.jpg"));
        assert_eq!(files[0].upload_uris.len(), 1);
        assert_eq!(files[0].min_part_size, Some(1));
    }

    #[test]
    fn deserialize_initiate_response_without_files() {
        let resp: InitiateUploadResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.files.is_none());
        assert!(resp.complete_uri.is_none());
    }
}
