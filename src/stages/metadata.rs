//! Acquires size, type, and version information for source assets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, LAST_MODIFIED, RANGE};

use crate::controller::EventKind;
use crate::error::{Result, TransferError, response_error};
use crate::pipeline::stage::{Stage, StageContext, WorkItem};
use crate::stages::{merged_headers, parse_content_range};
use crate::types::asset::{AssetMetadata, AssetVersion, TransferAsset};

/// Fills in `metadata`, `version`, and `accept_ranges` for each asset.
///
/// `file://` sources are stat'ed and their MIME type guessed from the
/// extension. HTTP sources are probed with HEAD, falling back to a
/// single-byte ranged GET for hosts that reject HEAD. Assets whose
/// metadata was fully supplied by the caller pass through untouched.
#[derive(Debug, Default)]
pub struct GetAssetMetadata;

struct ProbedMetadata {
    content_type: Option<String>,
    content_length: u64,
    last_modified: Option<DateTime<Utc>>,
    etag: Option<String>,
    accept_ranges: bool,
}

impl GetAssetMetadata {
    async fn acquire(&self, asset: &mut TransferAsset, ctx: &StageContext) -> Result<()> {
        let source = asset.source().clone();
        let filename = asset
            .filename()
            .or_else(|| source.filename())
            .ok_or_else(|| {
                TransferError::IllegalArgument(format!(
                    "asset {} has no filename",
                    source.url()
                ))
            })?;

        if let Some(blob) = asset.blob().cloned() {
            let length = asset.content_length().unwrap_or(blob.len() as u64);
            let content_type = asset
                .content_type()
                .map(str::to_string)
                .or_else(|| guess_mime(&filename));
            asset.set_metadata(AssetMetadata::new(filename, content_type, length));
            asset.set_accept_ranges(true);
            return Ok(());
        }

        if source.is_file() {
            let path = source.file_path().ok_or_else(|| {
                TransferError::InvalidUrl(format!("unusable file URL: {}", source.url()))
            })?;
            let stat = tokio::fs::metadata(&path).await?;
            let content_type = asset
                .content_type()
                .map(str::to_string)
                .or_else(|| guess_mime(&filename));
            let length = asset.content_length().unwrap_or(stat.len());
            asset.set_metadata(AssetMetadata::new(filename, content_type, length));
            asset.set_version(AssetVersion {
                last_modified: stat.modified().ok().map(DateTime::<Utc>::from),
                etag: None,
            });
            asset.set_accept_ranges(true);
            return Ok(());
        }

        let probed = self.probe_http(asset, ctx).await?;
        let content_type = asset
            .content_type()
            .map(str::to_string)
            .or(probed.content_type);
        asset.set_metadata(AssetMetadata::new(
            filename,
            content_type,
            probed.content_length,
        ));
        asset.set_version(AssetVersion {
            last_modified: probed.last_modified,
            etag: probed.etag,
        });
        asset.set_accept_ranges(probed.accept_ranges);
        Ok(())
    }

    /// HEAD the source, or issue a `Range: bytes=0-0` GET for hosts known
    /// to reject HEAD (blob stores such as `*.amazonaws.com`).
    async fn probe_http(&self, asset: &TransferAsset, ctx: &StageContext) -> Result<ProbedMetadata> {
        let source = asset.source();
        let prefer_get = source
            .url()
            .host_str()
            .is_some_and(|host| host.ends_with(".amazonaws.com"));

        if !prefer_get {
            match self.probe_with(Method::HEAD, asset, ctx).await {
                Ok(probed) => return Ok(probed),
                // Some hosts reject HEAD outright; retry the probe as GET.
                Err(TransferError::Response { status: 405, .. }) => {}
                Err(err) => return Err(err),
            }
        }
        self.probe_with(Method::GET, asset, ctx).await
    }

    async fn probe_with(
        &self,
        method: Method,
        asset: &TransferAsset,
        ctx: &StageContext,
    ) -> Result<ProbedMetadata> {
        let source = asset.source();
        let headers = merged_headers(ctx, source);
        let url = source.url().clone();

        let response = ctx
            .retry
            .retry(|attempt| {
                let mut request = ctx
                    .http
                    .request(method.clone(), url.clone())
                    .timeout(attempt.socket_timeout)
                    .headers(headers.clone());
                if method == Method::GET {
                    request = request.header(RANGE, "bytes=0-0");
                }
                async move {
                    let response = request.send().await.map_err(TransferError::from)?;
                    if !response.status().is_success() {
                        return Err(response_error(response).await);
                    }
                    Ok(response)
                }
            })
            .await?;

        let header = |name: &reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        let content_length = match header(&CONTENT_RANGE) {
            Some(range) => parse_content_range(&range)?.2,
            None => header(&CONTENT_LENGTH)
                .and_then(|value| value.parse().ok())
                .ok_or(TransferError::ContentLengthMissing)?,
        };

        Ok(ProbedMetadata {
            content_type: header(&CONTENT_TYPE),
            content_length,
            last_modified: header(&LAST_MODIFIED).and_then(|value| {
                DateTime::parse_from_rfc2822(&value)
                    .map(|parsed| parsed.with_timezone(&Utc))
                    .ok()
            }),
            etag: header(&ETAG).map(|value| value.trim_matches('"').to_string()),
            accept_ranges: header(&ACCEPT_RANGES).is_some_and(|value| value == "bytes"),
        })
    }
}

fn guess_mime(filename: &str) -> Option<String> {
    mime_guess::from_path(filename)
        .first_raw()
        .map(str::to_string)
}

fn has_full_metadata(asset: &TransferAsset) -> bool {
    asset
        .metadata()
        .is_some_and(|meta| meta.content_length() > 0 && meta.content_type().is_some())
}

#[async_trait]
impl Stage for GetAssetMetadata {
    fn name(&self) -> &'static str {
        "get-asset-metadata"
    }

    async fn execute(&self, batch: Vec<WorkItem>, ctx: &StageContext) -> Result<Vec<WorkItem>> {
        let mut out = Vec::with_capacity(batch.len());
        for item in batch {
            let mut asset = item.into_asset()?;
            if has_full_metadata(&asset) {
                out.push(WorkItem::Asset(asset));
                continue;
            }
            ctx.controller
                .notify(EventKind::GetAssetMetadata, self.name(), &asset, None, None);
            match self.acquire(&mut asset, ctx).await {
                Ok(()) => {
                    ctx.controller.notify(
                        EventKind::AfterGetAssetMetadata,
                        self.name(),
                        &asset,
                        None,
                        None,
                    );
                    out.push(WorkItem::Asset(asset));
                }
                Err(err) => {
                    ctx.controller.notify_error(self.name(), &err, &asset);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_guessed_from_extension() {
        assert_eq!(guess_mime("photo.jpg"), Some("image/jpeg".to_string()));
        assert_eq!(guess_mime("doc.pdf"), Some("application/pdf".to_string()));
        assert_eq!(guess_mime("no-extension"), None);
    }

    #[test]
    fn full_metadata_check() {
        use crate::types::asset::Asset;
        use url::Url;

        let mut asset = TransferAsset::new(
            Asset::new(Url::parse("blob:a.jpg").unwrap()),
            Asset::new(Url::parse("http://host/dst/a.jpg").unwrap()),
        );
        assert!(!has_full_metadata(&asset));

        asset.set_metadata(AssetMetadata::new("a.jpg", None, 10));
        assert!(!has_full_metadata(&asset));

        asset.set_content_type("image/jpeg");
        assert!(has_full_metadata(&asset));
    }
}
