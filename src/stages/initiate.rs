//! Brokers pre-signed upload URLs via the initiate-upload call.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::controller::EventKind;
use crate::error::{Result, TransferError, response_error};
use crate::pipeline::stage::{Stage, StageContext, WorkItem};
use crate::stages::merged_headers;
use crate::types::asset::TransferAsset;
use crate::types::multipart::{InitiateUploadFile, InitiateUploadResponse, MultipartTarget};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Requests upload URLs for a batch of assets sharing a target folder.
///
/// POSTs `{folder}.initiateUpload.json` with ordered repeated
/// `fileName`/`fileSize` form fields, validates the per-file records in
/// the response, and attaches a [`MultipartTarget`] to each asset. A
/// response without usable `files` records means the service lacks direct
/// binary upload; the whole batch is withdrawn with a NOT_SUPPORTED error
/// so the capability probe can switch strategies.
#[derive(Debug, Default)]
pub struct AemInitiateUpload;

impl AemInitiateUpload {
    async fn initiate_batch(
        &self,
        assets: &mut [TransferAsset],
        ctx: &StageContext,
    ) -> Result<()> {
        let folder = assets[0].target().folder_url().ok_or_else(|| {
            TransferError::InvalidUrl(format!(
                "target {} has no folder",
                assets[0].target().url()
            ))
        })?;
        let initiate_url = initiate_url(&folder)?;

        let mut form: Vec<(&str, String)> = Vec::with_capacity(assets.len() * 2);
        for asset in assets.iter() {
            let filename = asset.filename().ok_or_else(|| {
                TransferError::IllegalArgument(format!(
                    "asset {} has no filename",
                    asset.identity()
                ))
            })?;
            let size = asset.content_length().ok_or_else(|| {
                TransferError::IllegalArgument(format!(
                    "asset {} has no content length",
                    asset.identity()
                ))
            })?;
            form.push(("fileName", filename));
            form.push(("fileSize", size.to_string()));
        }

        let headers = merged_headers(ctx, assets[0].target());
        let response: InitiateUploadResponse = ctx
            .retry
            .retry(|attempt| {
                let request = ctx
                    .http
                    .post(initiate_url.clone())
                    .timeout(attempt.socket_timeout)
                    .headers(headers.clone())
                    .form(&form);
                async move {
                    let response = request.send().await.map_err(TransferError::from)?;
                    if !response.status().is_success() {
                        return Err(response_error(response).await);
                    }
                    response
                        .json()
                        .await
                        .map_err(|err| TransferError::Json(err.to_string()))
                }
            })
            .await?;

        let files = match response.files {
            Some(files) if files.len() == assets.len() => files,
            // Shape says the service has no direct binary upload.
            _ => return Err(TransferError::NotSupported),
        };
        let complete_uri = response.complete_uri.ok_or(TransferError::NotSupported)?;
        let complete_url = folder
            .join(&complete_uri)
            .map_err(|err| TransferError::InvalidUrl(err.to_string()))?;

        for (asset, file) in assets.iter_mut().zip(files) {
            let target = multipart_target(&folder, &complete_url, &file)?;
            if asset.content_type().is_none() {
                let content_type = file
                    .mime_type
                    .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
                asset.set_content_type(content_type);
            }
            asset.set_multipart(Arc::new(target));
        }
        Ok(())
    }
}

fn initiate_url(folder: &Url) -> Result<Url> {
    let base = folder.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}.initiateUpload.json"))
        .map_err(|err| TransferError::InvalidUrl(err.to_string()))
}

fn multipart_target(
    folder: &Url,
    complete_url: &Url,
    file: &InitiateUploadFile,
) -> Result<MultipartTarget> {
    if file.upload_uris.is_empty() {
        return Err(TransferError::NotSupported);
    }
    let (Some(min_part_size), Some(max_part_size), Some(upload_token)) = (
        file.min_part_size,
        file.max_part_size,
        file.upload_token.as_ref(),
    ) else {
        return Err(TransferError::NotSupported);
    };
    if min_part_size < 1 || min_part_size > max_part_size {
        return Err(TransferError::NotSupported);
    }

    let mut upload_urls = Vec::with_capacity(file.upload_uris.len());
    for uri in &file.upload_uris {
        let url = folder
            .join(uri)
            .map_err(|err| TransferError::InvalidUrl(err.to_string()))?;
        upload_urls.push(url);
    }
    MultipartTarget::new(
        upload_urls,
        min_part_size,
        max_part_size,
        complete_url.clone(),
        upload_token,
    )
}

#[async_trait]
impl Stage for AemInitiateUpload {
    fn name(&self) -> &'static str {
        "initiate-upload"
    }

    /// Batch only assets bound for the same target folder.
    fn can_extend_batch(&self, batch: &[WorkItem], next: &WorkItem) -> bool {
        batch[0].asset().target().folder_url() == next.asset().target().folder_url()
    }

    async fn execute(&self, batch: Vec<WorkItem>, ctx: &StageContext) -> Result<Vec<WorkItem>> {
        let mut assets = Vec::with_capacity(batch.len());
        for item in batch {
            assets.push(item.into_asset()?);
        }
        if assets.is_empty() {
            return Ok(Vec::new());
        }

        for asset in &assets {
            ctx.controller
                .notify(EventKind::AemInitiateUpload, self.name(), asset, None, None);
        }

        match self.initiate_batch(&mut assets, ctx).await {
            Ok(()) => {
                for asset in &assets {
                    ctx.controller.notify(
                        EventKind::AfterAemInitiateUpload,
                        self.name(),
                        asset,
                        None,
                        None,
                    );
                }
                Ok(assets.into_iter().map(WorkItem::Asset).collect())
            }
            Err(err) => {
                // The whole batch shared the failed call; withdraw it.
                for asset in &assets {
                    ctx.controller.notify_error(self.name(), &err, asset);
                }
                Ok(Vec::new())
            }
        }
    }
}
