//! Finalizes an upload with the complete-upload call.

use async_trait::async_trait;

use crate::controller::EventKind;
use crate::error::{Result, TransferError, response_error};
use crate::pipeline::stage::{Stage, StageContext, WorkItem};
use crate::stages::merged_headers;
use crate::types::asset::TransferAsset;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// POSTs the complete-upload form for each fully transferred asset.
///
/// The form echoes the broker's upload token together with the file name,
/// size, and MIME type, plus versioning directives when the caller set
/// them. Runs strictly after every part of the asset has been recorded.
#[derive(Debug, Default)]
pub struct AemCompleteUpload;

impl AemCompleteUpload {
    async fn complete(&self, asset: &TransferAsset, ctx: &StageContext) -> Result<()> {
        let multipart = asset.multipart().ok_or_else(|| {
            TransferError::IllegalArgument(format!(
                "asset {} has no multipart target",
                asset.identity()
            ))
        })?;
        let filename = asset.filename().ok_or_else(|| {
            TransferError::IllegalArgument(format!("asset {} has no filename", asset.identity()))
        })?;
        let size = asset.content_length().ok_or_else(|| {
            TransferError::IllegalArgument(format!(
                "asset {} has no content length",
                asset.identity()
            ))
        })?;

        let mut form: Vec<(&str, String)> = vec![
            ("fileName", filename),
            ("fileSize", size.to_string()),
            (
                "mimeType",
                asset
                    .content_type()
                    .unwrap_or(FALLBACK_CONTENT_TYPE)
                    .to_string(),
            ),
            ("uploadToken", multipart.upload_token().to_string()),
        ];
        if let Some(version) = asset.version_options() {
            if version.create_version {
                form.push(("createVersion", "true".to_string()));
            }
            if let Some(label) = &version.version_label {
                form.push(("versionLabel", label.clone()));
            }
            if let Some(comment) = &version.version_comment {
                form.push(("versionComment", comment.clone()));
            }
            if version.replace {
                form.push(("replace", "true".to_string()));
            }
        }

        let url = multipart.complete_url().clone();
        let headers = merged_headers(ctx, asset.target());
        ctx.retry
            .retry(|attempt| {
                let request = ctx
                    .http
                    .post(url.clone())
                    .timeout(attempt.socket_timeout)
                    .headers(headers.clone())
                    .form(&form);
                async move {
                    let response = request.send().await.map_err(TransferError::from)?;
                    if !response.status().is_success() {
                        return Err(response_error(response).await);
                    }
                    Ok(())
                }
            })
            .await
    }
}

#[async_trait]
impl Stage for AemCompleteUpload {
    fn name(&self) -> &'static str {
        "complete-upload"
    }

    async fn execute(&self, batch: Vec<WorkItem>, ctx: &StageContext) -> Result<Vec<WorkItem>> {
        let mut out = Vec::with_capacity(batch.len());
        for item in batch {
            let asset = item.into_asset()?;
            ctx.controller
                .notify(EventKind::AemCompleteUpload, self.name(), &asset, None, None);
            match self.complete(&asset, ctx).await {
                Ok(()) => {
                    ctx.controller.notify(
                        EventKind::AfterAemCompleteUpload,
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
