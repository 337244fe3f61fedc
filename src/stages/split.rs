//! Splits assets into transfer parts.

use async_trait::async_trait;

use crate::error::{Result, TransferError};
use crate::interval::Interval;
use crate::pipeline::stage::{Stage, StageContext, WorkItem};
use crate::types::asset::TransferAsset;
use crate::types::multipart::TransferPart;

const DEFAULT_DOWNLOAD_PART_SIZE: u64 = 10 * 1024 * 1024;

/// Fans each asset out into range-disjoint [`TransferPart`]s whose union
/// covers `[0, content_length)`.
///
/// Uploads split across the broker's upload URLs within its part size
/// bounds; downloads split into fixed windows against the source URL, or a
/// single window when the source does not accept ranged requests.
#[derive(Debug, Default)]
pub struct CreateTransferParts;

/// Pick the part size for `content_length` bytes over `url_count` URLs.
///
/// The preferred size (or an even split) is clamped to the service bounds.
/// The final part absorbs any remainder; only when that remainder would
/// exceed `max_part_size` is the size raised to an even split, and if even
/// that exceeds the bound the asset cannot be transferred.
fn compute_part_size(
    content_length: u64,
    url_count: usize,
    min_part_size: u64,
    max_part_size: u64,
    preferred: Option<u64>,
) -> Result<u64> {
    let count = url_count as u64;
    let even_split = content_length.div_ceil(count);
    let mut size = preferred
        .unwrap_or(even_split)
        .clamp(min_part_size, max_part_size);

    if size * count < content_length {
        let last = content_length - size * (count - 1);
        if last > max_part_size {
            size = even_split;
            if size > max_part_size {
                return Err(TransferError::InvalidPartSize {
                    content_length,
                    url_count,
                    max_part_size,
                });
            }
        }
    }
    Ok(size)
}

fn upload_parts(asset: &TransferAsset, ctx: &StageContext) -> Result<Vec<TransferPart>> {
    let content_length = require_length(asset)?;
    let multipart = asset.multipart().ok_or_else(|| {
        TransferError::IllegalArgument(format!(
            "asset {} has no multipart target",
            asset.identity()
        ))
    })?;
    let urls = multipart.upload_urls();
    let size = compute_part_size(
        content_length,
        urls.len(),
        multipart.min_part_size(),
        multipart.max_part_size(),
        ctx.preferred_part_size,
    )?;

    let mut ranges = Vec::with_capacity(urls.len());
    for index in 0..urls.len() {
        let start = index as u64 * size;
        if start >= content_length {
            break;
        }
        let end = if index == urls.len() - 1 {
            content_length
        } else {
            (start + size).min(content_length)
        };
        ranges.push((start, end, index));
    }

    let mut parts = Vec::with_capacity(ranges.len());
    let single = ranges.len() == 1;
    for (start, end, index) in ranges {
        // A file that fits one part keeps every URL visible on that part;
        // only the first is ever PUT to.
        let target_urls = if single {
            urls.to_vec()
        } else {
            vec![urls[index].clone()]
        };
        parts.push(TransferPart::new(
            asset.clone(),
            target_urls,
            Interval::new(start, end)?,
        )?);
    }
    Ok(parts)
}

fn download_parts(asset: &TransferAsset, ctx: &StageContext) -> Result<Vec<TransferPart>> {
    let content_length = require_length(asset)?;
    let source_url = asset.source().url().clone();
    let size = if asset.accept_ranges() {
        ctx.preferred_part_size
            .unwrap_or(DEFAULT_DOWNLOAD_PART_SIZE)
            .max(1)
    } else {
        content_length
    };

    let mut parts = Vec::new();
    let mut start = 0;
    while start < content_length {
        let end = (start + size).min(content_length);
        parts.push(TransferPart::new(
            asset.clone(),
            vec![source_url.clone()],
            Interval::new(start, end)?,
        )?);
        start = end;
    }
    Ok(parts)
}

#[async_trait]
impl Stage for CreateTransferParts {
    fn name(&self) -> &'static str {
        "create-transfer-parts"
    }

    async fn execute(&self, batch: Vec<WorkItem>, ctx: &StageContext) -> Result<Vec<WorkItem>> {
        let mut out = Vec::new();
        for item in batch {
            let asset = item.into_asset()?;
            let parts = if asset.multipart().is_some() {
                upload_parts(&asset, ctx)
            } else {
                download_parts(&asset, ctx)
            };
            match parts {
                Ok(parts) => out.extend(parts.into_iter().map(WorkItem::Part)),
                Err(err) => ctx.controller.notify_error(self.name(), &err, &asset),
            }
        }
        Ok(out)
    }
}

fn require_length(asset: &TransferAsset) -> Result<u64> {
    match asset.content_length() {
        Some(length) if length > 0 => Ok(length),
        Some(_) => Err(TransferError::UnsupportedFile(format!(
            "{}: file is empty",
            asset.filename().unwrap_or_default()
        ))),
        None => Err(TransferError::IllegalArgument(format!(
            "asset {} has no content length",
            asset.identity()
        ))),
    }
}
