//! Moves the bytes of one part: ranged reads, part PUTs, and streaming
//! ranged downloads with reconnect.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderValue, IF_MATCH, IF_UNMODIFIED_SINCE, RANGE};

use crate::controller::EventKind;
use crate::error::{Result, TransferError, response_error};
use crate::interval::Interval;
use crate::pipeline::stage::{Stage, StageContext, WorkItem};
use crate::queue::BoundedQueue;
use crate::randomfile::{AccessMode, RandomAccessFile};
use crate::buffer::RangeFilter;
use crate::stages::{http_date, merged_headers, parse_content_range};
use crate::stream::StreamReader;
use crate::types::multipart::TransferPart;

/// Transfers one part's byte range.
///
/// Upload parts are read from the local file (or in-memory blob) and PUT
/// to the part's first target URL with retry. Download parts issue a
/// ranged GET and stream the window into the target file, reconnecting
/// from the last written byte when the body breaks mid-stream.
#[derive(Debug, Default)]
pub struct Transfer;

struct StreamOutcome {
    position: u64,
    error: Option<TransferError>,
}

impl Transfer {
    async fn transfer_part(&self, part: &TransferPart, ctx: &StageContext) -> Result<()> {
        if part.asset().target().is_file() {
            self.download_part(part, ctx).await
        } else {
            self.upload_part(part, ctx).await
        }
    }

    async fn upload_part(&self, part: &TransferPart, ctx: &StageContext) -> Result<()> {
        let data = self.read_source(part, ctx).await?;
        let range = part.range();
        if (data.len() as u64) < range.len() {
            return Err(TransferError::PartialRead {
                expected: range.len(),
                actual: data.len() as u64,
            });
        }

        let url = part.url().clone();
        let headers = merged_headers(ctx, part.asset().target());
        ctx.retry
            .retry(|_attempt| {
                let request = ctx
                    .http
                    .put(url.clone())
                    .headers(headers.clone())
                    .body(data.clone());
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

    async fn read_source(&self, part: &TransferPart, ctx: &StageContext) -> Result<Bytes> {
        let asset = part.asset();
        let range = part.range();

        if let Some(blob) = asset.blob() {
            if (blob.len() as u64) < range.end() {
                return Err(TransferError::PartialRead {
                    expected: range.len(),
                    actual: (blob.len() as u64).saturating_sub(range.start()),
                });
            }
            return Ok(blob.slice(range.start() as usize..range.end() as usize));
        }

        let path = asset.source().file_path().ok_or_else(|| {
            TransferError::IllegalArgument(format!(
                "upload source {} is neither a file nor a blob",
                asset.source().url()
            ))
        })?;
        let file = ctx
            .files
            .open_or_get(&path, AccessMode::Read, None)
            .await?;
        let data = file.read_at(range.start(), range.len() as usize).await?;
        Ok(data)
    }

    async fn download_part(&self, part: &TransferPart, ctx: &StageContext) -> Result<()> {
        let asset = part.asset();
        let path = asset.target().file_path().ok_or_else(|| {
            TransferError::IllegalArgument(format!(
                "download target {} is not a file",
                asset.target().url()
            ))
        })?;
        let file = ctx
            .files
            .open_or_get(&path, AccessMode::Write, asset.content_length())
            .await?;

        let window = part.range();
        let mut position = window.start();
        let mut reconnects_left = ctx.reconnect_max;

        loop {
            let remaining = Interval::new(position, window.end())?;
            let outcome = self
                .stream_window(part, ctx, &file, &path, remaining)
                .await?;
            position = outcome.position.max(position);

            if outcome.error.is_none() && position >= window.end() {
                return Ok(());
            }
            let cause = outcome.error.unwrap_or_else(|| {
                TransferError::Stream(format!(
                    "body ended at byte {position} of {}",
                    window.end()
                ))
            });
            if reconnects_left == 0 {
                return Err(cause);
            }
            reconnects_left -= 1;
            tracing::warn!(
                url = %part.url(),
                position,
                error = %cause,
                "download stream broken, reconnecting"
            );
        }
    }

    /// Stream one GET of `window` into the file, returning how far the
    /// write position advanced. A mid-body failure is reported in the
    /// outcome so the caller can reconnect; request-level failures are
    /// returned as errors after the retry policy gives up.
    async fn stream_window(
        &self,
        part: &TransferPart,
        ctx: &StageContext,
        file: &RandomAccessFile,
        path: &Path,
        window: Interval,
    ) -> Result<StreamOutcome> {
        let asset = part.asset();
        let url = part.url().clone();
        let headers = merged_headers(ctx, asset.source());
        let accept_ranges = asset.accept_ranges();

        let response = ctx
            .retry
            .retry(|_attempt| {
                let mut request = ctx.http.get(url.clone()).headers(headers.clone());
                if accept_ranges {
                    request = request.header(
                        RANGE,
                        format!("bytes={}-{}", window.start(), window.end() - 1),
                    );
                }
                if let Some(version) = asset.version() {
                    if let Some(etag) = &version.etag
                        && let Ok(value) = HeaderValue::from_str(&format!("\"{etag}\""))
                    {
                        request = request.header(IF_MATCH, value);
                    } else if let Some(modified) = &version.last_modified
                        && let Ok(value) = HeaderValue::from_str(&http_date(modified))
                    {
                        request = request.header(IF_UNMODIFIED_SINCE, value);
                    }
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

        // Where in the resource does this response body begin?
        let stream_offset = if response.status() == StatusCode::PARTIAL_CONTENT {
            let header = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| TransferError::ContentRange("missing on 206".to_string()))?;
            parse_content_range(&header)?.0
        } else {
            if response.headers().get(CONTENT_LENGTH).is_none() {
                return Err(TransferError::ContentLengthMissing);
            }
            0
        };
        if stream_offset > window.start() {
            return Err(TransferError::Seek {
                offset: window.start(),
                reason: format!("response begins at byte {stream_offset}"),
            });
        }

        let queue: BoundedQueue<Result<Bytes>> = BoundedQueue::new(ctx.queue_capacity);
        let reader = StreamReader::new(ctx.write_block_size);
        let body = Box::pin(response.bytes_stream());

        let produce = reader.drive(body, &queue);
        let consume = async {
            let mut filter = RangeFilter::new(window, stream_offset);
            let mut position = window.start();
            let mut stream_error = None;
            let mut write_error: Option<TransferError> = None;

            // Always drain to completion so the producer never wedges on a
            // full queue.
            while let Some(item) = queue.next().await {
                match item {
                    Ok(chunk) => {
                        let Some(slice) = filter.accept(&chunk) else {
                            continue;
                        };
                        if write_error.is_some() {
                            continue;
                        }
                        match file.write_at(position, slice.clone()).await {
                            Ok(()) => position += slice.len() as u64,
                            Err(err) => {
                                ctx.files.invalidate(path);
                                write_error = Some(TransferError::Io(err));
                            }
                        }
                    }
                    Err(err) => stream_error = Some(err),
                }
            }

            match write_error {
                Some(err) => Err(err),
                None => Ok(StreamOutcome {
                    position,
                    error: stream_error,
                }),
            }
        };

        let ((), outcome) = tokio::join!(produce, consume);
        outcome
    }
}

#[async_trait]
impl Stage for Transfer {
    fn name(&self) -> &'static str {
        "transfer"
    }

    async fn execute(&self, batch: Vec<WorkItem>, ctx: &StageContext) -> Result<Vec<WorkItem>> {
        let mut out = Vec::with_capacity(batch.len());
        for item in batch {
            let part = item.into_part()?;
            if ctx.tracker.is_first(&part) {
                ctx.controller.notify(
                    EventKind::TransferStart,
                    self.name(),
                    part.asset(),
                    None,
                    Some(0),
                );
            }
            match self.transfer_part(&part, ctx).await {
                Ok(()) => {
                    let transferred = ctx.tracker.add_bytes(&part);
                    ctx.controller.notify(
                        EventKind::TransferProgress,
                        self.name(),
                        part.asset(),
                        Some(part.range()),
                        Some(transferred),
                    );
                    out.push(WorkItem::Part(part));
                }
                Err(err) => {
                    ctx.controller.notify_error(self.name(), &err, part.asset());
                }
            }
        }
        Ok(out)
    }
}
