//! Pipeline stage abstraction and the shared execution context.

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::controller::TransferController;
use crate::error::{Result, TransferError};
use crate::randomfile::FileHandleCache;
use crate::retry::RetryPolicy;
use crate::tracker::TransferTracker;
use crate::types::asset::TransferAsset;
use crate::types::multipart::TransferPart;

/// An item flowing between pipeline stages.
///
/// Stages declare which variant they operate on by matching; receiving the
/// wrong variant is an invariant violation that fails the pipeline.
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// A whole asset (before splitting, or after joining).
    Asset(TransferAsset),
    /// One byte range of an asset.
    Part(TransferPart),
}

impl WorkItem {
    /// The asset this item belongs to, regardless of variant.
    pub fn asset(&self) -> &TransferAsset {
        match self {
            WorkItem::Asset(asset) => asset,
            WorkItem::Part(part) => part.asset(),
        }
    }

    /// Unwrap an asset item; error for a part.
    pub fn into_asset(self) -> Result<TransferAsset> {
        match self {
            WorkItem::Asset(asset) => Ok(asset),
            WorkItem::Part(_) => Err(TransferError::IllegalArgument(
                "expected an asset, found a transfer part".to_string(),
            )),
        }
    }

    /// Unwrap a part item; error for an asset.
    pub fn into_part(self) -> Result<TransferPart> {
        match self {
            WorkItem::Part(part) => Ok(part),
            WorkItem::Asset(_) => Err(TransferError::IllegalArgument(
                "expected a transfer part, found an asset".to_string(),
            )),
        }
    }
}

/// Shared state available to every stage of one pipeline run.
#[derive(Debug)]
pub struct StageContext {
    /// The HTTP client used for all control- and data-plane calls.
    pub http: reqwest::Client,
    /// The event bus for this run.
    pub controller: TransferController,
    /// Per-asset completion tracking.
    pub tracker: TransferTracker,
    /// Cache of open local file handles.
    pub files: FileHandleCache,
    /// Retry policy for HTTP operations.
    pub retry: RetryPolicy,
    /// Caller-preferred part size, if any.
    pub preferred_part_size: Option<u64>,
    /// Capacity of the per-stream chunk queue.
    pub queue_capacity: usize,
    /// Chunk size for streamed downloads.
    pub write_block_size: usize,
    /// How many times a broken download stream may reconnect.
    pub reconnect_max: u32,
    /// Request headers applied to every call.
    pub headers: HeaderMap,
}

/// A pipeline stage: consumes a batch of items, yields the next items.
///
/// Per-asset failures are reported through the controller and the affected
/// items withdrawn (simply not returned); an `Err` from `execute` is a
/// fatal invariant violation that aborts the whole pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name used in events and logs.
    fn name(&self) -> &'static str;

    /// Whether `next` may join the current batch (default: always).
    fn can_extend_batch(&self, _batch: &[WorkItem], _next: &WorkItem) -> bool {
        true
    }

    /// Process one batch of items.
    async fn execute(&self, batch: Vec<WorkItem>, ctx: &StageContext) -> Result<Vec<WorkItem>>;
}
