//! Tears down file handles once an asset is done.

use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::stage::{Stage, StageContext, WorkItem};

/// Closes the cached file handles for each asset's endpoints.
///
/// Missing cache entries are tolerated; an asset may never have opened a
/// handle (blob upload) or may share a handle already closed for a
/// sibling target.
#[derive(Debug, Default)]
pub struct CloseFiles;

#[async_trait]
impl Stage for CloseFiles {
    fn name(&self) -> &'static str {
        "close-files"
    }

    async fn execute(&self, batch: Vec<WorkItem>, ctx: &StageContext) -> Result<Vec<WorkItem>> {
        let mut out = Vec::with_capacity(batch.len());
        for item in batch {
            let asset = item.into_asset()?;
            if let Some(path) = asset.source().file_path() {
                ctx.files.close(&path).await;
            }
            if let Some(path) = asset.target().file_path() {
                ctx.files.close(&path).await;
            }
            out.push(WorkItem::Asset(asset));
        }
        Ok(out)
    }
}
