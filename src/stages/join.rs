//! Collapses finished parts back into whole assets.

use async_trait::async_trait;

use crate::controller::EventKind;
use crate::error::Result;
use crate::pipeline::stage::{Stage, StageContext, WorkItem};

/// Records finished parts and yields each asset once its ranges cover
/// `[0, content_length)`.
///
/// Parts may arrive in any completion order; the tracker's coalescing
/// range set makes the join insensitive to ordering and to duplicate
/// ranges.
#[derive(Debug, Default)]
pub struct JoinTransferParts;

#[async_trait]
impl Stage for JoinTransferParts {
    fn name(&self) -> &'static str {
        "join-transfer-parts"
    }

    async fn execute(&self, batch: Vec<WorkItem>, ctx: &StageContext) -> Result<Vec<WorkItem>> {
        let mut out = Vec::new();
        for item in batch {
            let part = item.into_part()?;
            let complete = ctx.tracker.record(&part);
            if complete {
                let transferred = ctx.tracker.transferred(&part);
                ctx.controller.notify(
                    EventKind::TransferComplete,
                    self.name(),
                    part.asset(),
                    None,
                    Some(transferred),
                );
                out.push(WorkItem::Asset(part.into_asset()));
            }
        }
        Ok(out)
    }
}
