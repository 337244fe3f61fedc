//! Runs a stage across a source sequence with batching and bounded
//! concurrency.

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesOrdered, FuturesUnordered, StreamExt};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::pipeline::stage::{Stage, StageContext, WorkItem};

/// Batching and concurrency settings for one pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyOptions {
    /// Largest batch handed to a single `execute` call.
    pub max_batch_length: usize,
    /// Most `execute` calls in flight at once.
    pub max_concurrent: usize,
    /// Forward outputs in source order instead of completion order.
    pub ordered: bool,
}

impl Default for ConcurrencyOptions {
    fn default() -> Self {
        Self {
            max_batch_length: 1,
            max_concurrent: 1,
            ordered: true,
        }
    }
}

impl ConcurrencyOptions {
    /// Serial, one item at a time. The default.
    pub fn serial() -> Self {
        Self::default()
    }

    /// Up to `max_concurrent` single-item executions, completion order.
    pub fn concurrent(max_concurrent: usize) -> Self {
        Self {
            max_batch_length: 1,
            max_concurrent: max_concurrent.max(1),
            ordered: false,
        }
    }

    /// Serial execution over batches of up to `max_batch_length` items.
    pub fn batched(max_batch_length: usize) -> Self {
        Self {
            max_batch_length: max_batch_length.max(1),
            max_concurrent: 1,
            ordered: true,
        }
    }
}

type StageFuture = BoxFuture<'static, Result<Vec<WorkItem>>>;

enum Pending {
    Ordered(FuturesOrdered<StageFuture>),
    Unordered(FuturesUnordered<StageFuture>),
}

impl Pending {
    fn new(ordered: bool) -> Self {
        if ordered {
            Pending::Ordered(FuturesOrdered::new())
        } else {
            Pending::Unordered(FuturesUnordered::new())
        }
    }

    fn len(&self) -> usize {
        match self {
            Pending::Ordered(futures) => futures.len(),
            Pending::Unordered(futures) => futures.len(),
        }
    }

    fn push(&mut self, future: StageFuture) {
        match self {
            Pending::Ordered(futures) => futures.push_back(future),
            Pending::Unordered(futures) => futures.push(future),
        }
    }

    async fn next(&mut self) -> Option<Result<Vec<WorkItem>>> {
        match self {
            Pending::Ordered(futures) => futures.next().await,
            Pending::Unordered(futures) => futures.next().await,
        }
    }
}

/// A predicate applied to every item before it enters a stage.
pub type InputFilter = dyn Fn(&WorkItem) -> bool + Send + Sync;

/// Drive `stage` over `input`, forwarding outputs to `output`.
///
/// Items accumulate into batches while the stage allows it; batches run
/// with at most `opts.max_concurrent` in flight. Returns the stage's fatal
/// error, if any. A closed output channel means a downstream stage ended
/// the run; this stage then stops quietly.
pub(crate) async fn run_stage(
    stage: Arc<dyn Stage>,
    opts: ConcurrencyOptions,
    mut input: mpsc::Receiver<WorkItem>,
    output: mpsc::Sender<WorkItem>,
    ctx: Arc<StageContext>,
    filter: Option<Arc<InputFilter>>,
) -> Result<()> {
    let max_batch = opts.max_batch_length.max(1);
    let max_concurrent = opts.max_concurrent.max(1);
    let mut pending = Pending::new(opts.ordered);
    let mut batch: Vec<WorkItem> = Vec::new();

    loop {
        tokio::select! {
            item = input.recv() => {
                let Some(item) = item else { break };
                if let Some(filter) = &filter
                    && !filter(&item)
                {
                    continue;
                }
                if !batch.is_empty()
                    && (batch.len() >= max_batch || !stage.can_extend_batch(&batch, &item))
                {
                    if pending.len() >= max_concurrent
                        && !forward_one(&mut pending, &output).await?
                    {
                        return Ok(());
                    }
                    pending.push(spawn_batch(&stage, &ctx, std::mem::take(&mut batch)));
                }
                batch.push(item);
            }
            // Keep in-flight batches progressing while waiting for input.
            result = pending.next(), if pending.len() > 0 => {
                if let Some(result) = result
                    && !send_outputs(result?, &output).await
                {
                    return Ok(());
                }
            }
        }
    }

    if !batch.is_empty() {
        if pending.len() >= max_concurrent && !forward_one(&mut pending, &output).await? {
            return Ok(());
        }
        pending.push(spawn_batch(&stage, &ctx, batch));
    }
    while pending.len() > 0 {
        if !forward_one(&mut pending, &output).await? {
            return Ok(());
        }
    }
    Ok(())
}

fn spawn_batch(
    stage: &Arc<dyn Stage>,
    ctx: &Arc<StageContext>,
    batch: Vec<WorkItem>,
) -> StageFuture {
    let stage = Arc::clone(stage);
    let ctx = Arc::clone(ctx);
    async move { stage.execute(batch, &ctx).await }.boxed()
}

/// Await the next pending batch and forward its outputs.
///
/// Returns `Ok(false)` when the downstream receiver is gone.
async fn forward_one(pending: &mut Pending, output: &mpsc::Sender<WorkItem>) -> Result<bool> {
    if let Some(result) = pending.next().await {
        return Ok(send_outputs(result?, output).await);
    }
    Ok(true)
}

/// Forward one batch's outputs; false when the downstream receiver is gone.
async fn send_outputs(items: Vec<WorkItem>, output: &mpsc::Sender<WorkItem>) -> bool {
    for item in items {
        if output.send(item).await.is_err() {
            return false;
        }
    }
    true
}
