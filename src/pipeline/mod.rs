//! Composition of stages into an executable transfer pipeline.

pub mod concurrent;
pub mod stage;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

pub use concurrent::{ConcurrencyOptions, InputFilter};
pub use stage::{Stage, StageContext, WorkItem};

use crate::error::{Result, TransferError};

const STAGE_CHANNEL_CAPACITY: usize = 16;

/// An ordered chain of stages executed over bounded channels.
///
/// Each stage runs as its own task wrapped by the concurrency operator, so
/// an asset can be in the transfer stage while the next one is still being
/// initiated. Whatever happens, the file handle cache is closed before
/// `execute` returns.
///
/// # Examples
/// ```no_run
/// # use std::sync::Arc;
/// # use httptransfer::{ConcurrencyOptions, Pipeline, StageContext, WorkItem};
/// # use httptransfer::stages::{CloseFiles, CreateTransferParts, JoinTransferParts, Transfer};
/// # async fn example(ctx: Arc<StageContext>, source: Vec<WorkItem>) -> httptransfer::Result<()> {
/// let pipeline = Pipeline::new()
///     .stage(Arc::new(CreateTransferParts), ConcurrencyOptions::serial())
///     .stage(Arc::new(Transfer), ConcurrencyOptions::concurrent(4))
///     .stage(Arc::new(JoinTransferParts), ConcurrencyOptions::serial())
///     .stage(Arc::new(CloseFiles), ConcurrencyOptions::serial());
/// let completed = pipeline.execute(source, ctx).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<(Arc<dyn Stage>, ConcurrencyOptions)>,
    filter: Option<Arc<InputFilter>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage with its concurrency settings.
    pub fn stage(mut self, stage: Arc<dyn Stage>, opts: ConcurrencyOptions) -> Self {
        self.stages.push((stage, opts));
        self
    }

    /// Install a filter applied identically to every stage's input.
    pub fn input_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&WorkItem) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Number of stages in the pipeline.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run `source` through every stage and collect the final outputs.
    ///
    /// Per-asset failures surface as controller events; an `Err` here means
    /// a fatal invariant violation aborted the run. File handles are closed
    /// on every exit path.
    pub async fn execute(
        &self,
        source: Vec<WorkItem>,
        ctx: Arc<StageContext>,
    ) -> Result<Vec<WorkItem>> {
        let result = self.execute_inner(source, Arc::clone(&ctx)).await;
        ctx.files.close_all().await;
        result
    }

    async fn execute_inner(
        &self,
        source: Vec<WorkItem>,
        ctx: Arc<StageContext>,
    ) -> Result<Vec<WorkItem>> {
        if self.stages.is_empty() {
            return Ok(source);
        }

        let mut join: JoinSet<Result<()>> = JoinSet::new();
        let (source_tx, mut rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);

        join.spawn(async move {
            for item in source {
                if source_tx.send(item).await.is_err() {
                    break;
                }
            }
            Ok(())
        });

        for (stage, opts) in &self.stages {
            let (tx, next_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
            join.spawn(concurrent::run_stage(
                Arc::clone(stage),
                *opts,
                rx,
                tx,
                Arc::clone(&ctx),
                self.filter.clone(),
            ));
            rx = next_rx;
        }

        let collector =
            tokio::spawn(async move {
                let mut outputs = Vec::new();
                while let Some(item) = rx.recv().await {
                    outputs.push(item);
                }
                outputs
            });

        let mut failure: Option<TransferError> = None;
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if failure.is_none() {
                        tracing::error!(error = %err, "pipeline stage failed fatally");
                        failure = Some(err);
                        join.abort_all();
                    }
                }
                Err(join_err) => {
                    if !join_err.is_cancelled() && failure.is_none() {
                        failure = Some(TransferError::IllegalArgument(format!(
                            "pipeline stage panicked: {join_err}"
                        )));
                        join.abort_all();
                    }
                }
            }
        }

        let outputs = collector.await.unwrap_or_default();
        match failure {
            Some(err) => Err(err),
            None => Ok(outputs),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|(stage, _)| stage.name()))
            .finish()
    }
}
