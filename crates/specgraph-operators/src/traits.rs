//! Operator traits + the batch stream exchanged between them.
//!
//! Streaming operators (`filter`, `project`, `get_item`) transform one batch
//! at a time and implement [`BatchOperator`]. Operators that need global
//! knowledge of the parent (`sample`, `slice`, `extract`, `shuffle`) see the
//! whole parent as one table through [`TableOperator`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use arrow::compute::concat_batches;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use futures::stream::{BoxStream, Stream, StreamExt};
use thiserror::Error;

use crate::rebatch::rechunk;

#[derive(Debug, Error)]
pub enum OpError {
    #[error(transparent)]
    Core(#[from] specgraph_core::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("execution error: {0}")]
    Exec(String),

    #[error("sql error: {0}")]
    Sql(String),
}

impl OpError {
    /// The core taxonomy variant, if this error carries one.
    pub fn core(&self) -> Option<&specgraph_core::Error> {
        match self {
            OpError::Core(e) => Some(e),
            _ => None,
        }
    }
}

/// Lazy, pull-based sequence of record batches.
pub type BatchStream = BoxStream<'static, Result<RecordBatch, OpError>>;

pub fn vec_stream(batches: Vec<RecordBatch>) -> BatchStream {
    futures::stream::iter(batches.into_iter().map(Ok)).boxed()
}

pub fn error_stream(err: OpError) -> BatchStream {
    futures::stream::once(async move { Err(err) }).boxed()
}

/// Stream whose batches come from `fut`, run on the first pull.
pub fn deferred<F>(fut: F) -> BatchStream
where
    F: Future<Output = Result<Vec<RecordBatch>, OpError>> + Send + 'static,
{
    futures::stream::once(fut)
        .map(|chunks| match chunks {
            Ok(chunks) => vec_stream(chunks),
            Err(e) => error_stream(e),
        })
        .flatten()
        .boxed()
}

/// Batch-at-a-time operator.
pub trait BatchOperator: Send + Sync + 'static {
    /// Human-readable operator name (stable).
    fn name(&self) -> &'static str;

    /// Evaluate one input batch. `None` drops it from the output.
    fn eval_batch(&self, batch: &RecordBatch) -> Result<Option<RecordBatch>, OpError>;

    /// Wrap `input` so every pulled batch goes through `eval_batch`.
    fn stream(self, input: BatchStream) -> BatchStream
    where
        Self: Sized + Unpin,
    {
        OperatorStream { op: self, input }.boxed()
    }
}

struct OperatorStream<O> {
    op: O,
    input: BatchStream,
}

impl<O: BatchOperator + Unpin> Stream for OperatorStream<O> {
    type Item = Result<RecordBatch, OpError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.input.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(batch))) => match self.op.eval_batch(&batch) {
                    Ok(Some(out)) => return Poll::Ready(Some(Ok(out))),
                    Ok(None) => continue,
                    Err(e) => return Poll::Ready(Some(Err(e))),
                },
                other => return other,
            }
        }
    }
}

/// Whole-table operator.
pub trait TableOperator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Argument checks that need no data; run before the parent is pulled.
    fn validate(&self) -> Result<(), OpError> {
        Ok(())
    }

    /// Called instead of `eval_table` when the parent yields no batch.
    fn on_empty(&self) -> Result<(), OpError> {
        Ok(())
    }

    fn eval_table(&self, table: &RecordBatch) -> Result<RecordBatch, OpError>;

    /// Lazy stream of the result in `batch_size` chunks. The parent is
    /// drained on the first pull, after `validate` has passed.
    fn stream(self, input: BatchStream, batch_size: usize) -> BatchStream
    where
        Self: Sized + 'static,
    {
        if let Err(e) = self.validate() {
            return error_stream(e);
        }
        deferred(async move {
            match collect_table(input).await? {
                None => {
                    self.on_empty()?;
                    Ok(Vec::new())
                }
                Some(table) => rechunk(&self.eval_table(&table)?, batch_size),
            }
        })
    }
}

/// Drain `input` into one table; `None` when the stream yields no batch.
pub async fn collect_table(mut input: BatchStream) -> Result<Option<RecordBatch>, OpError> {
    let mut batches = Vec::new();
    while let Some(batch) = input.next().await {
        batches.push(batch?);
    }
    match batches.first() {
        None => Ok(None),
        Some(first) => {
            let schema = first.schema();
            Ok(Some(concat_batches(&schema, &batches)?))
        }
    }
}
