//! Re-chunking of batch streams to a caller-chosen number of rows.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use futures::stream::{Stream, StreamExt};
use specgraph_core::Error;

use crate::traits::{BatchStream, OpError};

/// Split one table into consecutive batches of `batch_size` rows (the last
/// one may be shorter). An empty table yields no batches.
pub fn rechunk(table: &RecordBatch, batch_size: usize) -> Result<Vec<RecordBatch>, OpError> {
    if batch_size == 0 {
        return Err(Error::InvalidInput("batch_size must be positive".into()).into());
    }
    let mut out = Vec::with_capacity(table.num_rows().div_ceil(batch_size));
    let mut offset = 0;
    while offset < table.num_rows() {
        let len = batch_size.min(table.num_rows() - offset);
        out.push(table.slice(offset, len));
        offset += len;
    }
    Ok(out)
}

/// Stream adapter that coalesces and splits batches so that every emitted
/// batch has exactly `batch_size` rows, except possibly the last. Input
/// order is preserved; empty batches disappear.
pub struct Rebatch {
    input: BatchStream,
    batch_size: usize,
    pending: Vec<RecordBatch>,
    pending_rows: usize,
    ready: VecDeque<RecordBatch>,
    done: bool,
}

impl Rebatch {
    pub fn new(input: BatchStream, batch_size: usize) -> Self {
        Self {
            input,
            batch_size,
            pending: Vec::new(),
            pending_rows: 0,
            ready: VecDeque::new(),
            done: false,
        }
    }

    pub fn boxed(input: BatchStream, batch_size: usize) -> BatchStream {
        Self::new(input, batch_size).boxed()
    }

    fn drain_pending(&mut self, flush: bool) -> Result<(), OpError> {
        if self.pending.is_empty() || (!flush && self.pending_rows < self.batch_size) {
            return Ok(());
        }
        let schema = self.pending[0].schema();
        let merged = concat_batches(&schema, &self.pending)?;
        self.pending.clear();
        self.pending_rows = 0;

        let mut chunks = rechunk(&merged, self.batch_size)?;
        if !flush {
            if let Some(last) = chunks.pop() {
                if last.num_rows() == self.batch_size {
                    chunks.push(last);
                } else {
                    self.pending_rows = last.num_rows();
                    self.pending.push(last);
                }
            }
        }
        self.ready.extend(chunks);
        Ok(())
    }
}

impl Stream for Rebatch {
    type Item = Result<RecordBatch, OpError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.batch_size == 0 {
            if self.done {
                return Poll::Ready(None);
            }
            self.done = true;
            let err = Error::InvalidInput("batch_size must be positive".into());
            return Poll::Ready(Some(Err(err.into())));
        }
        loop {
            if let Some(batch) = self.ready.pop_front() {
                return Poll::Ready(Some(Ok(batch)));
            }
            if self.done {
                return Poll::Ready(None);
            }
            match self.input.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(batch))) => {
                    if batch.num_rows() == 0 {
                        continue;
                    }
                    self.pending_rows += batch.num_rows();
                    self.pending.push(batch);
                    if let Err(e) = self.drain_pending(false) {
                        return Poll::Ready(Some(Err(e)));
                    }
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    self.done = true;
                    if let Err(e) = self.drain_pending(true) {
                        return Poll::Ready(Some(Err(e)));
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
