//! Row-range and passthrough table operators.

use arrow::record_batch::RecordBatch;
use specgraph_core::prelude::Error;

use crate::traits::{OpError, TableOperator};

/// Rows `[start, end)`; `end` is clamped to the row count.
pub struct Slice {
    pub start: i64,
    pub end: i64,
}

impl TableOperator for Slice {
    fn name(&self) -> &'static str {
        "slice"
    }

    fn validate(&self) -> Result<(), OpError> {
        if self.start < 0 {
            return Err(Error::InvalidInput(format!("slice start {} is negative", self.start)).into());
        }
        if self.end < self.start {
            return Err(Error::InvalidInput(format!(
                "slice end {} is before start {}",
                self.end, self.start
            ))
            .into());
        }
        Ok(())
    }

    fn eval_table(&self, table: &RecordBatch) -> Result<RecordBatch, OpError> {
        self.validate()?;
        let rows = table.num_rows();
        let start = (self.start as usize).min(rows);
        let end = (self.end as usize).min(rows);
        Ok(table.slice(start, end - start))
    }
}

/// Hands the parent's rows through unchanged. `size` and `seed` are
/// carried for randomized extraction but not used yet.
pub struct Extract {
    pub size: u64,
    pub seed: u64,
}

impl TableOperator for Extract {
    fn name(&self) -> &'static str {
        "extract"
    }

    fn eval_table(&self, table: &RecordBatch) -> Result<RecordBatch, OpError> {
        Ok(table.clone())
    }
}
