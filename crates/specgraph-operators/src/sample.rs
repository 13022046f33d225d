//! Uniform sampling without replacement, and shuffling.

use arrow::array::UInt64Array;
use arrow::compute::take_record_batch;
use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use specgraph_core::prelude::{Error, SampleSize};

use crate::traits::{OpError, TableOperator};

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn gather(table: &RecordBatch, indices: &[usize]) -> Result<RecordBatch, OpError> {
    let indices = UInt64Array::from_iter_values(indices.iter().map(|&i| i as u64));
    Ok(take_record_batch(table, &indices)?)
}

/// Draws `size` distinct rows; output follows ascending row order.
pub struct Sample {
    pub size: SampleSize,
    pub seed: Option<u64>,
}

impl TableOperator for Sample {
    fn name(&self) -> &'static str {
        "sample"
    }

    fn validate(&self) -> Result<(), OpError> {
        match self.size {
            SampleSize::Size(0) => Err(Error::InvalidInput("sample size must be at least 1".into()).into()),
            SampleSize::Fraction(f) if !(f > 0.0 && f <= 1.0) => {
                Err(Error::InvalidInput(format!("sample fraction {f} is not in (0, 1]")).into())
            }
            _ => Ok(()),
        }
    }

    fn on_empty(&self) -> Result<(), OpError> {
        Err(Error::InvalidInput("cannot sample from an empty dataset".into()).into())
    }

    fn eval_table(&self, table: &RecordBatch) -> Result<RecordBatch, OpError> {
        let total = table.num_rows();
        if total == 0 {
            self.on_empty()?;
        }
        let n = self.size.rows(total);
        if n < 1 || n > total {
            return Err(Error::InvalidInput(format!(
                "cannot draw {n} rows out of {total} without replacement"
            ))
            .into());
        }
        let mut indices = rand::seq::index::sample(&mut rng(self.seed), total, n).into_vec();
        indices.sort_unstable();
        gather(table, &indices)
    }
}

/// Random permutation of all rows.
pub struct Shuffle {
    pub seed: Option<u64>,
}

impl TableOperator for Shuffle {
    fn name(&self) -> &'static str {
        "shuffle"
    }

    fn eval_table(&self, table: &RecordBatch) -> Result<RecordBatch, OpError> {
        if table.num_rows() <= 1 {
            return Ok(table.clone());
        }
        let mut indices: Vec<usize> = (0..table.num_rows()).collect();
        indices.shuffle(&mut rng(self.seed));
        gather(table, &indices)
    }
}
