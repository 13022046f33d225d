//! Filter operator: keeps the rows whose value belongs to a target type.
//!
//! The target is the parent type with narrower bounds, fewer enum names or
//! fewer union branches. Surviving rows are reshaped to the target so the
//! output matches it field-for-field.

use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;
use specgraph_core::prelude::{Error, Type, DATA};

use crate::project::project_batch;
use crate::select::{select_batch_rows, select_rows};
use crate::traits::{BatchOperator, OpError};

pub struct Filter {
    pub filter: Type,
    /// Payload lives under a `data` column.
    pub wrapped: bool,
}

impl BatchOperator for Filter {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn eval_batch(&self, batch: &RecordBatch) -> Result<Option<RecordBatch>, OpError> {
        let mask = if self.wrapped {
            let data = batch
                .column_by_name(DATA)
                .ok_or_else(|| Error::Schema(format!("missing '{DATA}' column")))?;
            select_rows(&self.filter, data)?
        } else {
            select_batch_rows(&self.filter, batch)?
        };

        let kept = filter_record_batch(batch, &mask)?;
        if kept.num_rows() == 0 {
            return Ok(None);
        }
        project_batch(&kept, &self.filter, self.wrapped).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray, StructArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn people() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("age", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![10, 30, 70])),
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn keeps_rows_in_bounds() {
        let f = Filter {
            filter: Type::structure([("age", Type::integer(18, 65)), ("name", Type::text())]),
            wrapped: false,
        };
        let out = f.eval_batch(&people()).unwrap().unwrap();
        assert_eq!(out.num_rows(), 1);
        let names = out.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(names.value(0), "b");
    }

    #[test]
    fn empty_result_batch_is_skipped() {
        let f = Filter {
            filter: Type::structure([("age", Type::integer(100, 120)), ("name", Type::text())]),
            wrapped: false,
        };
        assert!(f.eval_batch(&people()).unwrap().is_none());
    }

    #[test]
    fn wrapped_payload_is_filtered_with_siblings() {
        let data = StructArray::from(people());
        let weight = Arc::new(Int64Array::from(vec![1, 2, 3]));
        let schema = Arc::new(Schema::new(vec![
            Field::new(DATA, data.data_type().clone(), false),
            Field::new("weight", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(data), weight]).unwrap();

        let f = Filter {
            filter: Type::structure([("age", Type::integer(0, 40)), ("name", Type::text())]),
            wrapped: true,
        };
        let out = f.eval_batch(&batch).unwrap().unwrap();
        assert_eq!(out.num_rows(), 2);
        let w = out.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(w.values().to_vec(), vec![1, 2]);
    }
}
