//! Column projection onto a target `Type`.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, ListArray, StructArray};
use arrow::datatypes::{Field, Fields};
use arrow::record_batch::RecordBatch;
use specgraph_core::prelude::{Error, Type, TypeKind, DATA, FIELD_SELECTED};

use crate::traits::{BatchOperator, OpError};

/// Keep only the parts of `array` present in `ty`, preserving nesting and
/// the original field order. Union arrays keep their `field_selected` child.
pub fn project_array(ty: &Type, array: &ArrayRef) -> Result<ArrayRef, OpError> {
    match &ty.kind {
        TypeKind::Struct { fields } | TypeKind::Union { fields } => {
            let s = array.as_any().downcast_ref::<StructArray>().ok_or_else(|| {
                Error::Schema(format!("expected a struct array, got {}", array.data_type()))
            })?;
            let mut out_fields = Vec::new();
            let mut out_columns = Vec::new();
            for (field, column) in s.fields().iter().zip(s.columns()) {
                let keep_selector = ty.is_union() && field.name() == FIELD_SELECTED;
                let projected = match ty.child(field.name()) {
                    Some(_) if keep_selector => column.clone(),
                    Some(child_ty) => project_array(child_ty, column)?,
                    None if keep_selector => column.clone(),
                    None => continue,
                };
                out_fields.push(Field::new(
                    field.name(),
                    projected.data_type().clone(),
                    field.is_nullable(),
                ));
                out_columns.push(projected);
            }
            for (name, _) in fields {
                if s.column_by_name(name).is_none() {
                    return Err(Error::Schema(format!("missing column '{name}'")).into());
                }
            }
            if out_fields.is_empty() {
                return Ok(Arc::new(StructArray::new_empty_fields(
                    s.len(),
                    s.nulls().cloned(),
                )));
            }
            let out = StructArray::try_new(
                Fields::from(out_fields),
                out_columns,
                s.nulls().cloned(),
            )?;
            Ok(Arc::new(out))
        }
        TypeKind::Optional { inner } | TypeKind::Constrained { inner, .. } => {
            project_array(inner, array)
        }
        TypeKind::List { inner, .. } => {
            let Some(list) = array.as_any().downcast_ref::<ListArray>() else {
                return Ok(array.clone());
            };
            let values = project_array(inner, list.values())?;
            let item = match list.data_type() {
                arrow::datatypes::DataType::List(f) => Field::new(
                    f.name(),
                    values.data_type().clone(),
                    f.is_nullable(),
                ),
                other => {
                    return Err(Error::Schema(format!("expected a list, got {other}")).into())
                }
            };
            let out = ListArray::try_new(
                Arc::new(item),
                list.offsets().clone(),
                values,
                list.nulls().cloned(),
            )?;
            Ok(Arc::new(out))
        }
        TypeKind::Hypothesis { .. } => match ty.best_hypothesis() {
            Some(best) => project_array(best, array),
            None => Ok(array.clone()),
        },
        _ => Ok(array.clone()),
    }
}

/// Project a record batch. With `wrapped`, only the `data` column is
/// reshaped and its sibling columns are left untouched.
pub fn project_batch(batch: &RecordBatch, ty: &Type, wrapped: bool) -> Result<RecordBatch, OpError> {
    if wrapped {
        let schema = batch.schema();
        let idx = schema
            .index_of(DATA)
            .map_err(|_| Error::Schema(format!("missing '{DATA}' column")))?;
        let data = project_array(ty, batch.column(idx))?;
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        fields[idx] = Field::new(DATA, data.data_type().clone(), fields[idx].is_nullable());
        let mut columns = batch.columns().to_vec();
        columns[idx] = data;
        return Ok(RecordBatch::try_new(
            Arc::new(arrow::datatypes::Schema::new(fields)),
            columns,
        )?);
    }
    let array: ArrayRef = Arc::new(StructArray::from(batch.clone()));
    let projected = project_array(ty, &array)?;
    let s = projected
        .as_any()
        .downcast_ref::<StructArray>()
        .ok_or_else(|| Error::Schema("projection of a batch must be a struct".into()))?;
    Ok(RecordBatch::from(s))
}

/// Streaming `project`: same rows, only the target's columns.
pub struct Project {
    pub projection: Type,
    /// Payload lives under a `data` column.
    pub wrapped: bool,
}

impl BatchOperator for Project {
    fn name(&self) -> &'static str {
        "project"
    }

    fn eval_batch(&self, batch: &RecordBatch) -> Result<Option<RecordBatch>, OpError> {
        project_batch(batch, &self.projection, self.wrapped).map(Some)
    }
}
