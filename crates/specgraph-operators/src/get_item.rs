//! `get_item`: extract the value addressed by a path.

use std::sync::Arc;

use arrow::array::{make_array, Array, ArrayRef, StructArray};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use specgraph_core::prelude::{Error, Path, Type, TypeKind, ARRAY_VALUES, DATA, LIST_VALUES, OPTIONAL_VALUE};

use crate::traits::{BatchOperator, OpError};

/// Peel one nesting level of `array` per label, following `ty`.
///
/// `Struct` and `Union` steps pick the named child, carrying the parent's
/// nulls down; `Optional` and `Constrained` steps unwrap the type and keep
/// the array.
pub fn descend(ty: &Type, array: &ArrayRef, labels: &[String]) -> Result<(Type, ArrayRef), OpError> {
    let Some((label, rest)) = labels.split_first() else {
        return Ok((ty.clone(), array.clone()));
    };
    match &ty.kind {
        TypeKind::Struct { .. } | TypeKind::Union { .. } => {
            let child_ty = ty.child(label).ok_or_else(|| Error::PathNotFound {
                path: labels.join("."),
                label: label.clone(),
            })?;
            let s = array.as_any().downcast_ref::<StructArray>().ok_or_else(|| {
                Error::Schema(format!("expected a struct array, got {}", array.data_type()))
            })?;
            let child = s
                .column_by_name(label)
                .ok_or_else(|| Error::Schema(format!("missing column '{label}'")))?;
            let child = match s.nulls() {
                Some(_) => {
                    let nulls = NullBuffer::union(s.nulls(), child.nulls());
                    make_array(child.to_data().into_builder().nulls(nulls).build()?)
                }
                None => child.clone(),
            };
            descend(child_ty, &child, rest)
        }
        TypeKind::Optional { inner } | TypeKind::Constrained { inner, .. } => {
            descend(inner, array, rest)
        }
        TypeKind::List { .. } | TypeKind::Array { .. } => Err(Error::Unsupported(format!(
            "get_item through a {} at '{label}'",
            ty.kind_name()
        ))
        .into()),
        _ => Err(Error::PathNotFound {
            path: labels.join("."),
            label: label.clone(),
        }
        .into()),
    }
}

/// Whether the item at `labels` may hold nulls, judged from `ty` alone.
///
/// Optional steps and union branches make everything below them nullable.
pub fn item_nullable(ty: &Type, labels: &[String]) -> bool {
    let Some((label, rest)) = labels.split_first() else {
        return matches!(ty.kind, TypeKind::Optional { .. } | TypeKind::Null | TypeKind::Unit);
    };
    match &ty.kind {
        TypeKind::Optional { .. } => true,
        TypeKind::Union { .. } => true,
        TypeKind::Struct { .. } => ty.child(label).map_or(false, |c| item_nullable(c, rest)),
        TypeKind::Constrained { inner, .. } => item_nullable(inner, rest),
        _ => false,
    }
}

/// Column name for an item: the last field label, skipping wrapper steps.
fn item_name(labels: &[String]) -> String {
    labels
        .iter()
        .rev()
        .find(|l| ![OPTIONAL_VALUE, LIST_VALUES, ARRAY_VALUES].contains(&l.as_str()))
        .cloned()
        .unwrap_or_else(|| DATA.to_string())
}

pub struct GetItem {
    pub path: Path,
    /// Payload type of the parent (below the `data` wrapper, if any).
    pub parent: Type,
    pub wrapped: bool,
}

impl GetItem {
    fn content(&self, array: &ArrayRef) -> Result<RecordBatch, OpError> {
        let labels = self.path.labels()?;
        let (ty, value) = descend(&self.parent, array, &labels)?;
        let nullable = item_nullable(&self.parent, &labels);
        if ty.is_struct() && !nullable {
            if let Some(s) = value.as_any().downcast_ref::<StructArray>() {
                return Ok(RecordBatch::from(s));
            }
        }
        let field = Field::new(item_name(&labels), value.data_type().clone(), nullable);
        Ok(RecordBatch::try_new(Arc::new(Schema::new(vec![field])), vec![value])?)
    }
}

impl BatchOperator for GetItem {
    fn name(&self) -> &'static str {
        "get_item"
    }

    fn eval_batch(&self, batch: &RecordBatch) -> Result<Option<RecordBatch>, OpError> {
        if !self.wrapped {
            let array: ArrayRef = Arc::new(StructArray::from(batch.clone()));
            return self.content(&array).map(Some);
        }

        let schema = batch.schema();
        let idx = schema
            .index_of(DATA)
            .map_err(|_| Error::Schema(format!("missing '{DATA}' column")))?;
        let labels = self.path.labels()?;
        let (_, data) = descend(&self.parent, batch.column(idx), &labels)?;

        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        fields[idx] = Field::new(DATA, data.data_type().clone(), item_nullable(&self.parent, &labels));
        let mut columns = batch.columns().to_vec();
        columns[idx] = data;
        Ok(Some(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?))
    }
}
