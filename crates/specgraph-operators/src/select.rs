//! Row selection driven by a target `Type`.
//!
//! A row is kept when its value belongs to the target type: every struct
//! field matches, the active union branch is one the target keeps and
//! matches it, numbers fall in the inclusive bounds, enum names are listed.
//! Null values always match (they are only present under `Optional` or in
//! inactive union branches).

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, StringArray, StructArray};
use arrow::compute::kernels::boolean::{and, or};
use arrow::compute::{cast, is_null};
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use specgraph_core::prelude::{DatetimeBase, Error, Type, TypeKind, FIELD_SELECTED};

use crate::traits::OpError;

fn all_true(len: usize) -> BooleanArray {
    BooleanArray::from(vec![true; len])
}

fn as_struct<'a>(array: &'a ArrayRef, ty: &Type) -> Result<&'a StructArray, OpError> {
    array.as_any().downcast_ref::<StructArray>().ok_or_else(|| {
        Error::Schema(format!(
            "expected a struct array for {}, got {}",
            ty.kind_name(),
            array.data_type()
        ))
        .into()
    })
}

fn column<'a>(s: &'a StructArray, name: &str) -> Result<&'a ArrayRef, OpError> {
    s.column_by_name(name)
        .ok_or_else(|| Error::Schema(format!("missing column '{name}'")).into())
}

/// Mask of the rows of `array` that belong to `ty`.
pub fn select_rows(ty: &Type, array: &ArrayRef) -> Result<BooleanArray, OpError> {
    let len = array.len();
    match &ty.kind {
        TypeKind::Struct { fields } => {
            let s = as_struct(array, ty)?;
            let mut mask = all_true(len);
            for (name, field_ty) in fields {
                let sub = select_rows(field_ty, column(s, name)?)?;
                mask = and(&mask, &sub)?;
            }
            Ok(mask)
        }
        TypeKind::Union { fields } => {
            let s = as_struct(array, ty)?;
            let selected = column(s, FIELD_SELECTED)?;
            let selected = selected
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| Error::Schema(format!("'{FIELD_SELECTED}' must be utf8")))?;
            let mut branch_masks = Vec::with_capacity(fields.len());
            for (name, branch_ty) in fields {
                branch_masks.push((name.as_str(), select_rows(branch_ty, column(s, name)?)?));
            }
            let keep: Vec<bool> = (0..len)
                .map(|i| {
                    if selected.is_null(i) {
                        return false;
                    }
                    let branch = selected.value(i);
                    branch_masks
                        .iter()
                        .find(|(name, _)| *name == branch)
                        .map(|(_, m)| m.value(i))
                        .unwrap_or(false)
                })
                .collect();
            Ok(BooleanArray::from(keep))
        }
        TypeKind::Optional { inner } => {
            let inner_mask = select_rows(inner, array)?;
            Ok(or(&inner_mask, &is_null(array.as_ref())?)?)
        }
        TypeKind::Constrained { inner, .. } => select_rows(inner, array),
        TypeKind::Hypothesis { .. } => match ty.best_hypothesis() {
            Some(best) => select_rows(best, array),
            None => Ok(all_true(len)),
        },
        TypeKind::Integer { min, max, .. } => {
            let values = cast(array, &DataType::Int64)?;
            let values = values.as_primitive::<Int64Type>();
            Ok(values
                .iter()
                .map(|v| Some(v.map(|v| *min <= v && v <= *max).unwrap_or(true)))
                .collect())
        }
        TypeKind::Float { min, max, .. } => {
            let values = cast(array, &DataType::Float64)?;
            let values = values.as_primitive::<Float64Type>();
            Ok(values
                .iter()
                .map(|v| Some(v.map(|v| *min <= v && v <= *max).unwrap_or(true)))
                .collect())
        }
        TypeKind::Enum { name_values, .. } => {
            let names: HashSet<&str> = name_values.iter().map(|(n, _)| n.as_str()).collect();
            let values = cast(array, &DataType::Utf8)?;
            let values = values.as_string::<i32>();
            Ok(values
                .iter()
                .map(|v| Some(v.map(|v| names.contains(v)).unwrap_or(true)))
                .collect())
        }
        TypeKind::Datetime { min, max, base, .. } if *base != DatetimeBase::Timestamp => {
            let values = cast(array, &DataType::Utf8)?;
            let values = values.as_string::<i32>();
            Ok(values
                .iter()
                .map(|v| {
                    Some(
                        v.map(|v| min.as_str() <= v && v <= max.as_str())
                            .unwrap_or(true),
                    )
                })
                .collect())
        }
        _ => Ok(all_true(len)),
    }
}

/// Convenience: selection over the columns of a whole record batch.
pub fn select_batch_rows(ty: &Type, batch: &arrow::record_batch::RecordBatch) -> Result<BooleanArray, OpError> {
    let array: ArrayRef = Arc::new(StructArray::from(batch.clone()));
    select_rows(ty, &array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array};
    use arrow::datatypes::{Field, Fields};

    fn struct_of(columns: Vec<(&str, ArrayRef)>) -> ArrayRef {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(n, a)| Field::new(*n, a.data_type().clone(), true))
            .collect();
        let arrays = columns.into_iter().map(|(_, a)| a).collect();
        Arc::new(StructArray::new(Fields::from(fields), arrays, None))
    }

    #[test]
    fn integer_bounds_are_inclusive() {
        let array: ArrayRef = Arc::new(Int64Array::from(vec![0, 5, 10, 11]));
        let mask = select_rows(&Type::integer(0, 10), &array).unwrap();
        assert_eq!(mask, BooleanArray::from(vec![true, true, true, false]));
    }

    #[test]
    fn struct_is_conjunction_and_optional_keeps_nulls() {
        let a: ArrayRef = Arc::new(Int64Array::from(vec![1, 50, 2]));
        let b: ArrayRef = Arc::new(Float64Array::from(vec![Some(0.5), Some(0.1), None]));
        let array = struct_of(vec![("a", a), ("b", b)]);
        let ty = Type::structure([
            ("a", Type::integer(0, 10)),
            ("b", Type::optional(Type::float(0.0, 0.4))),
        ]);
        let mask = select_rows(&ty, &array).unwrap();
        assert_eq!(mask, BooleanArray::from(vec![false, false, true]));
    }

    #[test]
    fn union_rows_follow_their_branch() {
        let x: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), None, Some(3)]));
        let y: ArrayRef = Arc::new(StringArray::from(vec![None, Some("k"), None]));
        let sel: ArrayRef = Arc::new(StringArray::from(vec!["x", "y", "x"]));
        let array = struct_of(vec![("x", x), ("y", y), (FIELD_SELECTED, sel)]);

        let only_x = Type::union([("x", Type::integer(0, 2))]);
        let mask = select_rows(&only_x, &array).unwrap();
        assert_eq!(mask, BooleanArray::from(vec![true, false, false]));
    }
}
