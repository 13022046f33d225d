//! Mapping between `Type` and Arrow.
//!
//! * `Struct` is an Arrow struct, one child per field.
//! * `Union` is an Arrow struct with one nullable child per branch plus a
//!   non-null Utf8 `field_selected` child naming the branch each row takes.
//! * `Optional` is nullability of its inner type.
//! * `Enum` is stored as Utf8 names, `Id` as Int64 or Utf8 by base.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StructArray};
use arrow::datatypes::{DataType, Field, Fields, Schema as ArrowSchema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use specgraph_core::prelude::{
    DatetimeBase, Error, FloatBase, IdBase, IntegerBase, Type, TypeKind, FIELD_SELECTED,
};

use crate::traits::OpError;

const LIST_ITEM: &str = "item";

/// Arrow type and nullability of `ty`.
pub fn to_arrow_type(ty: &Type) -> Result<(DataType, bool), OpError> {
    let out = match &ty.kind {
        TypeKind::Null | TypeKind::Unit => (DataType::Null, true),
        TypeKind::Boolean => (DataType::Boolean, false),
        TypeKind::Id { base, .. } => match base {
            IdBase::Int64 => (DataType::Int64, false),
            IdBase::String => (DataType::Utf8, false),
        },
        TypeKind::Integer { base, .. } => {
            let dt = match base {
                IntegerBase::Int8 => DataType::Int8,
                IntegerBase::Int16 => DataType::Int16,
                IntegerBase::Int32 => DataType::Int32,
                IntegerBase::Int64 => DataType::Int64,
            };
            (dt, false)
        }
        TypeKind::Enum { .. } | TypeKind::Text { .. } => (DataType::Utf8, false),
        TypeKind::Float { base, .. } => match base {
            FloatBase::Float32 => (DataType::Float32, false),
            FloatBase::Float64 => (DataType::Float64, false),
        },
        TypeKind::Bytes => (DataType::Binary, false),
        TypeKind::Struct { fields } => (DataType::Struct(to_arrow_fields(fields)?), false),
        TypeKind::Union { fields } => (DataType::Struct(union_fields(fields)?), false),
        TypeKind::Optional { inner } => (to_arrow_type(inner)?.0, true),
        TypeKind::List { inner, .. } => {
            let (dt, nullable) = to_arrow_type(inner)?;
            (
                DataType::List(Arc::new(Field::new(LIST_ITEM, dt, nullable))),
                false,
            )
        }
        TypeKind::Array { inner, shape } => {
            let (dt, nullable) = to_arrow_type(inner)?;
            let len: u64 = shape.iter().product();
            let len = i32::try_from(len)
                .map_err(|_| Error::Schema(format!("array shape {shape:?} is too large")))?;
            (
                DataType::FixedSizeList(Arc::new(Field::new(LIST_ITEM, dt, nullable)), len),
                false,
            )
        }
        TypeKind::Datetime { base, .. } => match base {
            DatetimeBase::Timestamp => (DataType::Timestamp(TimeUnit::Microsecond, None), false),
            DatetimeBase::Date => (DataType::Date32, false),
            DatetimeBase::Text => (DataType::Utf8, false),
        },
        TypeKind::Constrained { inner, .. } => to_arrow_type(inner)?,
        TypeKind::Hypothesis { .. } => match ty.best_hypothesis() {
            Some(best) => to_arrow_type(best)?,
            None => (DataType::Null, true),
        },
    };
    Ok(out)
}

pub fn to_arrow_field(name: &str, ty: &Type) -> Result<Field, OpError> {
    let (dt, nullable) = to_arrow_type(ty)?;
    Ok(Field::new(name, dt, nullable))
}

fn to_arrow_fields(fields: &[(String, Type)]) -> Result<Fields, OpError> {
    let fields = fields
        .iter()
        .map(|(name, ty)| to_arrow_field(name, ty))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Fields::from(fields))
}

fn union_fields(fields: &[(String, Type)]) -> Result<Fields, OpError> {
    let mut out = Vec::with_capacity(fields.len() + 1);
    for (name, ty) in fields {
        out.push(to_arrow_field(name, ty)?.with_nullable(true));
    }
    out.push(Field::new(FIELD_SELECTED, DataType::Utf8, false));
    Ok(Fields::from(out))
}

/// Arrow schema of a record batch holding values of `ty`. Only `Struct`
/// and `Union` types describe record batches.
pub fn to_arrow_schema(ty: &Type) -> Result<SchemaRef, OpError> {
    let fields = match &ty.kind {
        TypeKind::Struct { fields } => to_arrow_fields(fields)?,
        TypeKind::Union { fields } => union_fields(fields)?,
        TypeKind::Constrained { inner, .. } => return to_arrow_schema(inner),
        _ => {
            return Err(Error::Schema(format!(
                "a {} type does not describe a record batch",
                ty.kind_name()
            ))
            .into())
        }
    };
    Ok(Arc::new(ArrowSchema::new(fields)))
}

/// Infer a `Type` from an Arrow data type; nullable fields become `Optional`.
pub fn type_from_arrow(dt: &DataType, nullable: bool) -> Result<Type, OpError> {
    let base = match dt {
        DataType::Null => return Ok(Type::null()),
        DataType::Boolean => Type::boolean(),
        DataType::Int8 => integer(i8::MIN as i64, i8::MAX as i64, IntegerBase::Int8),
        DataType::Int16 => integer(i16::MIN as i64, i16::MAX as i64, IntegerBase::Int16),
        DataType::Int32 => integer(i32::MIN as i64, i32::MAX as i64, IntegerBase::Int32),
        DataType::Int64 => integer(i64::MIN, i64::MAX, IntegerBase::Int64),
        DataType::UInt8 => integer(0, u8::MAX as i64, IntegerBase::Int16),
        DataType::UInt16 => integer(0, u16::MAX as i64, IntegerBase::Int32),
        DataType::UInt32 => integer(0, u32::MAX as i64, IntegerBase::Int64),
        DataType::UInt64 => integer(0, i64::MAX, IntegerBase::Int64),
        DataType::Float16 | DataType::Float32 => Type::from_kind(TypeKind::Float {
            min: f32::MIN as f64,
            max: f32::MAX as f64,
            base: FloatBase::Float32,
        }),
        DataType::Float64 => Type::float(f64::MIN, f64::MAX),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Type::text(),
        DataType::Binary | DataType::LargeBinary | DataType::BinaryView => Type::bytes(),
        DataType::Date32 | DataType::Date64 => Type::datetime(
            "%Y-%m-%d",
            "0001-01-01",
            "9999-12-31",
            DatetimeBase::Date,
        ),
        DataType::Timestamp(_, _) => Type::datetime(
            "%Y-%m-%d %H:%M:%S",
            "0001-01-01 00:00:00",
            "9999-12-31 23:59:59",
            DatetimeBase::Timestamp,
        ),
        DataType::Struct(fields) => {
            let is_union = fields
                .iter()
                .any(|f| f.name() == FIELD_SELECTED && f.data_type() == &DataType::Utf8);
            let mut children = Vec::with_capacity(fields.len());
            for f in fields.iter() {
                if is_union && f.name() == FIELD_SELECTED {
                    continue;
                }
                // Union branches are nullable in Arrow without being optional.
                let nullable = !is_union && f.is_nullable();
                children.push((f.name().clone(), type_from_arrow(f.data_type(), nullable)?));
            }
            if is_union {
                Type::union(children)
            } else {
                Type::structure(children)
            }
        }
        DataType::List(item) | DataType::LargeList(item) => Type::list(
            type_from_arrow(item.data_type(), item.is_nullable())?,
            u64::MAX,
        ),
        DataType::FixedSizeList(item, len) => Type::array(
            type_from_arrow(item.data_type(), item.is_nullable())?,
            vec![*len as u64],
        ),
        other => {
            return Err(Error::Unsupported(format!("arrow type {other}")).into());
        }
    };
    Ok(if nullable { Type::optional(base) } else { base })
}

fn integer(min: i64, max: i64, base: IntegerBase) -> Type {
    Type::from_kind(TypeKind::Integer { min, max, base })
}

/// Infer a `Type` from a column, using the nulls actually present (rather
/// than the declared nullability) to decide `Optional`.
pub fn type_from_array(array: &ArrayRef) -> Result<Type, OpError> {
    let nullable = array.null_count() > 0;
    if let Some(s) = array.as_any().downcast_ref::<StructArray>() {
        let is_union = s.column_by_name(FIELD_SELECTED).is_some();
        let mut children = Vec::new();
        for (field, column) in s.fields().iter().zip(s.columns()) {
            if is_union && field.name() == FIELD_SELECTED {
                continue;
            }
            let child = if is_union {
                type_from_arrow(field.data_type(), false)?
            } else {
                type_from_array(column)?
            };
            children.push((field.name().clone(), child));
        }
        let base = if is_union {
            Type::union(children)
        } else {
            Type::structure(children)
        };
        return Ok(if nullable { Type::optional(base) } else { base });
    }
    type_from_arrow(array.data_type(), nullable)
}

/// Struct type of a record batch, inferred from its columns.
pub fn type_from_batch(batch: &RecordBatch) -> Result<Type, OpError> {
    let mut fields = Vec::with_capacity(batch.num_columns());
    for (field, column) in batch.schema().fields().iter().zip(batch.columns()) {
        fields.push((field.name().clone(), type_from_array(column)?));
    }
    Ok(Type::structure(fields))
}

/// Check that `batch` has the shape of `ty` (names and Arrow types).
pub fn check_batch(batch: &RecordBatch, ty: &Type) -> Result<(), OpError> {
    let expected = to_arrow_schema(ty)?;
    let actual = batch.schema();
    if expected.fields().len() != actual.fields().len() {
        return Err(Error::Schema(format!(
            "expected {} columns, batch has {}",
            expected.fields().len(),
            actual.fields().len()
        ))
        .into());
    }
    for (e, a) in expected.fields().iter().zip(actual.fields()) {
        if e.name() != a.name() || !types_compatible(e.data_type(), a.data_type()) {
            return Err(Error::Schema(format!(
                "column '{}' ({}) does not match declared '{}' ({})",
                a.name(),
                a.data_type(),
                e.name(),
                e.data_type()
            ))
            .into());
        }
        if !e.is_nullable() && a.is_nullable() {
            let column = batch.column_by_name(a.name());
            if column.map(|c| c.null_count() > 0).unwrap_or(false) {
                return Err(Error::Schema(format!("column '{}' has unexpected nulls", a.name())).into());
            }
        }
    }
    Ok(())
}

fn types_compatible(expected: &DataType, actual: &DataType) -> bool {
    match (expected, actual) {
        (DataType::Struct(e), DataType::Struct(a)) => {
            e.len() == a.len()
                && e.iter()
                    .zip(a.iter())
                    .all(|(x, y)| x.name() == y.name() && types_compatible(x.data_type(), y.data_type()))
        }
        (DataType::List(e), DataType::List(a)) => types_compatible(e.data_type(), a.data_type()),
        (DataType::Null, _) => true,
        (e, a) => e == a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_gets_a_selector_column() {
        let ty = Type::union([("a", Type::integer(0, 1)), ("b", Type::text())]);
        let schema = to_arrow_schema(&ty).unwrap();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["a", "b", FIELD_SELECTED]);
        assert!(schema.field(0).is_nullable());
        assert!(!schema.field(2).is_nullable());
    }

    #[test]
    fn optional_maps_to_nullable() {
        let ty = Type::structure([("x", Type::optional(Type::float(0.0, 1.0)))]);
        let schema = to_arrow_schema(&ty).unwrap();
        assert_eq!(schema.field(0).data_type(), &DataType::Float64);
        assert!(schema.field(0).is_nullable());
    }

    #[test]
    fn leaf_types_do_not_describe_batches() {
        assert!(to_arrow_schema(&Type::text()).is_err());
    }

    #[test]
    fn arrow_types_map_back() {
        let dt = DataType::Struct(Fields::from(vec![
            Field::new("n", DataType::Int32, true),
            Field::new("s", DataType::Utf8, false),
        ]));
        let ty = type_from_arrow(&dt, false).unwrap();
        assert_eq!(ty.children()[0].1.kind_name(), "optional");
        assert_eq!(ty.children()[1].1, Type::text());
    }
}
