//! Schema Propagation Engine.
//!
//! Computes the schema of a transformed dataset from its parent's schema
//! without touching data, except for `select_sql` and external ops whose
//! result types can only be inferred from the rows they produce.

use arrow::record_batch::RecordBatch;
use specgraph_core::prelude::*;
use specgraph_operators::convert::type_from_batch;
use specgraph_operators::OpError;

/// Outcome of propagating a schema through one transform.
#[derive(Debug, Clone, PartialEq)]
pub enum Propagation {
    Ready(Schema),
    /// The type is inferred from the rows `query` returns.
    FromSql { query: String },
    /// The type is inferred from the external op's output.
    FromExternal,
}

/// Schema of a dataset called `name` produced by `transform` from a parent
/// with schema `parent`.
pub fn propagate(name: &str, parent: &Schema, transform: &Transform) -> Result<Propagation> {
    let schema = match &transform.spec {
        TransformKind::Filter { filter: target } | TransformKind::Project { projection: target } => {
            let candidate = parent.rewrap(target.clone());
            let ty = update_fks(&candidate, &parent.ty);
            parent.derive(name, ty)?
        }
        TransformKind::GetItem { path } => {
            let subs = parent.data_type().sub_types(path)?;
            let [item] = subs.as_slice() else {
                return Err(Error::Invariant(format!(
                    "get_item path {path} addresses {} types, expected exactly one",
                    subs.len()
                )));
            };
            let ty = parent.rewrap((*item).clone());
            parent.derive(name, ty)?
        }
        TransformKind::Shuffle
        | TransformKind::Sample { .. }
        | TransformKind::DifferentiatedSample { .. }
        | TransformKind::Slice { .. }
        | TransformKind::Extract { .. } => Schema {
            name: name.to_string(),
            ..parent.clone()
        },
        TransformKind::SelectSql { query } => {
            return Ok(Propagation::FromSql {
                query: query.clone(),
            })
        }
        TransformKind::External { .. } => return Ok(Propagation::FromExternal),
        TransformKind::Composed { .. } | TransformKind::Variable { .. } => {
            return Err(Error::Unsupported(transform.spec_name().to_string()))
        }
    };
    Ok(Propagation::Ready(schema))
}

/// Schema of `id` computed from declared source schemas alone.
///
/// Fails with `Unsupported` when some node on the way needs data
/// (`select_sql`, external ops).
pub fn static_schema(graph: &Graph, id: &DataSpecId) -> Result<Schema> {
    let spec = graph.get(id)?;
    match &spec.origin {
        Origin::Source { schema, .. } => Ok(schema.clone()),
        Origin::Value { .. } => Err(Error::Invariant(format!(
            "'{}' is a scalar and has no schema",
            spec.name
        ))),
        Origin::Transformed {
            transform,
            arguments,
            ..
        } => {
            let parent = match arguments.as_slice() {
                [parent] => static_schema(graph, parent)?,
                _ if transform.is_external() => {
                    return Err(Error::Unsupported(format!(
                        "static schema of external op '{}'",
                        transform.name
                    )))
                }
                _ => {
                    return Err(Error::Invariant(format!(
                        "'{}' has {} parents, expected one",
                        spec.name,
                        arguments.len()
                    )))
                }
            };
            match propagate(&spec.name, &parent, transform)? {
                Propagation::Ready(schema) => Ok(schema),
                Propagation::FromSql { .. } | Propagation::FromExternal => Err(Error::Unsupported(
                    format!("static schema of {} '{}'", transform.spec_name(), spec.name),
                )),
            }
        }
    }
}

/// Schema inferred from a result table. A result without rows cannot be typed.
pub fn schema_from_table(name: &str, table: Option<&RecordBatch>) -> std::result::Result<Schema, OpError> {
    match table {
        Some(t) if t.num_rows() > 0 => Ok(Schema::new(name, type_from_batch(t)?)),
        _ => Err(Error::EmptyResult(format!("cannot infer the schema of '{name}' from zero rows")).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(labels: &[&str]) -> Type {
        Type::id(false, IdBase::Int64, Some(Path::from_labels(labels.iter().copied())))
    }

    fn parent() -> Schema {
        Schema::new(
            "orders",
            Type::structure([
                ("key", Type::id(true, IdBase::Int64, None)),
                ("customer", fk(&["key"])),
                ("amount", Type::float(0.0, 1000.0)),
            ]),
        )
        .with_primary_keys(&[Path::from_labels(["key"])])
        .unwrap()
    }

    fn ready(p: Propagation) -> Schema {
        match p {
            Propagation::Ready(s) => s,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn project_strips_dangling_fks_and_keys() {
        let target = Type::structure([("customer", fk(&["key"])), ("amount", Type::float(0.0, 1000.0))]);
        let s = ready(propagate("p", &parent(), &Transform::project(target)).unwrap());
        assert!(s.foreign_keys().is_empty());
        assert!(s.primary_keys().unwrap().is_empty());
    }

    #[test]
    fn filter_keeps_consistent_fks() {
        let target = parent().ty.clone();
        let s = ready(propagate("f", &parent(), &Transform::filter(target.clone())).unwrap());
        assert_eq!(s.ty, target);
        assert_eq!(s.primary_keys().unwrap(), vec![Path::from_labels(["key"])]);
    }

    #[test]
    fn get_item_needs_a_single_type() {
        let branching = Path::with_sub_paths("", vec![Path::new("key"), Path::new("amount")]);
        let err = propagate("g", &parent(), &Transform::get_item(branching)).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));

        let s = ready(propagate("g", &parent(), &Transform::get_item(Path::from_labels(["amount"]))).unwrap());
        assert_eq!(s.ty, Type::float(0.0, 1000.0));
    }

    #[test]
    fn row_transforms_copy_the_schema() {
        for t in [
            Transform::shuffle(),
            Transform::slice(0, 3),
            Transform::extract(3, None),
            Transform::sample(SampleSize::Size(2)),
            Transform::differentiated_sample(SampleSize::Fraction(0.5)),
        ] {
            let s = ready(propagate("x", &parent(), &t).unwrap());
            assert_eq!(s.ty, parent().ty);
            assert_eq!(s.properties, parent().properties);
        }
    }

    #[test]
    fn variables_are_not_propagated() {
        let err = propagate("v", &parent(), &Transform::variable(Position::Index(0))).unwrap_err();
        assert!(matches!(err, Error::Unsupported(k) if k == "variable"));
    }

    #[test]
    fn zero_rows_cannot_be_typed() {
        assert!(schema_from_table("empty", None).is_err());
    }
}
