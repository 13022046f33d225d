//! Foreign-key bookkeeping on types.
//!
//! A foreign key is an `Id` whose `reference` points at another position of
//! the same schema. Row- and column-removing transforms can leave such
//! references dangling; [`update_fks`] downgrades those to plain ids.

use crate::path::Path;
use crate::types::{IdBase, Type, TypeKind, TypeVisitor};

struct FkUpdater<'a> {
    original: &'a Type,
    candidate: &'a Type,
}

impl FkUpdater<'_> {
    fn rebuild_fields(&self, fields: &[(String, Type)]) -> Vec<(String, Type)> {
        fields
            .iter()
            .map(|(name, ty)| (name.clone(), ty.accept(self)))
            .collect()
    }
}

impl TypeVisitor for FkUpdater<'_> {
    type Output = Type;

    fn default(&self, ty: &Type) -> Type {
        ty.clone()
    }

    fn id(&self, ty: &Type, unique: bool, base: IdBase, reference: Option<&Path>) -> Type {
        match reference {
            Some(r) if self.original.has_path(r) && self.candidate.has_path(r) => ty.clone(),
            Some(_) => ty.rebuilt(TypeKind::Id {
                unique,
                base,
                reference: None,
            }),
            None => ty.clone(),
        }
    }

    fn structure(&self, ty: &Type, fields: &[(String, Type)]) -> Type {
        ty.rebuilt(TypeKind::Struct {
            fields: self.rebuild_fields(fields),
        })
    }

    fn union(&self, ty: &Type, fields: &[(String, Type)]) -> Type {
        ty.rebuilt(TypeKind::Union {
            fields: self.rebuild_fields(fields),
        })
    }

    fn optional(&self, ty: &Type, inner: &Type) -> Type {
        ty.rebuilt(TypeKind::Optional {
            inner: Box::new(inner.accept(self)),
        })
    }

    fn list(&self, ty: &Type, inner: &Type, max_size: u64) -> Type {
        ty.rebuilt(TypeKind::List {
            inner: Box::new(inner.accept(self)),
            max_size,
        })
    }

    fn array(&self, ty: &Type, inner: &Type, shape: &[u64]) -> Type {
        ty.rebuilt(TypeKind::Array {
            inner: Box::new(inner.accept(self)),
            shape: shape.to_vec(),
        })
    }

    fn constrained(&self, ty: &Type, inner: &Type, constraint: &str) -> Type {
        ty.rebuilt(TypeKind::Constrained {
            inner: Box::new(inner.accept(self)),
            constraint: constraint.to_string(),
        })
    }

    fn hypothesis(&self, ty: &Type, types: &[(Type, f64)]) -> Type {
        ty.rebuilt(TypeKind::Hypothesis {
            types: types.iter().map(|(t, s)| (t.accept(self), *s)).collect(),
        })
    }
}

/// Rebuild `candidate`, stripping every `Id.reference` that no longer
/// resolves in `original` or in `candidate` itself.
///
/// `unique`, `base`, names and properties are preserved. For a type whose
/// references all resolve, `update_fks(t, t) == t`.
pub fn update_fks(candidate: &Type, original: &Type) -> Type {
    candidate.accept(&FkUpdater {
        original,
        candidate,
    })
}

/// Every foreign key of `ty` as `(location, reference)`.
pub fn foreign_keys(ty: &Type) -> Vec<(Path, Path)> {
    let mut out = Vec::new();
    collect_fks(ty, &mut Vec::new(), &mut out);
    out
}

fn collect_fks(ty: &Type, at: &mut Vec<String>, out: &mut Vec<(Path, Path)>) {
    match &ty.kind {
        TypeKind::Id {
            reference: Some(r), ..
        } => out.push((Path::from_labels(at.iter().cloned()), r.clone())),
        TypeKind::Struct { fields } | TypeKind::Union { fields } => {
            for (name, child) in fields {
                at.push(name.clone());
                collect_fks(child, at, out);
                at.pop();
            }
        }
        TypeKind::Optional { inner } => descend(inner, crate::types::OPTIONAL_VALUE, at, out),
        TypeKind::List { inner, .. } => descend(inner, crate::types::LIST_VALUES, at, out),
        TypeKind::Array { inner, .. } => descend(inner, crate::types::ARRAY_VALUES, at, out),
        TypeKind::Constrained { inner, .. } => collect_fks(inner, at, out),
        _ => {}
    }
}

fn descend(inner: &Type, label: &str, at: &mut Vec<String>, out: &mut Vec<(Path, Path)>) {
    at.push(label.to_string());
    collect_fks(inner, at, out);
    at.pop();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(labels: &[&str]) -> Type {
        Type::id(false, IdBase::Int64, Some(Path::from_labels(labels.iter().copied())))
    }

    #[test]
    fn consistent_type_is_unchanged() {
        let t = Type::structure([
            ("key", Type::id(true, IdBase::Int64, None)),
            ("ref", fk(&["key"])),
        ]);
        assert_eq!(update_fks(&t, &t), t);
    }

    #[test]
    fn dangling_reference_is_stripped() {
        let t = Type::structure([("id", fk(&["other", "key"])), ("name", Type::text())]);
        let out = update_fks(&t, &t);
        assert_eq!(
            out,
            Type::structure([
                ("id", Type::id(false, IdBase::Int64, None)),
                ("name", Type::text())
            ])
        );
    }

    #[test]
    fn reference_removed_by_projection_is_stripped() {
        let original = Type::structure([
            ("key", Type::id(true, IdBase::String, None)),
            ("ref", fk(&["key"])),
        ]);
        let candidate = Type::structure([("ref", fk(&["key"]))]);
        let out = update_fks(&candidate, &original);
        assert!(foreign_keys(&out).is_empty());
    }

    #[test]
    fn foreign_keys_report_locations() {
        let t = Type::structure([
            ("key", Type::id(true, IdBase::Int64, None)),
            ("maybe", Type::optional(fk(&["key"]))),
        ]);
        let fks = foreign_keys(&t);
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].0.to_string(), "maybe.optional_value");
        assert_eq!(fks[0].1.to_string(), "key");
    }
}
