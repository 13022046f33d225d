//! Dataset schemas: a `Type` plus bookkeeping. Pure data; no Arrow dependency here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::fks;
use crate::path::Path;
use crate::types::{Type, TypeKind, DATA};

/// Property holding the JSON list of primary-key paths.
pub const PRIMARY_KEYS: &str = "primary_keys";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protected_paths: Vec<Path>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Schema {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            protected_paths: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Wrap `payload` under a `data` field next to `siblings` and mark the
    /// payload as protected.
    pub fn protected(
        name: impl Into<String>,
        payload: Type,
        siblings: Vec<(String, Type)>,
    ) -> Self {
        let mut fields = vec![(DATA.to_string(), payload)];
        fields.extend(siblings);
        Self {
            name: name.into(),
            ty: Type::structure(fields),
            protected_paths: vec![Path::from_labels([DATA])],
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// True when the payload lives under a synthetic top-level `data` field.
    pub fn has_data_wrapper(&self) -> bool {
        !self.protected_paths.is_empty() && self.ty.is_struct() && self.ty.child(DATA).is_some()
    }

    /// The payload type, looking through the `data` wrapper if present.
    pub fn data_type(&self) -> &Type {
        if self.has_data_wrapper() {
            if let Some(t) = self.ty.child(DATA) {
                return t;
            }
        }
        &self.ty
    }

    /// Replace the payload, keeping wrapper siblings in place and in order.
    pub fn rewrap(&self, payload: Type) -> Type {
        if !self.has_data_wrapper() {
            return payload;
        }
        let fields = self
            .ty
            .children()
            .iter()
            .map(|(name, t)| {
                if name == DATA {
                    (name.clone(), payload.clone())
                } else {
                    (name.clone(), t.clone())
                }
            })
            .collect::<Vec<_>>();
        self.ty.rebuilt(TypeKind::Struct { fields })
    }

    pub fn primary_keys(&self) -> Result<Vec<Path>> {
        match self.properties.get(PRIMARY_KEYS) {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| Error::Schema(format!("bad {PRIMARY_KEYS} property: {e}"))),
        }
    }

    pub fn with_primary_keys(mut self, keys: &[Path]) -> Result<Self> {
        let raw = serde_json::to_string(keys).map_err(|e| Error::Schema(e.to_string()))?;
        self.properties.insert(PRIMARY_KEYS.to_string(), raw);
        Ok(self)
    }

    /// Keep only the primary keys that still resolve in `ty`.
    pub(crate) fn retain_primary_keys(&mut self, ty: &Type) -> Result<()> {
        if !self.properties.contains_key(PRIMARY_KEYS) {
            return Ok(());
        }
        let kept: Vec<Path> = self
            .primary_keys()?
            .into_iter()
            .filter(|p| ty.has_path(p))
            .collect();
        let raw = serde_json::to_string(&kept).map_err(|e| Error::Schema(e.to_string()))?;
        self.properties.insert(PRIMARY_KEYS.to_string(), raw);
        Ok(())
    }

    pub fn foreign_keys(&self) -> Vec<(Path, Path)> {
        fks::foreign_keys(&self.ty)
    }

    /// Paths to the tables of the payload: first-level structs, or the
    /// payload itself when it is a struct.
    pub fn tables(&self) -> Vec<Path> {
        let base = if self.has_data_wrapper() {
            Path::from_labels([DATA])
        } else {
            Path::root()
        };
        match self.data_type().structs() {
            Some(paths) if !paths.is_empty() => paths
                .iter()
                .flat_map(|p| p.branches())
                .map(|branch| join(&base, branch))
                .collect(),
            _ => vec![base],
        }
    }

    /// Derive a child schema with a new type, keeping protected paths and
    /// only the properties (primary keys) that still make sense.
    pub fn derive(&self, name: impl Into<String>, ty: Type) -> Result<Self> {
        let mut out = Self {
            name: name.into(),
            ty,
            protected_paths: self.protected_paths.clone(),
            properties: self.properties.clone(),
        };
        let ty = out.ty.clone();
        out.retain_primary_keys(&ty)?;
        out.protected_paths.retain(|p| ty.has_path(p));
        Ok(out)
    }
}

fn join(base: &Path, tail: Vec<String>) -> Path {
    let mut labels = base.branches().into_iter().next().unwrap_or_default();
    labels.extend(tail);
    Path::from_labels(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IdBase;

    fn users() -> Type {
        Type::structure([
            ("id", Type::id(true, IdBase::Int64, None)),
            ("name", Type::text()),
        ])
    }

    #[test]
    fn data_wrapper_detection() {
        let plain = Schema::new("users", users());
        assert!(!plain.has_data_wrapper());
        assert_eq!(plain.data_type(), &users());

        let wrapped = Schema::protected("users", users(), vec![("weight".into(), Type::float(0.0, 1.0))]);
        assert!(wrapped.has_data_wrapper());
        assert_eq!(wrapped.data_type(), &users());
    }

    #[test]
    fn rewrap_preserves_sibling_order() {
        let wrapped = Schema::protected("users", users(), vec![("weight".into(), Type::float(0.0, 1.0))]);
        let t = wrapped.rewrap(Type::structure([("name", Type::text())]));
        let names: Vec<&str> = t.children().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["data", "weight"]);
    }

    #[test]
    fn primary_keys_are_filtered_on_derive() {
        let s = Schema::new("users", users())
            .with_primary_keys(&[Path::from_labels(["id"])])
            .unwrap();
        assert_eq!(s.primary_keys().unwrap(), vec![Path::from_labels(["id"])]);
        let child = s
            .derive("names", Type::structure([("name", Type::text())]))
            .unwrap();
        assert!(child.primary_keys().unwrap().is_empty());
    }

    #[test]
    fn tables_of_a_plain_struct() {
        let s = Schema::new("users", users());
        assert_eq!(s.tables(), vec![Path::root()]);
    }
}
