//! The recursive data type model.
//!
//! `Type` is a closed sum of variants describing the shape of a dataset.
//! Containers (`Struct`, `Union`, `Optional`, `List`, `Array`,
//! `Constrained`) hold subtypes; everything else is a leaf. Traversal goes
//! through [`TypeVisitor`], a pure recursive match returning a value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::hash::{hash_serde, Hash256};
use crate::path::Path;

/// Conventional step label through an `Optional`.
pub const OPTIONAL_VALUE: &str = "optional_value";
/// Conventional step label through a `List`.
pub const LIST_VALUES: &str = "list_values";
/// Conventional step label through an `Array`.
pub const ARRAY_VALUES: &str = "array_values";
/// Name of the Arrow child that records which union branch a row takes.
pub const FIELD_SELECTED: &str = "field_selected";
/// Field wrapping the real payload in protected-entity schemas.
pub const DATA: &str = "data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdBase {
    #[default]
    Int64,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntegerBase {
    Int8,
    Int16,
    Int32,
    #[default]
    Int64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FloatBase {
    Float32,
    #[default]
    Float64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatetimeBase {
    /// Microsecond timestamps.
    Timestamp,
    Date,
    /// ISO-formatted strings.
    #[default]
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Null,
    Unit,
    Boolean,
    Id {
        unique: bool,
        #[serde(default)]
        base: IdBase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<Path>,
    },
    Integer {
        min: i64,
        max: i64,
        #[serde(default)]
        base: IntegerBase,
    },
    Enum {
        name_values: Vec<(String, i64)>,
        #[serde(default)]
        ordered: bool,
    },
    Float {
        min: f64,
        max: f64,
        #[serde(default)]
        base: FloatBase,
    },
    Text {
        encoding: String,
    },
    Bytes,
    Struct {
        fields: Vec<(String, Type)>,
    },
    Union {
        fields: Vec<(String, Type)>,
    },
    Optional {
        inner: Box<Type>,
    },
    List {
        inner: Box<Type>,
        max_size: u64,
    },
    Array {
        inner: Box<Type>,
        shape: Vec<u64>,
    },
    Datetime {
        format: String,
        min: String,
        max: String,
        #[serde(default)]
        base: DatetimeBase,
    },
    Constrained {
        inner: Box<Type>,
        constraint: String,
    },
    Hypothesis {
        types: Vec<(Type, f64)>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Type {
    pub kind: TypeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// Per-variant dispatch over a `Type`.
///
/// Every method receives the whole `Type` (for `name` and `properties`)
/// plus the variant payload, and defaults to [`TypeVisitor::default`].
pub trait TypeVisitor {
    type Output;

    fn default(&self, ty: &Type) -> Self::Output;

    fn null(&self, ty: &Type) -> Self::Output {
        self.default(ty)
    }
    fn unit(&self, ty: &Type) -> Self::Output {
        self.default(ty)
    }
    fn boolean(&self, ty: &Type) -> Self::Output {
        self.default(ty)
    }
    fn id(
        &self,
        ty: &Type,
        _unique: bool,
        _base: IdBase,
        _reference: Option<&Path>,
    ) -> Self::Output {
        self.default(ty)
    }
    fn integer(&self, ty: &Type, _min: i64, _max: i64, _base: IntegerBase) -> Self::Output {
        self.default(ty)
    }
    fn enumeration(&self, ty: &Type, _name_values: &[(String, i64)], _ordered: bool) -> Self::Output {
        self.default(ty)
    }
    fn float(&self, ty: &Type, _min: f64, _max: f64, _base: FloatBase) -> Self::Output {
        self.default(ty)
    }
    fn text(&self, ty: &Type, _encoding: &str) -> Self::Output {
        self.default(ty)
    }
    fn bytes(&self, ty: &Type) -> Self::Output {
        self.default(ty)
    }
    fn structure(&self, ty: &Type, _fields: &[(String, Type)]) -> Self::Output {
        self.default(ty)
    }
    fn union(&self, ty: &Type, _fields: &[(String, Type)]) -> Self::Output {
        self.default(ty)
    }
    fn optional(&self, ty: &Type, _inner: &Type) -> Self::Output {
        self.default(ty)
    }
    fn list(&self, ty: &Type, _inner: &Type, _max_size: u64) -> Self::Output {
        self.default(ty)
    }
    fn array(&self, ty: &Type, _inner: &Type, _shape: &[u64]) -> Self::Output {
        self.default(ty)
    }
    fn datetime(
        &self,
        ty: &Type,
        _format: &str,
        _min: &str,
        _max: &str,
        _base: DatetimeBase,
    ) -> Self::Output {
        self.default(ty)
    }
    fn constrained(&self, ty: &Type, _inner: &Type, _constraint: &str) -> Self::Output {
        self.default(ty)
    }
    fn hypothesis(&self, ty: &Type, _types: &[(Type, f64)]) -> Self::Output {
        self.default(ty)
    }
}

fn named_fields<I, S>(fields: I) -> Vec<(String, Type)>
where
    I: IntoIterator<Item = (S, Type)>,
    S: Into<String>,
{
    fields.into_iter().map(|(n, t)| (n.into(), t)).collect()
}

impl Type {
    pub fn from_kind(kind: TypeKind) -> Self {
        Self {
            kind,
            name: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn null() -> Self {
        Self::from_kind(TypeKind::Null)
    }

    pub fn unit() -> Self {
        Self::from_kind(TypeKind::Unit)
    }

    pub fn boolean() -> Self {
        Self::from_kind(TypeKind::Boolean)
    }

    pub fn id(unique: bool, base: IdBase, reference: Option<Path>) -> Self {
        Self::from_kind(TypeKind::Id {
            unique,
            base,
            reference,
        })
    }

    pub fn integer(min: i64, max: i64) -> Self {
        Self::from_kind(TypeKind::Integer {
            min,
            max,
            base: IntegerBase::Int64,
        })
    }

    pub fn enumeration<I, S>(name: impl Into<String>, names: I, ordered: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name_values = names
            .into_iter()
            .enumerate()
            .map(|(i, n)| (n.into(), i as i64))
            .collect();
        Self::from_kind(TypeKind::Enum {
            name_values,
            ordered,
        })
        .with_name(name)
    }

    pub fn float(min: f64, max: f64) -> Self {
        Self::from_kind(TypeKind::Float {
            min,
            max,
            base: FloatBase::Float64,
        })
    }

    pub fn text() -> Self {
        Self::from_kind(TypeKind::Text {
            encoding: "UTF-8".to_string(),
        })
    }

    pub fn bytes() -> Self {
        Self::from_kind(TypeKind::Bytes)
    }

    pub fn structure<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Type)>,
        S: Into<String>,
    {
        Self::from_kind(TypeKind::Struct {
            fields: named_fields(fields),
        })
    }

    pub fn union<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Type)>,
        S: Into<String>,
    {
        Self::from_kind(TypeKind::Union {
            fields: named_fields(fields),
        })
    }

    pub fn optional(inner: Type) -> Self {
        Self::from_kind(TypeKind::Optional {
            inner: Box::new(inner),
        })
    }

    pub fn list(inner: Type, max_size: u64) -> Self {
        Self::from_kind(TypeKind::List {
            inner: Box::new(inner),
            max_size,
        })
    }

    pub fn array(inner: Type, shape: Vec<u64>) -> Self {
        Self::from_kind(TypeKind::Array {
            inner: Box::new(inner),
            shape,
        })
    }

    pub fn datetime(
        format: impl Into<String>,
        min: impl Into<String>,
        max: impl Into<String>,
        base: DatetimeBase,
    ) -> Self {
        Self::from_kind(TypeKind::Datetime {
            format: format.into(),
            min: min.into(),
            max: max.into(),
            base,
        })
    }

    pub fn constrained(inner: Type, constraint: impl Into<String>) -> Self {
        Self::from_kind(TypeKind::Constrained {
            inner: Box::new(inner),
            constraint: constraint.into(),
        })
    }

    pub fn hypothesis(types: Vec<(Type, f64)>) -> Self {
        Self::from_kind(TypeKind::Hypothesis { types })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Same name and properties, different payload.
    pub fn rebuilt(&self, kind: TypeKind) -> Self {
        Self {
            kind,
            name: self.name.clone(),
            properties: self.properties.clone(),
        }
    }

    pub fn accept<V: TypeVisitor + ?Sized>(&self, visitor: &V) -> V::Output {
        match &self.kind {
            TypeKind::Null => visitor.null(self),
            TypeKind::Unit => visitor.unit(self),
            TypeKind::Boolean => visitor.boolean(self),
            TypeKind::Id {
                unique,
                base,
                reference,
            } => visitor.id(self, *unique, *base, reference.as_ref()),
            TypeKind::Integer { min, max, base } => visitor.integer(self, *min, *max, *base),
            TypeKind::Enum {
                name_values,
                ordered,
            } => visitor.enumeration(self, name_values, *ordered),
            TypeKind::Float { min, max, base } => visitor.float(self, *min, *max, *base),
            TypeKind::Text { encoding } => visitor.text(self, encoding),
            TypeKind::Bytes => visitor.bytes(self),
            TypeKind::Struct { fields } => visitor.structure(self, fields),
            TypeKind::Union { fields } => visitor.union(self, fields),
            TypeKind::Optional { inner } => visitor.optional(self, inner),
            TypeKind::List { inner, max_size } => visitor.list(self, inner, *max_size),
            TypeKind::Array { inner, shape } => visitor.array(self, inner, shape),
            TypeKind::Datetime {
                format,
                min,
                max,
                base,
            } => visitor.datetime(self, format, min, max, *base),
            TypeKind::Constrained { inner, constraint } => {
                visitor.constrained(self, inner, constraint)
            }
            TypeKind::Hypothesis { types } => visitor.hypothesis(self, types),
        }
    }

    /// Stable lowercase name of the variant.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            TypeKind::Null => "null",
            TypeKind::Unit => "unit",
            TypeKind::Boolean => "boolean",
            TypeKind::Id { .. } => "id",
            TypeKind::Integer { .. } => "integer",
            TypeKind::Enum { .. } => "enum",
            TypeKind::Float { .. } => "float",
            TypeKind::Text { .. } => "text",
            TypeKind::Bytes => "bytes",
            TypeKind::Struct { .. } => "struct",
            TypeKind::Union { .. } => "union",
            TypeKind::Optional { .. } => "optional",
            TypeKind::List { .. } => "list",
            TypeKind::Array { .. } => "array",
            TypeKind::Datetime { .. } => "datetime",
            TypeKind::Constrained { .. } => "constrained",
            TypeKind::Hypothesis { .. } => "hypothesis",
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, TypeKind::Struct { .. })
    }

    pub fn is_union(&self) -> bool {
        matches!(self.kind, TypeKind::Union { .. })
    }

    pub fn is_optional(&self) -> bool {
        matches!(self.kind, TypeKind::Optional { .. })
    }

    /// Immediate named subtypes of a `Struct` or `Union`; empty otherwise.
    pub fn children(&self) -> &[(String, Type)] {
        match &self.kind {
            TypeKind::Struct { fields } | TypeKind::Union { fields } => fields,
            _ => &[],
        }
    }

    pub fn child(&self, label: &str) -> Option<&Type> {
        self.children()
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, t)| t)
    }

    /// The single wrapped subtype of `Optional`, `List`, `Array`, `Constrained`.
    pub fn inner(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::Optional { inner }
            | TypeKind::List { inner, .. }
            | TypeKind::Array { inner, .. }
            | TypeKind::Constrained { inner, .. } => Some(inner),
            _ => None,
        }
    }

    /// Highest-scored type of a `Hypothesis`.
    pub fn best_hypothesis(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::Hypothesis { types } => types
                .iter()
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(t, _)| t),
            _ => None,
        }
    }

    fn step(&self, label: &str, full: &Path) -> Result<&Type> {
        if let Some(inner) = self.inner() {
            return Ok(inner);
        }
        self.child(label).ok_or_else(|| Error::PathNotFound {
            path: full.to_string(),
            label: label.to_string(),
        })
    }

    /// Resolve a single-branch path to the subtype it addresses.
    ///
    /// The root label is ignored. `Struct`/`Union` steps select a field by
    /// label; `Optional`/`List`/`Array`/`Constrained` consume one step
    /// whatever its label.
    pub fn get(&self, path: &Path) -> Result<&Type> {
        let mut cur = self;
        let mut node = path;
        loop {
            match node.sub_paths() {
                [] => return Ok(cur),
                [next] => {
                    cur = cur.step(next.label(), path)?;
                    node = next;
                }
                _ => return Err(Error::AmbiguousPath(path.to_string())),
            }
        }
    }

    pub fn has_path(&self, path: &Path) -> bool {
        self.get(path).is_ok()
    }

    /// All subtypes reached at the leaves of a possibly branching path.
    pub fn sub_types(&self, path: &Path) -> Result<Vec<&Type>> {
        self.sub_types_at(path, path)
    }

    fn sub_types_at<'a>(&'a self, node: &Path, full: &Path) -> Result<Vec<&'a Type>> {
        if node.sub_paths().is_empty() {
            return Ok(vec![self]);
        }
        match &self.kind {
            TypeKind::Struct { .. } | TypeKind::Union { .. } => {
                let mut out = Vec::new();
                for sub in node.sub_paths() {
                    let child = self.step(sub.label(), full)?;
                    out.extend(child.sub_types_at(sub, full)?);
                }
                Ok(out)
            }
            _ => match (self.inner(), node.sub_paths()) {
                (Some(inner), [sub]) => inner.sub_types_at(sub, full),
                (Some(_), _) => Err(Error::AmbiguousPath(full.to_string())),
                (None, subs) => Err(Error::PathNotFound {
                    path: full.to_string(),
                    label: subs[0].label().to_string(),
                }),
            },
        }
    }

    /// Projection of this type onto `path`: the addressed subtypes together
    /// with all their ancestors. Stopping at a container keeps it whole.
    pub fn select(&self, path: &Path) -> Result<Type> {
        self.select_at(path, path)
    }

    fn select_at(&self, node: &Path, full: &Path) -> Result<Type> {
        if node.sub_paths().is_empty() {
            return Ok(self.clone());
        }
        let kind = match &self.kind {
            TypeKind::Struct { fields } | TypeKind::Union { fields } => {
                for sub in node.sub_paths() {
                    self.step(sub.label(), full)?;
                }
                let mut kept = Vec::new();
                for (name, ty) in fields {
                    if let Some(sub) = node.sub_paths().iter().find(|s| s.label() == name) {
                        kept.push((name.clone(), ty.select_at(sub, full)?));
                    }
                }
                if self.is_struct() {
                    TypeKind::Struct { fields: kept }
                } else {
                    TypeKind::Union { fields: kept }
                }
            }
            TypeKind::Optional { inner } => TypeKind::Optional {
                inner: Box::new(inner.select_at(single(node, full)?, full)?),
            },
            TypeKind::List { inner, max_size } => TypeKind::List {
                inner: Box::new(inner.select_at(single(node, full)?, full)?),
                max_size: *max_size,
            },
            TypeKind::Array { inner, shape } => TypeKind::Array {
                inner: Box::new(inner.select_at(single(node, full)?, full)?),
                shape: shape.clone(),
            },
            TypeKind::Constrained { inner, constraint } => TypeKind::Constrained {
                inner: Box::new(inner.select_at(single(node, full)?, full)?),
                constraint: constraint.clone(),
            },
            _ => {
                return Err(Error::PathNotFound {
                    path: full.to_string(),
                    label: node.sub_paths()[0].label().to_string(),
                })
            }
        };
        Ok(self.rebuilt(kind))
    }

    /// Terminal subtypes, depth-first. Empty structs and unions count as leaves.
    pub fn leaves(&self) -> Vec<&Type> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Type>) {
        let children = self.children();
        if !children.is_empty() {
            for (_, child) in children {
                child.collect_leaves(out);
            }
        } else if let Some(inner) = self.inner() {
            inner.collect_leaves(out);
        } else {
            out.push(self);
        }
    }

    /// Paths to the first-level structs below a union or wrapper.
    ///
    /// `Some(vec![])` for a struct itself, `None` when no struct is reachable.
    pub fn structs(&self) -> Option<Vec<Path>> {
        self.struct_nodes().map(|nodes| {
            nodes
                .into_iter()
                .map(|n| Path::with_sub_paths(String::new(), vec![n]))
                .collect()
        })
    }

    fn struct_nodes(&self) -> Option<Vec<Path>> {
        let wrapper_label = match &self.kind {
            TypeKind::Struct { .. } => return Some(Vec::new()),
            TypeKind::Union { fields } => {
                let mut paths = Vec::new();
                for (name, ty) in fields {
                    if ty.is_struct() {
                        paths.push(Path::new(name.clone()));
                    } else if let Some(subs) = ty.struct_nodes() {
                        paths.extend(
                            subs.into_iter()
                                .map(|s| Path::with_sub_paths(name.clone(), vec![s])),
                        );
                    }
                }
                return if paths.is_empty() { None } else { Some(paths) };
            }
            TypeKind::Optional { .. } => OPTIONAL_VALUE,
            TypeKind::List { .. } => LIST_VALUES,
            TypeKind::Array { .. } => ARRAY_VALUES,
            _ => return None,
        };
        let inner = self.inner()?;
        if inner.is_struct() {
            Some(vec![Path::new(wrapper_label)])
        } else {
            inner
                .struct_nodes()
                .map(|subs| vec![Path::with_sub_paths(wrapper_label, subs)])
        }
    }

    /// Structural digest, stable across processes.
    pub fn fingerprint(&self) -> Result<Hash256> {
        hash_serde(self)
    }
}

fn single<'p>(node: &'p Path, full: &Path) -> Result<&'p Path> {
    match node.sub_paths() {
        [one] => Ok(one),
        _ => Err(Error::AmbiguousPath(full.to_string())),
    }
}

fn fmt_fields(f: &mut fmt::Formatter<'_>, open: &str, fields: &[(String, Type)]) -> fmt::Result {
    f.write_str(open)?;
    f.write_str("{")?;
    for (i, (name, ty)) in fields.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{name}: {ty}")?;
    }
    f.write_str("}")
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Null => f.write_str("Null"),
            TypeKind::Unit => f.write_str("Unit"),
            TypeKind::Boolean => f.write_str("Boolean"),
            TypeKind::Id { reference, .. } => match reference {
                Some(r) => write!(f, "Id(ref={r})"),
                None => f.write_str("Id"),
            },
            TypeKind::Integer { min, max, .. } => write!(f, "Integer[{min}, {max}]"),
            TypeKind::Enum { name_values, .. } => {
                let names: Vec<&str> = name_values.iter().map(|(n, _)| n.as_str()).collect();
                write!(f, "Enum({})", names.join(", "))
            }
            TypeKind::Float { min, max, .. } => write!(f, "Float[{min}, {max}]"),
            TypeKind::Text { .. } => f.write_str("Text"),
            TypeKind::Bytes => f.write_str("Bytes"),
            TypeKind::Struct { fields } => fmt_fields(f, "Struct", fields),
            TypeKind::Union { fields } => fmt_fields(f, "Union", fields),
            TypeKind::Optional { inner } => write!(f, "Optional({inner})"),
            TypeKind::List { inner, .. } => write!(f, "List({inner})"),
            TypeKind::Array { inner, shape } => write!(f, "Array({inner}, {shape:?})"),
            TypeKind::Datetime { min, max, .. } => write!(f, "Datetime[{min}, {max}]"),
            TypeKind::Constrained { inner, constraint } => {
                write!(f, "Constrained({inner}, {constraint})")
            }
            TypeKind::Hypothesis { types } => {
                f.write_str("Hypothesis(")?;
                for (i, (ty, score)) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{ty}: {score}")?;
                }
                f.write_str(")")
            }
        }
    }
}
