//! YAML → `Graph` parser.
//!
//! Example:
//! ```yaml
//! config: { batch_size: 2, seed: 42 }
//! datasets:
//!   - name: users
//!     source: "memory://users"
//!     fields:
//!       - { name: id,   type: id, unique: true }
//!       - { name: age,  type: integer, min: 0, max: 120 }
//!       - { name: name, type: text }
//!     primary_keys: [id]
//!   - name: adults
//!     from: users
//!     transform: { op: filter, bounds: { age: { min: 18 } } }
//!   - name: names
//!     from: adults
//!     transform: { op: project, columns: [name] }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use specgraph_core::prelude::{
    DataSpecId, DatetimeBase, EngineConfig, Graph, IdBase, Path, SampleSize, Schema, Transform,
    Type, TypeKind,
};

use crate::schema::static_schema;

#[derive(Debug, Error)]
pub enum DslError {
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("dataset '{0}' is defined twice")]
    Duplicate(String),

    #[error("dataset '{name}': {msg}")]
    Invalid { name: String, msg: String },

    #[error(transparent)]
    Core(#[from] specgraph_core::Error),
}

fn invalid(name: &str, msg: impl Into<String>) -> DslError {
    DslError::Invalid {
        name: name.to_string(),
        msg: msg.into(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDoc {
    #[serde(default)]
    pub config: Option<GraphConfig>,
    pub datasets: Vec<DatasetDef>,
}

/// Engine settings carried by the document; unset fields keep the
/// caller's values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub batch_size: Option<usize>,
    pub seed: Option<u64>,
    pub sql_table: Option<String>,
}

impl GraphConfig {
    pub fn apply_to(&self, cfg: &mut EngineConfig) {
        if let Some(b) = self.batch_size {
            cfg.batch_size = b;
        }
        if let Some(s) = self.seed {
            cfg.seed = Some(s);
        }
        if let Some(t) = &self.sql_table {
            cfg.sql_table = t.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDef {
    pub name: String,
    #[serde(default)]
    pub doc: String,
    /// `memory://<key>` or `file://<path>`.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<FieldDef>>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub transform: Option<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Enum names.
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    /// Dotted path of the referenced field, making an `id` a foreign key.
    #[serde(default)]
    pub references: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Step {
    Filter {
        bounds: BTreeMap<String, Bound>,
    },
    Project {
        columns: Vec<String>,
    },
    GetItem {
        path: String,
    },
    Sample {
        #[serde(default)]
        size: Option<u64>,
        #[serde(default)]
        fraction: Option<f64>,
    },
    Slice {
        start: i64,
        end: i64,
    },
    Extract {
        size: u64,
        #[serde(default)]
        seed: Option<u64>,
    },
    Shuffle,
    SelectSql {
        query: String,
    },
}

#[derive(Debug, Clone)]
pub struct ParsedGraph {
    pub graph: Graph,
    pub config: GraphConfig,
    /// Dataset names in document order.
    pub datasets: Vec<(String, DataSpecId)>,
}

impl ParsedGraph {
    pub fn id(&self, name: &str) -> Option<DataSpecId> {
        self.datasets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }
}

fn to_type(field: &FieldDef) -> Result<Type, DslError> {
    let min_i = field.min.map(|v| v as i64).unwrap_or(i64::MIN);
    let max_i = field.max.map(|v| v as i64).unwrap_or(i64::MAX);
    let ty = match field.data_type.to_ascii_lowercase().as_str() {
        "null" => Type::null(),
        "boolean" | "bool" => Type::boolean(),
        "integer" | "int" | "int64" | "i64" => Type::integer(min_i, max_i),
        "float" | "float64" | "f64" => Type::float(
            field.min.unwrap_or(f64::MIN),
            field.max.unwrap_or(f64::MAX),
        ),
        "text" | "string" | "utf8" => Type::text(),
        "bytes" | "binary" => Type::bytes(),
        "id" | "string_id" => {
            let base = if field.data_type.eq_ignore_ascii_case("string_id") {
                IdBase::String
            } else {
                IdBase::Int64
            };
            let reference = field
                .references
                .as_deref()
                .map(str::parse::<Path>)
                .transpose()?;
            Type::id(field.unique, base, reference)
        }
        "enum" => {
            if field.values.is_empty() {
                return Err(invalid(&field.name, "enum fields need `values`"));
            }
            Type::enumeration(field.name.clone(), field.values.iter().cloned(), false)
        }
        "date" => Type::datetime("%Y-%m-%d", "0001-01-01", "9999-12-31", DatetimeBase::Date),
        "datetime" => Type::datetime(
            "%Y-%m-%d %H:%M:%S",
            "0001-01-01 00:00:00",
            "9999-12-31 23:59:59",
            DatetimeBase::Text,
        ),
        other => return Err(invalid(&field.name, format!("unknown type '{other}'"))),
    };
    Ok(if field.nullable { Type::optional(ty) } else { ty })
}

fn fields_type(fields: &[FieldDef]) -> Result<Type, DslError> {
    let mut out = Vec::with_capacity(fields.len());
    for f in fields {
        out.push((f.name.clone(), to_type(f)?));
    }
    Ok(Type::structure(out))
}

/// Narrow the leaf at `labels` to `bound`.
fn narrow(ty: &Type, labels: &[String], bound: &Bound, full: &str) -> Result<Type, DslError> {
    if let Some((head, rest)) = labels.split_first() {
        let kind = match &ty.kind {
            TypeKind::Struct { fields } | TypeKind::Union { fields } => {
                if ty.child(head).is_none() {
                    return Err(invalid(full, format!("no field '{head}'")));
                }
                let fields = fields
                    .iter()
                    .map(|(n, t)| {
                        if n == head {
                            narrow(t, rest, bound, full).map(|t| (n.clone(), t))
                        } else {
                            Ok((n.clone(), t.clone()))
                        }
                    })
                    .collect::<Result<Vec<_>, DslError>>()?;
                if ty.is_struct() {
                    TypeKind::Struct { fields }
                } else {
                    TypeKind::Union { fields }
                }
            }
            TypeKind::Optional { inner } => TypeKind::Optional {
                inner: Box::new(narrow(inner, labels, bound, full)?),
            },
            _ => return Err(invalid(full, format!("cannot descend into a {}", ty.kind_name()))),
        };
        return Ok(ty.rebuilt(kind));
    }

    let kind = match &ty.kind {
        TypeKind::Optional { inner } => TypeKind::Optional {
            inner: Box::new(narrow(inner, labels, bound, full)?),
        },
        TypeKind::Integer { min, max, base } => TypeKind::Integer {
            min: bound.min.map(|v| (v.ceil() as i64).max(*min)).unwrap_or(*min),
            max: bound.max.map(|v| (v.floor() as i64).min(*max)).unwrap_or(*max),
            base: *base,
        },
        TypeKind::Float { min, max, base } => TypeKind::Float {
            min: bound.min.map(|v| v.max(*min)).unwrap_or(*min),
            max: bound.max.map(|v| v.min(*max)).unwrap_or(*max),
            base: *base,
        },
        TypeKind::Enum {
            name_values,
            ordered,
        } => {
            let keep = bound.values.as_ref();
            TypeKind::Enum {
                name_values: name_values
                    .iter()
                    .filter(|(n, _)| keep.map(|k| k.contains(n)).unwrap_or(true))
                    .cloned()
                    .collect(),
                ordered: *ordered,
            }
        }
        TypeKind::Union { fields } => match &bound.values {
            Some(keep) => TypeKind::Union {
                fields: fields.iter().filter(|(n, _)| keep.contains(n)).cloned().collect(),
            },
            None => return Err(invalid(full, "union bounds need `values`")),
        },
        _ => return Err(invalid(full, format!("cannot bound a {}", ty.kind_name()))),
    };
    Ok(ty.rebuilt(kind))
}

fn labels_of(dotted: &str) -> Result<Vec<String>, DslError> {
    Ok(dotted.parse::<Path>()?.labels()?)
}

/// Merge dotted column names into one projection path.
fn projection_path(columns: &[String]) -> Result<Path, DslError> {
    fn insert(node: &mut Vec<Path>, labels: &[String]) {
        let Some((head, rest)) = labels.split_first() else {
            return;
        };
        let pos = match node.iter().position(|p| p.label() == head) {
            Some(pos) => pos,
            None => {
                node.push(Path::new(head.clone()));
                node.len() - 1
            }
        };
        let mut subs = node[pos].sub_paths().to_vec();
        insert(&mut subs, rest);
        node[pos] = Path::with_sub_paths(head.clone(), subs);
    }
    let mut subs = Vec::new();
    for c in columns {
        insert(&mut subs, &labels_of(c)?);
    }
    Ok(Path::with_sub_paths(String::new(), subs))
}

fn lower_step(
    name: &str,
    step: &Step,
    parent: impl FnOnce() -> Result<Schema, DslError>,
) -> Result<Transform, DslError> {
    let t = match step {
        Step::Filter { bounds } => {
            let parent = parent()?;
            let mut ty = parent.data_type().clone();
            for (column, bound) in bounds {
                ty = narrow(&ty, &labels_of(column)?, bound, column)?;
            }
            Transform::filter(ty)
        }
        Step::Project { columns } => {
            if columns.is_empty() {
                return Err(invalid(name, "project needs at least one column"));
            }
            let parent = parent()?;
            Transform::project(parent.data_type().select(&projection_path(columns)?)?)
        }
        Step::GetItem { path } => Transform::get_item(path.parse()?),
        Step::Sample { size, fraction } => match (size, fraction) {
            (Some(n), None) => Transform::sample(SampleSize::Size(*n)),
            (None, Some(f)) => Transform::sample(SampleSize::Fraction(*f)),
            _ => return Err(invalid(name, "sample takes exactly one of `size` or `fraction`")),
        },
        Step::Slice { start, end } => Transform::slice(*start, *end),
        Step::Extract { size, seed } => Transform::extract(*size, *seed),
        Step::Shuffle => Transform::shuffle(),
        Step::SelectSql { query } => Transform::select_sql(query.clone()),
    };
    Ok(t)
}

/// Parse a YAML graph whose sources all declare their fields.
pub fn parse_yaml_graph(yaml_src: &str) -> Result<ParsedGraph, DslError> {
    parse_yaml_graph_with(yaml_src, |name, _| {
        Err(invalid(name, "source has no declared `fields`"))
    })
}

/// Parse a YAML graph; `infer(name, uri)` supplies the type of sources
/// without declared fields.
pub fn parse_yaml_graph_with<F>(yaml_src: &str, mut infer: F) -> Result<ParsedGraph, DslError>
where
    F: FnMut(&str, &str) -> Result<Type, DslError>,
{
    let doc: GraphDoc = serde_yaml::from_str(yaml_src)?;
    let mut graph = Graph::new();
    let mut datasets: Vec<(String, DataSpecId)> = Vec::new();

    for def in &doc.datasets {
        if datasets.iter().any(|(n, _)| *n == def.name) {
            return Err(DslError::Duplicate(def.name.clone()));
        }
        let id = match (&def.source, &def.from, &def.transform) {
            (Some(uri), None, None) => {
                let ty = match &def.fields {
                    Some(fields) => fields_type(fields)?,
                    None => infer(&def.name, uri)?,
                };
                let mut schema = Schema::new(def.name.clone(), ty);
                if !def.primary_keys.is_empty() {
                    let keys = def
                        .primary_keys
                        .iter()
                        .map(|k| k.parse::<Path>())
                        .collect::<specgraph_core::Result<Vec<_>>>()?;
                    for k in &keys {
                        if !schema.ty.has_path(k) {
                            return Err(invalid(&def.name, format!("primary key {k} is not a field")));
                        }
                    }
                    schema = schema.with_primary_keys(&keys)?;
                }
                graph.source_dataset(def.name.clone(), uri.clone(), schema)?
            }
            (None, Some(from), Some(step)) => {
                let parent = datasets
                    .iter()
                    .find(|(n, _)| n == from)
                    .map(|(_, id)| *id)
                    .ok_or_else(|| DslError::UnknownDataset(from.clone()))?;
                let transform = lower_step(&def.name, step, || {
                    static_schema(&graph, &parent).map_err(DslError::from)
                })?
                .with_doc(def.doc.clone());
                graph.transformed_named(def.name.clone(), transform, &[parent], BTreeMap::new())?
            }
            _ => {
                return Err(invalid(
                    &def.name,
                    "expected either `source` or `from` + `transform`",
                ))
            }
        };
        datasets.push((def.name.clone(), id));
    }

    Ok(ParsedGraph {
        graph,
        config: doc.config.unwrap_or_default(),
        datasets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use specgraph_core::prelude::TransformKind;

    const DOC: &str = r#"
config: { batch_size: 2 }
datasets:
  - name: users
    source: "memory://users"
    fields:
      - { name: id, type: id, unique: true }
      - { name: age, type: integer, min: 0, max: 120, nullable: true }
      - { name: tier, type: enum, values: [gold, silver, bronze] }
    primary_keys: [id]
  - name: adults
    from: users
    transform: { op: filter, bounds: { age: { min: 18 }, tier: { values: [gold] } } }
  - name: ids
    from: adults
    transform: { op: project, columns: [id] }
  - name: few
    from: ids
    transform: { op: sample, size: 1 }
"#;

    #[test]
    fn parses_a_small_graph() {
        let parsed = parse_yaml_graph(DOC).unwrap();
        assert_eq!(parsed.datasets.len(), 4);
        assert_eq!(parsed.config.batch_size, Some(2));

        let adults = parsed.graph.get(&parsed.id("adults").unwrap()).unwrap();
        let Some(Transform { spec: TransformKind::Filter { filter }, .. }) = adults.transform() else {
            panic!("adults should be a filter");
        };
        assert_eq!(
            filter.child("age"),
            Some(&Type::optional(Type::integer(18, 120)))
        );
        assert_eq!(filter.child("tier").unwrap().to_string(), "Enum(gold)");
    }

    #[test]
    fn unknown_parent_is_reported() {
        let src = "datasets:\n  - { name: a, from: nope, transform: { op: shuffle } }\n";
        assert!(matches!(parse_yaml_graph(src), Err(DslError::UnknownDataset(n)) if n == "nope"));
    }

    #[test]
    fn projection_paths_merge() {
        let p = projection_path(&["a.x".into(), "a.y".into(), "b".into()]).unwrap();
        assert_eq!(p.to_string(), "{a.{x,y},b}");
    }

    #[test]
    fn config_overrides_only_set_fields() {
        let mut cfg = EngineConfig::default().with_seed(3);
        GraphConfig {
            batch_size: Some(5),
            ..Default::default()
        }
        .apply_to(&mut cfg);
        assert_eq!(cfg.batch_size, 5);
        assert_eq!(cfg.seed, Some(3));
    }
}
