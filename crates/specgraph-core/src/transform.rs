//! Transforms: the operations that produce a node from its parents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::dataspec::DataSpecKind;
use crate::error::{Error, Result};
use crate::path::Path;
use crate::types::Type;

/// Either an absolute row count or a fraction of the parent's rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSize {
    Fraction(f64),
    Size(u64),
}

impl SampleSize {
    /// Number of rows to draw out of `total` (`round(fraction * total)`).
    pub fn rows(&self, total: usize) -> usize {
        match *self {
            SampleSize::Size(n) => n as usize,
            SampleSize::Fraction(f) => (f * total as f64).round().max(0.0) as usize,
        }
    }
}

/// Placeholder position of a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Index(usize),
    Name(String),
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Index(i) => write!(f, "#{i}"),
            Position::Name(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Opaque call into `library.op`; arguments are not interpreted here.
    External {
        library: String,
        op: String,
        #[serde(default)]
        arguments: serde_json::Value,
        returns: DataSpecKind,
    },
    Composed {
        transform: Box<Transform>,
        #[serde(default)]
        arguments: Vec<Transform>,
        #[serde(default)]
        named_arguments: BTreeMap<String, Transform>,
    },
    Variable {
        position: Position,
    },
    Filter {
        filter: Type,
    },
    Project {
        projection: Type,
    },
    GetItem {
        path: Path,
    },
    Sample {
        size: SampleSize,
    },
    Slice {
        start: i64,
        end: i64,
    },
    Extract {
        size: u64,
        seed: u64,
    },
    SelectSql {
        query: String,
    },
    Shuffle,
    DifferentiatedSample {
        size: SampleSize,
    },
}

impl TransformKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransformKind::External { .. } => "external",
            TransformKind::Composed { .. } => "composed",
            TransformKind::Variable { .. } => "variable",
            TransformKind::Filter { .. } => "filter",
            TransformKind::Project { .. } => "project",
            TransformKind::GetItem { .. } => "get_item",
            TransformKind::Sample { .. } => "sample",
            TransformKind::Slice { .. } => "slice",
            TransformKind::Extract { .. } => "extract",
            TransformKind::SelectSql { .. } => "select_sql",
            TransformKind::Shuffle => "shuffle",
            TransformKind::DifferentiatedSample { .. } => "differentiated_sample",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
    pub spec: TransformKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Transform {
    pub fn new(name: impl Into<String>, spec: TransformKind) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
            spec,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Keep only the rows (and union branches) admitted by `filter`.
    pub fn filter(filter: Type) -> Self {
        Self::new("filter", TransformKind::Filter { filter })
    }

    /// Keep only the columns present in `projection`.
    pub fn project(projection: Type) -> Self {
        Self::new("project", TransformKind::Project { projection })
    }

    pub fn get_item(path: Path) -> Self {
        Self::new("get_item", TransformKind::GetItem { path })
    }

    pub fn sample(size: SampleSize) -> Self {
        Self::new("sample", TransformKind::Sample { size })
    }

    pub fn differentiated_sample(size: SampleSize) -> Self {
        Self::new(
            "differentiated_sample",
            TransformKind::DifferentiatedSample { size },
        )
    }

    pub fn shuffle() -> Self {
        Self::new("shuffle", TransformKind::Shuffle)
    }

    /// Rows `[start, end)`.
    pub fn slice(start: i64, end: i64) -> Self {
        Self::new("slice", TransformKind::Slice { start, end })
    }

    /// `seed` defaults to 0.
    pub fn extract(size: u64, seed: Option<u64>) -> Self {
        Self::new(
            "extract",
            TransformKind::Extract {
                size,
                seed: seed.unwrap_or(0),
            },
        )
    }

    pub fn select_sql(query: impl Into<String>) -> Self {
        Self::new(
            "select_sql",
            TransformKind::SelectSql {
                query: query.into(),
            },
        )
    }

    /// External op identified as `library.op`.
    pub fn external(id: &str, arguments: serde_json::Value, returns: DataSpecKind) -> Result<Self> {
        let parts: Vec<&str> = id.split('.').collect();
        match parts.as_slice() {
            [library, op] if !library.is_empty() && !op.is_empty() => Ok(Self::new(
                id,
                TransformKind::External {
                    library: library.to_string(),
                    op: op.to_string(),
                    arguments,
                    returns,
                },
            )),
            _ => Err(Error::InvalidInput(format!(
                "external op id '{id}' is not of the form library.op"
            ))),
        }
    }

    pub fn variable(position: Position) -> Self {
        Self::new("variable", TransformKind::Variable { position })
    }

    /// `transform(arguments...)`. Composing an already composed transform
    /// substitutes into it instead of nesting.
    pub fn composed(
        transform: Transform,
        arguments: Vec<Transform>,
        named_arguments: BTreeMap<String, Transform>,
    ) -> Self {
        if transform.is_composed() {
            return transform.compose(&arguments, &named_arguments);
        }
        Self::new(
            "composed",
            TransformKind::Composed {
                transform: Box::new(transform),
                arguments,
                named_arguments,
            },
        )
    }

    /// Substitute `arguments` for this transform's variables.
    ///
    /// Variables without a matching argument are left in place. A standard
    /// transform is applied on top of the arguments.
    pub fn compose(
        &self,
        arguments: &[Transform],
        named_arguments: &BTreeMap<String, Transform>,
    ) -> Transform {
        match &self.spec {
            TransformKind::Variable { position } => {
                let found = match position {
                    Position::Index(i) => arguments.get(*i),
                    Position::Name(n) => named_arguments.get(n),
                };
                found.cloned().unwrap_or_else(|| self.clone())
            }
            TransformKind::Composed {
                transform,
                arguments: inner_args,
                named_arguments: inner_named,
            } => Self::new(
                self.name.clone(),
                TransformKind::Composed {
                    transform: transform.clone(),
                    arguments: inner_args
                        .iter()
                        .map(|a| a.compose(arguments, named_arguments))
                        .collect(),
                    named_arguments: inner_named
                        .iter()
                        .map(|(n, a)| (n.clone(), a.compose(arguments, named_arguments)))
                        .collect(),
                },
            ),
            _ => Self::composed(self.clone(), arguments.to_vec(), named_arguments.clone()),
        }
    }

    /// All variable positions reachable through composition, sorted.
    pub fn variables(&self) -> Vec<Position> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_variables(&self, out: &mut Vec<Position>) {
        match &self.spec {
            TransformKind::Variable { position } => out.push(position.clone()),
            TransformKind::Composed {
                transform,
                arguments,
                named_arguments,
            } => {
                transform.collect_variables(out);
                for a in arguments.iter().chain(named_arguments.values()) {
                    a.collect_variables(out);
                }
            }
            _ => {}
        }
    }

    /// Kind name, e.g. `"filter"`.
    pub fn spec_name(&self) -> &'static str {
        self.spec.name()
    }

    pub fn is_external(&self) -> bool {
        matches!(self.spec, TransformKind::External { .. })
    }

    pub fn is_composed(&self) -> bool {
        matches!(self.spec, TransformKind::Composed { .. })
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.spec, TransformKind::Variable { .. })
    }

    /// One of the structurally interpreted kinds.
    pub fn is_standard(&self) -> bool {
        !(self.is_external() || self.is_composed() || self.is_variable())
    }
}
