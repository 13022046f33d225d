//! Graph nodes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::hash::hash_serde;
use crate::id::DataSpecId;
use crate::schema::Schema;
use crate::transform::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSpecKind {
    Dataset,
    Scalar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Dataset read from `uri` (`memory://<key>` or `file://<path>`).
    Source { uri: String, schema: Schema },
    /// Scalar holding its value directly.
    Value { value: serde_json::Value },
    Transformed {
        transform: Transform,
        arguments: Vec<DataSpecId>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        named_arguments: BTreeMap<String, DataSpecId>,
    },
}

/// An immutable node of the transform graph, either a dataset or a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
    pub kind: DataSpecKind,
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl DataSpec {
    pub fn new(name: impl Into<String>, kind: DataSpecKind, origin: Origin) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
            kind,
            origin,
            properties: BTreeMap::new(),
        }
    }

    /// Content-derived id: equal nodes share an id.
    pub fn id(&self) -> Result<DataSpecId> {
        Ok(DataSpecId::from_hash(&hash_serde(self)?))
    }

    pub fn is_dataset(&self) -> bool {
        self.kind == DataSpecKind::Dataset
    }

    pub fn is_source(&self) -> bool {
        !self.is_transformed()
    }

    pub fn is_transformed(&self) -> bool {
        matches!(self.origin, Origin::Transformed { .. })
    }

    pub fn transform(&self) -> Option<&Transform> {
        match &self.origin {
            Origin::Transformed { transform, .. } => Some(transform),
            _ => None,
        }
    }

    /// Positional parents followed by named parents.
    pub fn parent_ids(&self) -> Vec<DataSpecId> {
        match &self.origin {
            Origin::Transformed {
                arguments,
                named_arguments,
                ..
            } => arguments
                .iter()
                .chain(named_arguments.values())
                .copied()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Schema declared on a source dataset.
    pub fn declared_schema(&self) -> Option<&Schema> {
        match &self.origin {
            Origin::Source { schema, .. } => Some(schema),
            _ => None,
        }
    }
}
