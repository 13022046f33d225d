//! Strongly-typed identifiers for graph nodes.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::hash::Hash256;

/// Content-derived identifier of a `DataSpec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(transparent)]
pub struct DataSpecId(Uuid);

impl DataSpecId {
    pub fn from_hash(hash: &Hash256) -> Self {
        Self(Uuid::from_bytes(hash.prefix16()))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Two leading hex chars, used to tag nodes in graph renderings.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..2].to_string()
    }
}

impl fmt::Display for DataSpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
