//! Convenient re-exports for downstream crates.

pub use crate::config::EngineConfig;
pub use crate::dataspec::{DataSpec, DataSpecKind, Origin};
pub use crate::error::{Error, Result};
pub use crate::fks::{foreign_keys, update_fks};
pub use crate::graph::{Graph, ReferrableStore};
pub use crate::hash::Hash256;
pub use crate::id::DataSpecId;
pub use crate::path::Path;
pub use crate::schema::{Schema, PRIMARY_KEYS};
pub use crate::transform::{Position, SampleSize, Transform, TransformKind};
pub use crate::types::{
    DatetimeBase, FloatBase, IdBase, IntegerBase, Type, TypeKind, TypeVisitor, ARRAY_VALUES, DATA,
    FIELD_SELECTED, LIST_VALUES, OPTIONAL_VALUE,
};
