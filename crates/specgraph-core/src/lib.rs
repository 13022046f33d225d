#![forbid(unsafe_code)]
//! specgraph-core: the typed model of the transform graph.
//!
//! Types, paths, schemas, transforms and the node arena. Pure data with no
//! Arrow dependency; `specgraph-operators` maps these onto Arrow arrays and
//! `specgraph-exec` evaluates the graph.

pub mod config;
pub mod dataspec;
pub mod error;
pub mod fks;
pub mod graph;
pub mod hash;
pub mod id;
pub mod path;
pub mod prelude;
pub mod schema;
pub mod transform;
pub mod types;

pub use error::{Error, Result};

/// Crate version baked at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
