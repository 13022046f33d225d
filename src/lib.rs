#![forbid(unsafe_code)]
//! specgraph: typed lazy transform graphs evaluated to Arrow batches.
//!
//! Facade over the workspace crates:
//! - [`model`]: types, paths, schemas, transforms and the node graph
//! - [`operators`]: Arrow conversion and the per-transform operators
//! - [`planner`]: schema propagation and the YAML graph DSL
//! - [`exec`]: the execution router

pub use specgraph_core as model;
pub use specgraph_exec as exec;
pub use specgraph_operators as operators;
pub use specgraph_planner as planner;

pub use specgraph_core::prelude::*;
pub use specgraph_exec::{Engine, ExecError, ExternalCall, ExternalRegistry, ExternalValue, SourceCatalog};
