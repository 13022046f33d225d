#![forbid(unsafe_code)]
//! specgraph-planner: schema propagation and the YAML graph DSL.
//!
//! - `schema` computes a transformed dataset's schema from its parent's,
//!   keeping foreign keys and primary keys consistent.
//! - `dsl::yaml` builds a `Graph` from a small YAML document.

pub mod dsl;
pub mod schema;

pub use dsl::yaml::{parse_yaml_graph, parse_yaml_graph_with, DslError, ParsedGraph};
pub use schema::{propagate, schema_from_table, static_schema, Propagation};
