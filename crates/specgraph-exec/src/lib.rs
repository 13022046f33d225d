#![forbid(unsafe_code)]
//! specgraph-exec: the Arrow execution router.
//!
//! [`Engine`] evaluates dataset nodes to streams of record batches and
//! scalar nodes to JSON values. Sources come from a [`SourceCatalog`],
//! external ops from an [`ExternalRegistry`], and `select_sql` goes through
//! a pluggable `SqlExecutor` (the in-memory adapter by default).

pub mod engine;
pub mod error;
pub mod external;
pub mod metrics;
pub mod sources;

pub use engine::Engine;
pub use error::{ExecError, Result};
pub use external::{ExternalCall, ExternalOps, ExternalRegistry, ExternalValue};
pub use sources::SourceCatalog;
