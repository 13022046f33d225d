#![forbid(unsafe_code)]
//! specgraph-operators: Arrow-side execution of standard transforms.
//!
//! `filter`, `project` and `get_item` stream batch by batch; `sample`,
//! `slice`, `extract` and `shuffle` work on the whole parent table;
//! `select_sql` goes through a [`SqlExecutor`]. Results are re-chunked with
//! [`Rebatch`] / [`rechunk`].

pub mod convert;
pub mod filter;
pub mod get_item;
pub mod project;
pub mod rebatch;
pub mod sample;
pub mod select;
pub mod select_sql;
pub mod slice;
pub mod traits;

pub use filter::Filter;
pub use get_item::GetItem;
pub use project::Project;
pub use rebatch::{rechunk, Rebatch};
pub use sample::{Sample, Shuffle};
pub use select::select_rows;
pub use select_sql::{MemorySql, Row, SqlExecutor};
pub use slice::{Extract, Slice};
pub use traits::{collect_table, deferred, error_stream, vec_stream, BatchOperator, BatchStream, OpError, TableOperator};
