//! Textual front-ends for building graphs.

pub mod yaml;
