//! Source datasets: `memory://<key>` batches and `file://<path>` CSV files.

use std::collections::HashMap;
use std::fs::File;

use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::record_batch::RecordBatch;

use specgraph_core::prelude::{Error, Type};
use specgraph_operators::convert::{check_batch, to_arrow_schema, type_from_arrow, type_from_batch};

use crate::error::Result;

const MEMORY: &str = "memory://";
const FILE: &str = "file://";

/// Rows sampled when inferring a CSV file's columns.
const CSV_INFER_ROWS: usize = 1_000;

/// Where source datasets read their rows from.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    memory: HashMap<String, Vec<RecordBatch>>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `batches` under `memory://<key>`.
    pub fn register(&mut self, key: impl Into<String>, batches: Vec<RecordBatch>) {
        self.memory.insert(key.into(), batches);
    }

    pub fn with(mut self, key: impl Into<String>, batches: Vec<RecordBatch>) -> Self {
        self.register(key, batches);
        self
    }

    pub fn contains(&self, uri: &str) -> bool {
        match uri.strip_prefix(MEMORY) {
            Some(key) => self.memory.contains_key(key),
            None => uri.starts_with(FILE),
        }
    }

    /// Read every batch of `uri`, checked against the declared type `ty`.
    pub fn load(&self, uri: &str, ty: &Type, batch_size: usize) -> Result<Vec<RecordBatch>> {
        let batches = if let Some(key) = uri.strip_prefix(MEMORY) {
            self.memory
                .get(key)
                .cloned()
                .ok_or_else(|| Error::InvalidInput(format!("no memory source registered under '{key}'")))?
        } else if let Some(path) = uri.strip_prefix(FILE) {
            let file = File::open(path).map_err(|e| Error::InvalidInput(format!("{uri}: {e}")))?;
            let reader = ReaderBuilder::new(to_arrow_schema(ty)?)
                .with_header(true)
                .with_batch_size(batch_size.max(1))
                .build(file)
                .map_err(specgraph_operators::OpError::from)?;
            reader
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(specgraph_operators::OpError::from)?
        } else {
            return Err(Error::Unsupported(format!("source uri '{uri}'")).into());
        };

        for batch in &batches {
            check_batch(batch, ty)?;
        }
        Ok(batches)
    }

    /// Type of a source without declared fields, read off its data.
    pub fn infer_type(&self, uri: &str) -> Result<Type> {
        if let Some(key) = uri.strip_prefix(MEMORY) {
            let first = self
                .memory
                .get(key)
                .and_then(|b| b.first())
                .ok_or_else(|| Error::EmptyResult(format!("cannot infer the type of '{uri}' without batches")))?;
            return Ok(type_from_batch(first)?);
        }
        if let Some(path) = uri.strip_prefix(FILE) {
            let file = File::open(path).map_err(|e| Error::InvalidInput(format!("{uri}: {e}")))?;
            let (schema, _) = Format::default()
                .with_header(true)
                .infer_schema(file, Some(CSV_INFER_ROWS))
                .map_err(specgraph_operators::OpError::from)?;
            let mut fields = Vec::with_capacity(schema.fields().len());
            for f in schema.fields() {
                fields.push((f.name().clone(), type_from_arrow(f.data_type(), f.is_nullable())?));
            }
            return Ok(Type::structure(fields));
        }
        Err(Error::Unsupported(format!("source uri '{uri}'")).into())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::io::Write;
    use std::sync::Arc;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec!["a", "b"])),
            ],
        )
        .unwrap()
    }

    fn ty() -> Type {
        Type::structure([("id", Type::integer(i64::MIN, i64::MAX)), ("name", Type::text())])
    }

    #[test]
    fn memory_sources_are_checked() {
        let catalog = SourceCatalog::new().with("users", vec![batch()]);
        assert_eq!(catalog.load("memory://users", &ty(), 10).unwrap().len(), 1);

        let wrong = Type::structure([("id", Type::text())]);
        assert!(catalog.load("memory://users", &wrong, 10).is_err());
        assert!(catalog.load("memory://nope", &ty(), 10).is_err());
        assert!(catalog.load("s3://bucket/x", &ty(), 10).is_err());
    }

    #[test]
    fn csv_files_load_and_infer() {
        let dir = std::env::temp_dir().join(format!("specgraph-src-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("users.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "id,name\n1,a\n2,b\n3,c").unwrap();
        drop(f);

        let uri = format!("file://{}", path.display());
        let catalog = SourceCatalog::new();
        let batches = catalog.load(&uri, &ty(), 2).unwrap();
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 3);

        let inferred = catalog.infer_type(&uri).unwrap();
        assert_eq!(inferred.children().len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }
}
