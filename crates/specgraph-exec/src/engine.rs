//! Execution router.
//!
//! Turns a dataset node into a lazy stream of Arrow batches. Parents are
//! fetched from a [`ReferrableStore`] by id and evaluated through the same
//! router. `filter`, `project` and `get_item` stream batch by batch; `sample`,
//! `slice`, `extract`, `shuffle` and `select_sql` drain their parent on the
//! first pull. Every result is re-chunked to the requested batch size.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use futures::future::BoxFuture;
use futures::{FutureExt, TryStreamExt};

use specgraph_core::prelude::{
    DataSpec, DataSpecId, DataSpecKind, EngineConfig, Error, Origin, ReferrableStore, Schema,
    Transform, TransformKind,
};
use specgraph_operators::convert::to_arrow_schema;
use specgraph_operators::select_sql::select_sql;
use specgraph_operators::{
    collect_table, deferred, rechunk, vec_stream, BatchOperator, BatchStream, Extract, Filter,
    GetItem, MemorySql, Project, Rebatch, Sample, Shuffle, Slice, SqlExecutor, TableOperator,
};
use specgraph_planner::schema::{propagate, schema_from_table, Propagation};

use crate::error::Result;
use crate::external::{ExternalCall, ExternalRegistry, ExternalValue};
use crate::metrics::{count_rows, emit_span};
use crate::sources::SourceCatalog;

/// Evaluates graph nodes. Cheap to share behind an `Arc`.
pub struct Engine {
    cfg: EngineConfig,
    store: Arc<dyn ReferrableStore>,
    sources: SourceCatalog,
    externals: ExternalRegistry,
    sql: Arc<dyn SqlExecutor>,
    schemas: Mutex<HashMap<DataSpecId, Schema>>,
}

impl Engine {
    pub fn new(cfg: EngineConfig, store: impl ReferrableStore + 'static) -> Self {
        Self {
            cfg,
            store: Arc::new(store),
            sources: SourceCatalog::new(),
            externals: ExternalRegistry::new(),
            sql: Arc::new(MemorySql),
            schemas: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_sources(mut self, sources: SourceCatalog) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_externals(mut self, externals: ExternalRegistry) -> Self {
        self.externals = externals;
        self
    }

    pub fn with_sql(mut self, sql: impl SqlExecutor + 'static) -> Self {
        self.sql = Arc::new(sql);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    fn node(&self, id: &DataSpecId) -> Result<&DataSpec> {
        self.store
            .referrable(id)
            .ok_or_else(|| Error::Invariant(format!("node {id} is not in the store")).into())
    }

    fn cached(&self, id: &DataSpecId) -> Option<Schema> {
        let schemas = self.schemas.lock().unwrap_or_else(|p| p.into_inner());
        schemas.get(id).cloned()
    }

    /// The single dataset parent a standard transform reads from.
    fn dataset_parent(&self, spec: &DataSpec) -> Result<DataSpecId> {
        let Origin::Transformed {
            arguments,
            named_arguments,
            ..
        } = &spec.origin
        else {
            return Err(Error::Invariant(format!("'{}' is not a transformed node", spec.name)).into());
        };
        let parent = match (arguments.as_slice(), named_arguments.is_empty()) {
            ([parent], true) => *parent,
            _ => {
                return Err(Error::Invariant(format!(
                    "'{}' has {} parents, expected exactly one",
                    spec.name,
                    arguments.len() + named_arguments.len()
                ))
                .into())
            }
        };
        if !self.node(&parent)?.is_dataset() {
            return Err(Error::Invariant(format!("parent of '{}' is a scalar", spec.name)).into());
        }
        Ok(parent)
    }

    /// Schema of a dataset node. Computed from the parent's schema where
    /// possible; `select_sql` and external ops run to type their output.
    pub fn schema<'a>(&'a self, id: &'a DataSpecId) -> BoxFuture<'a, Result<Schema>> {
        async move {
            if let Some(schema) = self.cached(id) {
                return Ok(schema);
            }
            let spec = self.node(id)?;
            let schema = match &spec.origin {
                Origin::Source { schema, .. } => schema.clone(),
                Origin::Value { .. } => {
                    return Err(Error::Invariant(format!("'{}' is a scalar and has no schema", spec.name)).into())
                }
                Origin::Transformed { transform, .. } if transform.is_external() => {
                    let table = self.external_output(spec, transform).await?.into_table(&transform.name)?;
                    schema_from_table(&spec.name, Some(&table))?
                }
                Origin::Transformed { transform, .. } => {
                    let parent = self.dataset_parent(spec)?;
                    let parent_schema = self.schema(&parent).await?;
                    match propagate(&spec.name, &parent_schema, transform)? {
                        Propagation::Ready(schema) => schema,
                        Propagation::FromSql { query } => {
                            let parent_name = self.node(&parent)?.name.clone();
                            let input = self.to_arrow(&parent, self.cfg.batch_size).await?;
                            let rows = self.sql_stream(&parent_name, input, &query, self.cfg.batch_size);
                            let table = collect_table(rows).await?;
                            schema_from_table(&spec.name, table.as_ref())?
                        }
                        Propagation::FromExternal => {
                            return Err(Error::Invariant(format!(
                                "'{}' needs an external op but its transform is '{}'",
                                spec.name,
                                transform.spec_name()
                            ))
                            .into())
                        }
                    }
                }
            };
            self.schemas
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .insert(*id, schema.clone());
            Ok(schema)
        }
        .boxed()
    }

    /// Batches of any dataset node, in chunks of `batch_size` rows.
    pub fn to_arrow<'a>(&'a self, id: &'a DataSpecId, batch_size: usize) -> BoxFuture<'a, Result<BatchStream>> {
        async move {
            if batch_size == 0 {
                return Err(Error::InvalidInput("batch_size must be positive".into()).into());
            }
            let spec = self.node(id)?;
            match &spec.origin {
                Origin::Source { uri, schema } => {
                    let batches = self.sources.load(uri, &schema.ty, batch_size)?;
                    Ok(Rebatch::boxed(vec_stream(batches), batch_size))
                }
                Origin::Value { .. } => Err(Error::Invariant(format!(
                    "'{}' is a scalar, not a dataset",
                    spec.name
                ))
                .into()),
                Origin::Transformed { .. } => self.transformed_dataset_arrow(id, batch_size).await,
            }
        }
        .boxed()
    }

    /// Batches of a transformed dataset.
    pub fn transformed_dataset_arrow<'a>(
        &'a self,
        id: &'a DataSpecId,
        batch_size: usize,
    ) -> BoxFuture<'a, Result<BatchStream>> {
        async move {
            if batch_size == 0 {
                return Err(Error::InvalidInput("batch_size must be positive".into()).into());
            }
            let spec = self.node(id)?;
            let transform = spec
                .transform()
                .ok_or_else(|| Error::Invariant(format!("'{}' is not a transformed node", spec.name)))?;
            if spec.kind != DataSpecKind::Dataset {
                return Err(Error::Invariant(format!("'{}' is a scalar, not a dataset", spec.name)).into());
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(node = %id.short(), dataset = %spec.name, transform = transform.spec_name(), batch_size, "dispatch");
            emit_span(
                "dispatch",
                &[
                    ("node", id.short()),
                    ("transform", transform.spec_name().to_string()),
                    ("batch_size", batch_size.to_string()),
                ],
            );

            if transform.is_external() {
                let table = self.external_output(spec, transform).await?.into_table(&transform.name)?;
                return Ok(count_rows(transform.spec_name(), vec_stream(rechunk(&table, batch_size)?)));
            }

            let parent = self.dataset_parent(spec)?;
            let stream = match &transform.spec {
                TransformKind::Filter { filter } => {
                    let wrapped = self.schema(&parent).await?.has_data_wrapper();
                    let op = Filter {
                        filter: filter.clone(),
                        wrapped,
                    };
                    Rebatch::boxed(op.stream(self.to_arrow(&parent, batch_size).await?), batch_size)
                }
                TransformKind::Project { projection } => {
                    let wrapped = self.schema(&parent).await?.has_data_wrapper();
                    let op = Project {
                        projection: projection.clone(),
                        wrapped,
                    };
                    Rebatch::boxed(op.stream(self.to_arrow(&parent, batch_size).await?), batch_size)
                }
                TransformKind::GetItem { path } => {
                    let parent_schema = self.schema(&parent).await?;
                    let op = GetItem {
                        path: path.clone(),
                        parent: parent_schema.data_type().clone(),
                        wrapped: parent_schema.has_data_wrapper(),
                    };
                    Rebatch::boxed(op.stream(self.to_arrow(&parent, batch_size).await?), batch_size)
                }
                TransformKind::Sample { size } => {
                    let op = Sample {
                        size: *size,
                        seed: self.cfg.seed,
                    };
                    self.table_op(op, &parent, batch_size).await?
                }
                TransformKind::Slice { start, end } => {
                    let op = Slice {
                        start: *start,
                        end: *end,
                    };
                    self.table_op(op, &parent, batch_size).await?
                }
                TransformKind::Extract { size, seed } => {
                    let op = Extract {
                        size: *size,
                        seed: *seed,
                    };
                    self.table_op(op, &parent, batch_size).await?
                }
                TransformKind::Shuffle => {
                    let op = Shuffle { seed: self.cfg.seed };
                    self.table_op(op, &parent, batch_size).await?
                }
                TransformKind::SelectSql { query } => {
                    let parent_name = self.node(&parent)?.name.clone();
                    let input = self.to_arrow(&parent, batch_size).await?;
                    self.sql_stream(&parent_name, input, query, batch_size)
                }
                TransformKind::DifferentiatedSample { .. }
                | TransformKind::Composed { .. }
                | TransformKind::Variable { .. }
                | TransformKind::External { .. } => {
                    return Err(Error::Unsupported(format!(
                        "no arrow evaluation for '{}' transforms",
                        transform.spec_name()
                    ))
                    .into())
                }
            };
            Ok(count_rows(transform.spec_name(), stream))
        }
        .boxed()
    }

    async fn table_op<O>(&self, op: O, parent: &DataSpecId, batch_size: usize) -> Result<BatchStream>
    where
        O: TableOperator + 'static,
    {
        op.validate()?;
        let input = self.to_arrow(parent, batch_size).await?;
        Ok(op.stream(input, batch_size))
    }

    fn sql_stream(&self, parent_name: &str, input: BatchStream, query: &str, batch_size: usize) -> BatchStream {
        let sql = Arc::clone(&self.sql);
        let names = vec![self.cfg.sql_table.clone(), parent_name.to_string()];
        let query = query.to_string();
        deferred(async move {
            let table = collect_table(input).await?;
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let result = select_sql(sql.as_ref(), &names, table.as_ref(), &query)?;
            rechunk(&result, batch_size)
        })
    }

    /// Whole dataset or scalar, as an external op receives it.
    fn materialize<'a>(&'a self, id: &'a DataSpecId) -> BoxFuture<'a, Result<ExternalValue>> {
        async move {
            if self.node(id)?.is_dataset() {
                let batches = self.collect(id).await?;
                let table = match batches.first() {
                    Some(first) => concat_batches(&first.schema(), &batches)
                        .map_err(specgraph_operators::OpError::from)?,
                    None => RecordBatch::new_empty(to_arrow_schema(&self.schema(id).await?.ty)?),
                };
                Ok(ExternalValue::Table(table))
            } else {
                Ok(ExternalValue::Value(self.value(id).await?))
            }
        }
        .boxed()
    }

    fn external_output<'a>(
        &'a self,
        spec: &'a DataSpec,
        transform: &'a Transform,
    ) -> BoxFuture<'a, Result<ExternalValue>> {
        async move {
            let TransformKind::External {
                library,
                op,
                arguments,
                ..
            } = &transform.spec
            else {
                return Err(Error::Invariant(format!("'{}' is not an external op", spec.name)).into());
            };
            let Origin::Transformed {
                arguments: parents,
                named_arguments,
                ..
            } = &spec.origin
            else {
                return Err(Error::Invariant(format!("'{}' is not a transformed node", spec.name)).into());
            };
            let handler = self.externals.get(library, op)?;

            let mut call = ExternalCall {
                arguments: arguments.clone(),
                ..Default::default()
            };
            for parent in parents {
                call.parents.push(self.materialize(parent).await?);
            }
            for (name, parent) in named_arguments {
                call.named.insert(name.clone(), self.materialize(parent).await?);
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(op = %format!("{library}.{op}"), parents = call.parents.len(), "external call");
            let out = handler.call(call)?;
            emit_span(
                "external",
                &[("op", format!("{library}.{op}")), ("result", out.kind().to_string())],
            );
            Ok(out)
        }
        .boxed()
    }

    /// Every batch of a dataset at the configured batch size.
    pub async fn collect(&self, id: &DataSpecId) -> Result<Vec<RecordBatch>> {
        let stream = self.to_arrow(id, self.cfg.batch_size).await?;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        Ok(batches)
    }

    /// Value of a scalar node.
    pub fn value<'a>(&'a self, id: &'a DataSpecId) -> BoxFuture<'a, Result<serde_json::Value>> {
        async move {
            let spec = self.node(id)?;
            if spec.is_dataset() {
                return Err(Error::Invariant(format!("'{}' is a dataset, not a scalar", spec.name)).into());
            }
            match &spec.origin {
                Origin::Value { value } => Ok(value.clone()),
                Origin::Transformed { transform, .. } if transform.is_external() => {
                    self.external_output(spec, transform).await?.into_value(&transform.name)
                }
                _ => Err(Error::Unsupported(format!("value of scalar '{}'", spec.name)).into()),
            }
        }
        .boxed()
    }
}
