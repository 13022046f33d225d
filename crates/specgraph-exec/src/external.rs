//! External-op adapter contract and a registry keyed by `library.op`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arrow::record_batch::RecordBatch;

use specgraph_core::prelude::Error;

use crate::error::{ExecError, Result};

/// What an external op consumes and returns: a table or a plain value.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalValue {
    Table(RecordBatch),
    Value(serde_json::Value),
}

impl ExternalValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ExternalValue::Table(_) => "table",
            ExternalValue::Value(_) => "value",
        }
    }

    /// The table, or `WrongShape` naming `op`.
    pub fn into_table(self, op: &str) -> Result<RecordBatch> {
        match self {
            ExternalValue::Table(t) => Ok(t),
            ExternalValue::Value(v) => Err(Error::WrongShape(format!(
                "external op '{op}' returned a value ({v}) where a table was expected"
            ))
            .into()),
        }
    }

    pub fn into_value(self, op: &str) -> Result<serde_json::Value> {
        match self {
            ExternalValue::Value(v) => Ok(v),
            ExternalValue::Table(_) => Err(Error::WrongShape(format!(
                "external op '{op}' returned a table where a value was expected"
            ))
            .into()),
        }
    }
}

/// Materialised inputs of one external call.
#[derive(Debug, Clone, Default)]
pub struct ExternalCall {
    pub arguments: serde_json::Value,
    pub parents: Vec<ExternalValue>,
    pub named: BTreeMap<String, ExternalValue>,
}

pub trait ExternalOps: Send + Sync {
    fn call(&self, call: ExternalCall) -> Result<ExternalValue>;
}

impl<F> ExternalOps for F
where
    F: Fn(ExternalCall) -> Result<ExternalValue> + Send + Sync,
{
    fn call(&self, call: ExternalCall) -> Result<ExternalValue> {
        self(call)
    }
}

#[derive(Clone, Default)]
pub struct ExternalRegistry {
    ops: HashMap<String, Arc<dyn ExternalOps>>,
}

impl ExternalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `op` under `"library.op"`.
    pub fn register(&mut self, id: impl Into<String>, op: impl ExternalOps + 'static) {
        self.ops.insert(id.into(), Arc::new(op));
    }

    pub fn with(mut self, id: impl Into<String>, op: impl ExternalOps + 'static) -> Self {
        self.register(id, op);
        self
    }

    pub fn get(&self, library: &str, op: &str) -> Result<Arc<dyn ExternalOps>> {
        let id = format!("{library}.{op}");
        self.ops.get(&id).cloned().ok_or_else(|| ExecError::External {
            op: id,
            msg: "not registered".into(),
        })
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.ops.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for ExternalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalRegistry").field("ops", &self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_looks_up_by_library_and_op() {
        let reg = ExternalRegistry::new().with("math.answer", |_call: ExternalCall| -> Result<ExternalValue> {
            Ok(ExternalValue::Value(serde_json::json!(42)))
        });
        let op = reg.get("math", "answer").unwrap();
        let out = op.call(ExternalCall::default()).unwrap();
        assert_eq!(out.into_value("math.answer").unwrap(), serde_json::json!(42));
        assert!(matches!(
            reg.get("math", "nope"),
            Err(ExecError::External { .. })
        ));
    }

    #[test]
    fn value_where_table_expected_is_wrong_shape() {
        let err = ExternalValue::Value(serde_json::json!("x"))
            .into_table("lib.op")
            .unwrap_err();
        assert!(matches!(err.core(), Some(Error::WrongShape(_))));
    }
}
