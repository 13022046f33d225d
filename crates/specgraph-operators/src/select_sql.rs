//! `select_sql`: the SQL adapter contract plus a small in-memory adapter.
//!
//! The adapter receives the parent's rows and returns row objects; the
//! operator turns those back into Arrow. A query returning no rows cannot
//! be typed and is an error.

use std::sync::Arc;

use arrow::json::reader::infer_json_schema_from_iterator;
use arrow::json::{ArrayWriter, ReaderBuilder};
use arrow::record_batch::RecordBatch;
use serde_json::{Map, Value};
use specgraph_core::prelude::Error;

use crate::traits::OpError;

/// One result row, column name to value, in column order.
pub type Row = Map<String, Value>;

/// Executes a query against one bound table.
pub trait SqlExecutor: Send + Sync {
    /// `names` are the table names the query may use for `table`; `None`
    /// stands for a parent without rows.
    fn execute(&self, names: &[&str], table: Option<&RecordBatch>, query: &str) -> Result<Vec<Row>, OpError>;
}

/// Arrow rows as JSON objects. Nulls become explicit `null`s.
pub fn table_to_rows(table: &RecordBatch) -> Result<Vec<Row>, OpError> {
    if table.num_rows() == 0 {
        return Ok(Vec::new());
    }
    let mut writer = ArrayWriter::new(Vec::new());
    writer.write(table)?;
    writer.finish()?;
    let buf = writer.into_inner();
    let mut rows: Vec<Row> = serde_json::from_slice(&buf).map_err(|e| OpError::Sql(e.to_string()))?;

    let schema = table.schema();
    for row in rows.iter_mut() {
        if row.len() == schema.fields().len() {
            continue;
        }
        let mut full = Map::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let v = row.remove(field.name()).unwrap_or(Value::Null);
            full.insert(field.name().clone(), v);
        }
        *row = full;
    }
    Ok(rows)
}

/// Build one table from row objects, inferring column types.
pub fn rows_to_table(rows: &[Row]) -> Result<RecordBatch, OpError> {
    if rows.is_empty() {
        return Err(Error::EmptyResult("query returned no rows".into()).into());
    }
    let schema = infer_json_schema_from_iterator(rows.iter().map(|r| Ok(Value::Object(r.clone()))))?;
    let mut decoder = ReaderBuilder::new(Arc::new(schema))
        .with_batch_size(rows.len())
        .build_decoder()?;
    decoder.serialize(rows)?;
    decoder
        .flush()?
        .ok_or_else(|| Error::EmptyResult("query returned no rows".into()).into())
}

/// Run `query` through `executor` and type the result.
pub fn select_sql(
    executor: &dyn SqlExecutor,
    names: &[&str],
    table: Option<&RecordBatch>,
    query: &str,
) -> Result<RecordBatch, OpError> {
    let rows = executor.execute(names, table, query)?;
    if rows.is_empty() {
        return Err(Error::EmptyResult(format!("query returned no rows: {query}")).into());
    }
    rows_to_table(&rows)
}

/// In-memory adapter for `SELECT <*|cols> FROM <table> [WHERE c op v [AND ...]] [LIMIT n]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemorySql;

#[derive(Debug, PartialEq)]
struct Query {
    columns: Option<Vec<String>>,
    table: String,
    predicates: Vec<(String, String, String)>,
    limit: Option<usize>,
}

fn find_keyword(upper: &str, keyword: &str) -> Option<usize> {
    upper.find(&format!(" {keyword} "))
}

fn parse_query(query: &str) -> Result<Query, OpError> {
    let q = query.trim().trim_end_matches(';').trim();
    let upper = q.to_ascii_uppercase();
    if !upper.starts_with("SELECT ") {
        return Err(OpError::Sql(format!("only SELECT is supported: {q}")));
    }
    let from = find_keyword(&upper, "FROM")
        .ok_or_else(|| OpError::Sql(format!("missing FROM: {q}")))?;
    let cols = q["SELECT ".len()..from].trim();
    let columns = if cols == "*" {
        None
    } else {
        Some(cols.split(',').map(|c| c.trim().to_string()).collect::<Vec<_>>())
    };

    let after_from = from + " FROM ".len();
    let where_at = find_keyword(&upper, "WHERE").filter(|&p| p > from);
    let limit_at = find_keyword(&upper, "LIMIT").filter(|&p| p > from);
    let table_end = where_at.or(limit_at).unwrap_or(q.len());
    let table = q[after_from..table_end.max(after_from)].trim().to_string();
    if table.is_empty() || table.contains(char::is_whitespace) {
        return Err(OpError::Sql(format!("malformed FROM clause: {q}")));
    }

    let mut predicates = Vec::new();
    if let Some(w) = where_at {
        let start = w + " WHERE ".len();
        let end = limit_at.unwrap_or(q.len());
        let clause = &q[start..end.max(start)];
        let clause_upper = clause.to_ascii_uppercase();
        let mut offset = 0;
        while let Some(pos) = clause_upper[offset..].find(" AND ") {
            predicates.push(parse_simple_predicate(&clause[offset..offset + pos])?);
            offset += pos + " AND ".len();
        }
        predicates.push(parse_simple_predicate(&clause[offset..])?);
    }

    let limit = match limit_at {
        Some(l) => Some(
            q[l + " LIMIT ".len()..]
                .trim()
                .parse::<usize>()
                .map_err(|e| OpError::Sql(format!("bad LIMIT: {e}")))?,
        ),
        None => None,
    };

    Ok(Query {
        columns,
        table,
        predicates,
        limit,
    })
}

/// Parse a simple predicate like "age > 18" or "name == 'Alice'".
fn parse_simple_predicate(expr: &str) -> Result<(String, String, String), OpError> {
    let ops = ["==", "!=", "<>", "<=", ">=", "=", "<", ">"];

    for op in &ops {
        if let Some(pos) = expr.find(op) {
            let col = expr[..pos].trim().to_string();
            let lit = expr[pos + op.len()..].trim();
            let lit = lit
                .strip_prefix('\'')
                .and_then(|l| l.strip_suffix('\''))
                .unwrap_or(lit)
                .to_string();
            let op = match *op {
                "=" => "==",
                "<>" => "!=",
                other => other,
            };
            return Ok((col, op.to_string(), lit));
        }
    }

    Err(OpError::Sql(format!("unparseable predicate: {}", expr)))
}

/// Evaluate a simple comparison predicate
fn eval_predicate(val: &Value, op: &str, literal: &str) -> Result<bool, OpError> {
    match val {
        Value::Null => Ok(false), // Null comparisons are false
        Value::Bool(b) => {
            let lit_bool = literal
                .parse::<bool>()
                .map_err(|_| OpError::Sql(format!("cannot parse '{}' as bool", literal)))?;
            match op {
                "==" => Ok(*b == lit_bool),
                "!=" => Ok(*b != lit_bool),
                _ => Err(OpError::Sql(format!("unsupported op '{}' for bool", op))),
            }
        }
        Value::Number(n) => {
            let v = n.as_f64().unwrap_or(f64::NAN);
            let lit = literal
                .parse::<f64>()
                .map_err(|_| OpError::Sql(format!("cannot parse '{}' as a number", literal)))?;
            Ok(match op {
                "==" => v == lit,
                "!=" => v != lit,
                "<" => v < lit,
                "<=" => v <= lit,
                ">" => v > lit,
                ">=" => v >= lit,
                _ => return Err(OpError::Sql(format!("unknown op: {}", op))),
            })
        }
        Value::String(s) => Ok(match op {
            "==" => s == literal,
            "!=" => s != literal,
            "<" => s.as_str() < literal,
            "<=" => s.as_str() <= literal,
            ">" => s.as_str() > literal,
            ">=" => s.as_str() >= literal,
            _ => return Err(OpError::Sql(format!("unknown op: {}", op))),
        }),
        _ => Err(OpError::Sql("cannot compare nested values".into())),
    }
}

impl SqlExecutor for MemorySql {
    fn execute(&self, names: &[&str], table: Option<&RecordBatch>, query: &str) -> Result<Vec<Row>, OpError> {
        let query = parse_query(query)?;
        if !names.iter().any(|n| *n == query.table) {
            return Err(OpError::Sql(format!("unknown table '{}'", query.table)));
        }
        let Some(table) = table else {
            return Ok(Vec::new());
        };

        let schema = table.schema();
        let known = |c: &str| schema.fields().iter().any(|f| f.name() == c);
        for c in query
            .columns
            .iter()
            .flatten()
            .chain(query.predicates.iter().map(|(c, _, _)| c))
        {
            if !known(c) {
                return Err(OpError::Sql(format!("unknown column '{c}'")));
            }
        }

        let mut out = Vec::new();
        for row in table_to_rows(table)? {
            let mut keep = true;
            for (col, op, lit) in &query.predicates {
                if !eval_predicate(row.get(col).unwrap_or(&Value::Null), op, lit)? {
                    keep = false;
                    break;
                }
            }
            if !keep {
                continue;
            }
            let projected = match &query.columns {
                None => row,
                Some(cols) => cols
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                    .collect(),
            };
            out.push(projected);
            if query.limit.map(|l| out.len() >= l).unwrap_or(false) {
                break;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    fn table() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn parses_where_and_limit() {
        let q = parse_query("select name from self where id >= 2 and name != 'c' limit 5;").unwrap();
        assert_eq!(q.columns, Some(vec!["name".to_string()]));
        assert_eq!(q.table, "self");
        assert_eq!(q.predicates.len(), 2);
        assert_eq!(q.predicates[1], ("name".into(), "!=".into(), "c".into()));
        assert_eq!(q.limit, Some(5));
    }

    #[test]
    fn memory_sql_filters_and_projects() {
        let t = table();
        let rows = MemorySql
            .execute(&["self"], Some(&t), "SELECT name FROM self WHERE id > 1")
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], Value::String("b".into()));

        let out = rows_to_table(&rows).unwrap();
        assert_eq!(out.num_columns(), 1);
        assert_eq!(out.num_rows(), 2);
    }

    #[test]
    fn empty_result_cannot_be_typed() {
        let t = table();
        let err = select_sql(&MemorySql, &["self"], Some(&t), "SELECT * FROM self WHERE id > 10").unwrap_err();
        assert!(matches!(err.core(), Some(Error::EmptyResult(_))));
    }

    #[test]
    fn unknown_table_is_rejected() {
        let t = table();
        assert!(MemorySql.execute(&["self"], Some(&t), "SELECT * FROM other").is_err());
    }
}
