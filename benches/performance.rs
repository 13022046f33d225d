use std::sync::Arc;

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use criterion::{criterion_group, criterion_main, Criterion};
use specgraph_core::prelude::{IdBase, Type};
use specgraph_operators::{rechunk, BatchOperator, Filter};

fn make_batch(rows: usize) -> RecordBatch {
    let schema = Arc::new(ArrowSchema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("age", DataType::Int64, true),
        Field::new("city", DataType::Utf8, false),
    ]));
    let cities = ["paris", "london", "rome", "oslo"];
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from_iter_values(0..rows as i64)),
            Arc::new(Int64Array::from_iter(
                (0..rows).map(|i| if i % 13 == 0 { None } else { Some((i % 90) as i64) }),
            )),
            Arc::new(StringArray::from_iter_values(
                (0..rows).map(|i| cities[i % cities.len()]),
            )),
        ],
    )
    .unwrap()
}

fn bench_filter(c: &mut Criterion) {
    let batch = make_batch(8192);
    let filter = Filter {
        filter: Type::structure([
            ("id", Type::id(true, IdBase::Int64, None)),
            ("age", Type::optional(Type::integer(18, 65))),
            ("city", Type::enumeration("city", ["paris", "rome"], false)),
        ]),
        wrapped: false,
    };
    c.bench_function("filter_8k_rows", |b| {
        b.iter(|| {
            let _ = filter.eval_batch(&batch).unwrap();
        })
    });
}

fn bench_rechunk(c: &mut Criterion) {
    let batch = make_batch(100_000);
    c.bench_function("rechunk_100k_by_1k", |b| {
        b.iter(|| {
            let _ = rechunk(&batch, 1_000).unwrap();
        })
    });
}

criterion_group!(benches, bench_filter, bench_rechunk);
criterion_main!(benches);
