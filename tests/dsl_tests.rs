//! YAML graph DSL tests


use specgraph_core::prelude::*;
use specgraph_exec::Engine;
use specgraph_planner::dsl::yaml::DslError;
use specgraph_planner::{parse_yaml_graph, parse_yaml_graph_with};
use test_data_gen::*;

const PEOPLE: &str = r#"
config:
  batch_size: 4
  seed: 11
datasets:
  - name: people
    source: "memory://people"
    fields:
      - { name: id, type: id, unique: true }
      - { name: name, type: text }
      - { name: age, type: integer, min: 0, max: 120, nullable: true }
      - { name: city, type: enum, values: [paris, london, rome] }
    primary_keys: [id]
  - name: adults
    from: people
    transform: { op: filter, bounds: { age: { min: 18, max: 65 } } }
  - name: parisians
    from: adults
    transform: { op: filter, bounds: { city: { values: [paris] } } }
  - name: names
    from: parisians
    transform: { op: project, columns: [name] }
  - name: few
    from: people
    transform: { op: sample, size: 6 }
  - name: window
    from: people
    transform: { op: slice, start: 5, end: 15 }
  - name: ages
    from: people
    transform: { op: get_item, path: age }
  - name: queried
    from: people
    transform: { op: select_sql, query: "SELECT name FROM self WHERE age > 40" }
"#;

fn engine_for(src: &str, rows: usize) -> (Engine, specgraph_planner::ParsedGraph) {
    let parsed = parse_yaml_graph(src).unwrap();
    let mut cfg = EngineConfig::default();
    parsed.config.apply_to(&mut cfg);
    let catalog = specgraph_exec::SourceCatalog::new().with("people", split(&people_batch(rows), 7));
    let engine = Engine::new(cfg, parsed.graph.clone()).with_sources(catalog);
    (engine, parsed)
}

#[test]
fn test_parse_people_graph() {
    let parsed = parse_yaml_graph(PEOPLE).unwrap();
    assert_eq!(parsed.datasets.len(), 8);
    assert_eq!(parsed.config.batch_size, Some(4));
    assert_eq!(parsed.config.seed, Some(11));
    assert_eq!(parsed.graph.len(), 8);

    let people = parsed.graph.get(&parsed.id("people").unwrap()).unwrap();
    assert_eq!(people.declared_schema().unwrap().ty, people_type());
}

#[tokio::test]
async fn test_people_graph_evaluates() {
    let (engine, parsed) = engine_for(PEOPLE, 50);
    assert_eq!(engine.config().batch_size, 4);

    let adults = engine.collect(&parsed.id("adults").unwrap()).await.unwrap();
    assert_eq!(total_rows(&adults), 33);

    let names = engine.collect(&parsed.id("names").unwrap()).await.unwrap();
    assert_eq!(total_rows(&names), 12);
    assert_eq!(names[0].num_columns(), 1);

    let schema = engine.schema(&parsed.id("names").unwrap()).await.unwrap();
    assert_eq!(schema.ty, Type::structure([("name", Type::text())]));
    assert!(schema.primary_keys().unwrap().is_empty());

    let few = engine.collect(&parsed.id("few").unwrap()).await.unwrap();
    assert_eq!(total_rows(&few), 6);

    let window = engine.collect(&parsed.id("window").unwrap()).await.unwrap();
    assert_eq!(int_column(&window, "id").first(), Some(&Some(5)));
    assert_eq!(total_rows(&window), 10);

    let ages = engine.collect(&parsed.id("ages").unwrap()).await.unwrap();
    assert_eq!(total_rows(&ages), 50);

    let queried = engine.collect(&parsed.id("queried").unwrap()).await.unwrap();
    assert_eq!(total_rows(&queried), 8);
}

#[test]
fn test_foreign_keys_from_yaml() {
    let src = r#"
datasets:
  - name: orders
    source: "memory://orders"
    fields:
      - { name: key, type: id, unique: true }
      - { name: customer, type: id, references: "customers.key" }
      - { name: amount, type: float, min: 0 }
  - name: amounts
    from: orders
    transform: { op: project, columns: [customer, amount] }
"#;
    let parsed = parse_yaml_graph(src).unwrap();
    let orders = parsed.graph.get(&parsed.id("orders").unwrap()).unwrap();
    let fks = orders.declared_schema().unwrap().foreign_keys();
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].1.to_string(), "customers.key");
}

#[test]
fn test_dsl_errors() {
    let dup = "datasets:\n  - { name: a, source: 'memory://a', fields: [{ name: x, type: text }] }\n  - { name: a, source: 'memory://a', fields: [{ name: x, type: text }] }\n";
    assert!(matches!(parse_yaml_graph(dup), Err(DslError::Duplicate(n)) if n == "a"));

    let bad_type = "datasets:\n  - { name: a, source: 'memory://a', fields: [{ name: x, type: decimal }] }\n";
    assert!(matches!(parse_yaml_graph(bad_type), Err(DslError::Invalid { .. })));

    let no_fields = "datasets:\n  - { name: a, source: 'memory://a' }\n";
    assert!(matches!(parse_yaml_graph(no_fields), Err(DslError::Invalid { .. })));

    let both = "datasets:\n  - { name: a, source: 'memory://a', fields: [{ name: x, type: integer }] }\n  - { name: b, from: a, transform: { op: sample, size: 2, fraction: 0.5 } }\n";
    assert!(matches!(parse_yaml_graph(both), Err(DslError::Invalid { .. })));

    let unknown_column = "datasets:\n  - { name: a, source: 'memory://a', fields: [{ name: x, type: integer }] }\n  - { name: b, from: a, transform: { op: filter, bounds: { y: { min: 1 } } } }\n";
    assert!(matches!(parse_yaml_graph(unknown_column), Err(DslError::Invalid { .. })));

    assert!(matches!(parse_yaml_graph("datasets: [1, 2"), Err(DslError::Yaml(_))));
}

#[test]
fn test_undeclared_sources_are_inferred() {
    let src = "datasets:\n  - { name: people, source: 'memory://people' }\n  - { name: names, from: people, transform: { op: project, columns: [name] } }\n";
    let catalog = specgraph_exec::SourceCatalog::new().with("people", vec![people_batch(10)]);
    let parsed = parse_yaml_graph_with(src, |name, uri| {
        catalog.infer_type(uri).map_err(|e| DslError::Invalid {
            name: name.to_string(),
            msg: e.to_string(),
        })
    })
    .unwrap();
    let people = parsed.graph.get(&parsed.id("people").unwrap()).unwrap();
    let ty = &people.declared_schema().unwrap().ty;
    assert_eq!(ty.children().len(), 4);
    assert!(ty.child("age").unwrap().is_optional());
}

#[tokio::test]
async fn test_csv_graph_end_to_end() {
    let dir = temp_dir("dsl-csv");
    let path = dir.join("scores.csv");
    let mut csv = String::from("id,score\n");
    for i in 0..20 {
        csv.push_str(&format!("{i},{}\n", i * 5));
    }
    std::fs::write(&path, csv).unwrap();

    let src = format!(
        r#"
config: {{ batch_size: 3 }}
datasets:
  - name: scores
    source: "file://{}"
    fields:
      - {{ name: id, type: id }}
      - {{ name: score, type: integer, min: 0, max: 100 }}
  - name: high
    from: scores
    transform: {{ op: filter, bounds: {{ score: {{ min: 50 }} }} }}
"#,
        path.display()
    );
    let parsed = parse_yaml_graph(&src).unwrap();
    let mut cfg = EngineConfig::default();
    parsed.config.apply_to(&mut cfg);
    let high = parsed.id("high").unwrap();
    let engine = Engine::new(cfg, parsed.graph);

    let out = engine.collect(&high).await.unwrap();
    assert_eq!(total_rows(&out), 10);
    assert!(out.iter().all(|b| b.num_rows() <= 3));
    std::fs::remove_dir_all(&dir).ok();
}
