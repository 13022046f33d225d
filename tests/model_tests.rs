//! Type, path, foreign-key and schema propagation tests


use specgraph_core::prelude::*;
use specgraph_planner::schema::{propagate, static_schema, Propagation};
use test_data_gen::{people_graph, people_type, scenario_type};

fn fk(labels: &[&str]) -> Type {
    Type::id(false, IdBase::Int64, Some(Path::from_labels(labels.iter().copied())))
}

/// Orders referencing customers, both under one struct.
fn shop() -> Type {
    Type::structure([
        (
            "customers",
            Type::structure([("key", Type::id(true, IdBase::Int64, None)), ("name", Type::text())]),
        ),
        (
            "orders",
            Type::structure([
                ("key", Type::id(true, IdBase::Int64, None)),
                ("customer", fk(&["customers", "key"])),
                ("amount", Type::float(0.0, 1e6)),
            ]),
        ),
    ])
}

fn ready(p: Propagation) -> Schema {
    match p {
        Propagation::Ready(s) => s,
        other => panic!("expected a ready schema, got {other:?}"),
    }
}

#[test]
fn test_update_fks_is_identity_on_consistent_types() {
    for ty in [shop(), people_type(), Type::text(), Type::list(people_type(), 10)] {
        assert_eq!(update_fks(&ty, &ty), ty);
    }
}

#[test]
fn test_update_fks_strips_dangling_references() {
    // The scenario's reference never resolves, so it is dropped.
    let ty = scenario_type();
    let fixed = update_fks(&ty, &ty);
    assert_eq!(
        fixed.child("id"),
        Some(&Type::id(false, IdBase::Int64, None))
    );

    // Projecting away the referenced table drops the reference too.
    let only_orders = shop().select(&"orders".parse().unwrap()).unwrap();
    let fixed = update_fks(&only_orders, &shop());
    let customer = fixed.get(&"orders.customer".parse().unwrap()).unwrap();
    assert_eq!(customer, &Type::id(false, IdBase::Int64, None));
    assert!(foreign_keys(&fixed).is_empty());
}

#[test]
fn test_foreign_keys_lists_locations() {
    let fks = foreign_keys(&shop());
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].0.to_string(), "orders.customer");
    assert_eq!(fks[0].1.to_string(), "customers.key");
}

#[test]
fn test_paths_parse_and_branch() {
    let p: Path = "orders.customer".parse().unwrap();
    assert_eq!(p.labels().unwrap(), vec!["orders", "customer"]);
    assert!("orders..customer".parse::<Path>().is_err());

    let branching = Path::with_sub_paths(
        "",
        vec![Path::new("customers"), Path::new("orders")],
    );
    assert!(branching.is_branching());
    assert!(matches!(branching.labels(), Err(Error::AmbiguousPath(_))));
    assert_eq!(shop().sub_types(&branching).unwrap().len(), 2);
    assert!(matches!(shop().get(&branching), Err(Error::AmbiguousPath(_))));
}

#[test]
fn test_get_reports_missing_path() {
    let err = shop().get(&"orders.nope".parse().unwrap()).unwrap_err();
    assert!(matches!(err, Error::PathNotFound { .. }));
}

#[test]
fn test_get_item_schema_matches_type_get() {
    let parent = Schema::new("shop", shop());
    for dotted in ["orders", "orders.amount", "customers.name"] {
        let path: Path = dotted.parse().unwrap();
        let schema = ready(propagate("item", &parent, &Transform::get_item(path.clone())).unwrap());
        assert_eq!(&schema.ty, shop().get(&path).unwrap(), "path {dotted}");
    }
}

#[test]
fn test_get_item_needs_a_unique_subtype() {
    let parent = Schema::new("shop", shop());
    let branching = Path::with_sub_paths("", vec![Path::new("customers"), Path::new("orders")]);
    let err = propagate("item", &parent, &Transform::get_item(branching)).unwrap_err();
    assert!(matches!(err, Error::Invariant(_)));
}

#[test]
fn test_row_transforms_keep_the_schema() {
    let (graph, _, _) = people_graph(10);
    let parent = static_schema(&graph, &graph.find("people").unwrap()).unwrap();
    let transforms = [
        Transform::shuffle(),
        Transform::sample(SampleSize::Size(3)),
        Transform::differentiated_sample(SampleSize::Fraction(0.5)),
        Transform::slice(0, 2),
        Transform::extract(5, None),
    ];
    for t in transforms {
        let schema = ready(propagate("out", &parent, &t).unwrap());
        assert_eq!(schema.ty, parent.ty, "{}", t.spec_name());
        assert_eq!(schema.properties, parent.properties);
        assert_eq!(schema.name, "out");
    }
}

#[test]
fn test_project_filters_primary_keys() {
    let (graph, people, _) = people_graph(10);
    let parent = static_schema(&graph, &people).unwrap();
    assert_eq!(parent.primary_keys().unwrap().len(), 1);

    let without_id = people_type().select(&Path::with_sub_paths("", vec![Path::new("name")])).unwrap();
    let schema = ready(propagate("names", &parent, &Transform::project(without_id)).unwrap());
    assert!(schema.primary_keys().unwrap().is_empty());

    let with_id = people_type()
        .select(&Path::with_sub_paths("", vec![Path::new("id"), Path::new("name")]))
        .unwrap();
    let schema = ready(propagate("ids", &parent, &Transform::project(with_id)).unwrap());
    assert_eq!(schema.primary_keys().unwrap(), vec![Path::from_labels(["id"])]);
}

#[test]
fn test_scenario_projection() {
    let parent = Schema::new("scenario", scenario_type());

    let names = Type::structure([("name", Type::text())]);
    let schema = ready(propagate("names", &parent, &Transform::project(names.clone())).unwrap());
    assert_eq!(schema.ty, names);
    assert!(schema.ty.child("id").is_none());

    let ids = Type::structure([("id", scenario_type().child("id").unwrap().clone())]);
    let schema = ready(propagate("ids", &parent, &Transform::project(ids)).unwrap());
    assert_eq!(schema.ty.child("id"), Some(&Type::id(false, IdBase::Int64, None)));
}

#[test]
fn test_filter_rewraps_protected_payloads() {
    let parent = Schema::protected(
        "protected",
        shop(),
        vec![("weight".to_string(), Type::float(0.0, 1.0))],
    );
    assert!(parent.has_data_wrapper());

    let target = shop().select(&"orders".parse().unwrap()).unwrap();
    let schema = ready(propagate("f", &parent, &Transform::filter(target.clone())).unwrap());
    assert!(schema.has_data_wrapper());
    assert!(schema.ty.child("weight").is_some());
    let payload = schema.data_type();
    assert!(payload.child("customers").is_none());
    assert_eq!(
        payload.get(&"orders.customer".parse().unwrap()).unwrap(),
        &Type::id(false, IdBase::Int64, None)
    );
}

#[test]
fn test_data_dependent_kinds_defer() {
    let parent = Schema::new("scenario", scenario_type());
    let p = propagate("q", &parent, &Transform::select_sql("SELECT name FROM self")).unwrap();
    assert!(matches!(p, Propagation::FromSql { .. }));

    let ext = Transform::external("lib.op", serde_json::Value::Null, DataSpecKind::Dataset).unwrap();
    assert_eq!(propagate("e", &parent, &ext).unwrap(), Propagation::FromExternal);

    let var = Transform::variable(Position::Index(0));
    assert!(matches!(propagate("v", &parent, &var), Err(Error::Unsupported(_))));
}

#[test]
fn test_composed_transforms_expand_into_chains() {
    let (mut graph, people, _) = people_graph(10);
    let chain = Transform::composed(
        Transform::slice(0, 5),
        vec![Transform::composed(Transform::shuffle(), vec![Transform::variable(Position::Index(0))], Default::default())],
        Default::default(),
    );
    assert_eq!(chain.variables(), vec![Position::Index(0)]);
    let out = graph.transformed(chain, &[people]).unwrap();
    let node = graph.get(&out).unwrap();
    assert_eq!(node.transform().unwrap().spec_name(), "slice");
    let parent = graph.parents(&out).unwrap()[0];
    assert_eq!(graph.get(&parent).unwrap().transform().unwrap().spec_name(), "shuffle");
    assert_eq!(graph.sources(&out).unwrap().into_iter().collect::<Vec<_>>(), vec![people]);
}

#[test]
fn test_graph_deduplicates_and_renders() {
    let (mut graph, people, _) = people_graph(10);
    let a = graph.transformed(Transform::shuffle(), &[people]).unwrap();
    let b = graph.transformed(Transform::shuffle(), &[people]).unwrap();
    assert_eq!(a, b);
    assert_eq!(graph.len(), 2);
    let dot = graph.dot();
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("shuffle"));
}
