//! Arena of graph nodes.
//!
//! Nodes refer to their parents by `DataSpecId`; the arena owns every node
//! and parent links are plain lookups. Inserting a node equal to an existing
//! one returns the existing id.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

use crate::dataspec::{DataSpec, DataSpecKind, Origin};
use crate::error::{Error, Result};
use crate::id::DataSpecId;
use crate::schema::Schema;
use crate::transform::{Position, Transform, TransformKind};

/// Lookup of nodes by id.
pub trait ReferrableStore: Send + Sync {
    fn referrable(&self, id: &DataSpecId) -> Option<&DataSpec>;
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: HashMap<DataSpecId, DataSpec>,
    order: Vec<DataSpecId>,
}

impl ReferrableStore for Graph {
    fn referrable(&self, id: &DataSpecId) -> Option<&DataSpec> {
        self.nodes.get(id)
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in insertion order (parents before children).
    pub fn ids(&self) -> impl Iterator<Item = &DataSpecId> {
        self.order.iter()
    }

    /// Insert a raw node. Parents must already be present.
    pub fn insert(&mut self, spec: DataSpec) -> Result<DataSpecId> {
        for parent in spec.parent_ids() {
            if !self.nodes.contains_key(&parent) {
                return Err(Error::Invariant(format!(
                    "node '{}' refers to unknown parent {parent}",
                    spec.name
                )));
            }
        }
        let id = spec.id()?;
        if !self.nodes.contains_key(&id) {
            self.nodes.insert(id, spec);
            self.order.push(id);
        }
        Ok(id)
    }

    pub fn source_dataset(
        &mut self,
        name: impl Into<String>,
        uri: impl Into<String>,
        schema: Schema,
    ) -> Result<DataSpecId> {
        self.insert(DataSpec::new(
            name,
            DataSpecKind::Dataset,
            Origin::Source {
                uri: uri.into(),
                schema,
            },
        ))
    }

    pub fn source_scalar(
        &mut self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<DataSpecId> {
        self.insert(DataSpec::new(
            name,
            DataSpecKind::Scalar,
            Origin::Value { value },
        ))
    }

    /// Apply `transform` to positional parents; the node is named after the transform.
    pub fn transformed(&mut self, transform: Transform, arguments: &[DataSpecId]) -> Result<DataSpecId> {
        let name = transform.name.clone();
        self.transformed_named(name, transform, arguments, BTreeMap::new())
    }

    /// Build a transformed node.
    ///
    /// Standard transforms take exactly one dataset parent. Composed
    /// transforms are expanded with [`Graph::apply`]; variables cannot be
    /// turned into nodes.
    pub fn transformed_named(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        arguments: &[DataSpecId],
        named_arguments: BTreeMap<String, DataSpecId>,
    ) -> Result<DataSpecId> {
        let kind = match &transform.spec {
            TransformKind::External { returns, .. } => *returns,
            TransformKind::Composed { .. } => {
                return self.apply(&transform, arguments, &named_arguments)
            }
            TransformKind::Variable { .. } => {
                return Err(Error::InvalidInput(
                    "a variable transform cannot produce a node".into(),
                ))
            }
            _ => {
                if arguments.len() != 1 || !named_arguments.is_empty() {
                    return Err(Error::Invariant(format!(
                        "{} expects exactly one parent, got {}",
                        transform.spec_name(),
                        arguments.len() + named_arguments.len()
                    )));
                }
                let parent = self.get(&arguments[0])?;
                if !parent.is_dataset() {
                    return Err(Error::Invariant(format!(
                        "{} expects a dataset parent, '{}' is a scalar",
                        transform.spec_name(),
                        parent.name
                    )));
                }
                DataSpecKind::Dataset
            }
        };
        self.insert(DataSpec::new(
            name,
            kind,
            Origin::Transformed {
                transform,
                arguments: arguments.to_vec(),
                named_arguments,
            },
        ))
    }

    /// Apply a possibly composed transform, substituting variables with the
    /// given nodes and creating one node per standard step.
    pub fn apply(
        &mut self,
        transform: &Transform,
        arguments: &[DataSpecId],
        named_arguments: &BTreeMap<String, DataSpecId>,
    ) -> Result<DataSpecId> {
        match &transform.spec {
            TransformKind::Variable { position } => {
                let found = match position {
                    Position::Index(i) => arguments.get(*i),
                    Position::Name(n) => named_arguments.get(n),
                };
                found
                    .copied()
                    .ok_or_else(|| Error::InvalidInput("Cannot substitute all variables".into()))
            }
            TransformKind::Composed {
                transform: inner,
                arguments: inner_args,
                named_arguments: inner_named,
            } => {
                let mut args = Vec::with_capacity(inner_args.len());
                for a in inner_args {
                    args.push(self.apply(a, arguments, named_arguments)?);
                }
                let mut named = BTreeMap::new();
                for (n, a) in inner_named {
                    named.insert(n.clone(), self.apply(a, arguments, named_arguments)?);
                }
                let name = inner.name.clone();
                self.transformed_named(name, (**inner).clone(), &args, named)
            }
            _ => {
                let name = transform.name.clone();
                self.transformed_named(name, transform.clone(), arguments, named_arguments.clone())
            }
        }
    }

    pub fn get(&self, id: &DataSpecId) -> Result<&DataSpec> {
        self.nodes
            .get(id)
            .ok_or_else(|| Error::Invariant(format!("unknown dataspec {id}")))
    }

    pub fn parents(&self, id: &DataSpecId) -> Result<Vec<DataSpecId>> {
        Ok(self.get(id)?.parent_ids())
    }

    /// Source nodes reachable upstream of `id` (itself if it is a source).
    pub fn sources(&self, id: &DataSpecId) -> Result<BTreeSet<DataSpecId>> {
        let mut out = BTreeSet::new();
        let mut stack = vec![*id];
        let mut seen = BTreeSet::new();
        while let Some(cur) = stack.pop() {
            if !seen.insert(cur) {
                continue;
            }
            let spec = self.get(&cur)?;
            if spec.is_source() {
                out.insert(cur);
            }
            stack.extend(spec.parent_ids());
        }
        Ok(out)
    }

    /// Most recently inserted node called `name`.
    pub fn find(&self, name: &str) -> Option<DataSpecId> {
        self.order
            .iter()
            .rev()
            .find(|id| self.nodes.get(*id).map(|s| s.name == name).unwrap_or(false))
            .copied()
    }

    /// Graphviz rendering, one edge per parent labelled with the transform.
    pub fn dot(&self) -> String {
        let mut out = String::from("digraph {\n");
        for id in &self.order {
            let Some(spec) = self.nodes.get(id) else {
                continue;
            };
            let shape = match spec.kind {
                DataSpecKind::Dataset => "box",
                DataSpecKind::Scalar => "ellipse",
            };
            let _ = writeln!(
                out,
                "  \"{id}\" [label=\"{} ({})\", shape={shape}];",
                spec.name.replace('"', "'"),
                id.short()
            );
            if let Some(t) = spec.transform() {
                for parent in spec.parent_ids() {
                    let _ = writeln!(out, "  \"{parent}\" -> \"{id}\" [label=\"{}\"];", t.spec_name());
                }
            }
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn graph_with_source() -> (Graph, DataSpecId) {
        let mut g = Graph::new();
        let id = g
            .source_dataset(
                "users",
                "memory://users",
                Schema::new("users", Type::structure([("age", Type::integer(0, 120))])),
            )
            .unwrap();
        (g, id)
    }

    #[test]
    fn equal_nodes_share_an_id() {
        let (mut g, src) = graph_with_source();
        let a = g.transformed(Transform::shuffle(), &[src]).unwrap();
        let b = g.transformed(Transform::shuffle(), &[src]).unwrap();
        assert_eq!(a, b);
        assert_eq!(g.len(), 2);
        assert_eq!(g.sources(&a).unwrap().into_iter().collect::<Vec<_>>(), vec![src]);
    }

    #[test]
    fn standard_transform_needs_one_dataset_parent() {
        let (mut g, src) = graph_with_source();
        let err = g.transformed(Transform::shuffle(), &[src, src]).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));

        let scalar = g.source_scalar("k", serde_json::json!(3)).unwrap();
        let err = g.transformed(Transform::shuffle(), &[scalar]).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn apply_expands_composition() {
        let (mut g, src) = graph_with_source();
        let pipeline = Transform::composed(
            Transform::slice(0, 1),
            vec![Transform::composed(
                Transform::shuffle(),
                vec![Transform::variable(Position::Index(0))],
                BTreeMap::new(),
            )],
            BTreeMap::new(),
        );
        let out = g.apply(&pipeline, &[src], &BTreeMap::new()).unwrap();
        let node = g.get(&out).unwrap();
        assert_eq!(node.transform().unwrap().spec_name(), "slice");
        let parent = g.get(&node.parent_ids()[0]).unwrap();
        assert_eq!(parent.transform().unwrap().spec_name(), "shuffle");

        let err = g.apply(&pipeline, &[], &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(m) if m == "Cannot substitute all variables"));
    }

    #[test]
    fn dot_lists_edges() {
        let (mut g, src) = graph_with_source();
        g.transformed(Transform::slice(0, 1), &[src]).unwrap();
        let dot = g.dot();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("[label=\"slice\"]"));
        assert_eq!(g.find("users"), Some(src));
    }
}
