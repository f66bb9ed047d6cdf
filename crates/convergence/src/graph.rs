//! Resource graph - an arena of nodes linked by dependency edges
//!
//! Every declared resource is a [`Node`]. Identity is the arena slot
//! ([`NodeId`]): two nodes are the same entity only if their ids are equal.
//! `kind` and `name` are tags used for selector matching and display, never
//! for identity or ordering.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable identity of a node within its [`Graph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in its graph
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A graph vertex representing one declared resource
#[derive(Debug, Clone)]
pub struct Node {
    kind: String,
    name: Option<String>,
    dependencies: BTreeSet<NodeId>,
}

impl Node {
    /// Resource type tag (e.g. "vpc", "bucket")
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Instance name, if the resource has one
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Direct dependencies of this node
    pub fn dependencies(&self) -> &BTreeSet<NodeId> {
        &self.dependencies
    }

    /// `kind:name` key used for sorting selector output
    pub fn sort_key(&self) -> String {
        format!("{}:{}", self.kind, self.name.as_deref().unwrap_or(""))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} '{}'", self.kind, name),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Arena holding every node of a workspace
///
/// Dependencies may be added incrementally while the graph is being built;
/// once a selector or executor run starts, the graph is only borrowed
/// immutably.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its identity
    pub fn add_node(&mut self, kind: impl Into<String>, name: Option<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: kind.into(),
            name,
            dependencies: BTreeSet::new(),
        });
        id
    }

    /// Record that `node` requires `dependency` to exist first
    pub fn add_dependency(&mut self, node: NodeId, dependency: NodeId) -> Result<()> {
        self.check(dependency)?;
        if node == dependency {
            return Err(Error::SelfDependency {
                label: self.label(node),
            });
        }
        let entry = self
            .nodes
            .get_mut(node.0)
            .ok_or(Error::UnknownNode(node.0))?;
        entry.dependencies.insert(dependency);
        Ok(())
    }

    /// Look up a node
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode(id.0))
    }

    /// Direct dependencies of a node (empty for unknown ids)
    pub fn dependencies(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(id.0)
            .into_iter()
            .flat_map(|n| n.dependencies.iter().copied())
    }

    /// Human-readable label, e.g. `subnet 'private'`
    pub fn label(&self, id: NodeId) -> String {
        self.nodes
            .get(id.0)
            .map_or_else(|| id.to_string(), ToString::to_string)
    }

    /// Iterate over all node ids in insertion order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Iterate over all nodes with their ids
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Find the node with exactly this kind and name
    pub fn find(&self, kind: &str, name: &str) -> Option<NodeId> {
        self.iter()
            .find(|(_, n)| n.kind == kind && n.name.as_deref() == Some(name))
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn check(&self, id: NodeId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(Error::UnknownNode(id.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_by_slot_not_name() {
        let mut graph = Graph::new();
        let a = graph.add_node("bucket", Some("logs".into()));
        let b = graph.add_node("bucket", Some("logs".into()));
        assert_ne!(a, b);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_add_dependency_grows_set() {
        let mut graph = Graph::new();
        let vpc = graph.add_node("vpc", Some("main".into()));
        let subnet = graph.add_node("subnet", Some("private".into()));
        graph.add_dependency(subnet, vpc).unwrap();
        graph.add_dependency(subnet, vpc).unwrap();

        let deps: Vec<_> = graph.dependencies(subnet).collect();
        assert_eq!(deps, vec![vpc]);
        assert_eq!(graph.dependencies(vpc).count(), 0);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut graph = Graph::new();
        let vpc = graph.add_node("vpc", None);
        let err = graph.add_dependency(vpc, vpc).unwrap_err();
        assert!(matches!(err, Error::SelfDependency { .. }));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut graph = Graph::new();
        let vpc = graph.add_node("vpc", None);
        let err = graph.add_dependency(vpc, NodeId(7)).unwrap_err();
        assert!(matches!(err, Error::UnknownNode(7)));
    }

    #[test]
    fn test_labels_and_find() {
        let mut graph = Graph::new();
        let vpc = graph.add_node("vpc", Some("main".into()));
        let account = graph.add_node("account", None);

        assert_eq!(graph.label(vpc), "vpc 'main'");
        assert_eq!(graph.label(account), "account");
        assert_eq!(graph.find("vpc", "main"), Some(vpc));
        assert_eq!(graph.find("vpc", "other"), None);
        assert_eq!(graph.node(account).unwrap().sort_key(), "account:");
    }
}
