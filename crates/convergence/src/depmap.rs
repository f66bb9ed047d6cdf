//! Dependency map - direct-edge adjacency snapshot of a resource graph
//!
//! A [`DependencyMap`] is built by walking the graph from a set of roots and
//! recording, for every reachable node, its *direct* dependencies. Transitive
//! questions are answered by repeated lookup rather than precomputation, so
//! the map stays small and cheap to rebuild per invocation.
//!
//! The walk tracks which nodes are on the current path; reaching one of them
//! again is a dependency cycle and fails with [`Error::Cycle`].

use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnPath,
    Done,
}

/// One level of the explicit DFS stack
struct Frame {
    node: NodeId,
    // Reverse-sorted so `pop` visits dependencies in ascending order
    pending: Vec<NodeId>,
}

/// Read-only adjacency snapshot: node -> direct edges
///
/// The map is oriented: a freshly built map points from each node to the
/// nodes it depends on ("forward"). [`DependencyMap::backward`] returns the
/// transpose, pointing from each node to its dependents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyMap {
    edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl DependencyMap {
    /// Build the forward map of everything reachable from `roots`
    pub fn build(graph: &Graph, roots: impl IntoIterator<Item = NodeId>) -> Result<Self> {
        let edges = walk(
            roots,
            |id| Ok(graph.node(id)?.dependencies().clone()),
            |id| graph.label(id),
        )?;
        log::debug!("built dependency map over {} nodes", edges.len());
        Ok(Self { edges })
    }

    /// Build the forward map of the whole graph
    pub fn for_graph(graph: &Graph) -> Result<Self> {
        Self::build(graph, graph.ids())
    }

    /// Restrict this map to what is reachable from `roots` along its own edges
    ///
    /// Used to take the dependents-closure of a selection from a backward map.
    pub fn reachable_from(
        &self,
        graph: &Graph,
        roots: impl IntoIterator<Item = NodeId>,
    ) -> Result<Self> {
        let edges = walk(
            roots,
            |id| {
                self.edges
                    .get(&id)
                    .cloned()
                    .ok_or(Error::UnknownNode(id.index()))
            },
            |id| graph.label(id),
        )?;
        Ok(Self { edges })
    }

    /// The transpose of this map
    pub fn backward(&self) -> Self {
        let mut edges: BTreeMap<NodeId, BTreeSet<NodeId>> =
            self.edges.keys().map(|&id| (id, BTreeSet::new())).collect();
        for (&node, targets) in &self.edges {
            for target in targets {
                edges.entry(*target).or_default().insert(node);
            }
        }
        Self { edges }
    }

    /// Direct edges of a node (empty if the node is not in the map)
    pub fn edges(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.edges.get(&id).into_iter().flatten().copied()
    }

    /// Whether the node was reached when building the map
    pub fn contains(&self, id: NodeId) -> bool {
        self.edges.contains_key(&id)
    }

    /// All nodes in the map, ascending by id
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.edges.keys().copied()
    }

    /// Iterate over `(node, direct edges)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &BTreeSet<NodeId>)> {
        self.edges.iter().map(|(id, set)| (*id, set))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Nodes with zero outgoing edges in this map
    pub fn tips(&self) -> BTreeSet<NodeId> {
        self.edges
            .iter()
            .filter(|(_, targets)| targets.is_empty())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Every node reachable from `id` by following edges, excluding `id`
    pub fn transitive(&self, id: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = self.edges(id).collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(self.edges(next));
            }
        }
        seen
    }

    /// Order in which every node appears after all of its edge targets
    ///
    /// For a forward map this is dependencies-first. Kahn's algorithm over the
    /// transpose; ties broken by ascending id so the order is reproducible.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut remaining: HashMap<NodeId, usize> = self
            .edges
            .iter()
            .map(|(id, targets)| (*id, targets.len()))
            .collect();
        let reverse = self.backward();
        let mut ready: BTreeSet<NodeId> = self.tips();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for source in reverse.edges(next) {
                if let Some(count) = remaining.get_mut(&source) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(source);
                    }
                }
            }
        }

        order
    }

    /// Reverse of [`topological_order`](Self::topological_order)
    pub fn dependents_first_order(&self) -> Vec<NodeId> {
        let mut order = self.topological_order();
        order.reverse();
        order
    }
}

/// Depth-first walk recording direct edges, failing on cycles
fn walk<E, L>(
    roots: impl IntoIterator<Item = NodeId>,
    edges_of: E,
    label: L,
) -> Result<BTreeMap<NodeId, BTreeSet<NodeId>>>
where
    E: Fn(NodeId) -> Result<BTreeSet<NodeId>>,
    L: Fn(NodeId) -> String,
{
    let mut edges: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
    let mut marks: HashMap<NodeId, Mark> = HashMap::new();

    let enter = |id: NodeId, edges: &mut BTreeMap<NodeId, BTreeSet<NodeId>>| {
        let targets = edges_of(id)?;
        let pending = targets.iter().rev().copied().collect();
        edges.insert(id, targets);
        Ok::<_, Error>(Frame { node: id, pending })
    };

    for root in roots {
        if marks.contains_key(&root) {
            continue;
        }
        marks.insert(root, Mark::OnPath);
        let mut stack = vec![enter(root, &mut edges)?];

        while let Some(frame) = stack.last_mut() {
            let Some(next) = frame.pending.pop() else {
                marks.insert(frame.node, Mark::Done);
                stack.pop();
                continue;
            };

            match marks.get(&next) {
                Some(Mark::Done) => {}
                Some(Mark::OnPath) => {
                    return Err(cycle_error(&stack, next, &label));
                }
                None => {
                    marks.insert(next, Mark::OnPath);
                    stack.push(enter(next, &mut edges)?);
                }
            }
        }
    }

    Ok(edges)
}

fn cycle_error(stack: &[Frame], repeated: NodeId, label: impl Fn(NodeId) -> String) -> Error {
    let start = stack
        .iter()
        .position(|f| f.node == repeated)
        .unwrap_or_default();
    let mut path: Vec<String> = stack
        .get(start..)
        .unwrap_or_default()
        .iter()
        .map(|f| label(f.node))
        .collect();
    path.push(label(repeated));
    Error::Cycle { path }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// vpc <- subnet <- instance, plus an unrelated bucket
    fn sample() -> (Graph, [NodeId; 4]) {
        let mut graph = Graph::new();
        let vpc = graph.add_node("vpc", Some("main".into()));
        let subnet = graph.add_node("subnet", Some("private".into()));
        let instance = graph.add_node("instance", Some("web".into()));
        let bucket = graph.add_node("bucket", Some("logs".into()));
        graph.add_dependency(subnet, vpc).unwrap();
        graph.add_dependency(instance, subnet).unwrap();
        (graph, [vpc, subnet, instance, bucket])
    }

    fn position(order: &[NodeId], id: NodeId) -> usize {
        order.iter().position(|n| *n == id).unwrap()
    }

    #[test]
    fn test_build_records_direct_edges_only() {
        let (graph, [vpc, subnet, instance, bucket]) = sample();
        let map = DependencyMap::build(&graph, [instance]).unwrap();

        assert_eq!(map.len(), 3);
        assert!(!map.contains(bucket));
        assert_eq!(map.edges(instance).collect::<Vec<_>>(), vec![subnet]);
        assert_eq!(map.edges(vpc).count(), 0);
        assert_eq!(map.transitive(instance), BTreeSet::from([vpc, subnet]));
    }

    #[test]
    fn test_backward_is_transpose() {
        let (graph, [vpc, subnet, instance, bucket]) = sample();
        let map = DependencyMap::for_graph(&graph).unwrap();
        let back = map.backward();

        assert_eq!(back.edges(vpc).collect::<Vec<_>>(), vec![subnet]);
        assert_eq!(back.edges(subnet).collect::<Vec<_>>(), vec![instance]);
        assert_eq!(back.tips(), BTreeSet::from([instance, bucket]));
        assert_eq!(map.tips(), BTreeSet::from([vpc, bucket]));
        assert_eq!(back.backward(), map);
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        let (graph, ids) = sample();
        let map = DependencyMap::for_graph(&graph).unwrap();
        let order = map.topological_order();

        assert_eq!(order.len(), ids.len());
        for (node, deps) in map.iter() {
            for dep in deps {
                assert!(position(&order, *dep) < position(&order, node));
            }
        }
    }

    #[test]
    fn test_dependents_first_order_is_reversed() {
        let (graph, [vpc, subnet, instance, _]) = sample();
        let map = DependencyMap::for_graph(&graph).unwrap();
        let order = map.dependents_first_order();

        assert!(position(&order, instance) < position(&order, subnet));
        assert!(position(&order, subnet) < position(&order, vpc));
    }

    #[test]
    fn test_diamond_visits_shared_node_once() {
        let mut graph = Graph::new();
        let base = graph.add_node("vpc", None);
        let left = graph.add_node("subnet", Some("a".into()));
        let right = graph.add_node("subnet", Some("b".into()));
        let top = graph.add_node("instance", None);
        graph.add_dependency(left, base).unwrap();
        graph.add_dependency(right, base).unwrap();
        graph.add_dependency(top, left).unwrap();
        graph.add_dependency(top, right).unwrap();

        let map = DependencyMap::build(&graph, [top]).unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map.topological_order().first(), Some(&base));
        assert_eq!(map.topological_order().last(), Some(&top));
    }

    #[test]
    fn test_cycle_is_detected_with_participants() {
        let mut graph = Graph::new();
        let a = graph.add_node("vpc", Some("a".into()));
        let b = graph.add_node("subnet", Some("b".into()));
        let c = graph.add_node("route_table", Some("c".into()));
        let outside = graph.add_node("account", None);
        graph.add_dependency(a, outside).unwrap();
        graph.add_dependency(a, b).unwrap();
        graph.add_dependency(b, c).unwrap();
        graph.add_dependency(c, a).unwrap();

        let err = DependencyMap::build(&graph, [a]).unwrap_err();
        match err {
            Error::Cycle { path } => {
                assert_eq!(
                    path,
                    vec!["vpc 'a'", "subnet 'b'", "route_table 'c'", "vpc 'a'"]
                );
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_unreachable_from_roots_is_ignored() {
        let mut graph = Graph::new();
        let a = graph.add_node("a", None);
        let b = graph.add_node("b", None);
        let lone = graph.add_node("lone", None);
        graph.add_dependency(a, b).unwrap();
        graph.add_dependency(b, a).unwrap();

        assert!(DependencyMap::build(&graph, [lone]).is_ok());
        assert!(DependencyMap::for_graph(&graph).is_err());
    }

    #[test]
    fn test_reachable_from_backward_collects_dependents() {
        let (graph, [vpc, subnet, instance, bucket]) = sample();
        let back = DependencyMap::for_graph(&graph).unwrap().backward();
        let closure = back.reachable_from(&graph, [subnet]).unwrap();

        assert!(closure.contains(subnet));
        assert!(closure.contains(instance));
        assert!(!closure.contains(vpc));
        assert!(!closure.contains(bucket));
    }

    #[test]
    fn test_empty_roots_give_empty_map() {
        let (graph, _) = sample();
        let map = DependencyMap::build(&graph, []).unwrap();
        assert!(map.is_empty());
        assert!(map.topological_order().is_empty());
    }
}
