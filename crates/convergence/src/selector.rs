//! Selector - narrow the graph with `kind:name` expressions
//!
//! Expressions are applied in sequence. The first stage walks the whole
//! graph; each later stage walks only from the previous stage's matches,
//! following dependency edges. A walk passes through non-matching nodes to
//! reach matches deeper in the graph.
//!
//! Expression grammar: `[kind:]name`. Either part may be empty, meaning
//! "any". A bare word without `:` matches either the kind or the name, so
//! `bucket` selects every bucket and `logs` selects anything named logs.
//! Matching is literal; there are no wildcards.

use crate::depmap::DependencyMap;
use crate::error::{Error, Result};
use crate::graph::{Graph, Node, NodeId};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;

/// A parsed selector expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// Empty expression, matches every node
    Any,
    /// Bare word without `:`, matches a node's kind or its name
    Word(String),
    /// `kind:name` with either side possibly empty
    Qualified {
        kind: Option<String>,
        name: Option<String>,
    },
}

impl Expression {
    /// Parse `kind:name`, `kind:`, `:name` or a bare word (split on the first `:`)
    pub fn parse(text: &str) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        match text.split_once(':') {
            None if text.is_empty() => Self::Any,
            None => Self::Word(text.to_string()),
            Some((kind, name)) => match (non_empty(kind), non_empty(name)) {
                (None, None) => Self::Any,
                (kind, name) => Self::Qualified { kind, name },
            },
        }
    }

    /// Whether a node satisfies this expression
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            Self::Any => true,
            Self::Word(word) => word == node.kind() || Some(word.as_str()) == node.name(),
            Self::Qualified { kind, name } => {
                if let Some(kind) = kind
                    && kind != node.kind()
                {
                    return false;
                }
                if let Some(name) = name
                    && Some(name.as_str()) != node.name()
                {
                    return false;
                }
                true
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => Ok(()),
            Self::Word(word) => write!(f, "{word}"),
            Self::Qualified { kind, name } => write!(
                f,
                "{}:{}",
                kind.as_deref().unwrap_or(""),
                name.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Current candidate set during narrowing
enum Frontier {
    /// Synthetic root whose dependencies are the given seeds
    Start(BTreeSet<NodeId>),
    /// Matches of the previous stage
    Matches(BTreeSet<NodeId>),
}

/// Resolves selector expressions against a graph
///
/// Building a selector validates the graph: a dependency cycle anywhere in
/// it is reported here, before any query runs.
pub struct Selector<'g> {
    graph: &'g Graph,
    seeds: BTreeSet<NodeId>,
}

impl<'g> Selector<'g> {
    pub fn new(graph: &'g Graph) -> Result<Self> {
        // Nodes nothing depends on: walking dependency edges from them reaches
        // the whole graph.
        let seeds = DependencyMap::for_graph(graph)?.backward().tips();
        Ok(Self { graph, seeds })
    }

    /// Resolve `expressions` to a set of nodes, sorted by `kind:name`
    ///
    /// No expressions selects every node. An empty result is not an error
    /// here; see [`find_required`](Self::find_required).
    pub fn find<S: AsRef<str>>(&self, expressions: &[S]) -> Vec<NodeId> {
        if expressions.is_empty() {
            return self.sorted(self.graph.ids().collect());
        }

        let mut frontier = Frontier::Start(self.seeds.clone());
        for text in expressions {
            let expression = Expression::parse(text.as_ref());
            let found = self.stage(&frontier, &expression);
            log::debug!(
                "selector stage '{}' matched {} nodes",
                expression,
                found.len()
            );
            frontier = Frontier::Matches(found);
        }

        match frontier {
            Frontier::Start(_) => Vec::new(),
            Frontier::Matches(found) => self.sorted(found),
        }
    }

    /// Like [`find`](Self::find), but no matches is a configuration error
    pub fn find_required<S: AsRef<str>>(&self, expressions: &[S]) -> Result<Vec<NodeId>> {
        let found = self.find(expressions);
        if found.is_empty() {
            return Err(Error::NoMatches {
                selectors: expressions.iter().map(|s| s.as_ref().to_string()).collect(),
            });
        }
        Ok(found)
    }

    fn stage(&self, frontier: &Frontier, expression: &Expression) -> BTreeSet<NodeId> {
        let starts: &BTreeSet<NodeId> = match frontier {
            Frontier::Start(seeds) | Frontier::Matches(seeds) => seeds,
        };

        let mut found = BTreeSet::new();
        for start in starts {
            found.extend(self.matching_from(*start, expression));
        }
        found
    }

    /// Breadth-first walk from `start` (inclusive) collecting matches
    fn matching_from(&self, start: NodeId, expression: &Expression) -> Vec<NodeId> {
        let mut queue = VecDeque::from([start]);
        let mut visited = HashSet::from([start]);
        let mut matches = Vec::new();

        while let Some(id) = queue.pop_front() {
            for dep in self.graph.dependencies(id) {
                if visited.insert(dep) {
                    queue.push_back(dep);
                }
            }
            if let Ok(node) = self.graph.node(id)
                && expression.matches(node)
            {
                matches.push(id);
            }
        }

        matches
    }

    fn sorted(&self, ids: BTreeSet<NodeId>) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = ids.into_iter().collect();
        ids.sort_by_cached_key(|id| {
            (
                self.graph
                    .node(*id)
                    .map(Node::sort_key)
                    .unwrap_or_default(),
                *id,
            )
        });
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buckets() -> (Graph, NodeId, NodeId, NodeId) {
        let mut graph = Graph::new();
        let logs = graph.add_node("bucket", Some("logs".into()));
        let assets = graph.add_node("bucket", Some("assets".into()));
        let main = graph.add_node("database", Some("main".into()));
        (graph, logs, assets, main)
    }

    /// vpc:main <- subnet:a, subnet:b; vpc:other <- subnet:c
    fn network() -> (Graph, Vec<NodeId>) {
        let mut graph = Graph::new();
        let main = graph.add_node("vpc", Some("main".into()));
        let other = graph.add_node("vpc", Some("other".into()));
        let a = graph.add_node("subnet", Some("a".into()));
        let b = graph.add_node("subnet", Some("b".into()));
        let c = graph.add_node("subnet", Some("c".into()));
        graph.add_dependency(a, main).unwrap();
        graph.add_dependency(b, main).unwrap();
        graph.add_dependency(c, other).unwrap();
        (graph, vec![main, other, a, b, c])
    }

    #[test]
    fn test_parse_expression_forms() {
        assert_eq!(
            Expression::parse("bucket:logs"),
            Expression::Qualified {
                kind: Some("bucket".into()),
                name: Some("logs".into())
            }
        );
        assert_eq!(Expression::parse("logs"), Expression::Word("logs".into()));
        assert_eq!(
            Expression::parse("bucket:"),
            Expression::Qualified {
                kind: Some("bucket".into()),
                name: None
            }
        );
        assert_eq!(
            Expression::parse(":logs"),
            Expression::Qualified {
                kind: None,
                name: Some("logs".into())
            }
        );
        assert_eq!(Expression::parse(""), Expression::Any);
        assert_eq!(Expression::parse(":"), Expression::Any);
        assert_eq!(Expression::parse("a:b:c").to_string(), "a:b:c");
    }

    #[test]
    fn test_find_by_kind() {
        let (graph, logs, assets, _) = buckets();
        let selector = Selector::new(&graph).unwrap();
        // Sorted by kind:name, so assets before logs
        assert_eq!(selector.find(&["bucket"]), vec![assets, logs]);
        assert_eq!(selector.find(&["bucket:"]), vec![assets, logs]);
    }

    #[test]
    fn test_find_by_kind_and_name() {
        let (graph, logs, _, _) = buckets();
        let selector = Selector::new(&graph).unwrap();
        assert_eq!(selector.find(&["bucket:logs"]), vec![logs]);
        assert!(selector.find(&["database:logs"]).is_empty());
    }

    #[test]
    fn test_bare_word_matches_name() {
        let (graph, logs, _, main) = buckets();
        let selector = Selector::new(&graph).unwrap();
        assert_eq!(selector.find(&["main"]), vec![main]);
        assert_eq!(selector.find(&[":logs"]), vec![logs]);
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let (graph, _, _, _) = buckets();
        let selector = Selector::new(&graph).unwrap();
        assert!(selector.find(&["doesnotexist"]).is_empty());
        assert!(matches!(
            selector.find_required(&["doesnotexist"]),
            Err(Error::NoMatches { .. })
        ));
    }

    #[test]
    fn test_empty_expression_matches_everything() {
        let (graph, ids) = network();
        let selector = Selector::new(&graph).unwrap();
        assert_eq!(selector.find(&[""]).len(), ids.len());
        assert_eq!(selector.find::<&str>(&[]).len(), ids.len());
    }

    #[test]
    fn test_walk_reaches_nodes_behind_non_matching_ones() {
        let (graph, ids) = network();
        let selector = Selector::new(&graph).unwrap();
        // vpcs are only reachable through subnets, which nothing depends on
        assert_eq!(selector.find(&["vpc:"]), vec![ids[0], ids[1]]);
    }

    #[test]
    fn test_second_stage_narrows_to_reachable_matches() {
        let (graph, ids) = network();
        let selector = Selector::new(&graph).unwrap();
        assert_eq!(selector.find(&["subnet:c", "vpc:"]), vec![ids[1]]);
        assert!(selector.find(&["vpc:main", "subnet:"]).is_empty());
    }

    #[test]
    fn test_stage_includes_frontier_nodes_themselves() {
        let (graph, ids) = network();
        let selector = Selector::new(&graph).unwrap();
        assert_eq!(selector.find(&["subnet:a", "a"]), vec![ids[2]]);
    }

    #[test]
    fn test_two_stage_equals_stage_then_filter() {
        let (graph, _) = network();
        let selector = Selector::new(&graph).unwrap();
        let first = selector.find(&["subnet:"]);
        let second = Expression::parse("vpc:main");

        let mut expected: BTreeSet<NodeId> = BTreeSet::new();
        for id in &first {
            expected.extend(selector.matching_from(*id, &second));
        }

        let combined: BTreeSet<NodeId> = selector
            .find(&["subnet:", "vpc:main"])
            .into_iter()
            .collect();
        assert_eq!(combined, expected);
        assert_eq!(combined.len(), 1);
    }

    #[test]
    fn test_cycle_fails_selector_construction() {
        let mut graph = Graph::new();
        let a = graph.add_node("a", None);
        let b = graph.add_node("b", None);
        graph.add_dependency(a, b).unwrap();
        graph.add_dependency(b, a).unwrap();
        assert!(matches!(Selector::new(&graph), Err(Error::Cycle { .. })));
    }
}
