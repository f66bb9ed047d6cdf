//! Workspace - the resource graph with a plan bound to every node

use crate::action::BoxedAction;
use crate::error::{Error, Result};
use crate::goal::Goal;
use crate::graph::{Graph, NodeId};
use crate::plan::{BoxedPlan, Plan, Planner};
use crate::selector::Selector;

/// A graph of declared resources and the plans that manage them
///
/// Nodes are added together with their plan, so every id handed out by
/// [`Workspace::add`] has exactly one plan.
#[derive(Debug, Default)]
pub struct Workspace {
    graph: Graph,
    plans: Vec<BoxedPlan>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource
    pub fn add(
        &mut self,
        kind: impl Into<String>,
        name: Option<String>,
        plan: impl Plan + 'static,
    ) -> NodeId {
        self.add_boxed(kind, name, Box::new(plan))
    }

    /// Declare a resource with an already boxed plan
    pub fn add_boxed(
        &mut self,
        kind: impl Into<String>,
        name: Option<String>,
        plan: BoxedPlan,
    ) -> NodeId {
        let id = self.graph.add_node(kind, name);
        self.plans.push(plan);
        id
    }

    /// Make `node` depend on `dependency`
    pub fn add_dependency(&mut self, node: NodeId, dependency: NodeId) -> Result<()> {
        self.graph.add_dependency(node, dependency)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn plan(&self, id: NodeId) -> Result<&dyn Plan> {
        self.plans
            .get(id.index())
            .map(AsRef::as_ref)
            .ok_or(Error::UnknownNode(id.index()))
    }

    /// A selector over the current graph
    pub fn selector(&self) -> Result<Selector<'_>> {
        Selector::new(&self.graph)
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}

impl Planner for Workspace {
    fn actions(&self, node: NodeId, goal: &Goal) -> anyhow::Result<Vec<BoxedAction>> {
        self.plan(node)?.actions(goal)
    }
}
