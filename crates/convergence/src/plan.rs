//! Plans - per-resource behaviour that turns a goal into actions
//!
//! Every resource kind implements [`Plan`]. Most kinds follow the same
//! shape: look at what exists remotely, compare it with the declaration, and
//! emit create/update/destroy actions. [`Converge`] captures that shape once
//! and [`ConvergePlan`] turns any `Converge` into a `Plan`.

use crate::action::{BoxedAction, FnAction};
use crate::diff::AttributeDiff;
use crate::goal::{APPLY, DESCRIBE, DESTROY, Goal};
use crate::graph::NodeId;
use anyhow::{Result, bail};
use std::fmt;

/// Produces the actions a resource needs for a goal
///
/// Building the action list must not change anything remotely; the only
/// permitted side effect is the read-only describe step needed to decide
/// what to do. An empty list means the resource has already converged.
pub trait Plan: Send + Sync + fmt::Debug {
    fn actions(&self, goal: &Goal) -> Result<Vec<BoxedAction>>;
}

/// A boxed plan for type-erased storage
pub type BoxedPlan = Box<dyn Plan>;

/// Source of per-node action lists for the executor
pub trait Planner: Sync {
    fn actions(&self, node: NodeId, goal: &Goal) -> Result<Vec<BoxedAction>>;
}

impl<F> Planner for F
where
    F: Fn(NodeId, &Goal) -> Result<Vec<BoxedAction>> + Sync,
{
    fn actions(&self, node: NodeId, goal: &Goal) -> Result<Vec<BoxedAction>> {
        self(node, goal)
    }
}

/// Describe-then-diff-then-patch strategy
pub trait Converge: Send + Sync + fmt::Debug {
    /// What was observed remotely
    type Observed: fmt::Debug;

    /// Short subject for messages, e.g. `directory /srv/app`
    fn subject(&self) -> String;

    /// Read the current remote state; `None` when the resource does not exist
    fn describe(&self) -> Result<Option<Self::Observed>>;

    /// Actions creating the resource from scratch
    fn create(&self) -> Vec<BoxedAction>;

    /// Fields where the observed state differs from the declaration
    fn diff(&self, observed: &Self::Observed) -> AttributeDiff;

    /// Actions patching an existing resource
    fn update(&self, observed: &Self::Observed, diff: &AttributeDiff) -> Vec<BoxedAction>;

    /// Actions removing an existing resource
    fn destroy(&self, observed: &Self::Observed) -> Vec<BoxedAction>;

    /// Lines reported by the `describe` goal
    fn report(&self, observed: Option<&Self::Observed>) -> Vec<String> {
        match observed {
            Some(observed) => vec![
                format!("{} exists", self.subject()),
                format!("    {observed:?}"),
            ],
            None => vec![format!("{} does not exist", self.subject())],
        }
    }
}

/// Adapts a [`Converge`] strategy into a [`Plan`]
#[derive(Debug)]
pub struct ConvergePlan<T>(pub T);

impl<T: Converge> Plan for ConvergePlan<T> {
    fn actions(&self, goal: &Goal) -> Result<Vec<BoxedAction>> {
        let inner = &self.0;

        match goal.name.as_str() {
            APPLY => match inner.describe()? {
                None => Ok(inner.create()),
                Some(observed) => {
                    let diff = inner.diff(&observed);
                    if diff.matches() {
                        log::debug!("{} is up to date", inner.subject());
                        Ok(Vec::new())
                    } else {
                        Ok(inner.update(&observed, &diff))
                    }
                }
            },
            DESTROY => match inner.describe()? {
                Some(observed) => Ok(inner.destroy(&observed)),
                None => Ok(Vec::new()),
            },
            DESCRIBE => {
                let observed = inner.describe()?;
                let lines = inner.report(observed.as_ref());
                let action = FnAction::new(format!("Describe {}", inner.subject()), || Ok(()))
                    .with_lines(lines.into_iter().map(|l| format!("    {l}")));
                Ok(vec![action.boxed()])
            }
            other => bail!("{} does not support goal '{}'", inner.subject(), other),
        }
    }
}
