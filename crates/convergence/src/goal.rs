//! Goals - named operations applied to every selected node
//!
//! A goal decides two things for the executor: which way the dependency
//! edges point when ordering nodes, and whether its actions mutate anything.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Which end of a dependency edge runs first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// A node runs after everything it depends on (apply, describe)
    DependenciesFirst,
    /// A node runs after everything that depends on it (destroy)
    DependentsFirst,
}

/// A named operation such as `apply` or `destroy`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Goal {
    pub name: String,
    /// One-line help text
    pub about: String,
    pub direction: Direction,
    /// Whether actions change remote state (drives confirmation prompts)
    pub mutating: bool,
}

impl Goal {
    pub fn new(name: impl Into<String>, about: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            about: about.into(),
            direction,
            mutating: true,
        }
    }

    /// Mark the goal as read-only
    pub fn read_only(mut self) -> Self {
        self.mutating = false;
        self
    }

    pub fn apply() -> Self {
        Self::new(
            APPLY,
            "Create or update resources to match the configuration",
            Direction::DependenciesFirst,
        )
    }

    pub fn destroy() -> Self {
        Self::new(
            DESTROY,
            "Tear down resources, dependents first",
            Direction::DependentsFirst,
        )
    }

    pub fn describe() -> Self {
        Self::new(
            DESCRIBE,
            "Report the observed state of resources",
            Direction::DependenciesFirst,
        )
        .read_only()
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub const APPLY: &str = "apply";
pub const DESTROY: &str = "destroy";
pub const DESCRIBE: &str = "describe";

/// Registry of goals, looked up by name
///
/// Populated once at startup; lookups never mutate it.
#[derive(Debug, Clone, Default)]
pub struct GoalRegistry {
    goals: BTreeMap<String, Goal>,
}

impl GoalRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `apply`, `destroy` and `describe`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Goal::apply());
        registry.register(Goal::destroy());
        registry.register(Goal::describe());
        registry
    }

    /// Register a goal, replacing any goal of the same name
    pub fn register(&mut self, goal: Goal) {
        self.goals.insert(goal.name.clone(), goal);
    }

    /// Look up a goal by name
    pub fn get(&self, name: &str) -> Result<&Goal> {
        self.goals.get(name).ok_or_else(|| Error::UnknownGoal {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }

    /// All registered goal names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.goals.keys().map(String::as_str).collect()
    }
}
