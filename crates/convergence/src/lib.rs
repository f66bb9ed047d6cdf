//! # Convergence
//!
//! A dependency-ordered execution engine for declared resources.
//!
//! Resources are nodes in a [`Graph`]; each node carries a [`Plan`] that
//! turns a [`Goal`] into a list of [`Action`]s. The engine answers three
//! questions:
//!
//! - **What is selected?** [`Selector`] resolves `kind:name` expressions
//!   against the graph.
//! - **In what order?** [`DependencyMap`] snapshots the edges, detects cycles
//!   and orders nodes dependencies-first (or dependents-first for teardown).
//! - **How is it run?** [`execute`] walks the order serially or on a bounded
//!   worker pool, isolating failures to the nodes that need the failed one.
//!
//! ## Example
//!
//! ```ignore
//! use convergence::{ExecuteOptions, Goal, NoProgress, Workspace, execute};
//!
//! let mut ws = Workspace::new();
//! let vpc = ws.add("vpc", Some("main".into()), vpc_plan);
//! let subnet = ws.add("subnet", Some("private".into()), subnet_plan);
//! ws.add_dependency(subnet, vpc)?;
//!
//! let roots = ws.selector()?.find_required(&["subnet"])?;
//! let report = execute(
//!     ws.graph(),
//!     &ws,
//!     &Goal::apply(),
//!     &roots,
//!     &ExecuteOptions::default(),
//!     &NoProgress,
//! )?;
//! report.into_result()?;
//! ```
//!
//! ## Callback Traits
//!
//! - [`Frontend`]: receives run, node and action notifications
//! - [`ConfirmCallback`]: handles user confirmations
//!
//! The engine itself never prints or prompts.

pub mod action;
pub mod context;
pub mod depmap;
pub mod diff;
pub mod error;
pub mod executor;
pub mod goal;
pub mod graph;
pub mod plan;
pub mod selector;
pub mod workspace;

// Re-export main types at crate root
pub use action::{Action, BoxedAction, FnAction, Readiness, RetryPolicy, WaitFor};
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, Frontend, NoProgress};
pub use depmap::DependencyMap;
pub use diff::{AttributeDiff, FieldDiff};
pub use error::{ActionError, Error, Result, RunError};
pub use executor::{
    ExecuteOptions, FailurePolicy, NodeOutcome, NodeReport, RunReport, SkipReason, Strategy,
    execute,
};
pub use goal::{Direction, Goal, GoalRegistry};
pub use graph::{Graph, Node, NodeId};
pub use plan::{BoxedPlan, Converge, ConvergePlan, Plan, Planner};
pub use selector::{Expression, Selector};
pub use workspace::Workspace;
