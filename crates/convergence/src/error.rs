//! Error types for graph construction, planning and execution.
//!
//! Errors fall into three groups:
//! - [`Error`]: configuration and graph errors, raised before any action runs
//! - [`ActionError`]: failures local to a single node's action
//! - [`RunError`]: the aggregate result of an execution with failed nodes

use crate::executor::RunReport;
use thiserror::Error;

/// Errors detected while building or querying the resource graph.
///
/// All of these are fatal and are reported before execution begins.
#[derive(Debug, Error)]
pub enum Error {
    /// A parameter was given that the resource or goal does not accept
    #[error("invalid parameter: {message}")]
    InvalidParameter {
        /// What was wrong with the parameter
        message: String,
    },

    /// No goal is registered under this name
    #[error("unknown goal '{name}' (available: {available})")]
    UnknownGoal {
        /// Requested goal name
        name: String,
        /// Comma-separated list of registered goals
        available: String,
    },

    /// A node id does not belong to the graph it was used with
    #[error("unknown node #{0}")]
    UnknownNode(usize),

    /// A node was made to depend on itself
    #[error("{label} cannot depend on itself")]
    SelfDependency {
        /// Label of the offending node
        label: String,
    },

    /// The dependency relation contains a cycle
    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle {
        /// Labels of the cycle participants, in path order, first node repeated last
        path: Vec<String>,
    },

    /// Selector expressions matched nothing where a match was required
    #[error("no resources match the selectors {}", format_selectors(.selectors))]
    NoMatches {
        /// The expressions that were tried
        selectors: Vec<String>,
    },

    /// The parallel worker pool could not be started
    #[error("failed to create worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

fn format_selectors(selectors: &[String]) -> String {
    format!("[{}]", selectors.join(", "))
}

/// Failure of a single action's `run()` or `check()`.
///
/// Action errors are local to their node: the executor records them in the
/// node's outcome and never lets them cross a node boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// The action attempted its effect and failed
    #[error("{message}")]
    Failed {
        /// Description of the failure
        message: String,
    },

    /// A wait-style action exhausted its retry budget
    #[error(
        "timed out waiting for {target} after {attempts} attempts (last observed: {observed})"
    )]
    Timeout {
        /// The state being waited for
        target: String,
        /// The last state observed before giving up
        observed: String,
        /// Number of checks performed
        attempts: u32,
    },
}

impl ActionError {
    /// Create a plain failure from any displayable message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Whether this failure came from an exhausted wait.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<std::io::Error> for ActionError {
    fn from(err: std::io::Error) -> Self {
        Self::failed(err.to_string())
    }
}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        Self::failed(format!("{err:#}"))
    }
}

/// Aggregate failure of an execution run.
///
/// Carries the full per-node report so callers can list every failed node
/// and every node skipped because of it.
#[derive(Debug, Error)]
pub enum RunError {
    /// One or more nodes failed or were skipped
    #[error("{failed} failed, {skipped} skipped of {total} resources")]
    Failed {
        /// Number of failed nodes
        failed: usize,
        /// Number of skipped nodes
        skipped: usize,
        /// Number of nodes in the run
        total: usize,
        /// Full per-node status table
        report: Box<RunReport>,
    },
}

impl RunError {
    /// The report of the failed run.
    pub fn report(&self) -> &RunReport {
        match self {
            Self::Failed { report, .. } => report,
        }
    }
}

/// Result type for graph and configuration operations.
pub type Result<T> = std::result::Result<T, Error>;
