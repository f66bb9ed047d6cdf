//! Frontend and confirmation callbacks
//!
//! These traits keep the engine free of any console or prompt library: the
//! executor only hands out description strings and status transitions.

use crate::executor::{NodeOutcome, RunReport};
use crate::goal::Goal;
use crate::graph::NodeId;
use anyhow::Result;

/// Receives run notifications and action descriptions
///
/// Implementations must be `Sync`: under the parallel strategy,
/// `on_node_start` and `on_action` are called from worker threads.
pub trait Frontend: Sync {
    /// Called once before any node is processed
    fn on_run_start(&self, goal: &Goal, total: usize, dry_run: bool);

    /// Called on the worker that is about to plan a node
    fn on_node_start(&self, node: NodeId, label: &str);

    /// Called for every action, before it runs (or instead of running, in a dry run)
    fn on_action(&self, node: NodeId, label: &str, description: &[String]);

    /// Called when a node reaches a terminal state, including skips
    fn on_node_complete(&self, node: NodeId, label: &str, outcome: &NodeOutcome);

    /// Called once after every node is terminal
    fn on_run_finish(&self, report: &RunReport);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm; `true` means proceed
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Frontend that ignores every notification
pub struct NoProgress;

impl Frontend for NoProgress {
    fn on_run_start(&self, _goal: &Goal, _total: usize, _dry_run: bool) {}
    fn on_node_start(&self, _node: NodeId, _label: &str) {}
    fn on_action(&self, _node: NodeId, _label: &str, _description: &[String]) {}
    fn on_node_complete(&self, _node: NodeId, _label: &str, _outcome: &NodeOutcome) {}
    fn on_run_finish(&self, _report: &RunReport) {}
}

/// Auto-confirm callback (always returns true), used for unattended runs
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
