//! Execution engine - runs a goal over the selected nodes in dependency order
//!
//! The executor takes the roots chosen by the selector, builds the
//! prerequisite map for the goal's direction, and drives every node through
//! `pending -> eligible -> running -> done | failed`, or straight to
//! `skipped` when something it needs has failed. A node becomes eligible only
//! once all of its prerequisites are done.
//!
//! Under the parallel strategy a coordinator on the calling thread hands
//! eligible nodes to a rayon pool, at most `jobs` at a time, and folds
//! completions back into a single mutex-guarded state table.

use crate::context::Frontend;
use crate::depmap::DependencyMap;
use crate::error::{Result, RunError};
use crate::goal::{Direction, Goal};
use crate::graph::{Graph, NodeId};
use crate::plan::Planner;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How nodes are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strategy {
    /// One node at a time on the calling thread
    Serial,
    /// Up to `jobs` nodes at once on a worker pool
    Parallel { jobs: usize },
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Parallel { jobs: 4 }
    }
}

/// What happens to the rest of the run after a node fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum FailurePolicy {
    /// Skip only the nodes that need the failed one; independent work continues
    #[default]
    Continue,
    /// Additionally stop scheduling anything new
    Halt,
}

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub strategy: Strategy,
    /// Report actions without running them
    pub dry_run: bool,
    pub failure_policy: FailurePolicy,
    /// Stop scheduling new nodes once this much time has passed
    pub deadline: Option<Duration>,
    /// Log every action description as it runs
    pub verbose: bool,
}

impl ExecuteOptions {
    pub fn serial() -> Self {
        Self {
            strategy: Strategy::Serial,
            ..Self::default()
        }
    }

    pub fn parallel(jobs: usize) -> Self {
        Self {
            strategy: Strategy::Parallel { jobs },
            ..Self::default()
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Why a node never ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A prerequisite failed; `node` is the failure that started the chain
    DependencyFailed { node: NodeId, label: String },
    /// Scheduling stopped after a failure under [`FailurePolicy::Halt`]
    Halted,
    /// Scheduling stopped because the deadline passed
    DeadlineExceeded,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DependencyFailed { label, .. } => write!(f, "{label} failed"),
            Self::Halted => f.write_str("run halted after a failure"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Terminal state of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// Every action ran (or was listed, in a dry run)
    Done { actions: usize },
    /// Planning or an action failed
    Failed { error: String },
    Skipped { reason: SkipReason },
}

impl NodeOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Per-node line of a [`RunReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReport {
    pub node: NodeId,
    pub label: String,
    pub outcome: NodeOutcome,
    /// Descriptions of the actions planned for this node
    pub actions: Vec<Vec<String>>,
}

/// Result of a run, nodes listed in the order they reached a terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub goal: String,
    pub dry_run: bool,
    pub nodes: Vec<NodeReport>,
}

impl RunReport {
    /// Outcome of a node, if it was part of the run
    pub fn outcome(&self, node: NodeId) -> Option<&NodeOutcome> {
        self.nodes
            .iter()
            .find(|report| report.node == node)
            .map(|report| &report.outcome)
    }

    /// Node ids in completion order
    pub fn order(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|report| report.node).collect()
    }

    pub fn done(&self) -> usize {
        self.count(NodeOutcome::is_done)
    }

    pub fn failed(&self) -> usize {
        self.count(NodeOutcome::is_failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(NodeOutcome::is_skipped)
    }

    /// Total number of actions planned across all nodes
    pub fn action_count(&self) -> usize {
        self.nodes.iter().map(|report| report.actions.len()).sum()
    }

    /// Whether any node planned at least one action
    pub fn has_changes(&self) -> bool {
        self.action_count() > 0
    }

    /// Check if every node completed
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.skipped() == 0
    }

    /// Turn a run with failed or skipped nodes into an error
    pub fn into_result(self) -> std::result::Result<Self, RunError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(RunError::Failed {
            failed: self.failed(),
            skipped: self.skipped(),
            total: self.nodes.len(),
            report: Box::new(self),
        })
    }

    fn count(&self, pred: impl Fn(&NodeOutcome) -> bool) -> usize {
        self.nodes.iter().filter(|report| pred(&report.outcome)).count()
    }
}

/// Run `goal` over `roots` and everything the goal's direction pulls in
///
/// For dependencies-first goals that is the roots plus their transitive
/// dependencies; for dependents-first goals the roots plus everything that
/// transitively depends on them. Fails only for graph errors (cycles, unknown
/// ids) or when the worker pool cannot start: node failures are reported in
/// the returned [`RunReport`].
pub fn execute(
    graph: &Graph,
    planner: &dyn Planner,
    goal: &Goal,
    roots: &[NodeId],
    opts: &ExecuteOptions,
    frontend: &dyn Frontend,
) -> Result<RunReport> {
    let prerequisites = match goal.direction {
        Direction::DependenciesFirst => DependencyMap::build(graph, roots.iter().copied())?,
        Direction::DependentsFirst => DependencyMap::for_graph(graph)?
            .backward()
            .reachable_from(graph, roots.iter().copied())?,
    };

    log::debug!(
        "running '{}' over {} nodes ({:?}, dry_run={})",
        goal,
        prerequisites.len(),
        opts.strategy,
        opts.dry_run
    );
    frontend.on_run_start(goal, prerequisites.len(), opts.dry_run);

    let run = Run {
        graph,
        planner,
        goal,
        opts,
        frontend,
        started: Instant::now(),
        scheduler: Mutex::new(Scheduler::new(goal, opts, prerequisites)),
    };

    match opts.strategy {
        Strategy::Serial => run.serial(),
        Strategy::Parallel { jobs } => run.parallel(jobs.max(1))?,
    }

    let report = run.finish();
    frontend.on_run_finish(&report);
    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Eligible,
    Running,
    Done,
    Failed,
    Skipped,
}

/// What a worker hands back for one node
struct NodeRun {
    actions: Vec<Vec<String>>,
    result: std::result::Result<(), String>,
}

/// Dependency bookkeeping shared between the coordinator and workers
struct Scheduler {
    prerequisites: DependencyMap,
    /// Transpose of `prerequisites`: who is waiting on whom
    unlocks: DependencyMap,
    states: BTreeMap<NodeId, NodeState>,
    waiting: BTreeMap<NodeId, usize>,
    eligible: BTreeSet<NodeId>,
    halted: Option<SkipReason>,
    policy: FailurePolicy,
    report: RunReport,
}

impl Scheduler {
    fn new(goal: &Goal, opts: &ExecuteOptions, prerequisites: DependencyMap) -> Self {
        let unlocks = prerequisites.backward();
        let waiting: BTreeMap<NodeId, usize> = prerequisites
            .iter()
            .map(|(id, prereqs)| (id, prereqs.len()))
            .collect();
        let eligible = prerequisites.tips();
        let states = prerequisites
            .nodes()
            .map(|id| {
                let state = if eligible.contains(&id) {
                    NodeState::Eligible
                } else {
                    NodeState::Pending
                };
                (id, state)
            })
            .collect();

        Self {
            report: RunReport {
                goal: goal.name.clone(),
                dry_run: opts.dry_run,
                nodes: Vec::with_capacity(prerequisites.len()),
            },
            prerequisites,
            unlocks,
            states,
            waiting,
            eligible,
            halted: None,
            policy: opts.failure_policy,
        }
    }

    /// Take the lowest eligible node and mark it running
    fn next_eligible(&mut self) -> Option<NodeId> {
        if self.halted.is_some() {
            return None;
        }
        let node = self.eligible.pop_first()?;
        self.states.insert(node, NodeState::Running);
        Some(node)
    }

    fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Stop scheduling; the first reason wins
    fn halt(&mut self, reason: SkipReason) {
        if self.halted.is_none() {
            log::info!("no further nodes will be scheduled: {reason}");
            self.halted = Some(reason);
        }
    }

    /// Record a finished node; returns every report that became terminal
    fn complete(&mut self, graph: &Graph, node: NodeId, run: NodeRun) -> Vec<NodeReport> {
        let label = graph.label(node);
        let mut terminal = Vec::new();

        match run.result {
            Ok(()) => {
                self.states.insert(node, NodeState::Done);
                let unlocked: Vec<NodeId> = self.unlocks.edges(node).collect();
                for next in unlocked {
                    if let Some(count) = self.waiting.get_mut(&next) {
                        *count = count.saturating_sub(1);
                        if *count == 0 && self.states.get(&next) == Some(&NodeState::Pending) {
                            self.states.insert(next, NodeState::Eligible);
                            self.eligible.insert(next);
                        }
                    }
                }
                terminal.push(NodeReport {
                    node,
                    label,
                    outcome: NodeOutcome::Done {
                        actions: run.actions.len(),
                    },
                    actions: run.actions,
                });
            }
            Err(error) => {
                log::warn!("{label} failed: {error}");
                self.states.insert(node, NodeState::Failed);
                terminal.push(NodeReport {
                    node,
                    label: label.clone(),
                    outcome: NodeOutcome::Failed { error },
                    actions: run.actions,
                });
                let reason = SkipReason::DependencyFailed { node, label };
                terminal.extend(self.skip_dependents(graph, node, &reason));
                if self.policy == FailurePolicy::Halt {
                    self.halt(SkipReason::Halted);
                }
            }
        }

        self.report.nodes.extend(terminal.iter().cloned());
        terminal
    }

    /// Skip every node that transitively waits on `failed`
    fn skip_dependents(
        &mut self,
        graph: &Graph,
        failed: NodeId,
        reason: &SkipReason,
    ) -> Vec<NodeReport> {
        let mut skipped = Vec::new();
        let mut queue: VecDeque<NodeId> = self.unlocks.edges(failed).collect();

        while let Some(next) = queue.pop_front() {
            if !matches!(
                self.states.get(&next),
                Some(NodeState::Pending | NodeState::Eligible)
            ) {
                continue;
            }
            self.states.insert(next, NodeState::Skipped);
            self.eligible.remove(&next);
            log::debug!("skipping {}: {}", graph.label(next), reason);
            skipped.push(NodeReport {
                node: next,
                label: graph.label(next),
                outcome: NodeOutcome::Skipped {
                    reason: reason.clone(),
                },
                actions: Vec::new(),
            });
            queue.extend(self.unlocks.edges(next));
        }

        skipped
    }

    /// Skip whatever never got scheduled
    fn drain(&mut self, graph: &Graph) -> Vec<NodeReport> {
        let reason = self.halted.clone().unwrap_or(SkipReason::Halted);
        let mut skipped = Vec::new();

        for node in self.prerequisites.topological_order() {
            if !matches!(
                self.states.get(&node),
                Some(NodeState::Pending | NodeState::Eligible)
            ) {
                continue;
            }
            self.states.insert(node, NodeState::Skipped);
            skipped.push(NodeReport {
                node,
                label: graph.label(node),
                outcome: NodeOutcome::Skipped {
                    reason: reason.clone(),
                },
                actions: Vec::new(),
            });
        }

        self.eligible.clear();
        self.report.nodes.extend(skipped.iter().cloned());
        skipped
    }
}

/// State of one execution
struct Run<'a> {
    graph: &'a Graph,
    planner: &'a dyn Planner,
    goal: &'a Goal,
    opts: &'a ExecuteOptions,
    frontend: &'a dyn Frontend,
    started: Instant,
    scheduler: Mutex<Scheduler>,
}

impl Run<'_> {
    fn lock(&self) -> MutexGuard<'_, Scheduler> {
        // A worker panic is caught before it can poison the lock, but recover anyway
        self.scheduler
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Time left before the deadline; `None` without a deadline
    fn time_left(&self) -> Option<Duration> {
        self.opts
            .deadline
            .map(|deadline| deadline.saturating_sub(self.started.elapsed()))
    }

    fn deadline_passed(&self) -> bool {
        self.time_left().is_some_and(|left| left.is_zero())
    }

    fn serial(&self) {
        loop {
            if self.deadline_passed() {
                self.lock().halt(SkipReason::DeadlineExceeded);
            }
            let Some(node) = self.lock().next_eligible() else {
                break;
            };
            let run = self.run_guarded(node);
            self.record(node, run);
        }
    }

    fn parallel(&self, jobs: usize) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("converge-{i}"))
            .build()?;
        let (tx, rx) = mpsc::channel::<(NodeId, NodeRun)>();

        pool.in_place_scope(|scope| {
            let mut in_flight = 0usize;

            loop {
                if self.deadline_passed() {
                    self.lock().halt(SkipReason::DeadlineExceeded);
                }

                while in_flight < jobs {
                    let Some(node) = self.lock().next_eligible() else {
                        break;
                    };
                    in_flight += 1;
                    let tx = tx.clone();
                    scope.spawn(move |_| {
                        let run = self.run_guarded(node);
                        // The coordinator outlives every worker
                        let _ = tx.send((node, run));
                    });
                }

                if in_flight == 0 {
                    break;
                }

                let received = match self.time_left() {
                    Some(left) if !self.lock().is_halted() => rx.recv_timeout(left),
                    _ => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };
                match received {
                    Ok((node, run)) => {
                        in_flight -= 1;
                        self.record(node, run);
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        self.lock().halt(SkipReason::DeadlineExceeded);
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Ok(())
    }

    fn record(&self, node: NodeId, run: NodeRun) {
        let terminal = self.lock().complete(self.graph, node, run);
        for report in &terminal {
            self.frontend
                .on_node_complete(report.node, &report.label, &report.outcome);
        }
    }

    fn run_guarded(&self, node: NodeId) -> NodeRun {
        panic::catch_unwind(AssertUnwindSafe(|| self.run_node(node))).unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            NodeRun {
                actions: Vec::new(),
                result: Err(format!("panicked: {message}")),
            }
        })
    }

    /// Plan one node and run its actions in order, stopping at the first error
    fn run_node(&self, node: NodeId) -> NodeRun {
        let label = self.graph.label(node);
        self.frontend.on_node_start(node, &label);

        let actions = match self.planner.actions(node, self.goal) {
            Ok(actions) => actions,
            Err(err) => {
                return NodeRun {
                    actions: Vec::new(),
                    result: Err(format!("{err:#}")),
                };
            }
        };

        let mut described = Vec::with_capacity(actions.len());
        for action in &actions {
            let description = action.description();
            self.frontend.on_action(node, &label, &description);
            if self.opts.verbose {
                for line in &description {
                    log::info!("{label}: {line}");
                }
            }
            described.push(description);

            if self.opts.dry_run {
                continue;
            }
            if let Err(err) = action.run() {
                return NodeRun {
                    actions: described,
                    result: Err(err.to_string()),
                };
            }
        }

        NodeRun {
            actions: described,
            result: Ok(()),
        }
    }

    fn finish(self) -> RunReport {
        let mut scheduler = self
            .scheduler
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for report in scheduler.drain(self.graph) {
            self.frontend
                .on_node_complete(report.node, &report.label, &report.outcome);
        }
        scheduler.report
    }
}
