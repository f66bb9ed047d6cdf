//! Actions - single describable units of work for one node
//!
//! A plan produces a finite list of actions per node and goal. The executor
//! reports each action's description and, unless it is a dry run, calls
//! `run()`. Actions carry no dependencies of their own: their order is the
//! order of the list and the position of their node in the graph.

use crate::error::ActionError;
use std::fmt;
use std::thread;
use std::time::Duration;

/// Outcome of a readiness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The awaited condition holds
    Ready,
    /// Not there yet; `observed` describes the current state
    Pending { observed: String },
}

/// A single idempotent unit of work
pub trait Action: Send + Sync {
    /// Human-readable lines describing what `run()` will do
    fn description(&self) -> Vec<String>;

    /// Perform the effect
    fn run(&self) -> Result<(), ActionError>;

    /// Readiness probe used by wait-style actions
    ///
    /// Must be side-effect free. Actions that do not wait are always ready.
    fn check(&self) -> Result<Readiness, ActionError> {
        Ok(Readiness::Ready)
    }
}

/// A boxed action for type-erased storage
pub type BoxedAction = Box<dyn Action>;

/// Action backed by a closure
pub struct FnAction<F> {
    description: Vec<String>,
    run: F,
}

impl<F> FnAction<F>
where
    F: Fn() -> Result<(), ActionError> + Send + Sync,
{
    pub fn new(description: impl Into<String>, run: F) -> Self {
        Self {
            description: vec![description.into()],
            run,
        }
    }

    /// Append an extra description line (e.g. a field diff)
    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.description.push(line.into());
        self
    }

    /// Append several description lines
    pub fn with_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.description.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn boxed(self) -> BoxedAction
    where
        F: 'static,
    {
        Box::new(self)
    }
}

impl<F> Action for FnAction<F>
where
    F: Fn() -> Result<(), ActionError> + Send + Sync,
{
    fn description(&self) -> Vec<String> {
        self.description.clone()
    }

    fn run(&self) -> Result<(), ActionError> {
        (self.run)()
    }
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Bounded polling schedule for wait-style actions
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of checks (including the first)
    pub max_attempts: u32,
    /// Delay after the first failed check
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each failed check (1.0 = fixed)
    pub backoff_factor: f64,
    /// Upper bound on a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            base_delay: Duration::from_secs(5),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Fixed interval between checks
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: interval,
            backoff_factor: 1.0,
            max_delay: interval,
        }
    }

    /// Delay to sleep after the given (0-indexed) failed attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(attempt as i32);
        let delay = self.base_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

type Probe = dyn Fn() -> Result<Readiness, ActionError> + Send + Sync;

/// Polls a probe until it reports ready or the retry budget runs out
pub struct WaitFor {
    target: String,
    policy: RetryPolicy,
    probe: Box<Probe>,
}

impl WaitFor {
    /// Wait until `probe` reports [`Readiness::Ready`]
    ///
    /// `target` names the awaited state for descriptions and timeout errors.
    pub fn new<P>(target: impl Into<String>, policy: RetryPolicy, probe: P) -> Self
    where
        P: Fn() -> Result<Readiness, ActionError> + Send + Sync + 'static,
    {
        Self {
            target: target.into(),
            policy,
            probe: Box::new(probe),
        }
    }

    pub fn boxed(self) -> BoxedAction {
        Box::new(self)
    }
}

impl Action for WaitFor {
    fn description(&self) -> Vec<String> {
        vec![format!("Wait for {}", self.target)]
    }

    fn check(&self) -> Result<Readiness, ActionError> {
        (self.probe)()
    }

    fn run(&self) -> Result<(), ActionError> {
        let mut observed = String::from("unknown");

        for attempt in 0..self.policy.max_attempts {
            match self.check()? {
                Readiness::Ready => return Ok(()),
                Readiness::Pending { observed: now } => observed = now,
            }

            if attempt + 1 < self.policy.max_attempts {
                let delay = self.policy.delay_for_attempt(attempt);
                log::debug!(
                    "{} not ready ({}), attempt {}/{}, retrying in {:?}",
                    self.target,
                    observed,
                    attempt + 1,
                    self.policy.max_attempts,
                    delay
                );
                thread::sleep(delay);
            }
        }

        Err(ActionError::Timeout {
            target: self.target.clone(),
            observed,
            attempts: self.policy.max_attempts,
        })
    }
}

impl fmt::Debug for WaitFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitFor")
            .field("target", &self.target)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_fn_action_runs_closure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let action = FnAction::new("Create bucket", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .with_line("    name: 'logs'");

        assert_eq!(
            action.description(),
            vec!["Create bucket".to_string(), "    name: 'logs'".to_string()]
        );
        assert_eq!(action.check(), Ok(Readiness::Ready));
        action.run().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_policy_does_not_grow() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(20));
    }

    #[test]
    fn test_wait_for_eventual_success() {
        let checks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&checks);
        let wait = WaitFor::new("subnet available", quick(5), move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(Readiness::Pending {
                    observed: "pending".into(),
                })
            } else {
                Ok(Readiness::Ready)
            }
        });

        wait.run().unwrap();
        assert_eq!(checks.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_wait_for_times_out_with_context() {
        let wait = WaitFor::new("gateway attached", quick(3), || {
            Ok(Readiness::Pending {
                observed: "detached".into(),
            })
        });

        let err = wait.run().unwrap_err();
        assert_eq!(
            err,
            ActionError::Timeout {
                target: "gateway attached".into(),
                observed: "detached".into(),
                attempts: 3,
            }
        );
        assert_eq!(wait.description(), vec!["Wait for gateway attached"]);
    }

    #[test]
    fn test_wait_for_probe_error_aborts_immediately() {
        let checks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&checks);
        let wait = WaitFor::new("attached", quick(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ActionError::failed("gateway in unexpected state 'deleted'"))
        });

        let err = wait.run().unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(checks.load(Ordering::SeqCst), 1);
    }
}
