//! Wait-for resource - blocks dependents until a path appears
//!
//! Useful when something outside the Terracefile produces a file (a mount,
//! a socket, a generated certificate) that later resources need.

use anyhow::Result;
use convergence::{
    AttributeDiff, BoxedAction, BoxedPlan, Converge, ConvergePlan, Readiness, RetryPolicy, WaitFor,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Entry, Kind, References, fields, inspect};
use crate::config::Declaration;
use crate::paths;

const DEFAULT_ATTEMPTS: u32 = 60;
const DEFAULT_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WaitForFields {
    path: String,
    #[serde(default = "default_attempts")]
    attempts: u32,
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,
}

fn default_attempts() -> u32 {
    DEFAULT_ATTEMPTS
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

/// Wait until `path` exists
#[derive(Debug, Clone)]
pub struct PathWait {
    pub path: PathBuf,
    pub policy: RetryPolicy,
}

impl PathWait {
    pub fn new(path: impl AsRef<Path>, policy: RetryPolicy) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            policy,
        }
    }
}

impl Converge for PathWait {
    type Observed = Entry;

    fn subject(&self) -> String {
        format!("path {}", self.path.display())
    }

    fn describe(&self) -> Result<Option<Entry>> {
        inspect(&self.path)
    }

    fn create(&self) -> Vec<BoxedAction> {
        let path = self.path.clone();
        let wait = WaitFor::new(
            format!("{} to exist", self.path.display()),
            self.policy.clone(),
            move || match inspect(&path) {
                Ok(Some(_)) => Ok(Readiness::Ready),
                Ok(None) => Ok(Readiness::Pending {
                    observed: "missing".to_string(),
                }),
                Err(e) => Err(e.into()),
            },
        );
        vec![wait.boxed()]
    }

    /// Anything at the path satisfies the wait
    fn diff(&self, _observed: &Entry) -> AttributeDiff {
        AttributeDiff::new()
    }

    fn update(&self, _observed: &Entry, _diff: &AttributeDiff) -> Vec<BoxedAction> {
        Vec::new()
    }

    /// The path is not ours to remove
    fn destroy(&self, _observed: &Entry) -> Vec<BoxedAction> {
        Vec::new()
    }
}

/// `kind = "wait_for"`
pub struct WaitForKind;

impl Kind for WaitForKind {
    fn name(&self) -> &'static str {
        "wait_for"
    }

    fn build(&self, decl: &Declaration, _refs: &References<'_>, base: &Path) -> Result<BoxedPlan> {
        let fields: WaitForFields = fields(decl)?;
        anyhow::ensure!(fields.attempts > 0, "attempts must be at least 1");
        let policy = RetryPolicy::fixed(fields.attempts, Duration::from_millis(fields.interval_ms));
        Ok(Box::new(ConvergePlan(PathWait::new(
            paths::resolve(base, &fields.path),
            policy,
        ))))
    }
}
