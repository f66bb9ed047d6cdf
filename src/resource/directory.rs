//! Directory resource

use anyhow::Result;
use convergence::{
    ActionError, AttributeDiff, BoxedAction, BoxedPlan, Converge, ConvergePlan, FnAction,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::{Entry, Kind, References, fields, inspect};
use crate::config::Declaration;
use crate::paths;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectoryFields {
    path: String,
}

/// A directory that should exist
#[derive(Debug, Clone)]
pub struct Directory {
    pub path: PathBuf,
}

impl Directory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Converge for Directory {
    type Observed = Entry;

    fn subject(&self) -> String {
        format!("directory {}", self.path.display())
    }

    fn describe(&self) -> Result<Option<Entry>> {
        inspect(&self.path)
    }

    fn create(&self) -> Vec<BoxedAction> {
        let path = self.path.clone();
        vec![
            FnAction::new(format!("Create directory {}", self.path.display()), move || {
                fs::create_dir_all(&path)?;
                Ok(())
            })
            .boxed(),
        ]
    }

    fn diff(&self, observed: &Entry) -> AttributeDiff {
        let mut diff = AttributeDiff::new();
        diff.add("type", observed.name(), "directory");
        diff
    }

    fn update(&self, observed: &Entry, diff: &AttributeDiff) -> Vec<BoxedAction> {
        // Never replace whatever is in the way
        let message = format!(
            "{} exists and is a {}, not a directory",
            self.path.display(),
            observed.name()
        );
        vec![
            FnAction::new(format!("Replace {}", self.path.display()), move || {
                Err(ActionError::failed(message.clone()))
            })
            .with_lines(diff.lines())
            .boxed(),
        ]
    }

    fn destroy(&self, observed: &Entry) -> Vec<BoxedAction> {
        if *observed != Entry::Directory {
            return Vec::new();
        }
        let path = self.path.clone();
        vec![
            FnAction::new(format!("Remove directory {}", self.path.display()), move || {
                // Only empty directories; managed contents are removed first
                fs::remove_dir(&path).map_err(|e| {
                    ActionError::failed(format!("Failed to remove {}: {e}", path.display()))
                })
            })
            .boxed(),
        ]
    }
}

/// `kind = "directory"`
pub struct DirectoryKind;

impl Kind for DirectoryKind {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn build(&self, decl: &Declaration, _refs: &References<'_>, base: &Path) -> Result<BoxedPlan> {
        let fields: DirectoryFields = fields(decl)?;
        Ok(Box::new(ConvergePlan(Directory::new(paths::resolve(
            base,
            &fields.path,
        )))))
    }
}
