//! Symlink resource

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
struct SymlinkFields {
    source: String,
    target: String,
}

/// A symlink at `target` pointing to `source`
#[derive(Debug, Clone)]
pub struct Symlink {
    /// Source path (what the symlink points to)
    pub source: PathBuf,
    /// Target path (where the symlink is created)
    pub target: PathBuf,
}

impl Symlink {
    pub fn new(source: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            target: target.as_ref().to_path_buf(),
        }
    }

    /// Where an existing link really points, canonicalized when possible
    fn resolve_link(&self, link: &Path) -> PathBuf {
        if link.is_absolute() {
            link.canonicalize().unwrap_or_else(|_| link.to_path_buf())
        } else {
            self.target
                .parent()
                .map(|p| p.join(link))
                .and_then(|p| p.canonicalize().ok())
                .unwrap_or_else(|| link.to_path_buf())
        }
    }

    fn expected(&self) -> PathBuf {
        self.source
            .canonicalize()
            .unwrap_or_else(|_| self.source.clone())
    }

    fn link_action(&self, verb: &str, replace: bool) -> BoxedAction {
        let source = self.source.clone();
        let target = self.target.clone();
        let description = format!(
            "{verb} symlink {} -> {}",
            self.target.display(),
            self.source.display()
        );
        FnAction::new(description, move || link(&source, &target, replace)).boxed()
    }
}

fn link(source: &Path, target: &Path, replace: bool) -> Result<(), ActionError> {
    if !source.exists() {
        return Err(ActionError::failed(format!(
            "Source does not exist: {}",
            source.display()
        )));
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    if replace && target.is_symlink() {
        fs::remove_file(target)?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(source, target).map_err(|e| {
        ActionError::failed(format!(
            "Failed to create symlink {} -> {}: {e}",
            target.display(),
            source.display()
        ))
    })?;

    #[cfg(not(unix))]
    return Err(ActionError::failed("Symlinks not supported on this platform"));

    Ok(())
}

impl Converge for Symlink {
    type Observed = Entry;

    fn subject(&self) -> String {
        format!("symlink {}", self.target.display())
    }

    fn describe(&self) -> Result<Option<Entry>> {
        inspect(&self.target)
    }

    fn create(&self) -> Vec<BoxedAction> {
        vec![self.link_action("Create", false)]
    }

    fn diff(&self, observed: &Entry) -> AttributeDiff {
        let mut diff = AttributeDiff::new();
        diff.add("type", observed.name(), "symlink");
        if let Entry::Symlink(link) = observed {
            let actual = self.resolve_link(link).display().to_string();
            let expected = self.expected().display().to_string();
            diff.add("source", &actual, &expected);
        }
        diff
    }

    fn update(&self, observed: &Entry, diff: &AttributeDiff) -> Vec<BoxedAction> {
        if let Entry::Symlink(_) = observed {
            return vec![self.link_action("Repoint", true)];
        }

        // Don't overwrite existing files automatically
        let message = format!(
            "{} exists and is a {}, not a symlink",
            self.target.display(),
            observed.name()
        );
        vec![
            FnAction::new(format!("Replace {}", self.target.display()), move || {
                Err(ActionError::failed(message.clone()))
            })
            .with_lines(diff.lines())
            .boxed(),
        ]
    }

    fn destroy(&self, observed: &Entry) -> Vec<BoxedAction> {
        if !matches!(observed, Entry::Symlink(_)) {
            return Vec::new();
        }
        let target = self.target.clone();
        vec![
            FnAction::new(format!("Remove symlink {}", self.target.display()), move || {
                fs::remove_file(&target)?;
                Ok(())
            })
            .boxed(),
        ]
    }
}

/// `kind = "symlink"`
pub struct SymlinkKind;

impl Kind for SymlinkKind {
    fn name(&self) -> &'static str {
        "symlink"
    }

    fn build(&self, decl: &Declaration, _refs: &References<'_>, base: &Path) -> Result<BoxedPlan> {
        let fields: SymlinkFields = fields(decl)?;
        let symlink = Symlink::new(
            paths::resolve(base, &fields.source),
            paths::resolve(base, &fields.target),
        );
        Ok(Box::new(ConvergePlan(symlink)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use convergence::{Goal, Plan};
    use tempfile::TempDir;

    fn run(plan: &dyn Plan, goal: &Goal) -> usize {
        let actions = plan.actions(goal).unwrap();
        for action in &actions {
            action.run().unwrap();
        }
        actions.len()
    }

    #[test]
    fn test_create_and_converge() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("dotfiles").join("gitconfig");
        let target = tmp.path().join("home").join(".gitconfig");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "[user]").unwrap();

        let plan = ConvergePlan(Symlink::new(&source, &target));
        assert_eq!(run(&plan, &Goal::apply()), 1);
        assert_eq!(fs::read_link(&target).unwrap(), source);
        assert_eq!(run(&plan, &Goal::apply()), 0);
    }

    #[test]
    fn test_wrong_target_is_repointed() {
        let tmp = TempDir::new().unwrap();
        let old = tmp.path().join("old");
        let new = tmp.path().join("new");
        let target = tmp.path().join("link");
        fs::write(&old, "a").unwrap();
        fs::write(&new, "b").unwrap();
        std::os::unix::fs::symlink(&old, &target).unwrap();

        let plan = ConvergePlan(Symlink::new(&new, &target));
        let actions = plan.actions(&Goal::apply()).unwrap();
        assert!(actions[0].description()[0].starts_with("Repoint symlink"));
        actions[0].run().unwrap();
        assert_eq!(fs::read_link(&target).unwrap(), new);
    }

    #[test]
    fn test_regular_file_is_not_overwritten() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source");
        let target = tmp.path().join("target");
        fs::write(&source, "a").unwrap();
        fs::write(&target, "mine").unwrap();

        let plan = ConvergePlan(Symlink::new(&source, &target));
        let actions = plan.actions(&Goal::apply()).unwrap();
        assert!(actions[0].run().is_err());
        assert_eq!(fs::read_to_string(&target).unwrap(), "mine");
    }

    #[test]
    fn test_missing_source_fails_at_run_time() {
        let tmp = TempDir::new().unwrap();
        let plan = ConvergePlan(Symlink::new(
            tmp.path().join("absent"),
            tmp.path().join("link"),
        ));
        let actions = plan.actions(&Goal::apply()).unwrap();
        let err = actions[0].run().unwrap_err();
        assert!(err.to_string().starts_with("Source does not exist"));
    }

    #[test]
    fn test_destroy_only_removes_links() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source");
        let target = tmp.path().join("target");
        fs::write(&source, "a").unwrap();
        std::os::unix::fs::symlink(&source, &target).unwrap();

        let plan = ConvergePlan(Symlink::new(&source, &target));
        assert_eq!(run(&plan, &Goal::destroy()), 1);
        assert!(!target.exists());
        assert!(source.exists());
        assert_eq!(run(&plan, &Goal::destroy()), 0);
    }
}
