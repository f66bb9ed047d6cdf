//! Terracefile loading
//!
//! A Terracefile is TOML: an optional `[settings]` table and any number of
//! `[[resource]]` tables. Every resource has a `kind`, an optional `name`, an
//! optional `depends_on` list of selector expressions, and kind-specific
//! fields.
//!
//! ```toml
//! [settings]
//! jobs = 8
//!
//! [[resource]]
//! kind = "directory"
//! name = "app"
//! path = "~/srv/app"
//!
//! [[resource]]
//! kind = "file"
//! name = "motd"
//! directory = "app"
//! path = "motd.txt"
//! content = "hello\n"
//! ```
//!
//! Loading is two-phase: every declaration is indexed first, then references
//! are resolved against the full index, so a resource may refer to one
//! declared later in the file.

use anyhow::{Context, Result};
use convergence::{Graph, NodeId, Selector, Workspace};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::resource::{KindRegistry, References};

/// Parsed Terracefile
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Terracefile {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, rename = "resource")]
    pub resources: Vec<Declaration>,
}

/// Execution defaults; command-line flags take precedence
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub jobs: Option<usize>,
    #[serde(default)]
    pub serial: bool,
    #[serde(default)]
    pub fail_fast: bool,
    pub timeout_secs: Option<u64>,
}

/// One `[[resource]]` table
#[derive(Debug, Clone, Deserialize)]
pub struct Declaration {
    pub kind: String,
    pub name: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Everything else, interpreted by the kind
    #[serde(flatten)]
    pub fields: toml::Table,
}

impl Declaration {
    /// e.g. `file 'motd'`
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} '{}'", self.kind, name),
            None => self.kind.clone(),
        }
    }

    /// A string field, if present
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(toml::Value::as_str)
    }
}

/// Errors in the declarations themselves
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unknown resource kind '{kind}' (available: {available})")]
    UnknownKind { kind: String, available: String },

    #[error("{kind} '{name}' is declared more than once")]
    Duplicate { kind: String, name: String },

    #[error("{resource}: {field} = '{expression}' does not match any resource")]
    Unresolved {
        resource: String,
        field: String,
        expression: String,
    },

    #[error("{resource}: {field} = '{expression}' is ambiguous (matches {matches})")]
    Ambiguous {
        resource: String,
        field: String,
        expression: String,
        matches: String,
    },

    #[error("{resource}: {field} must be a string")]
    NotAString { resource: String, field: String },
}

impl Terracefile {
    /// Read and parse a Terracefile
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid Terracefile {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build the resource graph, resolving paths against `base`
    pub fn build(&self, kinds: &KindRegistry, base: &Path) -> Result<Workspace> {
        let index = self.index(kinds)?;
        let selector = Selector::new(&index)?;
        let mut workspace = Workspace::new();
        let mut edges: Vec<(NodeId, Vec<NodeId>)> = Vec::with_capacity(self.resources.len());

        for decl in &self.resources {
            let kind = kinds.get(&decl.kind)?;
            let mut refs = References::new();
            let mut dependencies = Vec::new();

            for &field in kind.references() {
                let Some(value) = decl.fields.get(field) else {
                    continue;
                };
                let expression = value.as_str().ok_or_else(|| LoadError::NotAString {
                    resource: decl.label(),
                    field: field.to_string(),
                })?;
                let target = resolve(&selector, &index, decl, field, expression)?;
                refs.insert(field, &self.resources[target.index()]);
                dependencies.push(target);
            }

            for expression in &decl.depends_on {
                dependencies.push(resolve(
                    &selector,
                    &index,
                    decl,
                    "depends_on",
                    expression,
                )?);
            }

            let plan = kind
                .build(decl, &refs, base)
                .with_context(|| format!("Failed to load {}", decl.label()))?;
            let id = workspace.add_boxed(decl.kind.clone(), decl.name.clone(), plan);
            edges.push((id, dependencies));
        }

        for (id, dependencies) in edges {
            for dependency in dependencies {
                workspace.add_dependency(id, dependency)?;
            }
        }

        log::debug!("loaded {} resources", workspace.len());
        Ok(workspace)
    }

    /// First phase: one node per declaration, no edges
    fn index(&self, kinds: &KindRegistry) -> Result<Graph, LoadError> {
        let mut index = Graph::new();
        let mut seen = BTreeSet::new();

        for decl in &self.resources {
            kinds.get(&decl.kind)?;
            if let Some(name) = &decl.name
                && !seen.insert((decl.kind.as_str(), name.as_str()))
            {
                return Err(LoadError::Duplicate {
                    kind: decl.kind.clone(),
                    name: name.clone(),
                });
            }
            index.add_node(decl.kind.clone(), decl.name.clone());
        }

        Ok(index)
    }
}

/// Resolve a reference to exactly one declaration
fn resolve(
    selector: &Selector<'_>,
    index: &Graph,
    decl: &Declaration,
    field: &str,
    expression: &str,
) -> Result<NodeId, LoadError> {
    let matches = selector.find(&[expression]);
    match matches.as_slice() {
        [single] => Ok(*single),
        [] => Err(LoadError::Unresolved {
            resource: decl.label(),
            field: field.to_string(),
            expression: expression.to_string(),
        }),
        many => Err(LoadError::Ambiguous {
            resource: decl.label(),
            field: field.to_string(),
            expression: expression.to_string(),
            matches: many
                .iter()
                .map(|id| index.label(*id))
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Per-kind resource counts, for `--debug` output
pub fn kind_counts(file: &Terracefile) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for decl in &file.resources {
        *counts.entry(decl.kind.as_str()).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use convergence::Goal;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[settings]
jobs = 2
fail_fast = true

[[resource]]
kind = "file"
name = "motd"
directory = "app"
path = "motd.txt"
content = "hello\n"

[[resource]]
kind = "directory"
name = "app"
path = "srv/app"

[[resource]]
kind = "directory"
name = "logs"
path = "srv/logs"
depends_on = ["directory:app"]
"#;

    fn build(content: &str, base: &Path) -> Result<Workspace> {
        Terracefile::parse(content)?.build(&KindRegistry::with_builtins(), base)
    }

    #[test]
    fn test_parse_settings_and_resources() {
        let file = Terracefile::parse(SAMPLE).unwrap();
        assert_eq!(
            file.settings,
            Settings {
                jobs: Some(2),
                serial: false,
                fail_fast: true,
                timeout_secs: None,
            }
        );
        assert_eq!(file.resources.len(), 3);
        assert_eq!(file.resources[0].label(), "file 'motd'");
        assert_eq!(file.resources[0].field_str("content"), Some("hello\n"));
        assert_eq!(file.resources[2].depends_on, vec!["directory:app"]);
        assert_eq!(kind_counts(&file).get("directory"), Some(&2));
    }

    #[test]
    fn test_empty_file_is_valid() {
        let file = Terracefile::parse("").unwrap();
        assert!(file.resources.is_empty());
        assert_eq!(file.settings, Settings::default());
    }

    #[test]
    fn test_unknown_setting_rejected() {
        assert!(Terracefile::parse("[settings]\nthreads = 3\n").is_err());
    }

    #[test]
    fn test_forward_references_become_dependencies() {
        let tmp = TempDir::new().unwrap();
        let ws = build(SAMPLE, tmp.path()).unwrap();
        let graph = ws.graph();

        let motd = graph.find("file", "motd").unwrap();
        let app = graph.find("directory", "app").unwrap();
        let logs = graph.find("directory", "logs").unwrap();
        assert_eq!(graph.dependencies(motd).collect::<Vec<_>>(), vec![app]);
        assert_eq!(graph.dependencies(logs).collect::<Vec<_>>(), vec![app]);
        assert_eq!(graph.dependencies(app).count(), 0);
    }

    #[test]
    fn test_referenced_directory_anchors_relative_path() {
        let tmp = TempDir::new().unwrap();
        let ws = build(SAMPLE, tmp.path()).unwrap();
        let motd = ws.graph().find("file", "motd").unwrap();

        let actions = ws.plan(motd).unwrap().actions(&Goal::apply()).unwrap();
        let expected = tmp.path().join("srv/app/motd.txt");
        assert_eq!(
            actions[0].description()[0],
            format!("Create file {}", expected.display())
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let content = r#"
[[resource]]
kind = "directory"
name = "app"
path = "a"

[[resource]]
kind = "directory"
name = "app"
path = "b"
"#;
        let err = build(content, Path::new("/tmp")).unwrap_err();
        assert_eq!(err.to_string(), "directory 'app' is declared more than once");
    }

    #[test]
    fn test_unresolved_reference_rejected() {
        let content = r#"
[[resource]]
kind = "directory"
name = "app"
path = "a"
depends_on = ["bucket:logs"]
"#;
        let err = build(content, Path::new("/tmp")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "directory 'app': depends_on = 'bucket:logs' does not match any resource"
        );
    }

    #[test]
    fn test_ambiguous_reference_rejected() {
        let content = r#"
[[resource]]
kind = "directory"
name = "a"
path = "a"

[[resource]]
kind = "directory"
name = "b"
path = "b"

[[resource]]
kind = "file"
name = "f"
path = "f.txt"
content = ""
directory = "directory"
"#;
        let err = build(content, Path::new("/tmp")).unwrap_err();
        assert!(err.to_string().contains("is ambiguous"));
        assert!(err.to_string().contains("directory 'a', directory 'b'"));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let content = r#"
[[resource]]
kind = "directory"
name = "app"
path = "a"
depends_on = ["app"]
"#;
        let err = build(content, Path::new("/tmp")).unwrap_err();
        assert!(err.to_string().contains("cannot depend on itself"));
    }

    #[test]
    fn test_cycle_detected_by_selector() {
        let content = r#"
[[resource]]
kind = "directory"
name = "a"
path = "a"
depends_on = ["directory:b"]

[[resource]]
kind = "directory"
name = "b"
path = "b"
depends_on = ["directory:a"]
"#;
        let ws = build(content, Path::new("/tmp")).unwrap();
        let err = ws.selector().err().unwrap();
        assert!(err.to_string().starts_with("dependency cycle: "));
    }

    #[test]
    fn test_load_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Terracefile.toml");
        fs::write(&path, "[[resource]]\nname = 3\n").unwrap();
        let err = Terracefile::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Terracefile.toml"));
    }
}
