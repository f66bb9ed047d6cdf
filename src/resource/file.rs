//! File resource - a regular file with exact content
//!
//! Content is compared by blake3 digest. Update descriptions carry a line
//! diff of the current and declared content.

use anyhow::{Context, Result, bail};
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
struct FileFields {
    path: String,
    content: String,
    /// Reference to a directory resource; relative paths are anchored there
    #[allow(dead_code)]
    directory: Option<String>,
}

/// A file that should exist with exactly `content`
#[derive(Debug, Clone)]
pub struct File {
    pub path: PathBuf,
    pub content: String,
}

/// What was found at the file's path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub entry: Entry,
    /// blake3 of the current bytes, for regular files
    pub digest: Option<String>,
    /// Current content, for regular files holding valid UTF-8
    pub content: Option<String>,
}

impl File {
    pub fn new(path: impl AsRef<Path>, content: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            content: content.into(),
        }
    }

    fn digest(&self) -> String {
        blake3::hash(self.content.as_bytes()).to_hex().to_string()
    }

    fn write_action(&self, verb: &str, lines: Vec<String>) -> BoxedAction {
        let path = self.path.clone();
        let content = self.content.clone();
        FnAction::new(format!("{verb} file {}", self.path.display()), move || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &content)?;
            Ok(())
        })
        .with_lines(lines)
        .boxed()
    }
}

impl Converge for File {
    type Observed = FileState;

    fn subject(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn describe(&self) -> Result<Option<FileState>> {
        let Some(entry) = inspect(&self.path)? else {
            return Ok(None);
        };
        if entry != Entry::File {
            return Ok(Some(FileState {
                entry,
                digest: None,
                content: None,
            }));
        }

        let bytes =
            fs::read(&self.path).with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(Some(FileState {
            entry,
            digest: Some(blake3::hash(&bytes).to_hex().to_string()),
            content: String::from_utf8(bytes).ok(),
        }))
    }

    fn create(&self) -> Vec<BoxedAction> {
        vec![self.write_action("Create", content_lines("", &self.content))]
    }

    fn diff(&self, observed: &FileState) -> AttributeDiff {
        let mut diff = AttributeDiff::new();
        diff.add("type", observed.entry.name(), "file");
        if observed.entry == Entry::File {
            let current = observed.digest.as_deref().map_or("-", short);
            let desired = self.digest();
            diff.add("digest", current, short(&desired));
        }
        diff
    }

    fn update(&self, observed: &FileState, diff: &AttributeDiff) -> Vec<BoxedAction> {
        if observed.entry != Entry::File {
            let message = format!(
                "{} exists and is a {}, not a file",
                self.path.display(),
                observed.entry.name()
            );
            return vec![
                FnAction::new(format!("Replace {}", self.path.display()), move || {
                    Err(ActionError::failed(message.clone()))
                })
                .with_lines(diff.lines())
                .boxed(),
            ];
        }

        let lines = match &observed.content {
            Some(current) => content_lines(current, &self.content),
            None => vec!["    (current content is binary)".to_string()],
        };
        vec![self.write_action("Update", lines)]
    }

    fn destroy(&self, observed: &FileState) -> Vec<BoxedAction> {
        if observed.entry != Entry::File {
            return Vec::new();
        }
        let path = self.path.clone();
        vec![
            FnAction::new(format!("Remove file {}", self.path.display()), move || {
                fs::remove_file(&path)?;
                Ok(())
            })
            .boxed(),
        ]
    }

    fn report(&self, observed: Option<&FileState>) -> Vec<String> {
        match observed {
            Some(FileState {
                digest: Some(digest),
                ..
            }) => vec![format!("{} exists (blake3 {})", self.subject(), short(digest))],
            Some(state) => vec![format!(
                "{} is occupied by a {}",
                self.subject(),
                state.entry.name()
            )],
            None => vec![format!("{} does not exist", self.subject())],
        }
    }
}

fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

/// `- old` / `+ new` lines for every changed line
fn content_lines(current: &str, desired: &str) -> Vec<String> {
    let diff = similar::TextDiff::from_lines(current, desired);
    diff.iter_all_changes()
        .filter_map(|change| {
            let sign = match change.tag() {
                similar::ChangeTag::Delete => '-',
                similar::ChangeTag::Insert => '+',
                similar::ChangeTag::Equal => return None,
            };
            Some(format!("    {sign} {}", change.value().trim_end_matches('\n')))
        })
        .collect()
}

/// `kind = "file"`
pub struct FileKind;

impl Kind for FileKind {
    fn name(&self) -> &'static str {
        "file"
    }

    fn references(&self) -> &'static [&'static str] {
        &["directory"]
    }

    fn build(&self, decl: &Declaration, refs: &References<'_>, base: &Path) -> Result<BoxedPlan> {
        let fields: FileFields = fields(decl)?;

        let anchor = match refs.get("directory") {
            Some(dir) => {
                if dir.kind != "directory" {
                    bail!("directory must refer to a directory, not {}", dir.label());
                }
                let path = dir
                    .field_str("path")
                    .with_context(|| format!("{} has no path", dir.label()))?;
                paths::resolve(base, path)
            }
            None => base.to_path_buf(),
        };

        let path = paths::resolve(&anchor, &fields.path);
        Ok(Box::new(ConvergePlan(File::new(path, fields.content))))
    }
}
