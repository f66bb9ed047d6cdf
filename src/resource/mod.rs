//! Resource kinds that can be declared in a Terracefile
//!
//! Every kind turns one `[[resource]]` table into a [`BoxedPlan`]. Kinds are
//! looked up by name in a [`KindRegistry`]; the loader in `config` resolves
//! reference fields to other declarations before a kind is asked to build.

use anyhow::{Context, Result};
use convergence::BoxedPlan;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Declaration, LoadError};

pub mod directory;
pub mod file;
pub mod symlink;
pub mod wait_for;

pub use directory::{Directory, DirectoryKind};
pub use file::{File, FileKind};
pub use symlink::{Symlink, SymlinkKind};
pub use wait_for::{PathWait, WaitForKind};

/// Declarations that a resource's reference fields point at, keyed by field
pub type References<'a> = BTreeMap<&'static str, &'a Declaration>;

/// A declarable resource kind
pub trait Kind: Send + Sync {
    /// Name used in the `kind` field
    fn name(&self) -> &'static str;

    /// Fields holding a selector expression that names another resource
    ///
    /// Each resolves to exactly one declaration and adds a dependency on it.
    fn references(&self) -> &'static [&'static str] {
        &[]
    }

    /// Build the plan for one declaration
    ///
    /// `base` is the directory relative paths are resolved against.
    fn build(&self, decl: &Declaration, refs: &References<'_>, base: &Path) -> Result<BoxedPlan>;
}

/// Registry of resource kinds, looked up by name
#[derive(Default)]
pub struct KindRegistry {
    kinds: BTreeMap<&'static str, Box<dyn Kind>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in kind
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DirectoryKind);
        registry.register(FileKind);
        registry.register(SymlinkKind);
        registry.register(WaitForKind);
        registry
    }

    pub fn register(&mut self, kind: impl Kind + 'static) {
        self.kinds.insert(kind.name(), Box::new(kind));
    }

    pub fn get(&self, name: &str) -> Result<&dyn Kind, LoadError> {
        self.kinds
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| LoadError::UnknownKind {
                kind: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.kinds.keys().copied().collect()
    }
}

/// Deserialize a declaration's kind-specific fields into `T`
pub fn fields<T: DeserializeOwned>(decl: &Declaration) -> Result<T> {
    toml::Value::Table(decl.fields.clone())
        .try_into()
        .with_context(|| format!("Invalid fields for {}", decl.label()))
}

/// What currently occupies a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Directory,
    File,
    Symlink(PathBuf),
}

impl Entry {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::File => "file",
            Self::Symlink(_) => "symlink",
        }
    }
}

/// Inspect a path without following symlinks; `None` if nothing is there
pub fn inspect(path: &Path) -> Result<Option<Entry>> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to inspect {}", path.display()));
        }
    };

    let entry = if meta.file_type().is_symlink() {
        let target =
            fs::read_link(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Entry::Symlink(target)
    } else if meta.is_dir() {
        Entry::Directory
    } else {
        Entry::File
    };
    Ok(Some(entry))
}
