//! Path resolution for terrace
//!
//! # Environment Variables
//!
//! - `TERRACE_FILE` - Terracefile to load when `--file` is not given
//!
//! # Terracefile Resolution Priority
//!
//! 1. `--file` flag
//! 2. `TERRACE_FILE` environment variable
//! 3. `Terracefile.toml` in the current directory or the nearest ancestor

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Environment variable for the Terracefile override
pub const ENV_FILE: &str = "TERRACE_FILE";

/// File name searched for when no file is given
pub const DEFAULT_FILE: &str = "Terracefile.toml";

/// Locate the Terracefile to load
///
/// `explicit` is the `--file` value; clap already falls back to
/// `TERRACE_FILE` for it. The returned path is always absolute.
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let expanded = expand(&path.to_string_lossy());
        let path = std::path::absolute(&expanded)
            .with_context(|| format!("Could not resolve {}", expanded.display()))?;
        log::debug!("Using Terracefile {}", path.display());
        return Ok(path);
    }

    let cwd = std::env::current_dir().context("Could not determine current directory")?;
    match find_upward(&cwd, DEFAULT_FILE) {
        Some(path) => {
            log::debug!("Found Terracefile {}", path.display());
            Ok(path)
        }
        None => bail!(
            "No {} found in {} or any parent directory (use --file or {})",
            DEFAULT_FILE,
            cwd.display(),
            ENV_FILE
        ),
    }
}

/// Search `start` and its ancestors for a file called `name`
pub fn find_upward(start: &Path, name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as they are.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand a path and anchor it at `base` if it is relative
pub fn resolve(base: &Path, path: &str) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Directory relative paths in a Terracefile are resolved against
pub fn base_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

// ============================================================================
// Tests
// ============================================================================
