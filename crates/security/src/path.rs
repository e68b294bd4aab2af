//! Path validation: filesystem sandboxing to the workspace directory.
//!
//! Ensures file tools can only touch paths within allowed roots and
//! blocks access to forbidden paths (e.g., ~/.ssh, /etc). Relative paths
//! are resolved against the workspace, symlinks are followed before the
//! containment check.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path is empty")]
    Empty,

    #[error("Path '{path}' is outside the workspace")]
    OutsideAllowedRoots { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Failed to resolve path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Where file tools may read and write.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    base: PathBuf,
    /// Empty = unrestricted
    roots: Vec<PathBuf>,
    forbidden: Vec<(String, PathBuf)>,
}

impl PathPolicy {
    /// Confine access to `base` plus any `extra_roots`.
    pub fn workspace(base: impl Into<PathBuf>, extra_roots: &[String], forbidden: &[String]) -> Self {
        let base = resolve_existing(&base.into());
        let mut roots = vec![base.clone()];
        roots.extend(extra_roots.iter().map(|r| resolve_existing(Path::new(&expand_tilde(r)))));
        Self {
            base,
            roots,
            forbidden: forbidden_list(forbidden),
        }
    }

    /// Allow any path except the forbidden ones. Relative paths still
    /// resolve against `base`.
    pub fn unrestricted(base: impl Into<PathBuf>, forbidden: &[String]) -> Self {
        Self {
            base: resolve_existing(&base.into()),
            roots: Vec::new(),
            forbidden: forbidden_list(forbidden),
        }
    }

    /// The directory relative paths are resolved against.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Validate that a path is safe to access.
    ///
    /// Checks:
    /// 1. `~` is expanded and relative paths are joined to the workspace
    /// 2. `.` and `..` are folded, then the longest existing prefix is
    ///    canonicalized so symlinks cannot escape
    /// 3. Path is not under a forbidden path
    /// 4. Path is within an allowed root (if any are configured)
    ///
    /// Returns the resolved path on success. The file itself need not exist.
    pub fn validate(&self, path: &str) -> Result<PathBuf, PathValidationError> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(PathValidationError::Empty);
        }

        let expanded = PathBuf::from(expand_tilde(trimmed));
        let joined = if expanded.is_absolute() {
            expanded
        } else {
            self.base.join(expanded)
        };
        let resolved = resolve_existing(&normalize(&joined));

        for (pattern, forbidden) in &self.forbidden {
            if resolved.starts_with(forbidden) {
                return Err(PathValidationError::ForbiddenPath {
                    path: path.into(),
                    pattern: pattern.clone(),
                });
            }
        }

        if !self.roots.is_empty() && !self.roots.iter().any(|root| resolved.starts_with(root)) {
            tracing::debug!(path, resolved = %resolved.display(), "Path rejected by workspace policy");
            return Err(PathValidationError::OutsideAllowedRoots { path: path.into() });
        }

        Ok(resolved)
    }

    /// Render `path` relative to the workspace when it lies inside it.
    pub fn display_relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.base)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

fn forbidden_list(patterns: &[String]) -> Vec<(String, PathBuf)> {
    patterns
        .iter()
        .map(|p| (p.clone(), resolve_existing(Path::new(&expand_tilde(p)))))
        .collect()
}

/// Fold `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor of `path` and re-attach the
/// components that do not exist yet.
fn resolve_existing(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut missing = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = strip_verbatim(canonical);
            for part in missing.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Strip the Windows extended-length prefix (`\\?\`) that canonicalize() adds.
fn strip_verbatim(path: PathBuf) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let s = path.to_string_lossy();
        if let Some(rest) = s.strip_prefix(r"\\?\") {
            return PathBuf::from(rest);
        }
    }
    path
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}
