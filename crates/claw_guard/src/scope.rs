//! Working-directory scope for filesystem-affecting tools.
//!
//! A path outside every working directory is an implicit deny unless the engine is
//! bypassing permissions. Whether a path is "inside" is decided by a [`PathResolver`]
//! supplied by the host; [`LexicalPathResolver`] is the default and never touches
//! the filesystem, so evaluation stays I/O-free.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Decides whether a path lies inside one of the working directories
pub trait PathResolver: Send + Sync {
    /// Check a target path against the working directories.
    ///
    /// `working_dirs` lists the primary directory first, followed by the
    /// additional directories. Relative paths are relative to the first entry.
    fn is_in_scope(&self, path: &Path, working_dirs: &[PathBuf]) -> bool;
}

/// Lexical containment check.
///
/// Relative paths resolve against the primary directory; `.` and `..` are folded
/// without consulting the filesystem (symlinks are not followed). Containment is
/// component-wise, so `/work/project-other` is not inside `/work/project`.
///
/// Only absolute working directories can contain anything. A relative primary
/// directory leaves relative paths unresolvable, and a `..` that climbs past
/// the root fails the check.
///
/// # Examples
///
/// ```
/// use claw_guard::scope::{LexicalPathResolver, PathResolver};
/// use std::path::{Path, PathBuf};
///
/// let dirs = vec![PathBuf::from("/work/project")];
/// let resolver = LexicalPathResolver;
/// assert!(resolver.is_in_scope(Path::new("src/main.rs"), &dirs));
/// assert!(!resolver.is_in_scope(Path::new("../other/secret"), &dirs));
///
/// let relative = vec![PathBuf::from(".")];
/// assert!(!resolver.is_in_scope(Path::new("../../etc/passwd"), &relative));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalPathResolver;

impl PathResolver for LexicalPathResolver {
    fn is_in_scope(&self, path: &Path, working_dirs: &[PathBuf]) -> bool {
        let Some(primary) = working_dirs.first() else {
            return false;
        };
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else if primary.is_absolute() {
            primary.join(path)
        } else {
            return false;
        };
        let Some(target) = normalize(&joined) else {
            return false;
        };
        working_dirs
            .iter()
            .filter(|dir| dir.is_absolute())
            .filter_map(|dir| normalize(dir))
            .any(|dir| target.starts_with(dir))
    }
}

/// Fold `.` and `..` components lexically; `None` if `..` climbs past the root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// The directories rules are allowed to apply to
///
/// # Examples
///
/// ```
/// use claw_guard::scope::{LexicalPathResolver, WorkingDirectoryScope};
///
/// let scope = WorkingDirectoryScope::new("/work/project").with_directory("/data/shared");
/// assert!(scope.contains("/data/shared/a.csv", &LexicalPathResolver));
/// assert!(!scope.contains("/etc/passwd", &LexicalPathResolver));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingDirectoryScope {
    primary: Option<PathBuf>,
    additional: BTreeSet<PathBuf>,
}

impl WorkingDirectoryScope {
    /// Scope rooted at a primary working directory
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        Self {
            primary: Some(primary.into()),
            additional: BTreeSet::new(),
        }
    }

    /// Scope with no primary directory; only additional directories apply
    pub fn unrooted() -> Self {
        Self::default()
    }

    /// Return a copy with one more additional directory
    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.additional.insert(dir.into());
        self
    }

    /// Add a directory in place; returns `false` if it was already present
    pub fn insert(&mut self, dir: impl Into<PathBuf>) -> bool {
        let dir = dir.into();
        if self.primary.as_ref() == Some(&dir) {
            return false;
        }
        self.additional.insert(dir)
    }

    /// The primary working directory
    pub fn primary(&self) -> Option<&Path> {
        self.primary.as_deref()
    }

    /// The additional working directories
    pub fn additional(&self) -> &BTreeSet<PathBuf> {
        &self.additional
    }

    /// Primary directory first, then additional directories in sorted order
    pub fn all_directories(&self) -> Vec<PathBuf> {
        self.primary
            .iter()
            .cloned()
            .chain(self.additional.iter().cloned())
            .collect()
    }

    /// True when no directory is configured and scope checks are skipped
    pub fn is_unbounded(&self) -> bool {
        self.primary.is_none() && self.additional.is_empty()
    }

    /// Check a target path through a resolver.
    ///
    /// An unbounded scope contains every path.
    pub fn contains(&self, path: impl AsRef<Path>, resolver: &dyn PathResolver) -> bool {
        if self.is_unbounded() {
            return true;
        }
        resolver.is_in_scope(path.as_ref(), &self.all_directories())
    }
}
