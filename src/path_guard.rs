//! Keeps descriptor-supplied paths inside the working directory.
//!
//! Every filesystem access driven by the descriptor (Markdown pages, glob
//! bases, assets, the logo) goes through [`RootDir::resolve`] first. The
//! root is canonicalized once; candidates are cleaned lexically, joined onto
//! it, and compared component-wise. The deepest existing ancestor of the
//! candidate is then canonicalized as well so a symlink cannot lead out of
//! the root.

use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TraversalError {
    /// The candidate resolves outside the root.
    #[error("the file being parsed is not under the root directory: {}", path.display())]
    OutsideRoot { path: PathBuf },

    /// The root itself could not be resolved.
    #[error("failed to resolve the root directory {}: {source}", path.display())]
    Root { path: PathBuf, source: io::Error },

    /// An ancestor of the candidate exists but cannot be inspected.
    #[error("cannot resolve {}: {source}", path.display())]
    Unresolvable { path: PathBuf, source: io::Error },
}

/// A canonical, absolute root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDir {
    path: PathBuf,
}

impl RootDir {
    pub fn new(root: &Path) -> Result<Self, TraversalError> {
        let path = root.canonicalize().map_err(|source| TraversalError::Root {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve `candidate` (relative to the root, or absolute) to a cleaned
    /// absolute path under the root.
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> Result<PathBuf, TraversalError> {
        let joined = clean(&self.path.join(candidate));
        if !joined.starts_with(&self.path) {
            return Err(TraversalError::OutsideRoot { path: joined });
        }

        let mut probe = joined.as_path();
        loop {
            match probe.canonicalize() {
                Ok(real) => {
                    if !real.starts_with(&self.path) {
                        return Err(TraversalError::OutsideRoot { path: joined });
                    }
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => match probe.parent() {
                    Some(parent) => probe = parent,
                    None => break,
                },
                Err(source) => {
                    return Err(TraversalError::Unresolvable {
                        path: joined,
                        source,
                    })
                }
            }
        }
        Ok(joined)
    }

    /// `path` relative to the root with `/` separators, if it lies under it.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.path).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

/// One-shot form of [`RootDir::resolve`].
pub fn under_root(root: &Path, candidate: &Path) -> Result<PathBuf, TraversalError> {
    RootDir::new(root)?.resolve(candidate)
}

/// Lexically normalize a path: drop `.`, fold `..` into its parent.
///
/// A `..` directly below the filesystem root stays at the root; a leading
/// `..` of a relative path is kept.
pub fn clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().map(|c| c.as_os_str()).collect()
}
