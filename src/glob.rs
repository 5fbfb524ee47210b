//! Recursive glob expansion under the project root.
//!
//! Patterns are relative to the root and use `globset` syntax with
//! `literal_separator` on: `*` stays inside one path component, `**`
//! crosses directories. The pattern is resolved through the path guard
//! first, then only the literal prefix of the pattern (its "base") is
//! walked. Symlinks are not followed. Results are sorted so repeated runs
//! enumerate files in the same order.

use std::path::PathBuf;

use globset::GlobBuilder;
use walkdir::WalkDir;

use crate::path_guard::{RootDir, TraversalError};

#[derive(Debug, thiserror::Error)]
pub enum GlobError {
    #[error(transparent)]
    Traversal(#[from] TraversalError),

    #[error("invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },

    #[error("failed to list files matching '{pattern}': {source}")]
    Walk {
        pattern: String,
        source: walkdir::Error,
    },
}

/// Absolute paths of every regular file under `root` matching `pattern`.
pub fn expand(root: &RootDir, pattern: &str) -> Result<Vec<PathBuf>, GlobError> {
    let resolved = root.resolve(pattern)?;
    let relative = root.relative(&resolved).unwrap_or_default();

    if !has_meta(&relative) {
        return Ok(if resolved.is_file() {
            vec![resolved]
        } else {
            Vec::new()
        });
    }

    let matcher = GlobBuilder::new(&relative)
        .literal_separator(true)
        .build()
        .map_err(|source| GlobError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?
        .compile_matcher();

    let mut base = root.path().to_path_buf();
    for part in relative.split('/') {
        if has_meta(part) {
            break;
        }
        base.push(part);
    }
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let mut matches = Vec::new();
    for entry in WalkDir::new(&base).follow_links(false) {
        let entry = entry.map_err(|source| GlobError::Walk {
            pattern: pattern.to_string(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel) = root.relative(entry.path()) else {
            continue;
        };
        if matcher.is_match(&rel) {
            matches.push(entry.into_path());
        }
    }
    matches.sort();
    Ok(matches)
}

fn has_meta(text: &str) -> bool {
    text.contains(['*', '?', '[', '{'])
}
