//! `dodo touch`: create a Markdown file with front matter, or refresh the
//! front matter of an existing one.
//!
//! A new file gets a title, a link derived from its path, a fresh group id
//! and `created_at = updated_at = now`. An existing file keeps its body and
//! its other keys; only the given title/link and `updated_at` change.

use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::frontmatter::{self, FrontMatter};
use crate::path_guard::clean;
use crate::time::Timestamp;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]+").expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TouchOptions {
    pub file: PathBuf,
    pub title: Option<String>,
    /// URL path of the page; defaults to the file path for new files.
    pub path: Option<String>,
    /// RFC 3339 time to stamp instead of the current time.
    pub now: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touched {
    Created,
    Updated,
}

pub fn run_touch(opts: &TouchOptions) -> Result<Touched> {
    let now = parse_now(opts.now.as_deref())?;
    if opts.file.exists() {
        update(opts, now)?;
        tracing::info!(file = %opts.file.display(), "updated the markdown file");
        Ok(Touched::Updated)
    } else {
        create(opts, now)?;
        tracing::info!(file = %opts.file.display(), "created a new markdown file");
        Ok(Touched::Created)
    }
}

fn parse_now(now: Option<&str>) -> Result<Timestamp> {
    match now {
        Some(text) if !text.is_empty() => Timestamp::parse(text).context("invalid time format"),
        _ => Ok(Timestamp::now()),
    }
}

fn create(opts: &TouchOptions, now: Timestamp) -> Result<()> {
    tracing::debug!("creating a new markdown file");
    let source = match opts.path.as_deref() {
        Some(path) if !path.is_empty() => path.to_string(),
        _ => opts.file.to_string_lossy().into_owned(),
    };
    let title = opts.title.as_deref().unwrap_or_default();
    let matter = FrontMatter::new(title, &sanitize_path(&source), now);
    fs::write(&opts.file, matter.render()?)
        .with_context(|| format!("failed to create file: {}", opts.file.display()))
}

fn update(opts: &TouchOptions, now: Timestamp) -> Result<()> {
    tracing::debug!("updating an existing markdown file");
    let mut matter = frontmatter::read(&opts.file).context("failed to read front matter")?;
    if let Some(title) = opts.title.as_deref().filter(|t| !t.is_empty()) {
        matter.title = title.to_string();
    }
    if let Some(path) = opts.path.as_deref().filter(|p| !p.is_empty()) {
        matter.link = path.to_string();
    }
    matter.updated_at = now;
    frontmatter::rewrite(&opts.file, &matter).context("failed to update markdown file")
}

/// Turn a file path into a link: `./docs/intro.md` becomes `docs_intro`.
///
/// Only ASCII letters, digits, `_` and `-` survive.
pub fn sanitize_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let cleaned = clean(Path::new(path)).to_string_lossy().into_owned();
    let stem = match cleaned.rfind('.') {
        Some(dot) if !cleaned[dot..].contains(MAIN_SEPARATOR) => &cleaned[..dot],
        _ => cleaned.as_str(),
    };
    let joined = stem.replace(MAIN_SEPARATOR, "_");
    let trimmed = joined.strip_prefix('_').unwrap_or(&joined);
    DISALLOWED.replace_all(trimmed, "").into_owned()
}
