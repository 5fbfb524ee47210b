//! `dodo init`: write a starter `.dodo.yaml`.
//!
//! The template is a version 1 descriptor with one page (`README.md`) and an
//! `assets/**/*` glob. An existing file is only replaced with `--force`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Values substituted into the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    /// Descriptor path, relative to `working_dir` unless absolute.
    pub config: PathBuf,
    pub working_dir: PathBuf,
    pub force: bool,
    /// Defaults to the working directory's name.
    pub project_name: Option<String>,
    pub description: String,
}

/// Write the template and return the path written.
pub fn run_init(opts: &InitOptions) -> Result<PathBuf> {
    let path = opts.working_dir.join(&opts.config);
    tracing::debug!(path = %path.display(), "config file");
    if !opts.force && path.is_file() {
        bail!("configuration file already exists: {}", path.display());
    }

    let name = match &opts.project_name {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => directory_name(&opts.working_dir)?,
    };
    let content = render_template(&name, &opts.description);
    fs::write(&path, content)
        .with_context(|| format!("failed to save configuration file: {}", path.display()))?;

    if opts.force {
        tracing::info!("overwrote the configuration file");
    }
    tracing::info!(path = %path.display(), project = %name, "created configuration file");
    Ok(path)
}

pub fn render_template(name: &str, description: &str) -> String {
    format!(
        r#"version: 1
project:
  project_id: {project_id}
  name: {name}
  description: {description}
  version: "1"
  default_language: "en"
pages:
  - markdown: "README.md"
    title: "README"
    path: "readme"
assets:
  - "assets/**/*"
"#,
        project_id = quote(&slugify(name)),
        name = quote(name),
        description = quote(description),
    )
}

/// Lowercase ASCII letters and digits joined by single `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("project");
    }
    slug
}

// JSON strings are valid double-quoted YAML scalars.
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn directory_name(dir: &Path) -> Result<String> {
    let abs = dir
        .canonicalize()
        .with_context(|| format!("failed to resolve working directory: {}", dir.display()))?;
    match abs.file_name() {
        Some(name) => Ok(name.to_string_lossy().into_owned()),
        None => bail!("cannot derive a project name from {}", abs.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_descriptor;
    use tempfile::TempDir;

    fn opts(dir: &Path) -> InitOptions {
        InitOptions {
            config: PathBuf::from(".dodo.yaml"),
            working_dir: dir.to_path_buf(),
            force: false,
            project_name: Some("My Docs: v2".to_string()),
            description: "Docs \"quoted\"".to_string(),
        }
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("My Docs: v2"), "my-docs-v2");
        assert_eq!(slugify("  --dodo__cli--"), "dodo-cli");
        assert_eq!(slugify("日本語"), "project");
    }

    #[test]
    fn template_is_a_valid_descriptor() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("README.md"), "# Hello\n").unwrap();
        let path = run_init(&opts(tmp.path())).unwrap();

        let descriptor = parse_descriptor(&path, tmp.path()).unwrap();
        assert_eq!(descriptor.project.project_id, "my-docs-v2");
        assert_eq!(descriptor.project.name, "My Docs: v2");
        assert_eq!(descriptor.project.description, "Docs \"quoted\"");
        assert_eq!(descriptor.assets, vec!["assets/**/*".to_string()]);
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        let existing = tmp.path().join(".dodo.yaml");
        fs::write(&existing, "keep").unwrap();

        let err = run_init(&opts(tmp.path())).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("configuration file already exists: {}", existing.display())
        );
        assert_eq!(fs::read_to_string(&existing).unwrap(), "keep");

        let mut forced = opts(tmp.path());
        forced.force = true;
        run_init(&forced).unwrap();
        assert!(fs::read_to_string(&existing).unwrap().starts_with("version: 1"));
    }

    #[test]
    fn name_defaults_to_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("Handbook");
        fs::create_dir(&dir).unwrap();
        let mut o = opts(&dir);
        o.project_name = None;
        let path = run_init(&o).unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("project_id: \"handbook\""));
        assert!(content.contains("name: \"Handbook\""));
    }
}
