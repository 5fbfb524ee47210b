//! Asset expansion.
//!
//! Every `assets` pattern of the descriptor (and the project logo, when one
//! is set) is expanded under the root. Files are de-duplicated by absolute
//! path, hashed, and typed by extension against a [`MimeAllowList`].
//! Problems are collected per file; the expansion only fails once every
//! pattern has been tried.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::descriptor::Descriptor;
use crate::error::MultiError;
use crate::page::hash_file;

/// Allowed asset types, keyed by lowercase file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeAllowList {
    by_extension: BTreeMap<String, String>,
}

impl Default for MimeAllowList {
    fn default() -> Self {
        Self::new([
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("png", "image/png"),
            ("gif", "image/gif"),
            ("webp", "image/webp"),
            ("bmp", "image/bmp"),
        ])
    }
}

impl MimeAllowList {
    /// Extensions may be given with or without the leading dot.
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let by_extension = entries
            .into_iter()
            .map(|(ext, mime)| {
                let ext = ext.as_ref().trim_start_matches('.').to_lowercase();
                (ext, mime.into())
            })
            .collect();
        Self { by_extension }
    }

    pub fn mime_type(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.by_extension.get(&ext).map(String::as_str)
    }
}

/// An asset file ready to be archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Path relative to the root, `/`-separated.
    pub path: String,
    pub filepath: PathBuf,
    pub hash: String,
    pub mime_type: String,
}

/// Expand the asset patterns and the logo of `descriptor`.
pub fn expand_assets(
    descriptor: &Descriptor,
    mime_types: &MimeAllowList,
) -> Result<Vec<Asset>, MultiError> {
    let root = &descriptor.root;
    let mut errors = MultiError::new();
    let mut seen = HashSet::new();
    let mut assets = Vec::new();

    let logo = Some(descriptor.project.logo.as_str()).filter(|l| !l.is_empty());
    let patterns = descriptor
        .assets
        .iter()
        .map(|p| (p.as_str(), false))
        .chain(logo.map(|l| (l, true)));

    for (pattern, is_logo) in patterns {
        let files = match crate::glob::expand(root, pattern) {
            Ok(files) => files,
            Err(e) => {
                errors.push_error(e);
                continue;
            }
        };
        if is_logo && files.is_empty() {
            errors.push_error(format!("the logo file `{}` does not exist", pattern));
        }
        for filepath in files {
            if !seen.insert(filepath.clone()) {
                continue;
            }
            let path = root
                .relative(&filepath)
                .unwrap_or_else(|| filepath.display().to_string());
            let Some(mime_type) = mime_types.mime_type(&filepath) else {
                let ext = filepath
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default();
                errors.push_error(format!(
                    "the file `{}` has invalid mime type: {}",
                    path, ext
                ));
                continue;
            };
            let hash = match hash_file(&filepath) {
                Ok(h) => h,
                Err(e) => {
                    errors.push_error(format!("failed to hash {}: {}", path, e));
                    continue;
                }
            };
            assets.push(Asset {
                path,
                filepath,
                hash,
                mime_type: mime_type.to_string(),
            });
        }
    }

    tracing::debug!(assets = assets.len(), "expanded assets");
    errors.into_result(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_descriptor_str;
    use std::fs;
    use tempfile::TempDir;

    fn descriptor(tmp: &TempDir, project_extra: &str, assets: &str) -> Descriptor {
        fs::write(tmp.path().join("README.md"), "").unwrap();
        let src = format!(
            "version: 1\nproject:\n  project_id: p\n  name: n\n{}pages:\n  - markdown: README.md\n    title: T\n    path: t\n{}",
            project_extra, assets
        );
        parse_descriptor_str(".dodo.yaml", &src, tmp.path()).unwrap()
    }

    #[test]
    fn mime_lookup_ignores_case_and_dot() {
        let list = MimeAllowList::new([(".SVG", "image/svg+xml")]);
        assert_eq!(list.mime_type(Path::new("a/logo.svg")), Some("image/svg+xml"));
        assert_eq!(list.mime_type(Path::new("a/logo.png")), None);
        assert_eq!(
            MimeAllowList::default().mime_type(Path::new("x.JPG")),
            Some("image/jpeg")
        );
    }

    #[test]
    fn deduplicates_overlapping_patterns_and_logo() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("assets/img")).unwrap();
        fs::write(tmp.path().join("assets/logo.png"), "logo").unwrap();
        fs::write(tmp.path().join("assets/img/a.gif"), "gif").unwrap();
        let d = descriptor(
            &tmp,
            "  logo: assets/logo.png\n",
            "assets:\n  - assets/**/*\n  - assets/*.png\n",
        );
        let assets = expand_assets(&d, &MimeAllowList::default()).unwrap();
        let paths: Vec<_> = assets.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["assets/img/a.gif", "assets/logo.png"]);
        assert_eq!(assets[1].mime_type, "image/png");
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("assets")).unwrap();
        fs::write(tmp.path().join("assets/notes.txt"), "").unwrap();
        fs::write(tmp.path().join("assets/ok.png"), "").unwrap();
        let d = descriptor(&tmp, "", "assets:\n  - assets/*\n");
        let err = expand_assets(&d, &MimeAllowList::default()).unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(
            err.iter().next().unwrap().message(),
            "the file `assets/notes.txt` has invalid mime type: .txt"
        );
    }

    #[test]
    fn missing_logo_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let d = descriptor(&tmp, "  logo: logo.png\n", "");
        let err = expand_assets(&d, &MimeAllowList::default()).unwrap_err();
        assert!(err.iter().next().unwrap().message().contains("logo.png"));
    }
}
