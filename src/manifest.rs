//! `metadata.json`, the manifest stored at the root of every archive.
//!
//! ```json
//! {
//!   "version": "2",
//!   "project": { "project_id": "p", "name": "n", ... },
//!   "page": {
//!     "type": "root",
//!     "children": [
//!       { "type": "markdown", "language": { "en": { "link": "t", "title": "T", "hash": "…" } } }
//!     ]
//!   },
//!   "asset": [ { "path": "assets/logo.png", "hash": "…", "mime_type": "image/png" } ]
//! }
//! ```
//!
//! Pages refer to their body files by hash only; the archive stores each
//! body under `blobs/<hash>`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::assets::Asset;
use crate::descriptor::{Descriptor, Project};
use crate::page::{NodeKind, PageNode, PageTree};

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub version: String,
    pub project: Project,
    pub page: ManifestPage,
    pub asset: Vec<ManifestAsset>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestPage {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub language: BTreeMap<String, ManifestLocale>,
    /// Absent on Markdown leaves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ManifestPage>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestLocale {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub link: String,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestAsset {
    pub path: String,
    pub hash: String,
    pub mime_type: String,
}

impl Manifest {
    pub fn new(descriptor: &Descriptor, tree: &PageTree, assets: &[Asset]) -> Self {
        Self {
            version: descriptor.version.as_str().to_string(),
            project: descriptor.project.clone(),
            page: page(&tree.root),
            asset: assets
                .iter()
                .map(|a| ManifestAsset {
                    path: a.path.clone(),
                    hash: a.hash.clone(),
                    mime_type: a.mime_type.clone(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Every hash the manifest refers to, pages first.
    pub fn hashes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_hashes(&self.page, &mut out);
        out.extend(self.asset.iter().map(|a| a.hash.as_str()));
        out
    }
}

fn page(node: &PageNode) -> ManifestPage {
    let language = node
        .locales
        .iter()
        .map(|(code, locale)| {
            let entry = ManifestLocale {
                link: locale.link.clone(),
                title: locale.title.clone(),
                description: locale.description.clone(),
                hash: locale.hash.clone(),
            };
            (code.clone(), entry)
        })
        .collect();
    let children = match node.kind {
        NodeKind::Markdown => None,
        _ => Some(node.children.iter().map(page).collect()),
    };
    ManifestPage {
        kind: node.kind,
        path: node.path.clone(),
        language,
        children,
    }
}

fn collect_hashes<'a>(page: &'a ManifestPage, out: &mut Vec<&'a str>) {
    out.extend(page.language.values().filter_map(|l| l.hash.as_deref()));
    for child in page.children.iter().flatten() {
        collect_hashes(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_descriptor_str;
    use crate::page::build_tree;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn single_page_manifest_shape() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("README.md"), "hello").unwrap();
        let src = "version: 1\nproject:\n  project_id: p\n  name: n\npages:\n  - markdown: README.md\n    title: T\n    path: t\n";
        let descriptor = parse_descriptor_str(".dodo.yaml", src, tmp.path()).unwrap();
        let tree = build_tree(&descriptor).unwrap();
        let manifest = Manifest::new(&descriptor, &tree, &[]);
        let value: serde_json::Value =
            serde_json::from_slice(&manifest.to_json().unwrap()).unwrap();

        let hash = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        assert_eq!(value["version"], "1");
        assert_eq!(value["project"]["project_id"], "p");
        assert_eq!(value["project"]["default_language"], "en");
        assert_eq!(value["page"]["type"], "root");
        assert_eq!(
            value["page"]["children"][0],
            json!({"type": "markdown", "language": {"en": {"link": "t", "title": "T", "hash": hash}}})
        );
        assert_eq!(value["asset"], json!([]));
        assert_eq!(manifest.hashes(), vec![hash]);
    }
}
