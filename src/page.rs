//! The resolved page tree.
//!
//! [`build_tree`] turns the parsed [`Descriptor`] pages into a tree of
//! [`PageNode`]s rooted at a synthetic root node. While doing so it checks
//! the page invariants once more and attaches the content hash of every
//! referenced Markdown file to its locale entry. The same hash names the
//! file's blob in the archive and is what the manifest refers to.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::descriptor::{is_language_code, Descriptor, Document, Heading, PageEntry};
use crate::error::MultiError;
use crate::path_guard::RootDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Markdown,
    Directory,
    Section,
}

/// One locale of a node after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocale {
    pub link: String,
    pub title: String,
    pub description: String,
    /// SHA-256 of the body file; directories have none.
    pub hash: Option<String>,
    pub filepath: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNode {
    pub kind: NodeKind,
    /// URL segment of a section.
    pub path: Option<String>,
    pub locales: BTreeMap<String, ResolvedLocale>,
    pub children: Vec<PageNode>,
}

impl PageNode {
    /// Pre-order traversal starting at this node.
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self] }
    }
}

pub struct PreOrder<'a> {
    stack: Vec<&'a PageNode>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a PageNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// A blob referenced by the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob<'a> {
    pub hash: &'a str,
    pub filepath: &'a Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTree {
    pub root: PageNode,
}

impl PageTree {
    pub fn iter(&self) -> PreOrder<'_> {
        self.root.iter()
    }

    /// Every hashed locale in pre-order, one entry per locale.
    pub fn blobs(&self) -> impl Iterator<Item = Blob<'_>> {
        self.iter().flat_map(|node| {
            node.locales.values().filter_map(|locale| {
                Some(Blob {
                    hash: locale.hash.as_deref()?,
                    filepath: locale.filepath.as_deref()?,
                })
            })
        })
    }

    /// Number of nodes below the root.
    pub fn count(&self) -> usize {
        self.iter().count() - 1
    }
}

/// Hex SHA-256 of a file's bytes, streamed.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Build the page tree of `descriptor`, hashing every body file.
pub fn build_tree(descriptor: &Descriptor) -> Result<PageTree, MultiError> {
    let mut builder = TreeBuilder {
        root: &descriptor.root,
        default_language: &descriptor.project.default_language,
        errors: MultiError::new(),
    };
    let children = builder.nodes(&descriptor.pages);
    let tree = PageTree {
        root: PageNode {
            kind: NodeKind::Root,
            path: None,
            locales: BTreeMap::new(),
            children,
        },
    };
    tracing::debug!(pages = tree.count(), "built page tree");
    builder.errors.into_result(tree)
}

struct TreeBuilder<'a> {
    root: &'a RootDir,
    default_language: &'a str,
    errors: MultiError,
}

impl TreeBuilder<'_> {
    fn nodes(&mut self, entries: &[PageEntry]) -> Vec<PageNode> {
        entries.iter().filter_map(|entry| self.node(entry)).collect()
    }

    fn node(&mut self, entry: &PageEntry) -> Option<PageNode> {
        match entry {
            PageEntry::MarkdownSingle { language, document } => {
                let locales = self.documents([(language, document)], true)?;
                Some(PageNode {
                    kind: NodeKind::Markdown,
                    path: None,
                    locales,
                    children: Vec::new(),
                })
            }
            PageEntry::MarkdownMulti { documents } => {
                self.require_default(documents.keys(), "markdown page");
                let locales = self.documents(documents, true)?;
                Some(PageNode {
                    kind: NodeKind::Markdown,
                    path: None,
                    locales,
                    children: Vec::new(),
                })
            }
            PageEntry::Directory { headings, children } => {
                self.require_default(headings.keys(), "directory");
                self.require_children(children, "directory");
                Some(PageNode {
                    kind: NodeKind::Directory,
                    path: None,
                    locales: self.headings(headings),
                    children: self.nodes(children),
                })
            }
            PageEntry::Section {
                path,
                documents,
                children,
            } => {
                self.require_default(documents.keys(), "section");
                self.require_children(children, "section");
                let locales = self.documents(documents, false)?;
                Some(PageNode {
                    kind: NodeKind::Section,
                    path: Some(path.clone()),
                    locales,
                    children: self.nodes(children),
                })
            }
        }
    }

    fn documents<'d>(
        &mut self,
        documents: impl IntoIterator<Item = (&'d String, &'d Document)>,
        with_link: bool,
    ) -> Option<BTreeMap<String, ResolvedLocale>> {
        let before = self.errors.len();
        let mut locales = BTreeMap::new();
        for (language, document) in documents {
            if let Some(locale) = self.document(language, document, with_link) {
                locales.insert(language.clone(), locale);
            }
        }
        (self.errors.len() == before).then_some(locales)
    }

    fn document(
        &mut self,
        language: &str,
        document: &Document,
        with_link: bool,
    ) -> Option<ResolvedLocale> {
        let shown = self
            .root
            .relative(&document.filepath)
            .unwrap_or_else(|| document.filepath.display().to_string());

        if !is_language_code(language) {
            self.errors
                .push_error(format!("invalid language code `{}`: {}", language, shown));
        }
        if document.title.is_empty() {
            self.errors
                .push_error(format!("the `title` field is required: {}", shown));
        }
        if !crate::descriptor::is_valid_link(&document.link) || (with_link && document.link.is_empty()) {
            self.errors
                .push_error(format!("invalid link `{}`: {}", document.link, shown));
        }

        let filepath = match self.root.resolve(&document.filepath) {
            Ok(p) => p,
            Err(e) => {
                self.errors.push_error(e);
                return None;
            }
        };
        let hash = match hash_file(&filepath) {
            Ok(h) => h,
            Err(e) => {
                self.errors
                    .push_error(format!("failed to hash {}: {}", shown, e));
                return None;
            }
        };
        Some(ResolvedLocale {
            link: document.link.clone(),
            title: document.title.clone(),
            description: document.description.clone(),
            hash: Some(hash),
            filepath: Some(filepath),
        })
    }

    fn headings(&self, headings: &BTreeMap<String, Heading>) -> BTreeMap<String, ResolvedLocale> {
        headings
            .iter()
            .map(|(language, heading)| {
                let locale = ResolvedLocale {
                    link: String::new(),
                    title: heading.title.clone(),
                    description: heading.description.clone(),
                    hash: None,
                    filepath: None,
                };
                (language.clone(), locale)
            })
            .collect()
    }

    fn require_default<'k>(&mut self, mut keys: impl Iterator<Item = &'k String>, what: &str) {
        if !keys.any(|k| k == self.default_language) {
            self.errors.push_error(format!(
                "a {} has no entry for the default language: {}",
                what, self.default_language
            ));
        }
    }

    fn require_children(&mut self, children: &[PageEntry], what: &str) {
        if children.is_empty() {
            self.errors
                .push_error(format!("a {} must have children", what));
        }
    }
}
