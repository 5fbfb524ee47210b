//! Schema 1 descriptors.
//!
//! The kind of each page is implied by which key it carries:
//!
//! ```yaml
//! pages:
//!   - markdown: README.md      # a single Markdown page
//!     title: Overview
//!     path: overview
//!   - match: docs/**/*.md      # one page per matched file
//!     sort_key: updated_at
//!     sort_order: desc
//!   - directory: Guides        # a titled group of children
//!     children: [...]
//! ```
//!
//! Every page is single-locale and keyed by the project default language.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::MultiError;
use crate::time::Timestamp;
use crate::yaml::Node;

use super::{parse_with, Descriptor, Document, Heading, PageEntry, ParseState, Schema, SchemaVersion, SortOrder};

pub(crate) struct V1;

impl Schema for V1 {
    const VERSION: SchemaVersion = SchemaVersion::V1;

    fn parse_pages(state: &mut ParseState<'_>, items: &[Node]) -> Vec<PageEntry> {
        parse_sequence(state, items)
    }
}

/// Parse a schema 1 descriptor.
pub fn parse(filepath: &str, source: &str, root: &Path) -> Result<Descriptor, MultiError> {
    parse_with::<V1>(filepath, source, root)
}

fn parse_sequence(state: &mut ParseState<'_>, items: &[Node]) -> Vec<PageEntry> {
    let mut pages = Vec::new();
    for item in items {
        let Some(entries) = item.as_map() else {
            state.error_at(
                "each item in the `pages` sequence must be of mapping type",
                item,
            );
            continue;
        };
        let has = |key: &str| entries.iter().any(|(k, _)| k.key_text() == key);
        if has("markdown") {
            pages.extend(parse_markdown(state, item, entries));
        } else if has("match") {
            pages.extend(parse_match(state, item, entries));
        } else if has("directory") {
            pages.extend(parse_directory(state, item, entries));
        } else {
            state.error_at("this mapping does not match any page type", item);
        }
    }
    pages
}

/// A `markdown:` page. Also used by schema 2 for entries without `type`.
pub(super) fn parse_markdown(
    state: &mut ParseState<'_>,
    item: &Node,
    entries: &[(Node, Node)],
) -> Option<PageEntry> {
    let mut markdown = String::new();
    let mut title = String::new();
    let mut link = String::new();
    let mut description = String::new();
    let mut created_at = Timestamp::empty();
    let mut updated_at = Timestamp::empty();

    for (k, v) in entries {
        let key = k.key_text();
        match key {
            "markdown" | "title" | "path" | "description" => {
                let Some(text) = state.string_field(key, v) else {
                    continue;
                };
                match key {
                    "markdown" => markdown = text,
                    "title" => title = text,
                    "path" => link = text,
                    _ => description = text,
                }
            }
            "created_at" => {
                if let Some(t) = state.time_field(key, v) {
                    created_at = t;
                }
            }
            "updated_at" => {
                if let Some(t) = state.time_field(key, v) {
                    updated_at = t;
                }
            }
            _ => state.error_at(
                format!("a markdown style page cannot accept the key: {}", key),
                k,
            ),
        }
    }

    let (filepath, matter) = state.load_markdown("markdown", &markdown, item)?;
    if title.is_empty() {
        title = matter.title.clone();
    }
    if link.is_empty() {
        link = matter.link.clone();
    }
    if description.is_empty() {
        description = matter.description.clone();
    }
    if !created_at.is_present() {
        created_at = matter.created_at.clone();
    }
    if !updated_at.is_present() {
        updated_at = matter.updated_at.clone();
    }

    state.check_title(&title, item, "");
    state.check_link("path", &link, item, "");

    Some(PageEntry::MarkdownSingle {
        language: state.default_language().to_string(),
        document: Document {
            filepath,
            link,
            title,
            description,
            created_at,
            updated_at,
        },
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKey {
    Title,
    UpdatedAt,
    CreatedAt,
}

fn parse_match(
    state: &mut ParseState<'_>,
    item: &Node,
    entries: &[(Node, Node)],
) -> Vec<PageEntry> {
    let mut pattern = String::new();
    let mut sort_key = None;
    let mut sort_order = None;
    let mut sort_order_node = None;

    for (k, v) in entries {
        let key = k.key_text();
        match key {
            "match" => {
                if let Some(text) = state.string_field(key, v) {
                    pattern = text;
                }
            }
            "sort_key" => {
                let Some(text) = state.string_field(key, v) else {
                    continue;
                };
                sort_key = match text.to_lowercase().as_str() {
                    "title" => Some(SortKey::Title),
                    "updated_at" => Some(SortKey::UpdatedAt),
                    "created_at" => Some(SortKey::CreatedAt),
                    _ => {
                        state.error_at(
                            "`sort_key` must be either `title`, `updated_at` or `created_at`",
                            v,
                        );
                        None
                    }
                };
            }
            "sort_order" => {
                let Some(text) = state.string_field(key, v) else {
                    continue;
                };
                sort_order_node = Some(v);
                sort_order = SortOrder::parse(&text);
                if sort_order.is_none() {
                    state.error_at("`sort_order` must be either `asc` or `desc`", v);
                }
            }
            _ => state.error_at(
                format!("a match style page cannot accept the key: {}", key),
                k,
            ),
        }
    }

    if let (Some(node), None) = (sort_order_node, sort_key) {
        state.error_at(
            "`sort_key` must not be empty if you specify `sort_order`",
            node,
        );
        return Vec::new();
    }

    let language = state.default_language().to_string();
    let mut documents = Vec::new();
    for (filepath, matter) in state.load_matches(&pattern, "match", item) {
        let suffix = format!(": {}", state.display_path(&filepath));
        state.check_title(&matter.title, item, &suffix);
        state.check_link("path", &matter.link, item, &suffix);
        documents.push(Document::from_front_matter(filepath, &matter));
    }

    if let Some(key) = sort_key {
        let order = sort_order.unwrap_or(SortOrder::Asc);
        match key {
            SortKey::Title => order.sort_by_key(&mut documents, |d| d.title.clone()),
            SortKey::UpdatedAt => order.sort_by_key(&mut documents, |d| d.updated_at.datetime()),
            SortKey::CreatedAt => order.sort_by_key(&mut documents, |d| d.created_at.datetime()),
        }
    }

    documents
        .into_iter()
        .map(|document| PageEntry::MarkdownSingle {
            language: language.clone(),
            document,
        })
        .collect()
}

fn parse_directory(
    state: &mut ParseState<'_>,
    item: &Node,
    entries: &[(Node, Node)],
) -> Option<PageEntry> {
    let mut title = String::new();
    let mut children = None;

    for (k, v) in entries {
        let key = k.key_text();
        match key {
            "directory" => {
                if let Some(text) = state.string_field(key, v) {
                    title = text;
                }
            }
            "children" => match v.as_seq() {
                Some(items) => children = Some(parse_sequence(state, items)),
                None => state.error_at("`children` field must be a sequence", v),
            },
            _ => state.error_at(
                format!("a directory style page cannot accept the key: {}", key),
                k,
            ),
        }
    }

    if title.is_empty() {
        state.error_at("the `directory` field is required", item);
    }
    let children = children.unwrap_or_default();
    if children.is_empty() {
        state.error_at("the `children` field is required", item);
    }

    let mut headings = BTreeMap::new();
    headings.insert(
        state.default_language().to_string(),
        Heading {
            title,
            description: String::new(),
        },
    );
    Some(PageEntry::Directory { headings, children })
}
