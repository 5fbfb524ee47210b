//! Schema 2 descriptors.
//!
//! Pages name their kind with `type`. Markdown pages, directories and
//! sections may carry a `lang` mapping instead of single-locale fields:
//!
//! ```yaml
//! pages:
//!   - type: markdown
//!     lang:
//!       en: { filepath: guide.en.md, link: guide, title: Guide }
//!       ja: { filepath: guide.ja.md, link: guide, title: ガイド }
//!   - type: match              # files grouped by their language group id
//!     pattern: "docs/**/*.md"
//!     sort_key: title
//!   - type: section
//!     path: reference
//!     filepath: reference.md
//!     children: [...]
//! ```
//!
//! Entries without `type` are read the schema 1 way (`markdown`, `match`
//! or `directory` key).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::MultiError;
use crate::yaml::Node;

use super::{
    is_language_code, parse_with, v1, Descriptor, Document, Heading, PageEntry, ParseState,
    Schema, SchemaVersion, SortOrder,
};

const SINGLE_LOCALE_WITH_LANG: &str = "single-locale fields cannot be used with `lang`";

pub(crate) struct V2;

impl Schema for V2 {
    const VERSION: SchemaVersion = SchemaVersion::V2;

    fn parse_pages(state: &mut ParseState<'_>, items: &[Node]) -> Vec<PageEntry> {
        parse_sequence(state, items)
    }
}

/// Parse a schema 2 descriptor.
pub fn parse(filepath: &str, source: &str, root: &Path) -> Result<Descriptor, MultiError> {
    parse_with::<V2>(filepath, source, root)
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
        let find = |key: &str| {
            entries
                .iter()
                .find(|(k, _)| k.key_text() == key)
                .map(|(_, v)| v)
        };
        let has_lang = find("lang").is_some();

        if let Some(kind) = find("type") {
            let Some(name) = state.string_field("type", kind) else {
                continue;
            };
            match name.to_lowercase().as_str() {
                "markdown" if has_lang => pages.extend(parse_markdown_multi(state, entries)),
                "markdown" => pages.extend(parse_markdown(state, item, entries)),
                "match" => pages.extend(parse_match(state, item, entries, "pattern")),
                "directory" => pages.extend(parse_directory(state, item, entries, "title")),
                "section" => pages.extend(parse_section(state, item, entries)),
                _ => state.error_at(format!("unknown page type: {}", name), kind),
            }
        } else if find("markdown").is_some() {
            pages.extend(v1::parse_markdown(state, item, entries));
        } else if find("match").is_some() {
            pages.extend(parse_match(state, item, entries, "match"));
        } else if find("directory").is_some() {
            pages.extend(parse_directory(state, item, entries, "directory"));
        } else {
            state.error_at("this mapping does not match any page type", item);
        }
    }
    pages
}

fn fill(value: &mut String, fallback: &str) {
    if value.is_empty() {
        *value = fallback.to_string();
    }
}

/// Walk a `lang` mapping, handing every locale entry to `entry`.
///
/// Locale keys are lowercased, must be unique and valid, and must include
/// the default language.
fn parse_locales<'a, T>(
    state: &mut ParseState<'a>,
    value: &Node,
    mut entry: impl FnMut(&mut ParseState<'a>, &str, &Node, &[(Node, Node)]) -> Option<T>,
) -> BTreeMap<String, T> {
    let mut parsed = BTreeMap::new();
    let Some(locales) = value.as_map() else {
        state.error_at("`lang` field must be a mapping", value);
        return parsed;
    };
    if locales.is_empty() {
        state.error_at("`lang` must not be empty", value);
        return parsed;
    }

    let mut codes: Vec<String> = Vec::with_capacity(locales.len());
    for (k, v) in locales {
        let code = k.key_text().to_lowercase();
        if codes.contains(&code) {
            state.error_at(format!("duplicate `lang` entry: {}", code), k);
            continue;
        }
        codes.push(code.clone());
        let Some(fields) = v.as_map() else {
            state.error_at("each language entry must be a mapping", v);
            continue;
        };
        if let Some(result) = entry(state, &code, v, fields) {
            parsed.insert(code, result);
        }
    }
    state.check_locales(&codes, value);
    parsed
}

/// `type: markdown` with single-locale fields.
fn parse_markdown(
    state: &mut ParseState<'_>,
    item: &Node,
    entries: &[(Node, Node)],
) -> Option<PageEntry> {
    let mut filepath = String::new();
    let mut link = String::new();
    let mut title = String::new();
    let mut description = String::new();

    for (k, v) in entries {
        let key = k.key_text();
        let slot = match key {
            "type" => continue,
            "filepath" => &mut filepath,
            "link" => &mut link,
            "title" => &mut title,
            "description" => &mut description,
            _ => {
                state.error_at(
                    format!("a markdown style page cannot accept the key: {}", key),
                    k,
                );
                continue;
            }
        };
        if let Some(text) = state.string_field(key, v) {
            *slot = text;
        }
    }

    let (path, matter) = state.load_markdown("filepath", &filepath, item)?;
    fill(&mut link, &matter.link);
    fill(&mut title, &matter.title);
    fill(&mut description, &matter.description);
    state.check_title(&title, item, "");
    state.check_link("link", &link, item, "");

    Some(PageEntry::MarkdownSingle {
        language: state.default_language().to_string(),
        document: Document {
            filepath: path,
            link,
            title,
            description,
            created_at: matter.created_at,
            updated_at: matter.updated_at,
        },
    })
}

/// `type: markdown` with a `lang` mapping.
fn parse_markdown_multi(
    state: &mut ParseState<'_>,
    entries: &[(Node, Node)],
) -> Option<PageEntry> {
    let mut documents = BTreeMap::new();
    for (k, v) in entries {
        let key = k.key_text();
        match key {
            "type" => {}
            "lang" => documents = parse_locales(state, v, markdown_locale),
            "filepath" | "link" | "title" | "description" => {
                state.error_at(SINGLE_LOCALE_WITH_LANG, k)
            }
            _ => state.error_at(
                format!("a markdown style page cannot accept the key: {}", key),
                k,
            ),
        }
    }
    if documents.is_empty() {
        return None;
    }
    Some(PageEntry::MarkdownMulti { documents })
}

fn markdown_locale(
    state: &mut ParseState<'_>,
    code: &str,
    node: &Node,
    fields: &[(Node, Node)],
) -> Option<Document> {
    let mut filepath = String::new();
    let mut link = String::new();
    let mut title = String::new();
    let mut description = String::new();

    for (k, v) in fields {
        let key = k.key_text();
        let slot = match key {
            "filepath" => &mut filepath,
            "link" => &mut link,
            "title" => &mut title,
            "description" => &mut description,
            _ => {
                state.error_at(
                    format!("a markdown language entry cannot accept the key: {}", key),
                    k,
                );
                continue;
            }
        };
        if let Some(text) = state.string_field(key, v) {
            *slot = text;
        }
    }

    let (path, matter) = state.load_markdown("filepath", &filepath, node)?;
    fill(&mut link, &matter.link);
    fill(&mut title, &matter.title);
    fill(&mut description, &matter.description);
    let suffix = format!(" for language: {}", code);
    state.check_title(&title, node, &suffix);
    state.check_link("link", &link, node, &suffix);

    Some(Document {
        filepath: path,
        link,
        title,
        description,
        created_at: matter.created_at,
        updated_at: matter.updated_at,
    })
}

/// `type: match`, or an untyped entry with a `match` key. Matched files
/// are grouped by language group id into one page per group.
fn parse_match(
    state: &mut ParseState<'_>,
    item: &Node,
    entries: &[(Node, Node)],
    pattern_key: &str,
) -> Vec<PageEntry> {
    let mut pattern = String::new();
    let mut sorted = false;
    let mut sort_order = None;
    let mut sort_order_node = None;

    for (k, v) in entries {
        let key = k.key_text();
        match key {
            "type" => {}
            "sort_key" => {
                if let Some(text) = state.string_field(key, v) {
                    sorted = text.to_lowercase() == "title";
                    if !sorted {
                        state.error_at("`sort_key` must be `title`", v);
                    }
                }
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
            _ if key == pattern_key => {
                if let Some(text) = state.string_field(key, v) {
                    pattern = text;
                }
            }
            _ => state.error_at(
                format!("a match style page cannot accept the key: {}", key),
                k,
            ),
        }
    }

    if let (Some(node), false) = (sort_order_node, sorted) {
        state.error_at(
            "`sort_key` must not be empty if you specify `sort_order`",
            node,
        );
        return Vec::new();
    }

    let default = state.default_language().to_string();
    let mut groups: Vec<(String, BTreeMap<String, Document>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (filepath, matter) in state.load_matches(&pattern, pattern_key, item) {
        let shown = state.display_path(&filepath);
        let lang = matter.lang().unwrap_or_else(|| default.clone());
        if !is_language_code(&lang) {
            state.error_at(
                format!(
                    "`lang` must be a valid ISO 639-1 language code. given: {} ({})",
                    lang, shown
                ),
                item,
            );
            continue;
        }
        let suffix = format!(": {}", shown);
        state.check_title(&matter.title, item, &suffix);
        state.check_link("link", &matter.link, item, &suffix);

        let slot = *index.entry(matter.group.clone()).or_insert_with(|| {
            groups.push((matter.group.clone(), BTreeMap::new()));
            groups.len() - 1
        });
        let documents = &mut groups[slot].1;
        if documents.contains_key(&lang) {
            state.error_at(
                format!(
                    "duplicate `lang` detected for link in match pattern: {} ({})",
                    lang, shown
                ),
                item,
            );
            continue;
        }
        documents.insert(lang, Document::from_front_matter(filepath, &matter));
    }

    let mut pages: Vec<BTreeMap<String, Document>> = Vec::with_capacity(groups.len());
    for (group, documents) in groups {
        if !documents.contains_key(&default) {
            state.error_at(
                format!(
                    "the language group `{}` has no page for the default language: {}",
                    group, default
                ),
                item,
            );
            continue;
        }
        pages.push(documents);
    }

    if sorted {
        let order = sort_order.unwrap_or(SortOrder::Asc);
        order.sort_by_key(&mut pages, |documents| {
            documents
                .get(&default)
                .map(|d| d.title.clone())
                .unwrap_or_default()
        });
    }

    pages
        .into_iter()
        .map(|documents| PageEntry::MarkdownMulti { documents })
        .collect()
}

/// `type: directory`, or an untyped entry whose `directory` key holds the
/// title. `title_key` names the key holding the single-locale title.
fn parse_directory(
    state: &mut ParseState<'_>,
    item: &Node,
    entries: &[(Node, Node)],
    title_key: &str,
) -> Option<PageEntry> {
    let has_lang = entries.iter().any(|(k, _)| k.key_text() == "lang");
    let mut heading = Heading::default();
    let mut localized = None;
    let mut children = Vec::new();

    for (k, v) in entries {
        let key = k.key_text();
        match key {
            "type" => {}
            "children" => match v.as_seq() {
                Some(items) => children = parse_sequence(state, items),
                None => state.error_at("`children` field must be a sequence", v),
            },
            "lang" => localized = Some(parse_locales(state, v, directory_locale)),
            _ if has_lang && (key == title_key || key == "description") => {
                state.error_at(SINGLE_LOCALE_WITH_LANG, k)
            }
            _ if key == title_key => {
                if let Some(text) = state.string_field(key, v) {
                    heading.title = text;
                }
            }
            "description" => {
                if let Some(text) = state.string_field(key, v) {
                    heading.description = text;
                }
            }
            _ => state.error_at(
                format!("a directory style page cannot accept the key: {}", key),
                k,
            ),
        }
    }

    let headings = match localized {
        Some(headings) => headings,
        None => {
            if heading.title.is_empty() {
                state.error_at(format!("the `{}` field is required", title_key), item);
            }
            BTreeMap::from([(state.default_language().to_string(), heading)])
        }
    };
    if children.is_empty() {
        state.error_at("the `children` field is required", item);
    }
    Some(PageEntry::Directory { headings, children })
}

fn directory_locale(
    state: &mut ParseState<'_>,
    code: &str,
    node: &Node,
    fields: &[(Node, Node)],
) -> Option<Heading> {
    let mut heading = Heading::default();
    for (k, v) in fields {
        let key = k.key_text();
        let slot = match key {
            "title" => &mut heading.title,
            "description" => &mut heading.description,
            _ => {
                state.error_at(
                    format!("a directory language entry cannot accept the key: {}", key),
                    k,
                );
                continue;
            }
        };
        if let Some(text) = state.string_field(key, v) {
            *slot = text;
        }
    }
    state.check_title(&heading.title, node, &format!(" for language: {}", code));
    Some(heading)
}

/// `type: section`: a directory with its own URL segment and body.
fn parse_section(
    state: &mut ParseState<'_>,
    item: &Node,
    entries: &[(Node, Node)],
) -> Option<PageEntry> {
    let has_lang = entries.iter().any(|(k, _)| k.key_text() == "lang");
    let mut path = String::new();
    let mut single = SectionLocale::default();
    let mut localized = None;
    let mut children = Vec::new();

    for (k, v) in entries {
        let key = k.key_text();
        match key {
            "type" => {}
            "path" => {
                if let Some(text) = state.string_field(key, v) {
                    path = text;
                }
            }
            "children" => match v.as_seq() {
                Some(items) => children = parse_sequence(state, items),
                None => state.error_at("`children` field must be a sequence", v),
            },
            "lang" => localized = Some(parse_locales(state, v, section_locale)),
            "title" | "description" | "filepath" if has_lang => {
                state.error_at(SINGLE_LOCALE_WITH_LANG, k)
            }
            "title" | "description" | "filepath" => {
                if let Some(text) = state.string_field(key, v) {
                    match key {
                        "title" => single.title = text,
                        "description" => single.description = text,
                        _ => single.filepath = text,
                    }
                }
            }
            _ => state.error_at(
                format!("a section style page cannot accept the key: {}", key),
                k,
            ),
        }
    }

    state.check_link("path", &path, item, "");
    if children.is_empty() {
        state.error_at("the `children` field is required", item);
    }

    let locales = match localized {
        Some(locales) => locales,
        None => {
            let code = state.default_language().to_string();
            section_body(state, single, item, "")
                .map(|locale| BTreeMap::from([(code, locale)]))
                .unwrap_or_default()
        }
    };
    let documents = locales
        .into_iter()
        .map(|(code, locale)| {
            let document = Document {
                filepath: locale.filepath,
                link: path.clone(),
                title: locale.title,
                description: locale.description,
                created_at: locale.created_at,
                updated_at: locale.updated_at,
            };
            (code, document)
        })
        .collect();

    Some(PageEntry::Section {
        path,
        documents,
        children,
    })
}

#[derive(Debug, Default)]
struct SectionLocale {
    title: String,
    description: String,
    filepath: String,
}

struct SectionBody {
    filepath: std::path::PathBuf,
    title: String,
    description: String,
    created_at: crate::time::Timestamp,
    updated_at: crate::time::Timestamp,
}

fn section_locale(
    state: &mut ParseState<'_>,
    code: &str,
    node: &Node,
    fields: &[(Node, Node)],
) -> Option<SectionBody> {
    let mut locale = SectionLocale::default();
    for (k, v) in fields {
        let key = k.key_text();
        let slot = match key {
            "title" => &mut locale.title,
            "description" => &mut locale.description,
            "filepath" => &mut locale.filepath,
            _ => {
                state.error_at(
                    format!("a section language entry cannot accept the key: {}", key),
                    k,
                );
                continue;
            }
        };
        if let Some(text) = state.string_field(key, v) {
            *slot = text;
        }
    }
    section_body(state, locale, node, &format!(" for language: {}", code))
}

/// Read the body file of a section locale and fill its gaps.
fn section_body(
    state: &mut ParseState<'_>,
    mut locale: SectionLocale,
    node: &Node,
    suffix: &str,
) -> Option<SectionBody> {
    let (filepath, matter) = state.load_markdown("filepath", &locale.filepath, node)?;
    fill(&mut locale.title, &matter.title);
    fill(&mut locale.description, &matter.description);
    state.check_title(&locale.title, node, suffix);
    Some(SectionBody {
        filepath,
        title: locale.title,
        description: locale.description,
        created_at: matter.created_at,
        updated_at: matter.updated_at,
    })
}
