//! Parsing of the `.dodo.yaml` project descriptor.
//!
//! Two schemas coexist and are selected by the top-level `version`:
//!
//! | `version` | Parser | Page kinds |
//! |-----------|--------|------------|
//! | `1` | [`v1`] | `markdown`, `match`, `directory` (selected by key) |
//! | `2` | [`v2`] | explicit `type`: `markdown`, `match`, `directory`, `section`; per-locale `lang` maps |
//!
//! Both parsers walk a positioned YAML tree ([`crate::yaml`]) once and
//! collect every problem they find in a [`MultiError`] instead of stopping
//! at the first. `match` entries are expanded while parsing, so the parsed
//! [`Descriptor`] only contains concrete pages.
//!
//! ```text
//! bytes ──▶ version::detect ──▶ v1 | v2 ──▶ Descriptor ──▶ page::build_tree
//! ```

pub mod v1;
pub mod v2;
pub mod version;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::error::{Diagnostic, MultiError, ParseError};
use crate::frontmatter::{self, FrontMatter};
use crate::path_guard::RootDir;
use crate::time::Timestamp;
use crate::yaml::{self, Node};

pub use version::{detect_version, DetectedVersion};

const DEFAULT_LANGUAGE: &str = "en";

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-]*$").expect("link pattern is a valid regex")
});

/// ISO 639-1 two-letter language codes.
const ISO_639_1: &[&str] = &[
    "aa", "ab", "ae", "af", "ak", "am", "an", "ar", "as", "av", "ay", "az", "ba", "be", "bg",
    "bh", "bi", "bm", "bn", "bo", "br", "bs", "ca", "ce", "ch", "co", "cr", "cs", "cu", "cv",
    "cy", "da", "de", "dv", "dz", "ee", "el", "en", "eo", "es", "et", "eu", "fa", "ff", "fi",
    "fj", "fo", "fr", "fy", "ga", "gd", "gl", "gn", "gu", "gv", "ha", "he", "hi", "ho", "hr",
    "ht", "hu", "hy", "hz", "ia", "id", "ie", "ig", "ii", "ik", "io", "is", "it", "iu", "ja",
    "jv", "ka", "kg", "ki", "kj", "kk", "kl", "km", "kn", "ko", "kr", "ks", "ku", "kv", "kw",
    "ky", "la", "lb", "lg", "li", "ln", "lo", "lt", "lu", "lv", "mg", "mh", "mi", "mk", "ml",
    "mn", "mr", "ms", "mt", "my", "na", "nb", "nd", "ne", "ng", "nl", "nn", "no", "nr", "nv",
    "ny", "oc", "oj", "om", "or", "os", "pa", "pi", "pl", "ps", "pt", "qu", "rm", "rn", "ro",
    "ru", "rw", "sa", "sc", "sd", "se", "sg", "si", "sk", "sl", "sm", "sn", "so", "sq", "sr",
    "ss", "st", "su", "sv", "sw", "ta", "te", "tg", "th", "ti", "tk", "tl", "tn", "to", "tr",
    "ts", "tt", "tw", "ty", "ug", "uk", "ur", "uz", "ve", "vi", "vo", "wa", "wo", "xh", "yi",
    "yo", "za", "zh", "zu",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    pub fn number(self) -> i64 {
        match self {
            SchemaVersion::V1 => 1,
            SchemaVersion::V2 => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SchemaVersion::V1 => "1",
            SchemaVersion::V2 => "2",
        }
    }
}

/// The `project` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub logo: String,
    pub repository: String,
    pub default_language: String,
}

/// One locale of a Markdown-backed page.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Absolute path under the root.
    pub filepath: PathBuf,
    pub link: String,
    pub title: String,
    pub description: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Document {
    fn from_front_matter(filepath: PathBuf, matter: &FrontMatter) -> Self {
        Self {
            filepath,
            link: matter.link.clone(),
            title: matter.title.clone(),
            description: matter.description.clone(),
            created_at: matter.created_at.clone(),
            updated_at: matter.updated_at.clone(),
        }
    }
}

/// Title of one locale of a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Heading {
    pub title: String,
    pub description: String,
}

/// A parsed page entry. `match` entries never appear here: they are
/// replaced by the Markdown pages they expand to.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEntry {
    MarkdownSingle {
        language: String,
        document: Document,
    },
    MarkdownMulti {
        documents: BTreeMap<String, Document>,
    },
    Directory {
        headings: BTreeMap<String, Heading>,
        children: Vec<PageEntry>,
    },
    /// A directory with its own URL segment and body (schema 2 only).
    Section {
        path: String,
        documents: BTreeMap<String, Document>,
        children: Vec<PageEntry>,
    },
}

/// A fully parsed and validated descriptor.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub version: SchemaVersion,
    pub project: Project,
    pub pages: Vec<PageEntry>,
    /// Asset glob patterns, relative to the root.
    pub assets: Vec<String>,
    pub root: RootDir,
}

/// Read the descriptor at `path` and parse it with the schema its
/// `version` selects. Relative paths inside it resolve against `root`.
pub fn parse_descriptor(path: &Path, root: &Path) -> Result<Descriptor, MultiError> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        MultiError::from(Diagnostic::generic(format!(
            "failed to read a document config {}: {}",
            path.display(),
            e
        )))
    })?;
    parse_descriptor_str(&path.display().to_string(), &source, root)
}

/// Parse descriptor text. `filepath` is only used in diagnostics.
pub fn parse_descriptor_str(
    filepath: &str,
    source: &str,
    root: &Path,
) -> Result<Descriptor, MultiError> {
    let detected = detect_version(filepath, source)?;
    match detected.number {
        1 => v1::parse(filepath, source, root),
        2 => v2::parse(filepath, source, root),
        n => Err(ParseError {
            filepath: filepath.to_string(),
            message: format!("unsupported version: {}. only '1' and '2' are supported", n),
            line: detected.mark.line,
            column: detected.mark.column,
            source_line: source_line(source, detected.mark.line),
        }
        .into()),
    }
}

/// Per-schema page parsing plugged into the shared root walk.
pub(crate) trait Schema {
    const VERSION: SchemaVersion;

    fn parse_pages(state: &mut ParseState<'_>, items: &[Node]) -> Vec<PageEntry>;
}

/// Top-level sections that may appear at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Version,
    Project,
    Pages,
    Assets,
    Annotation,
}

impl Section {
    fn name(self) -> &'static str {
        match self {
            Section::Version => "version",
            Section::Project => "project",
            Section::Pages => "pages",
            Section::Assets => "assets",
            Section::Annotation => "annotation",
        }
    }
}

#[derive(Debug, Default)]
struct Seen {
    version: bool,
    project: bool,
    pages: bool,
    assets: bool,
    annotation: bool,
}

impl Seen {
    fn flag(&mut self, section: Section) -> &mut bool {
        match section {
            Section::Version => &mut self.version,
            Section::Project => &mut self.project,
            Section::Pages => &mut self.pages,
            Section::Assets => &mut self.assets,
            Section::Annotation => &mut self.annotation,
        }
    }
}

/// Mutable state of one parse: source text for excerpts, the root for path
/// resolution, seen-section flags and the diagnostics collected so far.
pub(crate) struct ParseState<'a> {
    filepath: String,
    source: &'a str,
    root: RootDir,
    seen: Seen,
    errors: MultiError,
    default_language: String,
}

impl<'a> ParseState<'a> {
    fn new(filepath: &str, source: &'a str, root: &Path) -> Result<Self, MultiError> {
        let root = RootDir::new(root).map_err(|e| MultiError::from(Diagnostic::generic(e)))?;
        Ok(Self {
            filepath: filepath.to_string(),
            source,
            root,
            seen: Seen::default(),
            errors: MultiError::new(),
            default_language: DEFAULT_LANGUAGE.to_string(),
        })
    }

    pub(crate) fn default_language(&self) -> &str {
        &self.default_language
    }

    pub(crate) fn root(&self) -> &RootDir {
        &self.root
    }

    /// Record a diagnostic located at `node`.
    pub(crate) fn error_at(&mut self, message: impl Into<String>, node: &Node) {
        self.errors.push(ParseError {
            filepath: self.filepath.clone(),
            message: message.into(),
            line: node.mark.line,
            column: node.mark.column,
            source_line: source_line(self.source, node.mark.line),
        });
    }

    /// Record a diagnostic with no location.
    pub(crate) fn error(&mut self, message: impl Into<String>) {
        self.errors.push(Diagnostic::Generic(message.into()));
    }

    /// The text of a string scalar, or a diagnostic naming `key`.
    pub(crate) fn string_field(&mut self, key: &str, value: &Node) -> Option<String> {
        match value.as_str() {
            Some(s) => Some(s.to_string()),
            None => {
                self.error_at(format!("`{}` field must be a string", key), value);
                None
            }
        }
    }

    /// A timestamp field; `""` is the absent value.
    pub(crate) fn time_field(&mut self, key: &str, value: &Node) -> Option<Timestamp> {
        let text = self.string_field(key, value)?;
        match Timestamp::parse(&text) {
            Ok(t) => Some(t),
            Err(_) => {
                self.error_at(format!("`{}` field must follow RFC3339", key), value);
                None
            }
        }
    }

    /// Mark a top-level section as seen; reports and returns `false` on a
    /// duplicate.
    fn first_occurrence(&mut self, section: Section, node: &Node) -> bool {
        let flag = self.seen.flag(section);
        if *flag {
            self.error_at(
                format!(
                    "there should be exactly one `{}` section at the top level",
                    section.name()
                ),
                node,
            );
            return false;
        }
        *flag = true;
        true
    }

    /// Resolve a Markdown path and read its front matter.
    ///
    /// `field` names the descriptor key the path came from and is used
    /// when the path is empty.
    pub(crate) fn load_markdown(
        &mut self,
        field: &str,
        relative: &str,
        node: &Node,
    ) -> Option<(PathBuf, FrontMatter)> {
        if relative.is_empty() {
            self.error_at(format!("the `{}` field is required", field), node);
            return None;
        }
        let path = match self.root.resolve(relative) {
            Ok(p) => p,
            Err(e) => {
                self.error_at(e.to_string(), node);
                return None;
            }
        };
        match frontmatter::read(&path) {
            Ok(matter) => Some((path, matter)),
            Err(e) => {
                self.error_at(
                    format!("cannot read the markdown file: {}, {}", relative, e),
                    node,
                );
                None
            }
        }
    }

    /// Expand a glob and read the front matter of every match.
    pub(crate) fn load_matches(
        &mut self,
        pattern: &str,
        field: &str,
        node: &Node,
    ) -> Vec<(PathBuf, FrontMatter)> {
        if pattern.is_empty() {
            self.error_at(format!("the `{}` field is required", field), node);
            return Vec::new();
        }
        let files = match crate::glob::expand(&self.root, pattern) {
            Ok(files) => files,
            Err(e) => {
                self.error_at(e.to_string(), node);
                return Vec::new();
            }
        };
        tracing::debug!(pattern, matches = files.len(), "expanded match pattern");

        let mut loaded = Vec::with_capacity(files.len());
        for file in files {
            match frontmatter::read(&file) {
                Ok(matter) => loaded.push((file, matter)),
                Err(e) => {
                    let shown = self.display_path(&file);
                    self.error_at(format!("{}: {}", e, shown), node);
                }
            }
        }
        loaded
    }

    /// Validate a URL segment. `field` is the key it was declared under.
    pub(crate) fn check_link(&mut self, field: &str, link: &str, node: &Node, suffix: &str) {
        if link.is_empty() {
            self.error_at(format!("the `{}` field is required{}", field, suffix), node);
        } else if !is_valid_link(link) {
            self.error_at(
                format!(
                    "the {} `{}` contains invalid characters. Paths can only contain \
                     alphanumeric characters, underscores (_), and hyphens (-){}",
                    field, link, suffix
                ),
                node,
            );
        }
    }

    pub(crate) fn check_title(&mut self, title: &str, node: &Node, suffix: &str) {
        if title.is_empty() {
            self.error_at(format!("the `title` field is required{}", suffix), node);
        }
    }

    /// Locale keys must be ISO 639-1 and include the default language.
    pub(crate) fn check_locales<'k>(
        &mut self,
        locales: impl IntoIterator<Item = &'k String>,
        node: &Node,
    ) {
        let mut has_default = false;
        for code in locales {
            if !is_language_code(code) {
                self.error_at(
                    format!(
                        "`lang` key must be a valid ISO 639-1 language code (e.g., 'ja'). given: {}",
                        code
                    ),
                    node,
                );
            }
            has_default |= *code == self.default_language;
        }
        if !has_default {
            let message = format!(
                "`lang` must include the default language: {}",
                self.default_language
            );
            self.error_at(message, node);
        }
    }

    pub(crate) fn display_path(&self, path: &Path) -> String {
        self.root
            .relative(path)
            .unwrap_or_else(|| path.display().to_string())
    }

    fn parse_version(&mut self, value: &Node, expected: SchemaVersion) {
        match value.as_int() {
            None => self.error_at("`version` must have an integer value", value),
            Some(n) if n != expected.number() => self.error_at(
                format!(
                    "unsupported version: only '{}' is supported now",
                    expected.number()
                ),
                value,
            ),
            Some(_) => {}
        }
    }

    fn parse_project(&mut self, key: &Node, value: &Node) -> Project {
        let mut project = Project::default();
        match value.as_map() {
            None => self.error_at("the `project` must have a mapping value", value),
            Some(entries) => {
                for (k, v) in entries {
                    let name = k.key_text();
                    let slot = match name {
                        "project_id" => &mut project.project_id,
                        "name" => &mut project.name,
                        "description" => &mut project.description,
                        "version" => &mut project.version,
                        "logo" => &mut project.logo,
                        "repository" => &mut project.repository,
                        "default_language" => &mut project.default_language,
                        _ => {
                            self.error_at(
                                format!("the `project` does not accept the key: {}", name),
                                k,
                            );
                            continue;
                        }
                    };
                    if let Some(text) = self.string_field(name, v) {
                        *slot = text;
                    }
                }
            }
        }

        project.default_language = project.default_language.to_lowercase();
        if project.default_language.is_empty() {
            project.default_language = DEFAULT_LANGUAGE.to_string();
        }
        if project.project_id.is_empty() {
            self.error_at(
                "the `project` must have a `project_id` field longer than 1 character",
                key,
            );
        }
        if project.name.is_empty() {
            self.error_at(
                "the `project` must have a `name` field longer than 1 character",
                key,
            );
        }
        if !is_language_code(&project.default_language) {
            let message = format!(
                "`default_language` field must be a valid ISO 639-1 language code (e.g., 'ja'). given: {}",
                project.default_language
            );
            self.error_at(message, key);
        }
        if !project.repository.is_empty() && reqwest::Url::parse(&project.repository).is_err() {
            self.error_at("the `repository` field must be a valid URL", key);
        }
        project
    }

    fn parse_assets(&mut self, value: &Node) -> Vec<String> {
        let Some(items) = value.as_seq() else {
            self.error_at("the `assets` field must be a sequence type", value);
            return Vec::new();
        };
        let mut assets = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str() {
                Some(pattern) => assets.push(pattern.to_string()),
                None => self.error_at("an item in the `assets` field must have a string type", item),
            }
        }
        assets
    }

    fn finish<T>(mut self, value: T) -> Result<T, MultiError> {
        self.errors.sort_by_location();
        self.errors.into_result(value)
    }
}

/// Shared root walk for both schemas.
pub(crate) fn parse_with<S: Schema>(
    filepath: &str,
    source: &str,
    root: &Path,
) -> Result<Descriptor, MultiError> {
    let mut state = ParseState::new(filepath, source, root)?;
    let documents = match yaml::load(source) {
        Ok(docs) => docs,
        Err(e) => {
            let node = Node {
                value: yaml::Value::Seq(Vec::new()),
                mark: e.mark,
            };
            state.error_at(
                format!("failed to parse a document config: {}", e.message),
                &node,
            );
            return Err(state.errors);
        }
    };

    if documents.len() != 1 {
        state.error(format!(
            "there should be only one document. Got {}",
            documents.len()
        ));
        return Err(state.errors);
    }
    let body = &documents[0];
    let Some(entries) = body.as_map() else {
        state.error_at("the root node must be of mapping type", body);
        return Err(state.errors);
    };
    state.default_language = peek_default_language(entries);

    let mut project = Project {
        default_language: state.default_language.clone(),
        ..Project::default()
    };
    let mut pages = Vec::new();
    let mut assets = Vec::new();

    for (key, value) in entries {
        match key.key_text() {
            "version" => {
                if state.first_occurrence(Section::Version, key) {
                    state.parse_version(value, S::VERSION);
                }
            }
            "project" => {
                if state.first_occurrence(Section::Project, key) {
                    project = state.parse_project(key, value);
                }
            }
            "pages" => {
                if state.first_occurrence(Section::Pages, key) {
                    match value.as_seq() {
                        None => state.error_at("the `pages` field must be a sequence type", value),
                        Some([]) => state.error_at("the `pages` field must not be empty", value),
                        Some(items) => pages = S::parse_pages(&mut state, items),
                    }
                }
            }
            "assets" => {
                if state.first_occurrence(Section::Assets, key) {
                    assets = state.parse_assets(value);
                }
            }
            "annotation" => {
                // accepted as-is; only its uniqueness is checked
                state.first_occurrence(Section::Annotation, key);
            }
            _ => state.error_at("unexpected key at the top level", key),
        }
    }

    for section in [Section::Version, Section::Project, Section::Pages] {
        if !*state.seen.flag(section) {
            state.error(format!("the `{}` field is required", section.name()));
        }
    }

    let root = state.root.clone();
    state.finish(Descriptor {
        version: S::VERSION,
        project,
        pages,
        assets,
        root,
    })
}

/// `project.default_language` ahead of the main walk, so pages parsed
/// before the project block still know it. Invalid values fall back to
/// `en`; the project walk reports them.
fn peek_default_language(entries: &[(Node, Node)]) -> String {
    entries
        .iter()
        .filter(|(k, _)| k.key_text() == "project")
        .filter_map(|(_, v)| v.as_map())
        .flat_map(|m| m.iter())
        .find(|(k, _)| k.key_text() == "default_language")
        .and_then(|(_, v)| v.as_str())
        .map(str::to_lowercase)
        .filter(|code| !code.is_empty())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
}

/// Whether `link` only uses characters allowed in a URL segment.
pub fn is_valid_link(link: &str) -> bool {
    LINK_PATTERN.is_match(link)
}

pub fn is_language_code(code: &str) -> bool {
    code.len() == 2 && ISO_639_1.binary_search(&code).is_ok()
}

fn source_line(source: &str, line: usize) -> String {
    line.checked_sub(1)
        .and_then(|idx| source.split('\n').nth(idx))
        .map(|l| l.trim_end_matches('\r').to_string())
        .unwrap_or_else(|| "(unknown line)".to_string())
}

/// Sort direction of a `match` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub(crate) fn parse(text: &str) -> Option<Self> {
        match text.to_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    /// Stable sort by `key`; ties keep their enumeration order in both
    /// directions.
    pub(crate) fn sort_by_key<T, K: Ord>(self, items: &mut [T], key: impl Fn(&T) -> K) {
        match self {
            SortOrder::Asc => items.sort_by(|a, b| key(a).cmp(&key(b))),
            SortOrder::Desc => items.sort_by(|a, b| key(b).cmp(&key(a))),
        }
    }
}
