//! Reading and rewriting the YAML front matter of Markdown files.
//!
//! Front matter is the leading block fenced by `---` lines:
//!
//! ```markdown
//! ---
//! title: "Getting started"
//! link: "getting_started"
//! group: "aZ09bY18cX27"
//! lang: en
//! ---
//!
//! # Getting started
//! ```
//!
//! | Key | Field | Aliases |
//! |-----|-------|---------|
//! | `title` | [`FrontMatter::title`] | |
//! | `link` | [`FrontMatter::link`] | `path` |
//! | `group` | [`FrontMatter::group`] | `language_group_id` |
//! | `description` | [`FrontMatter::description`] | |
//! | `created_at` / `updated_at` | RFC 3339 [`Timestamp`]s | |
//!
//! Everything else (including `lang` / `language`) is kept in
//! [`FrontMatter::unknown`] and written back unchanged. A file without a
//! group receives a fresh random one so its locale variants can be linked.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use uuid::Uuid;

use crate::time::Timestamp;

const FENCE: &str = "---";
const GROUP_ID_LEN: usize = 12;
const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

#[derive(Debug, thiserror::Error)]
pub enum FrontMatterError {
    #[error("failed to access {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("the front matter must be a YAML mapping")]
    NotAMapping,

    #[error("the front matter field `{key}` must be a scalar value")]
    InvalidField { key: String },

    #[error("`{key}` must follow the RFC3339 format. Got: {value}")]
    Time { key: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub title: String,
    pub link: String,
    /// Language group id shared by the locale variants of one page.
    pub group: String,
    pub description: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub unknown: BTreeMap<String, Value>,
}

impl FrontMatter {
    /// A fresh front matter for a new document, stamped with `now`.
    pub fn new(title: &str, link: &str, now: Timestamp) -> Self {
        Self {
            title: title.to_string(),
            link: link.to_string(),
            group: random_group_id(),
            description: String::new(),
            created_at: now.clone(),
            updated_at: now,
            unknown: BTreeMap::new(),
        }
    }

    /// Locale declared by `lang` (or `language`), lowercased.
    pub fn lang(&self) -> Option<String> {
        ["lang", "language"].iter().find_map(|key| match self.unknown.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.to_lowercase()),
            _ => None,
        })
    }

    /// Render the fenced block, keys in a fixed order.
    pub fn render(&self) -> Result<String, FrontMatterError> {
        let mut out = String::new();
        out.push_str(FENCE);
        out.push('\n');
        push_quoted(&mut out, "title", &self.title);
        if !self.link.is_empty() {
            push_quoted(&mut out, "link", &self.link);
        }
        if !self.group.is_empty() {
            push_quoted(&mut out, "group", &self.group);
        }
        push_quoted(&mut out, "description", &self.description);
        push_quoted(&mut out, "created_at", self.created_at.as_str());
        push_quoted(&mut out, "updated_at", self.updated_at.as_str());
        for (key, value) in &self.unknown {
            let mut single = serde_yaml::Mapping::new();
            single.insert(Value::String(key.clone()), value.clone());
            out.push_str(&serde_yaml::to_string(&single)?);
        }
        out.push_str(FENCE);
        out.push('\n');
        Ok(out)
    }
}

/// Read the front matter of the Markdown file at `path`.
pub fn read(path: &Path) -> Result<FrontMatter, FrontMatterError> {
    let content = fs::read_to_string(path).map_err(|source| FrontMatterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content).map(|(matter, _)| matter)
}

/// Parse `content` into its front matter and the body that follows it.
///
/// Content without a leading fence, or whose opening fence is never closed,
/// has an empty front matter.
pub fn parse(content: &str) -> Result<(FrontMatter, &str), FrontMatterError> {
    let (block, body) = split(content);
    let mut matter = match block {
        Some(yaml) => from_yaml(yaml)?,
        None => FrontMatter::default(),
    };
    if matter.group.is_empty() {
        matter.group = random_group_id();
    }
    Ok((matter, body))
}

/// Replace the front matter of `path` in place, leaving the body intact.
pub fn rewrite(path: &Path, matter: &FrontMatter) -> Result<(), FrontMatterError> {
    let io_err = |source| FrontMatterError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(io_err)?;
    let mut content = String::new();
    file.read_to_string(&mut content).map_err(io_err)?;

    let (_, body) = split(&content);
    let mut updated = matter.render()?;
    updated.push_str(body);

    file.set_len(0).map_err(io_err)?;
    file.seek(SeekFrom::Start(0)).map_err(io_err)?;
    file.write_all(updated.as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    Ok(())
}

/// A 12 character alphanumeric id drawn from the OS random source.
pub fn random_group_id() -> String {
    let mut id = String::with_capacity(GROUP_ID_LEN);
    while id.len() < GROUP_ID_LEN {
        let bytes = *Uuid::new_v4().as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            // bytes 6 and 8 carry the fixed version and variant bits
            if i == 6 || i == 8 || *b >= 248 {
                continue;
            }
            id.push(ALPHABET[(*b % 62) as usize] as char);
            if id.len() == GROUP_ID_LEN {
                break;
            }
        }
    }
    id
}

/// A lone leading `---` is a thematic break in the body.
fn split(content: &str) -> (Option<&str>, &str) {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');
    let start = match lines.next() {
        Some(first) if trim_eol(first) == FENCE => first.len(),
        _ => return (None, content),
    };

    let mut pos = start;
    for line in lines {
        if trim_eol(line) == FENCE {
            return (Some(&content[start..pos]), &content[pos + line.len()..]);
        }
        pos += line.len();
    }
    (None, content)
}

fn trim_eol(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

fn from_yaml(yaml: &str) -> Result<FrontMatter, FrontMatterError> {
    let mapping = match serde_yaml::from_str::<Value>(yaml)? {
        Value::Mapping(m) => m,
        Value::Null => serde_yaml::Mapping::new(),
        _ => return Err(FrontMatterError::NotAMapping),
    };

    let mut matter = FrontMatter::default();
    let mut path_alias = String::new();
    let mut group_alias = String::new();
    for (key, value) in mapping {
        let key = match scalar_text(&key) {
            Some(k) => k,
            None => return Err(FrontMatterError::NotAMapping),
        };
        let field = |key: &str, value: &Value| {
            scalar_text(value).ok_or_else(|| FrontMatterError::InvalidField {
                key: key.to_string(),
            })
        };
        match key.to_lowercase().as_str() {
            "title" => matter.title = field(&key, &value)?,
            "link" => matter.link = field(&key, &value)?,
            "path" => path_alias = field(&key, &value)?,
            "group" => matter.group = field(&key, &value)?,
            "language_group_id" => group_alias = field(&key, &value)?,
            "description" => matter.description = field(&key, &value)?,
            "created_at" => matter.created_at = timestamp("created_at", field(&key, &value)?)?,
            "updated_at" => matter.updated_at = timestamp("updated_at", field(&key, &value)?)?,
            _ => {
                matter.unknown.insert(key, value);
            }
        }
    }
    if matter.link.is_empty() {
        matter.link = path_alias;
    }
    if matter.group.is_empty() {
        matter.group = group_alias;
    }
    Ok(matter)
}

fn timestamp(key: &'static str, text: String) -> Result<Timestamp, FrontMatterError> {
    Timestamp::parse(&text).map_err(|_| FrontMatterError::Time { key, value: text })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn push_quoted(out: &mut String, key: &str, value: &str) {
    let _ = write!(out, "{}: \"", key);
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push_str("\"\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ts(text: &str) -> Timestamp {
        Timestamp::parse(text).unwrap()
    }

    #[test]
    fn content_without_fence_has_empty_front_matter() {
        let (matter, body) = parse("# Title\n\nbody\n").unwrap();
        assert_eq!(matter.title, "");
        assert_eq!(body, "# Title\n\nbody\n");
        assert_eq!(matter.group.len(), GROUP_ID_LEN);
    }

    #[test]
    fn reads_known_and_unknown_keys() {
        let content = "---\ntitle: Guide\nlink: guide\ngroup: g1\ndescription: About\n\
                       created_at: 2024-01-01T00:00:00Z\nlang: JA\ntags: [a, b]\n---\nbody\n";
        let (matter, body) = parse(content).unwrap();
        assert_eq!(matter.title, "Guide");
        assert_eq!(matter.link, "guide");
        assert_eq!(matter.group, "g1");
        assert_eq!(matter.description, "About");
        assert_eq!(matter.created_at.as_str(), "2024-01-01T00:00:00Z");
        assert!(!matter.updated_at.is_present());
        assert_eq!(matter.lang().as_deref(), Some("ja"));
        assert!(matter.unknown.contains_key("tags"));
        assert_eq!(body, "body\n");
    }

    #[test]
    fn accepts_legacy_aliases() {
        let content = "---\npath: old_link\nlanguage_group_id: guide\nlanguage: en\n---\n";
        let (matter, _) = parse(content).unwrap();
        assert_eq!(matter.link, "old_link");
        assert_eq!(matter.group, "guide");
        assert_eq!(matter.lang().as_deref(), Some("en"));
    }

    #[test]
    fn invalid_timestamp_is_reported() {
        let err = parse("---\nupdated_at: last week\n---\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "`updated_at` must follow the RFC3339 format. Got: last week"
        );
    }

    #[test]
    fn unclosed_fence_is_part_of_the_body() {
        let (matter, body) = parse("---\n# Heading\n").unwrap();
        assert!(matter.title.is_empty());
        assert_eq!(body, "---\n# Heading\n");
    }

    #[test]
    fn non_mapping_block_is_an_error() {
        assert!(matches!(
            parse("---\n- a\n- b\n---\n"),
            Err(FrontMatterError::NotAMapping)
        ));
    }

    #[test]
    fn generated_group_ids_are_alphanumeric() {
        let a = random_group_id();
        let b = random_group_id();
        assert_eq!(a.len(), GROUP_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn render_uses_fixed_key_order() {
        let mut matter = FrontMatter::new("T", "t", ts("2024-01-01T00:00:00Z"));
        matter.group = "abc".to_string();
        matter
            .unknown
            .insert("zeta".to_string(), Value::String("z".to_string()));
        matter
            .unknown
            .insert("lang".to_string(), Value::String("en".to_string()));
        assert_eq!(
            matter.render().unwrap(),
            "---\ntitle: \"T\"\nlink: \"t\"\ngroup: \"abc\"\ndescription: \"\"\n\
             created_at: \"2024-01-01T00:00:00Z\"\nupdated_at: \"2024-01-01T00:00:00Z\"\n\
             lang: en\nzeta: z\n---\n"
        );
    }

    #[test]
    fn render_escapes_quotes() {
        let mut matter = FrontMatter::default();
        matter.title = "say \"hi\"".to_string();
        let rendered = matter.render().unwrap();
        let (back, _) = parse(&rendered).unwrap();
        assert_eq!(back.title, "say \"hi\"");
    }

    #[test]
    fn rewrite_keeps_body_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.md");
        fs::write(&path, "---\ntitle: A\nextra: keep\n---\n# H\n").unwrap();

        let mut matter = read(&path).unwrap();
        matter.title = "B".to_string();
        matter.updated_at = ts("2024-05-01T10:00:00Z");
        rewrite(&path, &matter).unwrap();

        let first = fs::read_to_string(&path).unwrap();
        assert!(first.starts_with("---\ntitle: \"B\"\n"));
        assert!(first.ends_with("---\n# H\n"));
        assert!(first.contains("extra: keep\n"));

        let again = read(&path).unwrap();
        assert_eq!(again, matter);
        rewrite(&path, &again).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn rewrite_adds_block_to_plain_markdown() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.md");
        fs::write(&path, "# Plain\n").unwrap();
        let matter = FrontMatter::new("Plain", "plain", ts("2024-01-01T00:00:00Z"));
        rewrite(&path, &matter).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("---\n# Plain\n"));
        assert_eq!(read(&path).unwrap().title, "Plain");
    }

    #[test]
    fn missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            read(&tmp.path().join("nope.md")),
            Err(FrontMatterError::Io { .. })
        ));
    }
}
