use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use dodo::archive::{write_archive, ArchiveSink, Bundle, METADATA_ENTRY};
use dodo::assets::MimeAllowList;
use dodo::descriptor::{parse_descriptor, parse_descriptor_str, PageEntry};
use dodo::error::MultiError;
use dodo::frontmatter;
use dodo::page::hash_file;
use dodo::progress::NoProgress;
use dodo::time::Timestamp;
use tempfile::TempDir;

fn write(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn load(root: &Path, descriptor: &str) -> Result<Bundle, MultiError> {
    write(root, ".dodo.yaml", descriptor);
    Bundle::load(&root.join(".dodo.yaml"), root, &MimeAllowList::default())
}

fn archive_entries(path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    archive.file_names().map(String::from).collect()
}

fn read_metadata(path: &Path) -> serde_json::Value {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut json = String::new();
    archive
        .by_name(METADATA_ENTRY)
        .unwrap()
        .read_to_string(&mut json)
        .unwrap();
    serde_json::from_str(&json).unwrap()
}

#[test]
fn single_locale_markdown_v1() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "README.md", "Hello, dodo.\n");
    let bundle = load(
        root,
        "version: 1\nproject:\n  project_id: p\n  name: n\npages:\n  - markdown: README.md\n    title: T\n    path: t\n",
    )
    .unwrap();

    let out = root.join("out.zip");
    write_archive(&bundle, &ArchiveSink::Path(out.clone()), &NoProgress).unwrap();

    let hash = hash_file(&root.join("README.md")).unwrap();
    let mut entries = archive_entries(&out);
    entries.sort();
    assert_eq!(entries, vec![format!("blobs/{}", hash), METADATA_ENTRY.to_string()]);

    let metadata = read_metadata(&out);
    assert_eq!(metadata["version"], "1");
    let leaf = &metadata["page"]["children"][0];
    assert_eq!(leaf["type"], "markdown");
    assert_eq!(
        leaf["language"],
        serde_json::json!({ "en": { "link": "t", "title": "T", "hash": hash } })
    );
}

#[test]
fn multi_locale_markdown_v2() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "R.en.md", "# Guide\n");
    write(root, "R.ja.md", "# ガイド\n");
    let bundle = load(
        root,
        r#"version: 2
project:
  project_id: p
  name: n
  default_language: en
pages:
  - type: markdown
    lang:
      en:
        filepath: R.en.md
        link: guide
        title: Guide
      ja:
        filepath: R.ja.md
        link: guide
        title: ガイド
"#,
    )
    .unwrap();

    let out = root.join("out.zip");
    write_archive(&bundle, &ArchiveSink::Path(out.clone()), &NoProgress).unwrap();

    let entries: HashSet<_> = archive_entries(&out).into_iter().collect();
    for file in ["R.en.md", "R.ja.md"] {
        let hash = hash_file(&root.join(file)).unwrap();
        assert!(entries.contains(&format!("blobs/{}", hash)), "{file} missing");
    }
    let metadata = read_metadata(&out);
    let languages = metadata["page"]["children"][0]["language"]
        .as_object()
        .unwrap();
    assert_eq!(languages.len(), 2);
    assert_eq!(languages["ja"]["title"], "ガイド");
}

#[test]
fn match_groups_locales_by_language_group() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(
        root,
        "doc.en.md",
        "---\nlang: en\nlanguage_group_id: guide\nlink: guide\ntitle: Guide\n---\nHello\n",
    );
    write(
        root,
        "doc.ja.md",
        "---\nlang: ja\nlanguage_group_id: guide\nlink: guide\ntitle: ガイド\n---\nこんにちは\n",
    );
    let descriptor = parse_descriptor_str(
        ".dodo.yaml",
        "version: 2\nproject:\n  project_id: p\n  name: n\n  default_language: en\npages:\n  - type: match\n    pattern: \"./*.md\"\n    sort_key: title\n    sort_order: asc\n",
        root,
    )
    .unwrap();

    assert_eq!(descriptor.pages.len(), 1);
    let PageEntry::MarkdownMulti { documents } = &descriptor.pages[0] else {
        panic!("expected one multi-locale page");
    };
    assert_eq!(documents.keys().collect::<Vec<_>>(), vec!["en", "ja"]);
}

#[test]
fn section_manifest_carries_path() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "ref.en.md", "---\ntitle: Reference\n---\nBody\n");
    write(root, "ref.ja.md", "---\ntitle: リファレンス\n---\n本文\n");
    write(root, "api.md", "API\n");
    let bundle = load(
        root,
        r#"version: 2
project:
  project_id: p
  name: n
pages:
  - type: section
    path: reference
    lang:
      en:
        filepath: ref.en.md
      ja:
        filepath: ref.ja.md
    children:
      - type: directory
        title: Misc
        children:
          - type: markdown
            filepath: api.md
            title: API
            link: api
"#,
    )
    .unwrap();

    let out = root.join("out.zip");
    write_archive(&bundle, &ArchiveSink::Path(out.clone()), &NoProgress).unwrap();
    let metadata = read_metadata(&out);

    let section = &metadata["page"]["children"][0];
    assert_eq!(section["type"], "section");
    assert_eq!(section["path"], "reference");
    assert_eq!(section["language"]["ja"]["title"], "リファレンス");
    assert_eq!(
        section["language"]["en"]["hash"],
        hash_file(&root.join("ref.en.md")).unwrap().as_str()
    );

    let directory = &section["children"][0];
    assert_eq!(directory["type"], "directory");
    assert!(directory.get("path").is_none());
    assert_eq!(directory["children"][0]["type"], "markdown");
}

#[test]
fn traversal_outside_root_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let project = tmp.path().join("project");
    fs::create_dir(&project).unwrap();
    write(tmp.path(), "secret.md", "top secret");

    let err = load(
        &project,
        "version: 1\nproject:\n  project_id: p\n  name: n\npages:\n  - markdown: ../secret.md\n    title: T\n    path: t\n",
    )
    .unwrap_err();
    assert_eq!(err.len(), 1);
    let diagnostic = err.iter().next().unwrap();
    assert!(diagnostic.location().is_some());
    assert!(diagnostic.message().contains("not under the root directory"));
}

#[test]
fn diagnostics_are_aggregated_in_source_order() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "a.md", "no front matter\n");
    write(root, "b.md", "no front matter\n");

    let err = parse_descriptor_str(
        ".dodo.yaml",
        "version: 1\npages:\n  - markdown: a.md\n    path: a\n  - markdown: b.md\n    title: B\n    path: b/c\n",
        root,
    )
    .unwrap_err();

    assert_eq!(err.len(), 3);
    let located: Vec<_> = err.iter().filter_map(|d| d.location()).collect();
    assert!(located.windows(2).all(|w| w[0] <= w[1]));
    let messages: Vec<_> = err.iter().map(|d| d.message().to_string()).collect();
    assert!(messages[0].contains("`title` field is required"));
    assert!(messages[1].contains("invalid characters"));
    assert!(messages[2].contains("`project`"));
}

#[test]
fn front_matter_rewrite_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("page.md");
    fs::write(&file, "---\ntitle: A\n---\n# H\n").unwrap();

    let mut matter = frontmatter::read(&file).unwrap();
    matter.title = "B".to_string();
    frontmatter::rewrite(&file, &matter).unwrap();
    let first = fs::read_to_string(&file).unwrap();
    assert_eq!(first, format!("{}# H\n", matter.render().unwrap()));
    assert!(first.contains("title: \"B\""));

    let again = frontmatter::read(&file).unwrap();
    assert_eq!(again, matter);
    frontmatter::rewrite(&file, &again).unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), first);
}

#[test]
fn unsupported_version_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let err = parse_descriptor_str(
        ".dodo.yaml",
        "version: 3\nproject:\n  project_id: p\n  name: n\npages: []\n",
        tmp.path(),
    )
    .unwrap_err();
    assert!(err.iter().next().unwrap().message().starts_with("unsupported version: 3"));
}

#[test]
fn empty_pages_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let err = parse_descriptor_str(
        ".dodo.yaml",
        "version: 1\nproject:\n  project_id: p\n  name: n\npages: []\n",
        tmp.path(),
    )
    .unwrap_err();
    assert_eq!(
        err.iter().next().unwrap().message(),
        "the `pages` field must not be empty"
    );
}

#[test]
fn default_language_is_lowercased_and_validated() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "README.md", "");
    let pages = "pages:\n  - markdown: README.md\n    title: T\n    path: t\n";

    let ok = parse_descriptor_str(
        ".dodo.yaml",
        &format!("version: 1\nproject:\n  project_id: p\n  name: n\n  default_language: EN\n{pages}"),
        tmp.path(),
    )
    .unwrap();
    assert_eq!(ok.project.default_language, "en");

    let err = parse_descriptor_str(
        ".dodo.yaml",
        &format!("version: 1\nproject:\n  project_id: p\n  name: n\n  default_language: eng\n{pages}"),
        tmp.path(),
    )
    .unwrap_err();
    assert!(err.iter().any(|d| d.message().contains("ISO 639-1")));
}

#[test]
fn timestamps_treat_empty_as_absent() {
    assert!(!Timestamp::parse("").unwrap().is_present());
    assert!(Timestamp::parse("2024-05-01T10:00:00+09:00").unwrap().is_present());
    assert!(Timestamp::parse("May 1st").is_err());
}

#[test]
fn archive_blobs_match_manifest_hashes() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "docs/a.md", "---\ntitle: A\nlink: a\n---\nA\n");
    write(root, "docs/b.md", "---\ntitle: B\nlink: b\n---\nB\n");
    write(root, "assets/logo.png", "png bytes");
    write(root, "assets/photo.jpg", "jpg bytes");
    let bundle = load(
        root,
        "version: 1\nproject:\n  project_id: p\n  name: n\n  logo: assets/logo.png\npages:\n  - directory: Docs\n    children:\n      - match: docs/*.md\n        sort_key: title\nassets:\n  - \"assets/**/*\"\n",
    )
    .unwrap();
    assert_eq!(bundle.assets.len(), 2);

    let out = root.join("out.zip");
    write_archive(&bundle, &ArchiveSink::Path(out.clone()), &NoProgress).unwrap();
    let entries = archive_entries(&out);
    assert_eq!(entries.last().map(String::as_str), Some(METADATA_ENTRY));

    let blobs: HashSet<_> = entries
        .iter()
        .filter_map(|e| e.strip_prefix("blobs/"))
        .map(String::from)
        .collect();
    let referenced: HashSet<_> = bundle
        .manifest
        .hashes()
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(blobs, referenced);
}

#[test]
fn parse_descriptor_reports_missing_file() {
    let tmp = TempDir::new().unwrap();
    let err = parse_descriptor(&tmp.path().join(".dodo.yaml"), tmp.path()).unwrap_err();
    assert!(err
        .iter()
        .next()
        .unwrap()
        .message()
        .starts_with("failed to read a document config"));
}
