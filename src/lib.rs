//! # dodo
//!
//! Packages a Markdown documentation project into a content-addressed ZIP
//! archive and publishes it to dodo-doc.
//!
//! A project is described by a `.dodo.yaml` descriptor at its root. The
//! pipeline parses it, resolves every page and asset under the project
//! root, and writes an archive whose blobs are named by their SHA-256:
//!
//! ```text
//! .dodo.yaml ─▶ descriptor ─▶ page tree ─┐
//!                        └──▶ assets ────┼─▶ manifest ─▶ archive.zip ─▶ upload
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dodo init --project-name "My Docs"   # write .dodo.yaml
//! dodo touch docs/intro.md -t Intro    # new page with front matter
//! dodo check                           # validate without writing
//! dodo archive -o docs.zip             # build the archive
//! DODO_API_KEY=... dodo upload         # build and publish
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`path_guard`] | Confine file access to the project root |
//! | [`time`] | Optional RFC 3339 timestamps |
//! | [`frontmatter`] | Markdown front matter read/rewrite |
//! | [`yaml`] | YAML tree with source positions |
//! | [`descriptor`] | `.dodo.yaml` parsing (schemas 1 and 2) |
//! | [`glob`] | Recursive glob expansion under the root |
//! | [`page`] | Resolved page tree and page hashing |
//! | [`assets`] | Asset expansion and MIME allow-list |
//! | [`manifest`] | `metadata.json` model |
//! | [`archive`] | ZIP assembly |
//! | [`error`] | Diagnostics and `MultiError` |
//! | [`printer`] | Diagnostic pretty-printer |
//! | [`progress`] | Archive/upload progress reporting |
//! | [`settings`] | Client settings file |
//! | [`client`] | dodo-doc HTTP API |
//! | [`mcp`] | MCP stdio server |
//! | [`init`] | `.dodo.yaml` template writer |
//! | [`touch`] | Front matter authoring helper |
//! | [`logging`] | Tracing subscriber setup |

pub mod archive;
pub mod assets;
pub mod client;
pub mod descriptor;
pub mod error;
pub mod frontmatter;
pub mod glob;
pub mod init;
pub mod logging;
pub mod manifest;
pub mod mcp;
pub mod page;
pub mod path_guard;
pub mod printer;
pub mod progress;
pub mod settings;
pub mod time;
pub mod touch;
pub mod yaml;
