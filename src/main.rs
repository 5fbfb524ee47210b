//! # dodo CLI
//!
//! The `dodo` binary validates, packages and publishes documentation
//! projects described by a `.dodo.yaml`, and queries documents already
//! published on dodo-doc.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dodo check` | Validate the descriptor, pages and assets |
//! | `dodo archive -o out.zip` | Validate, then write the archive |
//! | `dodo upload` | Validate, archive and upload; prints the document URL |
//! | `dodo init` | Write a starter `.dodo.yaml` |
//! | `dodo touch <file>` | Create or refresh a Markdown front matter |
//! | `dodo search "<query>"` | Search published documents |
//! | `dodo read <url>` | Print a published document as Markdown |
//! | `dodo projects` | List projects visible to the API key |
//! | `dodo mcp` | Serve `search` and `read_document` over MCP stdio |
//! | `dodo completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! # Validate the project in ./docs
//! dodo check -w ./docs
//!
//! # Build an archive without uploading
//! dodo archive -o docs.zip --progress json
//!
//! # Publish
//! DODO_API_KEY=... dodo upload
//! ```
//!
//! Diagnostics go to stderr; the exit code is non-zero on any error.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use dodo::archive::{write_archive, ArchiveSink, Bundle};
use dodo::client::{parse_document_url, Client, Endpoint};
use dodo::error::MultiError;
use dodo::init::{run_init, InitOptions};
use dodo::mcp::{serve_stdio, DodoMcp};
use dodo::printer::ErrorPrinter;
use dodo::progress::{ProgressEvent, ProgressMode};
use dodo::settings::{self, Settings};
use dodo::touch::{run_touch, TouchOptions, Touched};

/// dodo: publish Markdown documentation to dodo-doc.
#[derive(Parser)]
#[command(
    name = "dodo",
    about = "Package Markdown documentation projects and publish them to dodo-doc",
    version,
    long_about = "dodo reads a `.dodo.yaml` descriptor, resolves its pages and assets under the \
    project root, packs them into a content-addressed ZIP archive and uploads it to dodo-doc. \
    It can also search and read published documents, and serve them to MCP clients."
)]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    /// Path to a settings file (TOML).
    ///
    /// Defaults to `$HOME/.config/dodo/settings.toml` when it exists.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Location of the descriptor and the project root.
#[derive(Args, Clone, Debug)]
struct ProjectArgs {
    /// Descriptor path, relative to the working directory.
    #[arg(short = 'c', long, default_value = ".dodo.yaml")]
    config: PathBuf,

    /// Project root. Every page and asset must live under it.
    #[arg(short = 'w', long = "working-dir", visible_alias = "workingDir", default_value = ".")]
    working_dir: PathBuf,
}

impl ProjectArgs {
    fn descriptor_path(&self) -> PathBuf {
        self.working_dir.join(&self.config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the project without writing anything.
    ///
    /// Parses the descriptor, resolves every page and asset and prints all
    /// diagnostics at once.
    Check {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Validate the project and write the archive.
    Archive {
        #[command(flatten)]
        project: ProjectArgs,

        /// Output ZIP path.
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Progress on stderr. Defaults to `human` on a terminal, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Validate, archive and upload the project.
    ///
    /// Requires `DODO_API_KEY`. The archive is written to a temporary file
    /// unless `--output` is given. Prints the document URL on success.
    Upload {
        #[command(flatten)]
        project: ProjectArgs,

        /// Keep the archive at this path.
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Upload endpoint. Overrides the settings file and `DODO_ENDPOINT`.
        #[arg(long)]
        endpoint: Option<String>,

        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write a starter `.dodo.yaml`.
    Init {
        #[arg(short = 'c', long, default_value = ".dodo.yaml")]
        config: PathBuf,

        #[arg(short = 'w', long = "working-dir", visible_alias = "workingDir", default_value = ".")]
        working_dir: PathBuf,

        /// Overwrite an existing file.
        #[arg(short = 'f', long)]
        force: bool,

        /// Project name. Defaults to the working directory's name.
        #[arg(long)]
        project_name: Option<String>,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Create a Markdown file with front matter, or refresh an existing one.
    Touch {
        file: PathBuf,

        /// Title of the page.
        #[arg(short = 't', long)]
        title: Option<String>,

        /// URL path of the page. Defaults to the file path for new files.
        #[arg(short = 'p', long)]
        path: Option<String>,

        /// Timestamp to use instead of the current time (RFC 3339).
        #[arg(long)]
        now: Option<String>,
    },

    /// Search published documents.
    Search {
        query: String,

        /// Restrict to these project ids. Repeatable.
        #[arg(long = "project")]
        projects: Vec<String>,

        /// Contents endpoint. Overrides the settings file.
        #[arg(long)]
        endpoint: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Print a published document as Markdown.
    Read {
        /// Document URL, e.g. `https://<project>.docs.dodo-doc.com/guide/intro`.
        url: String,

        #[arg(long)]
        endpoint: Option<String>,
    },

    /// List the projects visible to the API key.
    Projects {
        #[arg(long)]
        endpoint: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Serve `search` and `read_document` to MCP clients over stdio.
    Mcp {
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Print a shell completion script.
    Completions { shell: Shell },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dodo::logging::init(cli.debug);
    if cli.no_color {
        colored::control::set_override(false);
    }
    let no_color = cli.no_color;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err, no_color);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings_path = cli.settings;
    let load_settings = || Settings::load(settings_path.as_deref());

    match cli.command {
        Commands::Check { project } => {
            load_bundle(&project, &load_settings()?)?;
            tracing::info!("the project is valid");
        }
        Commands::Archive {
            project,
            output,
            progress,
        } => {
            let bundle = load_bundle(&project, &load_settings()?)?;
            let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
            let archive = write_archive(&bundle, &ArchiveSink::Path(output), reporter.as_ref())?;
            println!("{}", archive.path().display());
        }
        Commands::Upload {
            project,
            output,
            endpoint,
            progress,
            json,
        } => {
            let settings = load_settings()?;
            let endpoint = match endpoint {
                Some(url) => Endpoint::parse(&url)?,
                None => settings.upload_endpoint()?,
            };
            let client = Client::new(&settings::api_key(), settings.timeout())?;
            let bundle = load_bundle(&project, &settings)?;

            let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
            let sink = output.map(ArchiveSink::Path).unwrap_or(ArchiveSink::Temp);
            let archive = write_archive(&bundle, &sink, reporter.as_ref())?;
            let bytes = std::fs::metadata(archive.path())
                .map(|m| m.len())
                .unwrap_or_default();

            reporter.report(ProgressEvent::Uploading { bytes });
            let uploaded = client
                .upload(&endpoint, &bundle.manifest, archive.path())
                .await;
            if let Err(e) = archive.close() {
                tracing::warn!(error = %e, "failed to remove the temporary archive");
            }
            let response = uploaded?;
            reporter.report(ProgressEvent::Uploaded);

            if json {
                let out = serde_json::json!({
                    "status": "success",
                    "document_url": response.document_url,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", response.document_url);
            }
        }
        Commands::Init {
            config,
            working_dir,
            force,
            project_name,
            description,
        } => {
            let path = run_init(&InitOptions {
                config,
                working_dir,
                force,
                project_name,
                description,
            })?;
            println!("Created {}", path.display());
        }
        Commands::Touch {
            file,
            title,
            path,
            now,
        } => {
            let opts = TouchOptions {
                file,
                title,
                path,
                now,
            };
            match run_touch(&opts)? {
                Touched::Created => println!("Created {}", opts.file.display()),
                Touched::Updated => println!("Updated {}", opts.file.display()),
            }
        }
        Commands::Search {
            query,
            projects,
            endpoint,
            json,
        } => {
            let (client, endpoint) = contents_client(&load_settings()?, endpoint)?;
            let records = client.search(&endpoint, &query, &projects).await?;
            if json {
                let out = serde_json::json!({ "items": records });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if records.is_empty() {
                println!("No results.");
            } else {
                for (i, record) in records.iter().enumerate() {
                    let title = if record.title.is_empty() {
                        "(untitled)"
                    } else {
                        record.title.as_str()
                    };
                    println!("{}. {} / {}", i + 1, record.project_slug, title);
                    println!("    url: {}", record.url);
                    println!("    excerpt: \"{}\"", excerpt(&record.contents));
                    println!();
                }
            }
        }
        Commands::Read { url, endpoint } => {
            let (slug, path) = parse_document_url(&url)?;
            let (client, endpoint) = contents_client(&load_settings()?, endpoint)?;
            let markdown = client.read_document(&endpoint, &slug, &path).await?;
            println!("{}", markdown);
        }
        Commands::Projects { endpoint, json } => {
            let settings = load_settings()?;
            let endpoint = match endpoint {
                Some(url) => Endpoint::parse(&url)?,
                None => settings.projects_endpoint()?,
            };
            let client = Client::new(&settings::api_key(), settings.timeout())?;
            let projects = client.projects(&endpoint).await?;
            if json {
                let out = serde_json::json!({ "projects": projects });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{:<24} {:<32} {:<8} URL", "SLUG", "NAME", "PUBLIC");
                for p in &projects {
                    println!(
                        "{:<24} {:<32} {:<8} {}",
                        p.slug, p.project_name, p.is_public, p.base_url
                    );
                }
            }
        }
        Commands::Mcp { endpoint } => {
            let (client, endpoint) = contents_client(&load_settings()?, endpoint)?;
            serve_stdio(DodoMcp::new(client, endpoint)).await?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "dodo", &mut io::stdout());
        }
    }

    Ok(())
}

/// Parse the descriptor and resolve pages and assets.
fn load_bundle(project: &ProjectArgs, settings: &Settings) -> Result<Bundle> {
    let descriptor = project.descriptor_path();
    tracing::debug!(
        config = %descriptor.display(),
        root = %project.working_dir.display(),
        "loading project"
    );
    ensure_dir(&project.working_dir)?;
    let bundle = Bundle::load(&descriptor, &project.working_dir, &settings.mime_allow_list())?;
    tracing::info!(
        project_id = %bundle.descriptor.project.project_id,
        pages = bundle.tree.count(),
        assets = bundle.assets.len(),
        blobs = bundle.manifest.hashes().len(),
        "project resolved"
    );
    Ok(bundle)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    let meta = std::fs::metadata(dir).with_context(|| {
        format!(
            "specified `root` argument is invalid. please check the directory exist. path: {}",
            dir.display()
        )
    })?;
    if !meta.is_dir() {
        anyhow::bail!(
            "the provided `root` argument is invalid. path: {}",
            dir.display()
        );
    }
    Ok(())
}

fn contents_client(settings: &Settings, endpoint: Option<String>) -> Result<(Client, Endpoint)> {
    let endpoint = match endpoint {
        Some(url) => Endpoint::parse(&url)?,
        None => settings.contents_endpoint()?,
    };
    let client = Client::new(&settings::api_key(), settings.timeout())?;
    Ok((client, endpoint))
}

fn excerpt(contents: &str) -> String {
    const MAX_CHARS: usize = 120;
    let flat = contents.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat.to_string(),
    }
}

/// Print `err` to stderr, one line per diagnostic when it carries several.
fn report(err: &anyhow::Error, no_color: bool) {
    let mut printer = ErrorPrinter::stderr(no_color);
    let printed = match err.downcast_ref::<MultiError>() {
        Some(errors) => printer.print_all(errors),
        None => printer.print_error(&format!("{:#}", err)),
    };
    if printed.is_err() {
        eprintln!("{:#}", err);
    }
}
