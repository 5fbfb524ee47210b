//! Archive and upload progress reporting.
//!
//! `dodo archive` and `dodo upload` report which blob is being written and
//! when the upload starts and ends. Progress goes to **stderr** so stdout
//! stays parseable for scripts (`dodo upload` prints the document URL there).

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Blob `n` of `total` is being written. Re-used blobs are counted too.
    Archiving { n: u64, total: u64, path: String },
    /// The archive is complete.
    Archived { blobs: u64, bytes: u64 },
    /// The archive is being sent.
    Uploading { bytes: u64 },
    Uploaded,
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "archive  12 / 40 blobs  docs/intro.md".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Archiving { n, total, path } => format!(
                "archive  {} / {} blobs  {}\n",
                format_number(*n),
                format_number(*total),
                path
            ),
            ProgressEvent::Archived { blobs, bytes } => format!(
                "archive  done: {} blobs, {} bytes\n",
                format_number(*blobs),
                format_number(*bytes)
            ),
            ProgressEvent::Uploading { bytes } => {
                format!("upload  sending {} bytes...\n", format_number(*bytes))
            }
            ProgressEvent::Uploaded => "upload  done\n".to_string(),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Archiving { n, total, path } => serde_json::json!({
                "event": "progress",
                "phase": "archiving",
                "n": n,
                "total": total,
                "path": path
            }),
            ProgressEvent::Archived { blobs, bytes } => serde_json::json!({
                "event": "progress",
                "phase": "archived",
                "blobs": blobs,
                "bytes": bytes
            }),
            ProgressEvent::Uploading { bytes } => serde_json::json!({
                "event": "progress",
                "phase": "uploading",
                "bytes": bytes
            }),
            ProgressEvent::Uploaded => serde_json::json!({
                "event": "progress",
                "phase": "uploaded"
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
