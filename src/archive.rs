//! Archive assembly.
//!
//! A project is uploaded as one ZIP file:
//!
//! | Entry | Content |
//! |-------|---------|
//! | `blobs/<hash>` | one entry per distinct page body or asset, named by its SHA-256 |
//! | `metadata.json` | the [`Manifest`], always the last entry |
//!
//! [`Bundle::load`] runs the whole pipeline up to the manifest (descriptor,
//! page tree, assets); [`write_archive`] streams the bundle into a sink.
//! Per-file failures are collected and reported together; only a sink that
//! cannot be created or finished aborts early.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::assets::{expand_assets, Asset, MimeAllowList};
use crate::descriptor::{parse_descriptor, Descriptor};
use crate::error::MultiError;
use crate::manifest::Manifest;
use crate::page::{build_tree, PageTree};
use crate::path_guard::{RootDir, TraversalError};
use crate::progress::{ProgressEvent, ProgressReporter};

pub const METADATA_ENTRY: &str = "metadata.json";
pub const BLOBS_DIR: &str = "blobs";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to create a file. Path: {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },

    #[error("failed to create a temporary file: {0}")]
    Temp(#[source] io::Error),

    #[error("failed to open the file. File: {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Traversal(#[from] TraversalError),

    #[error("failed to write file into zip archive: {0}")]
    Write(#[source] io::Error),

    #[error("failed to write zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to serialize metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("failed to remove the archive file: {0}")]
    Cleanup(#[source] io::Error),
}

/// Where the archive is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSink {
    /// An explicit path, kept after the run.
    Path(PathBuf),
    /// A temporary file, deleted when the [`ArchiveFile`] is closed or dropped.
    Temp,
}

/// A finished archive on disk.
#[derive(Debug)]
pub struct ArchiveFile {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Kept(PathBuf),
    Temp(NamedTempFile),
}

impl ArchiveFile {
    fn create(sink: &ArchiveSink) -> Result<(Self, File), ArchiveError> {
        match sink {
            ArchiveSink::Path(path) => {
                let file = File::create(path).map_err(|source| ArchiveError::Create {
                    path: path.clone(),
                    source,
                })?;
                Ok((
                    Self {
                        inner: Inner::Kept(path.clone()),
                    },
                    file,
                ))
            }
            ArchiveSink::Temp => {
                let temp = tempfile::Builder::new()
                    .prefix("dodo")
                    .suffix(".zip")
                    .tempfile()
                    .map_err(ArchiveError::Temp)?;
                let file = temp.as_file().try_clone().map_err(ArchiveError::Temp)?;
                Ok((
                    Self {
                        inner: Inner::Temp(temp),
                    },
                    file,
                ))
            }
        }
    }

    pub fn path(&self) -> &Path {
        match &self.inner {
            Inner::Kept(path) => path,
            Inner::Temp(temp) => temp.path(),
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.inner, Inner::Temp(_))
    }

    /// Release the archive, deleting it if it was temporary.
    pub fn close(self) -> Result<(), ArchiveError> {
        match self.inner {
            Inner::Kept(_) => Ok(()),
            Inner::Temp(temp) => temp.close().map_err(ArchiveError::Cleanup),
        }
    }

    /// Delete an unusable archive, whatever its sink.
    fn discard(self) {
        let result = match self.inner {
            Inner::Kept(path) => std::fs::remove_file(&path),
            Inner::Temp(temp) => temp.close(),
        };
        if let Err(e) = result {
            tracing::warn!("{}", ArchiveError::Cleanup(e));
        }
    }
}

/// Everything that goes into one archive.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub descriptor: Descriptor,
    pub tree: PageTree,
    pub assets: Vec<Asset>,
    pub manifest: Manifest,
}

impl Bundle {
    /// Parse the descriptor at `descriptor_path` and resolve its pages and
    /// assets under `root`.
    pub fn load(
        descriptor_path: &Path,
        root: &Path,
        mime_types: &MimeAllowList,
    ) -> Result<Self, MultiError> {
        let descriptor = parse_descriptor(descriptor_path, root)?;
        Self::from_descriptor(descriptor, mime_types)
    }

    pub fn from_descriptor(
        descriptor: Descriptor,
        mime_types: &MimeAllowList,
    ) -> Result<Self, MultiError> {
        let mut errors = MultiError::new();
        let tree = build_tree(&descriptor)
            .map_err(|e| errors.merge(e))
            .ok();
        let assets = expand_assets(&descriptor, mime_types)
            .map_err(|e| errors.merge(e))
            .ok();
        let (Some(tree), Some(assets)) = (tree, assets) else {
            return Err(errors);
        };

        let manifest = Manifest::new(&descriptor, &tree, &assets);
        tracing::debug!(
            project_id = %descriptor.project.project_id,
            pages = tree.count(),
            assets = assets.len(),
            "resolved project"
        );
        Ok(Self {
            descriptor,
            tree,
            assets,
            manifest,
        })
    }

    /// Blobs in archive order: page bodies in pre-order, then assets.
    fn blobs(&self) -> Vec<(&str, &Path)> {
        self.tree
            .blobs()
            .map(|b| (b.hash, b.filepath))
            .chain(
                self.assets
                    .iter()
                    .map(|a| (a.hash.as_str(), a.filepath.as_path())),
            )
            .collect()
    }
}

/// Stream `bundle` into a ZIP at `sink`.
///
/// On error nothing is left behind: the archive is removed from either sink.
pub fn write_archive(
    bundle: &Bundle,
    sink: &ArchiveSink,
    progress: &dyn ProgressReporter,
) -> Result<ArchiveFile, MultiError> {
    let (archive, file) = ArchiveFile::create(sink).map_err(MultiError::from_error)?;
    let mut zip = ZipWriter::new(file);
    let mut errors = MultiError::new();
    let root = &bundle.descriptor.root;

    let blobs = add_blobs(&mut zip, root, bundle.blobs(), progress, &mut errors);
    if let Err(e) = add_metadata(&mut zip, &bundle.manifest) {
        errors.push_error(e);
    }
    let mut file = match zip.finish() {
        Ok(file) => file,
        Err(e) => {
            archive.discard();
            return Err(MultiError::from_error(ArchiveError::Zip(e)));
        }
    };
    let bytes = file
        .flush()
        .and_then(|_| file.metadata())
        .map(|m| m.len())
        .unwrap_or_default();

    if errors.has_error() {
        archive.discard();
        return Err(errors);
    }
    progress.report(ProgressEvent::Archived {
        blobs: blobs as u64,
        bytes,
    });
    tracing::info!(path = %archive.path().display(), bytes, "archive written");
    Ok(archive)
}

/// Copy every distinct blob into `zip` and return how many were stored.
///
/// A hash counts as stored only once its file has been copied.
fn add_blobs(
    zip: &mut ZipWriter<File>,
    root: &RootDir,
    blobs: Vec<(&str, &Path)>,
    progress: &dyn ProgressReporter,
    errors: &mut MultiError,
) -> usize {
    let total = blobs.len() as u64;
    let mut written = HashSet::new();
    for (i, (hash, filepath)) in blobs.into_iter().enumerate() {
        let shown = root
            .relative(filepath)
            .unwrap_or_else(|| filepath.display().to_string());
        progress.report(ProgressEvent::Archiving {
            n: i as u64 + 1,
            total,
            path: shown,
        });
        if written.contains(hash) {
            continue;
        }
        match add_file(zip, root, filepath, &format!("{}/{}", BLOBS_DIR, hash)) {
            Ok(()) => {
                written.insert(hash);
            }
            Err(e) => errors.push_error(e),
        }
    }
    written.len()
}

fn add_file(
    zip: &mut ZipWriter<File>,
    root: &RootDir,
    filepath: &Path,
    entry: &str,
) -> Result<(), ArchiveError> {
    let path = root.resolve(filepath)?;
    let mut source = File::open(&path).map_err(|source| ArchiveError::Open {
        path: path.clone(),
        source,
    })?;
    tracing::debug!(from = %path.display(), to = entry, "add file to archive");
    zip.start_file(entry, SimpleFileOptions::default())?;
    io::copy(&mut source, zip).map_err(ArchiveError::Write)?;
    Ok(())
}

fn add_metadata(zip: &mut ZipWriter<File>, manifest: &Manifest) -> Result<(), ArchiveError> {
    let json = manifest.to_json()?;
    tracing::debug!("add {} to archive", METADATA_ENTRY);
    zip.start_file(METADATA_ENTRY, SimpleFileOptions::default())?;
    zip.write_all(&json).map_err(ArchiveError::Write)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::testing::Recorder;
    use crate::progress::NoProgress;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    fn entries(path: &Path) -> Vec<String> {
        let file = File::open(path).unwrap();
        let archive = zip::ZipArchive::new(file).unwrap();
        archive.file_names().map(str::to_string).collect::<Vec<_>>()
    }

    fn project(tmp: &TempDir, descriptor: &str) -> Bundle {
        let path = tmp.path().join(".dodo.yaml");
        fs::write(&path, descriptor).unwrap();
        Bundle::load(&path, tmp.path(), &MimeAllowList::default()).unwrap()
    }

    #[test]
    fn duplicate_bodies_are_stored_once_and_metadata_is_last() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "same").unwrap();
        fs::write(tmp.path().join("b.md"), "same").unwrap();
        fs::write(tmp.path().join("logo.png"), "png").unwrap();
        let bundle = project(
            &tmp,
            "version: 1\nproject:\n  project_id: p\n  name: n\n  logo: logo.png\npages:\n  - markdown: a.md\n    title: A\n    path: a\n  - markdown: b.md\n    title: B\n    path: b\n",
        );
        let out = tmp.path().join("out.zip");
        let recorder = Recorder::default();
        let archive = write_archive(&bundle, &ArchiveSink::Path(out.clone()), &recorder).unwrap();
        assert!(!archive.is_temporary());

        let names = entries(&out);
        assert_eq!(names.len(), 3);
        assert_eq!(names.last().map(String::as_str), Some(METADATA_ENTRY));
        let blob_names: HashSet<_> = names.iter().filter(|n| n.starts_with("blobs/")).collect();
        let referenced: HashSet<_> = bundle
            .manifest
            .hashes()
            .into_iter()
            .map(|h| format!("blobs/{}", h))
            .collect();
        assert_eq!(blob_names, referenced.iter().collect());

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[3], ProgressEvent::Archived { blobs: 2, .. }));
    }

    #[test]
    fn metadata_json_round_trips() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("README.md"), "body").unwrap();
        let bundle = project(
            &tmp,
            "version: 1\nproject:\n  project_id: p\n  name: n\npages:\n  - markdown: README.md\n    title: T\n    path: t\n",
        );
        let out = tmp.path().join("out.zip");
        write_archive(&bundle, &ArchiveSink::Path(out.clone()), &NoProgress).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let mut json = String::new();
        archive
            .by_name(METADATA_ENTRY)
            .unwrap()
            .read_to_string(&mut json)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["page"]["children"][0]["language"]["en"]["link"], "t");
    }

    #[test]
    fn temporary_sink_is_removed_on_close() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("README.md"), "body").unwrap();
        let bundle = project(
            &tmp,
            "version: 1\nproject:\n  project_id: p\n  name: n\npages:\n  - markdown: README.md\n    title: T\n    path: t\n",
        );
        let archive = write_archive(&bundle, &ArchiveSink::Temp, &NoProgress).unwrap();
        let path = archive.path().to_path_buf();
        assert!(path.exists());
        archive.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn missing_files_are_all_reported() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "a").unwrap();
        fs::write(tmp.path().join("b.md"), "b").unwrap();
        let bundle = project(
            &tmp,
            "version: 1\nproject:\n  project_id: p\n  name: n\npages:\n  - markdown: a.md\n    title: A\n    path: a\n  - markdown: b.md\n    title: B\n    path: b\n",
        );
        fs::remove_file(tmp.path().join("a.md")).unwrap();
        fs::remove_file(tmp.path().join("b.md")).unwrap();
        let out = tmp.path().join("out.zip");
        let err = write_archive(&bundle, &ArchiveSink::Path(out.clone()), &NoProgress)
            .unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.iter().all(|d| d.message().starts_with("failed to open the file")));
        assert!(!out.exists());
    }

    #[test]
    fn failed_copy_does_not_hide_same_content() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "same").unwrap();
        fs::write(tmp.path().join("b.md"), "same").unwrap();
        let bundle = project(
            &tmp,
            "version: 1\nproject:\n  project_id: p\n  name: n\npages:\n  - markdown: a.md\n    title: A\n    path: a\n  - markdown: b.md\n    title: B\n    path: b\n",
        );
        fs::remove_file(tmp.path().join("a.md")).unwrap();

        let out = tmp.path().join("blobs.zip");
        let mut zip = ZipWriter::new(File::create(&out).unwrap());
        let mut errors = MultiError::new();
        let blobs = bundle.blobs();
        let hash = blobs[0].0.to_string();
        let stored = add_blobs(
            &mut zip,
            &bundle.descriptor.root,
            blobs,
            &NoProgress,
            &mut errors,
        );
        zip.finish().unwrap();

        assert_eq!(stored, 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(entries(&out), vec![format!("blobs/{}", hash)]);
    }
}
