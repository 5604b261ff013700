//! File operations on a private namespace root

use crate::archive::{self, ArchiveFile};
use quadfs_common::path::validate_file_name;
use quadfs_common::{Error, FileCategory, RelativePath, Result};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, info};

/// Prefix of in-flight upload files
const PART_PREFIX: &str = ".quadfs-";

/// Storage rooted at one directory
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store over `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute location of a relative path
    #[must_use]
    pub fn locate(&self, path: &RelativePath) -> PathBuf {
        path.under(&self.root)
    }

    /// Create the root directory if missing
    pub async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Start writing `filename` inside `dir`, creating missing directories.
    ///
    /// Data goes to a temporary file next to the target and only replaces
    /// the target on [`PendingWrite::commit`]. Dropping the pending write
    /// discards the temporary file.
    pub async fn begin_write(&self, dir: &RelativePath, filename: &str) -> Result<PendingWrite> {
        validate_file_name(filename)?;
        let dir_path = self.locate(dir);
        fs::create_dir_all(&dir_path)
            .await
            .map_err(|e| Error::from_io(e, dir.to_string()))?;

        let tmp_dir = dir_path.clone();
        let tmp = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(PART_PREFIX)
                .suffix(".part")
                .tempfile_in(tmp_dir)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
        .map_err(|e| Error::from_io(e, dir.to_string()))?;

        let file = fs::File::from_std(tmp.as_file().try_clone()?);
        Ok(PendingWrite {
            tmp,
            file,
            target: dir_path.join(filename),
        })
    }

    /// Open a regular file for streaming, returning it with its length
    pub async fn open(&self, path: &RelativePath) -> Result<(fs::File, u64)> {
        let location = self.locate(path);
        let file = fs::File::open(&location)
            .await
            .map_err(|e| Error::from_io(e, path.to_string()))?;
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(Error::NotFound(format!("{path} is not a regular file")));
        }
        debug!("Opened {} ({} bytes)", location.display(), meta.len());
        Ok((file, meta.len()))
    }

    /// Remove a regular file
    pub async fn remove(&self, path: &RelativePath) -> Result<()> {
        let location = self.locate(path);
        let meta = fs::symlink_metadata(&location)
            .await
            .map_err(|e| Error::from_io(e, path.to_string()))?;
        if meta.is_dir() {
            return Err(Error::Denied(format!("{path} is a directory")));
        }
        fs::remove_file(&location).await.map_err(|e| match Error::from_io(e, path.to_string()) {
            Error::Io(e) => Error::Denied(format!("{path}: {e}")),
            other => other,
        })?;
        info!("Removed {}", location.display());
        Ok(())
    }

    /// Whether a directory exists
    pub async fn dir_exists(&self, dir: &RelativePath) -> bool {
        fs::metadata(self.locate(dir))
            .await
            .is_ok_and(|meta| meta.is_dir())
    }

    /// Names of the regular files of `category` directly inside `dir`, sorted
    pub async fn list(&self, dir: &RelativePath, category: FileCategory) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(self.locate(dir))
            .await
            .map_err(|e| Error::from_io(e, dir.to_string()))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if category.matches(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Snapshot every file of `category` into a temporary tar archive.
    ///
    /// Each call builds a fresh snapshot; in-flight uploads are not part of
    /// it.
    pub async fn archive(&self, category: FileCategory) -> Result<ArchiveFile> {
        self.ensure_root().await?;
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || archive::build(&root, category))
            .await
            .map_err(|e| Error::Archive(format!("archive task failed: {e}")))?
    }
}

/// An upload in progress
pub struct PendingWrite {
    tmp: NamedTempFile,
    file: fs::File,
    target: PathBuf,
}

impl PendingWrite {
    /// Destination for the payload
    pub fn file(&mut self) -> &mut fs::File {
        &mut self.file
    }

    /// Make the data durable and atomically move it into place
    pub async fn commit(mut self) -> Result<PathBuf> {
        use tokio::io::AsyncWriteExt;

        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);

        let target = self.target;
        let persisted = target.clone();
        tokio::task::spawn_blocking(move || self.tmp.persist(&persisted))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
            .map_err(|e| Error::from_io(e.error, target.display().to_string()))?;
        Ok(target)
    }
}
