//! Tar snapshots of a namespace

use quadfs_common::{Error, FileCategory, Result};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;
use walkdir::WalkDir;

/// A finished archive in a temporary file.
///
/// The file is deleted when this value is dropped, whatever path the
/// caller leaves by.
pub struct ArchiveFile {
    tmp: NamedTempFile,
    len: u64,
}

impl ArchiveFile {
    /// Archive size in bytes
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether the archive has no content at all
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Location of the temporary file
    #[must_use]
    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    /// Open an independent read handle positioned at the start
    pub fn reader(&self) -> Result<tokio::fs::File> {
        Ok(tokio::fs::File::from_std(self.tmp.reopen()?))
    }
}

fn archive_err(e: impl std::fmt::Display) -> Error {
    Error::Archive(e.to_string())
}

/// Archive every file of `category` under `root`, at any depth, with paths
/// relative to the root.
///
/// Runs synchronously; call from a blocking context.
pub fn build(root: &Path, category: FileCategory) -> Result<ArchiveFile> {
    let mut tmp = tempfile::Builder::new()
        .prefix("quadfs-archive-")
        .suffix(".tar")
        .tempfile()
        .map_err(archive_err)?;

    let mut entries = 0usize;
    {
        let mut builder = tar::Builder::new(tmp.as_file_mut());
        builder.follow_symlinks(false);

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(archive_err)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !category.matches(name) {
                continue;
            }
            let relative = entry.path().strip_prefix(root).map_err(archive_err)?;
            builder
                .append_path_with_name(entry.path(), relative)
                .map_err(archive_err)?;
            entries += 1;
        }

        builder.finish().map_err(archive_err)?;
    }

    tmp.as_file().sync_all()?;
    let len = tmp.as_file().metadata()?.len();
    info!(
        "Built {} archive of {} ({entries} entries, {len} bytes)",
        category.tag(),
        root.display()
    );
    Ok(ArchiveFile { tmp, len })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::tempdir;

    fn entry_names(archive: &ArchiveFile) -> BTreeSet<String> {
        let file = fs::File::open(archive.path()).unwrap();
        tar::Archive::new(file)
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                e.path().unwrap().to_string_lossy().into_owned()
            })
            .collect()
    }

    fn populate(root: &Path) {
        fs::create_dir_all(root.join("deep/er")).unwrap();
        fs::write(root.join("top.pdf"), b"%PDF").unwrap();
        fs::write(root.join("deep/er/inner.pdf"), b"%PDF-2").unwrap();
        fs::write(root.join("deep/skip.txt"), b"text").unwrap();
    }

    #[test]
    fn test_archive_keeps_only_category() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let archive = build(dir.path(), FileCategory::Document).unwrap();
        assert_eq!(
            archive.len(),
            fs::metadata(archive.path()).unwrap().len()
        );
        let names = entry_names(&archive);
        assert_eq!(
            names,
            BTreeSet::from(["top.pdf".to_string(), "deep/er/inner.pdf".to_string()])
        );
    }

    #[test]
    fn test_archive_skips_upload_leftovers() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        fs::write(dir.path().join(".quadfs-abc.part"), b"half").unwrap();

        let names = entry_names(&build(dir.path(), FileCategory::Text).unwrap());
        assert_eq!(names, BTreeSet::from(["deep/skip.txt".to_string()]));
    }

    #[test]
    fn test_archive_removed_on_drop() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let archive = build(dir.path(), FileCategory::Document).unwrap();
        let path = archive.path().to_path_buf();
        assert!(path.exists());
        drop(archive);
        assert!(!path.exists());
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let dir = tempdir().unwrap();
        let archive = build(dir.path(), FileCategory::Text).unwrap();
        assert!(!archive.is_empty());
        assert!(entry_names(&archive).is_empty());
    }
}
