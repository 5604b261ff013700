//! Validated namespace-relative paths
//!
//! A [`RelativePath`] is the only form in which a path crosses from one
//! node's namespace into another's. It can only be built through
//! [`RelativePath::parse`], so holding one means the path cannot climb out
//! of whatever root it is later joined to.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Normalised path relative to a namespace root: no leading `/`, no `.` or
/// `..` segments, no empty segments. The empty path denotes the root itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RelativePath {
    segments: Vec<String>,
}

impl RelativePath {
    /// The namespace root
    #[must_use]
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse and normalise a relative path.
    ///
    /// `..` segments are resolved lexically; one that would climb above the
    /// root fails with [`Error::PathEscapesRoot`], as does an absolute path.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.starts_with('/') {
            return Err(Error::PathEscapesRoot(raw.to_string()));
        }
        if raw.contains('\0') {
            return Err(Error::invalid_request(format!("path contains NUL: {raw:?}")));
        }

        let mut segments: Vec<String> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(Error::PathEscapesRoot(raw.to_string()));
                    }
                }
                name => segments.push(name.to_string()),
            }
        }
        Ok(Self { segments })
    }

    /// Build from filesystem path components that are already known to lie
    /// under a root (e.g. the result of `strip_prefix`)
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = path
            .to_str()
            .ok_or_else(|| Error::invalid_request(format!("non UTF-8 path: {}", path.display())))?;
        Self::parse(raw)
    }

    /// Whether this denotes the root itself
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Join onto a filesystem root
    #[must_use]
    pub fn under(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.segments);
        path
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Check that `name` is a single, plain path component
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(Error::invalid_request(format!("invalid file name: {name:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalises() {
        let path = RelativePath::parse("docs/./2024//report.pdf").unwrap();
        assert_eq!(path.to_string(), "docs/2024/report.pdf");

        let path = RelativePath::parse("a/b/../c.txt").unwrap();
        assert_eq!(path.to_string(), "a/c.txt");

        assert!(RelativePath::parse("").unwrap().is_root());
        assert!(RelativePath::parse("./").unwrap().is_root());
    }

    #[test]
    fn test_parse_rejects_escape() {
        for raw in ["..", "../x.pdf", "a/../../x.pdf", "/etc/passwd"] {
            let err = RelativePath::parse(raw).unwrap_err();
            assert!(matches!(err, Error::PathEscapesRoot(_)), "{raw}");
        }
    }

    #[test]
    fn test_under_root() {
        let path = RelativePath::parse("a/b.txt").unwrap();
        assert_eq!(
            path.under(Path::new("/home/u/S3")),
            PathBuf::from("/home/u/S3/a/b.txt")
        );
        assert_eq!(
            RelativePath::root().under(Path::new("/home/u/S3")),
            PathBuf::from("/home/u/S3")
        );
    }
}
