//! Logical path resolution
//!
//! Clients name files by logical paths such as `~S1/docs/a.pdf`. Resolution
//! turns one into the file's category and its location relative to the
//! namespace root; the relative form is the only thing ever sent to a
//! storage node.

use quadfs_common::{Error, FileCategory, RelativePath, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A resolved file path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// Category derived from the file extension
    pub category: FileCategory,
    /// Location under the gateway's local root
    pub absolute: PathBuf,
    /// Location relative to any namespace root; what backends receive
    pub relative: RelativePath,
}

/// Maps logical paths onto the namespace. Pure: the same input always
/// yields the same output.
#[derive(Clone, Debug)]
pub struct Resolver {
    root: PathBuf,
    markers: Vec<String>,
}

impl Resolver {
    pub fn new(root: impl Into<PathBuf>, markers: &[String]) -> Self {
        let mut markers = markers.to_vec();
        // Longest first so that no marker shadows a longer one
        markers.sort_by_key(|m| std::cmp::Reverse(m.len()));
        Self {
            root: root.into(),
            markers,
        }
    }

    /// Resolve a file path. Paths without a recognised extension fail with
    /// [`Error::UnsupportedCategory`].
    pub fn resolve(&self, logical: &str) -> Result<Resolved> {
        let category = FileCategory::of_path(logical).ok_or_else(|| Error::unsupported(logical))?;
        let relative = self.resolve_dir(logical)?;
        let resolved = Resolved {
            category,
            absolute: relative.under(&self.root),
            relative,
        };
        debug!("resolved {logical:?} -> {} ({category})", resolved.relative);
        Ok(resolved)
    }

    /// Resolve a directory path; no category is required.
    ///
    /// In priority order: a leading root marker expands to the root, an
    /// absolute path must lie inside the root, anything else is taken
    /// relative to the root.
    pub fn resolve_dir(&self, logical: &str) -> Result<RelativePath> {
        if let Some(rest) = self.strip_marker(logical) {
            return RelativePath::parse(rest.trim_start_matches('/'));
        }

        let path = Path::new(logical);
        if path.is_absolute() {
            return self.backend_relative(path);
        }

        RelativePath::parse(logical)
    }

    /// Re-express an absolute path under the root relative to it
    pub fn backend_relative(&self, absolute: &Path) -> Result<RelativePath> {
        let inside = absolute
            .strip_prefix(&self.root)
            .map_err(|_| Error::PathEscapesRoot(absolute.display().to_string()))?;
        RelativePath::from_path(inside)
    }

    fn strip_marker<'a>(&self, logical: &'a str) -> Option<&'a str> {
        self.markers.iter().find_map(|marker| {
            let rest = logical.strip_prefix(marker.as_str())?;
            (rest.is_empty() || rest.starts_with('/')).then_some(rest)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> Resolver {
        Resolver::new(
            "/home/u/S1",
            &["~S1".to_string(), "~/S1".to_string()],
        )
    }

    #[test]
    fn test_resolve_every_category() {
        let resolver = resolver();
        let cases = [
            ("~S1/src/main.c", FileCategory::Source, "src/main.c"),
            ("~/S1/docs/a.pdf", FileCategory::Document, "docs/a.pdf"),
            ("notes/todo.txt", FileCategory::Text, "notes/todo.txt"),
            ("/home/u/S1/bundle.zip", FileCategory::Archive, "bundle.zip"),
        ];
        for (logical, category, relative) in cases {
            let resolved = resolver.resolve(logical).unwrap();
            assert_eq!(resolved.category, category, "{logical}");
            assert_eq!(resolved.relative.to_string(), relative, "{logical}");
            assert_eq!(resolved.absolute, Path::new("/home/u/S1").join(relative));
            // Pure function of its input
            assert_eq!(resolver.resolve(logical).unwrap(), resolved);
        }
    }

    #[test]
    fn test_unrecognised_extension() {
        let resolver = resolver();
        for logical in ["~S1/readme", "~S1/archive.tar", "~S1/Main.C", "~S1/dir.pdf/"] {
            let err = resolver.resolve(logical).unwrap_err();
            assert!(matches!(err, Error::UnsupportedCategory(_)), "{logical}");
        }
    }

    #[test]
    fn test_traversal_rejected() {
        let resolver = resolver();
        for logical in [
            "~S1/../../etc/passwd.txt",
            "../x.pdf",
            "/etc/passwd.txt",
            "/home/u/S1/../S2/x.pdf",
            "/home/u/S1x/a.c",
        ] {
            let err = resolver.resolve(logical).unwrap_err();
            assert!(matches!(err, Error::PathEscapesRoot(_)), "{logical}");
        }
    }

    #[test]
    fn test_marker_must_be_a_whole_component() {
        let resolver = resolver();
        let resolved = resolver.resolve("~S1x/a.c").unwrap();
        assert_eq!(resolved.relative.to_string(), "~S1x/a.c");
    }

    #[test]
    fn test_resolve_dir() {
        let resolver = resolver();
        assert!(resolver.resolve_dir("~S1").unwrap().is_root());
        assert!(resolver.resolve_dir("~/S1/").unwrap().is_root());
        assert!(resolver.resolve_dir("/home/u/S1").unwrap().is_root());
        assert_eq!(resolver.resolve_dir("~S1/a/b").unwrap().to_string(), "a/b");
        assert!(resolver.resolve_dir("~S1/..").is_err());
    }

    #[test]
    fn test_backend_relative_strips_root() {
        let resolver = resolver();
        let resolved = resolver.resolve("~S1/notes/n.txt").unwrap();
        assert_eq!(
            resolver.backend_relative(&resolved.absolute).unwrap(),
            resolved.relative
        );
        assert!(resolver.backend_relative(Path::new("/home/u/S2/n.txt")).is_err());
    }
}
