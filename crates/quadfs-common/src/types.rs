//! Core type definitions for QuadFS
//!
//! This module defines the file category model, the wire status codes and
//! the declarative routing table that maps each category to the node that
//! owns it.

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

/// Storage class of a file, derived from its extension.
///
/// Variant order is the order categories appear in merged listings.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    /// `.c` files, stored on the gateway itself
    Source,
    /// `.pdf` files
    Document,
    /// `.txt` files
    Text,
    /// `.zip` files
    Archive,
}

impl FileCategory {
    /// All categories in listing order
    pub const ALL: [Self; 4] = [Self::Source, Self::Document, Self::Text, Self::Archive];

    /// Extension without the leading dot
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Source => "c",
            Self::Document => "pdf",
            Self::Text => "txt",
            Self::Archive => "zip",
        }
    }

    /// Category tag as sent by clients for archive requests (e.g. `.pdf`)
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Source => ".c",
            Self::Document => ".pdf",
            Self::Text => ".txt",
            Self::Archive => ".zip",
        }
    }

    /// Look up a category by bare extension
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.extension() == ext)
    }

    /// Look up a category by its dotted tag
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tag() == tag)
    }

    /// Derive the category of a path from the extension of its final component
    #[must_use]
    pub fn of_path(path: &str) -> Option<Self> {
        let name = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Check whether a filename belongs to this category
    #[must_use]
    pub fn matches(self, name: &str) -> bool {
        Self::of_path(name) == Some(self)
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source => "source",
            Self::Document => "document",
            Self::Text => "text",
            Self::Archive => "archive",
        };
        f.write_str(name)
    }
}

/// Result of a destructive or lookup operation as seen on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum StatusCode {
    Success = 0,
    NotFound = 1,
    Denied = 2,
}

impl StatusCode {
    /// Decode a wire value. Unknown values are treated as `Denied`.
    #[must_use]
    pub const fn from_wire(value: i32) -> Self {
        match value {
            0 => Self::Success,
            1 => Self::NotFound,
            _ => Self::Denied,
        }
    }

    /// Encode for the wire
    #[must_use]
    pub const fn to_wire(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::NotFound => f.write_str("not found"),
            Self::Denied => f.write_str("denied"),
        }
    }
}

/// A storage node that owns one remote category
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendTarget {
    pub category: FileCategory,
    pub addr: SocketAddr,
    /// Whether the node can produce an archive of its category
    pub archive: bool,
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.category, self.addr)
    }
}

/// Where operations on a category are carried out
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Handled in-process against the local namespace
    Local,
    /// Delegated to a storage node
    Remote(BackendTarget),
}

/// Declarative category → route table, built once at startup
#[derive(Clone, Debug)]
pub struct RoutingTable {
    local: FileCategory,
    routes: BTreeMap<FileCategory, Route>,
}

impl RoutingTable {
    /// Build the table from the locally owned category and the configured backends
    pub fn new(local: FileCategory, backends: &[BackendConfig]) -> Result<Self> {
        let mut routes = BTreeMap::new();
        routes.insert(local, Route::Local);

        for backend in backends {
            if backend.category == local {
                return Err(Error::Configuration(format!(
                    "category {} is served locally and cannot have a backend",
                    backend.category
                )));
            }
            let target = BackendTarget {
                category: backend.category,
                addr: backend.address,
                archive: backend.archive,
            };
            if routes.insert(backend.category, Route::Remote(target)).is_some() {
                return Err(Error::Configuration(format!(
                    "duplicate backend for category {}",
                    backend.category
                )));
            }
        }

        Ok(Self { local, routes })
    }

    /// Category served in-process
    #[must_use]
    pub const fn local_category(&self) -> FileCategory {
        self.local
    }

    /// Route for a category, if any node owns it
    #[must_use]
    pub fn route(&self, category: FileCategory) -> Option<&Route> {
        self.routes.get(&category)
    }

    /// Remote targets in listing order
    pub fn remotes(&self) -> impl Iterator<Item = &BackendTarget> {
        self.routes.values().filter_map(|route| match route {
            Route::Remote(target) => Some(target),
            Route::Local => None,
        })
    }

    /// Whether an archive of this category can be produced
    #[must_use]
    pub fn supports_archive(&self, category: FileCategory) -> bool {
        match self.routes.get(&category) {
            Some(Route::Local) => true,
            Some(Route::Remote(target)) => target.archive,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(category: FileCategory, port: u16, archive: bool) -> BackendConfig {
        BackendConfig {
            category,
            address: SocketAddr::from(([127, 0, 0, 1], port)),
            archive,
        }
    }

    #[test]
    fn test_category_of_path() {
        assert_eq!(FileCategory::of_path("~S1/a/b.c"), Some(FileCategory::Source));
        assert_eq!(FileCategory::of_path("x.pdf"), Some(FileCategory::Document));
        assert_eq!(FileCategory::of_path("/abs/notes.txt"), Some(FileCategory::Text));
        assert_eq!(FileCategory::of_path("bundle.tar.zip"), Some(FileCategory::Archive));
        assert_eq!(FileCategory::of_path("README"), None);
        assert_eq!(FileCategory::of_path("image.png"), None);
        assert_eq!(FileCategory::of_path("dir.c/file"), None);
        assert_eq!(FileCategory::of_path("upper.PDF"), None);
    }

    #[test]
    fn test_category_tags() {
        for category in FileCategory::ALL {
            assert_eq!(FileCategory::from_tag(category.tag()), Some(category));
            assert!(category.matches(&format!("file{}", category.tag())));
        }
        assert_eq!(FileCategory::from_tag("pdf"), None);
        assert_eq!(FileCategory::from_tag(".md"), None);
    }

    #[test]
    fn test_status_code_wire() {
        for code in [StatusCode::Success, StatusCode::NotFound, StatusCode::Denied] {
            assert_eq!(StatusCode::from_wire(code.to_wire()), code);
        }
        assert_eq!(StatusCode::from_wire(-1), StatusCode::Denied);
    }

    #[test]
    fn test_routing_table() {
        let table = RoutingTable::new(
            FileCategory::Source,
            &[
                backend(FileCategory::Archive, 3036, false),
                backend(FileCategory::Document, 3032, true),
                backend(FileCategory::Text, 3034, true),
            ],
        )
        .unwrap();

        assert_eq!(table.route(FileCategory::Source), Some(&Route::Local));
        let order: Vec<_> = table.remotes().map(|t| t.category).collect();
        assert_eq!(
            order,
            vec![FileCategory::Document, FileCategory::Text, FileCategory::Archive]
        );
        assert!(table.supports_archive(FileCategory::Source));
        assert!(table.supports_archive(FileCategory::Document));
        assert!(!table.supports_archive(FileCategory::Archive));
    }

    #[test]
    fn test_routing_table_rejects_duplicates() {
        let err = RoutingTable::new(
            FileCategory::Source,
            &[
                backend(FileCategory::Text, 3034, true),
                backend(FileCategory::Text, 3035, true),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = RoutingTable::new(
            FileCategory::Source,
            &[backend(FileCategory::Source, 3031, true)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
