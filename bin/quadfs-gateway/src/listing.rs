//! Directory listing fan-out
//!
//! A listing merges the local scan with the answer of every remote node.
//! Nodes are queried one after another; a node that fails contributes
//! nothing and the listing is still served with what the others returned.

use crate::backend;
use quadfs_common::{Error, FileCategory, RelativePath, Result, RoutingTable, Timeouts};
use quadfs_proto::MAX_LISTING_ENTRIES;
use quadfs_storage::LocalStore;
use tracing::{debug, warn};

/// Per-category filename sequences of one listing, in category order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListingAggregate {
    sections: Vec<(FileCategory, Vec<String>)>,
}

impl ListingAggregate {
    /// Add the names found for one category. Names of other categories are
    /// dropped, the rest sorted and cut to [`MAX_LISTING_ENTRIES`].
    fn insert(&mut self, category: FileCategory, mut names: Vec<String>) {
        names.retain(|name| category.matches(name));
        names.sort();
        if names.len() > MAX_LISTING_ENTRIES {
            warn!(
                "{category} listing has {} entries; sending the first {MAX_LISTING_ENTRIES}",
                names.len()
            );
            names.truncate(MAX_LISTING_ENTRIES);
        }
        self.sections.push((category, names));
        self.sections.sort_by_key(|(category, _)| *category);
    }

    /// Total number of names
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.iter().map(|(_, names)| names.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names in transmission order
    #[must_use]
    pub fn into_names(self) -> Vec<String> {
        self.sections
            .into_iter()
            .flat_map(|(_, names)| names)
            .collect()
    }
}

/// Gather the listing of `dir` from the local namespace and every node.
///
/// Fails with [`Error::NotFound`] when `dir` does not exist locally, before
/// any node is contacted.
pub async fn aggregate(
    routes: &RoutingTable,
    store: &LocalStore,
    dir: &RelativePath,
    timeouts: Timeouts,
) -> Result<ListingAggregate> {
    if !store.dir_exists(dir).await {
        return Err(Error::NotFound(format!("directory {dir}")));
    }

    let mut listing = ListingAggregate::default();
    let local = routes.local_category();
    listing.insert(local, store.list(dir, local).await?);

    for target in routes.remotes() {
        match backend::list_dir(target, timeouts, dir).await {
            Ok(Some(names)) => {
                debug!("{target} listed {} entries in {dir}", names.len());
                listing.insert(target.category, names);
            }
            Ok(None) => warn!("{target} refused listing of {dir}; continuing without it"),
            Err(e) => warn!("{target} failed listing {dir}: {e}; continuing without it"),
        }
    }
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadfs_common::BackendConfig;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    fn timeouts() -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(300),
            io: Duration::from_millis(300),
        }
    }

    #[test]
    fn test_aggregate_order() {
        let mut listing = ListingAggregate::default();
        listing.insert(
            FileCategory::Text,
            vec!["b.txt".into(), "a.txt".into(), "sneaky.c".into()],
        );
        listing.insert(FileCategory::Source, vec!["z.c".into(), "m.c".into()]);
        assert_eq!(listing.len(), 4);
        assert_eq!(listing.into_names(), vec!["m.c", "z.c", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_oversized_sections_fit_one_response() {
        let many = |ext: &str| -> Vec<String> {
            (0..=MAX_LISTING_ENTRIES).map(|i| format!("{i:06}.{ext}")).collect()
        };
        let mut listing = ListingAggregate::default();
        for (category, ext) in [
            (FileCategory::Source, "c"),
            (FileCategory::Document, "pdf"),
            (FileCategory::Text, "txt"),
            (FileCategory::Archive, "zip"),
        ] {
            listing.insert(category, many(ext));
        }
        assert_eq!(listing.len(), quadfs_proto::MAX_MERGED_LISTING_ENTRIES);

        let names = listing.into_names();
        assert_eq!(names[0], "000000.c");
        assert_eq!(names[MAX_LISTING_ENTRIES - 1], "099999.c");
        assert_eq!(names[MAX_LISTING_ENTRIES], "000000.pdf");
    }

    #[tokio::test]
    async fn test_missing_dir_contacts_no_node() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backends = [BackendConfig {
            category: FileCategory::Document,
            address: listener.local_addr().unwrap(),
            archive: true,
        }];
        let routes = RoutingTable::new(FileCategory::Source, &backends).unwrap();
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let err = aggregate(&routes, &store, &RelativePath::parse("nope").unwrap(), timeouts())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let accepted =
            tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(accepted.is_err(), "a node was contacted");
    }

    #[tokio::test]
    async fn test_dead_nodes_give_partial_listing() {
        let dead = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let backends = [
            BackendConfig {
                category: FileCategory::Document,
                address: dead,
                archive: true,
            },
            BackendConfig {
                category: FileCategory::Text,
                address: dead,
                archive: true,
            },
        ];
        let routes = RoutingTable::new(FileCategory::Source, &backends).unwrap();
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.c"), b"").unwrap();
        std::fs::write(dir.path().join("a.c"), b"").unwrap();
        std::fs::write(dir.path().join("stray.pdf"), b"").unwrap();
        let store = LocalStore::new(dir.path());

        let listing = aggregate(&routes, &store, &RelativePath::root(), timeouts())
            .await
            .unwrap();
        assert_eq!(listing.into_names(), vec!["a.c", "b.c"]);
    }
}
