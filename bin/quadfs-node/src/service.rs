//! Storage node request handling
//!
//! A node owns the private namespace of exactly one category and answers a
//! single request per connection. Every path it receives is relative to its
//! root and goes through [`RelativePath`] validation before touching disk.

use quadfs_common::{Error, FileCategory, NodeConfig, RelativePath, Result, StatusCode};
use quadfs_proto::{
    ConnectionHandler, ERROR_SENTINEL, MAX_LISTING_ENTRIES, Request, copy_exact, deadline,
    write_count, write_listing, write_size, write_status,
};
use quadfs_storage::LocalStore;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Serves the five commands for one category
pub struct NodeService {
    store: LocalStore,
    category: FileCategory,
    archive: bool,
    chunk_size: usize,
    max_upload_size: u64,
    io_timeout: Duration,
}

impl NodeService {
    #[must_use]
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            store: LocalStore::new(&config.root),
            category: config.category,
            archive: config.archive,
            chunk_size: config.chunk_size,
            max_upload_size: config.max_upload_size,
            io_timeout: config.io_timeout(),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Serve the single request carried by `stream`.
    ///
    /// A peer that closes without sending anything is not an error.
    pub async fn handle_stream<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(request) =
            deadline(self.io_timeout, "read request", Request::read_from(stream)).await?
        else {
            return Ok(());
        };
        debug!("{} node: {request:?}", self.category);

        match request {
            Request::Upload {
                filename,
                dest,
                size,
            } => self.upload(stream, &filename, &dest, size).await,
            Request::Download { path } => self.download(stream, &path).await,
            Request::Remove { path } => self.remove(stream, &path).await,
            Request::ArchiveFetch { tag } => self.archive(stream, &tag).await,
            Request::ListFiles { dir } => self.list(stream, &dir).await,
        }
    }

    /// Resolve a file path this node owns
    fn owned_file(&self, path: &str) -> Result<RelativePath> {
        let relative = RelativePath::parse(path)?;
        if !self.category.matches(path) {
            return Err(Error::NotFound(format!(
                "{path} is not a {} file",
                self.category
            )));
        }
        Ok(relative)
    }

    async fn upload<S>(&self, stream: &mut S, filename: &str, dest: &str, size: u64) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if !self.category.matches(filename) {
            return Err(Error::unsupported(filename));
        }
        if size > self.max_upload_size {
            return Err(Error::invalid_request(format!(
                "upload of {size} bytes exceeds limit {}",
                self.max_upload_size
            )));
        }
        let dir = RelativePath::parse(dest)?;

        let mut pending = self.store.begin_write(&dir, filename).await?;
        copy_exact(stream, pending.file(), size, self.chunk_size, self.io_timeout).await?;
        let stored = pending.commit().await?;
        info!("Stored {} ({size} bytes)", stored.display());
        Ok(())
    }

    async fn download<S>(&self, stream: &mut S, path: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let opened = match self.owned_file(path) {
            Ok(relative) => self.store.open(&relative).await,
            Err(e) => Err(e),
        };
        let (mut file, len) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Download of {path} refused: {e}");
                return self.send_size(stream, ERROR_SENTINEL).await;
            }
        };

        self.send_size(stream, wire_size(len)?).await?;
        copy_exact(&mut file, stream, len, self.chunk_size, self.io_timeout).await?;
        info!("Sent {path} ({len} bytes)");
        Ok(())
    }

    async fn remove<S>(&self, stream: &mut S, path: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let removed = match self.owned_file(path) {
            Ok(relative) => self.store.remove(&relative).await,
            Err(e) => Err(e),
        };
        let status = match removed {
            Ok(()) => StatusCode::Success,
            Err(e) => {
                warn!("Remove of {path} failed: {e}");
                e.status_code()
            }
        };
        deadline(self.io_timeout, "write status", write_status(stream, status)).await
    }

    async fn archive<S>(&self, stream: &mut S, tag: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if FileCategory::from_tag(tag) != Some(self.category) || !self.archive {
            warn!("Archive of {tag:?} not offered by the {} node", self.category);
            return self.send_size(stream, ERROR_SENTINEL).await;
        }

        let built = self
            .store
            .archive(self.category)
            .await
            .and_then(|archive| archive.reader().map(|reader| (archive, reader)));
        let (archive, mut reader) = match built {
            Ok(built) => built,
            Err(e) => {
                error!("Archive of {tag} failed: {e}");
                return self.send_size(stream, ERROR_SENTINEL).await;
            }
        };

        self.send_size(stream, wire_size(archive.len())?).await?;
        copy_exact(
            &mut reader,
            stream,
            archive.len(),
            self.chunk_size,
            self.io_timeout,
        )
        .await?;
        info!("Sent {tag} archive ({} bytes)", archive.len());
        Ok(())
    }

    async fn list<S>(&self, stream: &mut S, dir: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let listed = match RelativePath::parse(dir) {
            Ok(relative) => match self.store.list(&relative, self.category).await {
                Err(e) if e.is_not_found() => Ok(Vec::new()),
                other => other,
            },
            Err(e) => Err(e),
        };

        match listed {
            Ok(mut names) => {
                debug!("Listing {dir:?}: {} entries", names.len());
                if names.len() > MAX_LISTING_ENTRIES {
                    warn!("Listing {dir:?}: sending the first {MAX_LISTING_ENTRIES} entries");
                    names.truncate(MAX_LISTING_ENTRIES);
                }
                deadline(self.io_timeout, "write listing", write_listing(stream, &names)).await
            }
            Err(e) => {
                warn!("Listing of {dir:?} failed: {e}");
                deadline(self.io_timeout, "write count", write_count(stream, -1)).await
            }
        }
    }

    async fn send_size<S>(&self, stream: &mut S, size: i64) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        deadline(self.io_timeout, "write size", write_size(stream, size)).await
    }
}

fn wire_size(len: u64) -> Result<i64> {
    i64::try_from(len).map_err(|_| Error::protocol(format!("size {len} does not fit a header")))
}

impl ConnectionHandler for NodeService {
    async fn handle(&self, mut stream: TcpStream, _peer: SocketAddr) -> Result<()> {
        self.handle_stream(&mut stream).await
    }
}
