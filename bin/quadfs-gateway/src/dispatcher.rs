//! Per-connection command loop
//!
//! A session waits for a command, dispatches it either to the local
//! namespace or to the node owning the category, answers, and waits for the
//! next command. It closes when the client disconnects, on a framing error,
//! after a listing (listings are one-shot per connection), or when a relay
//! fails after its size header went out.

use crate::resolver::Resolver;
use crate::{Limits, archive, listing, relay, remove, upload};
use quadfs_common::path::validate_file_name;
use quadfs_common::{
    Error, FileCategory, GatewayConfig, RelativePath, Result, Route, RoutingTable, StatusCode,
};
use quadfs_proto::{
    ConnectionHandler, ERROR_SENTINEL, MAX_MERGED_LISTING_ENTRIES, Request, deadline, write_count,
    write_listing_up_to, write_status,
};
use quadfs_storage::LocalStore;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// What the session does after answering a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Next {
    AwaitCommand,
    Close,
}

/// Routes client commands; shared by every session
pub struct Dispatcher {
    resolver: Resolver,
    routes: RoutingTable,
    store: LocalStore,
    limits: Limits,
}

impl Dispatcher {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            resolver: Resolver::new(&config.root, &config.markers),
            routes: config.routing_table()?,
            store: LocalStore::new(&config.root),
            limits: Limits::from_config(config),
        })
    }

    #[must_use]
    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    #[must_use]
    pub const fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Run the command loop on one client connection until it closes
    pub async fn run_session<C>(&self, client: &mut C) -> Result<()>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            // Idle sessions may wait indefinitely; a started header may not
            let Some(command) = Request::read_tag(client).await? else {
                return Ok(());
            };
            let request = deadline(
                self.limits.timeouts.io,
                "read request",
                Request::read_body(client, command),
            )
            .await?;
            let command = request.command();
            debug!("dispatching {command}");
            if self.dispatch(client, request).await? == Next::Close {
                debug!("closing session after {command}");
                return Ok(());
            }
        }
    }

    async fn dispatch<C>(&self, client: &mut C, request: Request) -> Result<Next>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        match request {
            Request::Upload {
                filename,
                dest,
                size,
            } => self.upload(client, &filename, &dest, size).await?,
            Request::Download { path } => self.download(client, &path).await?,
            Request::Remove { path } => self.remove(client, &path).await?,
            Request::ArchiveFetch { tag } => {
                archive::fetch_archive(client, &self.routes, &self.store, &tag, &self.limits)
                    .await?;
            }
            Request::ListFiles { dir } => {
                self.list(client, &dir).await?;
                return Ok(Next::Close);
            }
        }
        Ok(Next::AwaitCommand)
    }

    async fn upload<C>(&self, client: &mut C, filename: &str, dest: &str, size: u64) -> Result<()>
    where
        C: AsyncRead + Unpin,
    {
        if size > self.limits.max_upload_size {
            return Err(Error::invalid_request(format!(
                "upload of {size} bytes exceeds limit {}",
                self.limits.max_upload_size
            )));
        }

        let (category, dir) = match self.place_upload(filename, dest) {
            Ok(placed) => placed,
            Err(e) => {
                warn!("UPLOAD {filename} -> {dest} rejected: {e}");
                return upload::discard(client, size, &self.limits).await;
            }
        };

        match self.routes.route(category) {
            Some(Route::Local) => {
                upload::store_local(client, &self.store, &dir, filename, size, &self.limits).await
            }
            Some(Route::Remote(target)) => {
                upload::forward(client, target, &dir, filename, size, &self.limits).await
            }
            None => {
                warn!("UPLOAD {filename}: no node owns {category} files");
                upload::discard(client, size, &self.limits).await
            }
        }
    }

    /// Category and destination directory of an upload
    fn place_upload(&self, filename: &str, dest: &str) -> Result<(FileCategory, RelativePath)> {
        validate_file_name(filename)?;
        let category = FileCategory::of_path(filename).ok_or_else(|| Error::unsupported(filename))?;
        let dir = self.resolver.resolve_dir(dest)?;
        Ok((category, dir))
    }

    async fn download<C>(&self, client: &mut C, path: &str) -> Result<()>
    where
        C: AsyncWrite + Unpin,
    {
        let resolved = match self.resolver.resolve(path) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("DOWNLOAD {path} rejected: {e}");
                return relay::send_size(client, ERROR_SENTINEL, &self.limits).await;
            }
        };

        let sent = match self.routes.route(resolved.category) {
            Some(Route::Local) => {
                relay::send_local(client, &self.store, &resolved.relative, &self.limits).await?
            }
            Some(Route::Remote(target)) => {
                relay::relay_download(client, target, &resolved.relative, &self.limits).await?
            }
            None => {
                warn!("DOWNLOAD {path}: no node owns {} files", resolved.category);
                relay::send_size(client, ERROR_SENTINEL, &self.limits).await?;
                None
            }
        };
        if let Some(sent) = sent {
            info!("DOWNLOAD {path}: sent {sent} bytes");
        }
        Ok(())
    }

    async fn remove<C>(&self, client: &mut C, path: &str) -> Result<()>
    where
        C: AsyncWrite + Unpin,
    {
        let outcome = match self.resolver.resolve(path) {
            Err(Error::UnsupportedCategory(_)) => Ok(StatusCode::NotFound),
            Err(e) => Err(e),
            Ok(resolved) => match self.routes.route(resolved.category) {
                Some(Route::Local) => remove::remove_local(&self.store, &resolved.relative).await,
                Some(Route::Remote(target)) => {
                    remove::remove_remote(target, &resolved.relative, self.limits.timeouts).await
                }
                None => Ok(StatusCode::NotFound),
            },
        };

        let status = outcome.unwrap_or_else(|e| {
            if e.is_transport() {
                error!("REMOVE {path}: backend unreachable: {e}");
            } else {
                warn!("REMOVE {path} failed: {e}");
            }
            e.status_code()
        });
        info!("REMOVE {path}: {status}");
        deadline(self.limits.timeouts.io, "write status", write_status(client, status)).await
    }

    async fn list<C>(&self, client: &mut C, dir: &str) -> Result<()>
    where
        C: AsyncWrite + Unpin,
    {
        let gathered = match self.resolver.resolve_dir(dir) {
            Ok(relative) => {
                listing::aggregate(&self.routes, &self.store, &relative, self.limits.timeouts).await
            }
            Err(e) => Err(e),
        };

        let io = self.limits.timeouts.io;
        match gathered {
            Ok(listing) => {
                info!("LISTFILES {dir}: {} entries", listing.len());
                let names = listing.into_names();
                let written = write_listing_up_to(client, &names, MAX_MERGED_LISTING_ENTRIES);
                deadline(io, "write listing", written).await
            }
            Err(e) => {
                warn!("LISTFILES {dir} failed: {e}");
                deadline(io, "write count", write_count(client, -1)).await
            }
        }
    }
}

impl ConnectionHandler for Dispatcher {
    async fn handle(&self, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
        info!("client {peer} connected");
        let outcome = self.run_session(&mut stream).await;
        info!("client {peer} disconnected");
        outcome
    }
}
