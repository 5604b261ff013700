//! Connections to storage nodes
//!
//! One connection per operation, never pooled. Every step is bounded by the
//! configured timeouts, and I/O failures are re-labelled as transport
//! errors naming the node so that callers can tell an unreachable backend
//! from one that answered with a refusal.

use quadfs_common::{BackendTarget, Error, RelativePath, Result, StatusCode, Timeouts};
use quadfs_proto::{Request, deadline, read_listing, read_size, read_status};
use tokio::io::{AsyncWriteExt, sink};
use tokio::net::TcpStream;
use tracing::debug;

/// An open request/response exchange with one storage node
pub struct BackendConnection {
    stream: TcpStream,
    target: BackendTarget,
    timeouts: Timeouts,
}

impl BackendConnection {
    /// Connect to `target` within the connect timeout
    pub async fn connect(target: &BackendTarget, timeouts: Timeouts) -> Result<Self> {
        let stream = tokio::time::timeout(timeouts.connect, TcpStream::connect(target.addr))
            .await
            .map_err(|_| Error::timeout(format!("connect to {target}")))?
            .map_err(|e| Error::transport(target, e))?;
        debug!("connected to {target}");
        Ok(Self {
            stream,
            target: target.clone(),
            timeouts,
        })
    }

    /// Connect and send `request` in one step
    pub async fn open(target: &BackendTarget, timeouts: Timeouts, request: &Request) -> Result<Self> {
        let mut conn = Self::connect(target, timeouts).await?;
        conn.send(request).await?;
        Ok(conn)
    }

    /// Raw stream, for payload relaying
    pub fn stream(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub async fn send(&mut self, request: &Request) -> Result<()> {
        let sent = deadline(self.timeouts.io, "send request", request.write_to(&mut self.stream)).await;
        sent.map_err(|e| self.transport(e))
    }

    pub async fn read_size(&mut self) -> Result<i64> {
        let size = deadline(self.timeouts.io, "read size", read_size(&mut self.stream)).await;
        size.map_err(|e| self.transport(e))
    }

    pub async fn read_status(&mut self) -> Result<StatusCode> {
        let status = deadline(self.timeouts.io, "read status", read_status(&mut self.stream)).await;
        status.map_err(|e| self.transport(e))
    }

    pub async fn read_listing(&mut self) -> Result<Option<Vec<String>>> {
        let listing =
            deadline(self.timeouts.io, "read listing", read_listing(&mut self.stream)).await;
        listing.map_err(|e| self.transport(e))
    }

    /// Close our side and wait for the node to close its own, which it does
    /// once the request is fully handled.
    pub async fn finish(mut self) -> Result<()> {
        let closed = deadline(self.timeouts.io, "await backend close", async {
            self.stream.shutdown().await?;
            tokio::io::copy(&mut self.stream, &mut sink()).await?;
            Ok::<(), Error>(())
        })
        .await;
        closed.map_err(|e| self.transport(e))
    }

    /// Label a plain I/O failure with the node it happened on
    pub fn transport(&self, err: Error) -> Error {
        match err {
            Error::Io(e) => Error::transport(&self.target, e),
            other => other,
        }
    }
}

/// Ask one node for the files of its category in `dir`.
///
/// `Ok(None)` means the node answered with the error sentinel.
pub async fn list_dir(
    target: &BackendTarget,
    timeouts: Timeouts,
    dir: &RelativePath,
) -> Result<Option<Vec<String>>> {
    let request = Request::ListFiles {
        dir: dir.to_string(),
    };
    let mut conn = BackendConnection::open(target, timeouts, &request).await?;
    conn.read_listing().await
}
