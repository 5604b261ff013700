//! Size-prefixed payload streaming toward the client
//!
//! Used by downloads and archive fetches, both of which answer with a size
//! header followed by exactly that many bytes. Once the header has gone out
//! the framing is committed: a later failure can only be reported by
//! closing the client connection, which is what an `Err` from these
//! functions asks the caller to do.

use crate::Limits;
use crate::backend::BackendConnection;
use quadfs_common::{BackendTarget, Error, RelativePath, Result};
use quadfs_proto::{ERROR_SENTINEL, Request, copy_exact, deadline, write_size};
use quadfs_storage::LocalStore;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, warn};

/// Write a size header to the client
pub async fn send_size<C>(client: &mut C, size: i64, limits: &Limits) -> Result<()>
where
    C: AsyncWrite + Unpin,
{
    deadline(limits.timeouts.io, "write size", write_size(client, size)).await
}

/// Send `len` bytes from `reader` behind their size header
pub async fn send_sized<C, R>(client: &mut C, reader: &mut R, len: u64, limits: &Limits) -> Result<u64>
where
    C: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let size = i64::try_from(len)
        .map_err(|_| Error::protocol(format!("size {len} does not fit a header")))?;
    send_size(client, size, limits).await?;
    copy_exact(
        reader,
        client,
        len,
        limits.chunk_size,
        limits.timeouts.io,
    )
    .await
}

/// Serve a file from the local namespace.
///
/// Returns `Ok(None)` when the error sentinel was sent instead.
pub async fn send_local<C>(
    client: &mut C,
    store: &LocalStore,
    relative: &RelativePath,
    limits: &Limits,
) -> Result<Option<u64>>
where
    C: AsyncWrite + Unpin,
{
    match store.open(relative).await {
        Ok((mut file, len)) => send_sized(client, &mut file, len, limits).await.map(Some),
        Err(e) => {
            warn!("local download of {relative} refused: {e}");
            send_size(client, ERROR_SENTINEL, limits).await?;
            Ok(None)
        }
    }
}

/// Download `relative` from the node owning it
pub async fn relay_download<C>(
    client: &mut C,
    target: &BackendTarget,
    relative: &RelativePath,
    limits: &Limits,
) -> Result<Option<u64>>
where
    C: AsyncWrite + Unpin,
{
    let request = Request::Download {
        path: relative.to_string(),
    };
    relay_sized(client, target, &request, limits).await
}

/// Send `request` to `target` and relay its size-prefixed answer.
///
/// A negative size from the node is forwarded verbatim. A node that cannot
/// be reached, or fails before its header arrives, is reported to the
/// client as the error sentinel. Memory use is one chunk regardless of the
/// payload size.
pub async fn relay_sized<C>(
    client: &mut C,
    target: &BackendTarget,
    request: &Request,
    limits: &Limits,
) -> Result<Option<u64>>
where
    C: AsyncWrite + Unpin,
{
    let command = request.command();
    let header = async {
        let mut backend = BackendConnection::open(target, limits.timeouts, request).await?;
        let size = backend.read_size().await?;
        Ok::<_, Error>((backend, size))
    }
    .await;

    let (mut backend, size) = match header {
        Ok(header) => header,
        Err(e) => {
            error!("{command} via {target} failed: {e}");
            send_size(client, ERROR_SENTINEL, limits).await?;
            return Ok(None);
        }
    };

    let Ok(len) = u64::try_from(size) else {
        debug!("{command} refused by {target} (size {size})");
        send_size(client, size, limits).await?;
        return Ok(None);
    };

    send_size(client, size, limits).await?;
    let moved = copy_exact(
        backend.stream(),
        client,
        len,
        limits.chunk_size,
        limits.timeouts.io,
    )
    .await
    .map_err(|e| backend.transport(e))?;
    Ok(Some(moved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadfs_common::{FileCategory, Timeouts};
    use quadfs_proto::read_size;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use tokio::net::TcpListener;

    fn limits() -> Limits {
        Limits {
            chunk_size: 7,
            max_upload_size: 1 << 20,
            timeouts: Timeouts {
                connect: Duration::from_millis(500),
                io: Duration::from_millis(500),
            },
        }
    }

    fn target(addr: std::net::SocketAddr) -> BackendTarget {
        BackendTarget {
            category: FileCategory::Document,
            addr,
            archive: true,
        }
    }

    /// A node that answers one request with a fixed size header and body
    async fn scripted_node(size: i64, body: &'static [u8]) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = Request::read_from(&mut stream).await.unwrap();
            stream.write_i64(size).await.unwrap();
            stream.write_all(body).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_relay_streams_declared_bytes() {
        let body: &'static [u8] = b"0123456789abcdefghij";
        let addr = scripted_node(20, body).await;

        let (mut client, mut far) = duplex(1024);
        let rel = RelativePath::parse("docs/a.pdf").unwrap();
        let moved = relay_download(&mut client, &target(addr), &rel, &limits())
            .await
            .unwrap();
        assert_eq!(moved, Some(20));

        assert_eq!(read_size(&mut far).await.unwrap(), 20);
        let mut got = vec![0u8; 20];
        far.read_exact(&mut got).await.unwrap();
        assert_eq!(got, body);
    }

    #[tokio::test]
    async fn test_relay_forwards_refusal_verbatim() {
        let addr = scripted_node(-1, b"").await;
        let (mut client, mut far) = duplex(64);
        let rel = RelativePath::parse("missing.pdf").unwrap();
        let moved = relay_download(&mut client, &target(addr), &rel, &limits())
            .await
            .unwrap();
        assert_eq!(moved, None);
        assert_eq!(read_size(&mut far).await.unwrap(), ERROR_SENTINEL);
    }

    #[tokio::test]
    async fn test_relay_mid_stream_failure_is_short_transfer() {
        let addr = scripted_node(100, b"only a few bytes").await;
        let (mut client, mut far) = duplex(1024);
        let rel = RelativePath::parse("a.pdf").unwrap();
        let err = relay_download(&mut client, &target(addr), &rel, &limits())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ShortTransfer {
                expected: 100,
                actual: 16
            }
        ));
        // The header already went out; nothing else follows it
        assert_eq!(read_size(&mut far).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_unreachable_node_yields_sentinel() {
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let (mut client, mut far) = duplex(64);
        let rel = RelativePath::parse("a.pdf").unwrap();
        let moved = relay_download(&mut client, &target(addr), &rel, &limits())
            .await
            .unwrap();
        assert_eq!(moved, None);
        assert_eq!(read_size(&mut far).await.unwrap(), ERROR_SENTINEL);
    }

    #[tokio::test]
    async fn test_send_local() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("main.c"), b"int main(void);").unwrap();
        let store = LocalStore::new(dir.path());

        let (mut client, mut far) = duplex(1024);
        let rel = RelativePath::parse("main.c").unwrap();
        assert_eq!(
            send_local(&mut client, &store, &rel, &limits()).await.unwrap(),
            Some(15)
        );
        let rel = RelativePath::parse("gone.c").unwrap();
        assert_eq!(
            send_local(&mut client, &store, &rel, &limits()).await.unwrap(),
            None
        );

        assert_eq!(read_size(&mut far).await.unwrap(), 15);
        let mut got = vec![0u8; 15];
        far.read_exact(&mut got).await.unwrap();
        assert_eq!(got, b"int main(void);");
        assert_eq!(read_size(&mut far).await.unwrap(), ERROR_SENTINEL);
    }
}
