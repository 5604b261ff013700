//! Upload forwarding
//!
//! Uploads carry no acknowledgment, so the only duty toward the client is to
//! consume exactly the declared payload. Whenever the payload can be
//! consumed the connection stays usable, even if the file could not be
//! stored; an `Err` means the client stream is out of sync and must close.

use crate::Limits;
use crate::backend::BackendConnection;
use quadfs_common::{BackendTarget, RelativePath, Result};
use quadfs_proto::{Request, copy_exact};
use quadfs_storage::LocalStore;
use tokio::io::{AsyncRead, sink};
use tracing::{error, info, warn};

/// Store the payload in the local namespace.
///
/// The payload goes to a temporary file next to the destination and is
/// renamed into place only once complete, so concurrent uploads to one path
/// leave exactly one of the payloads behind.
pub async fn store_local<C>(
    client: &mut C,
    store: &LocalStore,
    dir: &RelativePath,
    filename: &str,
    size: u64,
    limits: &Limits,
) -> Result<()>
where
    C: AsyncRead + Unpin,
{
    let mut pending = match store.begin_write(dir, filename).await {
        Ok(pending) => pending,
        Err(e) => {
            error!("cannot store {filename} in {dir}: {e}");
            discard(client, size, limits).await?;
            return Ok(());
        }
    };

    copy_exact(
        client,
        pending.file(),
        size,
        limits.chunk_size,
        limits.timeouts.io,
    )
    .await?;

    match pending.commit().await {
        Ok(stored) => info!("stored {} ({size} bytes)", stored.display()),
        Err(e) => error!("commit of {filename} in {dir} failed: {e}"),
    }
    Ok(())
}

/// Stream the payload to the node owning the file.
///
/// The node gets the upload header with the backend-relative destination,
/// then the payload chunk by chunk as it arrives from the client.
pub async fn forward<C>(
    client: &mut C,
    target: &BackendTarget,
    dir: &RelativePath,
    filename: &str,
    size: u64,
    limits: &Limits,
) -> Result<()>
where
    C: AsyncRead + Unpin,
{
    let request = Request::Upload {
        filename: filename.to_string(),
        dest: dir.to_string(),
        size,
    };
    let mut backend = match BackendConnection::open(target, limits.timeouts, &request).await {
        Ok(backend) => backend,
        Err(e) => {
            error!("upload of {filename} to {target} failed: {e}");
            discard(client, size, limits).await?;
            return Ok(());
        }
    };

    copy_exact(
        client,
        backend.stream(),
        size,
        limits.chunk_size,
        limits.timeouts.io,
    )
    .await
    .map_err(|e| backend.transport(e))?;

    // The node closes once the file is committed
    if let Err(e) = backend.finish().await {
        warn!("{target} did not confirm upload of {filename}: {e}");
    }
    info!("forwarded {filename} ({size} bytes) to {target} at {dir}");
    Ok(())
}

/// Consume and drop the payload so the next command can be read
pub async fn discard<C>(client: &mut C, size: u64, limits: &Limits) -> Result<()>
where
    C: AsyncRead + Unpin,
{
    copy_exact(
        client,
        &mut sink(),
        size,
        limits.chunk_size,
        limits.timeouts.io,
    )
    .await?;
    Ok(())
}
