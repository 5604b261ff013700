//! Remove coordination

use crate::backend::BackendConnection;
use quadfs_common::{BackendTarget, RelativePath, Result, StatusCode, Timeouts};
use quadfs_proto::Request;
use quadfs_storage::LocalStore;
use tracing::info;

/// Remove a file from the local namespace
pub async fn remove_local(store: &LocalStore, relative: &RelativePath) -> Result<StatusCode> {
    store.remove(relative).await?;
    Ok(StatusCode::Success)
}

/// Ask the owning node to remove a file and return its verdict verbatim.
///
/// Failing to reach the node is an `Err`, distinct from the node answering
/// with a refusal.
pub async fn remove_remote(
    target: &BackendTarget,
    relative: &RelativePath,
    timeouts: Timeouts,
) -> Result<StatusCode> {
    let request = Request::Remove {
        path: relative.to_string(),
    };
    let mut backend = BackendConnection::open(target, timeouts, &request).await?;
    let status = backend.read_status().await?;
    info!("{target} answered remove of {relative}: {status}");
    Ok(status)
}
