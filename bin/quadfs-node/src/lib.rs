//! QuadFS storage node
//!
//! Owns the private namespace of one remote category and serves the
//! gateway's delegated requests for it.

pub mod service;

pub use service::NodeService;

use quadfs_common::{NodeConfig, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Serve `config` on an already bound listener until `shutdown` resolves
pub async fn run<S>(config: &NodeConfig, listener: TcpListener, shutdown: S) -> Result<()>
where
    S: Future<Output = ()>,
{
    config.validate()?;
    let service = NodeService::new(config);
    service.store().ensure_root().await?;
    info!(
        "{} node serving {} (archive={})",
        config.category,
        config.root.display(),
        config.archive
    );
    quadfs_proto::serve(listener, Arc::new(service), shutdown).await
}
