//! QuadFS Gateway
//!
//! The node every client talks to. It serves `.c` files from its own
//! namespace and delegates every other category to the storage node that
//! owns it, relaying payloads in bounded chunks and merging listings from
//! all nodes.

pub mod archive;
pub mod backend;
pub mod dispatcher;
pub mod listing;
pub mod relay;
pub mod remove;
pub mod resolver;
pub mod upload;

pub use dispatcher::Dispatcher;
pub use resolver::{Resolved, Resolver};

use quadfs_common::{GatewayConfig, Result, Timeouts};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Transfer limits applied to every session
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    /// Relay buffer size
    pub chunk_size: usize,
    /// Largest upload accepted from a client
    pub max_upload_size: u64,
    pub timeouts: Timeouts,
}

impl Limits {
    #[must_use]
    pub const fn from_config(config: &GatewayConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_upload_size: config.max_upload_size,
            timeouts: config.timeouts(),
        }
    }
}

/// Serve `config` on an already bound listener until `shutdown` resolves
pub async fn run<S>(config: &GatewayConfig, listener: TcpListener, shutdown: S) -> Result<()>
where
    S: Future<Output = ()>,
{
    let dispatcher = Dispatcher::new(config)?;
    dispatcher.store().ensure_root().await?;
    info!("Gateway serving {}", config.root.display());
    for target in dispatcher.routes().remotes() {
        info!("  {} files -> {}", target.category.tag(), target.addr);
    }
    quadfs_proto::serve(listener, Arc::new(dispatcher), shutdown).await
}
