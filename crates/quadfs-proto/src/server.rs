//! Connection supervisor shared by the gateway and the storage nodes

use quadfs_common::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// How long open sessions get to finish once shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Serves one accepted connection to completion
pub trait ConnectionHandler: Send + Sync + 'static {
    fn handle(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Accept connections until `shutdown` resolves, one task per connection.
///
/// Session tasks are tracked in a [`JoinSet`]: finished ones are reaped as
/// the loop runs and panics are logged. On shutdown the listener is closed
/// first, then open sessions are given a grace period before being aborted.
pub async fn serve<H, S>(listener: TcpListener, handler: Arc<H>, shutdown: S) -> Result<()>
where
    H: ConnectionHandler,
    S: Future<Output = ()>,
{
    let local = listener.local_addr()?;
    info!("Listening on {local}");

    let mut sessions = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutting down listener on {local}");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let handler = Arc::clone(&handler);
                    sessions.spawn(async move {
                        debug!("client {peer} connected");
                        if let Err(e) = handler.handle(stream, peer).await {
                            warn!("client {peer} error: {e}");
                        }
                        debug!("client {peer} disconnected");
                    });
                }
                Err(e) => {
                    error!("accept error: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            },
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => reap(joined),
        }
    }

    drop(listener);
    if !sessions.is_empty() {
        info!("Waiting for {} open sessions", sessions.len());
    }
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while let Some(joined) = sessions.join_next().await {
            reap(joined);
        }
    })
    .await;
    if drained.is_err() {
        warn!("Aborting {} sessions still open after shutdown", sessions.len());
        sessions.shutdown().await;
    }
    Ok(())
}

fn reap(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("session task panicked: {e}");
        }
    }
}
