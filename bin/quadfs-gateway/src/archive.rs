//! Archive aggregation
//!
//! The locally owned category is archived in-process; other categories are
//! delegated to their node and relayed like a download. Categories whose
//! route offers no archive are refused before any node is contacted.

use crate::Limits;
use crate::relay::{relay_sized, send_size, send_sized};
use quadfs_common::{FileCategory, Result, Route, RoutingTable};
use quadfs_proto::{ERROR_SENTINEL, Request};
use quadfs_storage::LocalStore;
use tokio::io::AsyncWrite;
use tracing::{error, info, warn};

/// Answer an archive request for the category named by `tag`.
///
/// Returns the number of payload bytes sent, or `Ok(None)` when the error
/// sentinel was sent instead.
pub async fn fetch_archive<C>(
    client: &mut C,
    routes: &RoutingTable,
    store: &LocalStore,
    tag: &str,
    limits: &Limits,
) -> Result<Option<u64>>
where
    C: AsyncWrite + Unpin,
{
    let category = FileCategory::from_tag(tag).filter(|c| routes.supports_archive(*c));
    let route = category.and_then(|c| routes.route(c).map(|route| (c, route)));
    let Some((category, route)) = route else {
        warn!("archive of {tag:?} is not offered");
        send_size(client, ERROR_SENTINEL, limits).await?;
        return Ok(None);
    };

    match route {
        Route::Local => {
            let built = store
                .archive(category)
                .await
                .and_then(|archive| archive.reader().map(|reader| (archive, reader)));
            let (archive, mut reader) = match built {
                Ok(built) => built,
                Err(e) => {
                    error!("local {tag} archive failed: {e}");
                    send_size(client, ERROR_SENTINEL, limits).await?;
                    return Ok(None);
                }
            };
            let sent = send_sized(client, &mut reader, archive.len(), limits).await?;
            info!("sent local {tag} archive ({sent} bytes)");
            Ok(Some(sent))
        }
        Route::Remote(target) => {
            let request = Request::ArchiveFetch {
                tag: category.tag().to_string(),
            };
            let sent = relay_sized(client, target, &request, limits).await?;
            if let Some(sent) = sent {
                info!("relayed {tag} archive from {target} ({sent} bytes)");
            }
            Ok(sent)
        }
    }
}
