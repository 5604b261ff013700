//! Gateway client

use quadfs_common::config::DEFAULT_CHUNK_SIZE;
use quadfs_common::{Error, FileCategory, Result, StatusCode, Timeouts};
use quadfs_proto::{
    MAX_MERGED_LISTING_ENTRIES, Request, copy_exact, deadline, read_listing_up_to, read_size,
    read_status,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, sink};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Local file name for a downloaded archive of `category`
#[must_use]
pub const fn archive_file_name(category: FileCategory) -> &'static str {
    match category {
        FileCategory::Source => "cfiles.tar",
        FileCategory::Document => "pdf.tar",
        FileCategory::Text => "text.tar",
        FileCategory::Archive => "zip.tar",
    }
}

/// Client for one gateway
#[derive(Clone, Debug)]
pub struct GatewayClient {
    addr: SocketAddr,
    timeouts: Timeouts,
    chunk_size: usize,
}

impl GatewayClient {
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeouts: Timeouts::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    async fn connect(&self) -> Result<TcpStream> {
        let stream = tokio::time::timeout(self.timeouts.connect, TcpStream::connect(self.addr))
            .await
            .map_err(|_| Error::timeout(format!("connect to {}", self.addr)))?
            .map_err(|e| Error::transport(self.addr, e))?;
        Ok(stream)
    }

    async fn send(&self, request: &Request) -> Result<TcpStream> {
        let mut stream = self.connect().await?;
        deadline(self.timeouts.io, "send request", request.write_to(&mut stream)).await?;
        Ok(stream)
    }

    /// Upload a local file into the gateway directory `dest`
    pub async fn upload_file(&self, local: &Path, dest: &str) -> Result<u64> {
        let filename = local
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::invalid_request(format!("bad file name: {}", local.display())))?;
        let mut file = File::open(local)
            .await
            .map_err(|e| Error::from_io(e, local.display().to_string()))?;
        let size = file.metadata().await?.len();
        self.upload(filename, dest, size, &mut file).await?;
        Ok(size)
    }

    /// Upload `size` bytes from `reader` as `dest/filename`.
    ///
    /// Returns once the gateway has handled the payload and closed the
    /// connection.
    pub async fn upload<R>(&self, filename: &str, dest: &str, size: u64, reader: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let request = Request::Upload {
            filename: filename.to_string(),
            dest: dest.to_string(),
            size,
        };
        let mut stream = self.send(&request).await?;
        copy_exact(reader, &mut stream, size, self.chunk_size, self.timeouts.io).await?;

        // Uploads are not acknowledged; the gateway closing after our
        // shutdown means it has finished with the payload
        deadline(self.timeouts.io, "await close", async {
            stream.shutdown().await?;
            tokio::io::copy(&mut stream, &mut sink()).await?;
            Ok::<(), Error>(())
        })
        .await?;
        info!("uploaded {filename} ({size} bytes) to {dest}");
        Ok(())
    }

    /// Download `path` into `writer`, returning the number of bytes.
    ///
    /// Fails with [`Error::NotFound`] when the gateway answers with the
    /// error sentinel and [`Error::ShortTransfer`] when the stream ends
    /// early.
    pub async fn download<W>(&self, path: &str, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let request = Request::Download {
            path: path.to_string(),
        };
        self.fetch_sized(&request, path, writer).await
    }

    /// Download `path` into `dir`, keeping its file name.
    ///
    /// Nothing is left behind in `dir` if the transfer is incomplete.
    pub async fn download_to(&self, path: &str, dir: &Path) -> Result<PathBuf> {
        let name = path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::invalid_request(format!("no file name in {path}")))?;
        let target = dir.join(name);
        self.fetch_to(&Request::Download { path: path.to_string() }, path, target)
            .await
    }

    /// Remove `path`, returning the gateway's verdict
    pub async fn remove(&self, path: &str) -> Result<StatusCode> {
        let request = Request::Remove {
            path: path.to_string(),
        };
        let mut stream = self.send(&request).await?;
        deadline(self.timeouts.io, "read status", read_status(&mut stream)).await
    }

    /// Fetch the archive of the category named by `tag` into `writer`
    pub async fn archive<W>(&self, tag: &str, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let request = Request::ArchiveFetch {
            tag: tag.to_string(),
        };
        self.fetch_sized(&request, tag, writer).await
    }

    /// Fetch the archive of `category` into `dir` under its conventional name
    pub async fn archive_to(&self, category: FileCategory, dir: &Path) -> Result<PathBuf> {
        let request = Request::ArchiveFetch {
            tag: category.tag().to_string(),
        };
        let target = dir.join(archive_file_name(category));
        self.fetch_to(&request, category.tag(), target).await
    }

    /// Names of the files in the gateway directory `dir`, in category order
    pub async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let request = Request::ListFiles {
            dir: dir.to_string(),
        };
        let mut stream = self.send(&request).await?;
        let names = read_listing_up_to(&mut stream, MAX_MERGED_LISTING_ENTRIES);
        deadline(self.timeouts.io, "read listing", names)
            .await?
            .ok_or_else(|| Error::NotFound(format!("directory {dir}")))
    }

    async fn fetch_sized<W>(&self, request: &Request, what: &str, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = self.send(request).await?;
        let size = deadline(self.timeouts.io, "read size", read_size(&mut stream)).await?;
        let len = u64::try_from(size).map_err(|_| Error::NotFound(what.to_string()))?;
        debug!("{} {what}: {len} bytes", request.command());
        copy_exact(&mut stream, writer, len, self.chunk_size, self.timeouts.io).await
    }

    /// Fetch into a temporary file next to `target`, renamed into place only
    /// when complete
    async fn fetch_to(&self, request: &Request, what: &str, target: PathBuf) -> Result<PathBuf> {
        let dir = target
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let tmp = tempfile::Builder::new()
            .prefix(".quadfs-")
            .suffix(".part")
            .tempfile_in(&dir)?;
        let mut file = File::from_std(tmp.as_file().try_clone()?);

        let len = self.fetch_sized(request, what, &mut file).await?;
        file.sync_all().await?;
        drop(file);
        tmp.persist(&target)
            .map_err(|e| Error::from_io(e.error, target.display().to_string()))?;
        info!("saved {} ({len} bytes)", target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// A gateway stand-in answering one request with raw bytes
    async fn scripted_gateway(reply: Vec<u8>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = Request::read_from(&mut stream).await.unwrap();
            stream.write_all(&reply).await.unwrap();
        });
        addr
    }

    fn client(addr: SocketAddr) -> GatewayClient {
        GatewayClient::new(addr).with_timeouts(Timeouts {
            connect: Duration::from_millis(500),
            io: Duration::from_millis(500),
        })
    }

    #[tokio::test]
    async fn test_sentinel_is_not_found() {
        let addr = scripted_gateway((-1i64).to_be_bytes().to_vec()).await;
        let mut sink = Vec::new();
        let err = client(addr).download("~S1/a.pdf", &mut sink).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_short_download_leaves_no_file() {
        let mut reply = 50i64.to_be_bytes().to_vec();
        reply.extend_from_slice(b"not fifty bytes");
        let addr = scripted_gateway(reply).await;

        let dir = tempfile::tempdir().unwrap();
        let err = client(addr)
            .download_to("~S1/docs/a.pdf", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ShortTransfer {
                expected: 50,
                actual: 15
            }
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_to_keeps_file_name() {
        let mut reply = 4i64.to_be_bytes().to_vec();
        reply.extend_from_slice(b"%PDF");
        let addr = scripted_gateway(reply).await;

        let dir = tempfile::tempdir().unwrap();
        let saved = client(addr)
            .download_to("~S1/docs/a.pdf", dir.path())
            .await
            .unwrap();
        assert_eq!(saved, dir.path().join("a.pdf"));
        let mut data = Vec::new();
        File::open(&saved).await.unwrap().read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"%PDF");
    }

    #[tokio::test]
    async fn test_remove_status() {
        let addr = scripted_gateway(2i32.to_be_bytes().to_vec()).await;
        assert_eq!(client(addr).remove("~S1/a.c").await.unwrap(), StatusCode::Denied);
    }

    #[test]
    fn test_archive_file_names() {
        assert_eq!(archive_file_name(FileCategory::Source), "cfiles.tar");
        assert_eq!(archive_file_name(FileCategory::Document), "pdf.tar");
        assert_eq!(archive_file_name(FileCategory::Text), "text.tar");
    }
}
