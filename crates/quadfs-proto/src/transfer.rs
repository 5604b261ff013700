//! Bounded streaming between two connections

#![allow(clippy::cast_possible_truncation)]

use quadfs_common::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Run `fut` with a deadline, mapping expiry to [`Error::Timeout`]
pub async fn deadline<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::timeout(operation))?
}

/// Move exactly `len` bytes from `reader` to `writer` through a buffer of at
/// most `chunk_size` bytes.
///
/// Every read and write is bounded by `io_timeout`. If either side fails or
/// the reader ends early, the error is [`Error::ShortTransfer`] carrying the
/// number of bytes actually delivered to the writer.
pub async fn copy_exact<R, W>(
    reader: &mut R,
    writer: &mut W,
    len: u64,
    chunk_size: usize,
    io_timeout: Duration,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let buf_len = chunk_size.clamp(1, usize::try_from(len).unwrap_or(usize::MAX).max(1));
    let mut buf = vec![0u8; buf_len];
    let mut moved = 0u64;
    let short = |actual| Error::ShortTransfer {
        expected: len,
        actual,
    };

    while moved < len {
        let want = (len - moved).min(buf.len() as u64) as usize;
        let n = match tokio::time::timeout(io_timeout, reader.read(&mut buf[..want])).await {
            Ok(Ok(0)) => {
                debug!("source closed after {moved} of {len} bytes");
                return Err(short(moved));
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!("source read failed after {moved} of {len} bytes: {e}");
                return Err(short(moved));
            }
            Err(_) => {
                debug!("source read timed out after {moved} of {len} bytes");
                return Err(short(moved));
            }
        };

        match tokio::time::timeout(io_timeout, writer.write_all(&buf[..n])).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("sink write failed after {moved} of {len} bytes: {e}");
                return Err(short(moved));
            }
            Err(_) => {
                debug!("sink write timed out after {moved} of {len} bytes");
                return Err(short(moved));
            }
        }
        moved += n as u64;
    }

    deadline(io_timeout, "flush", async { writer.flush().await.map_err(Error::from) }).await?;
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_copy_exact_stops_at_declared_length() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let (mut src_w, mut src_r) = duplex(64 * 1024);
        src_w.write_all(&data).await.unwrap();
        // Trailing bytes belong to the next frame and must not be consumed
        src_w.write_all(b"NEXT").await.unwrap();

        let mut sink = Vec::new();
        let moved = copy_exact(&mut src_r, &mut sink, 10_000, 4096, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(moved, 10_000);
        assert_eq!(sink, data);

        let mut rest = [0u8; 4];
        src_r.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"NEXT");
    }

    #[tokio::test]
    async fn test_copy_exact_reports_short_transfer() {
        let (mut src_w, mut src_r) = duplex(1024);
        src_w.write_all(&[7u8; 300]).await.unwrap();
        drop(src_w);

        let mut sink = Vec::new();
        let err = copy_exact(&mut src_r, &mut sink, 1000, 128, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ShortTransfer {
                expected: 1000,
                actual: 300
            }
        ));
        assert_eq!(sink.len(), 300);
    }

    #[tokio::test]
    async fn test_copy_exact_zero_length() {
        let (_src_w, mut src_r) = duplex(16);
        let mut sink = Vec::new();
        let moved = copy_exact(&mut src_r, &mut sink, 0, 4096, TIMEOUT).await.unwrap();
        assert_eq!(moved, 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_copy_exact_times_out_on_stalled_source() {
        let (_src_w, mut src_r) = duplex(16);
        let mut sink = Vec::new();
        let err = copy_exact(&mut src_r, &mut sink, 10, 4, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ShortTransfer { actual: 0, .. }));
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let err = deadline(Duration::from_millis(10), "stall", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { ref operation } if operation == "stall"));
    }
}
