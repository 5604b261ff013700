//! Field-level encoding
//!
//! All integers are big-endian. String fields carry an explicit `u16`
//! length and are rejected, never truncated, when they exceed their limit.

#![allow(clippy::cast_possible_truncation)]

use quadfs_common::{Error, Result, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest accepted filename
pub const MAX_FILENAME_LEN: usize = 255;
/// Longest accepted path
pub const MAX_PATH_LEN: usize = 4096;
/// Longest accepted category tag
pub const MAX_TAG_LEN: usize = 16;
/// Most filenames accepted in one listing response
pub const MAX_LISTING_ENTRIES: usize = 100_000;

/// Most filenames in a gateway's merged listing: one full section for each
/// of the four categories
pub const MAX_MERGED_LISTING_ENTRIES: usize = 4 * MAX_LISTING_ENTRIES;

/// Size/count value signalling failure
pub const ERROR_SENTINEL: i64 = -1;

/// Check a string against its field limit
pub fn check_len(field: &'static str, value: &str, max: usize) -> Result<()> {
    if value.len() > max {
        return Err(Error::FieldTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

/// Append a length-prefixed string to an encode buffer
pub fn put_string(
    buf: &mut impl bytes::BufMut,
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<()> {
    check_len(field, value, max)?;
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Write a length-prefixed string
pub async fn write_string<W: AsyncWrite + Unpin>(
    w: &mut W,
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<()> {
    let mut buf = Vec::with_capacity(2 + value.len());
    put_string(&mut buf, field, value, max)?;
    w.write_all(&buf).await?;
    Ok(())
}

/// Read a length-prefixed string, enforcing its limit before allocating
pub async fn read_string<R: AsyncRead + Unpin>(
    r: &mut R,
    field: &'static str,
    max: usize,
) -> Result<String> {
    let len = r.read_u16().await? as usize;
    if len > max {
        return Err(Error::FieldTooLong { field, len, max });
    }
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes).await?;
    String::from_utf8(bytes).map_err(|_| Error::protocol(format!("{field} is not valid UTF-8")))
}

/// Write a size header (negative = error)
pub async fn write_size<W: AsyncWrite + Unpin>(w: &mut W, size: i64) -> Result<()> {
    w.write_i64(size).await?;
    Ok(())
}

/// Read a size header
pub async fn read_size<R: AsyncRead + Unpin>(r: &mut R) -> Result<i64> {
    Ok(r.read_i64().await?)
}

/// Write a status code
pub async fn write_status<W: AsyncWrite + Unpin>(w: &mut W, status: StatusCode) -> Result<()> {
    w.write_i32(status.to_wire()).await?;
    Ok(())
}

/// Read a status code
pub async fn read_status<R: AsyncRead + Unpin>(r: &mut R) -> Result<StatusCode> {
    Ok(StatusCode::from_wire(r.read_i32().await?))
}

/// Write an entry count (negative = error)
pub async fn write_count<W: AsyncWrite + Unpin>(w: &mut W, count: i32) -> Result<()> {
    w.write_i32(count).await?;
    Ok(())
}

/// Read an entry count
pub async fn read_count<R: AsyncRead + Unpin>(r: &mut R) -> Result<i32> {
    Ok(r.read_i32().await?)
}

/// Write a complete listing response: count then each filename
pub async fn write_listing<W: AsyncWrite + Unpin>(w: &mut W, names: &[String]) -> Result<()> {
    write_listing_up_to(w, names, MAX_LISTING_ENTRIES).await
}

/// [`write_listing`] with an explicit entry limit
pub async fn write_listing_up_to<W: AsyncWrite + Unpin>(
    w: &mut W,
    names: &[String],
    max: usize,
) -> Result<()> {
    if names.len() > max {
        return Err(Error::protocol(format!(
            "listing of {} entries exceeds limit {max}",
            names.len()
        )));
    }
    let mut buf = Vec::with_capacity(4 + names.iter().map(|n| 2 + n.len()).sum::<usize>());
    bytes::BufMut::put_i32(&mut buf, names.len() as i32);
    for name in names {
        put_string(&mut buf, "filename", name, MAX_FILENAME_LEN)?;
    }
    w.write_all(&buf).await?;
    w.flush().await?;
    Ok(())
}

/// Read a listing response. `None` means the peer sent the error sentinel.
pub async fn read_listing<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<Vec<String>>> {
    read_listing_up_to(r, MAX_LISTING_ENTRIES).await
}

/// [`read_listing`] with an explicit entry limit
pub async fn read_listing_up_to<R: AsyncRead + Unpin>(
    r: &mut R,
    max: usize,
) -> Result<Option<Vec<String>>> {
    let count = read_count(r).await?;
    if count < 0 {
        return Ok(None);
    }
    let count = count as usize;
    if count > max {
        return Err(Error::protocol(format!(
            "listing of {count} entries exceeds limit {max}"
        )));
    }
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        names.push(read_string(r, "filename", MAX_FILENAME_LEN).await?);
    }
    Ok(Some(names))
}
