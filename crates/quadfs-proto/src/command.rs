//! Command vocabulary and request framing

use crate::codec::{
    MAX_FILENAME_LEN, MAX_PATH_LEN, MAX_TAG_LEN, put_string, read_string,
};
use bytes::BufMut;
use quadfs_common::{Error, Result};
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Wire command tags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Upload = 1,
    Download = 2,
    Remove = 3,
    ArchiveFetch = 4,
    ListFiles = 5,
}

impl Command {
    /// Decode a command tag
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Upload),
            2 => Some(Self::Download),
            3 => Some(Self::Remove),
            4 => Some(Self::ArchiveFetch),
            5 => Some(Self::ListFiles),
            _ => None,
        }
    }

    /// Wire tag
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Upload => "UPLOAD",
            Self::Download => "DOWNLOAD",
            Self::Remove => "REMOVE",
            Self::ArchiveFetch => "TARFETCH",
            Self::ListFiles => "LISTFILES",
        };
        f.write_str(name)
    }
}

/// A parsed request header.
///
/// For `Upload` the payload of `size` bytes follows the header on the same
/// stream and is consumed by the handler, not by the codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Upload {
        filename: String,
        dest: String,
        size: u64,
    },
    Download {
        path: String,
    },
    Remove {
        path: String,
    },
    ArchiveFetch {
        tag: String,
    },
    ListFiles {
        dir: String,
    },
}

impl Request {
    /// Command this request carries
    #[must_use]
    pub const fn command(&self) -> Command {
        match self {
            Self::Upload { .. } => Command::Upload,
            Self::Download { .. } => Command::Download,
            Self::Remove { .. } => Command::Remove,
            Self::ArchiveFetch { .. } => Command::ArchiveFetch,
            Self::ListFiles { .. } => Command::ListFiles,
        }
    }

    /// Encode the request header into a single buffer
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);
        buf.put_u8(self.command().tag());
        match self {
            Self::Upload {
                filename,
                dest,
                size,
            } => {
                put_string(&mut buf, "filename", filename, MAX_FILENAME_LEN)?;
                put_string(&mut buf, "dest", dest, MAX_PATH_LEN)?;
                let size = i64::try_from(*size)
                    .map_err(|_| Error::invalid_request(format!("upload size {size} too large")))?;
                buf.put_i64(size);
            }
            Self::Download { path } | Self::Remove { path } => {
                put_string(&mut buf, "path", path, MAX_PATH_LEN)?;
            }
            Self::ArchiveFetch { tag } => put_string(&mut buf, "tag", tag, MAX_TAG_LEN)?,
            Self::ListFiles { dir } => put_string(&mut buf, "dir", dir, MAX_PATH_LEN)?,
        }
        Ok(buf)
    }

    /// Write the request header and flush
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, w: &mut W) -> Result<()> {
        let buf = self.encode()?;
        w.write_all(&buf).await?;
        w.flush().await?;
        Ok(())
    }

    /// Read the next request header.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly before
    /// sending a command tag.
    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<Self>> {
        let Some(command) = Self::read_tag(r).await? else {
            return Ok(None);
        };
        Self::read_body(r, command).await.map(Some)
    }

    /// Wait for the next command tag. `Ok(None)` on a clean EOF.
    pub async fn read_tag<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<Command>> {
        let tag = match r.read_u8().await {
            Ok(tag) => tag,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Command::from_tag(tag)
            .map(Some)
            .ok_or_else(|| Error::protocol(format!("unknown command tag {tag:#04x}")))
    }

    /// Read the fields that follow `command`'s tag
    pub async fn read_body<R: AsyncRead + Unpin>(r: &mut R, command: Command) -> Result<Self> {
        let request = match command {
            Command::Upload => {
                let filename = read_string(r, "filename", MAX_FILENAME_LEN).await?;
                let dest = read_string(r, "dest", MAX_PATH_LEN).await?;
                let size = r.read_i64().await?;
                let size = u64::try_from(size)
                    .map_err(|_| Error::invalid_request(format!("negative upload size {size}")))?;
                Self::Upload {
                    filename,
                    dest,
                    size,
                }
            }
            Command::Download => Self::Download {
                path: read_string(r, "path", MAX_PATH_LEN).await?,
            },
            Command::Remove => Self::Remove {
                path: read_string(r, "path", MAX_PATH_LEN).await?,
            },
            Command::ArchiveFetch => Self::ArchiveFetch {
                tag: read_string(r, "tag", MAX_TAG_LEN).await?,
            },
            Command::ListFiles => Self::ListFiles {
                dir: read_string(r, "dir", MAX_PATH_LEN).await?,
            },
        };
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_command_tags() {
        for tag in 1..=5u8 {
            let command = Command::from_tag(tag).unwrap();
            assert_eq!(command.tag(), tag);
        }
        assert_eq!(Command::from_tag(0), None);
        assert_eq!(Command::from_tag(6), None);
        assert_eq!(Command::ArchiveFetch.to_string(), "TARFETCH");
    }

    #[tokio::test]
    async fn test_upload_header_then_payload() {
        let (mut a, mut b) = duplex(4096);
        let request = Request::Upload {
            filename: "main.c".into(),
            dest: "~S1/src".into(),
            size: 5,
        };
        request.write_to(&mut a).await.unwrap();
        a.write_all(b"hello").await.unwrap();

        let parsed = Request::read_from(&mut b).await.unwrap().unwrap();
        assert_eq!(parsed, request);
        let mut payload = [0u8; 5];
        b.read_exact(&mut payload).await.unwrap();
        assert_eq!(&payload, b"hello");
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let (a, mut b) = duplex(64);
        drop(a);
        assert_eq!(Request::read_from(&mut b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tag_then_body() {
        let (mut a, mut b) = duplex(256);
        Request::Remove {
            path: "docs/a.pdf".into(),
        }
        .write_to(&mut a)
        .await
        .unwrap();

        let command = Request::read_tag(&mut b).await.unwrap();
        assert_eq!(command, Some(Command::Remove));
        let request = Request::read_body(&mut b, Command::Remove).await.unwrap();
        assert_eq!(
            request,
            Request::Remove {
                path: "docs/a.pdf".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_tag_rejected() {
        let (mut a, mut b) = duplex(64);
        a.write_u8(0x42).await.unwrap();
        let err = Request::read_from(&mut b).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_negative_upload_size_rejected() {
        let (mut a, mut b) = duplex(256);
        let mut buf = Vec::new();
        buf.put_u8(Command::Upload.tag());
        put_string(&mut buf, "filename", "a.c", MAX_FILENAME_LEN).unwrap();
        put_string(&mut buf, "dest", "~S1", MAX_PATH_LEN).unwrap();
        buf.put_i64(-7);
        a.write_all(&buf).await.unwrap();

        let err = Request::read_from(&mut b).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_oversized_tag_rejected_on_encode() {
        let request = Request::ArchiveFetch {
            tag: ".".repeat(MAX_TAG_LEN + 1),
        };
        assert!(matches!(
            request.encode().unwrap_err(),
            Error::FieldTooLong { field: "tag", .. }
        ));
    }
}
