//! Read-only byte sources that parts are cut from.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::errors::ReadError;

/// A readable byte source of known length.
///
/// Implementations must tolerate concurrent `read_range` calls over disjoint ranges.
#[async_trait]
pub trait ByteSource: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `length` bytes starting at `offset`.
    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes, ReadError>;
}

fn check_bounds(offset: u64, length: u64, len: u64) -> Result<(), ReadError> {
    match offset.checked_add(length) {
        Some(end) if end <= len => Ok(()),
        _ => Err(ReadError::OutOfBounds {
            offset,
            length,
            len,
        }),
    }
}

#[async_trait]
impl ByteSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes, ReadError> {
        check_bounds(offset, length, ByteSource::len(self))?;
        Ok(self.slice(offset as usize..(offset + length) as usize))
    }
}

/// A file on local disk. Every read opens its own handle so parts can be read concurrently.
#[derive(Clone, Debug)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ReadError> {
        let path = path.as_ref().to_path_buf();
        let len = tokio::fs::metadata(&path).await?.len();
        Ok(Self { path, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes, ReadError> {
        check_bounds(offset, length, self.len)?;

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = BytesMut::zeroed(length as usize);
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                // file shrank underneath us
                return Err(ReadError::ShortRead {
                    offset,
                    expected: length,
                    actual: filled as u64,
                });
            }
            filled += n;
        }
        Ok(buf.freeze())
    }
}
