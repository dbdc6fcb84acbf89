// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Sequential byte access with optional seeking.

use std::io::{Read, Seek, SeekFrom};

use crate::core::Result;

/// Seek origin for [`ByteSource::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start(u64),
    Current(i64),
    End(i64),
    /// Report the total size without moving the cursor.
    Size,
}

/// Byte stream a demuxer reads from.
pub trait ByteSource: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Seek and return the new offset (or the total size for [`Whence::Size`]).
    fn seek(&mut self, whence: Whence) -> Result<u64>;

    fn is_seekable(&self) -> bool {
        true
    }

    /// Fill `buf` completely unless the stream ends first; returns bytes read.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// [`ByteSource`] over any `Read + Seek` (files, cursors).
pub struct IoByteSource<R> {
    inner: R,
}

impl<R> IoByteSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl IoByteSource<std::fs::File> {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(std::fs::File::open(path)?))
    }
}

impl<R: Read + Seek + Send> ByteSource for IoByteSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.inner.read(buf)?)
    }

    fn seek(&mut self, whence: Whence) -> Result<u64> {
        let offset = match whence {
            Whence::Start(offset) => self.inner.seek(SeekFrom::Start(offset))?,
            Whence::Current(delta) => self.inner.seek(SeekFrom::Current(delta))?,
            Whence::End(delta) => self.inner.seek(SeekFrom::End(delta))?,
            Whence::Size => {
                let current = self.inner.stream_position()?;
                let size = self.inner.seek(SeekFrom::End(0))?;
                self.inner.seek(SeekFrom::Start(current))?;
                size
            }
        };
        Ok(offset)
    }
}
