//! Windowed object reader
//!
//! [`ObjectReader`] learns the object size once at open, then serves reads
//! from a cached window of at most `read_window` bytes. A read outside the
//! window fetches `[position, min(position + window, size))` with one ranged
//! GET. Ranged fetches are not retried; a failed fetch surfaces to the caller.

use std::ops::Range;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::path::S3Path;
use crate::retry::retry_with_backoff;

/// Seekable reader for one object
#[derive(Debug)]
pub struct ObjectReader {
    path: S3Path,
    size: u64,
    position: u64,
    window: Bytes,
    window_start: u64,
    window_capacity: u64,
    fetches: u64,
    open: bool,
}

impl ObjectReader {
    /// Look up the object size and return a reader positioned at 0
    pub(crate) async fn open(path: S3Path) -> Result<Self> {
        let config = path.config().clone();
        let info = retry_with_backoff(config.retry(), "head_object", || {
            config.store().head_object(path.bucket(), path.key())
        })
        .await?;

        debug!(path = %path, size = info.len(), "Opened reader");
        Ok(Self {
            window_capacity: config.transfer().read_window.max(1),
            size: info.len(),
            path,
            position: 0,
            window: Bytes::new(),
            window_start: 0,
            fetches: 0,
            open: true,
        })
    }

    pub fn path(&self) -> &S3Path {
        &self.path
    }

    /// Object size captured at open
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes left between the position and the end of the object
    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.position)
    }

    pub fn eof(&self) -> bool {
        self.position >= self.size
    }

    /// Ranged GETs issued so far
    pub fn fetches(&self) -> u64 {
        self.fetches
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::Precondition(format!(
                "cannot {operation} {}: reader is closed",
                self.path
            )))
        }
    }

    fn window_end(&self) -> u64 {
        self.window_start + self.window.len() as u64
    }

    /// Cached bytes starting at the current position
    fn cached(&self) -> &[u8] {
        if self.position >= self.window_start && self.position < self.window_end() {
            &self.window[(self.position - self.window_start) as usize..]
        } else {
            &[]
        }
    }

    async fn fetch(&mut self, range: Range<u64>) -> Result<Bytes> {
        self.fetches += 1;
        let expected = range.end - range.start;
        trace!(path = %self.path, start = range.start, end = range.end, "Fetching range");

        let data = self
            .path
            .config()
            .store()
            .get_object(self.path.bucket(), self.path.key(), Some(range))
            .await?;

        if data.len() as u64 != expected {
            return Err(Error::General(format!(
                "ranged read of {} returned {} bytes, expected {expected}",
                self.path,
                data.len()
            )));
        }
        Ok(data)
    }

    async fn fill_window(&mut self) -> Result<()> {
        let end = (self.position + self.window_capacity).min(self.size);
        self.window = self.fetch(self.position..end).await?;
        self.window_start = self.position;
        Ok(())
    }

    /// Read up to `buf.len()` bytes; returns 0 at end of object
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open("read")?;
        if buf.is_empty() || self.eof() {
            return Ok(0);
        }

        if self.cached().is_empty() {
            self.fill_window().await?;
        }

        let cached = self.cached();
        let n = buf.len().min(cached.len());
        buf[..n].copy_from_slice(&cached[..n]);
        self.position += n as u64;
        Ok(n)
    }

    /// Fill `buf` completely
    ///
    /// Fails with [`Error::EndOfStream`] without consuming anything when fewer
    /// than `buf.len()` bytes remain. Requests at least a window wide are
    /// served by a single ranged GET after the cached bytes are used up.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_open("read")?;
        let requested = buf.len() as u64;
        let available = self.remaining();
        if requested > available {
            return Err(Error::EndOfStream {
                requested,
                available,
            });
        }

        let cached = self.cached();
        let mut filled = buf.len().min(cached.len());
        buf[..filled].copy_from_slice(&cached[..filled]);
        self.position += filled as u64;

        let rest = (buf.len() - filled) as u64;
        if rest >= self.window_capacity {
            let data = self.fetch(self.position..self.position + rest).await?;
            buf[filled..].copy_from_slice(&data);
            self.position += rest;
            return Ok(());
        }

        while filled < buf.len() {
            filled += self.read(&mut buf[filled..]).await?;
        }
        Ok(())
    }

    /// Read one byte
    pub async fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte).await?;
        Ok(byte[0])
    }

    /// Read everything from the position to the end of the object
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        self.ensure_open("read")?;
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(Bytes::new());
        }
        let mut out = vec![0u8; remaining as usize];
        self.read_exact(&mut out).await?;
        Ok(Bytes::from(out))
    }

    /// Move to an absolute offset; `pos == size` is allowed (end of object)
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        self.ensure_open("seek")?;
        if pos > self.size {
            return Err(Error::InvalidArgument(format!(
                "seek to {pos} past end of {} ({} bytes)",
                self.path, self.size
            )));
        }
        self.position = pos;
        Ok(pos)
    }

    /// Release the cached window; further reads fail
    pub fn close(&mut self) {
        self.open = false;
        self.window = Bytes::new();
    }
}
