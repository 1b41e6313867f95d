//! Filesystem-style operations on [`S3Path`]
//!
//! Existence checks, whole-object reads and writes, directory markers,
//! copies, removal and scoped streaming handles. One-shot calls go through
//! the path's retry policy; streaming reads do not.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::listing::{self, ReadDirOptions};
use crate::multipart::{calculate_parts, part_byte_range};
use crate::path::S3Path;
use crate::reader::ObjectReader;
use crate::retry::retry_with_backoff;
use crate::traits::{CompletedPart, ListOptions, ObjectInfo, PutOptions};
use crate::writer::{ObjectWriter, WriteSummary, abort_upload};

/// Result of an existence probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Presence {
    /// The object (or, for directory paths, at least one key below it) exists
    Found(ObjectInfo),
    /// Nothing there
    NotFound,
}

impl Presence {
    pub fn exists(&self) -> bool {
        matches!(self, Presence::Found(_))
    }

    pub fn info(&self) -> Option<&ObjectInfo> {
        match self {
            Presence::Found(info) => Some(info),
            Presence::NotFound => None,
        }
    }
}

/// How [`S3Path::open`] should open an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "rb" => Ok(OpenMode::Read),
            "w" | "wb" => Ok(OpenMode::Write),
            other => Err(Error::InvalidArgument(format!(
                "unsupported open mode '{other}' (expected r, rb, w or wb)"
            ))),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::Read => write!(f, "r"),
            OpenMode::Write => write!(f, "w"),
        }
    }
}

/// A handle returned by [`S3Path::open`]
#[derive(Debug)]
pub enum ObjectHandle {
    Reader(ObjectReader),
    Writer(ObjectWriter),
}

impl ObjectHandle {
    pub fn mode(&self) -> OpenMode {
        match self {
            ObjectHandle::Reader(_) => OpenMode::Read,
            ObjectHandle::Writer(_) => OpenMode::Write,
        }
    }

    /// The reader, or `Precondition` if the handle was opened for writing
    pub fn reader(&mut self) -> Result<&mut ObjectReader> {
        match self {
            ObjectHandle::Reader(reader) => Ok(reader),
            ObjectHandle::Writer(writer) => Err(Error::Precondition(format!(
                "{} was opened for writing",
                writer.path()
            ))),
        }
    }

    /// The writer, or `Precondition` if the handle was opened for reading
    pub fn writer(&mut self) -> Result<&mut ObjectWriter> {
        match self {
            ObjectHandle::Writer(writer) => Ok(writer),
            ObjectHandle::Reader(reader) => Err(Error::Precondition(format!(
                "{} was opened for reading",
                reader.path()
            ))),
        }
    }

    /// Close the handle; writers finalize and report what they stored
    pub async fn close(&mut self) -> Result<Option<WriteSummary>> {
        match self {
            ObjectHandle::Reader(reader) => {
                reader.close();
                Ok(None)
            }
            ObjectHandle::Writer(writer) => writer.close().await.map(Some),
        }
    }
}

fn require_file(path: &S3Path, operation: &str) -> Result<()> {
    if path.is_file_path() {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "cannot {operation} {path}: it is a directory path"
        )))
    }
}

impl S3Path {
    /// Check whether this path exists
    ///
    /// File paths are checked with a HEAD request. Directory paths exist when
    /// any key starts with them; the bucket root exists whenever the bucket
    /// does.
    pub async fn probe(&self) -> Result<Presence> {
        let config = self.config();
        let result = if self.is_file_path() {
            retry_with_backoff(config.retry(), "head_object", || {
                config.store().head_object(self.bucket(), self.key())
            })
            .await
        } else {
            let options = ListOptions {
                prefix: (!self.is_root()).then(|| self.key().to_string()),
                max_keys: Some(1),
                ..Default::default()
            };
            retry_with_backoff(config.retry(), "list_objects_v2", || {
                config.store().list_objects_v2(self.bucket(), options.clone())
            })
            .await
            .and_then(|page| {
                if self.is_root() || !page.contents.is_empty() || !page.common_prefixes.is_empty() {
                    Ok(ObjectInfo::dir(self.key()))
                } else {
                    Err(Error::NotFound(self.to_string()))
                }
            })
        };

        match result {
            Ok(info) => Ok(Presence::Found(info)),
            Err(e) if e.is_not_found() => Ok(Presence::NotFound),
            Err(e) => Err(e),
        }
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.probe().await?.exists())
    }

    /// True for an existing object at a file path
    pub async fn is_file(&self) -> Result<bool> {
        if !self.is_file_path() {
            return Ok(false);
        }
        self.exists().await
    }

    /// True for a directory path with at least one key below it
    pub async fn is_dir(&self) -> Result<bool> {
        if !self.is_dir_path() {
            return Ok(false);
        }
        self.exists().await
    }

    /// Metadata for the object or directory; `NotFound` when absent
    pub async fn metadata(&self) -> Result<ObjectInfo> {
        match self.probe().await? {
            Presence::Found(info) => Ok(info),
            Presence::NotFound => Err(Error::NotFound(self.to_string())),
        }
    }

    /// Object size in bytes
    pub async fn size(&self) -> Result<u64> {
        require_file(self, "get the size of")?;
        Ok(self.metadata().await?.len())
    }

    /// Whole object content in one GET
    pub async fn read_all(&self) -> Result<Bytes> {
        require_file(self, "read")?;
        let config = self.config();
        retry_with_backoff(config.retry(), "get_object", || {
            config.store().get_object(self.bucket(), self.key(), None)
        })
        .await
    }

    /// Bytes `[start, end)` of the object
    pub async fn read_range(&self, start: u64, end: u64) -> Result<Bytes> {
        require_file(self, "read")?;
        if start >= end {
            return Ok(Bytes::new());
        }
        let config = self.config();
        retry_with_backoff(config.retry(), "get_object", || {
            config
                .store()
                .get_object(self.bucket(), self.key(), Some(start..end))
        })
        .await
    }

    /// Store `data` as the object's full content
    ///
    /// Payloads up to one part are stored with a single put; larger ones go
    /// through [`S3Path::write_bulk`].
    pub async fn write_all(&self, data: impl Into<Bytes>) -> Result<WriteSummary> {
        self.write_all_with(data, PutOptions::default()).await
    }

    /// [`S3Path::write_all`] with explicit upload options
    pub async fn write_all_with(
        &self,
        data: impl Into<Bytes>,
        options: PutOptions,
    ) -> Result<WriteSummary> {
        require_file(self, "write")?;
        let data = data.into();
        if data.len() as u64 > self.config().transfer().part_size {
            return self.write_bulk_with(data, options).await;
        }
        self.put(data, &options).await
    }

    async fn put(&self, data: Bytes, options: &PutOptions) -> Result<WriteSummary> {
        let config = self.config();
        let size = data.len() as u64;
        let info = retry_with_backoff(config.retry(), "put_object", || {
            config
                .store()
                .put_object(self.bucket(), self.key(), data.clone(), options)
        })
        .await?;
        debug!(path = %self, size, "Stored object");
        Ok(WriteSummary {
            bytes_written: size,
            parts: 0,
            multipart: false,
            etag: info.etag,
        })
    }

    /// Upload a payload of known size as concurrent multipart parts
    pub async fn write_bulk(&self, data: impl Into<Bytes>) -> Result<WriteSummary> {
        self.write_bulk_with(data, PutOptions::default()).await
    }

    /// [`S3Path::write_bulk`] with explicit upload options
    ///
    /// Parts are uploaded with up to `concurrency` in flight, each with the
    /// path's retry policy. Any part failing for good aborts the upload.
    pub async fn write_bulk_with(
        &self,
        data: impl Into<Bytes>,
        options: PutOptions,
    ) -> Result<WriteSummary> {
        require_file(self, "write")?;
        let data = data.into();
        let total = data.len() as u64;
        if total == 0 {
            return self.put(data, &options).await;
        }

        let config = self.config();
        let part_size = config.transfer().calculate_part_size(total);
        let part_count = calculate_parts(total, part_size);

        let upload_id = retry_with_backoff(config.retry(), "create_multipart_upload", || {
            config
                .store()
                .create_multipart_upload(self.bucket(), self.key(), &options)
        })
        .await?;
        debug!(path = %self, upload_id = %upload_id, parts = part_count, "Started bulk upload");

        match self
            .upload_bulk_parts(&upload_id, &data, part_size, part_count)
            .await
        {
            Ok(etag) => Ok(WriteSummary {
                bytes_written: total,
                parts: part_count,
                multipart: true,
                etag,
            }),
            Err(e) => {
                if let Err(abort_err) = abort_upload(self, &upload_id).await {
                    warn!(path = %self, upload_id = %upload_id, error = %abort_err, "Failed to abort bulk upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_bulk_parts(
        &self,
        upload_id: &str,
        data: &Bytes,
        part_size: u64,
        part_count: usize,
    ) -> Result<Option<String>> {
        let config = self.config();
        let total = data.len() as u64;

        let mut parts: Vec<CompletedPart> = stream::iter(1..=part_count as i32)
            .map(|part_number| {
                let (start, end) = part_byte_range(part_number, part_size, total);
                let chunk = data.slice(start as usize..end as usize);
                async move {
                    let etag = retry_with_backoff(config.retry(), "upload_part", || {
                        config.store().upload_part(
                            self.bucket(),
                            self.key(),
                            upload_id,
                            part_number,
                            chunk.clone(),
                        )
                    })
                    .await?;
                    Ok::<_, Error>(CompletedPart::new(part_number, etag))
                }
            })
            .buffer_unordered(config.transfer().concurrency.max(1))
            .try_collect()
            .await?;

        parts.sort_by_key(|part| part.part_number);

        retry_with_backoff(config.retry(), "complete_multipart_upload", || {
            config
                .store()
                .complete_multipart_upload(self.bucket(), self.key(), upload_id, &parts)
        })
        .await
    }

    /// Create a zero-byte directory marker at this directory path
    pub async fn create_dir(&self) -> Result<()> {
        if !self.is_dir_path() || self.is_root() {
            return Err(Error::InvalidArgument(format!(
                "cannot create directory {self}: expected a non-root path ending in '/'"
            )));
        }
        self.put(Bytes::new(), &PutOptions::default()).await?;
        Ok(())
    }

    /// Delete the object (or the directory marker for directory paths)
    pub async fn remove(&self) -> Result<()> {
        if self.is_root() {
            return Err(Error::InvalidArgument(format!(
                "cannot remove bucket root {self}"
            )));
        }
        let config = self.config();
        retry_with_backoff(config.retry(), "delete_object", || {
            config.store().delete_object(self.bucket(), self.key())
        })
        .await?;
        debug!(path = %self, "Removed object");
        Ok(())
    }

    /// Delete every object below this directory path, returning how many
    pub async fn remove_all(&self) -> Result<usize> {
        let objects = listing::walk(self).await?;
        for (path, _) in &objects {
            path.remove().await?;
        }
        debug!(path = %self, removed = objects.len(), "Removed directory tree");
        Ok(objects.len())
    }

    /// Server-side copy to `target`, which must use the same store
    pub async fn copy_to(&self, target: &S3Path) -> Result<()> {
        require_file(self, "copy")?;
        require_file(target, "copy onto")?;
        let config = self.config();
        retry_with_backoff(config.retry(), "copy_object", || {
            config
                .store()
                .copy_object(self.bucket(), self.key(), target.bucket(), target.key())
        })
        .await?;
        debug!(from = %self, to = %target, "Copied object");
        Ok(())
    }

    /// Copy to `target`, then delete this object
    pub async fn rename_to(&self, target: &S3Path) -> Result<()> {
        self.copy_to(target).await?;
        self.remove().await
    }

    /// Open a streaming handle: `r`/`rb` for reading, `w`/`wb` for writing
    pub async fn open(&self, mode: &str) -> Result<ObjectHandle> {
        match mode.parse::<OpenMode>()? {
            OpenMode::Read => self.open_reader().await.map(ObjectHandle::Reader),
            OpenMode::Write => self.open_writer().map(ObjectHandle::Writer),
        }
    }

    pub async fn open_reader(&self) -> Result<ObjectReader> {
        require_file(self, "read")?;
        ObjectReader::open(self.clone()).await
    }

    /// A writer; nothing is sent until the buffer fills or it is closed
    pub fn open_writer(&self) -> Result<ObjectWriter> {
        require_file(self, "write")?;
        Ok(ObjectWriter::new(self.clone()))
    }

    /// Run `f` with a writer, closing it on success and aborting it on error
    ///
    /// ```ignore
    /// let (_, summary) = path
    ///     .write_with(|w| Box::pin(async move { w.write(b"hello").await }))
    ///     .await?;
    /// ```
    pub async fn write_with<F, T>(&self, f: F) -> Result<(T, WriteSummary)>
    where
        F: for<'w> FnOnce(&'w mut ObjectWriter) -> BoxFuture<'w, Result<T>>,
    {
        let mut writer = self.open_writer()?;
        let result = match f(&mut writer).await {
            Ok(value) => writer.close().await.map(|summary| (value, summary)),
            Err(e) => Err(e),
        };

        if result.is_err()
            && let Err(abort_err) = writer.abort().await
        {
            warn!(path = %self, error = %abort_err, "Failed to abort writer");
        }
        result
    }

    /// Run `f` with a reader, closing it afterwards
    pub async fn read_with<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'r> FnOnce(&'r mut ObjectReader) -> BoxFuture<'r, Result<T>>,
    {
        let mut reader = self.open_reader().await?;
        let result = f(&mut reader).await;
        reader.close();
        result
    }

    /// See [`listing::read_dir`]
    pub async fn read_dir(&self, options: &ReadDirOptions) -> Result<Vec<String>> {
        listing::read_dir(self, options).await
    }

    /// See [`listing::read_dir_entries`]
    pub async fn read_dir_entries(
        &self,
        options: &ReadDirOptions,
    ) -> Result<Vec<(String, ObjectInfo)>> {
        listing::read_dir_entries(self, options).await
    }

    /// See [`listing::read_dir_paths`]
    pub async fn read_dir_paths(&self, options: &ReadDirOptions) -> Result<Vec<S3Path>> {
        listing::read_dir_paths(self, options).await
    }

    /// See [`listing::walk`]
    pub async fn walk(&self) -> Result<Vec<(S3Path, ObjectInfo)>> {
        listing::walk(self).await
    }
}
