//! Buffered object writer
//!
//! [`ObjectWriter`] turns a stream of `write` calls into either one PUT (the
//! payload never outgrew the buffer) or a multipart upload whose parts are
//! all exactly `part_size` bytes except the last. The handle finalizes exactly
//! once: a single put or a single complete call.

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::buffer::PartBuffer;
use crate::error::{Error, Result};
use crate::multipart::MAX_PARTS;
use crate::path::S3Path;
use crate::retry::retry_with_backoff;
use crate::traits::{CompletedPart, PutOptions};

/// Lifecycle of an [`ObjectWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterState {
    /// Nothing uploaded yet; close will issue a single put
    Accumulating,
    /// A multipart upload exists; close will complete it
    MultipartActive,
    /// Finalized
    Closed,
    /// Abandoned; any multipart upload was aborted
    Aborted,
    /// A store call failed; only `abort` is allowed
    Failed,
}

/// Outcome of a finished write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    /// Total payload size
    pub bytes_written: u64,
    /// Number of multipart parts (0 for a single put)
    pub parts: usize,
    /// Whether the object was assembled from a multipart upload
    pub multipart: bool,
    /// ETag reported by the store, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// Streaming writer for one object
#[derive(Debug)]
pub struct ObjectWriter {
    path: S3Path,
    buffer: PartBuffer,
    options: PutOptions,
    upload_id: Option<String>,
    next_part_number: i32,
    completed_parts: Vec<CompletedPart>,
    bytes_written: u64,
    state: WriterState,
}

impl ObjectWriter {
    /// Create a writer whose buffer capacity is the path's configured part size
    pub(crate) fn new(path: S3Path) -> Self {
        let capacity = path.config().transfer().part_size as usize;
        Self {
            path,
            buffer: PartBuffer::new(capacity),
            options: PutOptions::default(),
            upload_id: None,
            next_part_number: 1,
            completed_parts: Vec::new(),
            bytes_written: 0,
            state: WriterState::Accumulating,
        }
    }

    /// Content type stored with the object
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.options.content_type = Some(content_type.into());
        self
    }

    pub fn path(&self) -> &S3Path {
        &self.path
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Bytes accepted so far (the stream offset)
    pub fn position(&self) -> u64 {
        self.bytes_written
    }

    /// Bytes sitting in the local buffer
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer capacity, i.e. the part size
    pub fn part_size(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub fn completed_parts(&self) -> &[CompletedPart] {
        &self.completed_parts
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.state,
            WriterState::Accumulating | WriterState::MultipartActive
        )
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::Precondition(format!(
                "cannot {operation} {}: writer is {:?}",
                self.path, self.state
            )))
        }
    }

    /// Append bytes to the object
    ///
    /// Bytes that overflow the buffer are uploaded as parts right away: the
    /// slice that fills the buffer is flushed with it, full-size chunks go
    /// straight to the store, and the remainder stays buffered.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open("write to")?;
        if data.is_empty() {
            return Ok(());
        }

        let result = self.write_inner(data).await;
        if result.is_err() {
            self.state = WriterState::Failed;
        }
        result
    }

    async fn write_inner(&mut self, data: &[u8]) -> Result<()> {
        self.bytes_written += data.len() as u64;

        let taken = self.buffer.append(data);
        let mut rest = &data[taken..];
        if rest.is_empty() {
            return Ok(());
        }

        debug_assert!(self.buffer.is_full());
        trace!(path = %self.path, buffered = self.buffer.len(), "Buffer full");
        self.flush_buffer().await?;

        let capacity = self.buffer.capacity();
        while rest.len() >= capacity {
            let (chunk, tail) = rest.split_at(capacity);
            self.upload_part(Bytes::copy_from_slice(chunk)).await?;
            rest = tail;
        }

        self.buffer.append(rest);
        Ok(())
    }

    /// Upload buffered bytes as the next part
    ///
    /// Starts the multipart upload on first use. A no-op on an empty buffer.
    pub async fn flush(&mut self) -> Result<()> {
        self.ensure_open("flush")?;
        let result = self.flush_buffer().await;
        if result.is_err() {
            self.state = WriterState::Failed;
        }
        result
    }

    async fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let data = self.buffer.drain();
        self.upload_part(data).await
    }

    /// Create the multipart upload if it does not exist yet
    async fn ensure_upload(&mut self) -> Result<String> {
        if let Some(upload_id) = &self.upload_id {
            return Ok(upload_id.clone());
        }

        let config = self.path.config().clone();
        let (bucket, key) = (self.path.bucket(), self.path.key());
        let options = &self.options;
        let upload_id = retry_with_backoff(config.retry(), "create_multipart_upload", || {
            config.store().create_multipart_upload(bucket, key, options)
        })
        .await?;

        debug!(path = %self.path, upload_id = %upload_id, "Started multipart upload");
        self.upload_id = Some(upload_id.clone());
        self.state = WriterState::MultipartActive;
        Ok(upload_id)
    }

    async fn upload_part(&mut self, data: Bytes) -> Result<()> {
        let part_number = self.next_part_number;
        if part_number > MAX_PARTS as i32 {
            return Err(Error::InvalidArgument(format!(
                "cannot write {}: more than {MAX_PARTS} parts of {} bytes",
                self.path,
                self.buffer.capacity()
            )));
        }
        let upload_id = self.ensure_upload().await?;
        let size = data.len();

        let config = self.path.config().clone();
        let (bucket, key) = (self.path.bucket(), self.path.key());
        let etag = retry_with_backoff(config.retry(), "upload_part", || {
            config
                .store()
                .upload_part(bucket, key, &upload_id, part_number, data.clone())
        })
        .await?;

        debug!(path = %self.path, part_number, size, "Uploaded part");
        self.completed_parts.push(CompletedPart::new(part_number, etag));
        self.next_part_number += 1;
        Ok(())
    }

    /// Finalize the object
    ///
    /// Issues a single put if nothing was flushed yet, otherwise uploads the
    /// remaining bytes as the last part and completes the multipart upload.
    pub async fn close(&mut self) -> Result<WriteSummary> {
        self.ensure_open("close")?;
        match self.close_inner().await {
            Ok(summary) => {
                self.state = WriterState::Closed;
                Ok(summary)
            }
            Err(e) => {
                self.state = WriterState::Failed;
                Err(e)
            }
        }
    }

    async fn close_inner(&mut self) -> Result<WriteSummary> {
        let config = self.path.config().clone();

        if self.upload_id.is_none() {
            let data = self.buffer.drain();
            let (bucket, key) = (self.path.bucket(), self.path.key());
            let options = &self.options;
            let info = retry_with_backoff(config.retry(), "put_object", || {
                config.store().put_object(bucket, key, data.clone(), options)
            })
            .await?;

            debug!(path = %self.path, size = self.bytes_written, "Stored object with single put");
            return Ok(WriteSummary {
                bytes_written: self.bytes_written,
                parts: 0,
                multipart: false,
                etag: info.etag,
            });
        }

        self.flush_buffer().await?;

        let upload_id = self.ensure_upload().await?;
        let (bucket, key) = (self.path.bucket(), self.path.key());
        let parts = &self.completed_parts;
        let etag = retry_with_backoff(config.retry(), "complete_multipart_upload", || {
            config
                .store()
                .complete_multipart_upload(bucket, key, &upload_id, parts)
        })
        .await?;

        debug!(
            path = %self.path,
            parts = self.completed_parts.len(),
            size = self.bytes_written,
            "Completed multipart upload"
        );
        Ok(WriteSummary {
            bytes_written: self.bytes_written,
            parts: self.completed_parts.len(),
            multipart: true,
            etag,
        })
    }

    /// Abandon the write
    ///
    /// Discards buffered bytes and aborts the multipart upload if one was
    /// started. Aborting twice is a no-op; aborting a closed writer is not
    /// allowed.
    pub async fn abort(&mut self) -> Result<()> {
        match self.state {
            WriterState::Aborted => return Ok(()),
            WriterState::Closed => {
                return Err(Error::Precondition(format!(
                    "cannot abort {}: writer is already closed",
                    self.path
                )));
            }
            _ => {}
        }

        self.buffer.reset();
        self.state = WriterState::Aborted;

        match self.upload_id.take() {
            Some(upload_id) => abort_upload(&self.path, &upload_id).await,
            None => Ok(()),
        }
    }
}

/// Abort a multipart upload with the path's retry policy
pub(crate) async fn abort_upload(path: &S3Path, upload_id: &str) -> Result<()> {
    let config = path.config();
    retry_with_backoff(config.retry(), "abort_multipart_upload", || {
        config
            .store()
            .abort_multipart_upload(path.bucket(), path.key(), upload_id)
    })
    .await?;
    debug!(path = %path, upload_id = %upload_id, "Aborted multipart upload");
    Ok(())
}

impl Drop for ObjectWriter {
    fn drop(&mut self) {
        if matches!(self.state, WriterState::Closed | WriterState::Aborted) {
            return;
        }

        let Some(upload_id) = self.upload_id.take() else {
            if self.bytes_written > 0 {
                warn!(
                    path = %self.path,
                    bytes = self.bytes_written,
                    "Writer dropped without close; buffered data discarded"
                );
            }
            return;
        };

        warn!(
            path = %self.path,
            upload_id = %upload_id,
            "Writer dropped with an unfinished multipart upload; aborting it"
        );

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(upload_id = %upload_id, "No async runtime available; multipart upload left orphaned");
            return;
        };

        let store = self.path.config().store().clone();
        let bucket = self.path.bucket().to_string();
        let key = self.path.key().to_string();
        handle.spawn(async move {
            if let Err(e) = store.abort_multipart_upload(&bucket, &key, &upload_id).await {
                warn!(upload_id = %upload_id, error = %e, "Failed to abort orphaned multipart upload");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Failure, MemoryStore, StoreOp};
    use crate::multipart::TransferOptions;
    use crate::retry::RetryPolicy;
    use crate::store::StoreConfig;
    use crate::traits::{MockObjectStore, ObjectStore};
    use std::sync::Arc;

    fn setup(part_size: u64) -> (Arc<MemoryStore>, S3Path) {
        setup_with_retry(part_size, RetryPolicy::none())
    }

    fn setup_with_retry(part_size: u64, retry: RetryPolicy) -> (Arc<MemoryStore>, S3Path) {
        let store = Arc::new(MemoryStore::new().with_bucket("b"));
        let config = StoreConfig::new("mem", store.clone())
            .with_retry(retry)
            .with_transfer(TransferOptions {
                part_size,
                ..Default::default()
            })
            .shared();
        (store, S3Path::new("b", "obj", config))
    }

    fn part_sizes(store: &MemoryStore) -> Vec<usize> {
        store.part_log().iter().map(|p| p.size).collect()
    }

    #[tokio::test]
    async fn test_small_payload_uses_single_put() {
        let (store, path) = setup(16);
        let mut writer = ObjectWriter::new(path);
        writer.write(b"abc").await.unwrap();
        writer.write(b"def").await.unwrap();
        assert_eq!(writer.state(), WriterState::Accumulating);
        assert_eq!(writer.position(), 6);

        let summary = writer.close().await.unwrap();
        assert!(!summary.multipart);
        assert_eq!(summary.bytes_written, 6);

        let stats = store.stats();
        assert_eq!(stats.put_object, 1);
        assert_eq!(stats.create_multipart_upload, 0);
        assert_eq!(&store.object("b", "obj").unwrap()[..], b"abcdef");
    }

    #[tokio::test]
    async fn test_empty_close_creates_empty_object() {
        let (store, path) = setup(16);
        let mut writer = ObjectWriter::new(path);
        writer.close().await.unwrap();
        assert_eq!(store.object("b", "obj").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_large_write_is_split_into_parts() {
        let (store, path) = setup(4);
        let mut writer = ObjectWriter::new(path);
        writer.write(b"0123456789").await.unwrap();

        assert_eq!(writer.state(), WriterState::MultipartActive);
        assert_eq!(writer.buffered(), 2);
        assert_eq!(part_sizes(&store), vec![4, 4]);

        let summary = writer.close().await.unwrap();
        assert_eq!(summary.parts, 3);
        assert!(summary.multipart);
        assert_eq!(part_sizes(&store), vec![4, 4, 2]);
        assert_eq!(&store.object("b", "obj").unwrap()[..], b"0123456789");
        assert_eq!(store.stats().put_object, 0);
    }

    #[tokio::test]
    async fn test_small_writes_fill_parts_exactly() {
        let (store, path) = setup(4);
        let mut writer = ObjectWriter::new(path);
        for chunk in [b"abc", b"def", b"ghi", b"jkl", b"mno"] {
            writer.write(chunk).await.unwrap();
        }
        writer.close().await.unwrap();

        assert_eq!(part_sizes(&store), vec![4, 4, 4, 3]);
        let numbers: Vec<i32> = store.part_log().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(&store.object("b", "obj").unwrap()[..], b"abcdefghijklmno");
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_empty_trailing_part() {
        let (store, path) = setup(4);
        let mut writer = ObjectWriter::new(path);
        writer.write(b"abcdefgh").await.unwrap();
        assert_eq!(writer.buffered(), 0);

        let summary = writer.close().await.unwrap();
        assert_eq!(summary.parts, 2);
        assert_eq!(part_sizes(&store), vec![4, 4]);
    }

    #[tokio::test]
    async fn test_explicit_flush_starts_multipart() {
        let (store, path) = setup(16);
        let mut writer = ObjectWriter::new(path);
        writer.write(b"ab").await.unwrap();
        writer.flush().await.unwrap();
        assert!(writer.upload_id().is_some());
        writer.flush().await.unwrap();
        writer.write(b"cd").await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(part_sizes(&store), vec![2, 2]);
        assert_eq!(store.stats().create_multipart_upload, 1);
        assert_eq!(&store.object("b", "obj").unwrap()[..], b"abcd");
    }

    #[tokio::test]
    async fn test_operations_after_close_are_rejected() {
        let (_store, path) = setup(16);
        let mut writer = ObjectWriter::new(path);
        writer.write(b"x").await.unwrap();
        writer.close().await.unwrap();

        assert!(matches!(writer.write(b"y").await, Err(Error::Precondition(_))));
        assert!(matches!(writer.flush().await, Err(Error::Precondition(_))));
        assert!(matches!(writer.close().await, Err(Error::Precondition(_))));
        assert!(matches!(writer.abort().await, Err(Error::Precondition(_))));
    }

    #[tokio::test]
    async fn test_abort_discards_upload() {
        let (store, path) = setup(4);
        let mut writer = ObjectWriter::new(path);
        writer.write(b"0123456789").await.unwrap();
        assert_eq!(store.pending_uploads(), 1);

        writer.abort().await.unwrap();
        assert_eq!(writer.state(), WriterState::Aborted);
        assert_eq!(store.pending_uploads(), 0);
        assert!(store.object("b", "obj").is_none());

        writer.abort().await.unwrap();
        assert_eq!(store.stats().abort_multipart_upload, 1);
    }

    #[tokio::test]
    async fn test_failed_part_poisons_writer() {
        let (store, path) = setup(4);
        store.fail_next(StoreOp::UploadPart, 1, Failure::Request);

        let mut writer = ObjectWriter::new(path);
        assert!(writer.write(b"0123456789").await.is_err());
        assert_eq!(writer.state(), WriterState::Failed);
        assert!(matches!(writer.close().await, Err(Error::Precondition(_))));

        writer.abort().await.unwrap();
        assert_eq!(store.pending_uploads(), 0);
        assert!(store.object("b", "obj").is_none());
    }

    #[tokio::test]
    async fn test_transient_part_failure_is_retried() {
        let retry = RetryPolicy::new()
            .max_attempts(3)
            .initial_backoff_ms(1)
            .max_backoff_ms(2);
        let (store, path) = setup_with_retry(4, retry);
        store.fail_next(StoreOp::UploadPart, 1, Failure::Network);

        let mut writer = ObjectWriter::new(path);
        writer.write(b"012345").await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(store.stats().upload_part, 3);
        assert_eq!(&store.object("b", "obj").unwrap()[..], b"012345");
    }

    #[tokio::test]
    async fn test_part_limit_stops_before_upload() {
        let (store, path) = setup(1);
        let mut writer = ObjectWriter::new(path);

        let err = writer.write(&vec![7u8; MAX_PARTS + 1]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(writer.state(), WriterState::Failed);
        assert_eq!(store.stats().upload_part, MAX_PARTS as u64);

        writer.abort().await.unwrap();
        assert_eq!(store.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_drop_aborts_unfinished_upload() {
        let (store, path) = setup(4);
        {
            let mut writer = ObjectWriter::new(path);
            writer.write(b"0123456789").await.unwrap();
        }

        for _ in 0..10 {
            if store.pending_uploads() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.pending_uploads(), 0);
        assert!(store.object("b", "obj").is_none());
    }

    #[tokio::test]
    async fn test_content_type_is_forwarded() {
        let (store, path) = setup(16);
        let mut writer = ObjectWriter::new(path).with_content_type("text/plain");
        writer.write(b"hi").await.unwrap();
        writer.close().await.unwrap();

        let info = store.head_object("b", "obj").await.unwrap();
        assert_eq!(info.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_complete_receives_parts_in_order() {
        let mut mock = MockObjectStore::new();
        mock.expect_put_object().never();
        mock.expect_create_multipart_upload()
            .times(1)
            .returning(|_, _, _| Ok("u1".to_string()));
        mock.expect_upload_part()
            .times(2)
            .returning(|_, _, _, part_number, _| Ok(format!("e{part_number}")));
        mock.expect_complete_multipart_upload()
            .withf(|bucket, key, upload_id, parts| {
                bucket == "b"
                    && key == "obj"
                    && upload_id == "u1"
                    && parts.len() == 2
                    && parts[0] == CompletedPart::new(1, "e1")
                    && parts[1] == CompletedPart::new(2, "e2")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(Some("final".to_string())));

        let config = StoreConfig::new("mock", Arc::new(mock))
            .with_retry(RetryPolicy::none())
            .with_transfer(TransferOptions {
                part_size: 3,
                ..Default::default()
            })
            .shared();
        let mut writer = ObjectWriter::new(S3Path::new("b", "obj", config));
        writer.write(b"abcde").await.unwrap();
        let summary = writer.close().await.unwrap();

        assert_eq!(summary.etag.as_deref(), Some("final"));
        assert_eq!(summary.parts, 2);
    }
}
