//! In-memory object store
//!
//! A faithful-enough S3 stand-in: buckets must exist, listings paginate with
//! continuation tokens and group by delimiter, multipart uploads stage parts
//! until they are completed or aborted. Every call is counted so callers can
//! assert how many requests an operation made, and failures can be queued per
//! operation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use md5::{Digest, Md5};

use crate::error::{Error, Result};
use crate::traits::{CompletedPart, ListOptions, ListPage, ObjectInfo, ObjectStore, PutOptions};

/// Default maximum number of entries per listing page (same as S3)
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Store operations, used for call accounting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    HeadObject,
    GetObject,
    PutObject,
    DeleteObject,
    CreateMultipartUpload,
    UploadPart,
    CompleteMultipartUpload,
    AbortMultipartUpload,
    CopyObject,
    ListObjects,
}

/// Kind of failure to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Transient, retried by the default policy
    Network,
    /// Permanent rejection
    Request,
}

impl Failure {
    fn to_error(self, op: StoreOp) -> Error {
        match self {
            Failure::Network => Error::Network(format!("injected failure in {op:?}")),
            Failure::Request => Error::Request(format!("injected rejection in {op:?}")),
        }
    }
}

/// Number of calls made per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub head_object: u64,
    pub get_object: u64,
    pub put_object: u64,
    pub delete_object: u64,
    pub create_multipart_upload: u64,
    pub upload_part: u64,
    pub complete_multipart_upload: u64,
    pub abort_multipart_upload: u64,
    pub copy_object: u64,
    pub list_objects: u64,
}

impl CallStats {
    fn bump(&mut self, op: StoreOp) {
        let counter = match op {
            StoreOp::HeadObject => &mut self.head_object,
            StoreOp::GetObject => &mut self.get_object,
            StoreOp::PutObject => &mut self.put_object,
            StoreOp::DeleteObject => &mut self.delete_object,
            StoreOp::CreateMultipartUpload => &mut self.create_multipart_upload,
            StoreOp::UploadPart => &mut self.upload_part,
            StoreOp::CompleteMultipartUpload => &mut self.complete_multipart_upload,
            StoreOp::AbortMultipartUpload => &mut self.abort_multipart_upload,
            StoreOp::CopyObject => &mut self.copy_object,
            StoreOp::ListObjects => &mut self.list_objects,
        };
        *counter += 1;
    }
}

/// One `upload_part` call that reached the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    pub upload_id: String,
    pub part_number: i32,
    pub size: usize,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    content_type: Option<String>,
    last_modified: jiff::Timestamp,
}

impl StoredObject {
    fn info(&self, key: &str) -> ObjectInfo {
        let mut info = ObjectInfo::file(key, self.data.len() as i64);
        info.etag = Some(self.etag.clone());
        info.content_type = self.content_type.clone();
        info.last_modified = Some(self.last_modified);
        info
    }
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    content_type: Option<String>,
    parts: BTreeMap<i32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    uploads: HashMap<String, PendingUpload>,
    next_upload: u64,
    stats: CallStats,
    parts: Vec<PartRecord>,
    failures: HashMap<StoreOp, Vec<Failure>>,
}

/// Thread-safe in-memory [`ObjectStore`]
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store without buckets
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Add a bucket
    pub fn with_bucket(self, bucket: impl Into<String>) -> Self {
        self.create_bucket(bucket);
        self
    }

    /// Cap listing pages at `page_size` entries
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Create a bucket if it does not exist
    pub fn create_bucket(&self, bucket: impl Into<String>) {
        self.lock().buckets.entry(bucket.into()).or_default();
    }

    /// Snapshot of the call counters
    pub fn stats(&self) -> CallStats {
        self.lock().stats
    }

    /// Every part upload seen so far, in arrival order
    pub fn part_log(&self) -> Vec<PartRecord> {
        self.lock().parts.clone()
    }

    /// Number of multipart uploads neither completed nor aborted
    pub fn pending_uploads(&self) -> usize {
        self.lock().uploads.len()
    }

    /// Keys stored in a bucket, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Raw object content, bypassing call accounting
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.data.clone())
    }

    /// Make the next `count` calls of `op` fail with `failure`
    pub fn fail_next(&self, op: StoreOp, count: usize, failure: Failure) {
        self.lock()
            .failures
            .entry(op)
            .or_default()
            .extend(std::iter::repeat_n(failure, count));
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call and pop an injected failure, if any
    fn enter(&self, op: StoreOp) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.stats.bump(op);
        let injected = state
            .failures
            .get_mut(&op)
            .filter(|queue| !queue.is_empty())
            .map(|queue| queue.remove(0));
        match injected {
            Some(failure) => Err(failure.to_error(op)),
            None => Ok(state),
        }
    }
}

impl State {
    fn bucket(&self, bucket: &str) -> Result<&BTreeMap<String, StoredObject>> {
        self.buckets
            .get(bucket)
            .ok_or_else(|| Error::NotFound(format!("Bucket not found: {bucket}")))
    }

    fn bucket_mut(&mut self, bucket: &str) -> Result<&mut BTreeMap<String, StoredObject>> {
        self.buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::NotFound(format!("Bucket not found: {bucket}")))
    }

    fn object(&self, bucket: &str, key: &str) -> Result<&StoredObject> {
        self.bucket(bucket)?
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("Object not found: {bucket}/{key}")))
    }

    fn upload(&mut self, bucket: &str, key: &str, upload_id: &str) -> Result<&mut PendingUpload> {
        match self.uploads.get_mut(upload_id) {
            Some(upload) if upload.bucket == bucket && upload.key == key => Ok(upload),
            _ => Err(Error::NotFound(format!("Upload not found: {upload_id}"))),
        }
    }
}

/// Quoted hex MD5 of the payload, as S3 reports for single puts and parts
fn etag_for(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Md5::digest(data)))
}

/// MD5 over the concatenated part digests, suffixed with the part count
fn multipart_etag<'a>(part_etags: impl IntoIterator<Item = &'a str>) -> String {
    let mut combined = Vec::new();
    let mut count = 0;
    for etag in part_etags {
        if let Ok(digest) = hex::decode(etag.trim_matches('"')) {
            combined.extend_from_slice(&digest);
        }
        count += 1;
    }
    format!("\"{}-{count}\"", hex::encode(Md5::digest(&combined)))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        let state = self.enter(StoreOp::HeadObject)?;
        Ok(state.object(bucket, key)?.info(key))
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<Range<u64>>,
    ) -> Result<Bytes> {
        let state = self.enter(StoreOp::GetObject)?;
        let data = &state.object(bucket, key)?.data;

        let Some(range) = range else {
            return Ok(data.clone());
        };
        let len = data.len() as u64;
        if range.start >= range.end || range.start >= len {
            return Err(Error::Request(format!(
                "InvalidRange: {}..{} of {len} bytes",
                range.start, range.end
            )));
        }
        let end = range.end.min(len);
        Ok(data.slice(range.start as usize..end as usize))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<ObjectInfo> {
        let mut state = self.enter(StoreOp::PutObject)?;
        let object = StoredObject {
            etag: etag_for(&data),
            data,
            content_type: options.content_type.clone(),
            last_modified: jiff::Timestamp::now(),
        };
        let info = object.info(key);
        state.bucket_mut(bucket)?.insert(key.to_string(), object);
        Ok(info)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut state = self.enter(StoreOp::DeleteObject)?;
        state.bucket_mut(bucket)?.remove(key);
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        options: &PutOptions,
    ) -> Result<String> {
        let mut state = self.enter(StoreOp::CreateMultipartUpload)?;
        state.bucket(bucket)?;

        state.next_upload += 1;
        let upload_id = format!("upload-{}", state.next_upload);
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                content_type: options.content_type.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let mut state = self.enter(StoreOp::UploadPart)?;
        if !(1..=10_000).contains(&part_number) {
            return Err(Error::Request(format!("InvalidArgument: part number {part_number}")));
        }

        let etag = etag_for(&data);
        let size = data.len();
        state
            .upload(bucket, key, upload_id)?
            .parts
            .insert(part_number, (etag.clone(), data));
        state.parts.push(PartRecord {
            upload_id: upload_id.to_string(),
            part_number,
            size,
        });
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<Option<String>> {
        let mut state = self.enter(StoreOp::CompleteMultipartUpload)?;
        if parts.is_empty() {
            return Err(Error::Request("MalformedXML: no parts".into()));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(Error::Request("InvalidPartOrder".into()));
        }

        let upload = state.upload(bucket, key, upload_id)?;
        let mut data = BytesMut::new();
        for part in parts {
            match upload.parts.get(&part.part_number) {
                Some((etag, bytes)) if *etag == part.etag => data.extend_from_slice(bytes),
                _ => {
                    return Err(Error::Request(format!(
                        "InvalidPart: part {} of {upload_id}",
                        part.part_number
                    )));
                }
            }
        }

        let content_type = upload.content_type.clone();
        state.uploads.remove(upload_id);

        let data = data.freeze();
        let etag = multipart_etag(parts.iter().map(|p| p.etag.as_str()));
        let object = StoredObject {
            data,
            etag: etag.clone(),
            content_type,
            last_modified: jiff::Timestamp::now(),
        };
        state.bucket_mut(bucket)?.insert(key.to_string(), object);
        Ok(Some(etag))
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        let mut state = self.enter(StoreOp::AbortMultipartUpload)?;
        state.upload(bucket, key, upload_id)?;
        state.uploads.remove(upload_id);
        Ok(())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        let mut state = self.enter(StoreOp::CopyObject)?;
        let mut object = state.object(src_bucket, src_key)?.clone();
        object.last_modified = jiff::Timestamp::now();
        state
            .bucket_mut(dst_bucket)?
            .insert(dst_key.to_string(), object);
        Ok(())
    }

    async fn list_objects_v2(&self, bucket: &str, options: ListOptions) -> Result<ListPage> {
        let state = self.enter(StoreOp::ListObjects)?;
        let objects = state.bucket(bucket)?;
        let prefix = options.prefix.as_deref().unwrap_or("");
        let delimiter = options.delimiter.as_deref().filter(|d| !d.is_empty());

        // S3 orders keys and common prefixes together and pages over both
        let mut entries: BTreeSet<(String, bool)> = BTreeSet::new();
        for key in objects.keys().filter(|k| k.starts_with(prefix)) {
            let rest = &key[prefix.len()..];
            match delimiter.and_then(|d| rest.find(d).map(|i| i + d.len())) {
                Some(end) => entries.insert((format!("{prefix}{}", &rest[..end]), true)),
                None => entries.insert((key.clone(), false)),
            };
        }

        let limit = options
            .max_keys
            .map(|n| n.max(1) as usize)
            .unwrap_or(self.page_size)
            .min(self.page_size);
        let start = options.continuation_token.as_deref();
        let mut remaining = entries
            .into_iter()
            .filter(|(name, _)| start.is_none_or(|token| name.as_str() > token));

        let mut page = ListPage::default();
        let mut last = None;
        for (name, is_prefix) in remaining.by_ref().take(limit) {
            if is_prefix {
                page.common_prefixes.push(name.clone());
            } else if let Some(object) = objects.get(&name) {
                page.contents.push(object.info(&name));
            }
            last = Some(name);
        }
        if remaining.next().is_some() {
            page.next_continuation_token = last;
        }
        Ok(page)
    }
}
