//! Path parsing and manipulation
//!
//! Remote paths have the format `s3://bucket/key`. A key ending in `/` names a
//! directory (a directory marker or an implied prefix); the empty key is the
//! bucket root and is also a directory.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::StoreConfig;

/// URI scheme accepted by [`S3Path::parse`]
pub const SCHEME: &str = "s3";

/// Key delimiter
pub const DELIMITER: char = '/';

/// An immutable bucket + key pair bound to a store configuration
#[derive(Clone)]
pub struct S3Path {
    bucket: String,
    key: String,
    config: Arc<StoreConfig>,
}

impl S3Path {
    /// Create a path from its parts
    ///
    /// Leading slashes are stripped from `key`.
    pub fn new(bucket: impl Into<String>, key: impl AsRef<str>, config: Arc<StoreConfig>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.as_ref().trim_start_matches(DELIMITER).to_string(),
            config,
        }
    }

    /// The root directory of a bucket
    pub fn root(bucket: impl Into<String>, config: Arc<StoreConfig>) -> Self {
        Self::new(bucket, "", config)
    }

    /// Parse `s3://bucket/key` using the installed default configuration
    pub fn parse(uri: &str) -> Result<Self> {
        let (bucket, key) = split_uri(uri)?;
        Ok(Self::new(bucket, key, StoreConfig::default_config()?))
    }

    /// Parse `s3://bucket/key` with an explicit configuration
    pub fn parse_with(uri: &str, config: Arc<StoreConfig>) -> Result<Self> {
        let (bucket, key) = split_uri(uri)?;
        Ok(Self::new(bucket, key, config))
    }

    /// Like [`S3Path::parse`], but returns None instead of an error
    pub fn try_parse(uri: &str) -> Option<Self> {
        Self::parse(uri).ok()
    }

    /// Like [`S3Path::parse_with`], but returns None instead of an error
    pub fn try_parse_with(uri: &str, config: Arc<StoreConfig>) -> Option<Self> {
        Self::parse_with(uri, config).ok()
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &Arc<StoreConfig> {
        &self.config
    }

    /// Whether the key follows the directory convention
    pub fn is_dir_path(&self) -> bool {
        self.key.is_empty() || self.key.ends_with(DELIMITER)
    }

    /// Whether the key names a file-like object
    pub fn is_file_path(&self) -> bool {
        !self.is_dir_path()
    }

    /// Whether this is the bucket root
    pub fn is_root(&self) -> bool {
        self.key.is_empty()
    }

    /// Same bucket and config, different key
    pub fn with_key(&self, key: impl AsRef<str>) -> Self {
        Self::new(self.bucket.clone(), key, self.config.clone())
    }

    /// Same bucket and key, different config
    pub fn with_config(&self, config: Arc<StoreConfig>) -> Self {
        Self {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            config,
        }
    }

    /// This path as a directory (trailing `/` appended if missing)
    pub fn as_dir(&self) -> Self {
        if self.is_dir_path() {
            self.clone()
        } else {
            self.with_key(format!("{}{DELIMITER}", self.key))
        }
    }

    /// Everything after the last `/` of the key
    ///
    /// Empty for directory paths, like POSIX `basename("a/b/")`.
    pub fn basename(&self) -> &str {
        match self.key.rfind(DELIMITER) {
            Some(pos) => &self.key[pos + 1..],
            None => &self.key,
        }
    }

    /// The path up to and including the last `/` of the key
    ///
    /// Directory paths are their own dirname, so
    /// `p.dirname().join(p.basename()) == p` for every path.
    pub fn dirname(&self) -> Self {
        match self.key.rfind(DELIMITER) {
            Some(pos) => self.with_key(&self.key[..=pos]),
            None => self.with_key(""),
        }
    }

    /// The directory one level up, None at the bucket root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(self.split_dir().0)
    }

    /// Append one key segment
    ///
    /// A `/` is inserted between the current key and `segment` when needed;
    /// a segment ending in `/` yields a directory path.
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.trim_start_matches(DELIMITER);
        if segment.is_empty() {
            return self.clone();
        }
        let key = if self.key.is_empty() || self.key.ends_with(DELIMITER) {
            format!("{}{segment}", self.key)
        } else {
            format!("{}{DELIMITER}{segment}", self.key)
        };
        self.with_key(key)
    }

    /// Append several key segments in order
    pub fn join_all<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        segments
            .into_iter()
            .fold(self.clone(), |path, segment| path.join(segment.as_ref()))
    }

    /// Split into the containing directory and the last segment
    ///
    /// Directory paths keep their trailing `/` on the returned segment, so
    /// `s3://b/dir/sub/` splits into (`s3://b/dir/`, `sub/`) and repeated
    /// calls walk up one directory at a time.
    pub fn split_dir(&self) -> (Self, String) {
        let is_dir = self.key.ends_with(DELIMITER);
        let trimmed = if is_dir {
            &self.key[..self.key.len() - 1]
        } else {
            self.key.as_str()
        };

        let (parent, last) = match trimmed.rfind(DELIMITER) {
            Some(pos) => (&trimmed[..=pos], &trimmed[pos + 1..]),
            None => ("", trimmed),
        };

        let last = if is_dir {
            format!("{last}{DELIMITER}")
        } else {
            last.to_string()
        };

        (self.with_key(parent), last)
    }

    /// Key relative to `base`, if this path lives under it
    pub fn strip_prefix(&self, base: &S3Path) -> Option<&str> {
        if self.bucket != base.bucket {
            return None;
        }
        self.key.strip_prefix(base.as_dir().key.as_str())
    }
}

/// Split `s3://bucket/key` into its bucket and key
fn split_uri(uri: &str) -> Result<(&str, &str)> {
    let rest = uri
        .strip_prefix(SCHEME)
        .and_then(|r| r.strip_prefix("://"))
        .ok_or_else(|| {
            Error::InvalidPath(format!("'{uri}' must start with {SCHEME}://"))
        })?;

    let (bucket, key) = rest.split_once(DELIMITER).ok_or_else(|| {
        Error::InvalidPath(format!(
            "'{uri}' has no '/' between bucket and key. Use format: {SCHEME}://bucket/[key]"
        ))
    })?;

    if !is_valid_bucket_name(bucket) {
        return Err(Error::InvalidPath(format!(
            "'{uri}' has an invalid bucket name '{bucket}'"
        )));
    }

    if key.starts_with(DELIMITER) {
        return Err(Error::InvalidPath(format!(
            "'{uri}' has a key starting with '/'"
        )));
    }

    Ok((bucket, key))
}

/// Loose bucket name check: non-empty, no whitespace or separators
fn is_valid_bucket_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
}

impl PartialEq for S3Path {
    fn eq(&self, other: &Self) -> bool {
        self.bucket == other.bucket
            && self.key == other.key
            && Arc::ptr_eq(&self.config, &other.config)
    }
}

impl Eq for S3Path {}

impl Hash for S3Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bucket.hash(state);
        self.key.hash(state);
    }
}

impl fmt::Display for S3Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Debug for S3Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("S3Path")
            .field(&self.to_string())
            .field(&self.config.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn config() -> Arc<StoreConfig> {
        StoreConfig::new("test", Arc::new(MemoryStore::new())).shared()
    }

    fn path(uri: &str) -> S3Path {
        S3Path::parse_with(uri, config()).unwrap()
    }

    #[test]
    fn test_parse_file_path() {
        let p = path("s3://bucket/dir/file.txt");
        assert_eq!(p.bucket(), "bucket");
        assert_eq!(p.key(), "dir/file.txt");
        assert!(p.is_file_path());
        assert!(!p.is_dir_path());
    }

    #[test]
    fn test_parse_dir_path() {
        let p = path("s3://bucket/dir/");
        assert_eq!(p.key(), "dir/");
        assert!(p.is_dir_path());
    }

    #[test]
    fn test_parse_bucket_root() {
        let p = path("s3://bucket/");
        assert_eq!(p.key(), "");
        assert!(p.is_root());
        assert!(p.is_dir_path());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let cfg = config();
        for uri in [
            "",
            "bucket/key",
            "gs://bucket/key",
            "s3:/bucket/key",
            "s3://bucket",
            "s3:///key",
            "s3://bucket//key",
            "s3://bad bucket/key",
        ] {
            let result = S3Path::parse_with(uri, cfg.clone());
            assert!(
                matches!(result, Err(Error::InvalidPath(_))),
                "expected InvalidPath for {uri:?}"
            );
        }
    }

    #[test]
    fn test_try_parse() {
        assert!(S3Path::try_parse_with("s3://bucket/key", config()).is_some());
        assert!(S3Path::try_parse_with("./local/file", config()).is_none());
        assert!(S3Path::try_parse_with("s3://bucket", config()).is_none());
    }

    #[test]
    fn test_new_strips_leading_slash() {
        let p = S3Path::new("bucket", "/a/b", config());
        assert_eq!(p.key(), "a/b");
    }

    #[test]
    fn test_display() {
        assert_eq!(path("s3://bucket/a/b.txt").to_string(), "s3://bucket/a/b.txt");
        assert_eq!(path("s3://bucket/").to_string(), "s3://bucket/");
    }

    #[test]
    fn test_equality_includes_config() {
        let cfg = config();
        let a = S3Path::parse_with("s3://b/k", cfg.clone()).unwrap();
        let b = S3Path::parse_with("s3://b/k", cfg).unwrap();
        let c = S3Path::parse_with("s3://b/k", config()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, a.with_key("other"));
    }

    #[test]
    fn test_basename_dirname() {
        let p = path("s3://bucket/dir/sub/file");
        assert_eq!(p.basename(), "file");
        assert_eq!(p.dirname().key(), "dir/sub/");

        let d = path("s3://bucket/dir/sub/");
        assert_eq!(d.basename(), "");
        assert_eq!(d.dirname().key(), "dir/sub/");

        let top = path("s3://bucket/file");
        assert_eq!(top.basename(), "file");
        assert_eq!(top.dirname().key(), "");
    }

    #[test]
    fn test_join_dirname_basename_roundtrip() {
        for uri in [
            "s3://bucket/dir/sub/file",
            "s3://bucket/dir/sub/",
            "s3://bucket/file",
            "s3://bucket/",
        ] {
            let p = path(uri);
            assert_eq!(p.dirname().join(p.basename()), p, "roundtrip for {uri}");
        }
    }

    #[test]
    fn test_split_dir_walks_up() {
        let p = path("s3://bucket/dir/sub/file");

        let (parent, name) = p.split_dir();
        assert_eq!(parent.to_string(), "s3://bucket/dir/sub/");
        assert_eq!(name, "file");

        let (parent, name) = parent.split_dir();
        assert_eq!(parent.to_string(), "s3://bucket/dir/");
        assert_eq!(name, "sub/");

        let (parent, name) = parent.split_dir();
        assert_eq!(parent.to_string(), "s3://bucket/");
        assert_eq!(name, "dir/");
    }

    #[test]
    fn test_split_dir_rejoins() {
        let p = path("s3://bucket/dir/sub/");
        let (parent, name) = p.split_dir();
        assert_eq!(parent.join(&name), p);
    }

    #[test]
    fn test_parent() {
        let p = path("s3://bucket/a/b/c.txt");
        let parent = p.parent().unwrap();
        assert_eq!(parent.key(), "a/b/");

        let parent = parent.parent().unwrap();
        assert_eq!(parent.key(), "a/");

        let parent = parent.parent().unwrap();
        assert_eq!(parent.key(), "");

        assert!(parent.parent().is_none());
    }

    #[test]
    fn test_join() {
        let root = path("s3://bucket/");
        let dir = root.join("dir/");
        assert_eq!(dir.key(), "dir/");
        assert!(dir.is_dir_path());

        let file = dir.join("file.txt");
        assert_eq!(file.key(), "dir/file.txt");
        assert!(file.is_file_path());

        assert_eq!(path("s3://bucket/a").join("b").key(), "a/b");
        assert_eq!(path("s3://bucket/a/").join("/b").key(), "a/b");
        assert_eq!(root.join_all(["x", "y/", "z"]).key(), "x/y/z");
    }

    #[test]
    fn test_as_dir_and_strip_prefix() {
        let base = path("s3://bucket/data");
        assert_eq!(base.as_dir().key(), "data/");

        let child = path("s3://bucket/data/2024/file.csv");
        assert_eq!(child.strip_prefix(&base), Some("2024/file.csv"));
        assert_eq!(path("s3://other/data/x").strip_prefix(&base), None);
    }
}
