//! bfs-core: filesystem-style access to S3-compatible object storage
//!
//! This crate provides:
//! - `S3Path`, an `s3://bucket/key` path bound to a store configuration
//! - Buffered streaming writers that switch to multipart uploads on demand
//! - Windowed readers backed by ranged GETs
//! - Directory listings aggregated over paginated, delimiter-based listings
//! - Retry policies, configuration files and aliases
//!
//! Everything talks to storage through the [`ObjectStore`] trait, so the S3
//! adapter and the in-memory store are interchangeable.

pub mod alias;
mod buffer;
pub mod config;
pub mod error;
pub mod fs;
pub mod listing;
pub mod memory;
pub mod multipart;
pub mod path;
pub mod reader;
pub mod retry;
pub mod store;
pub mod traits;
pub mod writer;

pub use alias::{Alias, AliasManager, TimeoutConfig};
pub use config::{Config, ConfigManager};
pub use error::{Error, Result};
pub use fs::{ObjectHandle, OpenMode, Presence};
pub use listing::ReadDirOptions;
pub use memory::MemoryStore;
pub use multipart::TransferOptions;
pub use path::S3Path;
pub use reader::ObjectReader;
pub use retry::{RetryOn, RetryPolicy, retry_with_backoff};
pub use store::StoreConfig;
pub use traits::{CompletedPart, ListOptions, ListPage, ObjectInfo, ObjectStore, PutOptions};
pub use writer::{ObjectWriter, WriteSummary, WriterState};
