//! bfs-s3: S3 SDK adapter for bucketfs
//!
//! Implements the ObjectStore trait from bfs-core on top of aws-sdk-s3. It
//! is the only crate that depends on the AWS SDK directly.

pub mod client;

pub use client::S3Client;
