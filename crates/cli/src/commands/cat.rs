//! cat command - Display object contents
//!
//! Streams objects to stdout through the windowed reader, so memory use is
//! bounded by the read window regardless of object size.

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use bfs_core::{ObjectReader, StoreConfig};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};
use crate::session::remote_path;

/// Display object contents
#[derive(Args, Debug)]
pub struct CatArgs {
    /// Object paths (s3://bucket/key), printed in order
    #[arg(required = true)]
    pub paths: Vec<String>,
}

/// Execute the cat command
pub async fn execute(args: CatArgs, output_config: OutputConfig, store: &Arc<StoreConfig>) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let mut stdout = tokio::io::stdout();

    for arg in &args.paths {
        if let Err(e) = cat(arg, store, &mut stdout).await {
            return formatter.fail(&e);
        }
    }
    ExitCode::Success
}

async fn cat<W>(arg: &str, store: &Arc<StoreConfig>, out: &mut W) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let path = remote_path(arg, store)?;
    let mut reader = path
        .open_reader()
        .await
        .with_context(|| format!("Failed to open {path}"))?;
    let copied = copy_to_writer(&mut reader, out, &ProgressBar::hidden())
        .await
        .with_context(|| format!("Failed to read {path}"))?;
    reader.close();
    Ok(copied)
}

/// Copy everything left in `reader` to `out`, one window at a time
pub(crate) async fn copy_to_writer<W>(
    reader: &mut ObjectReader,
    out: &mut W,
    progress: &ProgressBar,
) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let chunk = reader
        .path()
        .config()
        .transfer()
        .read_window
        .clamp(1, 1024 * 1024) as usize;
    let mut buf = vec![0u8; chunk];
    let mut copied = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).await?;
        progress.inc(n as u64);
        copied += n as u64;
    }
    out.flush().await?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{memory_store, seed};
    use bfs_core::{ObjectStore, PutOptions};
    use bytes::Bytes;

    #[tokio::test]
    async fn test_cat_streams_whole_object() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &[]).await;
        let body: Vec<u8> = (0..100u8).collect();
        mem.put_object("data", "blob", Bytes::from(body.clone()), &PutOptions::default())
            .await
            .unwrap();

        let mut out = Vec::new();
        let copied = cat("s3://data/blob", &store, &mut out).await.unwrap();

        assert_eq!(copied, 100);
        assert_eq!(out, body);
        // 100 bytes through an 8-byte window
        assert_eq!(mem.stats().get_object, 13);
    }

    #[tokio::test]
    async fn test_cat_empty_object() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &[]).await;
        mem.put_object("data", "empty", Bytes::new(), &PutOptions::default())
            .await
            .unwrap();

        let mut out = Vec::new();
        assert_eq!(cat("s3://data/empty", &store, &mut out).await.unwrap(), 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_cat_missing_object() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &[]).await;

        let mut out = Vec::new();
        let err = cat("s3://data/missing", &store, &mut out).await.unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err), ExitCode::NotFound);
    }

    #[tokio::test]
    async fn test_cat_directory_path_is_usage_error() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &["dir/a"]).await;

        let mut out = Vec::new();
        let err = cat("s3://data/dir/", &store, &mut out).await.unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err), ExitCode::UsageError);
    }
}
