//! pipe command - Stream stdin to an object
//!
//! Input of unknown length goes through the buffered writer: small inputs end
//! up as a single put, larger ones as a multipart upload that is aborted if
//! anything fails.

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};

use bfs_core::{StoreConfig, WriteSummary};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};
use crate::session::remote_path;

const CHUNK: usize = 256 * 1024;

/// Stream stdin to an object
#[derive(Args, Debug)]
pub struct PipeArgs {
    /// Destination path (s3://bucket/key)
    pub target: String,

    /// Content type for the uploaded object
    #[arg(long, default_value = "application/octet-stream")]
    pub content_type: String,
}

#[derive(Debug, Serialize)]
struct PipeOutput {
    target: String,
    size_bytes: u64,
    size_human: String,
    #[serde(flatten)]
    summary: WriteSummary,
}

/// Execute the pipe command
pub async fn execute(args: PipeArgs, output_config: OutputConfig, store: &Arc<StoreConfig>) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let progress = ProgressBar::new(formatter.config(), None, &args.target);
    let mut stdin = tokio::io::stdin();

    let result = pipe(&args, store, &mut stdin, &progress).await;
    progress.finish_and_clear();

    match result {
        Ok(output) => {
            if formatter.is_json() {
                formatter.json(&output);
            } else {
                formatter.success(&format!("{} ({})", output.target, output.size_human));
            }
            ExitCode::Success
        }
        Err(e) => formatter.fail(&e),
    }
}

async fn pipe<R>(
    args: &PipeArgs,
    store: &Arc<StoreConfig>,
    input: &mut R,
    progress: &ProgressBar,
) -> anyhow::Result<PipeOutput>
where
    R: AsyncRead + Unpin,
{
    let path = remote_path(&args.target, store)?;
    let mut writer = path.open_writer()?.with_content_type(args.content_type.clone());

    let mut buf = vec![0u8; CHUNK];
    let result: anyhow::Result<WriteSummary> = async {
        loop {
            let n = input.read(&mut buf).await.context("Failed to read stdin")?;
            if n == 0 {
                break;
            }
            writer.write(&buf[..n]).await?;
            progress.inc(n as u64);
        }
        Ok(writer.close().await?)
    }
    .await;

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(abort_err) = writer.abort().await {
                tracing::warn!(path = %path, error = %abort_err, "Failed to abort upload");
            }
            return Err(e.context(format!("Failed to write {path}")));
        }
    };

    Ok(PipeOutput {
        target: path.to_string(),
        size_bytes: summary.bytes_written,
        size_human: humansize::format_size(summary.bytes_written, humansize::BINARY),
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{memory_store, seed};
    use bfs_core::memory::{Failure, StoreOp};

    fn args(target: &str) -> PipeArgs {
        PipeArgs {
            target: target.to_string(),
            content_type: "text/plain".to_string(),
        }
    }

    #[tokio::test]
    async fn test_pipe_small_input_single_put() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &[]).await;

        let mut input: &[u8] = b"hello";
        let output = pipe(&args("s3://data/greeting"), &store, &mut input, &ProgressBar::hidden())
            .await
            .unwrap();

        assert!(!output.summary.multipart);
        assert_eq!(output.size_bytes, 5);
        assert_eq!(mem.object("data", "greeting").unwrap(), "hello");
        assert_eq!(mem.stats().put_object, 1);
    }

    #[tokio::test]
    async fn test_pipe_large_input_multipart() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &[]).await;

        let body: Vec<u8> = (0..50u8).collect();
        let mut input: &[u8] = &body;
        let output = pipe(&args("s3://data/stream"), &store, &mut input, &ProgressBar::hidden())
            .await
            .unwrap();

        assert!(output.summary.multipart);
        assert_eq!(output.summary.parts, 4);
        assert_eq!(mem.object("data", "stream").unwrap(), body);
    }

    #[tokio::test]
    async fn test_pipe_failure_aborts_upload() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &[]).await;
        mem.fail_next(StoreOp::CompleteMultipartUpload, 1, Failure::Request);

        let body = vec![3u8; 40];
        let mut input: &[u8] = &body;
        let err = pipe(&args("s3://data/stream"), &store, &mut input, &ProgressBar::hidden())
            .await
            .unwrap_err();

        assert_eq!(ExitCode::from_anyhow(&err), ExitCode::GeneralError);
        assert_eq!(mem.stats().abort_multipart_upload, 1);
        assert_eq!(mem.pending_uploads(), 0);
        assert!(mem.object("data", "stream").is_none());
    }
}
