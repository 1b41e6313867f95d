//! head command - Display the first lines of an object
//!
//! Reads through the windowed reader and stops as soon as enough lines have
//! been seen, so only the leading windows of a large object are fetched.

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use bfs_core::{ObjectReader, StoreConfig};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};
use crate::session::remote_path;

/// Display the first lines of an object
#[derive(Args, Debug)]
pub struct HeadArgs {
    /// Object path (s3://bucket/key)
    pub path: String,

    /// Number of lines to print
    #[arg(short = 'n', long, default_value = "10")]
    pub lines: usize,
}

/// Execute the head command
pub async fn execute(args: HeadArgs, output_config: OutputConfig, store: &Arc<StoreConfig>) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let mut stdout = tokio::io::stdout();

    match head(&args, store, &mut stdout).await {
        Ok(_) => ExitCode::Success,
        Err(e) => formatter.fail(&e),
    }
}

async fn head<W>(args: &HeadArgs, store: &Arc<StoreConfig>, out: &mut W) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let path = remote_path(&args.path, store)?;
    let mut reader = path
        .open_reader()
        .await
        .with_context(|| format!("Failed to open {path}"))?;
    let written = copy_lines(&mut reader, args.lines, out)
        .await
        .with_context(|| format!("Failed to read {path}"))?;
    reader.close();
    Ok(written)
}

/// Copy up to `lines` newline-terminated lines (the last may be unterminated)
async fn copy_lines<W>(reader: &mut ObjectReader, lines: usize, out: &mut W) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 64 * 1024];
    let mut remaining = lines;
    let mut written = 0u64;

    while remaining > 0 {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        let mut end = n;
        for (i, _) in buf[..n].iter().enumerate().filter(|(_, b)| **b == b'\n') {
            remaining -= 1;
            if remaining == 0 {
                end = i + 1;
                break;
            }
        }
        out.write_all(&buf[..end]).await?;
        written += end as u64;
    }
    out.flush().await?;
    Ok(written)
}
