//! mv command - Move objects within the store
//!
//! A move is a server-side copy followed by a delete of the source.

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Serialize;

use bfs_core::{Error, S3Path, StoreConfig};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};
use crate::session::{is_remote, remote_path};

/// Move objects (copy + delete source)
#[derive(Args, Debug)]
pub struct MvArgs {
    /// Source path (s3://bucket/key)
    pub source: String,

    /// Destination path (s3://bucket/key); a trailing '/' moves into it
    pub target: String,

    /// Move every object below a directory
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Debug, Serialize)]
struct MvOutput {
    source: String,
    target: String,
    moved: usize,
}

/// Execute the mv command
pub async fn execute(args: MvArgs, output_config: OutputConfig, store: &Arc<StoreConfig>) -> ExitCode {
    let formatter = Formatter::new(output_config);

    match move_objects(&args, store).await {
        Ok(output) => {
            if formatter.is_json() {
                formatter.json(&output);
            } else {
                formatter.success(&format!(
                    "{} -> {} ({} object(s))",
                    output.source, output.target, output.moved
                ));
            }
            ExitCode::Success
        }
        Err(e) => formatter.fail(&e),
    }
}

async fn move_objects(args: &MvArgs, store: &Arc<StoreConfig>) -> anyhow::Result<MvOutput> {
    if !is_remote(&args.source) || !is_remote(&args.target) {
        return Err(Error::InvalidArgument(
            "mv only moves objects within the store; use cp for local files".into(),
        )
        .into());
    }
    let src = remote_path(&args.source, store)?;
    let dst = remote_path(&args.target, store)?;

    let moved = if src.is_file_path() {
        let target = if dst.is_dir_path() {
            dst.join(src.basename())
        } else {
            dst.clone()
        };
        rename(&src, &target).await?;
        1
    } else if args.recursive {
        move_tree(&src, &dst.as_dir()).await?
    } else {
        return Err(Error::InvalidArgument(format!(
            "{src} is a directory. Use -r/--recursive to move it."
        ))
        .into());
    };

    Ok(MvOutput {
        source: src.to_string(),
        target: dst.to_string(),
        moved,
    })
}

async fn rename(src: &S3Path, dst: &S3Path) -> anyhow::Result<()> {
    src.rename_to(dst)
        .await
        .with_context(|| format!("Failed to move {src} to {dst}"))
}

async fn move_tree(src: &S3Path, dst: &S3Path) -> anyhow::Result<usize> {
    let objects = src.walk().await.with_context(|| format!("Failed to list {src}"))?;
    let mut moved = 0;

    for (path, _) in &objects {
        let Some(relative) = path.strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative);
        if path.is_dir_path() {
            if !target.is_root() {
                target.create_dir().await?;
            }
            path.remove().await?;
        } else {
            rename(path, &target).await?;
        }
        moved += 1;
    }
    Ok(moved)
}
