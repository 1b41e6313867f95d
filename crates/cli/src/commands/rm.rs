//! rm command - Remove objects
//!
//! Deletes one object, or with `-r` every object below a directory.

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Serialize;

use bfs_core::{Error, StoreConfig};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};
use crate::session::remote_path;

/// Remove objects
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Paths to remove (s3://bucket/key)
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Remove everything below a directory path
    #[arg(short, long)]
    pub recursive: bool,

    /// Ignore objects that do not exist
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct RmOutput {
    path: String,
    deleted: usize,
}

/// Execute the rm command
pub async fn execute(args: RmArgs, output_config: OutputConfig, store: &Arc<StoreConfig>) -> ExitCode {
    let formatter = Formatter::new(output_config);

    for arg in &args.paths {
        match remove(arg, &args, store).await {
            Ok(output) if formatter.is_json() => formatter.json(&output),
            Ok(output) => formatter.success(&format!(
                "Removed {} ({} object(s))",
                output.path, output.deleted
            )),
            Err(e) => return formatter.fail(&e),
        }
    }
    ExitCode::Success
}

async fn remove(arg: &str, args: &RmArgs, store: &Arc<StoreConfig>) -> anyhow::Result<RmOutput> {
    let path = remote_path(arg, store)?;

    if path.is_dir_path() {
        if !args.recursive {
            return Err(Error::InvalidArgument(format!(
                "{path} is a directory. Use -r/--recursive to remove it."
            ))
            .into());
        }
        let deleted = path
            .remove_all()
            .await
            .with_context(|| format!("Failed to remove {path}"))?;
        if deleted == 0 && !args.force {
            return Err(Error::NotFound(path.to_string()).into());
        }
        return Ok(RmOutput {
            path: path.to_string(),
            deleted,
        });
    }

    // Deleting a missing key succeeds on S3, so check first
    if !args.force && !path.exists().await? {
        return Err(Error::NotFound(path.to_string()).into());
    }
    path.remove()
        .await
        .with_context(|| format!("Failed to remove {path}"))?;

    Ok(RmOutput {
        path: path.to_string(),
        deleted: 1,
    })
}
