//! stat command - Show object metadata

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Serialize;

use bfs_core::StoreConfig;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};
use crate::session::remote_path;

/// Show object metadata
#[derive(Args, Debug)]
pub struct StatArgs {
    /// Object or directory path (s3://bucket/key)
    pub path: String,
}

#[derive(Debug, Serialize)]
struct StatOutput {
    path: String,
    is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<jiff::Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_class: Option<String>,
}

/// Execute the stat command
pub async fn execute(args: StatArgs, output_config: OutputConfig, store: &Arc<StoreConfig>) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let output = match stat(&args, store).await {
        Ok(output) => output,
        Err(e) => return formatter.fail(&e),
    };

    if formatter.is_json() {
        formatter.json(&output);
        return ExitCode::Success;
    }

    formatter.println(&format!("Name      : {}", output.path));
    formatter.println(&format!(
        "Type      : {}",
        if output.is_dir { "directory" } else { "file" }
    ));
    if let Some(modified) = output.last_modified {
        formatter.println(&format!(
            "Date      : {}",
            modified.strftime("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    if let (Some(size), Some(human)) = (output.size_bytes, &output.size_human) {
        formatter.println(&format!("Size      : {human} ({size} bytes)"));
    }
    if let Some(etag) = &output.etag {
        formatter.println(&format!("ETag      : {etag}"));
    }
    if let Some(ct) = &output.content_type {
        formatter.println(&format!("Content   : {ct}"));
    }
    if let Some(sc) = &output.storage_class {
        formatter.println(&format!("Class     : {sc}"));
    }
    ExitCode::Success
}

async fn stat(args: &StatArgs, store: &Arc<StoreConfig>) -> anyhow::Result<StatOutput> {
    let path = remote_path(&args.path, store)?;
    let info = path
        .metadata()
        .await
        .with_context(|| format!("Failed to stat {path}"))?;

    Ok(StatOutput {
        path: path.to_string(),
        is_dir: info.is_dir,
        last_modified: info.last_modified,
        size_bytes: info.size_bytes,
        size_human: info.size_human,
        etag: info.etag,
        content_type: info.content_type,
        storage_class: info.storage_class,
    })
}
