//! ls command - List the entries of a directory
//!
//! Shows the immediate children of a directory path, sorted by name.
//! Subdirectories keep their trailing `/`.

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use comfy_table::{Table, presets};
use serde::Serialize;

use bfs_core::{ReadDirOptions, StoreConfig};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};
use crate::session::remote_path;

/// List the entries of a directory
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Remote directory (s3://bucket/prefix/); a trailing '/' is implied
    pub path: String,

    /// Show size and modification time
    #[arg(short, long)]
    pub long: bool,

    /// Only show entries whose name matches this glob (e.g. "*.csv")
    #[arg(long)]
    pub pattern: Option<String>,
}

/// Output structure for ls command (JSON format)
#[derive(Debug, Serialize)]
struct LsOutput {
    path: String,
    entries: Vec<LsEntry>,
}

#[derive(Debug, Serialize)]
struct LsEntry {
    name: String,
    is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<jiff::Timestamp>,
}

/// Execute the ls command
pub async fn execute(args: LsArgs, output_config: OutputConfig, store: &Arc<StoreConfig>) -> ExitCode {
    let formatter = Formatter::new(output_config);

    match list(&args, store).await {
        Ok(output) => {
            print(&output, args.long, &formatter);
            ExitCode::Success
        }
        Err(e) => formatter.fail(&e),
    }
}

async fn list(args: &LsArgs, store: &Arc<StoreConfig>) -> anyhow::Result<LsOutput> {
    let dir = remote_path(&args.path, store)?.as_dir();
    let pattern = args
        .pattern
        .as_deref()
        .map(glob::Pattern::new)
        .transpose()
        .context("Invalid --pattern")?;

    let entries = dir
        .read_dir_entries(&ReadDirOptions::sorted())
        .await
        .with_context(|| format!("Failed to list {dir}"))?;

    let entries = entries
        .into_iter()
        .filter(|(name, _)| {
            pattern
                .as_ref()
                .is_none_or(|p| p.matches(name.trim_end_matches('/')))
        })
        .map(|(name, info)| LsEntry {
            name,
            is_dir: info.is_dir,
            size_bytes: info.size_bytes,
            size_human: info.size_human,
            last_modified: info.last_modified,
        })
        .collect();

    Ok(LsOutput {
        path: dir.to_string(),
        entries,
    })
}

fn print(output: &LsOutput, long: bool, formatter: &Formatter) {
    if formatter.is_json() {
        formatter.json(output);
        return;
    }

    if !long {
        for entry in &output.entries {
            if entry.is_dir {
                formatter.println(&formatter.dir_name(&entry.name));
            } else {
                formatter.println(&entry.name);
            }
        }
        return;
    }

    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_header(vec!["Modified", "Size", "Name"]);
    for entry in &output.entries {
        let date = entry
            .last_modified
            .map(|d| d.strftime("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let size = entry.size_human.clone().unwrap_or_else(|| "-".to_string());
        let name = if entry.is_dir {
            formatter.dir_name(&entry.name)
        } else {
            entry.name.clone()
        };
        table.add_row(vec![date, size, name]);
    }
    formatter.println(&table.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{memory_store, seed};

    fn args(path: &str, pattern: Option<&str>) -> LsArgs {
        LsArgs {
            path: path.to_string(),
            long: false,
            pattern: pattern.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_list_children_sorted() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &["logs/a.log", "logs/old/b.log", "logs/c.csv", "other"]).await;

        let output = list(&args("s3://data/logs", None), &store).await.unwrap();
        let names: Vec<&str> = output.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(output.path, "s3://data/logs/");
        assert_eq!(names, vec!["a.log", "c.csv", "old/"]);
        assert!(output.entries[2].is_dir);
    }

    #[tokio::test]
    async fn test_list_with_pattern() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &["logs/a.log", "logs/logs-old/x", "logs/c.csv"]).await;

        let output = list(&args("s3://data/logs/", Some("*log*")), &store)
            .await
            .unwrap();
        let names: Vec<&str> = output.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.log", "logs-old/"]);
    }

    #[tokio::test]
    async fn test_list_json_shape() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &["dir/sub/x"]).await;

        let output = list(&args("s3://data/dir/", None), &store).await.unwrap();
        insta::assert_json_snapshot!(output, @r#"
        {
          "path": "s3://data/dir/",
          "entries": [
            {
              "name": "sub/",
              "is_dir": true
            }
          ]
        }
        "#);
    }

    #[tokio::test]
    async fn test_list_missing_bucket_is_not_found() {
        let (_mem, store) = memory_store();
        let err = list(&args("s3://nope/", None), &store).await.unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err), ExitCode::NotFound);
    }

    #[tokio::test]
    async fn test_list_bad_pattern_is_general_error() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &["a"]).await;
        let err = list(&args("s3://data/", Some("[")), &store).await.unwrap_err();
        assert!(err.to_string().contains("Invalid --pattern"));
    }
}
