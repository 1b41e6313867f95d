//! mkdir command - Create a directory marker

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Serialize;

use bfs_core::StoreConfig;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};
use crate::session::remote_path;

/// Create a directory marker
#[derive(Args, Debug)]
pub struct MkdirArgs {
    /// Directory path (s3://bucket/prefix/); a trailing '/' is implied
    pub path: String,
}

#[derive(Debug, Serialize)]
struct MkdirOutput {
    path: String,
    created: bool,
}

/// Execute the mkdir command
pub async fn execute(args: MkdirArgs, output_config: OutputConfig, store: &Arc<StoreConfig>) -> ExitCode {
    let formatter = Formatter::new(output_config);

    match mkdir(&args, store).await {
        Ok(output) if formatter.is_json() => {
            formatter.json(&output);
            ExitCode::Success
        }
        Ok(output) if output.created => {
            formatter.success(&format!("Created {}", output.path));
            ExitCode::Success
        }
        Ok(output) => {
            formatter.warning(&format!("{} already exists", output.path));
            ExitCode::Success
        }
        Err(e) => formatter.fail(&e),
    }
}

async fn mkdir(args: &MkdirArgs, store: &Arc<StoreConfig>) -> anyhow::Result<MkdirOutput> {
    let path = remote_path(&args.path, store)?.as_dir();
    let created = !path.exists().await?;
    if created {
        path.create_dir()
            .await
            .with_context(|| format!("Failed to create {path}"))?;
    }

    Ok(MkdirOutput {
        path: path.to_string(),
        created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{memory_store, seed};

    #[tokio::test]
    async fn test_mkdir_creates_marker_once() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &[]).await;
        let args = MkdirArgs {
            path: "s3://data/logs".into(),
        };

        let output = mkdir(&args, &store).await.unwrap();
        insta::assert_json_snapshot!(output, @r#"
        {
          "path": "s3://data/logs/",
          "created": true
        }
        "#);
        assert_eq!(mem.object("data", "logs/").unwrap().len(), 0);

        let output = mkdir(&args, &store).await.unwrap();
        assert!(!output.created);
        assert_eq!(mem.stats().put_object, 1);
    }

    #[tokio::test]
    async fn test_mkdir_bucket_root_exists() {
        let (mem, store) = memory_store();
        seed(&mem, "data", &["x"]).await;
        let args = MkdirArgs {
            path: "s3://data/".into(),
        };

        // The root always exists, so nothing is created
        let output = mkdir(&args, &store).await.unwrap();
        assert!(!output.created);
    }
}
