//! cp command - Copy objects
//!
//! Copies between the local filesystem and the store, or within the store.
//! Uploads stream through the buffered writer (switching to multipart once a
//! part fills), downloads stream through the windowed reader and
//! store-to-store copies are server-side.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use tokio::io::AsyncReadExt;

use bfs_core::{Error, ObjectWriter, S3Path, StoreConfig, WriteSummary};

use super::cat::copy_to_writer;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};
use crate::session::{is_remote, remote_path};

const UPLOAD_CHUNK: usize = 1024 * 1024;

/// Copy objects
#[derive(Args, Debug)]
pub struct CpArgs {
    /// Source path (local path or s3://bucket/key)
    pub source: String,

    /// Destination path (local path or s3://bucket/key); a trailing '/' copies into it
    pub target: String,

    /// Copy directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Content type for uploaded files (guessed from the extension otherwise)
    #[arg(long)]
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct CpOutput {
    source: String,
    target: String,
    files: usize,
    size_bytes: u64,
    size_human: String,
}

/// Files and bytes moved by one command
#[derive(Debug, Default)]
struct Transferred {
    files: usize,
    bytes: u64,
}

impl Transferred {
    fn add(&mut self, bytes: u64) {
        self.files += 1;
        self.bytes += bytes;
    }
}

enum Location {
    Local(PathBuf),
    Remote(S3Path),
}

fn location(arg: &str, store: &Arc<StoreConfig>) -> anyhow::Result<Location> {
    if is_remote(arg) {
        Ok(Location::Remote(remote_path(arg, store)?))
    } else {
        Ok(Location::Local(PathBuf::from(arg)))
    }
}

/// Execute the cp command
pub async fn execute(args: CpArgs, output_config: OutputConfig, store: &Arc<StoreConfig>) -> ExitCode {
    let formatter = Formatter::new(output_config);

    match copy(&args, store, formatter.config()).await {
        Ok(done) => {
            let output = CpOutput {
                source: args.source.clone(),
                target: args.target.clone(),
                files: done.files,
                size_bytes: done.bytes,
                size_human: humansize::format_size(done.bytes, humansize::BINARY),
            };
            if formatter.is_json() {
                formatter.json(&output);
            } else {
                formatter.success(&format!(
                    "{} -> {} ({} file(s), {})",
                    output.source, output.target, output.files, output.size_human
                ));
            }
            ExitCode::Success
        }
        Err(e) => formatter.fail(&e),
    }
}

async fn copy(
    args: &CpArgs,
    store: &Arc<StoreConfig>,
    output: &OutputConfig,
) -> anyhow::Result<Transferred> {
    let source = location(&args.source, store)?;
    let target = location(&args.target, store)?;

    match (source, target) {
        (Location::Local(src), Location::Remote(dst)) => upload(&src, &dst, args, output).await,
        (Location::Remote(src), Location::Local(dst)) => download(&src, &dst, args, output).await,
        (Location::Remote(src), Location::Remote(dst)) => copy_remote(&src, &dst, args).await,
        (Location::Local(_), Location::Local(_)) => Err(Error::InvalidArgument(
            "Cannot copy between two local paths. Use the system cp command.".into(),
        )
        .into()),
    }
}

fn needs_recursive(what: &str) -> anyhow::Error {
    Error::InvalidArgument(format!("{what} is a directory. Use -r/--recursive to copy it.")).into()
}

async fn upload(
    src: &Path,
    dst: &S3Path,
    args: &CpArgs,
    output: &OutputConfig,
) -> anyhow::Result<Transferred> {
    let mut done = Transferred::default();

    if !src.is_dir() {
        let target = if dst.is_dir_path() {
            let name = src
                .file_name()
                .with_context(|| format!("{} has no file name", src.display()))?;
            dst.join(&name.to_string_lossy())
        } else {
            dst.clone()
        };
        let bytes = upload_file(src, &target, args.content_type.as_deref(), output).await?;
        done.add(bytes);
        return Ok(done);
    }

    if !args.recursive {
        return Err(needs_recursive(&src.display().to_string()));
    }

    let root = dst.as_dir();
    for (file, relative) in local_files(src)? {
        let target = root.join(&relative);
        let bytes = upload_file(&file, &target, args.content_type.as_deref(), output).await?;
        done.add(bytes);
    }
    Ok(done)
}

/// Every regular file below `root` with its `/`-separated relative path, sorted
fn local_files(root: &Path) -> anyhow::Result<Vec<(PathBuf, String)>> {
    fn visit(dir: &Path, prefix: &str, out: &mut Vec<(PathBuf, String)>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = format!("{prefix}{name}");
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                visit(&entry.path(), &format!("{relative}/"), out)?;
            } else if file_type.is_file() {
                out.push((entry.path(), relative));
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    visit(root, "", &mut files).with_context(|| format!("Failed to read {}", root.display()))?;
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

async fn upload_file(
    src: &Path,
    dst: &S3Path,
    content_type: Option<&str>,
    output: &OutputConfig,
) -> anyhow::Result<u64> {
    let mut file = tokio::fs::File::open(src)
        .await
        .with_context(|| format!("Failed to open {}", src.display()))?;
    let size = file.metadata().await?.len();

    let content_type = content_type
        .map(str::to_string)
        .or_else(|| mime_guess::from_path(src).first().map(|m| m.essence_str().to_string()));
    let mut writer = dst.open_writer()?;
    if let Some(content_type) = content_type {
        writer = writer.with_content_type(content_type);
    }

    let progress = ProgressBar::new(output, Some(size), &dst.to_string());
    let result = stream_file(&mut file, &mut writer, &progress).await;
    progress.finish_and_clear();

    match result {
        Ok(summary) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst,
                bytes = summary.bytes_written,
                parts = summary.parts,
                "Uploaded file"
            );
            Ok(summary.bytes_written)
        }
        Err(e) => {
            if let Err(abort_err) = writer.abort().await {
                tracing::warn!(dst = %dst, error = %abort_err, "Failed to abort upload");
            }
            Err(e.context(format!("Failed to upload {} to {dst}", src.display())))
        }
    }
}

async fn stream_file(
    file: &mut tokio::fs::File,
    writer: &mut ObjectWriter,
    progress: &ProgressBar,
) -> anyhow::Result<WriteSummary> {
    let mut buf = vec![0u8; UPLOAD_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write(&buf[..n]).await?;
        progress.inc(n as u64);
    }
    Ok(writer.close().await?)
}

async fn download(
    src: &S3Path,
    dst: &Path,
    args: &CpArgs,
    output: &OutputConfig,
) -> anyhow::Result<Transferred> {
    let mut done = Transferred::default();

    if src.is_file_path() {
        let target = if dst.is_dir() || args.target.ends_with(std::path::MAIN_SEPARATOR) {
            dst.join(src.basename())
        } else {
            dst.to_path_buf()
        };
        done.add(download_file(src, &target, output).await?);
        return Ok(done);
    }

    if !args.recursive {
        return Err(needs_recursive(&src.to_string()));
    }

    for (path, _) in src.walk().await.with_context(|| format!("Failed to list {src}"))? {
        let Some(relative) = path.strip_prefix(src) else {
            continue;
        };
        if path.is_dir_path() {
            continue;
        }
        let target = relative.split('/').fold(dst.to_path_buf(), |p, part| p.join(part));
        done.add(download_file(&path, &target, output).await?);
    }
    Ok(done)
}

async fn download_file(src: &S3Path, dst: &Path, output: &OutputConfig) -> anyhow::Result<u64> {
    let mut reader = src
        .open_reader()
        .await
        .with_context(|| format!("Failed to open {src}"))?;

    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut file = tokio::fs::File::create(dst)
        .await
        .with_context(|| format!("Failed to create {}", dst.display()))?;

    let progress = ProgressBar::new(output, Some(reader.size()), &src.to_string());
    let result = copy_to_writer(&mut reader, &mut file, &progress).await;
    progress.finish_and_clear();
    reader.close();

    result.with_context(|| format!("Failed to download {src} to {}", dst.display()))
}

async fn copy_remote(src: &S3Path, dst: &S3Path, args: &CpArgs) -> anyhow::Result<Transferred> {
    let mut done = Transferred::default();

    if src.is_file_path() {
        let target = if dst.is_dir_path() {
            dst.join(src.basename())
        } else {
            dst.clone()
        };
        let size = src.size().await.with_context(|| format!("Failed to stat {src}"))?;
        src.copy_to(&target)
            .await
            .with_context(|| format!("Failed to copy {src} to {target}"))?;
        done.add(size);
        return Ok(done);
    }

    if !args.recursive {
        return Err(needs_recursive(&src.to_string()));
    }

    let root = dst.as_dir();
    for (path, info) in src.walk().await.with_context(|| format!("Failed to list {src}"))? {
        let Some(relative) = path.strip_prefix(src) else {
            continue;
        };
        let target = root.join(relative);
        if path.is_dir_path() {
            if !target.is_root() {
                target.create_dir().await?;
            }
            continue;
        }
        path.copy_to(&target)
            .await
            .with_context(|| format!("Failed to copy {path} to {target}"))?;
        done.add(info.len());
    }
    Ok(done)
}
