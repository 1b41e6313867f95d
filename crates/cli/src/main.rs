//! bfs - filesystem-style access to S3-compatible object storage
//!
//! Paths, listings, streaming reads and buffered multipart writes over any
//! S3-compatible backend.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use bucketfs_cli::commands::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // --debug wins over RUST_LOG; otherwise only warnings reach stderr
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let exit_code = commands::execute(cli).await;

    std::process::exit(exit_code.as_i32());
}
