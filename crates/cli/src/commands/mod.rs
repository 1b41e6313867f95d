//! CLI command definitions and execution
//!
//! Remote commands share one store configuration, built from the selected
//! alias before dispatch.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use bfs_core::StoreConfig;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};
use crate::session;

mod alias;
mod cat;
mod cp;
mod head;
mod ls;
mod mkdir;
mod mv;
mod pipe;
mod rm;
mod stat;

/// bfs - filesystem-style access to S3-compatible object storage
///
/// Remote paths use the form s3://bucket/key; keys ending in '/' are directories.
#[derive(Parser, Debug)]
#[command(name = "bfs")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Alias to use (defaults to the configured default alias)
    #[arg(long, global = true, env = "BFS_ALIAS")]
    pub alias: Option<String>,

    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage storage service aliases
    #[command(subcommand)]
    Alias(alias::AliasCommands),

    /// List the entries of a directory
    Ls(ls::LsArgs),

    /// Display object contents
    Cat(cat::CatArgs),

    /// Display first N lines of an object
    Head(head::HeadArgs),

    /// Show object metadata
    Stat(stat::StatArgs),

    /// Copy objects (local<->S3, S3<->S3)
    Cp(cp::CpArgs),

    /// Move objects (copy + delete source)
    Mv(mv::MvArgs),

    /// Remove objects
    Rm(rm::RmArgs),

    /// Stream stdin to an object
    Pipe(pipe::PipeArgs),

    /// Create a directory marker
    Mkdir(mkdir::MkdirArgs),
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let defaults = match session::load_config() {
        Ok(config) => config.defaults,
        Err(e) => {
            tracing::debug!(error = %e, "Using built-in output defaults");
            Default::default()
        }
    };
    let output_config =
        OutputConfig::from_flags(cli.json, cli.no_color, cli.no_progress, cli.quiet, &defaults);

    if let Commands::Alias(cmd) = cli.command {
        return alias::execute(cmd, output_config).await;
    }

    let store = match session::connect(cli.alias.as_deref()).await {
        Ok(store) => store,
        Err(e) => return Formatter::new(output_config).fail(&e),
    };
    dispatch(cli.command, output_config, &store).await
}

async fn dispatch(
    command: Commands,
    output_config: OutputConfig,
    store: &Arc<StoreConfig>,
) -> ExitCode {
    match command {
        Commands::Alias(cmd) => alias::execute(cmd, output_config).await,
        Commands::Ls(args) => ls::execute(args, output_config, store).await,
        Commands::Cat(args) => cat::execute(args, output_config, store).await,
        Commands::Head(args) => head::execute(args, output_config, store).await,
        Commands::Stat(args) => stat::execute(args, output_config, store).await,
        Commands::Cp(args) => cp::execute(args, output_config, store).await,
        Commands::Mv(args) => mv::execute(args, output_config, store).await,
        Commands::Rm(args) => rm::execute(args, output_config, store).await,
        Commands::Pipe(args) => pipe::execute(args, output_config, store).await,
        Commands::Mkdir(args) => mkdir::execute(args, output_config, store).await,
    }
}
