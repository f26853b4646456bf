//! fsmgr CLI - Command-line interface for the fsmgr file manager
//!
//! Provides commands for:
//! - Creating directories and uploading files
//! - Renaming, deleting and restoring items
//! - Inspecting items, the recycle bin and the audit trail
//! - Managing the configuration file

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    audit::AuditCommand,
    config::ConfigCommand,
    delete::{DeleteCommand, PurgeCommand},
    info::InfoCommand,
    mkdir::MkdirCommand,
    rename::RenameCommand,
    restore::{RestoreCommand, TrashCommand},
    upload::UploadCommand,
    Context,
};
use output::{get_formatter, report_error, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "fsmgr",
    version,
    about = "File manager keeping files and their metadata in step"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Act as this user instead of identity.default_user
    #[arg(long, global = true)]
    user: Option<String>,

    /// Paths are form-encoded (%xx escapes, '+' for space)
    #[arg(long, global = true)]
    encoded: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a directory
    Mkdir(MkdirCommand),
    /// Upload one or more files into a directory
    Upload(UploadCommand),
    /// Rename a file or directory
    Rename(RenameCommand),
    /// Move files or directories to the recycle bin
    Delete(DeleteCommand),
    /// Permanently remove a recycled item
    Purge(PurgeCommand),
    /// Restore a recycled item to its original location
    Restore(RestoreCommand),
    /// Show details about a file or directory
    Info(InfoCommand),
    /// List the recycle bin
    Trash(TrashCommand),
    /// View audit log entries
    Audit(AuditCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = Context::new(format, cli.config, cli.user, cli.encoded);

    // Setup tracing
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error".to_string(),
        (false, 0) => ctx.load_config().logging.level,
        (false, 1) => "debug".to_string(),
        (false, _) => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Mkdir(cmd) => cmd.execute(&ctx).await,
        Commands::Upload(cmd) => cmd.execute(&ctx).await,
        Commands::Rename(cmd) => cmd.execute(&ctx).await,
        Commands::Delete(cmd) => cmd.execute(&ctx).await,
        Commands::Purge(cmd) => cmd.execute(&ctx).await,
        Commands::Restore(cmd) => cmd.execute(&ctx).await,
        Commands::Info(cmd) => cmd.execute(&ctx).await,
        Commands::Trash(cmd) => cmd.execute(&ctx).await,
        Commands::Audit(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(get_formatter(format).as_ref(), &e);
            ExitCode::FAILURE
        }
    }
}
