#![deny(unsafe_code)]

mod commands;
mod config;
mod exit_code;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use atlasgate_core::error::{ContainerError, FrameError, MetadataError, SpriteError};
use atlasgate_proxy::DiskCacheError;

use crate::commands::{cache, crop, seal, serve, unseal};
use crate::config::Config;

/// Asset gateway for encrypted sprite atlases and cached remote assets
#[derive(Parser)]
#[command(name = "atlasgate")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Serve ./resources on a fixed port
    atlasgate serve --resources ./resources --port 8088

    # Wrap an audio file so the gateway decrypts it on the fly
    atlasgate seal meow.ogg resources/sounds/audios/meow.ogg

    # Extract one frame from an atlas for inspection
    atlasgate crop run.techybuddy --meta tb-meta.json --action run --frame Frame_0.png -o f0.png
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file
    #[arg(long, env = "ATLASGATE_CONFIG", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Also write warnings and errors to daily-rotated files in DIR
    #[arg(long, value_name = "DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway server until Ctrl-C
    Serve(serve::Args),

    /// Wrap a plaintext file into a container
    Seal(seal::Args),

    /// Decrypt a container to a file or stdout
    Unseal(unseal::Args),

    /// Inspect or clean the remote-asset disk cache
    Cache(cache::Args),

    /// Extract one frame from an atlas container
    Crop(crop::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let quiet = cli.quiet;

    match run(cli) {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            if !quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(categorize_error(&e))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let _guard = if cli.quiet {
        None
    } else {
        setup_tracing(cli.verbose, cli.log_dir.as_deref())?
    };

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => serve::execute(&args, config),
        Commands::Seal(args) => seal::execute(&args, &config.key()?),
        Commands::Unseal(args) => unseal::execute(&args, &config.key()?),
        Commands::Cache(args) => cache::execute(&args, &config),
        Commands::Crop(args) => crop::execute(&args, &config.key()?),
    }
}

/// Set up tracing: stderr at the verbosity level, plus an optional
/// daily-rolling file at `warn`.
///
/// The returned guard flushes the file writer on drop.
fn setup_tracing(verbose: u8, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let console = fmt::layer().with_writer(io::stderr).with_filter(console_filter);

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "atlasgate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("warn"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();
    Ok(guard)
}

/// Categorize an error into an exit code by walking the typed error chain.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<ContainerError>() {
            if err.is_integrity_failure() {
                return exit_code::CONTAINER_INVALID;
            }
            if err.is_not_found() {
                return exit_code::NOT_FOUND;
            }
            if matches!(err, ContainerError::InvalidKey { .. }) {
                return exit_code::USAGE;
            }
        }

        if let Some(err) = cause.downcast_ref::<SpriteError>() {
            if err.is_not_found() {
                return exit_code::NOT_FOUND;
            }
            if let SpriteError::Container(inner) = err.root()
                && inner.is_integrity_failure()
            {
                return exit_code::CONTAINER_INVALID;
            }
        }

        if let Some(err) = cause.downcast_ref::<MetadataError>()
            && err.is_not_found()
        {
            return exit_code::NOT_FOUND;
        }

        if cause.downcast_ref::<FrameError>().is_some() {
            return exit_code::GENERAL_ERROR;
        }

        if let Some(err) = cause.downcast_ref::<DiskCacheError>() {
            match err {
                DiskCacheError::InvalidPath { .. } => return exit_code::USAGE,
                DiskCacheError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                    return exit_code::NOT_FOUND;
                }
                DiskCacheError::Io { .. } => {}
            }
        }

        if cause.downcast_ref::<toml::de::Error>().is_some() {
            return exit_code::USAGE;
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && io_err.kind() == io::ErrorKind::NotFound
        {
            return exit_code::NOT_FOUND;
        }
    }
    exit_code::GENERAL_ERROR
}
