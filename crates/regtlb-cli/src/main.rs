//! regtlb - register, unregister and inspect COM type libraries.
//!
//! Reports go to stdout, logging to stderr. The exit code is 0 on success,
//! 1 for application errors and 2 when a system call, the type library
//! services or a file system lookup failed. Usage errors are reported by clap.

mod cli;
mod commands;
mod dump;

use anyhow::Result;
use clap::Parser;
use cli::Args;
use regtlb_core::{platform, RegTlbError};
use std::process::ExitCode;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging; RUST_LOG wins over the default level
    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(args: &Args) -> Result<()> {
    debug!("Running on {}", platform::current_platform());
    let store = platform::system_store()?;
    let binding = platform::system_binding()?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    commands::run(&args.command, store.as_ref(), binding.as_ref(), &mut out)
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<RegTlbError>() {
        Some(e) if e.is_application() => 1,
        Some(_) => 2,
        None => 1,
    }
}
