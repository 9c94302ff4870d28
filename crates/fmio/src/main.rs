//! fmio: file manager IO worker and browsing session.
//!
//! `fmio copy|move|remove` hands a job to the running worker (or becomes
//! it), `fmio worker` serves until the queue drains and `fmio session`
//! keeps a directory model warm while showing worker progress.

mod cli;
#[cfg(unix)]
mod session;
mod watcher;
#[cfg(unix)]
mod worker;

use std::path::PathBuf;

use fmio_core::Config;
use tracing_subscriber::EnvFilter;

use crate::cli::Command;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so conflict prompts on the same terminal stay readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_env("FMIO_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    let command = match cli::parse(std::env::args().skip(1), &cwd) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("fmio: {e}\n\n{}", cli::USAGE);
            std::process::exit(2);
        }
    };

    let config = Config::load_or_default(&Config::default_path())?;
    tracing::debug!("Loaded config: {config:?}");

    match command {
        #[cfg(unix)]
        Command::Job(job) => worker::submit(job, &config).await,
        #[cfg(unix)]
        Command::Worker => worker::run(&config).await,
        #[cfg(unix)]
        Command::Session(path) => session::run(path, &config).await,
        #[cfg(not(unix))]
        Command::Job(_) | Command::Worker | Command::Session(_) => {
            anyhow::bail!("the worker and session roles need Unix sockets")
        }
        Command::Help => {
            println!("{}", cli::USAGE);
            Ok(())
        }
    }
}
