//! Command-line parsing.

use std::path::{Path, PathBuf};

use fmio_core::JobDescriptor;

pub const USAGE: &str = "\
usage: fmio copy <input>... <destination>
       fmio move <input>... <destination>
       fmio remove <input>...
       fmio worker
       fmio session [path]

Logging is controlled by FMIO_LOG (default: info).";

/// What this invocation should do.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Submit a job to the worker (or run it here).
    Job(JobDescriptor),
    /// Serve jobs until the queue drains.
    Worker,
    /// Browse `path` and display worker progress.
    Session(PathBuf),
    Help,
}

/// Parses arguments (without the program name). Relative paths are
/// resolved against `cwd` since the worker may run elsewhere.
pub fn parse<I>(args: I, cwd: &Path) -> Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(command) = args.next() else {
        return Ok(Command::Help);
    };
    let mut rest: Vec<PathBuf> = args.map(|a| absolute(cwd, &a)).collect();

    match command.as_str() {
        "copy" | "move" => {
            if rest.len() < 2 {
                return Err(format!("{command} needs at least one input and a destination"));
            }
            let output = rest.pop().unwrap_or_default();
            Ok(Command::Job(if command == "copy" {
                JobDescriptor::copy(rest, output)
            } else {
                JobDescriptor::move_to(rest, output)
            }))
        }
        "remove" => {
            if rest.is_empty() {
                return Err("remove needs at least one input".to_string());
            }
            Ok(Command::Job(JobDescriptor::remove(rest)))
        }
        "worker" if rest.is_empty() => Ok(Command::Worker),
        "session" if rest.len() <= 1 => Ok(Command::Session(
            rest.pop().unwrap_or_else(|| cwd.to_path_buf()),
        )),
        "-h" | "--help" | "help" => Ok(Command::Help),
        other => Err(format!("unexpected arguments for '{other}'")),
    }
}

fn absolute(cwd: &Path, arg: &str) -> PathBuf {
    let path = Path::new(arg);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
