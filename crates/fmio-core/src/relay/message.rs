//! Wire format for messages exchanged between fmio processes.
//!
//! A message is a flat list of tokens joined by [`SEPARATOR`]. The first
//! token selects the interpretation:
//!
//! | Leading token  | Remaining tokens                    |
//! |----------------|-------------------------------------|
//! | `--copy`       | comma-joined inputs, output         |
//! | `--move`       | comma-joined inputs, output         |
//! | `--remove`     | comma-joined inputs                 |
//! | `--ioProgress` | percent, source, destination        |
//! | `--status`     | text                                |
//! | `--search`     | name, start path                    |
//! | anything else  | (none) the token is a path to open  |

use std::path::PathBuf;

use crate::error::{CoreError, CoreResult};
use crate::io::job::{JobDescriptor, TaskKind};
use crate::io::progress::INDETERMINATE;

/// ASCII unit separator; never part of a path typed by a user.
pub const SEPARATOR: char = '\u{1f}';

/// Joins the input list of a job token.
pub const INPUT_SEPARATOR: char = ',';

const IO_PROGRESS: &str = "--ioProgress";
const STATUS: &str = "--status";
const SEARCH: &str = "--search";

/// One relay message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// A job for the IO worker.
    Job(JobDescriptor),
    /// Progress of the worker's current job; `percent` is `-1` while busy
    /// without a byte measure.
    IoProgress {
        percent: i32,
        source: PathBuf,
        destination: PathBuf,
    },
    /// Free-form status line for the session.
    Status(String),
    /// Start a name search below `path`.
    Search { name: String, path: PathBuf },
    /// Open a view on this path.
    Open(PathBuf),
}

impl RelayMessage {
    pub fn encode(&self) -> String {
        let tokens: Vec<String> = match self {
            Self::Job(job) => {
                let inputs = job
                    .inputs
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(&INPUT_SEPARATOR.to_string());
                let mut tokens = vec![job.kind.flag().to_string(), inputs];
                if let Some(output) = &job.output {
                    tokens.push(output.to_string_lossy().into_owned());
                }
                tokens
            }
            Self::IoProgress {
                percent,
                source,
                destination,
            } => vec![
                IO_PROGRESS.to_string(),
                percent.to_string(),
                source.to_string_lossy().into_owned(),
                destination.to_string_lossy().into_owned(),
            ],
            Self::Status(text) => vec![STATUS.to_string(), text.clone()],
            Self::Search { name, path } => vec![
                SEARCH.to_string(),
                name.clone(),
                path.to_string_lossy().into_owned(),
            ],
            Self::Open(path) => vec![path.to_string_lossy().into_owned()],
        };
        tokens.join(&SEPARATOR.to_string())
    }

    /// Parses one message.
    ///
    /// # Errors
    ///
    /// [`CoreError::Protocol`] for an empty message, an unknown `--` token,
    /// a wrong token count or an out-of-range percentage.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let raw = raw.trim_end_matches(['\n', '\r']);
        if raw.is_empty() {
            return Err(CoreError::Protocol("empty message".to_string()));
        }
        let tokens: Vec<&str> = raw.split(SEPARATOR).collect();
        let head = tokens[0];
        let rest = &tokens[1..];

        if let Some(kind) = TaskKind::from_flag(head) {
            return parse_job(kind, rest);
        }
        match head {
            IO_PROGRESS => {
                let [percent, source, destination] = expect::<3>(head, rest)?;
                let percent: i32 = percent
                    .parse()
                    .map_err(|_| CoreError::Protocol(format!("bad percentage: {percent}")))?;
                if !(INDETERMINATE..=100).contains(&percent) {
                    return Err(CoreError::Protocol(format!("percentage out of range: {percent}")));
                }
                Ok(Self::IoProgress {
                    percent,
                    source: PathBuf::from(source),
                    destination: PathBuf::from(destination),
                })
            }
            STATUS => {
                let [text] = expect::<1>(head, rest)?;
                Ok(Self::Status(text.to_string()))
            }
            SEARCH => {
                let [name, path] = expect::<2>(head, rest)?;
                if name.is_empty() {
                    return Err(CoreError::Protocol("empty search name".to_string()));
                }
                Ok(Self::Search {
                    name: name.to_string(),
                    path: PathBuf::from(path),
                })
            }
            flag if flag.starts_with("--") => Err(CoreError::Protocol(format!("unknown token: {flag}"))),
            path => {
                expect::<0>(path, rest)?;
                Ok(Self::Open(PathBuf::from(path)))
            }
        }
    }
}

fn parse_job(kind: TaskKind, rest: &[&str]) -> CoreResult<RelayMessage> {
    let (inputs, output) = if kind.needs_output() {
        let [inputs, output] = expect::<2>(kind.flag(), rest)?;
        (inputs, Some(PathBuf::from(output)))
    } else {
        let [inputs] = expect::<1>(kind.flag(), rest)?;
        (inputs, None)
    };
    let job = JobDescriptor {
        kind,
        inputs: inputs
            .split(INPUT_SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect(),
        output,
    };
    job.validate()
        .map_err(|e| CoreError::Protocol(e.to_string()))?;
    Ok(RelayMessage::Job(job))
}

fn expect<'a, const N: usize>(head: &str, rest: &[&'a str]) -> CoreResult<[&'a str; N]> {
    <[&str; N]>::try_from(rest).map_err(|_| {
        CoreError::Protocol(format!(
            "{head} takes {N} argument(s), got {}",
            rest.len()
        ))
    })
}
