//! fmio core library: UI-agnostic file manager I/O.
//!
//! `fmio-core` holds everything a file manager front end needs below the
//! widgets: a lazily populated tree of filesystem nodes, a background
//! cache of thumbnails and icons, a queue of copy/move/remove jobs, and the
//! socket relay that lets short-lived invocations hand jobs to a single
//! long-lived worker process.
//!
//! # Modules
//!
//! - [`tree`]: [`FsModel`]: node tree plus its background [`tree::Gatherer`].
//! - [`cache`]: [`DataCache`]: thumbnails, theme icons and mime descriptions.
//! - [`io`]: [`IoJobManager`]: pausable, cancellable Copy/Move/Remove jobs.
//! - [`relay`]: [`RelayMessage`] wire format and single-instance sockets.
//! - [`fs`]: [`NodeInfo`] metadata and filesystem primitives.
//! - [`config`]: User-facing configuration (TOML-based settings).
//! - [`event`]: Notifications sent from background workers to the UI.
//! - [`error`]: Unified error type ([`CoreError`]) and result alias ([`CoreResult`]).

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod fs;
pub mod io;
pub mod relay;
pub mod tree;

pub use cache::{DataCache, DataEntry, GeneratorRegistry, ThemeIcons, Thumbnail, ThumbnailGenerator};
pub use config::settings::{Config, ConflictPolicy};
pub use error::{CoreError, CoreResult};
pub use event::{CacheEvent, JobEvent, TreeEvent};
pub use fs::entry::NodeInfo;
pub use io::{ConflictResolution, IoJobManager, JobDescriptor, JobOutcome, JobState, TaskKind};
pub use relay::RelayMessage;
pub use tree::{FsModel, NodeId, SortField, SortSpec};

/// Normalises a string to NFC (composed) form.
///
/// macOS stores filenames in NFD (decomposed), so a search typed in composed
/// form would otherwise miss them.
pub fn nfc_string(s: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    s.nfc().collect()
}
