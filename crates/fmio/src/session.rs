//! The browsing session role: keeps a node tree and data cache warm for a
//! directory and shows what the IO worker reports.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use fmio_core::cache::ThemeIcons;
use fmio_core::relay::{self, Claim, Role};
use fmio_core::{CacheEvent, Config, DataCache, FsModel, GeneratorRegistry, NodeId, RelayMessage, TreeEvent};

use crate::watcher::{DirWatcher, WatchMessage};

/// How often worker-thread notifications are drained.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub async fn run(path: PathBuf, config: &Config) -> anyhow::Result<()> {
    let socket = Role::Session.socket_path();
    let listener = match relay::claim(&socket, Some(&RelayMessage::Open(path.clone()))).await? {
        Claim::Forwarded => {
            tracing::info!("Opened {} in the running session", path.display());
            return Ok(());
        }
        Claim::Listening(listener) => listener,
    };

    let (mut session, channels) = Session::new(config)?;
    session.open(&path)?;

    let (relay_tx, mut relay_rx) = tokio::sync::mpsc::unbounded_channel();
    let relay = listener.spawn(relay_tx);
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            message = relay_rx.recv() => match message {
                Some(message) => session.on_relay(message),
                None => break,
            },
            _ = ticker.tick() => channels.drain(&mut session),
        }
    }

    relay.close().await;
    tracing::info!("Session closed");
    Ok(())
}

/// Receiving ends of the worker-thread notification channels.
struct Channels {
    tree: Receiver<TreeEvent>,
    cache: Receiver<CacheEvent>,
    watch: Receiver<WatchMessage>,
}

impl Channels {
    fn drain(&self, session: &mut Session) {
        for event in self.tree.try_iter() {
            session.on_tree_event(event);
        }
        for event in self.cache.try_iter() {
            session.on_cache_event(event);
        }
        for message in self.watch.try_iter() {
            session.on_watch(message);
        }
    }
}

struct Session {
    model: FsModel,
    cache: DataCache,
    watcher: DirWatcher,
    search: Option<NodeId>,
}

impl Session {
    fn new(config: &Config) -> anyhow::Result<(Self, Channels)> {
        let (tree_tx, tree) = mpsc::channel();
        let (cache_tx, cache_rx) = mpsc::channel();
        let (watch_tx, watch) = mpsc::channel();

        let model = FsModel::from_config(tree_tx, &config.general)?;
        let generators = Arc::new(GeneratorRegistry::with_builtin(&config.cache.disabled_generators));
        for (name, description, active) in generators.describe() {
            tracing::debug!("Thumbnailer {name} ({description}) active={active}");
        }
        let cache = DataCache::new(
            generators,
            Box::new(ThemeIcons::new(config.cache.icon_dirs.clone())),
            config.cache.thumbnail_size,
            cache_tx,
        )?;
        let watcher = DirWatcher::new(watch_tx)?;

        Ok((
            Self {
                model,
                cache,
                watcher,
                search: None,
            },
            Channels {
                tree,
                cache: cache_rx,
                watch,
            },
        ))
    }

    fn open(&mut self, path: &Path) -> anyhow::Result<()> {
        let root = self.model.set_root(path)?;
        self.watcher.watch(path)?;
        tracing::info!("Browsing {} (node {root:?})", path.display());
        Ok(())
    }

    fn on_relay(&mut self, message: RelayMessage) {
        match message {
            RelayMessage::IoProgress {
                percent,
                source,
                destination,
            } => {
                if percent < 0 {
                    tracing::info!("working: {}", source.display());
                } else {
                    tracing::info!("{percent}%: {} -> {}", source.display(), destination.display());
                }
            }
            RelayMessage::Status(text) => tracing::info!("worker: {text}"),
            RelayMessage::Open(path) => {
                if let Err(e) = self.open(&path) {
                    tracing::warn!("Cannot open {}: {e}", path.display());
                }
            }
            RelayMessage::Search { name, path } => self.start_search(&name, path),
            RelayMessage::Job(job) => {
                tracing::warn!("Session received a {} job; jobs belong to the worker", job.kind);
            }
        }
    }

    fn start_search(&mut self, name: &str, path: PathBuf) {
        self.model.cancel_search();
        match self.model.new_result_node(&path) {
            Ok(node) => {
                tracing::info!("Searching for '{name}' below {}", path.display());
                self.search = Some(node);
                self.model.search(name, path, node);
            }
            Err(e) => tracing::warn!("Cannot search {}: {e}", path.display()),
        }
    }

    fn on_tree_event(&mut self, event: TreeEvent) {
        match event {
            TreeEvent::FinishedWorking { node } => {
                let paths: Vec<PathBuf> = {
                    let tree = self.model.tree();
                    tree.visible_children(node)
                        .into_iter()
                        .filter_map(|child| tree.info(child).map(|i| i.path().to_path_buf()))
                        .collect()
                };
                tracing::info!("{} entries listed", paths.len());
                for path in paths {
                    if self.cache.data_for(&path, false).is_none() {
                        tracing::trace!("Queued data for {}", path.display());
                    }
                }
            }
            TreeEvent::NodeRemoved { path } => self.cache.invalidate(&path),
            TreeEvent::SearchProgress { node, found } if Some(node) == self.search => {
                tracing::info!("{found} more match(es)");
            }
            TreeEvent::SearchFinished { node, cancelled } if Some(node) == self.search => {
                let total = self.model.tree().get(node).map_or(0, |n| n.children().len());
                tracing::info!("Search done: {total} match(es){}", if cancelled { " (cancelled)" } else { "" });
            }
            other => tracing::trace!("{other:?}"),
        }
    }

    fn on_cache_event(&mut self, event: CacheEvent) {
        match event {
            CacheEvent::NewData(path) => {
                if let Some(data) = self.cache.data_for(&path, true) {
                    tracing::debug!(
                        "{}: {} ({}){}",
                        path.display(),
                        data.file_type,
                        data.icon_name,
                        data.entry_count.map(|c| format!(", {c}")).unwrap_or_default()
                    );
                    if data.thumbnail.is_none() && self.cache.icon(&data.icon_name).is_none() {
                        self.cache.queue_icon(&data.icon_name);
                    }
                }
            }
            CacheEvent::NewIcon(name) => tracing::trace!("Icon {name} resolved"),
        }
    }

    fn on_watch(&mut self, message: WatchMessage) {
        match message {
            WatchMessage::Changed(path) => {
                if !path.exists() {
                    self.cache.invalidate(&path);
                }
                self.model.directory_changed(&path);
            }
            WatchMessage::Error(e) => tracing::warn!("Watcher error: {e}"),
        }
    }
}
