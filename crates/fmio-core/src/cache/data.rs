//! Path-keyed cache of derived display data.
//!
//! Lookups never block on generation: a miss queues work for the drain
//! thread and returns `None`; the UI re-asks after [`CacheEvent::NewData`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::SystemTime;

use parking_lot::{Condvar, Mutex};

use crate::cache::queue::WorkQueue;
use crate::cache::thumbnail::{GeneratorRegistry, IconProvider, Thumbnail};
use crate::event::CacheEvent;
use crate::fs::entry::NodeInfo;

/// Name of the per-directory desktop-entry file that may carry a custom icon.
pub const DIRECTORY_META_FILE: &str = ".directory";

/// Derived data for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    pub thumbnail: Option<Thumbnail>,
    pub icon_name: String,
    pub mime: String,
    pub file_type: String,
    /// Modified time the entry was derived from.
    pub fingerprint: Option<SystemTime>,
    /// `"N items"` for directories.
    pub entry_count: Option<String>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<PathBuf, DataEntry>,
    icons: HashMap<String, Option<Thumbnail>>,
    files: WorkQueue<PathBuf>,
    names: WorkQueue<String>,
    discontinue: bool,
}

struct Shared {
    state: Mutex<CacheState>,
    wake: Condvar,
    generators: Arc<GeneratorRegistry>,
    icons: Box<dyn IconProvider>,
    thumbnail_size: u32,
    events: Sender<CacheEvent>,
}

enum Work {
    File(PathBuf),
    Icon(String),
}

/// Thumbnail/icon/mime cache with its own drain thread.
pub struct DataCache {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl DataCache {
    pub fn new(
        generators: Arc<GeneratorRegistry>,
        icons: Box<dyn IconProvider>,
        thumbnail_size: u32,
        events: Sender<CacheEvent>,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(CacheState::default()),
            wake: Condvar::new(),
            generators,
            icons,
            thumbnail_size,
            events,
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("fmio-data-cache".to_string())
            .spawn(move || run(&worker_shared))?;
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Returns fresh cached data for `path`.
    ///
    /// An entry whose fingerprint no longer matches the file's modified
    /// time is dropped. On a miss, generation is queued unless
    /// `check_only` is set.
    pub fn data_for(&self, path: &Path, check_only: bool) -> Option<DataEntry> {
        let current = match std::fs::metadata(path) {
            Ok(meta) => meta.modified().ok(),
            Err(_) => {
                self.invalidate(path);
                return None;
            }
        };

        let mut state = self.shared.state.lock();
        match state.entries.get(path) {
            Some(entry) if entry.fingerprint == current => return Some(entry.clone()),
            Some(_) => {
                state.entries.remove(path);
            }
            None => {}
        }
        if !check_only {
            state.files.push(path.to_path_buf());
            self.shared.wake.notify_one();
        }
        None
    }

    /// Queues derivation for `path`; re-queueing moves it to the front.
    pub fn queue_file(&self, path: PathBuf) {
        let mut state = self.shared.state.lock();
        state.files.push(path);
        self.shared.wake.notify_one();
    }

    /// Queues resolution of a theme icon shared by every file using it.
    pub fn queue_icon(&self, name: &str) {
        let mut state = self.shared.state.lock();
        if state.icons.contains_key(name) {
            return;
        }
        state.names.push(name.to_string());
        self.shared.wake.notify_one();
    }

    /// Resolved pixels for a theme icon, if it has been looked up and exists.
    pub fn icon(&self, name: &str) -> Option<Thumbnail> {
        self.shared.state.lock().icons.get(name).cloned().flatten()
    }

    /// Forgets `path`, e.g. after it was deleted.
    pub fn invalidate(&self, path: &Path) {
        let mut state = self.shared.state.lock();
        state.entries.remove(path);
        state.files.remove(&path.to_path_buf());
    }

    /// Drops the entry for `old`; nothing is created for `new` until asked.
    pub fn renamed(&self, old: &Path, _new: &Path) {
        self.invalidate(old);
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Requests waiting for the drain thread.
    pub fn pending(&self) -> usize {
        let state = self.shared.state.lock();
        state.files.len() + state.names.len()
    }
}

impl Drop for DataCache {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.discontinue = true;
            state.files.clear();
            state.names.clear();
        }
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run(shared: &Shared) {
    loop {
        let work = {
            let mut state = shared.state.lock();
            loop {
                if state.discontinue {
                    return;
                }
                if let Some(path) = state.files.pop() {
                    break Work::File(path);
                }
                if let Some(name) = state.names.pop() {
                    break Work::Icon(name);
                }
                shared.wake.wait(&mut state);
            }
        };

        match work {
            Work::File(path) => {
                let derived = derive(shared, &path);
                let mut state = shared.state.lock();
                match derived {
                    Some(entry) => {
                        state.entries.insert(path.clone(), entry);
                        drop(state);
                        let _ = shared.events.send(CacheEvent::NewData(path));
                    }
                    None => {
                        state.entries.remove(&path);
                    }
                }
            }
            Work::Icon(name) => {
                let pixels = shared.icons.icon(&name, shared.thumbnail_size);
                shared.state.lock().icons.insert(name.clone(), pixels);
                let _ = shared.events.send(CacheEvent::NewIcon(name));
            }
        }
    }
}

fn derive(shared: &Shared, path: &Path) -> Option<DataEntry> {
    let info = NodeInfo::stat(path).ok()?;

    if info.is_dir() {
        let entry_count = std::fs::read_dir(path)
            .map(|rd| rd.count())
            .map(|n| if n == 1 { "1 item".to_string() } else { format!("{n} items") })
            .ok();
        return Some(DataEntry {
            thumbnail: None,
            icon_name: directory_icon(path).unwrap_or_else(|| "folder".to_string()),
            mime: info.mime().to_string(),
            file_type: "Folder".to_string(),
            fingerprint: info.modified(),
            entry_count,
        });
    }

    let mime = info.mime();
    Some(DataEntry {
        thumbnail: shared
            .generators
            .generate(path, mime, shared.thumbnail_size),
        icon_name: icon_name_for_mime(mime),
        mime: mime.to_string(),
        file_type: describe_mime(mime),
        fingerprint: info.modified(),
        entry_count: None,
    })
}

/// Reads `Icon=` from the directory's desktop-entry file, if any.
pub fn directory_icon(dir: &Path) -> Option<String> {
    let content = std::fs::read_to_string(dir.join(DIRECTORY_META_FILE)).ok()?;
    let mut in_desktop_entry = false;
    for line in content.lines().map(str::trim) {
        if line.starts_with('[') {
            in_desktop_entry = line == "[Desktop Entry]";
            continue;
        }
        if !in_desktop_entry {
            continue;
        }
        if let Some(value) = line.strip_prefix("Icon=") {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Freedesktop icon name for a mime type (`image/png` → `image-png`).
pub fn icon_name_for_mime(mime: &str) -> String {
    mime.replace('/', "-")
}

/// Short file-type description (`image/png` → `PNG image`).
pub fn describe_mime(mime: &str) -> String {
    let (top, sub) = mime.split_once('/').unwrap_or((mime, ""));
    if top == "text" && sub == "plain" {
        return "Plain text".to_string();
    }
    let sub = sub
        .trim_start_matches("x-")
        .trim_start_matches("vnd.")
        .split('+')
        .next()
        .unwrap_or_default()
        .to_uppercase();
    let noun = match top {
        "image" | "video" | "audio" | "text" | "font" => top,
        _ => "file",
    };
    if sub.is_empty() {
        noun.to_string()
    } else {
        format!("{sub} {noun}")
    }
}
