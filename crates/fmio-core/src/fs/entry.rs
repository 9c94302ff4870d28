//! Per-entry metadata carried by every tree node.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use unicode_normalization::UnicodeNormalization;

/// Mime type reported for directories.
pub const DIRECTORY_MIME: &str = "inode/directory";

/// Mime type reported when nothing better is known.
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Metadata snapshot of a single file or directory.
///
/// `NodeInfo` is immutable; a refresh produces a new value via
/// [`NodeInfo::stat`]. Directory sizes are reported as `0`.
///
/// # Examples
///
/// ```no_run
/// use fmio_core::NodeInfo;
/// use std::path::Path;
///
/// let info = NodeInfo::stat(Path::new("Cargo.toml")).unwrap();
/// assert_eq!(info.name(), "Cargo.toml");
/// assert!(!info.is_dir());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    path: PathBuf,
    name: String,
    size: u64,
    modified: Option<SystemTime>,
    mode: u32,
    is_dir: bool,
    is_symlink: bool,
    is_hidden: bool,
    readable: bool,
    writable: bool,
    executable: bool,
    mime: String,
}

impl NodeInfo {
    /// Stats `path` without requiring it to be a directory.
    ///
    /// Symlinks are reported as such, but their remaining attributes
    /// describe the link target when it resolves (so a link to a
    /// directory can be browsed).
    pub fn stat(path: &Path) -> std::io::Result<Self> {
        let link_meta = std::fs::symlink_metadata(path)?;
        let is_symlink = link_meta.is_symlink();
        let meta = if is_symlink {
            std::fs::metadata(path).unwrap_or(link_meta)
        } else {
            link_meta
        };
        Ok(Self::new(path.to_path_buf(), &meta, is_symlink))
    }

    /// Builds a `NodeInfo` from already-fetched metadata.
    pub fn new(path: PathBuf, metadata: &std::fs::Metadata, is_symlink: bool) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().nfc().collect::<String>())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let is_hidden = name.starts_with('.');
        let is_dir = metadata.is_dir();
        let (readable, writable, executable) = access_flags(&path, metadata);

        let mime = if is_dir {
            DIRECTORY_MIME.to_string()
        } else {
            mime_guess::from_path(&path)
                .first_raw()
                .unwrap_or(FALLBACK_MIME)
                .to_string()
        };

        Self {
            size: if is_dir { 0 } else { metadata.len() },
            modified: metadata.modified().ok(),
            mode: mode_bits(metadata),
            path,
            name,
            is_dir,
            is_symlink,
            is_hidden,
            readable,
            writable,
            executable,
            mime,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file or directory name (last component of the path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file size in bytes. Always `0` for directories.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the last-modified time, if available.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Permission bits (`0o7777` mask on Unix, synthesised elsewhere).
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Permission bits rendered as `rwxr-xr-x`.
    pub fn permissions(&self) -> String {
        permission_string(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_symlink(&self) -> bool {
        self.is_symlink
    }

    /// Returns `true` if the name starts with `.`.
    pub fn is_hidden(&self) -> bool {
        self.is_hidden
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_executable(&self) -> bool {
        self.executable
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Grouping label used by category views.
    pub fn category(&self) -> &'static str {
        category_for_mime(&self.mime)
    }
}

/// Maps a mime type to a coarse category label.
pub fn category_for_mime(mime: &str) -> &'static str {
    if mime == DIRECTORY_MIME {
        return "Folder";
    }
    let (top, sub) = mime.split_once('/').unwrap_or((mime, ""));
    match top {
        "image" => "Image",
        "video" => "Video",
        "audio" => "Audio",
        "text" => "Text",
        "application" => match sub {
            "zip" | "gzip" | "x-tar" | "x-7z-compressed" | "x-xz" | "x-bzip2" | "vnd.rar" => {
                "Archive"
            }
            "pdf" | "msword" | "rtf" | "epub+zip" => "Document",
            s if s.starts_with("vnd.openxmlformats") || s.starts_with("vnd.oasis") => "Document",
            "json" | "xml" | "javascript" | "toml" | "x-sh" => "Text",
            _ => "Other",
        },
        _ => "Other",
    }
}

/// Renders the low nine permission bits as `rwxrwxrwx`.
pub fn permission_string(mode: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    FLAGS
        .iter()
        .map(|&(bit, c)| if mode & bit != 0 { c } else { '-' })
        .collect()
}

#[cfg(unix)]
fn mode_bits(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_bits(metadata: &std::fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(unix)]
fn access_flags(path: &Path, _metadata: &std::fs::Metadata) -> (bool, bool, bool) {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return (false, false, false);
    };
    // SAFETY: access(2) only reads the NUL-terminated path buffer.
    let check = |flag| unsafe { libc::access(c_path.as_ptr(), flag) == 0 };
    (check(libc::R_OK), check(libc::W_OK), check(libc::X_OK))
}

#[cfg(not(unix))]
fn access_flags(_path: &Path, metadata: &std::fs::Metadata) -> (bool, bool, bool) {
    (true, !metadata.permissions().readonly(), metadata.is_dir())
}
