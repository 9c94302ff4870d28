//! Application configuration loaded from a TOML file.
//!
//! Every section has defaults, so a missing or partial file still produces a
//! usable [`Config`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::tree::sort::{SortDirection, SortField};

/// Top-level application configuration.
///
/// Call [`Config::load`] to read from a TOML path, or
/// [`Config::load_or_default`] to fall back silently when the file is absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub io: IoConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Loads configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::PermissionDenied`] if the file is not readable.
    /// - [`CoreError::ConfigParse`] if the TOML is malformed.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => CoreError::PermissionDenied(path.to_path_buf()),
            _ => CoreError::Io(e),
        })?;
        toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> CoreResult<Self> {
        match Self::load(path) {
            Err(CoreError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// `~/.config/fmio/config.toml`.
    pub fn default_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(".config")
            .join("fmio")
            .join("config.toml")
    }
}

/// Browsing preferences applied to the node tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub show_hidden: bool,
    #[serde(default = "default_sort")]
    pub default_sort: String,
    #[serde(default)]
    pub sort_descending: bool,
    #[serde(default = "default_true")]
    pub sort_dir_first: bool,
}

impl GeneralConfig {
    /// Resolves `default_sort` to a field, falling back to name order.
    pub fn sort_field(&self) -> SortField {
        match self.default_sort.to_ascii_lowercase().as_str() {
            "size" => SortField::Size,
            "date" | "modified" => SortField::Date,
            "type" => SortField::Type,
            _ => SortField::Name,
        }
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort_descending {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            show_hidden: false,
            default_sort: default_sort(),
            sort_descending: false,
            sort_dir_first: true,
        }
    }
}

/// How the IO worker answers a destination conflict when nobody is asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Prompt the operator for every conflict.
    #[default]
    Ask,
    Skip,
    Overwrite,
    /// Keep both entries by picking a free `name (copy)` target.
    Rename,
}

/// Job engine behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoConfig {
    /// Route jobs through the long-lived IO worker process.
    #[serde(default = "default_true")]
    pub use_queue: bool,
    /// Report queued job progress back to the browsing session.
    #[serde(default = "default_true")]
    pub queue_visible: bool,
    #[serde(default)]
    pub conflict: ConflictPolicy,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            use_queue: true,
            queue_visible: true,
            conflict: ConflictPolicy::Ask,
        }
    }
}

/// Derived-data cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Longest edge of generated thumbnails, in pixels.
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
    /// Directories searched for `<icon-name>.png`.
    #[serde(default = "default_icon_dirs")]
    pub icon_dirs: Vec<PathBuf>,
    /// Generator names registered but left inactive.
    #[serde(default)]
    pub disabled_generators: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: default_thumbnail_size(),
            icon_dirs: default_icon_dirs(),
            disabled_generators: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sort() -> String {
    "name".to_string()
}

fn default_thumbnail_size() -> u32 {
    128
}

fn default_icon_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/share/icons/hicolor/48x48/mimetypes"),
        PathBuf::from("/usr/share/icons/hicolor/48x48/places"),
        PathBuf::from("/usr/share/pixmaps"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert!(!config.general.show_hidden);
        assert_eq!(config.general.default_sort, "name");
        assert!(config.general.sort_dir_first);
        assert!(config.io.use_queue);
        assert!(config.io.queue_visible);
        assert_eq!(config.io.conflict, ConflictPolicy::Ask);
        assert_eq!(config.cache.thumbnail_size, 128);
        assert!(config.cache.disabled_generators.is_empty());
    }

    #[test]
    fn load_full_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[general]
show_hidden = true
default_sort = "size"
sort_descending = true

[io]
use_queue = false
queue_visible = false
conflict = "rename"

[cache]
thumbnail_size = 64
icon_dirs = ["/opt/icons"]
disabled_generators = ["image"]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert!(config.general.show_hidden);
        assert_eq!(config.general.sort_field(), SortField::Size);
        assert_eq!(config.general.sort_direction(), SortDirection::Descending);
        assert!(!config.io.use_queue);
        assert!(!config.io.queue_visible);
        assert_eq!(config.io.conflict, ConflictPolicy::Rename);
        assert_eq!(config.cache.thumbnail_size, 64);
        assert_eq!(config.cache.icon_dirs, vec![PathBuf::from("/opt/icons")]);
        assert_eq!(config.cache.disabled_generators, vec!["image".to_string()]);
    }

    #[test]
    fn load_partial_config_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[io]\nconflict = \"skip\"\n").unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.io.conflict, ConflictPolicy::Skip);
        assert!(config.io.use_queue);
        assert_eq!(config.general.sort_field(), SortField::Name);
    }

    #[test]
    fn load_missing_file_returns_not_found() {
        let result = Config::load(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn load_or_default_tolerates_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(config.io.use_queue);
    }

    #[test]
    fn load_invalid_toml_returns_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        fs::write(&path, "[io\nuse_queue = ").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(CoreError::ConfigParse(_))));
    }

    #[test]
    fn unknown_sort_name_falls_back_to_name() {
        let general = GeneralConfig {
            default_sort: "colour".to_string(),
            ..GeneralConfig::default()
        };
        assert_eq!(general.sort_field(), SortField::Name);
    }
}
