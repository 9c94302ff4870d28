//! Pluggable thumbnail generators and theme icon lookup.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

/// Decoded RGBA pixels ready for display.
#[derive(Clone, PartialEq, Eq)]
pub struct Thumbnail {
    width: u32,
    height: u32,
    pixels: Arc<Vec<u8>>,
}

impl Thumbnail {
    /// `pixels` must hold `width * height * 4` bytes of RGBA data.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Never upscales; images already within `max_size` keep their size.
    fn from_image(img: &image::DynamicImage, max_size: u32) -> Self {
        let rgba = if img.width() <= max_size && img.height() <= max_size {
            img.to_rgba8()
        } else {
            img.thumbnail(max_size, max_size).to_rgba8()
        };
        let (width, height) = rgba.dimensions();
        Self::new(width, height, rgba.into_raw())
    }
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// A thumbnail source for some family of file types.
pub trait ThumbnailGenerator: Send + Sync {
    /// Short unique identifier used to toggle the generator.
    fn name(&self) -> &str;

    /// Human-readable summary of what the generator handles.
    fn describe(&self) -> String;

    /// Produces a thumbnail no larger than `max_size` on either edge, or
    /// `None` if this generator does not handle the file.
    fn generate(&self, path: &Path, mime: &str, max_size: u32) -> Option<Thumbnail>;
}

struct Registered {
    generator: Arc<dyn ThumbnailGenerator>,
    active: bool,
}

/// Ordered set of generators; earlier registrations win.
///
/// Membership and activation can change at any time; a generation request
/// uses whatever is active when it starts.
#[derive(Default)]
pub struct GeneratorRegistry {
    entries: RwLock<Vec<Registered>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in generators, minus any named in `disabled`.
    pub fn with_builtin(disabled: &[String]) -> Self {
        let registry = Self::new();
        registry.register(Arc::new(ImageThumbnailer));
        for name in disabled {
            registry.set_active(name, false);
        }
        registry
    }

    /// Appends `generator` as active. A generator with the same name is replaced in place.
    pub fn register(&self, generator: Arc<dyn ThumbnailGenerator>) {
        let mut entries = self.entries.write();
        if let Some(existing) = entries
            .iter_mut()
            .find(|r| r.generator.name() == generator.name())
        {
            existing.generator = generator;
            return;
        }
        entries.push(Registered {
            generator,
            active: true,
        });
    }

    /// Returns `false` if no generator has that name.
    pub fn set_active(&self, name: &str, active: bool) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|r| r.generator.name() == name) {
            Some(r) => {
                r.active = active;
                true
            }
            None => false,
        }
    }

    /// `(name, description, active)` for every registered generator.
    pub fn describe(&self) -> Vec<(String, String, bool)> {
        self.entries
            .read()
            .iter()
            .map(|r| (r.generator.name().to_string(), r.generator.describe(), r.active))
            .collect()
    }

    /// Asks each active generator in order; the first thumbnail wins.
    pub fn generate(&self, path: &Path, mime: &str, max_size: u32) -> Option<Thumbnail> {
        let active: Vec<Arc<dyn ThumbnailGenerator>> = self
            .entries
            .read()
            .iter()
            .filter(|r| r.active)
            .map(|r| Arc::clone(&r.generator))
            .collect();
        active
            .iter()
            .find_map(|g| g.generate(path, mime, max_size))
    }
}

/// Raster images decodable by the `image` crate.
pub struct ImageThumbnailer;

impl ThumbnailGenerator for ImageThumbnailer {
    fn name(&self) -> &str {
        "image"
    }

    fn describe(&self) -> String {
        "PNG, GIF, BMP, ICO, TIFF and WebP images".to_string()
    }

    fn generate(&self, path: &Path, mime: &str, max_size: u32) -> Option<Thumbnail> {
        if !mime.starts_with("image/") {
            return None;
        }
        match image::open(path) {
            Ok(img) => Some(Thumbnail::from_image(&img, max_size)),
            Err(e) => {
                tracing::debug!("Image decode failed for {}: {e}", path.display());
                None
            }
        }
    }
}

/// Resolves theme icon names to pixels.
pub trait IconProvider: Send + Sync {
    fn icon(&self, name: &str, size: u32) -> Option<Thumbnail>;
}

/// Looks for `<name>.png` in a list of icon directories, first hit wins.
pub struct ThemeIcons {
    dirs: Vec<PathBuf>,
}

impl ThemeIcons {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl IconProvider for ThemeIcons {
    fn icon(&self, name: &str, size: u32) -> Option<Thumbnail> {
        let file = format!("{name}.png");
        self.dirs
            .iter()
            .map(|d| d.join(&file))
            .filter(|p| p.is_file())
            .find_map(|p| image::open(&p).ok())
            .map(|img| Thumbnail::from_image(&img, size))
    }
}
