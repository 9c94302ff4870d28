pub mod data;
pub mod queue;
pub mod thumbnail;

pub use data::{DataCache, DataEntry};
pub use queue::WorkQueue;
pub use thumbnail::{GeneratorRegistry, IconProvider, ImageThumbnailer, ThemeIcons, Thumbnail, ThumbnailGenerator};
