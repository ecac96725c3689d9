pub mod image_splitter;
pub mod snapshot;

pub use self::image_splitter::{ImageSplitter, SplitReport};
pub use self::snapshot::{SessionSnapshot, SourceInfo, TileInfo};
