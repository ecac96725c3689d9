pub mod encoder;
pub mod tile_renderer;

pub use self::encoder::encode_surface;
pub use self::tile_renderer::{TileData, TileRenderer};
