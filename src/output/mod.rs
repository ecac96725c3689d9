pub mod assembler;

pub use self::assembler::{single_file, tile_file_name, zip_archive, OutputFile, ARCHIVE_NAME};
