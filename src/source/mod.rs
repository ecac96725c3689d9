pub mod source_image;
pub mod upload;

pub use self::source_image::{load_source, SourceImage};
pub use self::upload::{validate_upload, UploadedFile};
