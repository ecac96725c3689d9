pub mod registry;

pub use self::registry::{BlobHandle, ResourceKind, ResourceRegistry};
