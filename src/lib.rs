pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod output;
pub mod render;
pub mod resource;
pub mod source;
pub mod splitter;
pub mod worker;

pub use config::{ConfigPatch, EngineSettings, OutputFormat, SplitConfiguration, SplitMode};
pub use error::{Result, SplitterError};
pub use splitter::{ImageSplitter, SessionSnapshot, SplitReport};
