pub mod settings;
pub mod split_config;

pub use self::settings::EngineSettings;
pub use self::split_config::{ConfigPatch, OutputFormat, SplitConfiguration, SplitMode, MAX_SPLITS, MIN_SPLITS};
