pub mod capabilities;
pub mod split_engine;
pub mod strategy;

pub use self::capabilities::Capabilities;
pub use self::split_engine::{SplitEngine, SplitOutcome};
pub use self::strategy::{select_path, ExecutionPath};
