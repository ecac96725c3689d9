pub mod plan;
pub mod range;

pub use self::plan::{plan_split, SplitPlan, TileRegion};
pub use self::range::{partition, IndexRange};
