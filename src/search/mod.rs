mod beam;
mod features;
mod node;

pub use beam::{BeamSearch, SearchOutcome};
pub use features::FeatureConfig;
pub use node::Cursors;
