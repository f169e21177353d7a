mod behavior;
mod components;
mod ecosystem_stats;
mod genetics;
mod lineage;
mod metabolism;
mod predation;
mod reproduction;
mod steering;
mod systems;

pub use behavior::*;
pub use components::*;
pub use ecosystem_stats::*;
pub use genetics::*;
pub use lineage::*;
pub use metabolism::*;
pub use predation::*;
pub use reproduction::*;
pub use steering::*;
pub use systems::*;
