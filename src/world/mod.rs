//! World state: the entity store with its spatial index, ecological zones,
//! obstacles and food spawning.

mod resources;
mod store;
mod terrain;
mod zones;

pub use resources::FoodSpawner;
pub use store::{EntityRef, EntityStore, PurgeReport};
pub use terrain::{generate_obstacles, overlaps_obstacle};
pub use zones::{EcologicalZone, ZoneMap};
