use rand::Rng;
use tracing::debug;

use crate::config::FoodConfig;
use crate::world::store::EntityStore;
use crate::world::terrain::overlaps_obstacle;
use crate::world::zones::ZoneMap;

/// Attempts per unit before a spawn inside an obstacle is given up.
const PLACEMENT_ATTEMPTS: usize = 8;

/// Spawns food at a fixed rate up to the cap.
///
/// Fractional spawns carry over between ticks, so a rate of 30 per second at
/// 60 ticks per second yields one unit every other tick.
#[derive(Debug, Clone, Default)]
pub struct FoodSpawner {
    accumulator: f32,
}

impl FoodSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial seeding; ignores the rate but respects the cap.
    pub fn seed<R: Rng>(
        &mut self,
        rng: &mut R,
        config: &FoodConfig,
        zones: &ZoneMap,
        half_extent: f32,
        store: &mut EntityStore,
    ) -> usize {
        let count = config.initial_food.min(config.max_food);
        (0..count)
            .filter(|_| spawn_one(rng, config, zones, half_extent, store))
            .count()
    }

    /// Advances the spawn accumulator by `dt` seconds and spawns whole units.
    pub fn tick<R: Rng>(
        &mut self,
        rng: &mut R,
        config: &FoodConfig,
        zones: &ZoneMap,
        half_extent: f32,
        dt: f32,
        store: &mut EntityStore,
    ) -> usize {
        self.accumulator += config.spawn_rate.max(0.0) * dt;
        let due = self.accumulator.floor();
        self.accumulator -= due;

        let room = config.max_food.saturating_sub(store.available_food());
        let count = (due as usize).min(room);
        if count == 0 {
            return 0;
        }
        let spawned = (0..count)
            .filter(|_| spawn_one(rng, config, zones, half_extent, store))
            .count();
        if spawned < count {
            debug!(requested = count, spawned, "food placement blocked by obstacles");
        }
        spawned
    }
}

fn spawn_one<R: Rng>(
    rng: &mut R,
    config: &FoodConfig,
    zones: &ZoneMap,
    half_extent: f32,
    store: &mut EntityStore,
) -> bool {
    let limit = (half_extent - config.radius).max(0.0);
    for _ in 0..PLACEMENT_ATTEMPTS {
        let position = zones.sample_food_position(rng, limit);
        if !overlaps_obstacle(store, position, config.radius) {
            store.add_food(position, config.energy_value);
            return true;
        }
    }
    false
}
