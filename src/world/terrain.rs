use glam::Vec3;
use rand::Rng;

use crate::config::WorldConfig;
use crate::world::store::EntityStore;
use crate::world::zones::sample;

/// Place the configured number of static obstacles, fully inside the world.
pub fn generate_obstacles<R: Rng>(rng: &mut R, config: &WorldConfig, store: &mut EntityStore) {
    let half = config.half_extent();
    for _ in 0..config.obstacle_count {
        let radius = sample(rng, config.obstacle_radius_min, config.obstacle_radius_max);
        let inner = (half - radius).max(0.0);
        let position = Vec3::new(
            sample(rng, -inner, inner),
            sample(rng, -inner, inner),
            sample(rng, -inner, inner),
        );
        store.add_obstacle(position, radius);
    }
}

/// True when a body of `radius` at `position` would overlap an obstacle.
pub fn overlaps_obstacle(store: &EntityStore, position: Vec3, radius: f32) -> bool {
    store
        .obstacles()
        .any(|o| o.position.distance(position) < o.radius + radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn obstacles_stay_inside_world() {
        let config = WorldConfig {
            obstacle_count: 20,
            ..WorldConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(77);
        let mut store = EntityStore::new(config.size, 40.0, 1.0);
        generate_obstacles(&mut rng, &config, &mut store);

        assert_eq!(store.obstacle_count(), 20);
        for obstacle in store.obstacles() {
            let reach = obstacle.position.abs().max_element() + obstacle.radius;
            assert!(reach <= config.half_extent() + 1e-3);
        }
        let first = store.obstacles().next().unwrap();
        assert!(overlaps_obstacle(&store, first.position, 0.5));
    }
}
