use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::WorldConfig;

/// Static spherical region that scales food spawning and metabolic danger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcologicalZone {
    pub id: u32,
    pub center: Vec3,
    pub radius: f32,
    /// Relative food spawn weight inside the zone
    pub food_multiplier: f32,
    /// Multiplier on metabolic cost inside the zone
    pub danger_multiplier: f32,
}

impl EcologicalZone {
    pub fn contains(&self, position: Vec3) -> bool {
        position.distance_squared(self.center) <= self.radius * self.radius
    }
}

/// All zones of a world, generated once at initialization.
#[derive(Debug, Clone, Default)]
pub struct ZoneMap {
    zones: Vec<EcologicalZone>,
}

impl ZoneMap {
    pub fn generate<R: Rng>(rng: &mut R, config: &WorldConfig) -> Self {
        let half = config.half_extent();
        let zones = (0..config.zone_count)
            .map(|index| {
                let radius = sample(rng, config.zone_radius_min, config.zone_radius_max);
                let inner = (half - radius * 0.5).max(0.0);
                EcologicalZone {
                    id: index as u32,
                    center: Vec3::new(
                        sample(rng, -inner, inner),
                        sample(rng, -inner, inner),
                        sample(rng, -inner, inner),
                    ),
                    radius,
                    food_multiplier: sample(
                        rng,
                        config.zone_food_multiplier_min,
                        config.zone_food_multiplier_max,
                    ),
                    danger_multiplier: sample(
                        rng,
                        config.zone_danger_multiplier_min,
                        config.zone_danger_multiplier_max,
                    ),
                }
            })
            .collect();
        Self { zones }
    }

    pub fn zones(&self) -> &[EcologicalZone] {
        &self.zones
    }

    /// Product of the danger multipliers of every zone covering `position`.
    pub fn danger_at(&self, position: Vec3) -> f32 {
        self.zones
            .iter()
            .filter(|z| z.contains(position))
            .map(|z| z.danger_multiplier)
            .product()
    }

    /// Picks a spawn position, favouring zones by their food multiplier.
    ///
    /// The open world outside every zone competes with weight 1.
    pub fn sample_food_position<R: Rng>(&self, rng: &mut R, half_extent: f32) -> Vec3 {
        let open_weight = 1.0f32;
        let total: f32 = open_weight
            + self
                .zones
                .iter()
                .map(|z| z.food_multiplier.max(0.0))
                .sum::<f32>();
        let mut pick = rng.gen_range(0.0..total.max(f32::EPSILON));

        for zone in &self.zones {
            let weight = zone.food_multiplier.max(0.0);
            if pick < weight {
                let direction = random_unit(rng);
                let distance = zone.radius * rng.gen::<f32>().cbrt();
                let position = zone.center + direction * distance;
                return position.clamp(Vec3::splat(-half_extent), Vec3::splat(half_extent));
            }
            pick -= weight;
        }

        Vec3::new(
            sample(rng, -half_extent, half_extent),
            sample(rng, -half_extent, half_extent),
            sample(rng, -half_extent, half_extent),
        )
    }
}

pub(crate) fn sample<R: Rng>(rng: &mut R, min: f32, max: f32) -> f32 {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}

pub(crate) fn random_unit<R: Rng>(rng: &mut R) -> Vec3 {
    loop {
        let candidate = Vec3::new(
            rng.gen_range(-1.0f32..=1.0),
            rng.gen_range(-1.0f32..=1.0),
            rng.gen_range(-1.0f32..=1.0),
        );
        let length_sq = candidate.length_squared();
        if length_sq > 1e-6 && length_sq <= 1.0 {
            return candidate / length_sq.sqrt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn multipliers_apply_inside_zones_only() {
        let zones = ZoneMap {
            zones: vec![EcologicalZone {
                id: 0,
                center: Vec3::ZERO,
                radius: 10.0,
                food_multiplier: 2.0,
                danger_multiplier: 1.5,
            }],
        };
        assert_eq!(zones.danger_at(Vec3::new(5.0, 0.0, 0.0)), 1.5);
        assert_eq!(zones.danger_at(Vec3::new(50.0, 0.0, 0.0)), 1.0);
    }

    #[test]
    fn generated_zones_respect_config() {
        let config = WorldConfig::default();
        let mut rng = StdRng::seed_from_u64(12);
        let zones = ZoneMap::generate(&mut rng, &config);
        assert_eq!(zones.zones().len(), config.zone_count);
        for zone in zones.zones() {
            assert!(zone.radius >= config.zone_radius_min && zone.radius <= config.zone_radius_max);
            assert!(zone.center.abs().max_element() <= config.half_extent());
        }

        for _ in 0..100 {
            let p = zones.sample_food_position(&mut rng, config.half_extent());
            assert!(p.abs().max_element() <= config.half_extent());
        }
    }
}
