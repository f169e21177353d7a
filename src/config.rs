//! Simulation configuration.
//!
//! Every section derives `Serialize`/`Deserialize` with `#[serde(default)]`, so a
//! partial JSON document can be merged over an existing configuration. Keys the
//! engine does not know are dropped during the merge instead of failing it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{SimError, SimResult};

/// Inclusive bounds and founder value for one numeric genome trait.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TraitSpec {
    pub base: f32,
    pub min: f32,
    pub max: f32,
}

impl TraitSpec {
    pub const fn new(base: f32, min: f32, max: f32) -> Self {
        Self { base, min, max }
    }

    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Edge length of the cubic world, centred on the origin.
    pub size: f32,
    pub obstacle_count: usize,
    pub obstacle_radius_min: f32,
    pub obstacle_radius_max: f32,
    pub zone_count: usize,
    pub zone_radius_min: f32,
    pub zone_radius_max: f32,
    pub zone_food_multiplier_min: f32,
    pub zone_food_multiplier_max: f32,
    pub zone_danger_multiplier_min: f32,
    pub zone_danger_multiplier_max: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            size: 400.0,
            obstacle_count: 6,
            obstacle_radius_min: 8.0,
            obstacle_radius_max: 24.0,
            zone_count: 4,
            zone_radius_min: 40.0,
            zone_radius_max: 90.0,
            zone_food_multiplier_min: 0.5,
            zone_food_multiplier_max: 2.5,
            zone_danger_multiplier_min: 0.8,
            zone_danger_multiplier_max: 1.6,
        }
    }
}

impl WorldConfig {
    pub fn half_extent(&self) -> f32 {
        self.size * 0.5
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PopulationConfig {
    /// Hard cap on living organisms of both species.
    pub max_organisms: usize,
    pub initial_prey: usize,
    pub initial_predators: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            max_organisms: 1500,
            initial_prey: 200,
            initial_predators: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FoodConfig {
    pub max_food: usize,
    pub initial_food: usize,
    /// Food units spawned per simulated second while below the cap.
    pub spawn_rate: f32,
    pub energy_value: f32,
    pub radius: f32,
    /// Extra distance beyond both radii at which prey can eat.
    pub contact_range: f32,
}

impl Default for FoodConfig {
    fn default() -> Self {
        Self {
            max_food: 600,
            initial_food: 300,
            spawn_rate: 30.0,
            energy_value: 30.0,
            radius: 1.0,
            contact_range: 1.5,
        }
    }
}

/// Per-species energy budget; all costs are per tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeciesMetabolism {
    pub max_energy: f32,
    pub initial_energy_ratio: f32,
    pub exist_cost: f32,
    pub move_cost: f32,
    pub sense_cost: f32,
    pub size_cost: f32,
    /// Nominal lifespan in ticks.
    pub max_age: u32,
    /// Fraction of `max_age` past which an organism dies of old age.
    pub old_age_ratio: f32,
    /// Energy ratio below which a sensed threat changes behavior.
    pub critical_energy_ratio: f32,
}

impl Default for SpeciesMetabolism {
    fn default() -> Self {
        Self::prey()
    }
}

impl SpeciesMetabolism {
    pub fn prey() -> Self {
        Self {
            max_energy: 100.0,
            initial_energy_ratio: 0.6,
            exist_cost: 0.01,
            move_cost: 0.0002,
            sense_cost: 0.005,
            size_cost: 0.005,
            max_age: 7200,
            old_age_ratio: 1.0,
            critical_energy_ratio: 0.75,
        }
    }

    pub fn predator() -> Self {
        Self {
            max_energy: 150.0,
            initial_energy_ratio: 0.7,
            exist_cost: 0.015,
            move_cost: 0.0002,
            sense_cost: 0.006,
            size_cost: 0.006,
            max_age: 9000,
            old_age_ratio: 1.0,
            critical_energy_ratio: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetabolismConfig {
    pub prey: SpeciesMetabolism,
    pub predator: SpeciesMetabolism,
}

impl Default for MetabolismConfig {
    fn default() -> Self {
        Self {
            prey: SpeciesMetabolism::prey(),
            predator: SpeciesMetabolism::predator(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    pub separation_radius: f32,
    pub separation_weight: f32,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    pub seek_weight: f32,
    pub avoid_weight: f32,
    pub wander_weight: f32,
    /// Clearance kept from obstacle surfaces before avoidance kicks in.
    pub obstacle_margin: f32,
    pub max_steering_force: f32,
    /// Velocity multiplier applied every tick.
    pub drag: f32,
    /// Fraction of normal velocity kept after a collision.
    pub collision_damping: f32,
    pub flee_multiplier: f32,
    pub hunt_multiplier: f32,
    pub reproducing_speed_factor: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            separation_radius: 6.0,
            separation_weight: 1.5,
            alignment_weight: 1.0,
            cohesion_weight: 1.0,
            seek_weight: 1.2,
            avoid_weight: 2.0,
            wander_weight: 0.3,
            obstacle_margin: 4.0,
            max_steering_force: 0.6,
            drag: 0.98,
            collision_damping: 0.5,
            flee_multiplier: 2.0,
            hunt_multiplier: 1.6,
            reproducing_speed_factor: 0.5,
        }
    }
}

/// Traits every species carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommonGenetics {
    pub base_color: [f32; 3],
    pub max_speed: TraitSpec,
    pub sense_radius: TraitSpec,
    pub metabolism: TraitSpec,
    pub size: TraitSpec,
    pub asymmetry: TraitSpec,
    pub spikiness: TraitSpec,
    pub glow: TraitSpec,
}

impl Default for CommonGenetics {
    fn default() -> Self {
        Self::prey()
    }
}

impl CommonGenetics {
    pub fn prey() -> Self {
        Self {
            base_color: [0.35, 0.8, 0.45],
            max_speed: TraitSpec::new(8.0, 3.0, 14.0),
            sense_radius: TraitSpec::new(20.0, 8.0, 36.0),
            metabolism: TraitSpec::new(1.0, 0.6, 1.6),
            size: TraitSpec::new(1.5, 0.8, 3.0),
            asymmetry: TraitSpec::new(0.1, 0.0, 1.0),
            spikiness: TraitSpec::new(0.1, 0.0, 1.0),
            glow: TraitSpec::new(0.2, 0.0, 1.0),
        }
    }

    pub fn predator() -> Self {
        Self {
            base_color: [0.85, 0.25, 0.2],
            max_speed: TraitSpec::new(10.0, 4.0, 16.0),
            sense_radius: TraitSpec::new(28.0, 10.0, 40.0),
            metabolism: TraitSpec::new(1.0, 0.6, 1.6),
            size: TraitSpec::new(2.2, 1.2, 4.0),
            asymmetry: TraitSpec::new(0.2, 0.0, 1.0),
            spikiness: TraitSpec::new(0.6, 0.0, 1.0),
            glow: TraitSpec::new(0.1, 0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreyGenetics {
    pub common: CommonGenetics,
    pub flocking_strength: TraitSpec,
}

impl Default for PreyGenetics {
    fn default() -> Self {
        Self {
            common: CommonGenetics::prey(),
            flocking_strength: TraitSpec::new(1.0, 0.0, 2.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PredatorGenetics {
    pub common: CommonGenetics,
    pub attack_power: TraitSpec,
    pub pack_affinity: TraitSpec,
}

impl Default for PredatorGenetics {
    fn default() -> Self {
        Self {
            common: CommonGenetics::predator(),
            attack_power: TraitSpec::new(1.0, 0.5, 2.0),
            pack_affinity: TraitSpec::new(0.5, 0.0, 1.5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneticsConfig {
    /// Fraction of each trait's range used as the maximum mutation offset.
    pub mutation_factor: f32,
    /// Fraction of each trait's range used as founder variance.
    pub base_variance: f32,
    pub subtype_inherit_probability: f32,
    /// Maximum per-channel color drift per generation.
    pub color_drift: f32,
    pub prey: PreyGenetics,
    pub predator: PredatorGenetics,
}

impl Default for GeneticsConfig {
    fn default() -> Self {
        Self {
            mutation_factor: 0.08,
            base_variance: 0.1,
            subtype_inherit_probability: 0.95,
            color_drift: 0.04,
            prey: PreyGenetics::default(),
            predator: PredatorGenetics::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeciesReproduction {
    /// Energy ratio (of max energy) required to reproduce.
    pub threshold_ratio: f32,
    /// Minimum age in ticks.
    pub min_age: u32,
    /// Ticks before the parent may reproduce again.
    pub cooldown: u32,
}

impl Default for SpeciesReproduction {
    fn default() -> Self {
        Self {
            threshold_ratio: 0.75,
            min_age: 600,
            cooldown: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReproductionConfig {
    pub prey: SpeciesReproduction,
    pub predator: SpeciesReproduction,
    pub energy_cost_multiplier: f32,
    /// Maximum distance between parent and child at birth.
    pub spawn_offset: f32,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        Self {
            prey: SpeciesReproduction::default(),
            predator: SpeciesReproduction {
                threshold_ratio: 0.8,
                min_age: 900,
                cooldown: 480,
            },
            energy_cost_multiplier: 0.5,
            spawn_offset: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PredationConfig {
    /// Base reach beyond both body radii.
    pub attack_range: f32,
    pub energy_efficiency: f32,
    pub min_energy_gain: f32,
}

impl Default for PredationConfig {
    fn default() -> Self {
        Self {
            attack_range: 2.0,
            energy_efficiency: 0.8,
            min_energy_gain: 15.0,
        }
    }
}

/// Extinction-risk heuristic and history settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Rolling window for the birth/death balance, in ticks.
    pub window_ticks: usize,
    /// Population at or above which the population term of the risk is zero.
    pub population_threshold: usize,
    pub population_weight: f32,
    pub trend_weight: f32,
    pub history_capacity: usize,
    /// Ticks between history samples.
    pub history_interval: u64,
    /// Ticks between `[ECOSYSTEM]` log lines; zero disables them.
    pub summary_interval: u64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            window_ticks: 300,
            population_threshold: 20,
            population_weight: 0.6,
            trend_weight: 0.4,
            history_capacity: 600,
            history_interval: 30,
            summary_interval: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_catch_up_steps: u32,
    /// Wall-clock pause between scheduling passes.
    pub frame_interval_ms: u64,
    /// Capacity of the outbound frame queue.
    pub frame_queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_catch_up_steps: 10,
            frame_interval_ms: 16,
            frame_queue_capacity: 4,
        }
    }
}

/// Consumed by the renderer only; the engine passes these through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VisualizationConfig {
    pub show_trails: bool,
    /// Every n-th organism (by serial) carries a trail.
    pub trail_every: u32,
    pub trail_length: u32,
    pub show_zones: bool,
    pub show_sense_radius: bool,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            show_trails: true,
            trail_every: 10,
            trail_length: 40,
            show_zones: true,
            show_sense_radius: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub world: WorldConfig,
    pub population: PopulationConfig,
    pub food: FoodConfig,
    pub metabolism: MetabolismConfig,
    pub physics: PhysicsConfig,
    pub genetics: GeneticsConfig,
    pub reproduction: ReproductionConfig,
    pub predation: PredationConfig,
    pub statistics: StatisticsConfig,
    pub scheduler: SchedulerConfig,
    pub visualization: VisualizationConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED_2024,
            world: WorldConfig::default(),
            population: PopulationConfig::default(),
            food: FoodConfig::default(),
            metabolism: MetabolismConfig::default(),
            physics: PhysicsConfig::default(),
            genetics: GeneticsConfig::default(),
            reproduction: ReproductionConfig::default(),
            predation: PredationConfig::default(),
            statistics: StatisticsConfig::default(),
            scheduler: SchedulerConfig::default(),
            visualization: VisualizationConfig::default(),
        }
    }
}

impl SimConfig {
    /// Balanced preset for a stable ecosystem
    pub fn balanced() -> Self {
        Self::default()
    }

    /// Higher mutation and faster reproduction
    pub fn fast_evolution() -> Self {
        let mut config = Self::default();
        config.genetics.mutation_factor = 0.15;
        config.reproduction.prey.cooldown = 180;
        config.reproduction.predator.cooldown = 300;
        config.reproduction.prey.min_age = 360;
        config.food.spawn_rate = 40.0;
        config
    }

    /// Slow turnover with plenty of food
    pub fn stable() -> Self {
        let mut config = Self::default();
        config.genetics.mutation_factor = 0.04;
        config.reproduction.prey.cooldown = 500;
        config.reproduction.predator.cooldown = 800;
        config.food.spawn_rate = 45.0;
        config.food.max_food = 900;
        config
    }

    /// Scarce food, hungrier organisms
    pub fn competitive() -> Self {
        let mut config = Self::default();
        config.food.spawn_rate = 18.0;
        config.food.max_food = 350;
        config.metabolism.prey.exist_cost = 0.014;
        config.metabolism.predator.exist_cost = 0.02;
        config
    }

    /// Scales population and food volumes by `scale`.
    pub fn scaled(&self, scale: f32) -> SimResult<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(SimError::InvalidCommand(format!(
                "scale must be a positive number, got {scale}"
            )));
        }
        let apply = |count: usize| ((count as f32) * scale).round().max(0.0) as usize;
        let mut config = self.clone();
        config.population.max_organisms = apply(config.population.max_organisms).max(1);
        config.population.initial_prey = apply(config.population.initial_prey);
        config.population.initial_predators = apply(config.population.initial_predators);
        config.food.max_food = apply(config.food.max_food);
        config.food.initial_food = apply(config.food.initial_food);
        config.food.spawn_rate *= scale;
        Ok(config)
    }

    /// Merges a partial JSON document over this configuration.
    ///
    /// Unknown keys at any depth are ignored. A known key with a value of the
    /// wrong shape fails the whole merge and leaves `self` untouched.
    pub fn merged(&self, partial: &Value) -> SimResult<Self> {
        if !partial.is_object() {
            return Err(SimError::InvalidCommand(
                "config patch must be a JSON object".to_string(),
            ));
        }
        let mut base = serde_json::to_value(self)?;
        merge_known_keys(&mut base, partial, "");
        let config: SimConfig = serde_json::from_value(base)
            .map_err(|err| SimError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Largest radius any neighbour query can use; the spatial grid cell edge.
    pub fn max_interaction_radius(&self) -> f32 {
        let prey = &self.genetics.prey.common;
        let predator = &self.genetics.predator.common;
        let attack = self.predation.attack_range * 2.0 * self.genetics.predator.attack_power.max
            + predator.size.max
            + prey.size.max;
        let obstacle = self.world.obstacle_radius_max + self.physics.obstacle_margin + predator.size.max;
        prey.sense_radius
            .max
            .max(predator.sense_radius.max)
            .max(self.physics.separation_radius)
            .max(attack)
            .max(self.food.contact_range + self.food.radius + prey.size.max)
            .max(obstacle)
    }

    pub fn validate(&self) -> SimResult<()> {
        let invalid = |msg: &str| Err(SimError::InvalidConfig(msg.to_string()));
        if !(self.world.size.is_finite() && self.world.size > 0.0) {
            return invalid("world.size must be positive");
        }
        if self.world.obstacle_radius_min > self.world.obstacle_radius_max
            || self.world.zone_radius_min > self.world.zone_radius_max
            || self.world.zone_food_multiplier_min > self.world.zone_food_multiplier_max
            || self.world.zone_danger_multiplier_min > self.world.zone_danger_multiplier_max
        {
            return invalid("world ranges must have min <= max");
        }
        if self.physics.drag < 0.0 || self.physics.drag > 1.0 {
            return invalid("physics.drag must lie in [0, 1]");
        }
        if self.physics.max_steering_force < 0.0 {
            return invalid("physics.max_steering_force must not be negative");
        }
        if !(0.0..=1.0).contains(&self.reproduction.energy_cost_multiplier) {
            return invalid("reproduction.energy_cost_multiplier must lie in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.genetics.subtype_inherit_probability) {
            return invalid("genetics.subtype_inherit_probability must lie in [0, 1]");
        }
        for metabolism in [&self.metabolism.prey, &self.metabolism.predator] {
            if metabolism.max_energy <= 0.0 {
                return invalid("metabolism.max_energy must be positive");
            }
        }
        let specs = self
            .genetics
            .prey
            .common
            .specs()
            .into_iter()
            .chain(self.genetics.predator.common.specs())
            .chain([
                self.genetics.prey.flocking_strength,
                self.genetics.predator.attack_power,
                self.genetics.predator.pack_affinity,
            ]);
        for spec in specs {
            if spec.min > spec.max {
                return invalid("genetics trait bounds must have min <= max");
            }
        }
        if self.scheduler.max_catch_up_steps == 0 {
            return invalid("scheduler.max_catch_up_steps must be at least 1");
        }
        Ok(())
    }
}

impl CommonGenetics {
    fn specs(&self) -> [TraitSpec; 7] {
        [
            self.max_speed,
            self.sense_radius,
            self.metabolism,
            self.size,
            self.asymmetry,
            self.spikiness,
            self.glow,
        ]
    }
}

fn merge_known_keys(base: &mut Value, patch: &Value, path: &str) {
    let (Value::Object(base_map), Value::Object(patch_map)) = (base, patch) else {
        return;
    };
    for (key, value) in patch_map {
        let key_path = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        match base_map.get_mut(key) {
            Some(slot) if slot.is_object() && value.is_object() => {
                merge_known_keys(slot, value, &key_path);
            }
            Some(slot) => *slot = value.clone(),
            None => debug!(key = %key_path, "ignoring unknown config key"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_updates_known_keys_and_drops_unknown() {
        let config = SimConfig::default();
        let merged = config
            .merged(&json!({
                "food": { "spawn_rate": 12.5, "flavor": "sweet" },
                "telemetry": { "enabled": true },
                "seed": 7
            }))
            .unwrap();

        assert_eq!(merged.food.spawn_rate, 12.5);
        assert_eq!(merged.seed, 7);
        assert_eq!(merged.food.max_food, config.food.max_food);
    }

    #[test]
    fn merge_rejects_wrong_shapes_without_side_effects() {
        let config = SimConfig::default();
        let err = config.merged(&json!({ "world": { "size": "huge" } }));
        assert!(matches!(err, Err(SimError::InvalidConfig(_))));
        assert!(config.merged(&json!(3)).is_err());
    }

    #[test]
    fn merge_validates_result() {
        let err = SimConfig::default().merged(&json!({ "physics": { "drag": 1.5 } }));
        assert!(matches!(err, Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn scaling_multiplies_volumes() {
        let scaled = SimConfig::default().scaled(0.5).unwrap();
        assert_eq!(scaled.population.initial_prey, 100);
        assert_eq!(scaled.food.max_food, 300);
        assert!(SimConfig::default().scaled(0.0).is_err());
    }

    #[test]
    fn cell_size_covers_sense_radius() {
        let config = SimConfig::default();
        assert!(config.max_interaction_radius() >= config.genetics.predator.common.sense_radius.max);
    }
}
