//! The simulation engine: owns all state and runs one fixed-size tick at a time.

use std::collections::VecDeque;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::organisms::*;
use crate::render::{serialize_buffers, RenderBuffers, SlotRef, SlotTable};
use crate::scheduler::TIMESTEP;
use crate::world::{generate_obstacles, EcologicalZone, EntityRef, EntityStore, FoodSpawner, ZoneMap};

/// Recently removed organisms kept for `getEntityByInstanceId` on dead slots.
const GRAVEYARD_CAPACITY: usize = 256;
/// Removed organisms waiting for their one dead-flagged frame.
const PENDING_DEAD_CAPACITY: usize = 4096;

/// Entity category as used by slot lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Prey,
    Predator,
    Food,
}

pub struct SimulationEngine {
    config: SimConfig,
    rng: StdRng,
    store: EntityStore,
    factory: GenomeFactory,
    lineage: GeneticTree,
    zones: ZoneMap,
    spawner: FoodSpawner,
    stats: StatisticsAggregator,
    tick: u64,
    /// Obstacle centres and radii, cached for steering
    obstacle_shapes: Vec<(Vec3, f32)>,
    slots: SlotTable,
    graveyard: VecDeque<(usize, Organism)>,
    next_grave: usize,
    /// Graveyard entries removed since the last serialized frame
    departed: VecDeque<usize>,
}

impl SimulationEngine {
    /// Builds a fresh world from `config`: zones, obstacles, food, founders.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut store = EntityStore::new(
            config.world.size,
            config.max_interaction_radius(),
            config.food.radius,
        );
        let zones = ZoneMap::generate(&mut rng, &config.world);
        generate_obstacles(&mut rng, &config.world, &mut store);

        let mut spawner = FoodSpawner::new();
        spawner.seed(
            &mut rng,
            &config.food,
            &zones,
            config.world.half_extent(),
            &mut store,
        );

        let mut factory = GenomeFactory::new();
        let mut lineage = GeneticTree::new();
        spawn_initial_organisms(&mut rng, &config, &mut factory, &mut lineage, &mut store);
        store.rebuild_index();

        let mut stats = StatisticsAggregator::new(config.statistics.clone());
        stats.aggregate(0, &store, TickEvents::default());

        let obstacle_shapes = store.obstacles().map(|o| (o.position, o.radius)).collect();
        info!(
            seed = config.seed,
            world_size = config.world.size,
            organisms = store.organism_count(),
            food = store.food_count(),
            obstacles = store.obstacle_count(),
            zones = zones.zones().len(),
            "simulation initialized"
        );

        Ok(Self {
            config,
            rng,
            store,
            factory,
            lineage,
            zones,
            spawner,
            stats,
            tick: 0,
            obstacle_shapes,
            slots: SlotTable::default(),
            graveyard: VecDeque::new(),
            next_grave: 0,
            departed: VecDeque::new(),
        })
    }

    /// Rebuilds the world from the current configuration and seed.
    pub fn reset(&mut self) -> SimResult<()> {
        *self = Self::new(self.config.clone())?;
        Ok(())
    }

    /// Merges a partial configuration. Zones and obstacles are generated once
    /// per world and stay as they are; everything else applies from the next
    /// tick on.
    pub fn set_config(&mut self, patch: &Value) -> SimResult<()> {
        let merged = self.config.merged(patch)?;
        let reindex = merged.world.size != self.config.world.size
            || merged.max_interaction_radius() != self.config.max_interaction_radius()
            || merged.food.radius != self.config.food.radius;
        if reindex {
            self.store.resize(
                merged.world.size,
                merged.max_interaction_radius(),
                merged.food.radius,
            );
        }
        self.stats.set_config(merged.statistics.clone());
        self.config = merged;
        debug!(reindex, "configuration updated");
        Ok(())
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn stats(&self) -> &StatsSnapshot {
        self.stats.latest()
    }

    pub fn stats_history(&self) -> Vec<StatsSnapshot> {
        self.stats.history()
    }

    pub fn zones(&self) -> &[EcologicalZone] {
        self.zones.zones()
    }

    pub fn obstacles(&self) -> Vec<ObstacleInfo> {
        self.store.obstacles().map(Obstacle::info).collect()
    }

    pub fn genetic_node(&self, id: GenomeId) -> Option<GeneticTreeNode> {
        self.lineage.node(id).cloned()
    }

    pub fn genetic_roots(&self) -> Vec<GeneticTreeNode> {
        self.lineage.roots()
    }

    fn species_settings(
        config: &SimConfig,
        species: Species,
    ) -> (&crate::config::SpeciesMetabolism, &crate::config::SpeciesReproduction) {
        match species {
            Species::Prey => (&config.metabolism.prey, &config.reproduction.prey),
            Species::Predator => (&config.metabolism.predator, &config.reproduction.predator),
        }
    }

    /// Advances the world by one `TIMESTEP`.
    ///
    /// Order: index rebuild, sensing and behavior, steering, metabolism with
    /// foraging, natural death, predation, reproduction, food spawn, purge,
    /// statistics.
    pub fn tick(&mut self) -> StatsSnapshot {
        self.tick += 1;
        let tick = self.tick;
        let config = &self.config;
        let store = &mut self.store;
        let mut events = TickEvents::default();

        store.rebuild_index();
        let ids = store.organism_ids();

        // Sense against the start-of-tick state
        let sensory: Vec<SensoryData> = {
            let view: &EntityStore = &*store;
            ids.par_iter()
                .map(|id| {
                    view.organism(*id)
                        .map(|o| collect_sensory_data(o, view, &config.physics))
                        .unwrap_or_default()
                })
                .collect()
        };

        for (id, sensed) in ids.iter().zip(&sensory) {
            if let Some(organism) = store.organism_mut(*id) {
                let (metabolism, reproduction) = Self::species_settings(config, organism.species);
                organism.state = decide_behavior(organism, sensed, metabolism, reproduction);
            }
        }

        let ctx = SteeringContext {
            physics: &config.physics,
            obstacles: &self.obstacle_shapes,
            half_extent: config.world.half_extent(),
            tick,
        };
        let forces: Vec<Vec3> = {
            let view: &EntityStore = &*store;
            ids.par_iter()
                .zip(sensory.par_iter())
                .map(|(id, sensed)| {
                    view.organism(*id)
                        .map(|o| compute_steering(o, sensed, &ctx))
                        .unwrap_or(Vec3::ZERO)
                })
                .collect()
        };
        for (id, force) in ids.iter().zip(forces) {
            if let Some(organism) = store.organism_mut(*id) {
                integrate(organism, force, &ctx, TIMESTEP);
            }
        }

        for organism in store.organisms_mut() {
            let (metabolism, _) = Self::species_settings(config, organism.species);
            let danger = self.zones.danger_at(organism.position);
            apply_metabolism(organism, metabolism, danger);
        }

        // Positions are final for this tick from here on
        store.ensure_index();
        resolve_foraging(store, &config.food);
        for organism in store.organisms_mut() {
            let (metabolism, _) = Self::species_settings(config, organism.species);
            resolve_natural_death(organism, metabolism);
        }

        let kills = resolve_predation(store, &config.predation);
        if !kills.is_empty() {
            debug!(tick, kills = kills.len(), "predation resolved");
        }

        let births = resolve_reproduction(
            store,
            &mut ReproductionContext {
                rng: &mut self.rng,
                factory: &mut self.factory,
                lineage: &mut self.lineage,
                genetics: &config.genetics,
                metabolism: &config.metabolism,
                reproduction: &config.reproduction,
                max_organisms: config.population.max_organisms,
                half_extent: config.world.half_extent(),
                trail_every: trail_interval(config),
                tick,
            },
        );
        for birth in &births {
            events.record_birth(birth.species);
        }

        self.spawner.tick(
            &mut self.rng,
            &config.food,
            &self.zones,
            config.world.half_extent(),
            TIMESTEP,
            store,
        );

        let report = store.purge_dead();
        handle_deaths(&report.organisms, &mut self.lineage, &mut events, tick);
        self.stats.observe_departed(&report.organisms);
        self.bury(report.organisms);

        self.stats.aggregate(tick, &self.store, events)
    }

    /// Runs `count` ticks and returns the last snapshot.
    pub fn run_ticks(&mut self, count: u32) -> StatsSnapshot {
        let mut last = self.stats.latest().clone();
        for _ in 0..count {
            last = self.tick();
        }
        last
    }

    fn bury(&mut self, organisms: Vec<Organism>) {
        for organism in organisms {
            let grave = self.next_grave;
            self.next_grave += 1;
            self.graveyard.push_back((grave, organism));
            self.departed.push_back(grave);
        }
        while self.departed.len() > PENDING_DEAD_CAPACITY {
            self.departed.pop_front();
        }
        let keep = GRAVEYARD_CAPACITY.max(self.departed.len());
        while self.graveyard.len() > keep {
            self.graveyard.pop_front();
        }
    }

    fn grave(&self, grave: usize) -> Option<&Organism> {
        self.graveyard
            .iter()
            .find(|(index, _)| *index == grave)
            .map(|(_, organism)| organism)
    }

    /// Serializes the current state and remembers its slot layout.
    ///
    /// Every organism removed since the previous call appears exactly once
    /// with the dead flag set.
    pub fn render_buffers(&mut self) -> RenderBuffers {
        let buffers = self.peek_render_buffers();
        self.acknowledge_frame();
        buffers
    }

    /// Like [`render_buffers`](Self::render_buffers) but keeps removed
    /// organisms pending until [`acknowledge_frame`](Self::acknowledge_frame).
    pub fn peek_render_buffers(&mut self) -> RenderBuffers {
        let departed: Vec<(usize, &Organism)> = self
            .departed
            .iter()
            .filter_map(|&grave| {
                self.graveyard
                    .iter()
                    .find(|(index, _)| *index == grave)
                    .map(|(index, organism)| (*index, organism))
            })
            .collect();
        serialize_buffers(&self.store, &departed, self.config.food.radius, &mut self.slots)
    }

    /// Marks the pending dead organisms as delivered.
    pub fn acknowledge_frame(&mut self) {
        self.departed.clear();
    }

    /// Nearest entity whose surface lies within `tolerance` of `position`.
    pub fn find_entity_at(&mut self, position: Vec3, tolerance: f32) -> SimResult<Option<EntityInfo>> {
        if !position.is_finite() || !tolerance.is_finite() || tolerance < 0.0 {
            return Err(SimError::InvalidCommand(
                "findEntityAt needs a finite position and a non-negative tolerance".to_string(),
            ));
        }
        self.store.ensure_index();
        let found = self.store.find_near(position, tolerance);
        Ok(found.and_then(|entity| self.entity_info(entity)))
    }

    fn entity_info(&self, entity: EntityRef) -> Option<EntityInfo> {
        match entity {
            EntityRef::Organism(id) => self.store.organism(id).map(|o| EntityInfo::Organism(o.info())),
            EntityRef::Food(id) => self
                .store
                .food(id)
                .map(|f| EntityInfo::Food(f.info(self.config.food.radius))),
            EntityRef::Obstacle(id) => self.store.obstacle(id).map(|o| EntityInfo::Obstacle(o.info())),
        }
    }

    /// Resolves a slot of the last serialized buffers.
    ///
    /// `is_dead` selects organisms serialized with the dead flag; a mismatch
    /// between the flag and the slot resolves to nothing.
    pub fn entity_by_instance(
        &self,
        kind: EntityKind,
        instance: usize,
        is_dead: bool,
    ) -> Option<EntityInfo> {
        let species = match kind {
            EntityKind::Prey => Species::Prey,
            EntityKind::Predator => Species::Predator,
            EntityKind::Food => {
                return self
                    .slots
                    .food(instance)
                    .and_then(|id| self.store.food(id))
                    .map(|f| EntityInfo::Food(f.info(self.config.food.radius)));
            }
        };
        match (self.slots.organism(species, instance)?, is_dead) {
            (SlotRef::Live(id), false) => self
                .store
                .organism(id)
                .or_else(|| self.graveyard.iter().map(|(_, o)| o).find(|o| o.id == id))
                .map(|o| EntityInfo::Organism(o.info())),
            (SlotRef::Dead(grave), true) => self.grave(grave).map(|o| EntityInfo::Organism(o.info())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;

    fn small_config() -> SimConfig {
        let mut config = SimConfig::default();
        config.world.size = 120.0;
        config.world.obstacle_count = 2;
        config.world.zone_count = 2;
        config.population.initial_prey = 40;
        config.population.initial_predators = 6;
        config.population.max_organisms = 120;
        config.food.initial_food = 60;
        config.food.max_food = 120;
        config.statistics.summary_interval = 0;
        config
    }

    #[test]
    fn initial_world_matches_config() {
        let engine = SimulationEngine::new(small_config()).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.prey_count, 40);
        assert_eq!(stats.predator_count, 6);
        assert_eq!(stats.food_count, 60);
        assert_eq!(engine.obstacles().len(), 2);
        assert_eq!(engine.genetic_roots().len(), 46);
    }

    #[test]
    fn ticks_advance_and_counts_match_store() {
        let mut engine = SimulationEngine::new(small_config()).unwrap();
        for _ in 0..120 {
            let stats = engine.tick();
            assert_eq!(stats.total_population, engine.store().organism_count());
            assert_eq!(stats.food_count, engine.store().food_count());
        }
        assert_eq!(engine.tick_count(), 120);
    }

    #[test]
    fn slot_lookup_resolves_live_organisms() {
        let mut engine = SimulationEngine::new(small_config()).unwrap();
        engine.tick();
        let buffers = engine.render_buffers();
        assert!(buffers.prey_count > 0);

        let info = engine.entity_by_instance(EntityKind::Prey, 0, false);
        assert!(matches!(info, Some(EntityInfo::Organism(o)) if o.species == Species::Prey));
        assert!(engine.entity_by_instance(EntityKind::Prey, 0, true).is_none());
        assert!(engine
            .entity_by_instance(EntityKind::Predator, 10_000, false)
            .is_none());
    }

    #[test]
    fn set_config_keeps_world_and_rejects_bad_patches() {
        let mut engine = SimulationEngine::new(small_config()).unwrap();
        engine
            .set_config(&serde_json::json!({ "food": { "spawn_rate": 5.0 }, "bogus": 1 }))
            .unwrap();
        assert_eq!(engine.config().food.spawn_rate, 5.0);
        assert!(engine
            .set_config(&serde_json::json!({ "physics": { "drag": "fast" } }))
            .is_err());
        assert_eq!(engine.config().physics.drag, PhysicsConfig::default().drag);
    }

    #[test]
    fn find_entity_rejects_non_finite_input() {
        let mut engine = SimulationEngine::new(small_config()).unwrap();
        assert!(engine.find_entity_at(Vec3::splat(f32::NAN), 1.0).is_err());
        let obstacle = engine.obstacles()[0].clone();
        let found = engine.find_entity_at(obstacle.position, 0.5).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn deaths_across_catch_up_ticks_are_flagged_once() {
        let mut config = small_config();
        config.metabolism.prey.max_age = 3;
        let mut engine = SimulationEngine::new(config).unwrap();
        engine.run_ticks(10);
        let deaths = engine.stats().total_deaths;
        assert!(deaths >= 40);

        let buffers = engine.render_buffers();
        let mut flagged = 0u64;
        for (kind, species, count) in [
            (EntityKind::Prey, Species::Prey, buffers.prey_count),
            (EntityKind::Predator, Species::Predator, buffers.predator_count),
        ] {
            for index in 0..count {
                let slot = buffers.organism_slot(species, index).unwrap();
                if slot[7] > 0.5 {
                    flagged += 1;
                    let info = engine.entity_by_instance(kind, index, true);
                    assert!(matches!(info, Some(EntityInfo::Organism(o)) if o.death_cause.is_some()));
                }
            }
        }
        assert_eq!(flagged, deaths);

        let next = engine.render_buffers();
        let dead_again = (0..next.prey_count)
            .filter(|&i| next.organism_slot(Species::Prey, i).unwrap()[7] > 0.5)
            .count();
        assert_eq!(dead_again, 0);
    }

    #[test]
    fn very_large_world_resize_stays_sparse() {
        let mut engine = SimulationEngine::new(small_config()).unwrap();
        engine
            .set_config(&serde_json::json!({ "world": { "size": 200000.0 } }))
            .unwrap();
        assert_eq!(engine.config().world.size, 200000.0);
        let stats = engine.run_ticks(3);
        assert_eq!(stats.total_population, engine.store().organism_count());
        assert!(engine.store().organism_grid().occupied_buckets() <= engine.store().organism_count());
    }
}
