use std::sync::Arc;

use glam::Vec3;
use slotmap::SlotMap;

use crate::organisms::{
    Age, BehaviorState, Energy, Food, FoodId, Genome, Obstacle, ObstacleId, Organism, OrganismId,
    ReproductionCooldown, Species,
};
use crate::utils::SpatialHash;

/// Any entity the store can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Organism(OrganismId),
    Food(FoodId),
    Obstacle(ObstacleId),
}

/// Everything `purge_dead` took out of the store.
#[derive(Debug, Default)]
pub struct PurgeReport {
    /// Dead organisms in slot order
    pub organisms: Vec<Organism>,
    pub food_removed: usize,
}

/// Keyed collections of organisms, food and obstacles plus the spatial index
/// over them.
///
/// Removal is deferred: organisms are only marked dead during a tick and
/// food only flagged consumed, and [`EntityStore::purge_dead`] drops them at
/// the end. Iteration within a tick therefore sees a stable set of keys.
#[derive(Debug, Clone)]
pub struct EntityStore {
    organisms: SlotMap<OrganismId, Organism>,
    food: SlotMap<FoodId, Food>,
    obstacles: SlotMap<ObstacleId, Obstacle>,
    organism_grid: SpatialHash<OrganismId>,
    food_grid: SpatialHash<FoodId>,
    /// Largest body radius among indexed organisms
    max_radius: f32,
    food_radius: f32,
    index_dirty: bool,
    next_serial: u32,
}

impl EntityStore {
    pub fn new(world_size: f32, cell_size: f32, food_radius: f32) -> Self {
        Self {
            organisms: SlotMap::with_key(),
            food: SlotMap::with_key(),
            obstacles: SlotMap::with_key(),
            organism_grid: SpatialHash::new(world_size, cell_size),
            food_grid: SpatialHash::new(world_size, cell_size),
            max_radius: 0.0,
            food_radius,
            index_dirty: true,
            next_serial: 0,
        }
    }

    fn allocate_serial(&mut self) -> u32 {
        self.next_serial = self.next_serial.wrapping_add(1);
        self.next_serial
    }

    pub fn food_radius(&self) -> f32 {
        self.food_radius
    }

    /// Recreates the spatial index for new world dimensions. Entities keep
    /// their positions; the index is rebuilt on next use.
    pub fn resize(&mut self, world_size: f32, cell_size: f32, food_radius: f32) {
        self.organism_grid = SpatialHash::new(world_size, cell_size);
        self.food_grid = SpatialHash::new(world_size, cell_size);
        self.food_radius = food_radius;
        self.index_dirty = true;
    }

    // ---- organisms ----

    pub fn add_organism(
        &mut self,
        genome: Arc<Genome>,
        position: Vec3,
        energy: Energy,
        trail_every: Option<u32>,
    ) -> OrganismId {
        let serial = self.allocate_serial();
        let species = genome.species();
        let trail = trail_every.is_some_and(|every| every > 0 && serial % every == 0);
        self.index_dirty = true;
        self.organisms.insert_with_key(|id| Organism {
            id,
            serial,
            species,
            genome,
            position,
            velocity: Vec3::ZERO,
            energy,
            age: Age::new(),
            state: BehaviorState::Idle,
            death: None,
            cooldown: ReproductionCooldown::default(),
            trail,
        })
    }

    pub fn remove_organism(&mut self, id: OrganismId) -> Option<Organism> {
        self.index_dirty = true;
        self.organisms.remove(id)
    }

    pub fn organism(&self, id: OrganismId) -> Option<&Organism> {
        self.organisms.get(id)
    }

    /// Mutable access marks the spatial index stale.
    pub fn organism_mut(&mut self, id: OrganismId) -> Option<&mut Organism> {
        self.index_dirty = true;
        self.organisms.get_mut(id)
    }

    /// Organisms in slot order, including those marked dead this tick.
    pub fn organisms(&self) -> impl Iterator<Item = &Organism> {
        self.organisms.values()
    }

    pub fn organisms_mut(&mut self) -> impl Iterator<Item = &mut Organism> {
        self.index_dirty = true;
        self.organisms.values_mut()
    }

    pub fn organism_ids(&self) -> Vec<OrganismId> {
        self.organisms.keys().collect()
    }

    pub fn organism_count(&self) -> usize {
        self.organisms.len()
    }

    pub fn live_count(&self, species: Species) -> usize {
        self.organisms
            .values()
            .filter(|o| o.species == species && o.is_alive())
            .count()
    }

    pub fn live_total(&self) -> usize {
        self.organisms.values().filter(|o| o.is_alive()).count()
    }

    // ---- food ----

    pub fn add_food(&mut self, position: Vec3, energy: f32) -> FoodId {
        let serial = self.allocate_serial();
        self.index_dirty = true;
        self.food.insert_with_key(|id| Food {
            id,
            serial,
            position,
            energy,
            consumed: false,
        })
    }

    pub fn remove_food(&mut self, id: FoodId) -> Option<Food> {
        self.index_dirty = true;
        self.food.remove(id)
    }

    pub fn food(&self, id: FoodId) -> Option<&Food> {
        self.food.get(id)
    }

    pub fn food_mut(&mut self, id: FoodId) -> Option<&mut Food> {
        self.food.get_mut(id)
    }

    pub fn foods(&self) -> impl Iterator<Item = &Food> {
        self.food.values()
    }

    pub fn food_count(&self) -> usize {
        self.food.len()
    }

    pub fn available_food(&self) -> usize {
        self.food.values().filter(|f| !f.consumed).count()
    }

    // ---- obstacles ----

    pub fn add_obstacle(&mut self, position: Vec3, radius: f32) -> ObstacleId {
        let serial = self.allocate_serial();
        self.obstacles.insert_with_key(|id| Obstacle {
            id,
            serial,
            position,
            radius,
        })
    }

    pub fn obstacle(&self, id: ObstacleId) -> Option<&Obstacle> {
        self.obstacles.get(id)
    }

    pub fn obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.values()
    }

    pub fn obstacle_count(&self) -> usize {
        self.obstacles.len()
    }

    // ---- spatial index ----

    /// Re-inserts every live organism and unconsumed food unit.
    pub fn rebuild_index(&mut self) {
        self.organism_grid.rebuild(
            self.organisms
                .iter()
                .filter(|(_, o)| o.is_alive())
                .map(|(id, o)| (id, o.position)),
        );
        self.food_grid.rebuild(
            self.food
                .iter()
                .filter(|(_, f)| !f.consumed)
                .map(|(id, f)| (id, f.position)),
        );
        self.max_radius = self
            .organisms
            .values()
            .filter(|o| o.is_alive())
            .map(Organism::radius)
            .fold(0.0, f32::max);
        self.index_dirty = false;
    }

    /// Rebuilds the index only if something moved since the last rebuild.
    pub fn ensure_index(&mut self) {
        if self.index_dirty {
            self.rebuild_index();
        }
    }

    pub fn index_is_stale(&self) -> bool {
        self.index_dirty
    }

    pub fn organism_grid(&self) -> &SpatialHash<OrganismId> {
        &self.organism_grid
    }

    pub fn food_grid(&self) -> &SpatialHash<FoodId> {
        &self.food_grid
    }

    pub fn max_organism_radius(&self) -> f32 {
        self.max_radius
    }

    /// Nearest entity whose surface lies within `tolerance` of `position`.
    ///
    /// Organisms and food come from the spatial index, obstacles from a
    /// linear scan. Ties keep the first hit in organism, food, obstacle order.
    pub fn find_near(&self, position: Vec3, tolerance: f32) -> Option<EntityRef> {
        if !position.is_finite() || !tolerance.is_finite() || tolerance < 0.0 {
            return None;
        }
        let mut best: Option<(EntityRef, f32)> = None;
        let mut consider = |candidate: EntityRef, gap: f32| {
            if gap <= tolerance && best.map_or(true, |(_, b)| gap < b) {
                best = Some((candidate, gap));
            }
        };

        self.organism_grid
            .visit_candidates(position, tolerance + self.max_radius, |id, _| {
                if let Some(o) = self.organisms.get(id) {
                    let gap = (o.position.distance(position) - o.radius()).max(0.0);
                    consider(EntityRef::Organism(id), gap);
                }
            });
        self.food_grid
            .visit_candidates(position, tolerance + self.food_radius, |id, _| {
                if let Some(f) = self.food.get(id).filter(|f| !f.consumed) {
                    let gap = (f.position.distance(position) - self.food_radius).max(0.0);
                    consider(EntityRef::Food(id), gap);
                }
            });
        for (id, obstacle) in &self.obstacles {
            let gap = (obstacle.position.distance(position) - obstacle.radius).max(0.0);
            consider(EntityRef::Obstacle(id), gap);
        }

        best.map(|(entity, _)| entity)
    }

    /// Removes organisms marked dead and consumed food.
    pub fn purge_dead(&mut self) -> PurgeReport {
        let dead: Vec<OrganismId> = self
            .organisms
            .iter()
            .filter(|(_, o)| !o.is_alive())
            .map(|(id, _)| id)
            .collect();
        let eaten: Vec<FoodId> = self
            .food
            .iter()
            .filter(|(_, f)| f.consumed)
            .map(|(id, _)| id)
            .collect();

        let mut report = PurgeReport {
            organisms: Vec::with_capacity(dead.len()),
            food_removed: eaten.len(),
        };
        for id in dead {
            if let Some(organism) = self.organisms.remove(id) {
                report.organisms.push(organism);
            }
        }
        for id in eaten {
            self.food.remove(id);
        }
        if !report.organisms.is_empty() || report.food_removed > 0 {
            self.index_dirty = true;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneticsConfig;
    use crate::organisms::{DeathCause, GenomeFactory};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn genome(species: Species) -> Arc<Genome> {
        let mut rng = StdRng::seed_from_u64(1);
        Arc::new(GenomeFactory::new().create_base(
            &mut rng,
            &GeneticsConfig::default(),
            species,
            None,
        ))
    }

    #[test]
    fn purge_is_deferred_until_called() {
        let mut store = EntityStore::new(100.0, 10.0, 1.0);
        let a = store.add_organism(genome(Species::Prey), Vec3::ZERO, Energy::new(10.0), None);
        let b = store.add_organism(genome(Species::Prey), Vec3::ONE, Energy::new(10.0), None);
        let food = store.add_food(Vec3::X, 5.0);

        store.organism_mut(a).unwrap().mark_dead(DeathCause::Starvation);
        store.food_mut(food).unwrap().consume();
        assert_eq!(store.organism_count(), 2);
        assert_eq!(store.live_total(), 1);

        let report = store.purge_dead();
        assert_eq!(report.organisms.len(), 1);
        assert_eq!(report.organisms[0].id, a);
        assert_eq!(report.food_removed, 1);
        assert!(store.organism(a).is_none());
        assert!(store.organism(b).is_some());
        assert_eq!(store.food_count(), 0);
    }

    #[test]
    fn removed_keys_are_not_resolved_after_slot_reuse() {
        let mut store = EntityStore::new(100.0, 10.0, 1.0);
        let old = store.add_food(Vec3::ZERO, 5.0);
        store.remove_food(old);
        let new = store.add_food(Vec3::ZERO, 5.0);
        assert_ne!(old, new);
        assert!(store.food(old).is_none());
    }

    #[test]
    fn find_near_prefers_closest_surface() {
        let mut store = EntityStore::new(100.0, 10.0, 1.0);
        let obstacle = store.add_obstacle(Vec3::new(20.0, 0.0, 0.0), 5.0);
        let food = store.add_food(Vec3::new(3.0, 0.0, 0.0), 5.0);
        store.rebuild_index();

        assert_eq!(
            store.find_near(Vec3::new(2.5, 0.0, 0.0), 1.0),
            Some(EntityRef::Food(food))
        );
        assert_eq!(
            store.find_near(Vec3::new(14.5, 0.0, 0.0), 1.0),
            Some(EntityRef::Obstacle(obstacle))
        );
        assert_eq!(store.find_near(Vec3::new(-30.0, 0.0, 0.0), 1.0), None);
    }

    #[test]
    fn index_tracks_mutation() {
        let mut store = EntityStore::new(100.0, 10.0, 1.0);
        let id = store.add_organism(genome(Species::Predator), Vec3::ZERO, Energy::new(10.0), None);
        store.rebuild_index();
        assert!(!store.index_is_stale());

        store.organism_mut(id).unwrap().position = Vec3::splat(30.0);
        store.ensure_index();
        let hits = store.organism_grid().within(Vec3::splat(30.0), 0.5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, id);
    }
}
