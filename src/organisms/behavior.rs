use glam::Vec3;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::{PhysicsConfig, SpeciesMetabolism, SpeciesReproduction};
use crate::organisms::components::*;
use crate::world::EntityStore;

/// Behavior state machine - organisms are in exactly one of these states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BehaviorState {
    /// Drifting with a wander term (default state)
    #[default]
    Idle,
    /// Moving toward food (prey) or prey (predators)
    Seeking,
    /// Low-energy prey running from a predator
    Fleeing,
    /// Low-energy predator closing on prey
    Hunting,
    /// Ready to spawn a child this tick
    Reproducing,
    /// Marked dead; removed at the end of the tick
    Dying,
}

impl BehaviorState {
    /// Numeric tag written into render buffers.
    pub fn tag(self) -> u8 {
        match self {
            BehaviorState::Idle => 0,
            BehaviorState::Seeking => 1,
            BehaviorState::Fleeing => 2,
            BehaviorState::Hunting => 3,
            BehaviorState::Reproducing => 4,
            BehaviorState::Dying => 5,
        }
    }
}

/// Sensory information gathered once per tick from the spatial index
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensoryData {
    /// Nearest predator (for prey): id, position, distance
    pub nearest_threat: Option<(OrganismId, Vec3, f32)>,
    /// Nearest prey (for predators)
    pub nearest_prey: Option<(OrganismId, Vec3, f32)>,
    /// Nearest unconsumed food (for prey)
    pub nearest_food: Option<(FoodId, Vec3, f32)>,
    /// Sum of inverse-distance pushes away from close same-species neighbours
    pub separation: Vec3,
    /// Sum of inverse-distance pushes away from every sensed predator
    pub threat_push: Vec3,
    pub heading_sum: Vec3,
    pub position_sum: Vec3,
    pub flockmates: u32,
}

impl SensoryData {
    pub fn average_heading(&self) -> Option<Vec3> {
        (self.flockmates > 0).then(|| self.heading_sum / self.flockmates as f32)
    }

    pub fn centroid(&self) -> Option<Vec3> {
        (self.flockmates > 0).then(|| self.position_sum / self.flockmates as f32)
    }

    /// Target of the seek force: food for prey, prey for predators.
    pub fn seek_target(&self, species: Species) -> Option<Vec3> {
        match species {
            Species::Prey => self.nearest_food.map(|(_, pos, _)| pos),
            Species::Predator => self.nearest_prey.map(|(_, pos, _)| pos),
        }
    }

    /// Organism that triggers Fleeing or Hunting.
    pub fn threat(&self, species: Species) -> Option<(OrganismId, Vec3, f32)> {
        match species {
            Species::Prey => self.nearest_threat,
            Species::Predator => self.nearest_prey,
        }
    }
}

type Candidates = SmallVec<[(OrganismId, Vec3); 32]>;

/// Collect sensory information for an organism.
///
/// Reads only the spatial index and store, so it can run for every organism
/// in parallel against the same start-of-tick state.
pub fn collect_sensory_data(
    organism: &Organism,
    store: &EntityStore,
    physics: &PhysicsConfig,
) -> SensoryData {
    let mut sensory = SensoryData::default();
    if !organism.is_alive() {
        return sensory;
    }

    let position = organism.position;
    let range = organism.genome.perception_radius();
    let range_sq = range * range;

    let mut candidates = Candidates::new();
    store
        .organism_grid()
        .visit_candidates(position, range, |id, pos| candidates.push((id, pos)));

    for (other_id, other_pos) in candidates {
        if other_id == organism.id {
            continue;
        }
        let Some(other) = store.organism(other_id).filter(|o| o.is_alive()) else {
            continue;
        };
        let offset = position - other_pos;
        let distance_sq = offset.length_squared();
        if distance_sq > range_sq {
            continue;
        }
        let distance = distance_sq.sqrt();

        match (organism.species, other.species) {
            (a, b) if a == b => {
                if distance < physics.separation_radius && distance > f32::EPSILON {
                    sensory.separation += offset / distance_sq;
                }
                sensory.heading_sum += other.velocity;
                sensory.position_sum += other_pos;
                sensory.flockmates += 1;
            }
            (Species::Prey, Species::Predator) => {
                if distance > f32::EPSILON {
                    sensory.threat_push += offset / distance_sq;
                }
                if sensory.nearest_threat.map_or(true, |(_, _, d)| distance < d) {
                    sensory.nearest_threat = Some((other_id, other_pos, distance));
                }
            }
            (Species::Predator, Species::Prey) => {
                if sensory.nearest_prey.map_or(true, |(_, _, d)| distance < d) {
                    sensory.nearest_prey = Some((other_id, other_pos, distance));
                }
            }
            _ => {}
        }
    }

    if organism.species == Species::Prey {
        store.food_grid().visit_candidates(position, range, |food_id, food_pos| {
            let distance = position.distance(food_pos);
            if distance > range {
                return;
            }
            let available = store.food(food_id).is_some_and(|f| !f.consumed);
            if available && sensory.nearest_food.map_or(true, |(_, _, d)| distance < d) {
                sensory.nearest_food = Some((food_id, food_pos, distance));
            }
        });
    }

    sensory
}

/// True when the organism meets the energy, age and cooldown requirements.
pub fn can_reproduce(organism: &Organism, reproduction: &SpeciesReproduction) -> bool {
    organism.is_alive()
        && organism.energy.current >= organism.energy.max * reproduction.threshold_ratio
        && organism.age.ticks() >= reproduction.min_age
        && organism.cooldown.is_ready()
}

/// Make behavior decision based on sensory data and organism state.
///
/// Priority: dead > low-energy threat response > reproduction > seeking > idle.
pub fn decide_behavior(
    organism: &Organism,
    sensory: &SensoryData,
    metabolism: &SpeciesMetabolism,
    reproduction: &SpeciesReproduction,
) -> BehaviorState {
    if !organism.is_alive() {
        return BehaviorState::Dying;
    }

    let threat = sensory.threat(organism.species);
    if organism.energy.ratio() < metabolism.critical_energy_ratio && threat.is_some() {
        return match organism.species {
            Species::Prey => BehaviorState::Fleeing,
            Species::Predator => BehaviorState::Hunting,
        };
    }

    if threat.is_none() && can_reproduce(organism, reproduction) {
        return BehaviorState::Reproducing;
    }

    if sensory.seek_target(organism.species).is_some() {
        return BehaviorState::Seeking;
    }

    BehaviorState::Idle
}
