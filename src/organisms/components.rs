use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::organisms::behavior::BehaviorState;
use crate::organisms::genetics::Genome;

new_key_type! {
    /// Stable handle for organisms backed by a generational slot map.
    pub struct OrganismId;
    /// Stable handle for food units.
    pub struct FoodId;
    /// Stable handle for obstacles.
    pub struct ObstacleId;
}

/// Species tag. Prey eat food; predators eat prey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Species {
    Prey,
    Predator,
}

impl Species {
    pub const ALL: [Species; 2] = [Species::Prey, Species::Predator];

    pub fn index(self) -> usize {
        match self {
            Species::Prey => 0,
            Species::Predator => 1,
        }
    }
}

/// Predator hunting style; scales speed, senses and reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PredatorSubtype {
    /// Long senses, average speed
    Stalker,
    /// Fast sprinter, short reach
    Chaser,
    /// Slow, long reach
    Ambusher,
}

impl PredatorSubtype {
    pub const ALL: [PredatorSubtype; 3] = [
        PredatorSubtype::Stalker,
        PredatorSubtype::Chaser,
        PredatorSubtype::Ambusher,
    ];

    pub fn index(self) -> usize {
        match self {
            PredatorSubtype::Stalker => 0,
            PredatorSubtype::Chaser => 1,
            PredatorSubtype::Ambusher => 2,
        }
    }

    pub fn speed_modifier(self) -> f32 {
        match self {
            PredatorSubtype::Stalker => 1.0,
            PredatorSubtype::Chaser => 1.25,
            PredatorSubtype::Ambusher => 0.8,
        }
    }

    pub fn sense_modifier(self) -> f32 {
        match self {
            PredatorSubtype::Stalker => 1.2,
            PredatorSubtype::Chaser => 0.9,
            PredatorSubtype::Ambusher => 1.0,
        }
    }

    pub fn reach_modifier(self) -> f32 {
        match self {
            PredatorSubtype::Stalker => 1.0,
            PredatorSubtype::Chaser => 0.8,
            PredatorSubtype::Ambusher => 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeathCause {
    Starvation,
    OldAge,
    Predation,
}

/// Current energy level, always within `[0, max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Energy {
    pub current: f32,
    pub max: f32,
}

impl Energy {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn with_energy(max: f32, current: f32) -> Self {
        Self {
            current: current.clamp(0.0, max),
            max,
        }
    }

    pub fn ratio(&self) -> f32 {
        if self.max > 0.0 {
            self.current / self.max
        } else {
            0.0
        }
    }

    pub fn is_depleted(&self) -> bool {
        self.current <= 0.0
    }

    /// Removes `amount`, flooring at zero.
    pub fn spend(&mut self, amount: f32) {
        self.current = (self.current - amount).clamp(0.0, self.max);
    }

    /// Adds `amount`, capped at `max`. Returns the energy actually gained.
    pub fn gain(&mut self, amount: f32) -> f32 {
        let before = self.current;
        self.current = (self.current + amount.max(0.0)).clamp(0.0, self.max);
        self.current - before
    }

    pub fn set(&mut self, value: f32) {
        self.current = value.clamp(0.0, self.max);
    }
}

/// Age in simulation ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Age(pub u32);

impl Age {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn increment(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    pub fn ticks(&self) -> u32 {
        self.0
    }
}

/// Reproduction cooldown (ticks remaining until organism can reproduce again)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproductionCooldown(pub u32);

impl ReproductionCooldown {
    pub fn new(ticks: u32) -> Self {
        Self(ticks)
    }

    pub fn is_ready(&self) -> bool {
        self.0 == 0
    }

    pub fn decrement(&mut self) {
        if self.0 > 0 {
            self.0 -= 1;
        }
    }

    pub fn reset(&mut self, ticks: u32) {
        self.0 = ticks;
    }
}

/// A living (or just-died) agent.
#[derive(Debug, Clone)]
pub struct Organism {
    pub id: OrganismId,
    /// Monotonic numeric id written into render buffers
    pub serial: u32,
    pub species: Species,
    pub genome: Arc<Genome>,
    pub position: Vec3,
    pub velocity: Vec3,
    pub energy: Energy,
    pub age: Age,
    pub state: BehaviorState,
    pub death: Option<DeathCause>,
    pub cooldown: ReproductionCooldown,
    /// Rendering hint only
    pub trail: bool,
}

impl Organism {
    pub fn radius(&self) -> f32 {
        self.genome.size
    }

    pub fn is_alive(&self) -> bool {
        self.death.is_none()
    }

    /// Marks the organism dead. The first recorded cause wins.
    pub fn mark_dead(&mut self, cause: DeathCause) {
        if self.death.is_none() {
            self.death = Some(cause);
        }
        self.state = BehaviorState::Dying;
        self.velocity = Vec3::ZERO;
    }

    pub fn info(&self) -> OrganismInfo {
        OrganismInfo {
            serial: self.serial,
            species: self.species,
            state: self.state,
            position: self.position,
            velocity: self.velocity,
            energy: self.energy.current,
            max_energy: self.energy.max,
            age: self.age.ticks(),
            death_cause: self.death,
            trail: self.trail,
            genome: (*self.genome).clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Food {
    pub id: FoodId,
    pub serial: u32,
    pub position: Vec3,
    pub energy: f32,
    pub consumed: bool,
}

impl Food {
    /// Marks the unit consumed and returns its energy.
    pub fn consume(&mut self) -> f32 {
        if self.consumed {
            return 0.0;
        }
        self.consumed = true;
        std::mem::take(&mut self.energy)
    }

    pub fn info(&self, radius: f32) -> FoodInfo {
        FoodInfo {
            serial: self.serial,
            position: self.position,
            energy: self.energy,
            radius,
            consumed: self.consumed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    pub id: ObstacleId,
    pub serial: u32,
    pub position: Vec3,
    pub radius: f32,
}

impl Obstacle {
    pub fn info(&self) -> ObstacleInfo {
        ObstacleInfo {
            serial: self.serial,
            position: self.position,
            radius: self.radius,
        }
    }
}

/// Read-only copy of an organism handed across the engine boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganismInfo {
    pub serial: u32,
    pub species: Species,
    pub state: BehaviorState,
    pub position: Vec3,
    pub velocity: Vec3,
    pub energy: f32,
    pub max_energy: f32,
    pub age: u32,
    pub death_cause: Option<DeathCause>,
    pub trail: bool,
    pub genome: Genome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodInfo {
    pub serial: u32,
    pub position: Vec3,
    pub energy: f32,
    pub radius: f32,
    pub consumed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObstacleInfo {
    pub serial: u32,
    pub position: Vec3,
    pub radius: f32,
}

/// Any entity resolved by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entityType", rename_all = "camelCase")]
pub enum EntityInfo {
    Organism(OrganismInfo),
    Food(FoodInfo),
    Obstacle(ObstacleInfo),
}
