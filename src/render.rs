//! Flat render buffers handed to the presentation layer once per tick.
//!
//! Organism slots have [`ORGANISM_STRIDE`] floats:
//! `pos.xyz, vel.xyz, radius, dead, serial, type, state, age, max_energy`.
//! Food slots have [`FOOD_STRIDE`] floats: `pos.xyz, radius, serial`.
//! The `*_count` fields give the number of valid slots in each array.

use serde::{Deserialize, Serialize};

use crate::organisms::{FoodId, Organism, OrganismId, Species};
use crate::world::EntityStore;

pub const ORGANISM_STRIDE: usize = 13;
pub const FOOD_STRIDE: usize = 5;

/// Serialized state of one tick. Owned copies; nothing here aliases the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderBuffers {
    pub prey: Vec<f32>,
    pub prey_count: usize,
    pub predators: Vec<f32>,
    pub predator_count: usize,
    pub food: Vec<f32>,
    pub food_count: usize,
}

impl RenderBuffers {
    pub fn organism_slot(&self, species: Species, index: usize) -> Option<&[f32]> {
        let (data, count) = match species {
            Species::Prey => (&self.prey, self.prey_count),
            Species::Predator => (&self.predators, self.predator_count),
        };
        (index < count).then(|| &data[index * ORGANISM_STRIDE..(index + 1) * ORGANISM_STRIDE])
    }

    pub fn food_slot(&self, index: usize) -> Option<&[f32]> {
        (index < self.food_count).then(|| &self.food[index * FOOD_STRIDE..(index + 1) * FOOD_STRIDE])
    }
}

/// Type tag: prey 0, predators `1 + subtype index`.
pub fn type_tag(organism: &Organism) -> f32 {
    match organism.genome.subtype() {
        None => 0.0,
        Some(subtype) => 1.0 + subtype.index() as f32,
    }
}

fn write_organism(out: &mut Vec<f32>, organism: &Organism) {
    let dead = if organism.is_alive() { 0.0 } else { 1.0 };
    out.extend_from_slice(&[
        organism.position.x,
        organism.position.y,
        organism.position.z,
        organism.velocity.x,
        organism.velocity.y,
        organism.velocity.z,
        organism.radius(),
        dead,
        organism.serial as f32,
        type_tag(organism),
        organism.state.tag() as f32,
        organism.age.ticks() as f32,
        organism.energy.max,
    ]);
}

/// What a serialized organism slot points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRef {
    Live(OrganismId),
    /// Index into the engine's graveyard of recently removed organisms
    Dead(usize),
}

/// Slot-to-entity mapping of the last serialized buffers.
#[derive(Debug, Clone, Default)]
pub struct SlotTable {
    prey: Vec<SlotRef>,
    predators: Vec<SlotRef>,
    food: Vec<FoodId>,
}

impl SlotTable {
    pub fn organism(&self, species: Species, index: usize) -> Option<SlotRef> {
        match species {
            Species::Prey => self.prey.get(index).copied(),
            Species::Predator => self.predators.get(index).copied(),
        }
    }

    pub fn food(&self, index: usize) -> Option<FoodId> {
        self.food.get(index).copied()
    }

    pub fn clear(&mut self) {
        self.prey.clear();
        self.predators.clear();
        self.food.clear();
    }
}

/// Writes live organisms (slot order), then organisms that died this tick
/// with the dead flag set, then unconsumed food.
///
/// `departed` pairs each removed organism with its graveyard index.
pub fn serialize_buffers(
    store: &EntityStore,
    departed: &[(usize, &Organism)],
    food_radius: f32,
    slots: &mut SlotTable,
) -> RenderBuffers {
    slots.clear();
    let mut buffers = RenderBuffers::default();

    for organism in store.organisms().filter(|o| o.is_alive()) {
        let (data, table) = match organism.species {
            Species::Prey => (&mut buffers.prey, &mut slots.prey),
            Species::Predator => (&mut buffers.predators, &mut slots.predators),
        };
        write_organism(data, organism);
        table.push(SlotRef::Live(organism.id));
    }
    for &(grave, organism) in departed {
        let (data, table) = match organism.species {
            Species::Prey => (&mut buffers.prey, &mut slots.prey),
            Species::Predator => (&mut buffers.predators, &mut slots.predators),
        };
        write_organism(data, organism);
        table.push(SlotRef::Dead(grave));
    }

    for food in store.foods().filter(|f| !f.consumed) {
        buffers.food.extend_from_slice(&[
            food.position.x,
            food.position.y,
            food.position.z,
            food_radius,
            food.serial as f32,
        ]);
        slots.food.push(food.id);
    }

    buffers.prey_count = slots.prey.len();
    buffers.predator_count = slots.predators.len();
    buffers.food_count = slots.food.len();
    buffers
}
