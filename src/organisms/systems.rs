use std::sync::Arc;

use glam::Vec3;
use rand::Rng;
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::organisms::components::*;
use crate::organisms::ecosystem_stats::TickEvents;
use crate::organisms::genetics::GenomeFactory;
use crate::organisms::lineage::GeneticTree;
use crate::world::{overlaps_obstacle, EntityStore};

const PLACEMENT_ATTEMPTS: usize = 16;

/// Trail sampling interval, `None` when trails are off.
pub fn trail_interval(config: &SimConfig) -> Option<u32> {
    config
        .visualization
        .show_trails
        .then_some(config.visualization.trail_every)
}

fn free_position<R: Rng>(rng: &mut R, store: &EntityStore, half_extent: f32, radius: f32) -> Vec3 {
    let limit = (half_extent - radius).max(0.0);
    let mut candidate = Vec3::ZERO;
    for _ in 0..PLACEMENT_ATTEMPTS {
        candidate = Vec3::new(
            rng.gen_range(-limit..=limit),
            rng.gen_range(-limit..=limit),
            rng.gen_range(-limit..=limit),
        );
        if !overlaps_obstacle(store, candidate, radius) {
            break;
        }
    }
    candidate
}

/// Spawn one founder organism of `species`.
pub fn spawn_founder<R: Rng>(
    rng: &mut R,
    config: &SimConfig,
    factory: &mut GenomeFactory,
    lineage: &mut GeneticTree,
    store: &mut EntityStore,
    species: Species,
    tick: u64,
) -> OrganismId {
    let genome = factory.create_base(rng, &config.genetics, species, None);
    lineage.register(&genome, tick);

    let metabolism = match species {
        Species::Prey => &config.metabolism.prey,
        Species::Predator => &config.metabolism.predator,
    };
    let energy = Energy::with_energy(
        metabolism.max_energy,
        metabolism.max_energy * metabolism.initial_energy_ratio,
    );
    let position = free_position(rng, store, config.world.half_extent(), genome.size);
    store.add_organism(Arc::new(genome), position, energy, trail_interval(config))
}

/// Spawn initial organisms in the world, capped at the population limit.
pub fn spawn_initial_organisms<R: Rng>(
    rng: &mut R,
    config: &SimConfig,
    factory: &mut GenomeFactory,
    lineage: &mut GeneticTree,
    store: &mut EntityStore,
) -> usize {
    let cap = config.population.max_organisms;
    let prey = config.population.initial_prey.min(cap);
    let predators = config.population.initial_predators.min(cap - prey);

    for _ in 0..prey {
        spawn_founder(rng, config, factory, lineage, store, Species::Prey, 0);
    }
    for _ in 0..predators {
        spawn_founder(rng, config, factory, lineage, store, Species::Predator, 0);
    }

    info!("Spawned {} prey and {} predators", prey, predators);
    prey + predators
}

/// Record removed organisms in the lineage tree and the tick's events.
pub fn handle_deaths(
    departed: &[Organism],
    lineage: &mut GeneticTree,
    events: &mut TickEvents,
    tick: u64,
) {
    for organism in departed {
        let Some(cause) = organism.death else {
            continue;
        };
        lineage.record_death(organism.genome.id, tick, cause);
        events.record_death(organism.species, cause);
        debug!(
            serial = organism.serial,
            species = ?organism.species,
            ?cause,
            age = organism.age.ticks(),
            generation = organism.genome.generation,
            "organism died"
        );
    }
}
