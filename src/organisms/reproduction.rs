use std::sync::Arc;

use glam::Vec3;
use rand::Rng;
use tracing::debug;

use crate::config::{GeneticsConfig, MetabolismConfig, ReproductionConfig};
use crate::organisms::behavior::BehaviorState;
use crate::organisms::components::{Energy, OrganismId, Species};
use crate::organisms::genetics::GenomeFactory;
use crate::organisms::lineage::GeneticTree;
use crate::world::EntityStore;

/// One birth produced this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Birth {
    pub parent: OrganismId,
    pub child: OrganismId,
    pub species: Species,
}

/// Everything reproduction needs besides the store.
pub struct ReproductionContext<'a, R: Rng> {
    pub rng: &'a mut R,
    pub factory: &'a mut GenomeFactory,
    pub lineage: &'a mut GeneticTree,
    pub genetics: &'a GeneticsConfig,
    pub metabolism: &'a MetabolismConfig,
    pub reproduction: &'a ReproductionConfig,
    pub max_organisms: usize,
    pub half_extent: f32,
    /// Every n-th serial carries a trail; `None` disables trails
    pub trail_every: Option<u32>,
    pub tick: u64,
}

fn random_offset<R: Rng>(rng: &mut R, max: f32) -> Vec3 {
    let direction = Vec3::new(
        rng.gen_range(-1.0f32..=1.0),
        rng.gen_range(-1.0f32..=1.0),
        rng.gen_range(-1.0f32..=1.0),
    )
    .normalize_or_zero();
    direction * rng.gen_range(0.0..=max.max(0.0))
}

/// Every live organism in `Reproducing` spawns one mutated child while the
/// population stays under the cap.
///
/// Parent and child both end up with `parent_energy * (1 - cost)`, the child
/// clamped to its own maximum. The parent's cooldown is reset.
pub fn resolve_reproduction<R: Rng>(
    store: &mut EntityStore,
    ctx: &mut ReproductionContext<'_, R>,
) -> Vec<Birth> {
    let mut population = store.live_total();
    let mut births = Vec::new();
    let keep = 1.0 - ctx.reproduction.energy_cost_multiplier;

    for parent_id in store.organism_ids() {
        if population >= ctx.max_organisms {
            debug!(population, cap = ctx.max_organisms, "population cap reached");
            break;
        }
        let Some(parent) = store.organism_mut(parent_id) else {
            continue;
        };
        if !parent.is_alive() || parent.state != BehaviorState::Reproducing {
            continue;
        }

        let species = parent.species;
        let settings = match species {
            Species::Prey => &ctx.reproduction.prey,
            Species::Predator => &ctx.reproduction.predator,
        };
        let remaining = parent.energy.current * keep;
        parent.energy.set(remaining);
        parent.cooldown.reset(settings.cooldown);
        let parent_genome = Arc::clone(&parent.genome);
        let parent_position = parent.position;

        let genome = ctx.factory.mutate(
            &mut *ctx.rng,
            ctx.genetics,
            &parent_genome,
            ctx.genetics.mutation_factor,
        );
        ctx.lineage.register(&genome, ctx.tick);

        let limit = (ctx.half_extent - genome.size).max(0.0);
        let offset = random_offset(&mut *ctx.rng, ctx.reproduction.spawn_offset);
        let position = (parent_position + offset).clamp(Vec3::splat(-limit), Vec3::splat(limit));
        let max_energy = match species {
            Species::Prey => ctx.metabolism.prey.max_energy,
            Species::Predator => ctx.metabolism.predator.max_energy,
        };
        let child = store.add_organism(
            Arc::new(genome),
            position,
            Energy::with_energy(max_energy, remaining),
            ctx.trail_every,
        );

        population += 1;
        births.push(Birth {
            parent: parent_id,
            child,
            species,
        });
    }
    births
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::organisms::components::Age;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn cap_limits_births() {
        let config = SimConfig::default();
        let mut rng = StdRng::seed_from_u64(2);
        let mut factory = GenomeFactory::new();
        let mut lineage = GeneticTree::new();
        let mut store = EntityStore::new(100.0, 20.0, 1.0);

        for i in 0..3 {
            let genome = factory.create_base(&mut rng, &config.genetics, Species::Prey, None);
            lineage.register(&genome, 0);
            let id = store.add_organism(
                Arc::new(genome),
                Vec3::new(i as f32 * 5.0, 0.0, 0.0),
                Energy::new(100.0),
                None,
            );
            let organism = store.organism_mut(id).unwrap();
            organism.state = BehaviorState::Reproducing;
            organism.age = Age(1000);
        }

        let mut ctx = ReproductionContext {
            rng: &mut rng,
            factory: &mut factory,
            lineage: &mut lineage,
            genetics: &config.genetics,
            metabolism: &config.metabolism,
            reproduction: &config.reproduction,
            max_organisms: 4,
            half_extent: 50.0,
            trail_every: None,
            tick: 10,
        };
        let births = resolve_reproduction(&mut store, &mut ctx);
        assert_eq!(births.len(), 1);
        assert_eq!(store.live_total(), 4);
        assert_eq!(lineage.len(), 4);
    }
}
