use std::collections::HashSet;

use crate::config::{FoodConfig, PredationConfig};
use crate::organisms::components::{DeathCause, FoodId, OrganismId, Species};
use crate::world::EntityStore;

/// One resolved kill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kill {
    pub predator: OrganismId,
    pub prey: OrganismId,
    pub energy_gained: f32,
}

/// One resolved meal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Meal {
    pub prey: OrganismId,
    pub food: FoodId,
    pub energy_gained: f32,
}

/// Prey eat at most one unconsumed food unit within contact range per tick.
///
/// Prey are visited in slot order, so when two prey reach the same unit the
/// earlier slot eats it. Requires a current food index.
pub fn resolve_foraging(store: &mut EntityStore, food: &FoodConfig) -> Vec<Meal> {
    let mut meals = Vec::new();
    for prey_id in store.organism_ids() {
        let Some(prey) = store
            .organism(prey_id)
            .filter(|o| o.is_alive() && o.species == Species::Prey)
        else {
            continue;
        };
        let position = prey.position;
        let reach = prey.radius() + food.radius + food.contact_range;

        let mut nearest: Option<(FoodId, f32)> = None;
        store.food_grid().visit_candidates(position, reach, |food_id, food_pos| {
            let distance = position.distance(food_pos);
            if distance > reach {
                return;
            }
            let available = store.food(food_id).is_some_and(|f| !f.consumed);
            if available && nearest.map_or(true, |(_, d)| distance < d) {
                nearest = Some((food_id, distance));
            }
        });

        let Some((food_id, _)) = nearest else {
            continue;
        };
        let energy = store.food_mut(food_id).map_or(0.0, |f| f.consume());
        if let Some(prey) = store.organism_mut(prey_id) {
            let gained = prey.energy.gain(energy);
            meals.push(Meal {
                prey: prey_id,
                food: food_id,
                energy_gained: gained,
            });
        }
    }
    meals
}

/// Predators consume at most one live prey within attack reach per tick.
///
/// Targets are chosen first against an unchanging view of the store, each
/// prey claimed by at most one predator (slot order decides), and only then
/// applied. Requires a current organism index.
pub fn resolve_predation(store: &mut EntityStore, config: &PredationConfig) -> Vec<Kill> {
    let mut claimed: HashSet<OrganismId> = HashSet::new();
    let mut pairs: Vec<(OrganismId, OrganismId)> = Vec::new();
    let max_prey_radius = store.max_organism_radius();

    for predator in store
        .organisms()
        .filter(|o| o.is_alive() && o.species == Species::Predator)
    {
        let reach = predator.genome.attack_reach(config.attack_range) + predator.radius();
        let mut nearest: Option<(OrganismId, f32)> = None;
        store
            .organism_grid()
            .visit_candidates(predator.position, reach + max_prey_radius, |id, _| {
                if claimed.contains(&id) {
                    return;
                }
                let Some(prey) = store
                    .organism(id)
                    .filter(|o| o.is_alive() && o.species == Species::Prey)
                else {
                    return;
                };
                let distance = predator.position.distance(prey.position);
                if distance <= reach + prey.radius() && nearest.map_or(true, |(_, d)| distance < d)
                {
                    nearest = Some((id, distance));
                }
            });
        if let Some((prey_id, _)) = nearest {
            claimed.insert(prey_id);
            pairs.push((predator.id, prey_id));
        }
    }

    let mut kills = Vec::with_capacity(pairs.len());
    for (predator_id, prey_id) in pairs {
        let Some(prey) = store.organism_mut(prey_id) else {
            continue;
        };
        let prey_energy = prey.energy.current;
        prey.mark_dead(DeathCause::Predation);

        let reward = (prey_energy * config.energy_efficiency).max(config.min_energy_gain);
        if let Some(predator) = store.organism_mut(predator_id) {
            let gained = predator.energy.gain(reward);
            kills.push(Kill {
                predator: predator_id,
                prey: prey_id,
                energy_gained: gained,
            });
        }
    }
    kills
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneticsConfig;
    use crate::organisms::components::Energy;
    use crate::organisms::genetics::GenomeFactory;
    use glam::Vec3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn populate(store: &mut EntityStore, species: Species, position: Vec3, energy: f32) -> OrganismId {
        let mut rng = StdRng::seed_from_u64(17);
        let genome = GenomeFactory::new().create_base(
            &mut rng,
            &GeneticsConfig::default(),
            species,
            None,
        );
        store.add_organism(Arc::new(genome), position, Energy::with_energy(150.0, energy), None)
    }

    #[test]
    fn each_predator_takes_one_prey() {
        let mut store = EntityStore::new(100.0, 20.0, 1.0);
        let predator = populate(&mut store, Species::Predator, Vec3::ZERO, 40.0);
        let near = populate(&mut store, Species::Prey, Vec3::new(1.0, 0.0, 0.0), 30.0);
        let far = populate(&mut store, Species::Prey, Vec3::new(0.0, 1.5, 0.0), 30.0);
        store.rebuild_index();

        let kills = resolve_predation(&mut store, &PredationConfig::default());
        assert_eq!(kills.len(), 1);
        assert_eq!(kills[0].prey, near);
        assert!(!store.organism(near).unwrap().is_alive());
        assert!(store.organism(far).unwrap().is_alive());
        let energy = store.organism(predator).unwrap().energy.current;
        assert!((energy - (40.0 + 30.0 * 0.8)).abs() < 1e-4);
    }

    #[test]
    fn foraging_eats_one_unit() {
        let mut store = EntityStore::new(100.0, 20.0, 1.0);
        let prey = populate(&mut store, Species::Prey, Vec3::ZERO, 10.0);
        store.add_food(Vec3::new(1.0, 0.0, 0.0), 20.0);
        store.add_food(Vec3::new(-1.0, 0.0, 0.0), 20.0);
        store.rebuild_index();

        let meals = resolve_foraging(&mut store, &FoodConfig::default());
        assert_eq!(meals.len(), 1);
        assert_eq!(store.organism(prey).unwrap().energy.current, 30.0);
        assert_eq!(store.available_food(), 1);
    }
}
