use crate::config::SpeciesMetabolism;
use crate::organisms::components::{DeathCause, Organism};

/// Energy spent by one organism this tick.
///
/// `(exist + move * |v|^2 + sense + size * genome.size) * genome.metabolism * danger`
pub fn metabolic_cost(organism: &Organism, config: &SpeciesMetabolism, danger: f32) -> f32 {
    let genome = &organism.genome;
    let base = config.exist_cost
        + config.move_cost * organism.velocity.length_squared()
        + config.sense_cost
        + config.size_cost * genome.size;
    (base * genome.metabolism * danger.max(0.0)).max(0.0)
}

/// Charges the tick's metabolic cost, ages the organism and counts down its
/// reproduction cooldown. Dead organisms are left untouched.
pub fn apply_metabolism(organism: &mut Organism, config: &SpeciesMetabolism, danger: f32) {
    if !organism.is_alive() {
        return;
    }
    let cost = metabolic_cost(organism, config, danger);
    organism.energy.spend(cost);
    organism.age.increment();
    organism.cooldown.decrement();
}

/// Starvation when energy is exhausted, old age past `max_age * old_age_ratio`.
pub fn death_check(organism: &Organism, config: &SpeciesMetabolism) -> Option<DeathCause> {
    if !organism.is_alive() {
        return None;
    }
    if organism.energy.is_depleted() {
        return Some(DeathCause::Starvation);
    }
    let max_age = config.max_age.max(1) as f32;
    if organism.age.ticks() as f32 / max_age > config.old_age_ratio {
        return Some(DeathCause::OldAge);
    }
    None
}

/// Marks the organism dead if [`death_check`] finds a cause.
pub fn resolve_natural_death(organism: &mut Organism, config: &SpeciesMetabolism) -> Option<DeathCause> {
    let cause = death_check(organism, config)?;
    organism.mark_dead(cause);
    Some(cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneticsConfig;
    use crate::organisms::behavior::BehaviorState;
    use crate::organisms::components::*;
    use crate::organisms::genetics::GenomeFactory;
    use glam::Vec3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn prey(energy: f32) -> Organism {
        let mut rng = StdRng::seed_from_u64(6);
        let genome = GenomeFactory::new().create_base(
            &mut rng,
            &GeneticsConfig::default(),
            Species::Prey,
            None,
        );
        Organism {
            id: OrganismId::default(),
            serial: 1,
            species: Species::Prey,
            genome: Arc::new(genome),
            position: Vec3::ZERO,
            velocity: Vec3::new(3.0, 0.0, 4.0),
            energy: Energy::with_energy(100.0, energy),
            age: Age::new(),
            state: BehaviorState::Idle,
            death: None,
            cooldown: ReproductionCooldown::new(1),
            trail: false,
        }
    }

    #[test]
    fn cost_follows_formula() {
        let config = SpeciesMetabolism::prey();
        let organism = prey(50.0);
        let g = &organism.genome;
        let expected = (config.exist_cost
            + config.move_cost * 25.0
            + config.sense_cost
            + config.size_cost * g.size)
            * g.metabolism
            * 1.5;
        assert!((metabolic_cost(&organism, &config, 1.5) - expected).abs() < 1e-6);
    }

    #[test]
    fn metabolism_ages_and_counts_down() {
        let config = SpeciesMetabolism::prey();
        let mut organism = prey(50.0);
        apply_metabolism(&mut organism, &config, 1.0);
        assert_eq!(organism.age.ticks(), 1);
        assert!(organism.cooldown.is_ready());
        assert!(organism.energy.current < 50.0);
    }

    #[test]
    fn starvation_and_old_age() {
        let mut config = SpeciesMetabolism::prey();
        let mut starving = prey(0.001);
        apply_metabolism(&mut starving, &config, 1.0);
        assert_eq!(starving.energy.current, 0.0);
        assert_eq!(
            resolve_natural_death(&mut starving, &config),
            Some(DeathCause::Starvation)
        );
        assert_eq!(starving.state, BehaviorState::Dying);

        config.max_age = 10;
        let mut old = prey(80.0);
        old.age = Age(10);
        assert_eq!(death_check(&old, &config), None);
        old.age = Age(11);
        assert_eq!(resolve_natural_death(&mut old, &config), Some(DeathCause::OldAge));
        assert_eq!(old.death, Some(DeathCause::OldAge));
    }
}
