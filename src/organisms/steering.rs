//! Boids-style steering forces and velocity/position integration.
//!
//! Forces are a pure function of an organism, its [`SensoryData`] and the
//! static world, so they can be computed for all organisms in parallel and
//! then applied one by one in slot order.

use std::f32::consts::{PI, TAU};

use glam::Vec3;

use crate::config::PhysicsConfig;
use crate::organisms::behavior::{BehaviorState, SensoryData};
use crate::organisms::components::{Organism, Species};
use crate::utils::math::reflect_damped;

/// Static world geometry needed by steering and collision response.
#[derive(Debug, Clone, Copy)]
pub struct SteeringContext<'a> {
    pub physics: &'a PhysicsConfig,
    /// Obstacle centres and radii
    pub obstacles: &'a [(Vec3, f32)],
    pub half_extent: f32,
    pub tick: u64,
}

/// Reynolds steering: desired velocity along `direction` minus current velocity.
fn steer_towards(direction: Vec3, cruise: f32, velocity: Vec3) -> Vec3 {
    let desired = direction.normalize_or_zero();
    if desired == Vec3::ZERO {
        return Vec3::ZERO;
    }
    desired * cruise - velocity
}

/// Deterministic wander direction derived from the tick and the serial.
fn wander_direction(tick: u64, serial: u32) -> Vec3 {
    let t = (tick % 1_000_000) as f32 / 60.0;
    let s = serial as f32;
    let theta = (t * 0.5 + s * 0.37).sin() * TAU;
    let phi = (t * 0.3 + s * 1.31).cos() * PI * 0.5;
    Vec3::new(phi.cos() * theta.cos(), phi.sin(), phi.cos() * theta.sin())
}

/// Push away from obstacles closer than the configured margin.
fn obstacle_push(position: Vec3, radius: f32, ctx: &SteeringContext<'_>) -> Vec3 {
    let margin = ctx.physics.obstacle_margin.max(f32::EPSILON);
    let mut push = Vec3::ZERO;
    for &(center, obstacle_radius) in ctx.obstacles {
        let offset = position - center;
        let distance = offset.length();
        let gap = distance - obstacle_radius - radius;
        if gap < margin && distance > f32::EPSILON {
            push += offset / distance * (1.0 - gap / margin).min(2.0);
        }
    }
    push
}

/// Weighted steering force for one organism, clamped to `max_steering_force`.
///
/// Terms are summed in a fixed order: separation, alignment, cohesion, seek,
/// avoid, then the idle wander term.
pub fn compute_steering(
    organism: &Organism,
    sensory: &SensoryData,
    ctx: &SteeringContext<'_>,
) -> Vec3 {
    if !organism.is_alive() || organism.state == BehaviorState::Dying {
        return Vec3::ZERO;
    }
    let physics = ctx.physics;
    let genome = &organism.genome;
    let cruise = genome.cruise_speed();
    let velocity = organism.velocity;
    let social = genome.social_weight();

    let seek_scale = if organism.state == BehaviorState::Hunting {
        physics.hunt_multiplier
    } else {
        1.0
    };
    let avoid_scale = if organism.state == BehaviorState::Fleeing {
        physics.flee_multiplier
    } else {
        1.0
    };

    let mut force = Vec3::ZERO;

    force += steer_towards(sensory.separation, cruise, velocity) * physics.separation_weight;

    if let Some(heading) = sensory.average_heading() {
        force += steer_towards(heading, cruise, velocity) * physics.alignment_weight * social;
    }

    if let Some(centroid) = sensory.centroid() {
        force += steer_towards(centroid - organism.position, cruise, velocity)
            * physics.cohesion_weight
            * social;
    }

    if let Some(target) = sensory.seek_target(organism.species) {
        force += steer_towards(target - organism.position, cruise, velocity)
            * physics.seek_weight
            * seek_scale;
    }

    let mut avoid = obstacle_push(organism.position, organism.radius(), ctx);
    if organism.species == Species::Prey {
        avoid += sensory.threat_push;
    }
    force += steer_towards(avoid, cruise, velocity) * physics.avoid_weight * avoid_scale;

    if organism.state == BehaviorState::Idle {
        force += wander_direction(ctx.tick, organism.serial) * physics.wander_weight * cruise;
    }

    if !force.is_finite() {
        return Vec3::ZERO;
    }
    force.clamp_length_max(physics.max_steering_force)
}

/// Speed cap for the organism's current state.
pub fn speed_limit(organism: &Organism, physics: &PhysicsConfig) -> f32 {
    let cruise = organism.genome.cruise_speed();
    match organism.state {
        BehaviorState::Reproducing => cruise * physics.reproducing_speed_factor,
        BehaviorState::Dying => 0.0,
        _ => cruise,
    }
}

/// Apply a steering force and advance position, then resolve collisions.
pub fn integrate(organism: &mut Organism, force: Vec3, ctx: &SteeringContext<'_>, dt: f32) {
    if !organism.is_alive() {
        organism.velocity = Vec3::ZERO;
        return;
    }
    let physics = ctx.physics;
    let mut velocity = (organism.velocity + force) * physics.drag;
    velocity = velocity.clamp_length_max(speed_limit(organism, physics));
    if !velocity.is_finite() {
        velocity = Vec3::ZERO;
    }

    let mut position = organism.position + velocity * dt;
    resolve_collisions(&mut position, &mut velocity, organism.radius(), ctx);

    organism.position = position;
    organism.velocity = velocity;
}

/// Keep a body inside the world cube and outside every obstacle.
pub fn resolve_collisions(
    position: &mut Vec3,
    velocity: &mut Vec3,
    radius: f32,
    ctx: &SteeringContext<'_>,
) {
    let damping = ctx.physics.collision_damping;
    let limit = (ctx.half_extent - radius).max(0.0);

    for axis in 0..3 {
        let value = position[axis];
        if value > limit || value < -limit {
            let mut normal = Vec3::ZERO;
            normal[axis] = if value > limit { -1.0 } else { 1.0 };
            position[axis] = value.clamp(-limit, limit);
            *velocity = reflect_damped(*velocity, normal, damping);
        }
    }

    for &(center, obstacle_radius) in ctx.obstacles {
        let offset = *position - center;
        let distance = offset.length();
        let min_distance = obstacle_radius + radius;
        if distance >= min_distance {
            continue;
        }
        let normal = if distance > f32::EPSILON {
            offset / distance
        } else {
            Vec3::Y
        };
        *position = center + normal * min_distance;
        *velocity = reflect_damped(*velocity, normal, damping);
    }

    // Obstacles near a wall can push past it
    *position = position.clamp(Vec3::splat(-limit), Vec3::splat(limit));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneticsConfig;
    use crate::organisms::components::*;
    use crate::organisms::genetics::{GenomeFactory, SpeciesTraits};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn organism(species: Species) -> Organism {
        let mut rng = StdRng::seed_from_u64(4);
        let mut genome =
            GenomeFactory::new().create_base(&mut rng, &GeneticsConfig::default(), species, None);
        if species == Species::Prey {
            genome.traits = SpeciesTraits::Prey {
                flocking_strength: 1.0,
            };
        }
        Organism {
            id: OrganismId::default(),
            serial: 1,
            species,
            genome: Arc::new(genome),
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            energy: Energy::new(100.0),
            age: Age::new(),
            state: BehaviorState::Seeking,
            death: None,
            cooldown: ReproductionCooldown::default(),
            trail: false,
        }
    }

    #[test]
    fn force_is_clamped_and_points_at_food() {
        let physics = PhysicsConfig::default();
        let ctx = SteeringContext {
            physics: &physics,
            obstacles: &[],
            half_extent: 100.0,
            tick: 0,
        };
        let prey = organism(Species::Prey);
        let sensory = SensoryData {
            nearest_food: Some((FoodId::default(), Vec3::new(10.0, 0.0, 0.0), 10.0)),
            ..SensoryData::default()
        };
        let force = compute_steering(&prey, &sensory, &ctx);
        assert!(force.length() <= physics.max_steering_force + 1e-5);
        assert!(force.x > 0.0);
    }

    #[test]
    fn boundary_collision_reflects_and_corrects() {
        let physics = PhysicsConfig::default();
        let ctx = SteeringContext {
            physics: &physics,
            obstacles: &[],
            half_extent: 10.0,
            tick: 0,
        };
        let mut position = Vec3::new(12.0, 0.0, 0.0);
        let mut velocity = Vec3::new(4.0, 1.0, 0.0);
        resolve_collisions(&mut position, &mut velocity, 1.0, &ctx);
        assert_eq!(position.x, 9.0);
        assert!((velocity.x + 2.0).abs() < 1e-6);
        assert_eq!(velocity.y, 1.0);
    }

    #[test]
    fn obstacle_contact_pushes_body_out() {
        let physics = PhysicsConfig::default();
        let obstacles = [(Vec3::ZERO, 5.0)];
        let ctx = SteeringContext {
            physics: &physics,
            obstacles: &obstacles,
            half_extent: 100.0,
            tick: 0,
        };
        let mut position = Vec3::new(4.0, 0.0, 0.0);
        let mut velocity = Vec3::new(-2.0, 0.0, 0.0);
        resolve_collisions(&mut position, &mut velocity, 1.0, &ctx);
        assert!((position.length() - 6.0).abs() < 1e-5);
        assert!(velocity.x > 0.0);

        let mut centred = Vec3::ZERO;
        let mut still = Vec3::ZERO;
        resolve_collisions(&mut centred, &mut still, 1.0, &ctx);
        assert!(centred.is_finite());
        assert!((centred.length() - 6.0).abs() < 1e-5);
    }

    #[test]
    fn integration_respects_speed_cap() {
        let physics = PhysicsConfig::default();
        let ctx = SteeringContext {
            physics: &physics,
            obstacles: &[],
            half_extent: 100.0,
            tick: 0,
        };
        let mut prey = organism(Species::Prey);
        prey.velocity = Vec3::new(100.0, 0.0, 0.0);
        integrate(&mut prey, Vec3::ZERO, &ctx, 1.0 / 60.0);
        assert!(prey.velocity.length() <= prey.genome.cruise_speed() + 1e-4);
    }

    /// Physics with every term switched off and no force clamp.
    fn isolated(configure: impl FnOnce(&mut PhysicsConfig)) -> PhysicsConfig {
        let mut physics = PhysicsConfig {
            separation_weight: 0.0,
            alignment_weight: 0.0,
            cohesion_weight: 0.0,
            seek_weight: 0.0,
            avoid_weight: 0.0,
            wander_weight: 0.0,
            max_steering_force: 1.0e6,
            ..PhysicsConfig::default()
        };
        configure(&mut physics);
        physics
    }

    fn steer(organism: &Organism, sensory: &SensoryData, physics: &PhysicsConfig) -> Vec3 {
        let ctx = SteeringContext {
            physics,
            obstacles: &[],
            half_extent: 100.0,
            tick: 7,
        };
        compute_steering(organism, sensory, &ctx)
    }

    fn flock_sensory() -> SensoryData {
        SensoryData {
            nearest_threat: Some((OrganismId::default(), Vec3::new(0.0, 8.0, 0.0), 8.0)),
            nearest_food: Some((FoodId::default(), Vec3::new(0.0, 0.0, -12.0), 12.0)),
            separation: Vec3::new(-2.0, 0.0, 0.0),
            threat_push: Vec3::new(0.0, -3.0, 0.0),
            heading_sum: Vec3::new(0.0, 0.0, 6.0),
            position_sum: Vec3::new(0.0, 20.0, 0.0),
            flockmates: 2,
            ..SensoryData::default()
        }
    }

    #[test]
    fn separation_pushes_away_from_crowding() {
        let physics = isolated(|p| p.separation_weight = 1.5);
        let prey = organism(Species::Prey);
        let force = steer(&prey, &flock_sensory(), &physics);
        let cruise = prey.genome.cruise_speed();
        assert!((force - Vec3::new(-cruise * 1.5, 0.0, 0.0)).length() < 1e-4);

        let calm = SensoryData::default();
        assert_eq!(steer(&prey, &calm, &physics), Vec3::ZERO);
    }

    #[test]
    fn alignment_turns_current_velocity_towards_flock_heading() {
        let physics = isolated(|p| p.alignment_weight = 1.0);
        let mut prey = organism(Species::Prey);
        let cruise = prey.genome.cruise_speed();
        prey.velocity = Vec3::new(cruise, 0.0, 0.0);
        let force = steer(&prey, &flock_sensory(), &physics);
        assert!((force - Vec3::new(-cruise, 0.0, cruise)).length() < 1e-4);

        let alone = SensoryData {
            flockmates: 0,
            ..flock_sensory()
        };
        let physics = isolated(|p| p.alignment_weight = 1.0);
        assert_eq!(steer(&prey, &alone, &physics), Vec3::ZERO);
    }

    #[test]
    fn cohesion_points_at_flock_centroid() {
        let physics = isolated(|p| p.cohesion_weight = 1.0);
        let mut prey = organism(Species::Prey);
        prey.position = Vec3::new(10.0, 0.0, 0.0);
        let force = steer(&prey, &flock_sensory(), &physics);
        let expected = Vec3::new(-10.0, 10.0, 0.0).normalize();
        assert!((force.normalize() - expected).length() < 1e-5);
        assert!((force.length() - prey.genome.cruise_speed()).abs() < 1e-4);
    }

    #[test]
    fn only_prey_avoid_threats_and_fleeing_amplifies_it() {
        let physics = isolated(|p| p.avoid_weight = 1.0);
        let mut prey = organism(Species::Prey);
        let cruise = prey.genome.cruise_speed();
        let force = steer(&prey, &flock_sensory(), &physics);
        assert!((force - Vec3::new(0.0, -cruise, 0.0)).length() < 1e-4);

        prey.state = BehaviorState::Fleeing;
        let fleeing = steer(&prey, &flock_sensory(), &physics);
        assert!((fleeing - force * physics.flee_multiplier).length() < 1e-4);

        let predator = organism(Species::Predator);
        assert_eq!(steer(&predator, &flock_sensory(), &physics), Vec3::ZERO);
    }

    #[test]
    fn combined_force_is_the_ordered_sum_of_terms() {
        let weights: [fn(&mut PhysicsConfig); 5] = [
            |p| p.separation_weight = 1.5,
            |p| p.alignment_weight = 1.0,
            |p| p.cohesion_weight = 1.0,
            |p| p.seek_weight = 1.2,
            |p| p.avoid_weight = 2.0,
        ];
        let mut prey = organism(Species::Prey);
        prey.position = Vec3::new(3.0, -1.0, 2.0);
        prey.velocity = Vec3::new(0.5, 0.25, -0.75);
        let sensory = flock_sensory();

        let mut summed = Vec3::ZERO;
        for configure in weights {
            summed += steer(&prey, &sensory, &isolated(configure));
        }
        let all = isolated(|p| {
            for configure in weights {
                configure(p);
            }
        });
        let combined = steer(&prey, &sensory, &all);
        assert!((combined - summed).length() < 1e-4);
        assert_eq!(combined, steer(&prey, &sensory, &all));
    }
}
