use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{CommonGenetics, GeneticsConfig, TraitSpec};
use crate::organisms::components::{PredatorSubtype, Species};

/// Unique id of a genome; doubles as the lineage-tree key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenomeId(pub u64);

/// Species-specific part of the genome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "species", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SpeciesTraits {
    Prey {
        flocking_strength: f32,
    },
    Predator {
        subtype: PredatorSubtype,
        attack_power: f32,
        pack_affinity: f32,
    },
}

/// Immutable trait set of one organism.
///
/// Every numeric trait lies within the bounds configured for its species;
/// [`GenomeFactory`] is the only producer and clamps on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genome {
    pub id: GenomeId,
    pub parent_id: Option<GenomeId>,
    pub generation: u32,
    pub color: [f32; 3],
    pub max_speed: f32,
    pub sense_radius: f32,
    /// Multiplier on every metabolic cost
    pub metabolism: f32,
    pub size: f32,
    pub asymmetry: f32,
    pub spikiness: f32,
    pub glow: f32,
    pub traits: SpeciesTraits,
}

impl Genome {
    pub fn species(&self) -> Species {
        match self.traits {
            SpeciesTraits::Prey { .. } => Species::Prey,
            SpeciesTraits::Predator { .. } => Species::Predator,
        }
    }

    pub fn subtype(&self) -> Option<PredatorSubtype> {
        match self.traits {
            SpeciesTraits::Prey { .. } => None,
            SpeciesTraits::Predator { subtype, .. } => Some(subtype),
        }
    }

    /// Weight of alignment and cohesion toward same-species neighbours.
    pub fn social_weight(&self) -> f32 {
        match self.traits {
            SpeciesTraits::Prey { flocking_strength } => flocking_strength,
            SpeciesTraits::Predator { pack_affinity, .. } => pack_affinity,
        }
    }

    pub fn attack_power(&self) -> f32 {
        match self.traits {
            SpeciesTraits::Prey { .. } => 0.0,
            SpeciesTraits::Predator { attack_power, .. } => attack_power,
        }
    }

    /// Speed cap after subtype modifiers.
    pub fn cruise_speed(&self) -> f32 {
        self.max_speed * self.subtype().map_or(1.0, PredatorSubtype::speed_modifier)
    }

    /// Perception radius after subtype modifiers.
    pub fn perception_radius(&self) -> f32 {
        self.sense_radius * self.subtype().map_or(1.0, PredatorSubtype::sense_modifier)
    }

    /// Distance beyond both body radii at which this predator can strike.
    pub fn attack_reach(&self, base_range: f32) -> f32 {
        match self.traits {
            SpeciesTraits::Prey { .. } => 0.0,
            SpeciesTraits::Predator {
                subtype,
                attack_power,
                ..
            } => base_range * subtype.reach_modifier() * (0.75 + 0.25 * attack_power),
        }
    }

    /// True when every numeric trait lies within the configured bounds.
    pub fn within_bounds(&self, config: &GeneticsConfig) -> bool {
        let common = common_specs(config, self.species());
        let shared = [
            (self.max_speed, common.max_speed),
            (self.sense_radius, common.sense_radius),
            (self.metabolism, common.metabolism),
            (self.size, common.size),
            (self.asymmetry, common.asymmetry),
            (self.spikiness, common.spikiness),
            (self.glow, common.glow),
        ];
        let shared_ok = shared.iter().all(|(value, spec)| spec.contains(*value));
        let color_ok = self.color.iter().all(|c| (0.0..=1.0).contains(c));
        let specific_ok = match self.traits {
            SpeciesTraits::Prey { flocking_strength } => {
                config.prey.flocking_strength.contains(flocking_strength)
            }
            SpeciesTraits::Predator {
                attack_power,
                pack_affinity,
                ..
            } => {
                config.predator.attack_power.contains(attack_power)
                    && config.predator.pack_affinity.contains(pack_affinity)
            }
        };
        shared_ok && color_ok && specific_ok
    }
}

fn common_specs(config: &GeneticsConfig, species: Species) -> &CommonGenetics {
    match species {
        Species::Prey => &config.prey.common,
        Species::Predator => &config.predator.common,
    }
}

/// Founder value: base +/- variance * span, clamped.
fn sample_base<R: Rng>(rng: &mut R, spec: TraitSpec, variance: f32) -> f32 {
    let offset = rng.gen_range(-1.0f32..=1.0) * variance * spec.span();
    spec.clamp(spec.base + offset)
}

/// Child value: parent +/- factor * span, clamped.
fn perturb<R: Rng>(rng: &mut R, value: f32, spec: TraitSpec, factor: f32) -> f32 {
    let offset = rng.gen_range(-1.0f32..=1.0) * factor * spec.span();
    spec.clamp(value + offset)
}

fn random_subtype<R: Rng>(rng: &mut R) -> PredatorSubtype {
    PredatorSubtype::ALL[rng.gen_range(0..PredatorSubtype::ALL.len())]
}

/// Produces founder genomes and mutated offspring genomes.
///
/// Owns the genome id counter, so ids are unique per engine instance.
#[derive(Debug, Clone, Default)]
pub struct GenomeFactory {
    next_id: u64,
}

impl GenomeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> GenomeId {
        self.next_id += 1;
        GenomeId(self.next_id)
    }

    /// Samples a founder genome within the species base ranges.
    /// Predators without an explicit subtype get one uniformly at random.
    pub fn create_base<R: Rng>(
        &mut self,
        rng: &mut R,
        config: &GeneticsConfig,
        species: Species,
        subtype: Option<PredatorSubtype>,
    ) -> Genome {
        let variance = config.base_variance;
        let common = common_specs(config, species);

        let mut color = common.base_color;
        for channel in &mut color {
            *channel = (*channel + rng.gen_range(-1.0f32..=1.0) * config.color_drift * 2.0)
                .clamp(0.0, 1.0);
        }
        let max_speed = sample_base(rng, common.max_speed, variance);
        let sense_radius = sample_base(rng, common.sense_radius, variance);
        let metabolism = sample_base(rng, common.metabolism, variance);
        let size = sample_base(rng, common.size, variance);
        let asymmetry = sample_base(rng, common.asymmetry, variance);
        let spikiness = sample_base(rng, common.spikiness, variance);
        let glow = sample_base(rng, common.glow, variance);

        let traits = match species {
            Species::Prey => SpeciesTraits::Prey {
                flocking_strength: sample_base(rng, config.prey.flocking_strength, variance),
            },
            Species::Predator => {
                let subtype = subtype.unwrap_or_else(|| random_subtype(rng));
                SpeciesTraits::Predator {
                    subtype,
                    attack_power: sample_base(rng, config.predator.attack_power, variance),
                    pack_affinity: sample_base(rng, config.predator.pack_affinity, variance),
                }
            }
        };

        Genome {
            id: self.allocate_id(),
            parent_id: None,
            generation: 0,
            color,
            max_speed,
            sense_radius,
            metabolism,
            size,
            asymmetry,
            spikiness,
            glow,
            traits,
        }
    }

    /// Derives a child genome. Each numeric trait moves by at most
    /// `mutation_factor * (max - min)` and is re-clamped; the predator subtype
    /// is inherited with `subtype_inherit_probability`, otherwise resampled.
    pub fn mutate<R: Rng>(
        &mut self,
        rng: &mut R,
        config: &GeneticsConfig,
        parent: &Genome,
        mutation_factor: f32,
    ) -> Genome {
        let factor = mutation_factor.max(0.0);
        let common = common_specs(config, parent.species());

        let mut color = parent.color;
        for channel in &mut color {
            *channel =
                (*channel + rng.gen_range(-1.0f32..=1.0) * config.color_drift).clamp(0.0, 1.0);
        }
        let max_speed = perturb(rng, parent.max_speed, common.max_speed, factor);
        let sense_radius = perturb(rng, parent.sense_radius, common.sense_radius, factor);
        let metabolism = perturb(rng, parent.metabolism, common.metabolism, factor);
        let size = perturb(rng, parent.size, common.size, factor);
        let asymmetry = perturb(rng, parent.asymmetry, common.asymmetry, factor);
        let spikiness = perturb(rng, parent.spikiness, common.spikiness, factor);
        let glow = perturb(rng, parent.glow, common.glow, factor);

        let traits = match parent.traits {
            SpeciesTraits::Prey { flocking_strength } => SpeciesTraits::Prey {
                flocking_strength: perturb(
                    rng,
                    flocking_strength,
                    config.prey.flocking_strength,
                    factor,
                ),
            },
            SpeciesTraits::Predator {
                subtype,
                attack_power,
                pack_affinity,
            } => {
                let subtype = if rng.gen::<f32>() < config.subtype_inherit_probability {
                    subtype
                } else {
                    random_subtype(rng)
                };
                SpeciesTraits::Predator {
                    subtype,
                    attack_power: perturb(rng, attack_power, config.predator.attack_power, factor),
                    pack_affinity: perturb(
                        rng,
                        pack_affinity,
                        config.predator.pack_affinity,
                        factor,
                    ),
                }
            }
        };

        Genome {
            id: self.allocate_id(),
            parent_id: Some(parent.id),
            generation: parent.generation + 1,
            color,
            max_speed,
            sense_radius,
            metabolism,
            size,
            asymmetry,
            spikiness,
            glow,
            traits,
        }
    }
}
