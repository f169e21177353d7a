use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::StatisticsConfig;
use crate::organisms::components::*;
use crate::utils::math::smoothstep;
use crate::world::EntityStore;

/// Cumulative deaths per cause
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeathTally {
    pub starvation: u64,
    pub old_age: u64,
    pub predation: u64,
}

impl DeathTally {
    pub fn record(&mut self, cause: DeathCause) {
        match cause {
            DeathCause::Starvation => self.starvation += 1,
            DeathCause::OldAge => self.old_age += 1,
            DeathCause::Predation => self.predation += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.starvation + self.old_age + self.predation
    }
}

/// Births and deaths that happened during one tick, per species.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickEvents {
    pub births: [u32; 2],
    pub deaths: [u32; 2],
    pub causes: DeathTally,
}

impl TickEvents {
    pub fn record_birth(&mut self, species: Species) {
        self.births[species.index()] += 1;
    }

    pub fn record_death(&mut self, species: Species, cause: DeathCause) {
        self.deaths[species.index()] += 1;
        self.causes.record(cause);
    }

    fn total_births(&self) -> u32 {
        self.births.iter().sum()
    }

    fn total_deaths(&self) -> u32 {
        self.deaths.iter().sum()
    }
}

/// Immutable per-tick statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub tick: u64,
    pub prey_count: usize,
    pub predator_count: usize,
    pub food_count: usize,
    pub total_population: usize,
    pub avg_energy: f32,
    pub avg_prey_energy: f32,
    pub avg_predator_energy: f32,
    pub max_generation: u32,
    pub max_age: u32,
    pub total_births: u64,
    pub total_deaths: u64,
    pub deaths_by_cause: DeathTally,
    pub births_this_tick: u32,
    pub deaths_this_tick: u32,
    pub prey_extinction_risk: f32,
    pub predator_extinction_risk: f32,
    /// Maximum of the per-species risks
    pub extinction_risk: f32,
}

/// Computes [`StatsSnapshot`]s and keeps the rolling window and history.
#[derive(Debug, Clone)]
pub struct StatisticsAggregator {
    config: StatisticsConfig,
    max_generation: u32,
    max_age: u32,
    total_births: u64,
    total_deaths: u64,
    deaths_by_cause: DeathTally,
    window: VecDeque<TickEvents>,
    history: VecDeque<StatsSnapshot>,
    latest: StatsSnapshot,
}

impl StatisticsAggregator {
    pub fn new(config: StatisticsConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window_ticks),
            history: VecDeque::with_capacity(config.history_capacity),
            config,
            max_generation: 0,
            max_age: 0,
            total_births: 0,
            total_deaths: 0,
            deaths_by_cause: DeathTally::default(),
            latest: StatsSnapshot::default(),
        }
    }

    /// Swaps thresholds and intervals, keeping counters and history.
    pub fn set_config(&mut self, config: StatisticsConfig) {
        self.config = config;
        while self.window.len() > self.config.window_ticks.max(1) {
            self.window.pop_front();
        }
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }
    }

    pub fn latest(&self) -> &StatsSnapshot {
        &self.latest
    }

    /// Sampled snapshots, oldest first.
    pub fn history(&self) -> Vec<StatsSnapshot> {
        self.history.iter().cloned().collect()
    }

    /// Folds organisms that left the store this tick into the running maxima.
    pub fn observe_departed<'a>(&mut self, organisms: impl IntoIterator<Item = &'a Organism>) {
        for organism in organisms {
            self.observe(organism);
        }
    }

    fn observe(&mut self, organism: &Organism) {
        self.max_generation = self.max_generation.max(organism.genome.generation);
        self.max_age = self.max_age.max(organism.age.ticks());
    }

    fn risk(&self, species: Species, count: usize) -> f32 {
        if count == 0 {
            return 1.0;
        }
        let threshold = self.config.population_threshold as f32;
        let population_term = 1.0 - smoothstep(0.0, threshold, count as f32);

        let index = species.index();
        let (births, deaths) = self.window.iter().fold((0u64, 0u64), |(b, d), events| {
            (b + events.births[index] as u64, d + events.deaths[index] as u64)
        });
        let trend_term = if births + deaths > 0 {
            ((deaths as f32 - births as f32) / (deaths + births) as f32).max(0.0)
        } else {
            0.0
        };

        (self.config.population_weight * population_term + self.config.trend_weight * trend_term)
            .clamp(0.0, 1.0)
    }

    /// Builds the snapshot for `tick` from the store after cleanup.
    pub fn aggregate(&mut self, tick: u64, store: &EntityStore, events: TickEvents) -> StatsSnapshot {
        self.total_births += events.total_births() as u64;
        self.total_deaths += events.total_deaths() as u64;
        self.deaths_by_cause.starvation += events.causes.starvation;
        self.deaths_by_cause.old_age += events.causes.old_age;
        self.deaths_by_cause.predation += events.causes.predation;

        self.window.push_back(events);
        while self.window.len() > self.config.window_ticks.max(1) {
            self.window.pop_front();
        }

        let mut counts = [0usize; 2];
        let mut energy = [0.0f64; 2];
        for organism in store.organisms() {
            self.observe(organism);
            let index = organism.species.index();
            counts[index] += 1;
            energy[index] += organism.energy.current as f64;
        }
        let average = |sum: f64, n: usize| if n > 0 { (sum / n as f64) as f32 } else { 0.0 };
        let total = counts[0] + counts[1];

        let prey_risk = self.risk(Species::Prey, counts[0]);
        let predator_risk = self.risk(Species::Predator, counts[1]);

        let snapshot = StatsSnapshot {
            tick,
            prey_count: counts[0],
            predator_count: counts[1],
            food_count: store.food_count(),
            total_population: total,
            avg_energy: average(energy[0] + energy[1], total),
            avg_prey_energy: average(energy[0], counts[0]),
            avg_predator_energy: average(energy[1], counts[1]),
            max_generation: self.max_generation,
            max_age: self.max_age,
            total_births: self.total_births,
            total_deaths: self.total_deaths,
            deaths_by_cause: self.deaths_by_cause,
            births_this_tick: events.total_births(),
            deaths_this_tick: events.total_deaths(),
            prey_extinction_risk: prey_risk,
            predator_extinction_risk: predator_risk,
            extinction_risk: prey_risk.max(predator_risk),
        };

        if self.config.history_interval > 0 && tick % self.config.history_interval == 0 {
            self.history.push_back(snapshot.clone());
            while self.history.len() > self.config.history_capacity {
                self.history.pop_front();
            }
        }

        // Log ecosystem summary every summary_interval ticks
        if self.config.summary_interval > 0 && tick % self.config.summary_interval == 0 {
            info!(
                "[ECOSYSTEM] Tick {} | Prey: {} | Predators: {} | Food: {} | Births: {} | Deaths: {} | Max gen: {} | Risk: {:.2}",
                tick,
                snapshot.prey_count,
                snapshot.predator_count,
                snapshot.food_count,
                snapshot.total_births,
                snapshot.total_deaths,
                snapshot.max_generation,
                snapshot.extinction_risk
            );
        }

        self.latest = snapshot.clone();
        snapshot
    }
}
