use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};

use ecosim::{EngineEvent, EngineHandle, SimConfig, SimError, SimResult};
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Headless predator/prey ecosystem runner.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Wall-clock seconds to run before shutting the engine down.
    #[arg(long, value_name = "SECONDS", default_value_t = 30.0)]
    seconds: f32,
    /// Base configuration preset.
    #[arg(long, value_enum, default_value_t = Preset::Balanced)]
    preset: Preset,
    /// JSON file with a partial configuration merged over the preset.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Population and food scale factor applied at init.
    #[arg(long, value_name = "FACTOR", default_value_t = 1.0)]
    scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    Balanced,
    FastEvolution,
    Stable,
    Competitive,
}

impl Preset {
    fn config(self) -> SimConfig {
        match self {
            Preset::Balanced => SimConfig::balanced(),
            Preset::FastEvolution => SimConfig::fast_evolution(),
            Preset::Stable => SimConfig::stable(),
            Preset::Competitive => SimConfig::competitive(),
        }
    }
}

fn load_patch(path: &Path) -> SimResult<Value> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        SimError::InvalidConfig(format!("cannot read {}: {err}", path.display()))
    })?;
    Ok(serde_json::from_str(&text)?)
}

fn run(options: Cli) -> SimResult<()> {
    if !options.seconds.is_finite() || options.seconds < 0.0 {
        return Err(SimError::InvalidCommand(
            "--seconds must be a finite, non-negative number".to_string(),
        ));
    }
    let base = options.preset.config();
    let patch = options.config.as_deref().map(load_patch).transpose()?;

    let mut engine = EngineHandle::spawn(base)?;
    if let EngineEvent::Initialized { stats, zones, obstacles, .. } = engine.init(options.scale, patch)? {
        info!(
            prey = stats.prey_count,
            predators = stats.predator_count,
            food = stats.food_count,
            zones = zones.len(),
            obstacles = obstacles.len(),
            "world ready"
        );
    }

    let started = Instant::now();
    let deadline = Duration::from_secs_f32(options.seconds);
    let mut last_report = Instant::now();
    let mut frames = 0u64;
    while started.elapsed() < deadline {
        if engine.next_frame(Duration::from_millis(100))?.is_some() {
            frames += 1;
        }
        while let Some(event) = engine.try_recv_event() {
            if let EngineEvent::Error { code, message, .. } = event {
                warn!(?code, %message, "engine reported an error");
            }
        }
        if last_report.elapsed() >= Duration::from_secs(5) {
            last_report = Instant::now();
            if let Some(EngineEvent::Updated { stats, tick, .. }) = engine.latest_frame() {
                frames += 1;
                info!(
                    tick,
                    prey = stats.prey_count,
                    predators = stats.predator_count,
                    food = stats.food_count,
                    max_generation = stats.max_generation,
                    risk = stats.extinction_risk,
                    "progress"
                );
            }
        }
    }

    let history = engine.stats_history()?;
    if let Some(last) = history.last() {
        info!(
            tick = last.tick,
            births = last.total_births,
            deaths = last.total_deaths,
            starvation = last.deaths_by_cause.starvation,
            old_age = last.deaths_by_cause.old_age,
            predation = last.deaths_by_cause.predation,
            "final statistics"
        );
    }
    let roots = engine.genetic_roots()?;
    info!(frames, lineages = roots.len(), "run finished");
    engine.terminate();
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(err) = run(Cli::parse()) {
        error!(%err, "ecosim exited with an error");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_kebab_case_presets() {
        let cli = Cli::try_parse_from(["ecosim"]).unwrap();
        assert_eq!(cli.preset, Preset::Balanced);
        assert_eq!(cli.seconds, 30.0);
        assert!(cli.config.is_none());

        let cli = Cli::try_parse_from([
            "ecosim",
            "--preset",
            "fast-evolution",
            "--seconds",
            "2.5",
            "--scale",
            "0.5",
            "--config",
            "world.json",
        ])
        .unwrap();
        assert_eq!(cli.preset, Preset::FastEvolution);
        assert_eq!(cli.seconds, 2.5);
        assert_eq!(cli.scale, 0.5);
        assert_eq!(cli.config, Some(PathBuf::from("world.json")));
        assert_eq!(cli.preset.config(), SimConfig::fast_evolution());
    }

    #[test]
    fn rejects_unknown_presets_and_flags() {
        assert!(Cli::try_parse_from(["ecosim", "--preset", "chaotic"]).is_err());
        assert!(Cli::try_parse_from(["ecosim", "--turbo"]).is_err());
        assert!(Cli::try_parse_from(["ecosim", "--seconds", "soon"]).is_err());
    }
}
