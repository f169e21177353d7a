//! Headless 3D predator/prey ecosystem engine.
//!
//! [`engine::SimulationEngine`] owns the world and advances it one fixed
//! timestep at a time. [`worker::EngineWorker`] runs an engine on its own
//! thread behind the JSON message protocol in [`protocol`], and
//! [`client::EngineHandle`] is the caller-side end of that thread.

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod organisms;
pub mod protocol;
pub mod render;
pub mod scheduler;
pub mod utils;
pub mod world;
pub mod worker;

pub use client::EngineHandle;
pub use config::SimConfig;
pub use engine::{EntityKind, SimulationEngine};
pub use error::{SimError, SimResult};
pub use protocol::{Command, EngineEvent, QueryResult};
pub use render::RenderBuffers;
pub use scheduler::{TickScheduler, TIMESTEP};
