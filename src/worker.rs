//! Engine worker thread.
//!
//! The worker owns the [`SimulationEngine`] exclusively. Commands are drained
//! between frames, never mid-tick. Frames go out over a bounded channel and
//! are dropped when the consumer falls behind; replies use an unbounded
//! channel so a query answer, or the frame of a manual `update`, is never lost.

use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::SimConfig;
use crate::engine::SimulationEngine;
use crate::error::{SimError, SimResult};
use crate::protocol::{Command, EngineEvent, QueryResult};
use crate::scheduler::TickScheduler;

/// Client-side ends of the worker's channels.
pub struct WorkerChannels {
    pub commands: Sender<Command>,
    pub frames: Receiver<EngineEvent>,
    pub replies: Receiver<EngineEvent>,
}

pub struct EngineWorker {
    engine: Option<SimulationEngine>,
    /// Configuration `init` merges its partial config over
    base_config: SimConfig,
    scheduler: TickScheduler,
    commands: Receiver<Command>,
    frames: SyncSender<EngineEvent>,
    replies: Sender<EngineEvent>,
    frame_interval: Duration,
    dropped_frames: u64,
}

impl EngineWorker {
    /// Starts the worker thread. The engine is built on the first `init`.
    pub fn spawn(base_config: SimConfig) -> SimResult<(JoinHandle<()>, WorkerChannels)> {
        let (worker, channels) = Self::new(base_config)?;
        let handle = thread::Builder::new()
            .name("ecosim-engine".into())
            .spawn(move || worker.run())
            .map_err(|err| SimError::Worker(format!("failed to spawn engine thread: {err}")))?;
        Ok((handle, channels))
    }

    fn new(base_config: SimConfig) -> SimResult<(Self, WorkerChannels)> {
        base_config.validate()?;
        let (command_tx, command_rx) = mpsc::channel();
        let (frame_tx, frame_rx) =
            mpsc::sync_channel(base_config.scheduler.frame_queue_capacity.max(1));
        let (reply_tx, reply_rx) = mpsc::channel();

        let worker = EngineWorker {
            engine: None,
            scheduler: TickScheduler::new(base_config.scheduler.max_catch_up_steps),
            frame_interval: Duration::from_millis(base_config.scheduler.frame_interval_ms.max(1)),
            base_config,
            commands: command_rx,
            frames: frame_tx,
            replies: reply_tx,
            dropped_frames: 0,
        };
        Ok((
            worker,
            WorkerChannels {
                commands: command_tx,
                frames: frame_rx,
                replies: reply_rx,
            },
        ))
    }

    fn run(mut self) {
        info!("engine worker started");
        let mut last_frame = Instant::now();

        'outer: loop {
            loop {
                match self.commands.try_recv() {
                    Ok(command) => {
                        if self.dispatch(command).is_break() {
                            break 'outer;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'outer,
                }
            }

            let now = Instant::now();
            let elapsed = now.duration_since(last_frame);
            last_frame = now;
            if self.step(elapsed).is_break() {
                break;
            }

            match self.commands.recv_timeout(self.frame_interval) {
                Ok(command) => {
                    if self.dispatch(command).is_break() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!(
            dropped_frames = self.dropped_frames,
            dropped_ticks = self.scheduler.dropped_ticks(),
            "engine worker stopped"
        );
    }

    /// Runs the ticks the scheduler grants for `elapsed` and emits one frame.
    fn step(&mut self, elapsed: Duration) -> ControlFlow<()> {
        let Some(engine) = self.engine.as_mut() else {
            return ControlFlow::Continue(());
        };
        let steps = self.scheduler.advance(elapsed);
        if steps == 0 {
            return ControlFlow::Continue(());
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            for _ in 0..steps {
                engine.tick();
            }
        }));
        if let Err(payload) = outcome {
            self.engine_panicked(None, payload);
            return self.reply(EngineEvent::error(
                None,
                &SimError::Worker("simulation tick panicked; engine discarded".to_string()),
            ));
        }
        self.emit_frame()
    }

    /// Offers the current frame to the bounded frame queue. Dead flags stay
    /// pending in the engine until a frame carrying them is accepted.
    fn emit_frame(&mut self) -> ControlFlow<()> {
        let Some(engine) = self.engine.as_mut() else {
            return ControlFlow::Continue(());
        };
        let event = EngineEvent::Updated {
            request_id: None,
            buffers: engine.peek_render_buffers(),
            stats: engine.stats().clone(),
            tick: engine.tick_count(),
        };
        match self.frames.try_send(event) {
            Ok(()) => {
                engine.acknowledge_frame();
                ControlFlow::Continue(())
            }
            Err(TrySendError::Full(_)) => {
                self.dropped_frames += 1;
                debug!(dropped = self.dropped_frames, "frame queue full; frame dropped");
                ControlFlow::Continue(())
            }
            Err(TrySendError::Disconnected(_)) => ControlFlow::Break(()),
        }
    }

    fn reply(&self, event: EngineEvent) -> ControlFlow<()> {
        match self.replies.send(event) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }

    fn engine_panicked(&mut self, request_id: Option<u64>, payload: Box<dyn std::any::Any + Send>) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(?request_id, %message, "engine panicked");
        self.engine = None;
    }

    fn dispatch(&mut self, command: Command) -> ControlFlow<()> {
        let request_id = command.request_id();
        if matches!(command, Command::Shutdown) {
            debug!("shutdown requested");
            return ControlFlow::Break(());
        }
        if command.requires_engine() && self.engine.is_none() {
            return self.reply(EngineEvent::error(request_id, &SimError::NotInitialized));
        }

        self.guarded(request_id, |worker| worker.handle(command))
    }

    /// Runs `action` and replies with its outcome. A panic discards the
    /// engine so later commands see [`SimError::NotInitialized`].
    fn guarded(
        &mut self,
        request_id: Option<u64>,
        action: impl FnOnce(&mut Self) -> SimResult<Option<EngineEvent>>,
    ) -> ControlFlow<()> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| action(self)));
        match outcome {
            Ok(Ok(Some(event))) => self.reply(event),
            Ok(Ok(None)) => ControlFlow::Continue(()),
            Ok(Err(err)) => {
                warn!(?request_id, %err, "command failed");
                self.reply(EngineEvent::error(request_id, &err))
            }
            Err(payload) => {
                self.engine_panicked(request_id, payload);
                self.reply(EngineEvent::error(
                    request_id,
                    &SimError::Worker("command panicked; engine discarded".to_string()),
                ))
            }
        }
    }

    fn apply_scheduler_settings(&mut self, config: &SimConfig) {
        self.scheduler
            .set_max_catch_up(config.scheduler.max_catch_up_steps);
        self.frame_interval = Duration::from_millis(config.scheduler.frame_interval_ms.max(1));
    }

    /// Executes one command. `Ok(Some(event))` is sent on the reply channel.
    fn handle(&mut self, command: Command) -> SimResult<Option<EngineEvent>> {
        match command {
            Command::Init {
                scale,
                config,
                request_id,
            } => {
                let merged = match &config {
                    Some(patch) => self.base_config.merged(patch)?,
                    None => self.base_config.clone(),
                };
                let config = merged.scaled(scale)?;
                let engine = SimulationEngine::new(config)?;
                self.apply_scheduler_settings(engine.config());
                self.scheduler.resume();

                let event = EngineEvent::Initialized {
                    request_id,
                    stats: engine.stats().clone(),
                    config: Box::new(engine.config().clone()),
                    world_config: engine.config().world.clone(),
                    zones: engine.zones().to_vec(),
                    obstacles: engine.obstacles(),
                };
                self.engine = Some(engine);
                Ok(Some(event))
            }
            Command::Update { request_id } => {
                let engine = self.engine_mut()?;
                engine.tick();
                Ok(Some(EngineEvent::Updated {
                    request_id,
                    buffers: engine.render_buffers(),
                    stats: engine.stats().clone(),
                    tick: engine.tick_count(),
                }))
            }
            Command::Reset { request_id } => {
                let engine = self.engine_mut()?;
                engine.reset()?;
                let stats = engine.stats().clone();
                Ok(Some(EngineEvent::Stats { request_id, stats }))
            }
            Command::SetConfig { config, request_id } => {
                let engine = self.engine_mut()?;
                engine.set_config(&config)?;
                let stats = engine.stats().clone();
                let applied = engine.config().clone();
                self.apply_scheduler_settings(&applied);
                Ok(Some(EngineEvent::Stats { request_id, stats }))
            }
            Command::Pause => {
                self.scheduler.pause();
                Ok(None)
            }
            Command::Resume => {
                self.scheduler.resume();
                Ok(None)
            }
            Command::SetSpeed { speed } => {
                self.scheduler.set_speed(speed);
                Ok(None)
            }
            Command::FindEntityAt {
                request_id,
                position,
                tolerance,
            } => {
                let found = self.engine_mut()?.find_entity_at(position, tolerance)?;
                Ok(Some(EngineEvent::CommandResponse {
                    request_id,
                    result: QueryResult::Entity(found),
                }))
            }
            Command::GetEntityByInstanceId {
                request_id,
                entity_type,
                instance_id,
                is_dead,
            } => {
                let found = self
                    .engine_mut()?
                    .entity_by_instance(entity_type, instance_id, is_dead);
                Ok(Some(EngineEvent::CommandResponse {
                    request_id,
                    result: QueryResult::Entity(found),
                }))
            }
            Command::GetGeneticNode {
                request_id,
                genome_id,
            } => {
                let node = self.engine_mut()?.genetic_node(genome_id);
                Ok(Some(EngineEvent::CommandResponse {
                    request_id,
                    result: QueryResult::GeneticNode(node),
                }))
            }
            Command::GetGeneticRoots { request_id } => {
                let roots = self.engine_mut()?.genetic_roots();
                Ok(Some(EngineEvent::CommandResponse {
                    request_id,
                    result: QueryResult::GeneticRoots(roots),
                }))
            }
            Command::GetStatsHistory { request_id } => {
                let history = self.engine_mut()?.stats_history();
                Ok(Some(EngineEvent::CommandResponse {
                    request_id,
                    result: QueryResult::StatsHistory(history),
                }))
            }
            Command::Shutdown => Ok(None),
        }
    }

    fn engine_mut(&mut self) -> SimResult<&mut SimulationEngine> {
        self.engine.as_mut().ok_or(SimError::NotInitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorCode;

    fn worker() -> (EngineWorker, WorkerChannels) {
        let mut config = SimConfig::default().scaled(0.05).unwrap();
        config.world.size = 120.0;
        config.statistics.summary_interval = 0;
        config.scheduler.frame_queue_capacity = 1;
        EngineWorker::new(config).unwrap()
    }

    fn initialized() -> (EngineWorker, WorkerChannels) {
        let (mut worker, channels) = worker();
        let flow = worker.dispatch(Command::Init {
            scale: 1.0,
            config: None,
            request_id: Some(1),
        });
        assert!(flow.is_continue());
        let reply = channels.replies.try_recv().unwrap();
        assert!(matches!(reply, EngineEvent::Initialized { request_id: Some(1), .. }));
        (worker, channels)
    }

    #[test]
    fn full_frame_queue_drops_frames() {
        let (mut worker, channels) = initialized();
        for _ in 0..3 {
            worker.engine.as_mut().unwrap().tick();
            assert!(worker.emit_frame().is_continue());
        }
        assert_eq!(worker.dropped_frames, 2);

        let Ok(EngineEvent::Updated { tick, request_id, .. }) = channels.frames.try_recv() else {
            panic!("first frame should be queued");
        };
        assert_eq!(tick, 1);
        assert_eq!(request_id, None);
        assert!(channels.frames.try_recv().is_err());
    }

    #[test]
    fn manual_update_is_delivered_when_frame_queue_is_full() {
        let (mut worker, channels) = initialized();
        assert!(worker.emit_frame().is_continue());
        assert!(worker.emit_frame().is_continue());
        assert_eq!(worker.dropped_frames, 1);

        assert!(worker
            .dispatch(Command::Update { request_id: Some(2) })
            .is_continue());
        let Ok(EngineEvent::Updated { request_id, tick, .. }) = channels.replies.try_recv() else {
            panic!("manual update produced no reply");
        };
        assert_eq!(request_id, Some(2));
        assert_eq!(tick, 1);
    }

    #[test]
    fn disconnected_consumers_stop_the_loop() {
        let (mut worker, channels) = initialized();
        let WorkerChannels {
            commands: _commands,
            frames,
            replies,
        } = channels;
        drop(frames);
        assert!(worker.emit_frame().is_break());

        drop(replies);
        assert!(worker
            .dispatch(Command::Update { request_id: None })
            .is_break());
    }

    #[test]
    fn panicking_command_discards_engine() {
        let (mut worker, channels) = initialized();
        let flow = worker.guarded(Some(3), |_| panic!("corrupted world"));
        assert!(flow.is_continue());
        assert!(worker.engine.is_none());
        let Ok(EngineEvent::Error { request_id, code, .. }) = channels.replies.try_recv() else {
            panic!("panic produced no error reply");
        };
        assert_eq!(request_id, Some(3));
        assert_eq!(code, ErrorCode::Worker);

        assert!(worker
            .dispatch(Command::GetGeneticRoots { request_id: 4 })
            .is_continue());
        let Ok(EngineEvent::Error { request_id, code, .. }) = channels.replies.try_recv() else {
            panic!("expected not-initialized error");
        };
        assert_eq!(request_id, Some(4));
        assert_eq!(code, ErrorCode::NotInitialized);

        assert!(worker
            .dispatch(Command::Init {
                scale: 1.0,
                config: None,
                request_id: Some(5),
            })
            .is_continue());
        assert!(worker.engine.is_some());
    }
}
