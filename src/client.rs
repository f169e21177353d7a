//! Caller-side handle to the engine worker.
//!
//! Queries are correlated with replies by request id. A query that gets no
//! matching reply within the handle's timeout fails with
//! [`SimError::AsyncTimeout`]; once the worker is gone every call fails with
//! [`SimError::EngineTerminated`].

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use glam::Vec3;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SimConfig;
use crate::engine::EntityKind;
use crate::error::{SimError, SimResult};
use crate::organisms::{EntityInfo, GeneticTreeNode, GenomeId, StatsSnapshot};
use crate::protocol::{Command, EngineEvent, QueryResult};
use crate::worker::{EngineWorker, WorkerChannels};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct EngineHandle {
    commands: Sender<Command>,
    frames: Receiver<EngineEvent>,
    replies: Receiver<EngineEvent>,
    worker: Option<JoinHandle<()>>,
    next_request_id: u64,
    timeout: Duration,
    /// Replies that arrived without a request waiting for them
    unsolicited: VecDeque<EngineEvent>,
    terminated: bool,
}

impl EngineHandle {
    pub fn spawn(config: SimConfig) -> SimResult<Self> {
        Self::with_timeout(config, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(config: SimConfig, timeout: Duration) -> SimResult<Self> {
        let (worker, channels) = EngineWorker::spawn(config)?;
        Ok(Self::from_channels(channels, Some(worker), timeout))
    }

    /// Wraps existing channels, e.g. a worker driven by something else.
    pub fn from_channels(
        channels: WorkerChannels,
        worker: Option<JoinHandle<()>>,
        timeout: Duration,
    ) -> Self {
        Self {
            commands: channels.commands,
            frames: channels.frames,
            replies: channels.replies,
            worker,
            next_request_id: 1,
            timeout,
            unsolicited: VecDeque::new(),
            terminated: false,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn send(&mut self, command: Command) -> SimResult<()> {
        if self.terminated {
            return Err(SimError::EngineTerminated);
        }
        self.commands.send(command).map_err(|_| {
            self.terminated = true;
            SimError::EngineTerminated
        })
    }

    fn allocate_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Sends the command built for a fresh request id and waits for its reply.
    fn request(&mut self, build: impl FnOnce(u64) -> Command) -> SimResult<EngineEvent> {
        let request_id = self.allocate_request_id();
        self.send(build(request_id))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.replies.recv_timeout(remaining) {
                Ok(event) if event.request_id() == Some(request_id) => {
                    return match event {
                        EngineEvent::Error { .. } => Err(event
                            .into_error()
                            .unwrap_or(SimError::Worker("malformed error reply".to_string()))),
                        event => Ok(event),
                    };
                }
                Ok(event) if event.request_id().is_none() => self.unsolicited.push_back(event),
                Ok(event) => {
                    debug!(stale = ?event.request_id(), request_id, "discarding stale reply");
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(request_id, "request timed out");
                    return Err(SimError::AsyncTimeout {
                        request_id,
                        waited: self.timeout,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.terminated = true;
                    return Err(SimError::EngineTerminated);
                }
            }
        }
    }

    /// Builds the world. `config` is a partial configuration merged over the
    /// worker's base configuration before `scale` is applied.
    pub fn init(&mut self, scale: f32, config: Option<Value>) -> SimResult<EngineEvent> {
        self.request(|id| Command::Init {
            scale,
            config,
            request_id: Some(id),
        })
    }

    pub fn reset(&mut self) -> SimResult<StatsSnapshot> {
        let reply = self.request(|id| Command::Reset {
            request_id: Some(id),
        })?;
        expect_stats(reply)
    }

    pub fn set_config(&mut self, patch: Value) -> SimResult<StatsSnapshot> {
        let reply = self.request(|id| Command::SetConfig {
            config: patch,
            request_id: Some(id),
        })?;
        expect_stats(reply)
    }

    pub fn find_entity_at(&mut self, position: Vec3, tolerance: f32) -> SimResult<Option<EntityInfo>> {
        let reply = self.request(|request_id| Command::FindEntityAt {
            request_id,
            position,
            tolerance,
        })?;
        match expect_result(reply)? {
            QueryResult::Entity(entity) => Ok(entity),
            other => Err(unexpected(&other)),
        }
    }

    pub fn entity_by_instance_id(
        &mut self,
        entity_type: EntityKind,
        instance_id: usize,
        is_dead: bool,
    ) -> SimResult<Option<EntityInfo>> {
        let reply = self.request(|request_id| Command::GetEntityByInstanceId {
            request_id,
            entity_type,
            instance_id,
            is_dead,
        })?;
        match expect_result(reply)? {
            QueryResult::Entity(entity) => Ok(entity),
            other => Err(unexpected(&other)),
        }
    }

    pub fn genetic_node(&mut self, genome_id: GenomeId) -> SimResult<Option<GeneticTreeNode>> {
        let reply = self.request(|request_id| Command::GetGeneticNode {
            request_id,
            genome_id,
        })?;
        match expect_result(reply)? {
            QueryResult::GeneticNode(node) => Ok(node),
            other => Err(unexpected(&other)),
        }
    }

    pub fn genetic_roots(&mut self) -> SimResult<Vec<GeneticTreeNode>> {
        let reply = self.request(|request_id| Command::GetGeneticRoots { request_id })?;
        match expect_result(reply)? {
            QueryResult::GeneticRoots(roots) => Ok(roots),
            other => Err(unexpected(&other)),
        }
    }

    pub fn stats_history(&mut self) -> SimResult<Vec<StatsSnapshot>> {
        let reply = self.request(|request_id| Command::GetStatsHistory { request_id })?;
        match expect_result(reply)? {
            QueryResult::StatsHistory(history) => Ok(history),
            other => Err(unexpected(&other)),
        }
    }

    /// Runs one manual tick and returns its `updated` frame.
    pub fn update(&mut self) -> SimResult<EngineEvent> {
        self.request(|id| Command::Update {
            request_id: Some(id),
        })
    }

    pub fn pause(&mut self) -> SimResult<()> {
        self.send(Command::Pause)
    }

    pub fn resume(&mut self) -> SimResult<()> {
        self.send(Command::Resume)
    }

    pub fn set_speed(&mut self, speed: f32) -> SimResult<()> {
        self.send(Command::SetSpeed { speed })
    }

    /// Waits up to `timeout` for the next frame.
    pub fn next_frame(&mut self, timeout: Duration) -> SimResult<Option<EngineEvent>> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.terminated = true;
                Err(SimError::EngineTerminated)
            }
        }
    }

    /// Drains queued frames and returns the newest.
    pub fn latest_frame(&mut self) -> Option<EngineEvent> {
        let mut latest = None;
        while let Ok(frame) = self.frames.try_recv() {
            latest = Some(frame);
        }
        latest
    }

    /// Next event that was not a reply to a pending request, such as an
    /// error raised by a fire-and-forget command.
    pub fn try_recv_event(&mut self) -> Option<EngineEvent> {
        if let Some(event) = self.unsolicited.pop_front() {
            return Some(event);
        }
        match self.replies.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.terminated = true;
                None
            }
        }
    }

    /// Stops the worker and waits for its thread. Later calls fail with
    /// [`SimError::EngineTerminated`].
    pub fn terminate(&mut self) {
        if !self.terminated {
            let _ = self.commands.send(Command::Shutdown);
            self.terminated = true;
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("engine worker panicked during shutdown");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn expect_stats(event: EngineEvent) -> SimResult<StatsSnapshot> {
    match event {
        EngineEvent::Stats { stats, .. } => Ok(stats),
        other => Err(SimError::Worker(format!("unexpected reply: {other:?}"))),
    }
}

fn expect_result(event: EngineEvent) -> SimResult<QueryResult> {
    match event {
        EngineEvent::CommandResponse { result, .. } => Ok(result),
        other => Err(SimError::Worker(format!("unexpected reply: {other:?}"))),
    }
}

fn unexpected(result: &QueryResult) -> SimError {
    SimError::Worker(format!("unexpected query result: {result:?}"))
}
