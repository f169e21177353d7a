//! Messages exchanged with the engine worker.
//!
//! Every message is a JSON object tagged by `type`; names and fields are
//! camelCase. Queries carry a `requestId` that the reply echoes.

use std::time::Duration;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{SimConfig, WorldConfig};
use crate::engine::EntityKind;
use crate::error::{SimError, SimResult};
use crate::organisms::{EntityInfo, GeneticTreeNode, GenomeId, ObstacleInfo, StatsSnapshot};
use crate::render::RenderBuffers;
use crate::world::EcologicalZone;

fn default_scale() -> f32 {
    1.0
}

/// Inbound commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Init {
        #[serde(default = "default_scale")]
        scale: f32,
        #[serde(default)]
        config: Option<Value>,
        #[serde(default)]
        request_id: Option<u64>,
    },
    /// Manual single step. The frame is sent as a reply, never dropped.
    Update {
        #[serde(default)]
        request_id: Option<u64>,
    },
    Reset {
        #[serde(default)]
        request_id: Option<u64>,
    },
    SetConfig {
        config: Value,
        #[serde(default)]
        request_id: Option<u64>,
    },
    Pause,
    Resume,
    SetSpeed {
        speed: f32,
    },
    FindEntityAt {
        request_id: u64,
        position: Vec3,
        tolerance: f32,
    },
    GetEntityByInstanceId {
        request_id: u64,
        entity_type: EntityKind,
        instance_id: usize,
        #[serde(default)]
        is_dead: bool,
    },
    GetGeneticNode {
        request_id: u64,
        genome_id: GenomeId,
    },
    GetGeneticRoots {
        request_id: u64,
    },
    GetStatsHistory {
        request_id: u64,
    },
    Shutdown,
}

impl Command {
    pub fn from_json(text: &str) -> SimResult<Self> {
        serde_json::from_str(text).map_err(|err| SimError::InvalidCommand(err.to_string()))
    }

    pub fn from_value(value: Value) -> SimResult<Self> {
        serde_json::from_value(value).map_err(|err| SimError::InvalidCommand(err.to_string()))
    }

    pub fn request_id(&self) -> Option<u64> {
        match self {
            Command::Init { request_id, .. }
            | Command::Update { request_id }
            | Command::Reset { request_id }
            | Command::SetConfig { request_id, .. } => *request_id,
            Command::FindEntityAt { request_id, .. }
            | Command::GetEntityByInstanceId { request_id, .. }
            | Command::GetGeneticNode { request_id, .. }
            | Command::GetGeneticRoots { request_id }
            | Command::GetStatsHistory { request_id } => Some(*request_id),
            Command::Pause
            | Command::Resume
            | Command::SetSpeed { .. }
            | Command::Shutdown => None,
        }
    }

    /// Commands that need an initialized engine.
    pub fn requires_engine(&self) -> bool {
        !matches!(
            self,
            Command::Init { .. }
                | Command::Pause
                | Command::Resume
                | Command::SetSpeed { .. }
                | Command::Shutdown
        )
    }
}

/// Payload of a `commandResponse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum QueryResult {
    Entity(Option<EntityInfo>),
    GeneticNode(Option<GeneticTreeNode>),
    GeneticRoots(Vec<GeneticTreeNode>),
    StatsHistory(Vec<StatsSnapshot>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    NotInitialized,
    InvalidCommand,
    InvalidConfig,
    AsyncTimeout,
    EngineTerminated,
    Serialization,
    Worker,
}

impl From<&SimError> for ErrorCode {
    fn from(err: &SimError) -> Self {
        match err {
            SimError::NotInitialized => ErrorCode::NotInitialized,
            SimError::InvalidCommand(_) => ErrorCode::InvalidCommand,
            SimError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            SimError::AsyncTimeout { .. } => ErrorCode::AsyncTimeout,
            SimError::EngineTerminated => ErrorCode::EngineTerminated,
            SimError::Serialization(_) => ErrorCode::Serialization,
            SimError::Worker(_) => ErrorCode::Worker,
        }
    }
}

/// Outbound events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    Initialized {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        stats: StatsSnapshot,
        config: Box<SimConfig>,
        world_config: WorldConfig,
        zones: Vec<EcologicalZone>,
        obstacles: Vec<ObstacleInfo>,
    },
    Updated {
        /// Set when the frame answers a manual `update`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        buffers: RenderBuffers,
        stats: StatsSnapshot,
        tick: u64,
    },
    Stats {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        stats: StatsSnapshot,
    },
    CommandResponse {
        request_id: u64,
        result: QueryResult,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
}

impl EngineEvent {
    pub fn error(request_id: Option<u64>, err: &SimError) -> Self {
        EngineEvent::Error {
            request_id,
            code: err.into(),
            message: err.to_string(),
            stack: None,
        }
    }

    pub fn request_id(&self) -> Option<u64> {
        match self {
            EngineEvent::Initialized { request_id, .. }
            | EngineEvent::Updated { request_id, .. }
            | EngineEvent::Stats { request_id, .. }
            | EngineEvent::Error { request_id, .. } => *request_id,
            EngineEvent::CommandResponse { request_id, .. } => Some(*request_id),
        }
    }

    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Rebuilds the error an `error` event describes.
    ///
    /// The elapsed wait of an `asyncTimeout` is not carried on the wire and
    /// comes back as zero.
    pub fn into_error(self) -> Option<SimError> {
        let EngineEvent::Error {
            request_id,
            code,
            message,
            ..
        } = self
        else {
            return None;
        };
        Some(match code {
            ErrorCode::NotInitialized => SimError::NotInitialized,
            ErrorCode::InvalidCommand => {
                SimError::InvalidCommand(detail(message, "invalid command: "))
            }
            ErrorCode::InvalidConfig => {
                SimError::InvalidConfig(detail(message, "invalid configuration: "))
            }
            ErrorCode::AsyncTimeout => SimError::AsyncTimeout {
                request_id: request_id.unwrap_or_default(),
                waited: Duration::ZERO,
            },
            ErrorCode::EngineTerminated => SimError::EngineTerminated,
            ErrorCode::Serialization => SimError::Serialization(<serde_json::Error as serde::de::Error>::custom(
                detail(message, "serialization failed: "),
            )),
            ErrorCode::Worker => SimError::Worker(detail(message, "worker error: ")),
        })
    }
}

/// Strips the display prefix `SimError` put in front of the detail text.
fn detail(message: String, prefix: &str) -> String {
    match message.strip_prefix(prefix) {
        Some(rest) => rest.to_string(),
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_commands() {
        assert_eq!(
            Command::from_json(r#"{"type":"update"}"#).unwrap(),
            Command::Update { request_id: None }
        );
        assert_eq!(
            Command::from_json(r#"{"type":"update","requestId":5}"#)
                .unwrap()
                .request_id(),
            Some(5)
        );
        let init = Command::from_json(r#"{"type":"init","scale":0.5}"#).unwrap();
        assert_eq!(
            init,
            Command::Init {
                scale: 0.5,
                config: None,
                request_id: None
            }
        );
        let query = Command::from_json(
            r#"{"type":"getEntityByInstanceId","requestId":4,"entityType":"predator","instanceId":2,"isDead":true}"#,
        )
        .unwrap();
        assert_eq!(query.request_id(), Some(4));
        assert!(matches!(
            query,
            Command::GetEntityByInstanceId {
                entity_type: EntityKind::Predator,
                instance_id: 2,
                is_dead: true,
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_or_malformed_messages() {
        assert!(matches!(
            Command::from_json(r#"{"type":"explode"}"#),
            Err(SimError::InvalidCommand(_))
        ));
        assert!(matches!(
            Command::from_json(r#"{"type":"setSpeed"}"#),
            Err(SimError::InvalidCommand(_))
        ));
        assert!(Command::from_json("not json").is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = EngineEvent::error(Some(9), &SimError::NotInitialized);
        let json: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["requestId"], 9);
        assert_eq!(json["code"], "notInitialized");
        assert!(json.get("stack").is_none());

        let response = EngineEvent::CommandResponse {
            request_id: 3,
            result: QueryResult::GeneticRoots(Vec::new()),
        };
        let json: Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "commandResponse");
        assert_eq!(json["result"]["kind"], "geneticRoots");
    }

    #[test]
    fn error_events_rebuild_the_matching_error() {
        let timeout = SimError::AsyncTimeout {
            request_id: 12,
            waited: Duration::from_secs(5),
        };
        let rebuilt = EngineEvent::error(Some(12), &timeout).into_error().unwrap();
        assert!(matches!(
            rebuilt,
            SimError::AsyncTimeout {
                request_id: 12,
                waited: Duration::ZERO
            }
        ));

        let parse_failure = serde_json::from_str::<Value>("{").unwrap_err();
        let original = SimError::from(parse_failure);
        let rebuilt = EngineEvent::error(None, &original).into_error().unwrap();
        assert!(matches!(rebuilt, SimError::Serialization(_)));
        assert_eq!(rebuilt.to_string(), original.to_string());

        let worker = SimError::Worker("tick panicked".to_string());
        let rebuilt = EngineEvent::error(None, &worker).into_error().unwrap();
        assert!(matches!(&rebuilt, SimError::Worker(message) if message == "tick panicked"));

        let invalid = SimError::InvalidConfig("drag out of range".to_string());
        let rebuilt = EngineEvent::error(None, &invalid).into_error().unwrap();
        assert_eq!(rebuilt.to_string(), invalid.to_string());

        assert!(EngineEvent::Stats {
            request_id: None,
            stats: StatsSnapshot::default(),
        }
        .into_error()
        .is_none());
    }
}
