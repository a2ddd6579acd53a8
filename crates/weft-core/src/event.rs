//! Engine events emitted on every lifecycle transition
//!
//! Events are fire-and-forget observations: absence of a subscriber never
//! affects execution. Payload keys follow the wire names used in the
//! checkpoint format (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Enumerated engine event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "engine:start")]
    EngineStart,
    #[serde(rename = "engine:complete")]
    EngineComplete,
    #[serde(rename = "engine:error")]
    EngineError,
    #[serde(rename = "phase:start")]
    PhaseStart,
    #[serde(rename = "phase:complete")]
    PhaseComplete,
    #[serde(rename = "task:start")]
    TaskStart,
    #[serde(rename = "task:progress")]
    TaskProgress,
    #[serde(rename = "task:complete")]
    TaskComplete,
    #[serde(rename = "task:failed")]
    TaskFailed,
    #[serde(rename = "task:retry")]
    TaskRetry,
    #[serde(rename = "llm:request")]
    LlmRequest,
    #[serde(rename = "llm:response")]
    LlmResponse,
    #[serde(rename = "llm:stream")]
    LlmStream,
    #[serde(rename = "checkpoint:saved")]
    CheckpointSaved,
    #[serde(rename = "checkpoint:restored")]
    CheckpointRestored,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EngineStart => "engine:start",
            Self::EngineComplete => "engine:complete",
            Self::EngineError => "engine:error",
            Self::PhaseStart => "phase:start",
            Self::PhaseComplete => "phase:complete",
            Self::TaskStart => "task:start",
            Self::TaskProgress => "task:progress",
            Self::TaskComplete => "task:complete",
            Self::TaskFailed => "task:failed",
            Self::TaskRetry => "task:retry",
            Self::LlmRequest => "llm:request",
            Self::LlmResponse => "llm:response",
            Self::LlmStream => "llm:stream",
            Self::CheckpointSaved => "checkpoint:saved",
            Self::CheckpointRestored => "checkpoint:restored",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "engine:start" => Ok(Self::EngineStart),
            "engine:complete" => Ok(Self::EngineComplete),
            "engine:error" => Ok(Self::EngineError),
            "phase:start" => Ok(Self::PhaseStart),
            "phase:complete" => Ok(Self::PhaseComplete),
            "task:start" => Ok(Self::TaskStart),
            "task:progress" => Ok(Self::TaskProgress),
            "task:complete" => Ok(Self::TaskComplete),
            "task:failed" => Ok(Self::TaskFailed),
            "task:retry" => Ok(Self::TaskRetry),
            "llm:request" => Ok(Self::LlmRequest),
            "llm:response" => Ok(Self::LlmResponse),
            "llm:stream" => Ok(Self::LlmStream),
            "checkpoint:saved" => Ok(Self::CheckpointSaved),
            "checkpoint:restored" => Ok(Self::CheckpointRestored),
            _ => Err(format!("Invalid event kind: {}", s)),
        }
    }
}

/// A single observation announced on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl EngineEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            data: Map::new(),
        }
    }

    /// Attach a payload entry
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Read a payload entry as a string, if present
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Read a payload entry as an integer, if present
    pub fn data_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_roundtrip() {
        for kind in [
            EventKind::EngineStart,
            EventKind::TaskRetry,
            EventKind::CheckpointSaved,
        ] {
            let parsed: EventKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("task:unknown".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_event_payload_builder() {
        let event = EngineEvent::new(EventKind::TaskStart)
            .with("taskId", "a")
            .with("attempt", 1);

        assert_eq!(event.data_str("taskId"), Some("a"));
        assert_eq!(event.data_i64("attempt"), Some(1));
        assert!(event.data_str("missing").is_none());
    }

    #[test]
    fn test_event_serializes_with_colon_name() {
        let event = EngineEvent::new(EventKind::CheckpointSaved).with("planId", "plan-x");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"checkpoint:saved\""));
        assert!(json.contains("\"planId\""));
    }
}
