use crate::tracker::Track;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Liveness status published by a running unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Ok,
    Error,
    Stopped,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Ok => write!(f, "ok"),
            ProbeStatus::Error => write!(f, "error"),
            ProbeStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// `probe:<name>` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    pub ts: i64,
    pub status: ProbeStatus,
    #[serde(default)]
    pub details: Value,
}

impl Probe {
    pub fn now(status: ProbeStatus, details: Value) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp(),
            status,
            details,
        }
    }
}

/// One entry of the `logs` lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub ts: i64,
    pub name: String,
    pub level: String,
    pub msg: String,
}

impl LogRecord {
    pub fn now(name: impl Into<String>, level: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp(),
            name: name.into(),
            level: level.into(),
            msg: msg.into(),
        }
    }
}

/// `tracks:<name>` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    /// Capture time of the frame the tracks were computed on
    pub ts: i64,
    pub tracks: Vec<Track>,
}
