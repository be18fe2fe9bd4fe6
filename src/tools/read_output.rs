use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::event::Event;

fn default_wait_ms() -> u64 {
    250
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadOutputRequest {
    pub session_id: String,
    /// Milliseconds to wait for at least one event if none are already
    /// queued. 0 means return immediately with whatever is queued.
    /// Clamped to [0, 10000].
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ReadOutputResult {
    pub events: Vec<Event>,
    /// Whether the session is still running as of this call.
    pub alive: bool,
    pub stdout_bytes: u64,
    pub stderr_bytes: u64,
    pub error: Option<String>,
}

impl ReadOutputResult {
    pub fn unknown_session() -> Self {
        Self {
            events: Vec::new(),
            alive: false,
            stdout_bytes: 0,
            stderr_bytes: 0,
            error: Some("unknown session".to_string()),
        }
    }
}
