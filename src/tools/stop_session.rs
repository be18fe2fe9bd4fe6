use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StopSessionRequest {
    pub session_id: String,
    /// Send SIGKILL immediately instead of SIGTERM-then-escalate.
    #[serde(default)]
    pub kill: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct StopSessionResult {
    pub ok: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}
