use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartProgramRequest {
    /// Shell command to run inside the sandbox. Defaults to `python -u <main-file>`
    /// (as configured at startup) when omitted.
    pub command: Option<String>,
    /// Caller-supplied label echoed back unchanged, for tracking sessions
    /// across multiple concurrent `start_program` calls.
    pub session_label: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct StartProgramResult {
    pub ok: bool,
    pub session_id: Option<String>,
    pub command: Option<String>,
    pub label: Option<String>,
    pub error: Option<String>,
}

impl StartProgramResult {
    pub fn failed(error: String) -> Self {
        Self { ok: false, session_id: None, command: None, label: None, error: Some(error) }
    }
}
