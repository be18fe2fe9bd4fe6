use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SendInputRequest {
    pub session_id: String,
    /// Text to write to the process's stdin. A trailing newline is appended
    /// if `text` doesn't already end with one.
    pub text: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SendInputResult {
    pub ok: bool,
    pub error: Option<String>,
}
