use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single lifecycle or output record produced by a session's supervisor.
///
/// Exactly one of `Exit` / `Timeout` / `IdleTimeout` / `Limit` marks the
/// terminal event for a session; `StdoutClosed`/`StderrClosed` may appear
/// before or after it but never in its place.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A decoded chunk of stdout, in arrival order for this stream.
    Stdout { data: String },
    /// A decoded chunk of stderr, in arrival order for this stream.
    Stderr { data: String },
    /// Stdout reached end-of-file.
    StdoutClosed,
    /// Stderr reached end-of-file.
    StderrClosed,
    /// The child process exited. `code` is `None` when the exit status
    /// could not be determined (e.g. killed by an untrappable signal).
    Exit { code: Option<i32> },
    /// The wall-clock `session_timeout` elapsed.
    Timeout { seconds: f64 },
    /// No stdout/stdin activity for `idle_timeout` seconds.
    IdleTimeout { seconds: f64 },
    /// Cumulative stdout+stderr bytes exceeded `output_limit`.
    Limit { limit: u64 },
}
