use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};

use crate::config::SessionConfig;
use crate::launcher::ContainerLauncher;
use crate::registry::Registry;
use crate::tools::read_output::{ReadOutputRequest, ReadOutputResult};
use crate::tools::send_input::{SendInputRequest, SendInputResult};
use crate::tools::start_program::{StartProgramRequest, StartProgramResult};
use crate::tools::stop_session::{StopSessionRequest, StopSessionResult};

#[derive(Clone)]
pub struct SandboxServer {
    registry: Arc<Registry>,
    config: Arc<SessionConfig>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl SandboxServer {
    pub fn new(launcher: Arc<dyn ContainerLauncher>, config: Arc<SessionConfig>) -> Self {
        let registry = Arc::new(Registry::new(launcher, config.clone()));
        Self { registry, config, tool_router: Self::tool_router() }
    }

    /// Stops every session still running, used on process shutdown.
    pub async fn shutdown(&self) {
        self.registry.shutdown_all().await;
    }

    #[tool(
        name = "start_program",
        description = "Launch a program inside a network-isolated, read-only sandbox container and return a session_id. Defaults to running the configured entrypoint when `command` is omitted."
    )]
    pub async fn start_program(
        &self,
        Parameters(req): Parameters<StartProgramRequest>,
    ) -> Result<CallToolResult, McpError> {
        let command = req.command.unwrap_or_else(|| self.config.default_command.clone());

        let result = match self.registry.create(command.clone()).await {
            Ok(supervisor) => StartProgramResult {
                ok: true,
                session_id: Some(supervisor.id().to_string()),
                command: Some(command),
                label: req.session_label,
                error: None,
            },
            Err(e) => StartProgramResult::failed(e.user_message()),
        };
        json_result(&result)
    }

    #[tool(
        name = "send_input",
        description = "Write a line of text to a running session's stdin. A trailing newline is appended if not already present."
    )]
    pub async fn send_input(
        &self,
        Parameters(req): Parameters<SendInputRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = match self.registry.get(&req.session_id).await {
            Ok(supervisor) => supervisor.send(&req.text).await,
            Err(_) => SendInputResult { ok: false, error: Some("unknown session".to_string()) },
        };
        json_result(&result)
    }

    #[tool(
        name = "read_output",
        description = "Drain queued stdout/stderr/lifecycle events for a session. Waits up to `wait_ms` for the first event if none are already queued; returns immediately otherwise.",
        annotations(read_only_hint = true)
    )]
    pub async fn read_output(
        &self,
        Parameters(req): Parameters<ReadOutputRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = match self.registry.get(&req.session_id).await {
            Ok(supervisor) => supervisor.read(req.wait_ms.min(10_000)).await,
            Err(_) => ReadOutputResult::unknown_session(),
        };
        json_result(&result)
    }

    #[tool(
        name = "stop_session",
        description = "Terminate a session's process group. Sends SIGTERM and escalates to SIGKILL after a grace period, or SIGKILL immediately when `kill` is true."
    )]
    pub async fn stop_session(
        &self,
        Parameters(req): Parameters<StopSessionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = match self.registry.get(&req.session_id).await {
            Ok(supervisor) => supervisor.stop(req.kill).await,
            Err(_) => StopSessionResult {
                ok: false,
                message: None,
                error: Some("unknown session".to_string()),
            },
        };
        json_result(&result)
    }
}

fn json_result<T: serde::Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string(value).map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

#[tool_handler]
impl ServerHandler for SandboxServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "stockade".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Stockade: interactive program-execution sandbox.\n\n\
                 Tools:\n\
                 - `start_program`: Launch a program in an isolated container, returns a session_id.\n\
                 - `send_input`: Write a line to the running program's stdin.\n\
                 - `read_output`: Drain stdout/stderr/lifecycle events, optionally waiting for new ones.\n\
                 - `stop_session`: Terminate a session's process group.\n\n\
                 Workflow:\n\
                 1. Call `start_program` to launch the subject program.\n\
                 2. Poll `read_output` to observe its stdout/stderr; it terminates waiting early once \
                 any event arrives, so short `wait_ms` values are cheap to poll.\n\
                 3. Use `send_input` to answer any prompts the program writes to stdout.\n\
                 4. Sessions end on their own from wall-clock timeout, idle timeout, an output limit, \
                 or a normal process exit; call `stop_session` to end one early."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
