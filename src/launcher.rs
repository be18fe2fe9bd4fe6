use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::config::SessionConfig;
use crate::error::SandboxError;

/// The spawned child plus its three piped byte streams, handed to the
/// supervisor which takes ownership of each independently (readers get
/// stdout/stderr, the stdin writer backs `send`, the watcher task owns
/// `child` itself).
pub struct LaunchedChild {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    pub pid: u32,
}

/// Pure construction of a container invocation. Carries no state, so the
/// supervisor can be exercised in tests against a launcher that never
/// touches a real container runtime.
#[async_trait]
pub trait ContainerLauncher: Send + Sync {
    async fn launch(&self, cfg: &SessionConfig, command: &str) -> Result<LaunchedChild, SandboxError>;
}

/// Launches `command` inside a network-less, read-only, memory-capped
/// container via an external container-runtime binary (`docker`).
pub struct DockerLauncher {
    /// Name of the runtime binary on PATH, e.g. `docker` or `podman`.
    binary: String,
}

impl DockerLauncher {
    pub fn new() -> Self {
        Self { binary: "docker".to_string() }
    }
}

impl Default for DockerLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerLauncher for DockerLauncher {
    async fn launch(&self, cfg: &SessionConfig, command: &str) -> Result<LaunchedChild, SandboxError> {
        let workspace = cfg.workspace.to_string_lossy().to_string();
        let mount_workspace = format!("{workspace}:/workspace:ro");
        let mount_code = format!("{workspace}:/code:ro");

        let mut env_setup = "HOME=/tmp LANG=C.UTF-8 PYTHONDONTWRITEBYTECODE=1 PYTHONUNBUFFERED=1".to_string();
        if let Some(ref pp) = cfg.python_path {
            env_setup.push_str(&format!(" PYTHONPATH={pp}"));
        }
        let inner_cmd = format!("cd /workspace && {env_setup} {command}");

        let mut docker_cmd = Command::new(&self.binary);
        docker_cmd
            .arg("run")
            .arg("--rm")
            .arg("-i")
            .arg("--network=none")
            .arg("--user")
            .arg(&cfg.docker_user)
            .arg("--cpus")
            .arg(&cfg.docker_cpus)
            .arg("--memory")
            .arg(&cfg.docker_memory)
            .arg("--memory-swap")
            .arg(&cfg.docker_memory)
            .arg("--pids-limit")
            .arg("128")
            .arg("--read-only")
            .arg("--cap-drop=ALL")
            .arg("--security-opt")
            .arg("no-new-privileges")
            .arg("--security-opt")
            .arg("label=disable")
            .arg("--mount")
            .arg(format!("type=tmpfs,destination=/tmp,tmpfs-size={}", cfg.tmpfs_size))
            .arg("-v")
            .arg(&mount_workspace)
            .arg("-v")
            .arg(&mount_code)
            .arg(&cfg.python_image)
            .arg("bash")
            .arg("-lc")
            .arg(&inner_cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0); // child becomes its own process group leader

        // DOCKER_HOST / DOCKER_CERT_PATH are forwarded unchanged via the
        // inherited environment; no explicit wiring needed unless unset.
        if let Some(ref endpoint) = cfg.runtime_endpoint {
            docker_cmd.env("DOCKER_HOST", endpoint);
        }
        if let Some(ref tls_dir) = cfg.runtime_tls_dir {
            docker_cmd.env("DOCKER_CERT_PATH", tls_dir);
        }

        tracing::debug!(command, image = %cfg.python_image, "launching container session");

        let mut child = docker_cmd
            .spawn()
            .map_err(|e| SandboxError::Spawn(format!("failed to spawn {}: {e}", self.binary)))?;

        let pid = child
            .id()
            .ok_or_else(|| SandboxError::Spawn("container process has no pid".to_string()))?;
        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        Ok(LaunchedChild { child, stdin, stdout, stderr, pid })
    }
}

/// Best-effort image availability check, run once at process start. Never
/// fatal: a missing image surfaces as a spawn error on the first
/// `start_program` instead.
pub async fn ensure_image(binary: &str, image: &str) {
    let inspect = Command::new(binary)
        .args(["image", "inspect", image])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if !matches!(inspect, Ok(status) if status.success()) {
        tracing::info!(image, "image not found locally, attempting pull");
        let _ = Command::new(binary)
            .args(["pull", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }
}

/// Send `sig` to the entire process group led by `pid`. Mirrors the guard
/// used for CLI subprocess dispatch elsewhere in this codebase: killing only
/// the leader PID would leave any grandchildren the container runtime spawns
/// as orphans.
pub(crate) fn kill_process_group(pid: u32, sig: i32) {
    unsafe {
        libc::kill(-(pid as i32), sig);
    }
}

#[cfg(feature = "test-launcher")]
pub mod test_support {
    use super::*;

    /// Runs `command` directly via `sh -c`, bypassing the container runtime
    /// entirely. Exists only so the supervisor's timeout/limit/ordering
    /// behavior can be exercised deterministically in tests without Docker.
    pub struct NativeLauncher;

    #[async_trait]
    impl ContainerLauncher for NativeLauncher {
        async fn launch(&self, _cfg: &SessionConfig, command: &str) -> Result<LaunchedChild, SandboxError> {
            let mut cmd = Command::new("sh");
            cmd.arg("-c")
                .arg(command)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .process_group(0);

            let mut child = cmd
                .spawn()
                .map_err(|e| SandboxError::Spawn(format!("failed to spawn sh: {e}")))?;

            let pid = child
                .id()
                .ok_or_else(|| SandboxError::Spawn("process has no pid".to_string()))?;
            let stdin = child.stdin.take().expect("stdin was piped");
            let stdout = child.stdout.take().expect("stdout was piped");
            let stderr = child.stderr.take().expect("stderr was piped");

            Ok(LaunchedChild { child, stdin, stdout, stderr, pid })
        }
    }
}
