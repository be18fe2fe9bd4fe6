use std::path::PathBuf;

use clap::Parser;

use crate::error::SandboxError;

/// Command-line flags the host process launches us with. Mirrors the
/// `argparse` surface of the original runner one-for-one; `clap` just gives
/// us typed parsing, `--help`, and env fallbacks for free.
#[derive(Debug, Parser)]
#[command(name = "stockade", about = "Interactive program-execution sandbox, exposed as an MCP tool server")]
pub struct Cli {
    /// Path to the read-only workspace mounted into every container.
    #[arg(long)]
    pub workspace: PathBuf,

    /// Default entrypoint (relative to the workspace), used to build
    /// `python -u <main-file>` when `--default-command` is not given.
    #[arg(long)]
    pub main_file: String,

    /// Container image used to run the subject program.
    #[arg(long, env = "PYTHON_RUNNER_IMAGE", default_value = "python:3.11")]
    pub python_image: String,

    /// `uid:gid` the container process runs as.
    #[arg(long, env = "DOCKER_USER", default_value = "65534:65534")]
    pub docker_user: String,

    /// CPU share passed verbatim to the container runtime's `--cpus`.
    #[arg(long, env = "DOCKER_CPUS", default_value = "0.5")]
    pub docker_cpus: String,

    /// Memory cap passed verbatim to the container runtime's `--memory`
    /// (and `--memory-swap`, set equal to this value).
    #[arg(long, env = "DOCKER_MEMORY", default_value = "256m")]
    pub docker_memory: String,

    /// Size of the tmpfs mounted at `/tmp` inside the container.
    #[arg(long, env = "RUNNER_TMPFS_SIZE", default_value = "32m")]
    pub tmpfs_size: String,

    /// Maximum cumulative stdout+stderr bytes before the session is killed.
    #[arg(long, default_value_t = 65536)]
    pub output_limit: u64,

    /// Wall-clock session lifetime in seconds. 0 = unlimited.
    #[arg(long, default_value_t = 60)]
    pub session_timeout: u64,

    /// Idle (no activity) timeout in seconds. 0 = unlimited.
    #[arg(long, default_value_t = 15)]
    pub idle_timeout: u64,

    /// Override the default command instead of deriving it from `--main-file`.
    #[arg(long)]
    pub default_command: Option<String>,
}

/// Immutable, validated configuration shared by every session for the
/// lifetime of the host process.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub workspace: PathBuf,
    pub default_command: String,
    pub python_image: String,
    pub docker_user: String,
    pub docker_cpus: String,
    pub docker_memory: String,
    pub tmpfs_size: String,
    pub output_limit: u64,
    pub session_timeout: u64,
    pub idle_timeout: u64,
    /// Container runtime endpoint, forwarded unchanged to the runtime
    /// invocation (e.g. `DOCKER_HOST`).
    pub runtime_endpoint: Option<String>,
    /// TLS material directory for the runtime endpoint (e.g. `DOCKER_CERT_PATH`).
    pub runtime_tls_dir: Option<String>,
    /// Forwarded into the container's environment when set, mirroring the
    /// host's own `PYTHONPATH`.
    pub python_path: Option<String>,
}

impl SessionConfig {
    /// Validate and materialize the CLI flags into a `SessionConfig`.
    /// A missing or unreadable workspace is a fatal configuration error.
    pub fn from_cli(cli: Cli) -> Result<Self, SandboxError> {
        let workspace = std::fs::canonicalize(&cli.workspace)
            .map_err(|_| SandboxError::WorkspaceMissing(cli.workspace.clone()))?;
        if !workspace.is_dir() {
            return Err(SandboxError::WorkspaceMissing(cli.workspace));
        }

        let default_command = cli
            .default_command
            .unwrap_or_else(|| format!("python -u {}", shell_quote(&cli.main_file)));

        Ok(Self {
            workspace,
            default_command,
            python_image: cli.python_image,
            docker_user: cli.docker_user,
            docker_cpus: cli.docker_cpus,
            docker_memory: cli.docker_memory,
            tmpfs_size: cli.tmpfs_size,
            output_limit: cli.output_limit,
            session_timeout: cli.session_timeout,
            idle_timeout: cli.idle_timeout,
            runtime_endpoint: std::env::var("DOCKER_HOST").ok(),
            runtime_tls_dir: std::env::var("DOCKER_CERT_PATH").ok(),
            python_path: std::env::var("PYTHONPATH").ok(),
        })
    }
}

/// Minimal POSIX shell quoting for the default command's main-file argument.
/// Wraps in single quotes, escaping any embedded single quote.
fn shell_quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "_./-".contains(c)) {
        return s.to_string();
    }
    let escaped = s.replace('\'', r"'\''");
    format!("'{escaped}'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_passes_through_simple_names() {
        assert_eq!(shell_quote("main.py"), "main.py");
        assert_eq!(shell_quote("solutions/main.py"), "solutions/main.py");
    }

    #[test]
    fn shell_quote_escapes_special_characters() {
        assert_eq!(shell_quote("a b.py"), "'a b.py'");
        assert_eq!(shell_quote("o'brien.py"), r"'o'\''brien.py'");
    }

    #[test]
    fn from_cli_rejects_missing_workspace() {
        let cli = Cli {
            workspace: PathBuf::from("/nonexistent/path/for/stockade/tests"),
            main_file: "main.py".to_string(),
            python_image: "python:3.11".to_string(),
            docker_user: "65534:65534".to_string(),
            docker_cpus: "0.5".to_string(),
            docker_memory: "256m".to_string(),
            tmpfs_size: "32m".to_string(),
            output_limit: 65536,
            session_timeout: 60,
            idle_timeout: 15,
            default_command: None,
        };
        assert!(matches!(
            SessionConfig::from_cli(cli),
            Err(SandboxError::WorkspaceMissing(_))
        ));
    }

    #[test]
    fn from_cli_derives_default_command_from_main_file() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            workspace: dir.path().to_path_buf(),
            main_file: "main.py".to_string(),
            python_image: "python:3.11".to_string(),
            docker_user: "65534:65534".to_string(),
            docker_cpus: "0.5".to_string(),
            docker_memory: "256m".to_string(),
            tmpfs_size: "32m".to_string(),
            output_limit: 65536,
            session_timeout: 60,
            idle_timeout: 15,
            default_command: None,
        };
        let cfg = SessionConfig::from_cli(cli).unwrap();
        assert_eq!(cfg.default_command, "python -u main.py");
    }

    #[test]
    fn from_cli_honors_default_command_override() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            workspace: dir.path().to_path_buf(),
            main_file: "main.py".to_string(),
            python_image: "python:3.11".to_string(),
            docker_user: "65534:65534".to_string(),
            docker_cpus: "0.5".to_string(),
            docker_memory: "256m".to_string(),
            tmpfs_size: "32m".to_string(),
            output_limit: 65536,
            session_timeout: 60,
            idle_timeout: 15,
            default_command: Some("bash run.sh".to_string()),
        };
        let cfg = SessionConfig::from_cli(cli).unwrap();
        assert_eq!(cfg.default_command, "bash run.sh");
    }
}
