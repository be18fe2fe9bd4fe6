use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::SandboxError;
use crate::launcher::ContainerLauncher;
use crate::session::Supervisor;

/// Tracks every session the server has launched, keyed by id. One registry
/// per process; it outlives individual sessions and is the only place that
/// hands out `Supervisor` handles to the tool layer.
pub struct Registry {
    launcher: Arc<dyn ContainerLauncher>,
    config: Arc<SessionConfig>,
    sessions: RwLock<HashMap<String, Supervisor>>,
}

impl Registry {
    pub fn new(launcher: Arc<dyn ContainerLauncher>, config: Arc<SessionConfig>) -> Self {
        Self { launcher, config, sessions: RwLock::new(HashMap::new()) }
    }

    /// Launches a new session and registers it under a fresh random id.
    pub async fn create(&self, command: String) -> Result<Supervisor, SandboxError> {
        let id = Uuid::new_v4().to_string();
        let supervisor =
            Supervisor::launch(id.clone(), command, self.launcher.clone(), self.config.clone()).await?;
        self.sessions.write().await.insert(id, supervisor.clone());
        Ok(supervisor)
    }

    pub async fn get(&self, id: &str) -> Result<Supervisor, SandboxError> {
        self.sessions.read().await.get(id).cloned().ok_or(SandboxError::UnknownSession)
    }

    /// Stops every registered session concurrently, used on server shutdown.
    /// Best-effort: a panicking stop task doesn't stop the others from being
    /// attempted.
    pub async fn shutdown_all(&self) {
        let sessions = self.sessions.read().await;
        let mut tasks = JoinSet::new();
        for supervisor in sessions.values().cloned() {
            tasks.spawn(async move { supervisor.stop(true).await });
        }
        drop(sessions);

        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                tracing::warn!(error = %err, "session shutdown task panicked");
            }
        }
    }
}

#[cfg(all(test, feature = "test-launcher"))]
mod tests {
    use super::*;
    use crate::launcher::test_support::NativeLauncher;

    fn config() -> Arc<SessionConfig> {
        Arc::new(SessionConfig {
            workspace: std::env::temp_dir(),
            default_command: "true".to_string(),
            python_image: "unused".to_string(),
            docker_user: "65534:65534".to_string(),
            docker_cpus: "0.5".to_string(),
            docker_memory: "256m".to_string(),
            tmpfs_size: "32m".to_string(),
            output_limit: 65536,
            session_timeout: 60,
            idle_timeout: 15,
            runtime_endpoint: None,
            runtime_tls_dir: None,
            python_path: None,
        })
    }

    #[tokio::test]
    async fn create_then_get_returns_same_session() {
        let registry = Registry::new(Arc::new(NativeLauncher), config());
        let supervisor = registry.create("true".to_string()).await.unwrap();
        let fetched = registry.get(supervisor.id()).await.unwrap();
        assert_eq!(fetched.id(), supervisor.id());
    }

    #[tokio::test]
    async fn get_unknown_id_fails() {
        let registry = Registry::new(Arc::new(NativeLauncher), config());
        assert!(matches!(registry.get("missing").await, Err(SandboxError::UnknownSession)));
    }

    #[tokio::test]
    async fn shutdown_all_stops_every_session() {
        let registry = Registry::new(Arc::new(NativeLauncher), config());
        let a = registry.create("sleep 5".to_string()).await.unwrap();
        let b = registry.create("sleep 5".to_string()).await.unwrap();

        registry.shutdown_all().await;

        assert!(!a.read(0).await.alive);
        assert!(!b.read(0).await.alive);
    }
}
