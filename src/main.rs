use std::sync::Arc;

use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};

use stockade::config::{Cli, SessionConfig};
use stockade::launcher::{ensure_image, DockerLauncher};
use stockade::server::SandboxServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // Load .env file if present (silently ignored if missing)
    dotenvy::dotenv().ok();

    tracing::info!("stockade starting");

    let cli = Cli::parse();
    let config = match SessionConfig::from_cli(cli) {
        Ok(config) => Arc::new(config),
        Err(err) => {
            tracing::error!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    ensure_image("docker", &config.python_image).await;

    let launcher = Arc::new(DockerLauncher::new());
    let server = SandboxServer::new(launcher, config);

    let service = server
        .clone()
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;

    service.waiting().await?;

    server.shutdown().await;

    tracing::info!("stockade shutting down");
    Ok(())
}
