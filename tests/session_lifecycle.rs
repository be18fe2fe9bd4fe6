#![cfg(feature = "test-launcher")]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use stockade::config::SessionConfig;
use stockade::error::SandboxError;
use stockade::event::Event;
use stockade::launcher::test_support::NativeLauncher;
use stockade::registry::Registry;

fn test_config(workspace: PathBuf, output_limit: u64, session_timeout: u64, idle_timeout: u64) -> Arc<SessionConfig> {
    Arc::new(SessionConfig {
        workspace,
        default_command: "true".to_string(),
        python_image: "unused".to_string(),
        docker_user: "65534:65534".to_string(),
        docker_cpus: "0.5".to_string(),
        docker_memory: "256m".to_string(),
        tmpfs_size: "32m".to_string(),
        output_limit,
        session_timeout,
        idle_timeout,
        runtime_endpoint: None,
        runtime_tls_dir: None,
        python_path: None,
    })
}

fn registry(cfg: Arc<SessionConfig>) -> Registry {
    Registry::new(Arc::new(NativeLauncher), cfg)
}

#[tokio::test]
async fn echo_name_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path().to_path_buf(), 65536, 60, 15);
    let reg = registry(cfg);

    let supervisor = reg
        .create("printf 'Name? '; read -r name; printf 'hello %s\\n' \"$name\"".to_string())
        .await
        .unwrap();

    let first = supervisor.read(500).await;
    let prompt: String = first
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Stdout { data } => Some(data.as_str()),
            _ => None,
        })
        .collect();
    assert!(prompt.contains("Name?"), "expected prompt in {prompt:?}");

    let send = supervisor.send("Alice").await;
    assert!(send.ok);

    let second = supervisor.read(500).await;
    let out: String = second
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Stdout { data } => Some(data.as_str()),
            _ => None,
        })
        .collect();
    assert!(out.contains("hello Alice"), "expected greeting in {out:?}");

    let exited = matches!(
        second.events.iter().chain(first.events.iter()).find(|e| matches!(e, Event::Exit { .. })),
        Some(Event::Exit { code: Some(0) })
    );
    if !exited {
        let more = supervisor.read(500).await;
        assert!(matches!(
            more.events.iter().find(|e| matches!(e, Event::Exit { .. })),
            Some(Event::Exit { code: Some(0) })
        ));
    }
}

#[tokio::test]
async fn idle_timeout_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path().to_path_buf(), 65536, 0, 1);
    let reg = registry(cfg);

    let supervisor = reg.create("read x".to_string()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1300)).await;
    let result = supervisor.read(0).await;
    assert!(
        result.events.iter().any(|e| matches!(e, Event::IdleTimeout { seconds } if *seconds == 1.0)),
        "expected idle_timeout event, got {:?}",
        result.events
    );
    assert!(!result.alive);

    let follow_up = supervisor.read(0).await;
    assert!(follow_up.events.iter().all(|e| !matches!(e, Event::Timeout { .. } | Event::Limit { .. })));
}

#[tokio::test]
async fn wall_clock_timeout_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path().to_path_buf(), 65536, 2, 0);
    let reg = registry(cfg);

    let supervisor = reg.create("while true; do sleep 1; done".to_string()).await.unwrap();

    let deadline = Instant::now() + Duration::from_millis(2300);
    loop {
        let result = supervisor.read(200).await;
        if result.events.iter().any(|e| matches!(e, Event::Timeout { seconds } if *seconds == 2.0)) {
            return;
        }
        if Instant::now() > deadline {
            panic!("timeout event did not arrive in time");
        }
    }
}

#[tokio::test]
async fn output_flood_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path().to_path_buf(), 65536, 60, 0);
    let reg = registry(cfg);

    let supervisor = reg
        .create("head -c 1048576 /dev/zero | tr '\\0' 'a'".to_string())
        .await
        .unwrap();

    let mut total_stdout = 0u64;
    let mut saw_limit = false;
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let result = supervisor.read(200).await;
        for event in &result.events {
            match event {
                Event::Stdout { data } => total_stdout += data.len() as u64,
                Event::Limit { limit } => {
                    assert_eq!(*limit, 65536);
                    saw_limit = true;
                }
                _ => {}
            }
        }
        if saw_limit || Instant::now() > deadline {
            break;
        }
    }

    assert!(saw_limit, "expected a limit event");
    assert!(total_stdout >= 65536 && total_stdout <= 65536 + 1024, "got {total_stdout} bytes");
}

#[tokio::test]
async fn unknown_session_returns_structured_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path().to_path_buf(), 65536, 60, 15);
    let reg = registry(cfg);

    let err = reg.get("nope").await.unwrap_err();
    assert!(matches!(err, SandboxError::UnknownSession));
    assert_eq!(err.user_message(), "unknown session");
}

#[tokio::test]
async fn stop_is_idempotent_and_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path().to_path_buf(), 65536, 60, 0);
    let reg = registry(cfg);

    let supervisor = reg.create("sleep 10".to_string()).await.unwrap();

    let start = Instant::now();
    let first = supervisor.stop(false).await;
    assert!(first.ok);
    assert!(start.elapsed() < Duration::from_secs(4));

    let start = Instant::now();
    let second = supervisor.stop(false).await;
    assert!(second.ok);
    assert!(start.elapsed() < Duration::from_millis(200));

    let result = supervisor.read(0).await;
    assert!(!result.alive);
}
