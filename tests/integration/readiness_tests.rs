//! Probe and settle readiness against real child processes.
#![cfg(unix)]

use std::fs;
use std::net::TcpListener;

use notebook_fleet::config::{OccupiedPortPolicy, ReadinessMode};
use notebook_fleet::credentials::generate_token;
use notebook_fleet::orchestrator::launcher::SessionLauncher;
use notebook_fleet::process::{ProcessTable, SystemProcessTable};
use notebook_fleet::AppError;

use super::test_helpers::{free_port, reap, test_config};

#[tokio::test]
async fn probe_succeeds_once_port_accepts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let mut config = test_config(temp.path(), 1, port);
    config.readiness.mode = ReadinessMode::Probe;
    config.readiness.timeout_seconds = 5;
    config.readiness.poll_interval_ms = 50;
    let workspace = temp.path().join("ws");
    fs::create_dir_all(&workspace).expect("workspace");

    let launcher = SessionLauncher::from_config(&config);
    let mut session = launcher
        .launch("user1", &workspace, port, generate_token(16), "127.0.0.1")
        .await
        .expect("ready");

    assert_eq!(session.port, port);
    assert!(session.pid.is_some());
    assert!(session.child.try_wait().expect("poll").is_none());

    reap(&mut session.child).await;
    drop(listener);
}

#[tokio::test]
async fn probe_times_out_without_listener() {
    let temp = tempfile::tempdir().expect("tempdir");
    let port = free_port();

    let mut config = test_config(temp.path(), 1, port);
    config.readiness.mode = ReadinessMode::Probe;
    config.readiness.timeout_seconds = 1;
    config.readiness.poll_interval_ms = 50;
    let workspace = temp.path().join("ws");
    fs::create_dir_all(&workspace).expect("workspace");

    let err = SessionLauncher::from_config(&config)
        .launch("user1", &workspace, port, generate_token(16), "127.0.0.1")
        .await
        .expect_err("never ready");

    assert!(matches!(err, AppError::Launch(_)));
    assert!(err.to_string().contains("not accepting connections"), "got: {err}");
}

#[tokio::test]
async fn unready_session_is_killed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let port = free_port();

    let mut config = test_config(temp.path(), 1, port);
    config.readiness.mode = ReadinessMode::Probe;
    config.readiness.timeout_seconds = 1;
    config.readiness.poll_interval_ms = 50;
    let workspace = temp.path().join("ws");
    fs::create_dir_all(&workspace).expect("workspace");

    SessionLauncher::from_config(&config)
        .launch("user1", &workspace, port, generate_token(16), "127.0.0.1")
        .await
        .expect_err("never ready");

    let command_line = format!("sleep 30.{port}");
    let table = SystemProcessTable::new().expect("table");
    let survivors: Vec<String> = table
        .list()
        .expect("listing")
        .into_iter()
        .filter(|line| line.contains(&command_line))
        .collect();
    assert!(survivors.is_empty(), "still running: {survivors:?}");
}

#[tokio::test]
async fn child_that_exits_early_is_reported() {
    let temp = tempfile::tempdir().expect("tempdir");
    let port = free_port();

    let mut config = test_config(temp.path(), 1, port);
    config.executable.program = "sh".into();
    config.executable.args = vec!["-c".into(), "exit 3".into(), "session-{port}".into()];
    config.readiness.mode = ReadinessMode::Probe;
    config.readiness.timeout_seconds = 5;
    config.readiness.poll_interval_ms = 50;
    let workspace = temp.path().join("ws");
    fs::create_dir_all(&workspace).expect("workspace");

    let err = SessionLauncher::from_config(&config)
        .launch("user1", &workspace, port, generate_token(16), "127.0.0.1")
        .await
        .expect_err("exits");

    assert!(err.to_string().contains("exited early"), "got: {err}");
}

#[tokio::test]
async fn attempt_policy_launches_on_occupied_port() {
    let temp = tempfile::tempdir().expect("tempdir");
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let mut config = test_config(temp.path(), 1, port);
    config.occupied_ports = OccupiedPortPolicy::Attempt;
    let workspace = temp.path().join("ws");
    fs::create_dir_all(&workspace).expect("workspace");

    let mut session = SessionLauncher::from_config(&config)
        .launch("user1", &workspace, port, generate_token(16), "127.0.0.1")
        .await
        .expect("settle mode does not look at the port");

    reap(&mut session.child).await;
    drop(listener);
}

#[tokio::test]
async fn reject_policy_refuses_occupied_port_before_spawning() {
    let temp = tempfile::tempdir().expect("tempdir");
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let mut config = test_config(temp.path(), 1, port);
    config.occupied_ports = OccupiedPortPolicy::Reject;
    config.session_log_dir = Some(temp.path().join("logs"));
    let workspace = temp.path().join("ws");
    fs::create_dir_all(&workspace).expect("workspace");

    let err = SessionLauncher::from_config(&config)
        .launch("user1", &workspace, port, generate_token(16), "127.0.0.1")
        .await
        .expect_err("occupied");

    assert!(err.to_string().contains("already in use"), "got: {err}");
    // Nothing was spawned, so no log was opened.
    assert!(!temp.path().join("logs").join("user1.log").exists());
    drop(listener);
}
