//! Supervisor behaviour against real child processes.
//!
//! Pids are persisted in the properties file so a crashed run can be cleaned
//! up by the next one; respawning a role replaces whatever was recorded.

mod common;

use common::write_script;
use std::sync::Arc;
use std::time::Duration;
use swap_orchestrator::process::{
    Capture, PidStore, ProcessRole, ProcessState, PropertiesPidStore, SpawnRequest,
};
use swap_orchestrator::Supervisor;
use tokio::io::AsyncBufReadExt;

fn sleeper(dir: &tempfile::TempDir) -> std::path::PathBuf {
    write_script(&dir.path().join("sleeper"), "exec sleep 60")
}

#[tokio::test]
async fn test_spawn_records_pid_in_properties_file() {
    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("pids.properties");
    let supervisor = Supervisor::new(Arc::new(PropertiesPidStore::new(&table)));

    let process = supervisor
        .spawn(SpawnRequest::new(ProcessRole::PriceFeed, sleeper(&dir)))
        .unwrap();
    assert_eq!(process.state(), ProcessState::Running);

    let contents = std::fs::read_to_string(&table).unwrap();
    assert!(
        contents.contains(&format!("price_ticker_pid={}", process.pid())),
        "pid table was: {}",
        contents
    );

    // A second store over the same file sees the entry, as the next run would.
    let reopened = PropertiesPidStore::new(&table);
    assert_eq!(
        reopened.load(ProcessRole::PriceFeed).unwrap(),
        Some(process.pid())
    );

    assert!(supervisor.shutdown(&process).await);
    supervisor.release(&process);
    assert_eq!(reopened.load(ProcessRole::PriceFeed).unwrap(), None);
}

#[tokio::test]
async fn test_respawn_kills_previous_process_of_same_role() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(Arc::new(PropertiesPidStore::new(
        dir.path().join("pids.properties"),
    )));
    let binary = sleeper(&dir);

    let first = supervisor
        .spawn(SpawnRequest::new(ProcessRole::MakerEngine, &binary))
        .unwrap();
    let other_role = supervisor
        .spawn(SpawnRequest::new(ProcessRole::PriceFeed, &binary))
        .unwrap();
    let second = supervisor
        .spawn(SpawnRequest::new(ProcessRole::MakerEngine, &binary))
        .unwrap();

    assert_ne!(first.pid(), second.pid());
    assert!(
        wait_for_exit(&first).await,
        "first engine should have been killed"
    );
    assert!(!other_role.has_exited().await, "other roles are untouched");
    assert_eq!(
        supervisor
            .pid_store()
            .load(ProcessRole::MakerEngine)
            .unwrap(),
        Some(second.pid())
    );

    // Releasing the stale handle must not clear the live entry.
    supervisor.release(&first);
    assert_eq!(
        supervisor
            .pid_store()
            .load(ProcessRole::MakerEngine)
            .unwrap(),
        Some(second.pid())
    );

    supervisor.shutdown(&second).await;
    supervisor.shutdown(&other_role).await;
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(Arc::new(PropertiesPidStore::new(
        dir.path().join("pids.properties"),
    )));
    let process = supervisor
        .spawn(SpawnRequest::new(ProcessRole::BuyerWalletRpc, sleeper(&dir)))
        .unwrap();

    assert!(supervisor.shutdown(&process).await);
    assert_eq!(process.state(), ProcessState::Stopped);
    assert!(!Supervisor::is_alive(process.pid()));
    assert!(!supervisor.shutdown(&process).await);
}

#[tokio::test]
async fn test_kill_all_recorded_cleans_up_after_a_crashed_run() {
    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("pids.properties");
    let binary = sleeper(&dir);

    // A run that records two processes and then disappears without cleanup.
    let crashed = Supervisor::new(Arc::new(PropertiesPidStore::new(&table)));
    let engine = crashed
        .spawn(SpawnRequest::new(ProcessRole::MakerEngine, &binary))
        .unwrap();
    let wallet = crashed
        .spawn(SpawnRequest::new(ProcessRole::MakerWalletRpc, &binary))
        .unwrap();

    let next_run = Supervisor::new(Arc::new(PropertiesPidStore::new(&table)));
    let mut killed = next_run.kill_all_recorded();
    killed.sort_by_key(|(_, pid)| *pid);
    let mut expected = vec![
        (ProcessRole::MakerEngine, engine.pid()),
        (ProcessRole::MakerWalletRpc, wallet.pid()),
    ];
    expected.sort_by_key(|(_, pid)| *pid);
    assert_eq!(killed, expected);

    assert!(wait_for_exit(&engine).await);
    assert!(wait_for_exit(&wallet).await);
    for role in ProcessRole::ALL {
        assert_eq!(next_run.pid_store().load(role).unwrap(), None);
    }

    // Nothing left to kill.
    assert!(next_run.kill_all_recorded().is_empty());
}

#[tokio::test]
async fn test_stale_recorded_pid_is_cleared_on_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("pids.properties");
    // A pid far above any real pid_max
    std::fs::write(&table, "asb_pid=99999999\nsome_other_key=kept\n").unwrap();

    let supervisor = Supervisor::new(Arc::new(PropertiesPidStore::new(&table)));
    let process = supervisor
        .spawn(SpawnRequest::new(ProcessRole::MakerEngine, sleeper(&dir)))
        .unwrap();

    let contents = std::fs::read_to_string(&table).unwrap();
    assert!(contents.contains(&format!("asb_pid={}", process.pid())));
    assert!(contents.contains("some_other_key=kept"));

    supervisor.shutdown(&process).await;
}

#[tokio::test]
async fn test_captured_stderr_is_readable() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(Arc::new(PropertiesPidStore::new(
        dir.path().join("pids.properties"),
    )));
    let binary = write_script(
        &dir.path().join("chatty"),
        "echo to-stdout\necho to-stderr >&2\nexec sleep 60",
    );

    let process = supervisor
        .spawn(SpawnRequest::new(ProcessRole::MakerEngine, binary).capture(Capture::Stderr))
        .unwrap();
    let stderr = process.take_stderr().expect("stderr captured");
    assert!(process.take_stderr().is_none());
    assert!(process.take_stdout().is_none());

    let mut lines = tokio::io::BufReader::new(stderr).lines();
    let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line.as_deref(), Some("to-stderr"));

    supervisor.shutdown(&process).await;
}

#[tokio::test]
async fn test_missing_binary_is_a_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(Arc::new(PropertiesPidStore::new(
        dir.path().join("pids.properties"),
    )));

    let err = supervisor
        .spawn(SpawnRequest::new(
            ProcessRole::PriceFeed,
            dir.path().join("does-not-exist"),
        ))
        .unwrap_err();
    assert!(matches!(err, swap_orchestrator::Error::Spawn { .. }));
    assert_eq!(
        supervisor.pid_store().load(ProcessRole::PriceFeed).unwrap(),
        None
    );
}

async fn wait_for_exit(process: &swap_orchestrator::process::ManagedProcess) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        if process.has_exited().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

