//! Daemon client against an in-process line-delimited JSON responder on a
//! Unix socket.

#![cfg(unix)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use swarm::daemon::{
    DaemonAddress, DaemonClient, DaemonSettings, QueryOutcome, StartLock, INDEXING_MARKER,
};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

struct Fixture {
    _runtime: TempDir,
    project: TempDir,
    client: DaemonClient,
}

fn fixture() -> Fixture {
    fixture_starting_with(&["false"])
}

fn fixture_starting_with(start_command: &[&str]) -> Fixture {
    fixture_with(start_command, Duration::from_millis(300))
}

fn fixture_with(start_command: &[&str], start_wait: Duration) -> Fixture {
    let runtime = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    let mut settings = DaemonSettings::new(runtime.path().to_path_buf());
    settings.start_command = start_command.iter().map(ToString::to_string).collect();
    settings.start_wait = start_wait;
    settings.poll_interval = Duration::from_millis(50);
    settings.probe_timeout = Duration::from_millis(200);
    let client = DaemonClient::new(project.path(), settings);
    Fixture {
        _runtime: runtime,
        project,
        client,
    }
}

fn socket_path(client: &DaemonClient) -> &Path {
    match &client.endpoint().address {
        DaemonAddress::Unix { path } => path,
        DaemonAddress::Tcp { .. } => panic!("expected a unix endpoint"),
    }
}

/// Answers `ping` with ok, `fail` with an error document, and echoes anything else.
fn serve(path: &Path) -> tokio::task::JoinHandle<()> {
    let listener = UnixListener::bind(path).unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let (reader, mut writer) = stream.into_split();
                let mut line = String::new();
                if BufReader::new(reader).read_line(&mut line).await.is_err() {
                    return;
                }
                let request: Value = serde_json::from_str(line.trim()).unwrap_or(Value::Null);
                let response = match request["cmd"].as_str() {
                    Some("ping") => json!({"status": "ok"}),
                    Some("fail") => json!({"status": "error", "message": "unknown command"}),
                    _ => json!({"status": "ok", "echo": request}),
                };
                let _ = writer.write_all(format!("{response}\n").as_bytes()).await;
            });
        }
    })
}

#[tokio::test]
async fn endpoint_names_share_the_project_hash() {
    let f = fixture();
    let endpoint = f.client.endpoint();
    assert_eq!(endpoint.hash.len(), 8);
    let socket = socket_path(&f.client).file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(socket, format!("tldr-{}.sock", endpoint.hash));
    assert!(endpoint.lock_path.ends_with(format!("tldr-{}.lock", endpoint.hash)));
}

#[tokio::test]
async fn running_daemon_answers_ping_and_queries() {
    let f = fixture();
    let server = serve(socket_path(&f.client));

    assert!(f.client.probe().await);
    let outcome = f.client.query("search", json!({"pattern": "fn main"})).await;
    match outcome {
        QueryOutcome::Ok { response } => {
            assert_eq!(response["echo"]["cmd"], "search");
            assert_eq!(response["echo"]["pattern"], "fn main");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    server.abort();
}

#[tokio::test]
async fn daemon_error_document_is_reported_as_error() {
    let f = fixture();
    let server = serve(socket_path(&f.client));

    let outcome = f.client.query("fail", Value::Null).await;
    assert_eq!(
        outcome,
        QueryOutcome::Error {
            message: "unknown command".to_string()
        }
    );
    server.abort();
}

#[tokio::test]
async fn indexing_marker_short_circuits_before_connecting() {
    let f = fixture();
    let marker = f.project.path().join(INDEXING_MARKER);
    std::fs::create_dir_all(marker.parent().unwrap()).unwrap();
    std::fs::write(&marker, "indexing 40%").unwrap();

    assert!(f.client.is_indexing());
    let outcome = f.client.query("search", Value::Null).await;
    assert!(matches!(outcome, QueryOutcome::Indexing { .. }));
}

#[tokio::test]
async fn refused_socket_file_is_removed_on_reachability_check() {
    let f = fixture();
    let path = socket_path(&f.client).to_path_buf();
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
    assert!(path.exists());

    assert!(!f.client.probe().await);
    assert!(!path.exists());
}

#[tokio::test]
async fn daemon_that_never_comes_up_reads_as_unavailable() {
    let f = fixture();
    let outcome = f.client.query("search", Value::Null).await;
    match outcome {
        QueryOutcome::Unavailable { reason } => assert!(reason.contains("start it with `false`")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!f.client.endpoint().lock_path.exists());

    let status = f.client.status().await;
    assert!(!status.reachable);
    assert!(!status.indexing);
}

#[tokio::test]
async fn start_in_progress_elsewhere_is_waited_for_not_duplicated() {
    let marker = TempDir::new().unwrap();
    let spawned = marker.path().join("spawned");
    let spawned_arg = spawned.to_string_lossy().to_string();
    let f = fixture_starting_with(&["touch", &spawned_arg]);
    let lock_path = f.client.endpoint().lock_path.clone();
    let _other_starter = StartLock::acquire(&lock_path, Duration::from_secs(10))
        .unwrap()
        .unwrap();

    assert!(!f.client.ensure_running().await);
    assert!(!spawned.exists());
    assert!(lock_path.exists());
}

#[tokio::test]
async fn socket_of_a_daemon_still_starting_is_kept() {
    let f = fixture();
    let socket = socket_path(&f.client).to_path_buf();
    drop(std::os::unix::net::UnixListener::bind(&socket).unwrap());
    let _other_starter = StartLock::acquire(&f.client.endpoint().lock_path, Duration::from_secs(10))
        .unwrap()
        .unwrap();

    assert!(!f.client.probe().await);
    assert!(!f.client.ensure_running().await);
    assert!(socket.exists());
}

#[tokio::test]
async fn successful_start_writes_pid_and_releases_lock() {
    let marker = TempDir::new().unwrap();
    let spawned = marker.path().join("spawned");
    let spawned_arg = spawned.to_string_lossy().to_string();
    let f = fixture_with(&["touch", &spawned_arg], Duration::from_secs(3));
    let socket = socket_path(&f.client).to_path_buf();

    // Stands in for the daemon: listens once the start command has run.
    let responder = tokio::spawn(async move {
        while !spawned.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        serve(&socket)
    });

    assert!(f.client.ensure_running().await);
    let endpoint = f.client.endpoint();
    let pid = std::fs::read_to_string(&endpoint.pid_path).unwrap();
    assert!(pid.trim().parse::<u32>().is_ok());
    assert!(!endpoint.lock_path.exists());

    responder.await.unwrap().abort();
}
