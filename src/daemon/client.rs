use super::endpoint::{DaemonAddress, DaemonEndpoint};
use super::lock::StartLock;
use crate::{Result, SwarmError};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Project-relative marker the daemon writes while it builds its index.
pub const INDEXING_MARKER: &str = ".tldr/status";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub runtime_dir: PathBuf,
    /// Program and arguments; `{project}` is replaced by the project path.
    pub start_command: Vec<String>,
    pub probe_timeout: Duration,
    pub query_timeout: Duration,
    pub start_wait: Duration,
    pub lock_stale_after: Duration,
    pub poll_interval: Duration,
}

impl DaemonSettings {
    #[must_use]
    pub fn new(runtime_dir: PathBuf) -> Self {
        Self {
            runtime_dir,
            start_command: crate::config::split_command(crate::config::DEFAULT_DAEMON_START_CMD),
            probe_timeout: Duration::from_millis(500),
            query_timeout: Duration::from_millis(3_000),
            start_wait: Duration::from_millis(5_000),
            lock_stale_after: Duration::from_millis(10_000),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Structured result of a daemon query. Callers render every variant; none
/// is an error to propagate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryOutcome {
    Ok { response: Value },
    Indexing { message: String },
    Unavailable { reason: String },
    Error { message: String },
}

impl QueryOutcome {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonStatusReport {
    pub endpoint: String,
    pub reachable: bool,
    pub pid: Option<u32>,
    pub indexing: bool,
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    project_dir: PathBuf,
    endpoint: DaemonEndpoint,
    settings: DaemonSettings,
}

impl DaemonClient {
    #[must_use]
    pub fn new(project_dir: &Path, settings: DaemonSettings) -> Self {
        let endpoint = DaemonEndpoint::resolve(project_dir, &settings.runtime_dir);
        Self::with_endpoint(project_dir, endpoint, settings)
    }

    #[must_use]
    pub fn with_endpoint(project_dir: &Path, endpoint: DaemonEndpoint, settings: DaemonSettings) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            endpoint,
            settings,
        }
    }

    #[must_use]
    pub const fn endpoint(&self) -> &DaemonEndpoint {
        &self.endpoint
    }

    #[must_use]
    pub const fn settings(&self) -> &DaemonSettings {
        &self.settings
    }

    /// True while `<project>/.tldr/status` says the index is being built.
    #[must_use]
    pub fn is_indexing(&self) -> bool {
        std::fs::read_to_string(self.project_dir.join(INDEXING_MARKER))
            .is_ok_and(|status| status.contains("indexing"))
    }

    /// Connect-and-ping within the probe timeout. A Unix socket file that
    /// refuses connections is removed.
    pub async fn probe(&self) -> bool {
        self.ping(true).await
    }

    /// While a start is in flight the socket may exist before the daemon
    /// listens on it, so waiting never removes it.
    async fn ping(&self, clear_stale: bool) -> bool {
        match timeout(self.settings.probe_timeout, self.round_trip(&json!({"cmd": "ping"}))).await {
            Ok(Ok(response)) => response.get("status").is_some(),
            Ok(Err(SwarmError::IoError(e))) => {
                if clear_stale {
                    self.clear_stale_socket(&e);
                }
                false
            }
            Ok(Err(e)) => {
                debug!(error = %e, "daemon ping failed");
                false
            }
            Err(_) => false,
        }
    }

    fn clear_stale_socket(&self, error: &std::io::Error) {
        let DaemonAddress::Unix { path } = &self.endpoint.address else {
            return;
        };
        if error.kind() != ErrorKind::ConnectionRefused || !path.exists() {
            return;
        }
        if StartLock::is_held(&self.endpoint.lock_path, self.settings.lock_stale_after) {
            debug!(socket = %path.display(), "daemon start in progress, keeping socket");
            return;
        }
        match std::fs::remove_file(path) {
            Ok(()) => info!(socket = %path.display(), "removed stale daemon socket"),
            Err(e) => warn!(socket = %path.display(), error = %e, "failed to remove stale daemon socket"),
        }
    }

    /// Makes the daemon reachable, starting it when no other process is.
    /// Waits at most `start_wait` and never errors.
    pub async fn ensure_running(&self) -> bool {
        if self.probe().await {
            return true;
        }

        let lock = match StartLock::acquire(&self.endpoint.lock_path, self.settings.lock_stale_after) {
            Ok(lock) => lock,
            Err(e) => {
                warn!(lock = %self.endpoint.lock_path.display(), error = %e, "daemon start lock unavailable");
                None
            }
        };

        if let Some(_guard) = lock {
            if let Err(e) = self.spawn_daemon().await {
                warn!(error = %e, "failed to start daemon");
                return false;
            }
            return self.wait_until_reachable().await;
        }
        self.wait_until_reachable().await
    }

    async fn spawn_daemon(&self) -> Result<()> {
        let project = self.project_dir.to_string_lossy();
        let mut args = self
            .settings
            .start_command
            .iter()
            .map(|arg| arg.replace("{project}", &project));
        let program = args
            .next()
            .ok_or_else(|| SwarmError::ConfigError("empty daemon start command".to_string()))?;

        let child = tokio::process::Command::new(&program)
            .args(args)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SwarmError::DaemonError(format!("spawn {program}: {e}")))?;

        if let Some(pid) = child.id() {
            tokio::fs::write(&self.endpoint.pid_path, format!("{pid}\n")).await?;
            info!(pid, program = %program, "daemon started");
        }
        Ok(())
    }

    async fn wait_until_reachable(&self) -> bool {
        let deadline = Instant::now() + self.settings.start_wait;
        loop {
            if self.ping(false).await {
                return true;
            }
            if Instant::now() >= deadline {
                debug!(wait_ms = self.settings.start_wait.as_millis(), "daemon did not become reachable");
                return false;
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    /// One request/response exchange. `params` object keys are merged into
    /// the request next to `cmd`.
    pub async fn query(&self, cmd: &str, params: Value) -> QueryOutcome {
        if self.is_indexing() {
            return QueryOutcome::Indexing {
                message: "index is still being built, retry shortly".to_string(),
            };
        }
        if !self.ensure_running().await {
            return QueryOutcome::Unavailable {
                reason: format!(
                    "daemon not running, start it with `{}`",
                    self.settings.start_command.join(" ")
                ),
            };
        }

        let request = build_request(cmd, params);
        match timeout(self.settings.query_timeout, self.round_trip(&request)).await {
            Ok(Ok(response)) => classify_response(response),
            Ok(Err(SwarmError::IoError(e))) => QueryOutcome::Unavailable {
                reason: format!("daemon connection failed: {e}"),
            },
            Ok(Err(e)) => QueryOutcome::Error {
                message: e.to_string(),
            },
            Err(_) => QueryOutcome::Unavailable {
                reason: format!(
                    "query timed out after {}ms",
                    self.settings.query_timeout.as_millis()
                ),
            },
        }
    }

    pub async fn status(&self) -> DaemonStatusReport {
        let pid = tokio::fs::read_to_string(&self.endpoint.pid_path)
            .await
            .ok()
            .and_then(|content| content.trim().parse().ok());
        DaemonStatusReport {
            endpoint: self.endpoint.address.to_string(),
            reachable: self.probe().await,
            pid,
            indexing: self.is_indexing(),
        }
    }

    async fn round_trip(&self, request: &Value) -> Result<Value> {
        let line = serde_json::to_string(request)?;
        match &self.endpoint.address {
            DaemonAddress::Unix { path } => exchange_unix(path, &line).await,
            DaemonAddress::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                exchange(stream, &line).await
            }
        }
    }
}

#[cfg(unix)]
async fn exchange_unix(path: &Path, line: &str) -> Result<Value> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    exchange(stream, line).await
}

#[cfg(not(unix))]
async fn exchange_unix(path: &Path, _line: &str) -> Result<Value> {
    Err(SwarmError::DaemonError(format!(
        "unix sockets are not supported here: {}",
        path.display()
    )))
}

/// Writes one JSON line and reads one JSON line back.
async fn exchange<S>(stream: S, line: &str) -> Result<Value>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    let mut reader = BufReader::new(reader);
    let mut response = String::new();
    reader.read_line(&mut response).await?;
    let response = response.trim();
    if response.is_empty() {
        return Err(SwarmError::DaemonError("empty response from daemon".to_string()));
    }
    Ok(serde_json::from_str(response)?)
}

fn build_request(cmd: &str, params: Value) -> Value {
    let mut request = match params {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("params".to_string(), other);
            map
        }
    };
    request.insert("cmd".to_string(), Value::String(cmd.to_string()));
    Value::Object(request)
}

fn classify_response(response: Value) -> QueryOutcome {
    if response.get("indexing").and_then(Value::as_bool) == Some(true) {
        return QueryOutcome::Indexing {
            message: "daemon is indexing".to_string(),
        };
    }
    match response.get("status").and_then(Value::as_str) {
        Some("error") => QueryOutcome::Error {
            message: response
                .get("message")
                .or_else(|| response.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("daemon reported an error")
                .to_string(),
        },
        Some("unavailable") => QueryOutcome::Unavailable {
            reason: response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("daemon reported unavailable")
                .to_string(),
        },
        _ => QueryOutcome::Ok { response },
    }
}
