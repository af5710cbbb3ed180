#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::daemon::DaemonSettings;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const CONFIG_RELATIVE_PATH: &str = ".swarm/config.toml";
pub const DEFAULT_TTL_MINUTES: u32 = 60;
pub const DEFAULT_DAEMON_START_CMD: &str = "tldr daemon start --project {project}";

#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub state_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub default_ttl_minutes: u32,
    pub daemon: DaemonSettings,
}

impl Config {
    /// Resolves configuration from the process environment and the project's
    /// `.swarm/config.toml`. Never fails: unreadable or malformed sources fall
    /// back to defaults.
    #[must_use]
    pub fn load() -> Self {
        let project_dir = non_empty_env_var("SWARM_PROJECT_DIR")
            .or_else(|| non_empty_env_var("CLAUDE_PROJECT_DIR"))
            .map_or_else(
                || std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
                PathBuf::from,
            );
        Self::load_from(project_dir)
    }

    /// Same as [`Config::load`] with an explicit project directory.
    #[must_use]
    pub fn load_from(project_dir: PathBuf) -> Self {
        let config_path = project_dir.join(CONFIG_RELATIVE_PATH);
        let content = match std::fs::read_to_string(&config_path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "unreadable config file, using defaults");
                None
            }
        };
        Self::from_sources(project_dir, content.as_deref(), &non_empty_env_var)
    }

    /// Environment wins over the config file, which wins over defaults.
    pub fn from_sources(
        project_dir: PathBuf,
        file_content: Option<&str>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Self {
        let file = file_content.map(parse_config_content).unwrap_or_default();
        let swarm_dir = project_dir.join(".swarm");

        let state_dir = env("SWARM_STATE_DIR")
            .or(file.state_dir)
            .map_or_else(|| swarm_dir.join("patterns"), PathBuf::from);
        let ledger_path = env("SWARM_LEDGER_PATH")
            .or(file.ledger_path)
            .map_or_else(|| swarm_dir.join("swarm.db"), PathBuf::from);
        let runtime_dir = env("SWARM_DAEMON_RUNTIME_DIR")
            .or(file.daemon_runtime_dir)
            .map_or_else(std::env::temp_dir, PathBuf::from);

        let defaults = DaemonSettings::new(runtime_dir);
        let daemon = DaemonSettings {
            start_command: file.daemon_start_cmd.map_or(defaults.start_command.clone(), |cmd| {
                split_command(&cmd)
            }),
            probe_timeout: file.daemon_probe_timeout_ms.map_or(defaults.probe_timeout, Duration::from_millis),
            query_timeout: file.daemon_query_timeout_ms.map_or(defaults.query_timeout, Duration::from_millis),
            start_wait: file.daemon_start_wait_ms.map_or(defaults.start_wait, Duration::from_millis),
            lock_stale_after: file.daemon_lock_stale_ms.map_or(defaults.lock_stale_after, Duration::from_millis),
            ..defaults
        };

        debug!(
            project = %project_dir.display(),
            state_dir = %state_dir.display(),
            ledger = %ledger_path.display(),
            "resolved configuration"
        );

        Self {
            project_dir,
            state_dir,
            ledger_path,
            default_ttl_minutes: file.default_ttl_minutes.unwrap_or(DEFAULT_TTL_MINUTES),
            daemon,
        }
    }

    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub state_dir: Option<String>,
    pub ledger_path: Option<String>,
    pub default_ttl_minutes: Option<u32>,
    pub daemon_runtime_dir: Option<String>,
    pub daemon_start_cmd: Option<String>,
    pub daemon_probe_timeout_ms: Option<u64>,
    pub daemon_query_timeout_ms: Option<u64>,
    pub daemon_start_wait_ms: Option<u64>,
    pub daemon_lock_stale_ms: Option<u64>,
}

#[must_use]
pub fn parse_config_content(content: &str) -> FileConfig {
    let mut config = FileConfig::default();

    for line in content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
    {
        let Some((key, raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = expand_env_vars(raw.trim().trim_matches('"'));
        match key {
            "state_dir" => config.state_dir = Some(value),
            "ledger_path" => config.ledger_path = Some(value),
            "daemon_runtime_dir" => config.daemon_runtime_dir = Some(value),
            "daemon_start_cmd" => config.daemon_start_cmd = Some(value),
            "default_ttl_minutes" => config.default_ttl_minutes = parse_number(key, &value),
            "daemon_probe_timeout_ms" => config.daemon_probe_timeout_ms = parse_number(key, &value),
            "daemon_query_timeout_ms" => config.daemon_query_timeout_ms = parse_number(key, &value),
            "daemon_start_wait_ms" => config.daemon_start_wait_ms = parse_number(key, &value),
            "daemon_lock_stale_ms" => config.daemon_lock_stale_ms = parse_number(key, &value),
            other => debug!("ignoring unknown config key {other}"),
        }
    }

    config
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    value.parse().map_or_else(
        |_| {
            warn!("config key {key} expects a number, got {value:?}");
            None
        },
        Some,
    )
}

fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_part = &result[start + 2..start + end];
            let (var_name, default) = var_part.split_once(":-").unwrap_or((var_part, ""));
            let value = std::env::var(var_name).unwrap_or_else(|_| default.to_string());
            result.replace_range(start..=(start + end), &value);
        } else {
            break;
        }
    }
    result
}

#[must_use]
pub fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

fn non_empty_env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
