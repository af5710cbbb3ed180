#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::SwarmError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON document printed by every non-hook command.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProtocolEnvelope {
    pub ok: bool,
    pub cmd: String,
    pub t: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Box<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<Box<ProtocolError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProtocolError {
    pub code: String,
    pub msg: String,
}

impl ProtocolEnvelope {
    #[must_use]
    pub fn success(cmd: &str, data: Value) -> Self {
        Self {
            ok: true,
            cmd: cmd.to_string(),
            t: Utc::now().timestamp_millis(),
            ms: None,
            d: Some(Box::new(data)),
            err: None,
            fix: None,
            next: None,
        }
    }

    #[must_use]
    pub fn failure(cmd: &str, error: &SwarmError) -> Self {
        Self {
            ok: false,
            cmd: cmd.to_string(),
            t: Utc::now().timestamp_millis(),
            ms: None,
            d: None,
            err: Some(Box::new(ProtocolError {
                code: error.code().to_string(),
                msg: error.to_string(),
            })),
            fix: fix_hint(error),
            next: None,
        }
    }

    #[must_use]
    pub const fn with_ms(mut self, ms: u64) -> Self {
        self.ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}

fn fix_hint(error: &SwarmError) -> Option<String> {
    match error {
        SwarmError::PatternExists(key) => Some(format!(
            "wait for {key} to finish, or delete it with `pattern reset`"
        )),
        SwarmError::PatternNotFound(_) => Some("list instances with `pattern list`".to_string()),
        SwarmError::InvalidIdentifier(_) => {
            Some("identifiers must match [A-Za-z0-9_-]{1,64}".to_string())
        }
        SwarmError::DatabaseError(_) | SwarmError::SqlxError(_) => {
            Some("check SWARM_LEDGER_PATH or ledger_path in .swarm/config.toml".to_string())
        }
        _ => None,
    }
}
