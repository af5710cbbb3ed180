#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Append-only broadcast table shared by the agents of a swarm.
//!
//! Completion is derived from distinct senders and never stored, so repeated
//! `done` broadcasts change nothing.

use crate::hook_protocol::{DispatchOutcome, IgnoreReason};
use crate::types::{AgentName, SwarmId};
use crate::{Result, SwarmError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub const DONE: &str = "done";
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS broadcasts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        swarm_id TEXT NOT NULL,
        sender_agent TEXT NOT NULL,
        broadcast_type TEXT NOT NULL,
        payload TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_broadcasts_swarm ON broadcasts (swarm_id, broadcast_type)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwarmCompletion {
    pub done: i64,
    pub total: i64,
}

impl SwarmCompletion {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.total > 0 && self.done >= self.total
    }

    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_complete() {
            format!("all {} agents done", self.total)
        } else {
            format!("{}/{} agents done", self.done, self.total)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwarmBroadcast {
    pub id: i64,
    pub swarm_id: String,
    pub sender_agent: String,
    pub broadcast_type: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

type BroadcastRow = (i64, String, String, String, String, DateTime<Utc>);

impl From<BroadcastRow> for SwarmBroadcast {
    fn from(row: BroadcastRow) -> Self {
        let (id, swarm_id, sender_agent, broadcast_type, payload, created_at) = row;
        Self {
            id,
            swarm_id,
            sender_agent,
            broadcast_type,
            payload,
            created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwarmLedger {
    pool: SqlitePool,
}

impl SwarmLedger {
    /// Opens (creating if needed) the ledger database at `path` in WAL mode
    /// with a busy timeout so concurrent writers wait instead of failing.
    ///
    /// # Errors
    /// Returns an error when the directory cannot be created or the database
    /// cannot be opened or migrated.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| SwarmError::DatabaseError(format!("open {}: {e}", path.display())))?;

        let ledger = Self { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Appends one broadcast. Duplicates are kept; completion counts distinct senders.
    ///
    /// # Errors
    /// Returns an error when the insert fails.
    pub async fn broadcast(
        &self,
        swarm_id: &SwarmId,
        sender: &AgentName,
        broadcast_type: &str,
        payload: &str,
    ) -> Result<i64> {
        if broadcast_type.trim().is_empty() {
            return Err(SwarmError::InvalidIdentifier(broadcast_type.to_string()));
        }
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO broadcasts (swarm_id, sender_agent, broadcast_type, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id",
        )
        .bind(swarm_id.value())
        .bind(sender.value())
        .bind(broadcast_type)
        .bind(payload)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        debug!(swarm = %swarm_id, sender = %sender, broadcast_type, id, "broadcast recorded");
        Ok(id)
    }

    /// # Errors
    /// Returns an error when either count query fails.
    pub async fn completion_status(&self, swarm_id: &SwarmId) -> Result<SwarmCompletion> {
        let done = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT sender_agent) FROM broadcasts WHERE swarm_id = ?1 AND broadcast_type = ?2",
        )
        .bind(swarm_id.value())
        .bind(DONE)
        .fetch_one(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT sender_agent) FROM broadcasts WHERE swarm_id = ?1",
        )
        .bind(swarm_id.value())
        .fetch_one(&self.pool)
        .await?;

        Ok(SwarmCompletion { done, total })
    }

    /// Broadcasts `done` for `agent` and re-reads the swarm's completion.
    ///
    /// # Errors
    /// Returns an error when the insert or the count queries fail.
    pub async fn report_done(&self, swarm_id: &SwarmId, agent: &AgentName) -> Result<SwarmCompletion> {
        self.broadcast(swarm_id, agent, DONE, "").await?;
        self.completion_status(swarm_id).await
    }

    /// Latest broadcasts in the swarm, newest first, optionally skipping one sender.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn recent_broadcasts(
        &self,
        swarm_id: &SwarmId,
        exclude_sender: Option<&AgentName>,
        limit: u32,
    ) -> Result<Vec<SwarmBroadcast>> {
        let rows = sqlx::query_as::<_, BroadcastRow>(
            "SELECT id, swarm_id, sender_agent, broadcast_type, payload, created_at
             FROM broadcasts
             WHERE swarm_id = ?1 AND (?2 IS NULL OR sender_agent <> ?2)
             ORDER BY id DESC
             LIMIT ?3",
        )
        .bind(swarm_id.value())
        .bind(exclude_sender.map(AgentName::value))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SwarmBroadcast::from).collect())
    }
}

/// Stop-hook body: report this agent done and surface the swarm's progress.
/// Ledger failures degrade to an ignored outcome.
pub async fn swarm_stop(ledger: &SwarmLedger, swarm_id: &SwarmId, agent: &AgentName) -> DispatchOutcome {
    match ledger.report_done(swarm_id, agent).await {
        Ok(completion) => DispatchOutcome::proceed(Some(format!(
            "Swarm {swarm_id}: {}",
            completion.summary()
        ))),
        Err(e) => {
            warn!(swarm = %swarm_id, agent = %agent, error = %e, "swarm stop report failed");
            DispatchOutcome::Ignore(IgnoreReason::LedgerFailure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SwarmCompletion;

    #[test]
    fn unseen_swarm_is_not_complete() {
        let empty = SwarmCompletion { done: 0, total: 0 };
        assert!(!empty.is_complete());
        assert_eq!(empty.summary(), "0/0 agents done");
    }

    #[test]
    fn completion_requires_every_sender_done() {
        assert!(!SwarmCompletion { done: 2, total: 3 }.is_complete());
        let all = SwarmCompletion { done: 3, total: 3 };
        assert!(all.is_complete());
        assert_eq!(all.summary(), "all 3 agents done");
    }
}
