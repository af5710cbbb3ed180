#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

mod file_store;

pub use file_store::FilePatternStore;

use crate::patterns::{PatternState, PatternType};
use crate::types::PatternId;
use crate::Result;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Durable home of pattern instances, one whole document per `(type, id)`.
///
/// `save` replaces the stored document wholesale: concurrent writers resolve
/// by last write wins.
pub trait PatternStore: Send + Sync {
    /// Malformed documents read as `None`.
    fn load<'a>(
        &'a self,
        pattern_type: PatternType,
        id: &'a PatternId,
    ) -> StoreFuture<'a, Option<PatternState>>;

    fn save<'a>(&'a self, state: &'a PatternState) -> StoreFuture<'a, ()>;

    /// Returns whether a document was removed.
    fn delete<'a>(&'a self, pattern_type: PatternType, id: &'a PatternId)
        -> StoreFuture<'a, bool>;

    /// Every readable instance; unreadable documents are skipped.
    fn list(&self) -> StoreFuture<'_, Vec<PatternState>>;

    fn list_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, Vec<PatternState>> {
        Box::pin(async move {
            let all = self.list().await?;
            Ok(all.into_iter().filter(|state| state.is_expired(now)).collect())
        })
    }

    /// Deletes expired instances and returns their keys. Individual delete
    /// failures are logged and skipped.
    fn sweep(&self, now: DateTime<Utc>) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move {
            let expired = self.list_expired(now).await?;
            let mut removed = Vec::with_capacity(expired.len());
            for state in expired {
                match self.delete(state.pattern_type(), &state.id).await {
                    Ok(true) => {
                        debug!(pattern = %state.key(), "swept expired pattern");
                        removed.push(state.key());
                    }
                    Ok(false) => {}
                    Err(e) => warn!(pattern = %state.key(), error = %e, "failed to sweep pattern"),
                }
            }
            Ok(removed)
        })
    }
}
