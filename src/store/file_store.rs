use super::{PatternStore, StoreFuture};
use crate::patterns::{PatternState, PatternType};
use crate::types::PatternId;
use crate::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// One pretty-printed `<type>-<id>.json` per instance under a single directory.
#[derive(Debug, Clone)]
pub struct FilePatternStore {
    dir: PathBuf,
}

impl FilePatternStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, pattern_type: PatternType, id: &PatternId) -> PathBuf {
        self.dir.join(format!("{pattern_type}-{id}.json"))
    }

    async fn read_state(path: &Path) -> Result<Option<PatternState>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                warn!(path = %path.display(), error = %e, "ignoring non-text pattern state");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&content) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed pattern state");
                Ok(None)
            }
        }
    }
}

/// Writes to a sibling temp file and renames it over `path`.
async fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    fs::write(&temp_path, content).await?;
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

fn is_state_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_none_or(|name| name.starts_with('.'));
    !hidden && path.extension().is_some_and(|ext| ext == "json")
}

impl PatternStore for FilePatternStore {
    fn load<'a>(
        &'a self,
        pattern_type: PatternType,
        id: &'a PatternId,
    ) -> StoreFuture<'a, Option<PatternState>> {
        Box::pin(async move {
            let Some(state) = Self::read_state(&self.path_for(pattern_type, id)).await? else {
                return Ok(None);
            };
            // A renamed or hand-edited file must not answer for another instance.
            if state.pattern_type() != pattern_type || &state.id != id {
                warn!(pattern_type = %pattern_type, id = %id, "pattern state key mismatch");
                return Ok(None);
            }
            Ok(Some(state))
        })
    }

    fn save<'a>(&'a self, state: &'a PatternState) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            fs::create_dir_all(&self.dir).await?;
            let content = serde_json::to_string_pretty(state)?;
            atomic_write(&self.path_for(state.pattern_type(), &state.id), &content).await
        })
    }

    fn delete<'a>(
        &'a self,
        pattern_type: PatternType,
        id: &'a PatternId,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            match fs::remove_file(self.path_for(pattern_type, id)).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn list(&self) -> StoreFuture<'_, Vec<PatternState>> {
        Box::pin(async move {
            let mut entries = match fs::read_dir(&self.dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };

            let mut states = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if !is_state_file(&path) {
                    continue;
                }
                if !entry.file_type().await.is_ok_and(|kind| kind.is_file()) {
                    debug!(path = %path.display(), "skipping non-file entry");
                    continue;
                }
                match Self::read_state(&path).await {
                    Ok(Some(state)) => states.push(state),
                    Ok(None) => {}
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable pattern state"),
                }
            }
            states.sort_by_key(PatternState::key);
            Ok(states)
        })
    }
}
