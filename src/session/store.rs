//! JSON-file persistence for session records.
//!
//! One file per session id under `<root>/sessions/`. Writes go through a
//! temporary sibling and a rename, so a crash mid-write never leaves a
//! truncated record behind.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;
use tracing::debug;

use super::model::Session;

const SESSIONS_SUBDIR: &str = "sessions";

/// Environment variable overriding the store root.
pub const DIR_ENV_VAR: &str = "PATCHBAY_DIR";

#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("session store I/O failure at {path}: {source}")]
    #[diagnostic(
        code(patchbay::store::io),
        help("check that the store directory exists and is writable")
    )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed session record at {path}: {source}")]
    #[diagnostic(
        code(patchbay::store::serde),
        help("the file is not a valid session record; delete it or restore a backup")
    )]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Filesystem-backed session store.
#[derive(Clone, Debug)]
pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// Store rooted at an explicit directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: root.into().join(SESSIONS_SUBDIR),
        }
    }

    /// Store rooted per the environment: `PATCHBAY_DIR` when set (a `.env`
    /// file is honored), `~/.patchbay` otherwise.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let root = std::env::var(DIR_ENV_VAR).map(PathBuf::from).unwrap_or_else(|_| {
            std::env::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".patchbay")
        });
        Self::new(root)
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.json"))
    }

    async fn ensure_dir(&self) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.sessions_dir)
            .await
            .map_err(|source| PersistenceError::Io {
                path: self.sessions_dir.clone(),
                source,
            })
    }

    /// Persist a session record. Sessions marked non-persistent are skipped.
    pub async fn save(&self, session: &Session) -> Result<(), PersistenceError> {
        if !session.options.persistent {
            return Ok(());
        }
        self.ensure_dir().await?;

        let path = self.session_path(&session.id);
        let body = serde_json::to_vec_pretty(session).map_err(|source| PersistenceError::Serde {
            path: path.clone(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|source| PersistenceError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| PersistenceError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(session_id = %session.id, path = %path.display(), "session persisted");
        Ok(())
    }

    /// Read a persisted record. `Ok(None)` when no file exists.
    pub async fn load(&self, session_id: &str) -> Result<Option<Session>, PersistenceError> {
        let path = self.session_path(session_id);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PersistenceError::Io { path, source }),
        };
        let session =
            serde_json::from_slice(&body).map_err(|source| PersistenceError::Serde {
                path,
                source,
            })?;
        Ok(Some(session))
    }

    /// Delete a persisted record. Absent files are a no-op.
    pub async fn remove(&self, session_id: &str) -> Result<(), PersistenceError> {
        let path = self.session_path(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Io { path, source }),
        }
    }

    /// Ids of every persisted session, sorted for stable listings.
    pub async fn persisted_ids(&self) -> Result<Vec<String>, PersistenceError> {
        let mut entries = match tokio::fs::read_dir(&self.sessions_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.sessions_dir.clone(),
                    source,
                });
            }
        };

        let mut ids = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| PersistenceError::Io {
                path: self.sessions_dir.clone(),
                source,
            })?;
            let Some(entry) = entry else { break };
            let name = entry.file_name();
            if let Some(name) = name.to_str()
                && let Some(id) = name.strip_suffix(".json")
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
