//! Session store - session id → upstream credentials
//!
//! The executor only talks to the [`SessionStore`] trait. Two backings are
//! provided: an in-memory map for servers and a JSON-file directory for the
//! CLI, so refreshed tokens survive between runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Credentials bound to one client session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Upstream domain the tokens were issued for
    pub domain: String,
    /// Bumped on every token change
    #[serde(default)]
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a session after a successful authorization
    pub fn new(access_token: String, refresh_token: Option<String>, domain: String) -> Self {
        let now = Utc::now();
        let id = format!(
            "session_{}_{}",
            now.timestamp_millis(),
            SESSION_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            id,
            access_token,
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            domain,
            generation: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the access token (and the refresh token, when one is given)
    pub fn rotate(&mut self, access_token: String, refresh_token: Option<String>) {
        self.access_token = access_token;
        if let Some(refresh) = refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = Some(refresh);
        }
        self.generation += 1;
        self.updated_at = Utc::now();
    }
}

/// Storage for sessions, keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Option<Session>;

    async fn put(&self, session: Session);

    /// Remove a session, returning it if it existed
    async fn delete(&self, session_id: &str) -> Option<Session>;
}

/// Process-wide in-memory store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn put(&self, session: Session) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    async fn delete(&self, session_id: &str) -> Option<Session> {
        self.sessions.write().await.remove(session_id)
    }
}

/// One JSON file per session under a directory
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default location under the user's data directory
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ganttkit")
            .join("sessions")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `None` for ids that could escape the directory
    fn session_path(&self, session_id: &str) -> Option<PathBuf> {
        let safe = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        safe.then(|| self.dir.join(format!("{}.json", session_id)))
    }

    /// List stored session ids, most recent first
    pub async fn list(&self) -> anyhow::Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    sessions.push(stem.to_string());
                }
            }
        }

        sessions.sort();
        sessions.reverse();
        Ok(sessions)
    }

    async fn write(&self, session: &Session) -> anyhow::Result<()> {
        let path = self
            .session_path(&session.id)
            .ok_or_else(|| anyhow::anyhow!("invalid session id {:?}", session.id))?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, session_id: &str) -> Option<Session> {
        let path = self.session_path(session_id)?;
        let content = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                log::warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn put(&self, session: Session) {
        if let Err(e) = self.write(&session).await {
            log::warn!("Failed to save session {}: {}", session.id, e);
        }
    }

    async fn delete(&self, session_id: &str) -> Option<Session> {
        let existing = self.get(session_id).await?;
        let path = self.session_path(session_id)?;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            log::warn!("Failed to delete session file {}: {}", path.display(), e);
        }
        Some(existing)
    }
}
