//! Persistence for the access credential and the state of an unfinished redirect.
//!
//! The file store writes `session.json` with owner-only permissions. There is no refresh token:
//! the implicit grant only ever hands out short-lived access tokens.

use crate::{utils, Result};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// An access token and the moment it stops being accepted.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub expiry: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expiry,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// The `state` of an authorization redirect that has not come back yet.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PendingRedirect {
    pub state: String,
    pub started_at: DateTime<Utc>,
}

/// Who is signed in, as reported by the userinfo endpoint.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Everything the auth manager keeps between runs.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingRedirect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// Where the `Session` lives.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the stored session, or an empty one if nothing has been stored.
    async fn load(&self) -> Result<Session>;
    async fn save(&self, session: &Session) -> Result<()>;
    /// Forgets everything.
    async fn clear(&self) -> Result<()>;
}

/// Stores the session as JSON at a fixed path, usually `$MANGOS_HOME/.secrets/session.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Session> {
        if !self.path.is_file() {
            debug!("No session file at {}", self.path.display());
            return Ok(Session::default());
        }
        let session = utils::deserialize(&self.path)
            .await
            .context("Unable to read the session file, run 'mangos auth --sign-out' to reset it")?;
        Ok(session)
    }

    async fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            utils::make_dir(parent).await?;
        }
        let json =
            serde_json::to_string_pretty(session).context("Failed to serialize the session")?;
        utils::write(&self.path, json).await?;
        utils::restrict_permissions(&self.path)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        utils::remove(&self.path).await?;
        Ok(())
    }
}

/// Keeps the session in memory only.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Session>,
}

impl MemorySessionStore {
    pub fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Session> {
        Ok(self.session.lock().await.clone())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        *self.session.lock().await = session.clone();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.session.lock().await = Session::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn session() -> Session {
        Session {
            credential: Some(Credential::new(
                "ya29.token",
                Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            )),
            pending: None,
            user: Some(UserProfile {
                name: Some("Ana".into()),
                email: Some("ana@example.com".into()),
            }),
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join(".secrets").join("session.json"));
        assert_eq!(store.load().await.unwrap(), Session::default());

        store.save(&session()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), session());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        store.clear().await.unwrap();
        assert!(!store.path().exists());
        assert_eq!(store.load().await.unwrap(), Session::default());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        utils::write(&path, "not json").await.unwrap();
        let store = FileSessionStore::new(&path);
        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemorySessionStore::default();
        store.save(&session()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), session());
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), Session::default());
    }

    #[test]
    fn test_credential_expiry() {
        let expiry = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let c = Credential::new("t", expiry);
        assert!(!c.is_expired(expiry - chrono::Duration::seconds(1)));
        assert!(c.is_expired(expiry));
    }
}
