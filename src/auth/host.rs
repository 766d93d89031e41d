//! The identity host is whatever environment performs the user-facing part of OAuth: it knows the
//! location the browser came back to, can sometimes hand out a token without asking the user, and
//! talks to the revocation and userinfo endpoints.

use crate::auth::session::UserProfile;
use crate::{Error, Result};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// A token handed out by the host without a redirect.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
}

#[async_trait::async_trait]
pub trait IdentityHost: Send + Sync {
    /// Whether the host can take part in authorization at all.
    async fn is_available(&self) -> bool;

    /// The fragment of the location the user agent returned to. Consumed by the first call.
    async fn take_fragment(&self) -> Option<String>;

    /// Asks for a token without any user interaction.
    async fn request_silent_token(&self, client_id: &str, scopes: &[&str]) -> Result<TokenGrant>;

    /// Revokes `access_token` with the provider.
    async fn revoke(&self, access_token: &str) -> Result<()>;

    /// Looks up the signed-in user.
    async fn user_profile(&self, access_token: &str) -> Result<UserProfile>;
}

/// The host used from the command line. The user opens the authorization URL in a browser and
/// pastes back the location they land on. There is no way to get a token silently.
#[derive(Debug)]
pub struct CommandLineHost {
    location: Mutex<Option<String>>,
    http: reqwest::Client,
}

impl CommandLineHost {
    /// `location` is the pasted URL (or bare fragment), if the user supplied one.
    pub fn new(location: Option<String>) -> Self {
        Self {
            location: Mutex::new(location),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl IdentityHost for CommandLineHost {
    async fn is_available(&self) -> bool {
        true
    }

    async fn take_fragment(&self) -> Option<String> {
        let location = self.location.lock().await.take()?;
        let fragment = match location.split_once('#') {
            Some((_, fragment)) => fragment.to_string(),
            None => location,
        };
        Some(fragment).filter(|f| !f.trim().is_empty())
    }

    async fn request_silent_token(&self, _client_id: &str, _scopes: &[&str]) -> Result<TokenGrant> {
        Err(Error::SilentRefreshFailed(
            "a new token can only be obtained interactively, run 'mangos auth'".into(),
        ))
    }

    async fn revoke(&self, access_token: &str) -> Result<()> {
        let response = self
            .http
            .post(REVOKE_URL)
            .form(&[("token", access_token)])
            .send()
            .await
            .context("Failed to send the revoke request")?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Revoke failed with status {}", response.status()).into());
        }
        debug!("Token revoked");
        Ok(())
    }

    async fn user_profile(&self, access_token: &str) -> Result<UserProfile> {
        let response = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to send the userinfo request")?;
        if !response.status().is_success() {
            return Err(
                anyhow::anyhow!("Userinfo failed with status {}", response.status()).into(),
            );
        }
        let info: UserInfo = response
            .json()
            .await
            .context("Unable to parse the userinfo response")?;
        Ok(info.into())
    }
}

#[derive(Debug, Default, Deserialize)]
struct UserInfo {
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserInfo> for UserProfile {
    /// Prefers the given name, else the first word of the full name.
    fn from(info: UserInfo) -> Self {
        let name = info
            .given_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                info.name
                    .as_deref()
                    .and_then(|n| n.split_whitespace().next())
                    .map(String::from)
            });
        UserProfile {
            name,
            email: info.email,
        }
    }
}

/// A source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_take_fragment_is_one_shot() {
        let host = CommandLineHost::new(Some(
            "http://localhost/#access_token=abc&expires_in=10".into(),
        ));
        assert_eq!(
            host.take_fragment().await.as_deref(),
            Some("access_token=abc&expires_in=10")
        );
        assert_eq!(host.take_fragment().await, None);
    }

    #[tokio::test]
    async fn test_take_fragment_without_location() {
        let host = CommandLineHost::new(None);
        assert!(host.is_available().await);
        assert_eq!(host.take_fragment().await, None);
        let host = CommandLineHost::new(Some("http://localhost/#".into()));
        assert_eq!(host.take_fragment().await, None);
    }

    #[tokio::test]
    async fn test_no_silent_grant() {
        let host = CommandLineHost::new(None);
        assert!(matches!(
            host.request_silent_token("id", &["email"]).await,
            Err(Error::SilentRefreshFailed(_))
        ));
    }

    #[test]
    fn test_user_profile_name() {
        let info: UserInfo =
            serde_json::from_str(r#"{"name":"Ana María Pérez","email":"ana@example.com"}"#)
                .unwrap();
        let profile = UserProfile::from(info);
        assert_eq!(profile.name.as_deref(), Some("Ana"));
        assert_eq!(profile.email.as_deref(), Some("ana@example.com"));

        let info: UserInfo =
            serde_json::from_str(r#"{"given_name":"María José","name":"María José Soto"}"#)
                .unwrap();
        assert_eq!(UserProfile::from(info).name.as_deref(), Some("María José"));

        assert_eq!(UserProfile::from(UserInfo::default()).name, None);
    }
}
