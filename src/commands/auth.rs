//! Authentication command handlers.
//!
//! - `mangos auth` prints the authorization URL to open in a browser
//! - `mangos auth --complete <URL>` accepts the location the browser landed on
//! - `mangos auth --status` reports the current state without touching the network
//! - `mangos auth --sign-out` revokes the token and forgets the session

use crate::auth::{AuthManager, AuthState};
use crate::commands::{auth_manager, Out};
use crate::{Config, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What the auth commands report.
#[derive(Debug, Clone, Serialize)]
pub struct AuthStatus {
    #[serde(flatten)]
    pub state: AuthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Set while waiting for the user to come back from the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl AuthStatus {
    async fn of(manager: &AuthManager) -> Self {
        Self {
            state: manager.state().await,
            user: manager.user_display_name().await,
            expiry: manager.expiry().await,
            url: None,
        }
    }
}

/// Handles `mangos auth`. Without `location` a new redirect is started and its URL returned. With
/// `location` (the URL the browser was sent back to, or just its fragment) the pending redirect is
/// completed and the token stored.
///
/// # Errors
/// - `Error::AuthInitError` if no OAuth client ID is configured
/// - `Error::AuthRejected` if the provider reported an error or the redirect does not match
pub async fn auth(config: &Config, location: Option<&str>) -> Result<Out<AuthStatus>> {
    let manager = auth_manager(config, None);
    manager.initialize().await?;

    match location {
        None => {
            let redirect = manager.begin_authorization().await?;
            let mut status = AuthStatus::of(&manager).await;
            status.url = Some(redirect.url.clone());
            Ok(Out::new(
                format!(
                    "Open this URL in your browser and sign in, then run \
                    'mangos auth --complete <URL>' with the address you land on:\n\n{}\n",
                    redirect.url
                ),
                status,
            ))
        }
        Some(location) => {
            manager.complete_authorization(location).await?;
            let status = AuthStatus::of(&manager).await;
            let message = match &status.user {
                Some(name) => format!("Signed in as {name}"),
                None => "Signed in".to_string(),
            };
            Ok(Out::new(message, status))
        }
    }
}

/// Handles `mangos auth --status`.
pub async fn auth_status(config: &Config) -> Result<Out<AuthStatus>> {
    let manager = auth_manager(config, None);
    manager.initialize().await?;
    let signed_in = manager.is_signed_in().await;
    let status = AuthStatus::of(&manager).await;
    let message = match (signed_in, &status.expiry) {
        (true, Some(expiry)) => format!("Signed in, the token is valid until {expiry}"),
        (true, None) => "Signed in".to_string(),
        (false, _) if status.state == AuthState::AwaitingRedirect => {
            "Waiting for 'mangos auth --complete <URL>'".to_string()
        }
        (false, Some(_)) => "The token has expired, run 'mangos auth'".to_string(),
        (false, None) => "Not signed in, run 'mangos auth'".to_string(),
    };
    Ok(Out::new(message, status))
}

/// Handles `mangos auth --sign-out`.
pub async fn sign_out(config: &Config) -> Result<Out<()>> {
    let manager = auth_manager(config, None);
    manager.initialize().await?;
    manager.sign_out().await?;
    Ok("Signed out".into())
}
