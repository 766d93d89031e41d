//! Command handlers for the mangos CLI.
//!
//! Each handler takes the loaded `Config` and returns an `Out` with a message for the user and,
//! where useful, structured data.

mod add;
mod auth;
mod capture;
mod clone;
mod init;
mod summary;
mod tabs;

use crate::api::{self, Mode, Sheet};
use crate::auth::{AuthManager, AuthSettings, CommandLineHost, FileSessionStore};
use crate::{Config, Result};
use anyhow::anyhow;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info};

pub use add::add;
pub use auth::{auth, auth_status, sign_out, AuthStatus};
pub use capture::{capture, Captured};
pub use clone::{clone, month_sheet_name, Cloned, TEMPLATE_ID};
pub use init::init;
pub use summary::summary;
pub use tabs::{tabs, REPORT_TAB};

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// Builds the auth manager the CLI uses. `location` is the URL the user pasted after the redirect.
pub(crate) fn auth_manager(config: &Config, location: Option<String>) -> AuthManager {
    AuthManager::new(
        AuthSettings::new(config.client_id(), config.redirect_uri()),
        Arc::new(CommandLineHost::new(location)),
        Arc::new(FileSessionStore::new(config.session_path())),
    )
}

/// Opens the ledger for `mode`. Google access needs a current token from a previous `mangos auth`.
pub(crate) async fn open_sheet(config: &Config, mode: Mode) -> Result<Box<dyn Sheet>> {
    if mode == Mode::Test {
        return Ok(api::sheet(mode, ""));
    }
    let manager = auth_manager(config, None);
    manager.initialize().await?;
    let token = manager
        .access_token()
        .await
        .ok_or_else(|| anyhow!("You are not signed in or your token has expired, run 'mangos auth'"))?;
    Ok(api::sheet(mode, &token))
}
