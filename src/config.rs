//! Configuration file handling for mangos.
//!
//! The configuration file is stored at `$MANGOS_HOME/config.json` and contains the ledger
//! spreadsheet, the tab to write to, the ledger layout, OAuth client settings and the extraction
//! provider settings.

use crate::extract::Provider;
use crate::ledger::LedgerLayout;
use crate::{utils, Error, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "mangos";
const CONFIG_VERSION: u8 = 1;
const SECRETS: &str = ".secrets";
const SESSION_JSON: &str = "session.json";
const CONFIG_JSON: &str = "config.json";
const DEFAULT_SHEET_NAME: &str = "Cashflow";
const DEFAULT_REDIRECT: &str = "http://localhost";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$MANGOS_HOME` and from there it loads `$MANGOS_HOME/config.json`.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    spreadsheet_id: String,
}

impl Config {
    /// Creates the data directory, its subdirectories and an initial `config.json`.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of data directory, e.g. `$HOME/mangos`
    /// - `sheet_url` - The URL (or bare ID) of the Google Sheet used as the ledger. May be empty
    ///   when the ledger will be created later by cloning a template.
    /// - `sheet_name` - The tab that expenses are written to.
    /// - `client_id` - The OAuth client ID used for the redirect flow.
    ///
    /// # Errors
    /// - Returns an error if any file operations fail or if `sheet_url` is not recognizable.
    pub async fn create(
        dir: impl Into<PathBuf>,
        sheet_url: &str,
        sheet_name: Option<&str>,
        client_id: &str,
    ) -> Result<Self> {
        let spreadsheet_id = extract_spreadsheet_id(sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();

        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the mangos home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;
        let secrets = root.join(SECRETS);
        utils::make_dir(&secrets).await?;
        let config_path = root.join(CONFIG_JSON);

        let config_file = ConfigFile {
            sheet_url: sheet_url.to_string(),
            sheet_name: sheet_name.unwrap_or(DEFAULT_SHEET_NAME).to_string(),
            oauth: OAuthSettings {
                client_id: client_id.to_string(),
                redirect_uri: DEFAULT_REDIRECT.to_string(),
            },
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        Ok(Self {
            root,
            secrets,
            config_path,
            config_file,
            spreadsheet_id,
        })
    }

    /// This will
    /// - validate that `mangos_home` exists and that the config file exists
    /// - load the config file
    /// - validate that the secrets directory exists
    pub async fn load(mangos_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = mangos_home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("Mangos home is missing, run 'mangos init' first")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            return Err(anyhow::anyhow!(
                "The config file is missing '{}'",
                config_path.display()
            )
            .into());
        }
        let config_file = ConfigFile::load(&config_path).await?;
        let spreadsheet_id = extract_spreadsheet_id(&config_file.sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();

        let config = Self {
            secrets: root.join(SECRETS),
            root,
            config_path,
            config_file,
            spreadsheet_id,
        };
        if !config.secrets.is_dir() {
            return Err(anyhow::anyhow!(
                "The secrets directory is missing '{}'",
                config.secrets.display()
            )
            .into());
        }
        Ok(config)
    }

    /// Writes the current settings back to `config.json`.
    pub async fn save(&self) -> Result<()> {
        self.config_file.save(&self.config_path).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub fn sheet_url(&self) -> &str {
        &self.config_file.sheet_url
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn sheet_name(&self) -> &str {
        &self.config_file.sheet_name
    }

    /// Points the configuration at a different spreadsheet and tab. Call `save` to persist it.
    pub fn set_ledger(&mut self, spreadsheet_id: &str, sheet_name: &str) {
        self.config_file.sheet_url = spreadsheet_url(spreadsheet_id);
        self.config_file.sheet_name = sheet_name.to_string();
        self.spreadsheet_id = spreadsheet_id.to_string();
    }

    /// Placement may only be attempted once both the spreadsheet and the tab are known.
    pub fn is_configured(&self) -> bool {
        !self.spreadsheet_id.is_empty() && !self.sheet_name().trim().is_empty()
    }

    /// Returns `Error::NotConfigured` unless `is_configured` holds.
    pub fn require_configured(&self) -> Result<()> {
        if self.is_configured() {
            return Ok(());
        }
        Err(Error::NotConfigured(
            "a spreadsheet and a sheet name are required, run 'mangos init' or 'mangos clone'"
                .into(),
        ))
    }

    pub fn client_id(&self) -> &str {
        &self.config_file.oauth.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.config_file.oauth.redirect_uri
    }

    pub fn provider(&self) -> Provider {
        self.config_file.provider.kind
    }

    pub fn model(&self) -> Option<&str> {
        self.config_file.provider.model.as_deref()
    }

    /// The API key of the extraction provider.
    pub fn api_key(&self) -> Result<&str> {
        match self.config_file.provider.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::NotConfigured(format!(
                "no API key is configured for {}",
                self.provider()
            ))),
        }
    }

    pub fn layout(&self) -> &LedgerLayout {
        &self.config_file.ledger
    }

    /// Selects the extraction provider. A `None` key or model keeps the current one. Call `save` to
    /// persist it.
    pub fn set_provider(&mut self, kind: Provider, api_key: Option<&str>, model: Option<&str>) {
        let settings = &mut self.config_file.provider;
        settings.kind = kind;
        if let Some(key) = api_key {
            settings.api_key = Some(key.to_string());
        }
        if let Some(model) = model {
            settings.model = Some(model.to_string());
        }
    }

    /// Replaces the ledger layout. Call `save` to persist it.
    pub fn set_layout(&mut self, layout: LedgerLayout) {
        self.config_file.ledger = layout;
    }

    /// Returns the stored `session_path` if it is absolute, otherwise resolves the relative path.
    pub fn session_path(&self) -> PathBuf {
        let p = self.config_file.session_path();
        if p.is_absolute() {
            return p;
        }
        self.root.join(p)
    }
}

/// OAuth client settings for the redirect flow.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct OAuthSettings {
    client_id: String,
    redirect_uri: String,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: DEFAULT_REDIRECT.to_string(),
        }
    }
}

/// Which extraction backend to call and with what key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
struct ProviderSettings {
    #[serde(default)]
    kind: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "mangos",
///   "config_version": 1,
///   "sheet_url": "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL",
///   "sheet_name": "Marzo",
///   "oauth": { "client_id": "1234.apps.googleusercontent.com", "redirect_uri": "http://localhost" },
///   "provider": { "kind": "gemini", "api_key": "..." },
///   "ledger": { "policy": "flat_append", "min_row": 12, "max_row": 118 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "mangos"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// URL to (or bare ID of) the ledger Google Sheet
    sheet_url: String,

    /// The tab that expenses are written to
    #[serde(default = "default_sheet_name")]
    sheet_name: String,

    #[serde(default)]
    oauth: OAuthSettings,

    #[serde(default)]
    provider: ProviderSettings,

    #[serde(default)]
    ledger: LedgerLayout,

    /// Path to the session file (optional, relative to `$MANGOS_HOME` or absolute)
    /// Defaults to $MANGOS_HOME/.secrets/session.json if not specified
    #[serde(skip_serializing_if = "Option::is_none")]
    session_path: Option<PathBuf>,
}

fn default_sheet_name() -> String {
    DEFAULT_SHEET_NAME.to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            sheet_url: String::new(),
            sheet_name: default_sheet_name(),
            oauth: OAuthSettings::default(),
            provider: ProviderSettings::default(),
            ledger: LedgerLayout::default(),
            session_path: None,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if it belongs to another app.
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;
        if config.app_name != APP_NAME {
            return Err(anyhow::anyhow!(
                "Invalid app_name in config file: expected '{}', got '{}'",
                APP_NAME,
                config.app_name
            )
            .into());
        }
        config.ledger.validate()?;
        Ok(config)
    }

    /// Saves the ConfigFile to the specified path. The file may hold an API key, so it is
    /// restricted to its owner.
    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")?;
        utils::restrict_permissions(p)?;
        Ok(())
    }

    fn session_path(&self) -> PathBuf {
        self.session_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(SESSION_JSON))
    }
}

fn spreadsheet_url(id: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{id}/edit")
}

/// Extracts the spreadsheet ID from a Google Sheets URL, or accepts a bare ID.
///
/// # Arguments
/// * `url` - The Google Sheets URL (e.g., "https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...")
///   or the ID itself (longer than 20 characters, without any `/`)
///
/// # Returns
/// The spreadsheet ID or an error if the format is not recognized. Returns an empty string if
/// the URL is empty.
pub(crate) fn extract_spreadsheet_id(url: &str) -> anyhow::Result<&str> {
    let url = url.trim();
    if url.is_empty() {
        return Ok(url);
    }

    // URL format: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...
    // or: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID?foo=bar
    let parts: Vec<&str> = url.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "d" && i + 1 < parts.len() {
            let id_part = parts[i + 1];
            let id = id_part
                .split('?')
                .next()
                .unwrap_or(id_part)
                .split('#')
                .next()
                .unwrap_or(id_part);
            if id.is_empty()
                || !id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                bail!("Invalid spreadsheet ID in URL: {url}");
            }
            return Ok(id);
        }
    }

    if url.len() > 20 && !url.contains('/') {
        return Ok(url);
    }

    bail!(
        "Invalid Google Sheets URL format. Expected: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID"
    )
}
