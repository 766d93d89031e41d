use crate::commands::Out;
use crate::extract::Provider;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory, its subdirectories and an initial `config.json`.
///
/// # Arguments
/// - `mangos_home` - The directory that will be the root of data directory, e.g. `$HOME/mangos`
/// - `sheet_url` - The URL of the ledger spreadsheet, or empty if it will be created with
///   `mangos clone`.
/// - `sheet_name` - The tab to write to, `Cashflow` when not given.
/// - `client_id` - The OAuth client ID of your Google Cloud project.
/// - `provider`, `api_key`, `model` - The extraction backend and its credentials.
///
/// # Errors
/// - Returns an error if any file operations fail or the URL is not a spreadsheet URL.
pub async fn init(
    mangos_home: &Path,
    sheet_url: &str,
    sheet_name: Option<&str>,
    client_id: &str,
    provider: Provider,
    api_key: Option<&str>,
    model: Option<&str>,
) -> Result<Out<()>> {
    let mut config = Config::create(mangos_home, sheet_url, sheet_name, client_id)
        .await
        .context("Unable to create the data directory and configs")?;
    config.set_provider(provider, api_key, model);
    config.save().await?;
    if config.is_configured() {
        Ok("Successfully created the mangos directory and config".into())
    } else {
        Ok(
            "Created the mangos directory, run 'mangos auth' and then 'mangos clone' to create \
            your ledger"
                .into(),
        )
    }
}
