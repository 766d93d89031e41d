use crate::api::{Mode, Sheet};
use crate::commands::{open_sheet, Out};
use crate::{Config, Result};
use anyhow::anyhow;

/// The report tab of the ledger template. Expenses are never written there.
pub const REPORT_TAB: &str = "Informe";

/// Handles `mangos tabs`: lists the tabs of the configured spreadsheet that can hold expenses.
pub async fn tabs(config: &Config, mode: Mode) -> Result<Out<Vec<String>>> {
    if config.spreadsheet_id().is_empty() {
        return Err(anyhow!("No spreadsheet is configured, run 'mangos clone' or 'mangos init'").into());
    }
    let mut sheet = open_sheet(config, mode).await?;
    list(sheet.as_mut(), config.spreadsheet_id()).await
}

async fn list(sheet: &mut dyn Sheet, spreadsheet_id: &str) -> Result<Out<Vec<String>>> {
    let tabs: Vec<String> = sheet
        .list_tabs(spreadsheet_id)
        .await?
        .into_iter()
        .filter(|t| t != REPORT_TAB)
        .collect();
    Ok(Out::new(tabs.join("\n"), tabs))
}
