use crate::api::Mode;
use crate::commands::{open_sheet, Out};
use crate::ledger::{self, LedgerSummary};
use crate::{Config, Result};

/// Handles `mangos summary`: the balance, the total spent and the recorded expenses.
pub async fn summary(config: &Config, mode: Mode) -> Result<Out<LedgerSummary>> {
    config.require_configured()?;
    let mut sheet = open_sheet(config, mode).await?;
    let summary = ledger::summarize(sheet.as_mut(), config).await?;
    Ok(Out::new(summary.to_string(), summary))
}
