use crate::api::{Mode, Sheet};
use crate::commands::capture::report_message;
use crate::commands::{open_sheet, Out};
use crate::ledger::{self, PlacementReport};
use crate::model::ExpenseEntry;
use crate::{Config, Result};

/// Handles `mangos add`: writes entries given on the command line, skipping extraction.
pub async fn add(
    config: &Config,
    mode: Mode,
    entries: &[ExpenseEntry],
) -> Result<Out<PlacementReport>> {
    config.require_configured()?;
    if entries.is_empty() {
        return Ok("Nothing to add".into());
    }
    let mut sheet = open_sheet(config, mode).await?;
    add_to(sheet.as_mut(), config, entries).await
}

async fn add_to(
    sheet: &mut dyn Sheet,
    config: &Config,
    entries: &[ExpenseEntry],
) -> Result<Out<PlacementReport>> {
    let report = ledger::place_entries(sheet, config, entries).await?;
    Ok(Out::new(report_message(&report), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TestSheet;
    use crate::ledger::{LedgerLayout, PlacementPolicy, Tier};
    use crate::Error;
    use tempfile::TempDir;

    const SPREADSHEET_ID: &str = "1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX";

    #[tokio::test]
    async fn test_add_two_section_ledger() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::create(dir.path(), SPREADSHEET_ID, None, "id")
            .await
            .unwrap();
        config.set_layout(LedgerLayout::new(PlacementPolicy::two_section()));

        let mut sheet = TestSheet::default();
        let out = add_to(
            &mut sheet,
            &config,
            &[
                ExpenseEntry::new("Agua", "$12.000"),
                ExpenseEntry::new("Luz", "$20.000"),
            ],
        )
        .await
        .unwrap();
        let report = out.structure().unwrap();
        assert_eq!(report.placed.len(), 1);
        assert_eq!(report.placed[0].tier, Tier::Primary);
        assert_eq!(report.placed[0].range.to_string(), "Cashflow!B14:D14");
        assert_eq!(report.unplaced, vec![ExpenseEntry::new("Luz", "$20.000")]);
        assert_eq!(sheet.value("Cashflow", 14, 1), "Agua");
        assert_eq!(sheet.value("Cashflow", 14, 3), "$12.000");
    }

    #[tokio::test]
    async fn test_add_nothing() {
        let dir = TempDir::new().unwrap();
        let config = Config::create(dir.path(), "", None, "id").await.unwrap();
        assert!(matches!(
            add(&config, Mode::Test, &[]).await,
            Err(Error::NotConfigured(_))
        ));

        let dir = TempDir::new().unwrap();
        let config = Config::create(dir.path(), SPREADSHEET_ID, None, "id")
            .await
            .unwrap();
        let out = add(&config, Mode::Test, &[]).await.unwrap();
        assert_eq!(out.message(), "Nothing to add");
    }
}
