//! Onboarding: creates the user's ledger by copying the template spreadsheet.

use crate::api::{Mode, Sheet};
use crate::commands::{open_sheet, Out};
use crate::{Config, Result};
use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use tracing::info;

/// The spreadsheet that new ledgers are copied from.
pub const TEMPLATE_ID: &str = "17EqSTyy0Ey5aX3IJm1T1_6mPDlx5NNT9-PVOmWz_z6E";

const MONTHS: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// The new ledger.
#[derive(Debug, Clone, Serialize)]
pub struct Cloned {
    pub spreadsheet_id: String,
    pub title: String,
    pub sheet_name: String,
}

/// The tab of the template that holds `date`'s month, e.g. `Octubre`.
pub fn month_sheet_name(date: NaiveDate) -> &'static str {
    MONTHS[date.month0() as usize]
}

/// Handles `mangos clone`: copies `template` (or `TEMPLATE_ID`) into the user's Drive, points the
/// configuration at the copy and selects the current month's tab.
pub async fn clone(config: &mut Config, mode: Mode, template: Option<&str>) -> Result<Out<Cloned>> {
    let mut sheet = open_sheet(config, mode).await?;
    let today = Local::now().date_naive();
    clone_into(sheet.as_mut(), config, template.unwrap_or(TEMPLATE_ID), today).await
}

async fn clone_into(
    sheet: &mut dyn Sheet,
    config: &mut Config,
    template: &str,
    today: NaiveDate,
) -> Result<Out<Cloned>> {
    let title = format!("Mangos - {}", today.format("%Y-%m-%d"));
    let spreadsheet_id = sheet.copy_file(template, &title).await?;
    let sheet_name = month_sheet_name(today);
    info!("Copied the template to '{title}' ({spreadsheet_id})");

    config.set_ledger(&spreadsheet_id, sheet_name);
    config.save().await?;

    Ok(Out::new(
        format!("Created '{title}', expenses will be written to the '{sheet_name}' tab"),
        Cloned {
            spreadsheet_id,
            title,
            sheet_name: sheet_name.to_string(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TestSheet;
    use tempfile::TempDir;

    #[test]
    fn test_month_sheet_name() {
        let date = |m| NaiveDate::from_ymd_opt(2025, m, 15).unwrap();
        assert_eq!(month_sheet_name(date(1)), "Enero");
        assert_eq!(month_sheet_name(date(9)), "Septiembre");
        assert_eq!(month_sheet_name(date(12)), "Diciembre");
    }

    #[tokio::test]
    async fn test_clone_configures_the_copy() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::create(dir.path(), "", None, "id").await.unwrap();
        assert!(!config.is_configured());

        let mut sheet = TestSheet::default();
        let today = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let out = clone_into(&mut sheet, &mut config, TEMPLATE_ID, today)
            .await
            .unwrap();
        let cloned = out.structure().unwrap();
        assert_eq!(cloned.title, "Mangos - 2025-03-07");
        assert_eq!(cloned.sheet_name, "Marzo");
        assert!(config.is_configured());
        assert_eq!(config.spreadsheet_id(), cloned.spreadsheet_id);

        let reloaded = Config::load(dir.path()).await.unwrap();
        assert_eq!(reloaded.spreadsheet_id(), cloned.spreadsheet_id);
        assert_eq!(reloaded.sheet_name(), "Marzo");
    }
}
