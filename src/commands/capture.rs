use crate::api::{Mode, Sheet};
use crate::commands::{open_sheet, Out};
use crate::extract::Extractor;
use crate::ledger::{self, PlacementReport};
use crate::model::Extraction;
use crate::{Config, Result};
use serde::Serialize;
use tracing::debug;

/// The extracted entries and, once confirmed, where they were written.
#[derive(Debug, Clone, Serialize)]
pub struct Captured {
    pub extraction: Extraction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PlacementReport>,
}

/// Handles `mangos capture`. The text is sent to the configured provider and the entries it finds
/// are shown. Nothing is written unless `confirm` is set.
///
/// # Errors
/// - `Error::NotConfigured` if the provider has no API key, or if `confirm` is set and the ledger
///   is not configured
/// - `Error::ProviderError`, `Error::EmptyResponse`, `Error::MalformedResponse` from extraction
/// - Any placement error when writing
pub async fn capture(
    config: &Config,
    mode: Mode,
    text: &str,
    confirm: bool,
) -> Result<Out<Captured>> {
    if confirm {
        config.require_configured()?;
    }
    let extractor = config.provider().extractor(config.api_key()?, config.model());
    let extraction = extract(extractor.as_ref(), text).await?;
    if !confirm || extraction.entries.is_empty() {
        return Ok(preview(extraction));
    }
    let mut sheet = open_sheet(config, mode).await?;
    write(sheet.as_mut(), config, extraction).await
}

async fn extract(extractor: &dyn Extractor, text: &str) -> Result<Extraction> {
    if text.trim().is_empty() {
        debug!("Nothing to extract");
        return Ok(Extraction::default());
    }
    let extraction = extractor.process_text(text).await?;
    debug!(
        "Extracted {} entries with confidence {}",
        extraction.entries.len(),
        extraction.confidence
    );
    Ok(extraction)
}

fn preview(extraction: Extraction) -> Out<Captured> {
    let message = if extraction.entries.is_empty() {
        "No expenses found in the text".to_string()
    } else {
        let lines: Vec<String> = extraction
            .entries
            .iter()
            .map(|e| format!("  {} {}", e.name, e.amount))
            .collect();
        format!(
            "Found {} expenses, run again with --confirm to write them:\n{}",
            extraction.entries.len(),
            lines.join("\n")
        )
    };
    Out::new(
        message,
        Captured {
            extraction,
            report: None,
        },
    )
}

async fn write(
    sheet: &mut dyn Sheet,
    config: &Config,
    extraction: Extraction,
) -> Result<Out<Captured>> {
    let report = ledger::place_entries(sheet, config, &extraction.entries).await?;
    let message = report_message(&report);
    Ok(Out::new(
        message,
        Captured {
            extraction,
            report: Some(report),
        },
    ))
}

/// Summarizes a placement for the user.
pub(crate) fn report_message(report: &PlacementReport) -> String {
    let mut message = format!("Wrote {} expenses", report.placed.len());
    if !report.unplaced.is_empty() {
        let names: Vec<&str> = report.unplaced.iter().map(|e| e.name.as_str()).collect();
        message.push_str(&format!(
            ", {} could not be placed: {}",
            report.unplaced.len(),
            names.join(", ")
        ));
    }
    message
}
