use crate::api::Sheet;
use crate::ledger::{LedgerLayout, PlacementPolicy};
use crate::model::{ExpenseEntry, RowNumber, Snapshot};
use crate::{Config, Result};
use serde::{Deserialize, Serialize};

const EMPTY_AMOUNT: &str = "$0";

/// The balance cell, `D2`.
const AVAILABLE: (usize, u32) = (3, 2);

/// The total spent cell, `G11`.
const SPENT: (usize, u32) = (6, 11);

/// The headline numbers of a ledger tab and the expenses recorded on it.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub available: String,
    pub spent: String,
    /// Newest first.
    pub movements: Vec<ExpenseEntry>,
}

/// Reads the configured tab and summarizes it.
pub async fn summarize(sheet: &mut dyn Sheet, config: &Config) -> Result<LedgerSummary> {
    config.require_configured()?;
    let layout = config.layout();
    let range = layout.read_range_to(config.sheet_name(), layout.last_column().max(SPENT.0));
    let snapshot = sheet.read_range(config.spreadsheet_id(), &range).await?;
    Ok(summary_of(layout, &snapshot))
}

fn summary_of(layout: &LedgerLayout, snapshot: &Snapshot) -> LedgerSummary {
    let (name_column, amount_column) = match &layout.policy {
        PlacementPolicy::FlatAppend { section } => (section.name_column, section.amount_column),
        PlacementPolicy::TwoSectionFallback { secondary, .. } => {
            (secondary.name_column, secondary.amount_column)
        }
    };

    let mut movements: Vec<ExpenseEntry> = layout
        .rows()
        .filter(|row| !snapshot.is_empty(*row, name_column))
        .map(|row| {
            ExpenseEntry::new(
                value(snapshot, row, name_column, ""),
                value(snapshot, row, amount_column, EMPTY_AMOUNT),
            )
        })
        .collect();
    movements.reverse();

    LedgerSummary {
        available: fixed_cell(snapshot, AVAILABLE),
        spent: fixed_cell(snapshot, SPENT),
        movements,
    }
}

fn fixed_cell(snapshot: &Snapshot, (col, row): (usize, u32)) -> String {
    match RowNumber::new(row) {
        Some(row) => value(snapshot, row, col, EMPTY_AMOUNT),
        None => EMPTY_AMOUNT.to_string(),
    }
}

fn value(snapshot: &Snapshot, row: RowNumber, col: usize, default: &str) -> String {
    match snapshot.cell(row, col).map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

impl std::fmt::Display for LedgerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Available {}, spent {}", self.available, self.spent)?;
        for m in &self.movements {
            write!(f, "\n  {} {}", m.name, m.amount)?;
        }
        Ok(())
    }
}
