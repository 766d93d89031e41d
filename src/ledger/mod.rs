//! The ledger: where new expenses go and what is already there.
//!
//! A ledger tab has one or two bounded sections. Each section has a designated name column and an
//! amount column, and a row belongs to the section's free space iff its name cell is empty.
//! `place_entries` re-reads the tab, computes targets with `plan` and writes them. Nothing read
//! from the sheet outlives a single call.

mod placement;
mod summary;

use crate::api::Sheet;
use crate::model::{column_index, column_letters, CellRef, ExpenseEntry, RangeSpec, RowNumber};
use crate::{Config, Result};
use anyhow::ensure;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

pub use placement::{plan, PlacedEntry, Placement, PlacementReport, Tier};
pub use summary::{summarize, LedgerSummary};

/// The first row that placement may write to.
pub const DEFAULT_MIN_ROW: u32 = 12;
/// The last row that placement may write to.
pub const DEFAULT_MAX_ROW: u32 = 118;

/// A titled block of columns. Entries are written to `name_column..=amount_column`. Cells in
/// between are written back with whatever they held when the tab was read.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub label: String,
    #[serde(with = "column_letter")]
    pub name_column: usize,
    #[serde(with = "column_letter")]
    pub amount_column: usize,
}

impl Section {
    pub fn new(label: impl Into<String>, name_column: usize, amount_column: usize) -> Self {
        Self {
            label: label.into(),
            name_column,
            amount_column,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.name_column < self.amount_column,
            "Section '{}': the name column {} must come before the amount column {}",
            self.label,
            column_letters(self.name_column),
            column_letters(self.amount_column)
        );
        Ok(())
    }
}

/// How new entries are assigned to rows.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PlacementPolicy {
    /// Every entry goes to the next free row of a single section.
    FlatAppend {
        #[serde(default = "gastos")]
        section: Section,
    },
    /// Only the first entry is placed: in the primary section if it has room, else in the
    /// secondary one.
    TwoSectionFallback {
        #[serde(default = "fijos")]
        primary: Section,
        #[serde(default = "gastos_extra")]
        secondary: Section,
    },
}

impl PlacementPolicy {
    /// The default two-section layout: fixed expenses in B..D, everything else in G..I.
    pub fn two_section() -> Self {
        PlacementPolicy::TwoSectionFallback {
            primary: fijos(),
            secondary: gastos_extra(),
        }
    }

    fn sections(&self) -> Vec<&Section> {
        match self {
            PlacementPolicy::FlatAppend { section } => vec![section],
            PlacementPolicy::TwoSectionFallback { primary, secondary } => {
                vec![primary, secondary]
            }
        }
    }
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        PlacementPolicy::FlatAppend { section: gastos() }
    }
}

fn gastos() -> Section {
    Section::new("Gastos", 6, 7)
}

fn fijos() -> Section {
    Section::new("Fijos", 1, 3)
}

fn gastos_extra() -> Section {
    Section::new("Gastos Extra", 6, 8)
}

fn default_min_row() -> u32 {
    DEFAULT_MIN_ROW
}

fn default_max_row() -> u32 {
    DEFAULT_MAX_ROW
}

/// The shape of a ledger tab: the placement policy and the rows it may use.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct LedgerLayout {
    #[serde(flatten)]
    pub policy: PlacementPolicy,
    #[serde(default = "default_min_row")]
    pub min_row: u32,
    #[serde(default = "default_max_row")]
    pub max_row: u32,
}

impl Default for LedgerLayout {
    fn default() -> Self {
        Self {
            policy: PlacementPolicy::default(),
            min_row: DEFAULT_MIN_ROW,
            max_row: DEFAULT_MAX_ROW,
        }
    }
}

impl LedgerLayout {
    pub fn new(policy: PlacementPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.min_row >= 1, "The ledger min_row must be at least 1");
        ensure!(
            self.min_row <= self.max_row,
            "The ledger min_row {} is greater than max_row {}",
            self.min_row,
            self.max_row
        );
        for section in self.policy.sections() {
            section.validate()?;
        }
        Ok(())
    }

    /// The rows placement may use, in ascending order.
    pub fn rows(&self) -> impl Iterator<Item = RowNumber> {
        (self.min_row.max(1)..=self.max_row).filter_map(RowNumber::new)
    }

    /// The right-most column touched by any section.
    pub fn last_column(&self) -> usize {
        self.policy
            .sections()
            .iter()
            .map(|s| s.amount_column)
            .max()
            .unwrap_or(0)
    }

    /// The range that must be read before placing: from `A1` to the last column and row.
    pub fn read_range(&self, sheet_name: &str) -> RangeSpec {
        self.read_range_to(sheet_name, self.last_column())
    }

    pub(crate) fn read_range_to(&self, sheet_name: &str, last_column: usize) -> RangeSpec {
        let first = RowNumber::from_index(0);
        let last = RowNumber::new(self.max_row).unwrap_or(first);
        RangeSpec::new(
            sheet_name,
            CellRef::new(0, first),
            CellRef::new(last_column, last),
        )
    }
}

/// Places `entries` into the configured ledger tab and reports what went where.
///
/// The tab is read fresh, targets are computed with `plan` and then written with user-entered
/// semantics. FlatAppend writes every target in one batch, TwoSectionFallback writes its single
/// range. An empty `entries` slice does nothing.
///
/// # Errors
/// - `Error::NotConfigured` when the spreadsheet or tab is missing
/// - `Error::ReadError` / `Error::WriteError` from the transport
/// - `Error::NoSpaceAvailable` when no entry could be placed
pub async fn place_entries(
    sheet: &mut dyn Sheet,
    config: &Config,
    entries: &[ExpenseEntry],
) -> Result<PlacementReport> {
    config.require_configured()?;
    if entries.is_empty() {
        debug!("No entries to place");
        return Ok(PlacementReport::default());
    }

    let layout = config.layout();
    let spreadsheet_id = config.spreadsheet_id();
    let range = layout.read_range(config.sheet_name());
    debug!("Reading {range} before placement");
    let snapshot = sheet.read_range(spreadsheet_id, &range).await?;

    let Placement { targets, report } = plan(layout, config.sheet_name(), &snapshot, entries)?;
    match &layout.policy {
        PlacementPolicy::FlatAppend { .. } => sheet.batch_write(spreadsheet_id, &targets).await?,
        PlacementPolicy::TwoSectionFallback { .. } => {
            for target in targets {
                sheet
                    .write_range(spreadsheet_id, &target.range, target.values)
                    .await?;
            }
        }
    }

    for placed in &report.placed {
        info!(
            "Wrote '{}' {} to {} ({})",
            placed.entry.name, placed.entry.amount, placed.range, placed.section
        );
    }
    if !report.unplaced.is_empty() {
        info!("{} entries could not be placed", report.unplaced.len());
    }
    Ok(report)
}

/// Serializes a 0-indexed column as its letters, e.g. `"G"`.
mod column_letter {
    use super::*;

    pub(super) fn serialize<S>(col: &usize, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&column_letters(*col))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        column_index(s.trim())
            .ok_or_else(|| serde::de::Error::custom(format!("Invalid column letters '{s}'")))
    }
}
