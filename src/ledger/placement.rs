use crate::api::SheetRange;
use crate::error::NoSpace;
use crate::ledger::{LedgerLayout, PlacementPolicy, Section};
use crate::model::{ExpenseEntry, RangeSpec, RowNumber, Snapshot};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Whether an entry landed in the first-choice section or the fallback.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Secondary,
}

serde_plain::derive_display_from_serialize!(Tier);

/// An entry together with the range it was written to.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlacedEntry {
    pub entry: ExpenseEntry,
    pub range: RangeSpec,
    pub section: String,
    pub tier: Tier,
}

/// What happened to each entry of a placement request.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlacementReport {
    pub placed: Vec<PlacedEntry>,
    /// Entries that were not written, in input order.
    pub unplaced: Vec<ExpenseEntry>,
}

/// The writes to perform and the report to hand back once they succeed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Placement {
    pub targets: Vec<SheetRange>,
    pub report: PlacementReport,
}

/// Computes where `entries` go on `sheet_name` given a fresh `snapshot` of that tab. Performs no
/// I/O.
///
/// # Errors
/// `Error::NoSpaceAvailable` if `entries` is not empty and none of them fit.
pub fn plan(
    layout: &LedgerLayout,
    sheet_name: &str,
    snapshot: &Snapshot,
    entries: &[ExpenseEntry],
) -> Result<Placement> {
    if entries.is_empty() {
        return Ok(Placement {
            targets: Vec::new(),
            report: PlacementReport::default(),
        });
    }
    match &layout.policy {
        PlacementPolicy::FlatAppend { section } => {
            flat_append(layout, section, sheet_name, snapshot, entries)
        }
        PlacementPolicy::TwoSectionFallback { primary, secondary } => {
            two_section(layout, primary, secondary, sheet_name, snapshot, entries)
        }
    }
}

fn flat_append(
    layout: &LedgerLayout,
    section: &Section,
    sheet_name: &str,
    snapshot: &Snapshot,
    entries: &[ExpenseEntry],
) -> Result<Placement> {
    let mut claimed = HashSet::new();
    let mut targets = Vec::new();
    let mut report = PlacementReport::default();

    for entry in entries {
        let row = free_rows(layout, section, snapshot).find(|row| !claimed.contains(row));
        match row {
            Some(row) => {
                claimed.insert(row);
                let target = target(section, sheet_name, row, snapshot, entry);
                report.placed.push(PlacedEntry {
                    entry: entry.clone(),
                    range: target.range.clone(),
                    section: section.label.clone(),
                    tier: Tier::Primary,
                });
                targets.push(target);
            }
            None => report.unplaced.push(entry.clone()),
        }
    }

    if report.placed.is_empty() {
        return Err(no_space(layout, &[section]));
    }
    Ok(Placement { targets, report })
}

fn two_section(
    layout: &LedgerLayout,
    primary: &Section,
    secondary: &Section,
    sheet_name: &str,
    snapshot: &Snapshot,
    entries: &[ExpenseEntry],
) -> Result<Placement> {
    let (entry, rest) = match entries.split_first() {
        Some(split) => split,
        None => {
            return Ok(Placement {
                targets: Vec::new(),
                report: PlacementReport::default(),
            })
        }
    };

    let choice = [(primary, Tier::Primary), (secondary, Tier::Secondary)]
        .into_iter()
        .find_map(|(section, tier)| {
            free_rows(layout, section, snapshot)
                .next()
                .map(|row| (section, tier, row))
        });
    let (section, tier, row) = choice.ok_or_else(|| no_space(layout, &[primary, secondary]))?;

    let target = target(section, sheet_name, row, snapshot, entry);
    let report = PlacementReport {
        placed: vec![PlacedEntry {
            entry: entry.clone(),
            range: target.range.clone(),
            section: section.label.clone(),
            tier,
        }],
        unplaced: rest.to_vec(),
    };
    Ok(Placement {
        targets: vec![target],
        report,
    })
}

/// Rows in the window whose name cell is empty, ascending.
fn free_rows<'a>(
    layout: &'a LedgerLayout,
    section: &'a Section,
    snapshot: &'a Snapshot,
) -> impl Iterator<Item = RowNumber> + 'a {
    layout
        .rows()
        .filter(move |row| snapshot.is_empty(*row, section.name_column))
}

/// The section span on `row`: the name, any middle cells as they were read, then the amount.
fn target(
    section: &Section,
    sheet_name: &str,
    row: RowNumber,
    snapshot: &Snapshot,
    entry: &ExpenseEntry,
) -> SheetRange {
    let mut values = Vec::with_capacity(section.amount_column - section.name_column + 1);
    values.push(entry.name.clone());
    for col in section.name_column + 1..section.amount_column {
        values.push(snapshot.cell(row, col).unwrap_or_default().to_string());
    }
    values.push(entry.amount.clone());
    let range = RangeSpec::row_span(
        sheet_name,
        row,
        section.name_column,
        section.amount_column,
    );
    SheetRange::new(range, vec![values])
}

fn no_space(layout: &LedgerLayout, sections: &[&Section]) -> Error {
    Error::NoSpaceAvailable(NoSpace {
        sections: sections.iter().map(|s| s.label.clone()).collect(),
        min_row: layout.min_row,
        max_row: layout.max_row,
    })
}
