//! Implements the `Sheet` trait using in-memory data for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without using Google Sheets.

use crate::api::{Sheet, SheetRange};
use crate::error::IntoResult;
use crate::model::{RangeSpec, Snapshot};
use crate::{Error, Result};
use anyhow::Context;
use std::io::Cursor;
use tracing::trace;

/// The tab that the seed ledger is stored under.
pub const SEED_TAB: &str = "Cashflow";

/// The report tab of the seed workbook.
pub const REPORT_TAB: &str = "Informe";

#[derive(Debug, Clone)]
struct Tab {
    title: String,
    rows: Vec<Vec<String>>,
}

/// An implementation of the `Sheet` trait that does not use Google sheets. It holds a single
/// workbook in memory and, by default, is seeded with a small ledger. The spreadsheet ID passed
/// to each call is not checked.
#[derive(Debug, Clone)]
pub struct TestSheet {
    tabs: Vec<Tab>,
    reads: usize,
    writes: usize,
    fail_writes: bool,
}

impl TestSheet {
    /// Create a new `TestSheet` from `(title, rows)` pairs, kept in the given order.
    pub fn new(tabs: Vec<(String, Vec<Vec<String>>)>) -> Self {
        Self {
            tabs: tabs
                .into_iter()
                .map(|(title, rows)| Tab { title, rows })
                .collect(),
            reads: 0,
            writes: 0,
            fail_writes: false,
        }
    }

    /// The rows of the tab named `title`.
    pub fn tab(&self, title: &str) -> Option<&[Vec<String>]> {
        self.tabs
            .iter()
            .find(|t| t.title == title)
            .map(|t| t.rows.as_slice())
    }

    /// The value at 1-indexed `row` and 0-indexed `col`, or empty if nothing is stored there.
    pub fn value(&self, title: &str, row: u32, col: usize) -> &str {
        self.tab(title)
            .and_then(|rows| rows.get((row as usize).saturating_sub(1)))
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// The number of `read_range` calls made so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// The number of write requests made so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Makes every subsequent write fail with `Error::WriteError`.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn tab_mut(&mut self, title: &str) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|t| t.title == title)
    }

    fn put(&mut self, data: &SheetRange) -> Result<()> {
        let range = &data.range;
        let tab = self
            .tab_mut(&range.sheet)
            .with_context(|| format!("Sheet '{}' not found", range.sheet))
            .write_err()?;
        let first_row = range.start.row.index();
        for (i, values) in data.values.iter().enumerate() {
            let row_index = first_row + i;
            if tab.rows.len() <= row_index {
                tab.rows.resize(row_index + 1, Vec::new());
            }
            let row = &mut tab.rows[row_index];
            for (j, value) in values.iter().enumerate() {
                let col = range.start.col + j;
                if row.len() <= col {
                    row.resize(col + 1, String::new());
                }
                row[col] = value.clone();
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Sheet for TestSheet {
    async fn read_range(&mut self, _spreadsheet_id: &str, range: &RangeSpec) -> Result<Snapshot> {
        trace!("TestSheet read_range {range}");
        self.reads += 1;
        let rows = self
            .tab(&range.sheet)
            .with_context(|| format!("Sheet '{}' not found", range.sheet))
            .read_err()?;

        // Like the real API, trailing empty cells and rows are left out
        let mut out: Vec<Vec<String>> = rows
            .iter()
            .skip(range.start.row.index())
            .take(range.end.row.index() - range.start.row.index() + 1)
            .map(|row| {
                let mut cells: Vec<String> = row
                    .iter()
                    .skip(range.start.col)
                    .take(range.end.col - range.start.col + 1)
                    .cloned()
                    .collect();
                while cells.last().is_some_and(|c| c.is_empty()) {
                    cells.pop();
                }
                cells
            })
            .collect();
        while out.last().is_some_and(|r| r.is_empty()) {
            out.pop();
        }
        Ok(Snapshot::with_origin(range.start, out))
    }

    async fn write_range(
        &mut self,
        spreadsheet_id: &str,
        range: &RangeSpec,
        values: Vec<Vec<String>>,
    ) -> Result<()> {
        self.batch_write(spreadsheet_id, &[SheetRange::new(range.clone(), values)])
            .await
    }

    async fn batch_write(&mut self, _spreadsheet_id: &str, data: &[SheetRange]) -> Result<()> {
        trace!("TestSheet batch_write of {} ranges", data.len());
        self.writes += 1;
        if self.fail_writes {
            return Err(Error::WriteError {
                message: "The caller does not have permission".into(),
            });
        }
        for sheet_range in data {
            self.put(sheet_range)?;
        }
        Ok(())
    }

    async fn list_tabs(&mut self, _spreadsheet_id: &str) -> Result<Vec<String>> {
        Ok(self.tabs.iter().map(|t| t.title.clone()).collect())
    }

    async fn copy_file(&mut self, _file_id: &str, new_title: &str) -> Result<String> {
        trace!("TestSheet copy_file as '{new_title}'");
        Ok(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl Default for TestSheet {
    /// Loads seed data from this module.
    fn default() -> Self {
        // The seed constants are fixed, valid CSV
        let ledger = load_csv(LEDGER_DATA).unwrap_or_default();
        let report = load_csv(REPORT_DATA).unwrap_or_default();
        Self::new(vec![
            (SEED_TAB.to_string(), ledger),
            (REPORT_TAB.to_string(), report),
        ])
    }
}

/// Loads data from a CSV-formatted string.
pub(crate) fn load_csv(csv_data: &str) -> Result<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false) // Ensure headers are treated as part of the data
        .flexible(true)
        .from_reader(Cursor::new(csv_data.as_bytes()));

    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result.context("Unable to parse CSV seed data")?;
        let row: Vec<String> = record.iter().map(|field| field.to_string()).collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Seed ledger. Columns B..D hold the fixed expenses, G..I the other expenses. The available
/// balance is in D2 and the total spent in G11.
const LEDGER_DATA: &str = r##",Mangos,,,,,,,
,Disponible,,"$1.250.000",,,,,
,,,,,,,,
,,,,,,,,
,,,,,,,,
,,,,,,,,
,,,,,,,,
,,,,,,,,
,,,,,,,,
,,,,,,,,
,Fijos,Frecuencia,Monto,,Total gastado,"$378.500",Monto,Medio
,Arriendo,Mensual,"$250.000",,,Supermercado,"$85.000",Tarjeta
,Internet,Mensual,"$13.500",,,Bencina,"$30.000",Efectivo
"##;

/// Seed report tab.
const REPORT_DATA: &str = r##"Mes,Gastado
Enero,"$410.000"
"##;
