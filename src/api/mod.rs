//! Access to the remote spreadsheet: range reads and writes, tab listing and file copies.
//!
//! `GoogleSheet` talks to the Google Sheets and Drive APIs. `TestSheet` keeps everything in memory
//! so the whole program can run without Google.

mod sheet;
mod sheet_test_client;

use crate::model::{RangeSpec, Snapshot};
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use sheet::GoogleSheet;
pub use sheet_test_client::TestSheet;

const MODE_ENV: &str = "MANGOS_IN_TEST_MODE";

/// One range and the values to write into it.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SheetRange {
    pub range: RangeSpec,
    pub values: Vec<Vec<String>>,
}

impl SheetRange {
    pub fn new(range: RangeSpec, values: Vec<Vec<String>>) -> Self {
        Self { range, values }
    }
}

/// The operations needed from a spreadsheet service. The bearer credential (if any) is fixed when
/// the implementation is constructed.
#[async_trait::async_trait]
pub trait Sheet: Send {
    /// Reads a rectangular range. Trailing empty rows and cells may be missing from the result.
    async fn read_range(&mut self, spreadsheet_id: &str, range: &RangeSpec) -> Result<Snapshot>;

    /// Writes `values` into `range` with user-entered semantics.
    async fn write_range(
        &mut self,
        spreadsheet_id: &str,
        range: &RangeSpec,
        values: Vec<Vec<String>>,
    ) -> Result<()>;

    /// Writes several ranges in one request.
    async fn batch_write(&mut self, spreadsheet_id: &str, data: &[SheetRange]) -> Result<()>;

    /// Lists the titles of every tab in the spreadsheet, in order.
    async fn list_tabs(&mut self, spreadsheet_id: &str) -> Result<Vec<String>>;

    /// Copies a file and returns the ID of the copy.
    async fn copy_file(&mut self, file_id: &str, new_title: &str) -> Result<String>;
}

/// Selects the `Sheet` implementation.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum Mode {
    #[default]
    Google,
    Test,
}

impl Mode {
    /// `Mode::Test` when `MANGOS_IN_TEST_MODE` is set and non-empty, otherwise `Mode::Google`.
    pub fn from_env() -> Self {
        match std::env::var(MODE_ENV) {
            Ok(value) if !value.is_empty() => {
                debug!("{MODE_ENV} is set, using the in-memory sheet");
                Mode::Test
            }
            _ => Mode::Google,
        }
    }
}

/// Creates the `Sheet` implementation for `mode`. `access_token` is only used by `Mode::Google`.
pub fn sheet(mode: Mode, access_token: &str) -> Box<dyn Sheet> {
    match mode {
        Mode::Google => Box::new(GoogleSheet::new(access_token)),
        Mode::Test => Box::new(TestSheet::default()),
    }
}
