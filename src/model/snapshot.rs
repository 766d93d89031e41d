use crate::model::{CellRef, RowNumber};
use serde::{Deserialize, Serialize};

/// A read-only copy of a rectangular cell range, as returned by the sheet API.
///
/// Rows may be ragged and trailing empty rows may be missing entirely. Anything outside of the
/// stored grid reads as empty. A snapshot is taken for exactly one placement and then dropped.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    origin: CellRefJson,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
struct CellRefJson {
    col: usize,
    row: u32,
}

impl Snapshot {
    /// Creates a snapshot whose first cell is `A1`.
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self::with_origin(CellRef::new(0, RowNumber::from_index(0)), rows)
    }

    /// Creates a snapshot whose first cell is `origin`.
    pub fn with_origin(origin: CellRef, rows: Vec<Vec<String>>) -> Self {
        Self {
            origin: CellRefJson {
                col: origin.col,
                row: origin.row.get(),
            },
            rows,
        }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// The value at an absolute sheet position, or `None` if it lies outside the stored grid.
    pub fn cell(&self, row: RowNumber, col: usize) -> Option<&str> {
        let row_offset = row.get().checked_sub(self.origin.row)? as usize;
        let col_offset = col.checked_sub(self.origin.col)?;
        self.rows
            .get(row_offset)
            .and_then(|r| r.get(col_offset))
            .map(String::as_str)
    }

    /// A cell is empty iff it is missing or only whitespace.
    pub fn is_empty(&self, row: RowNumber, col: usize) -> bool {
        self.cell(row, col).map_or(true, |v| v.trim().is_empty())
    }
}
