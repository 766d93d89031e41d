//! A1-style addressing for ledger cells.
//!
//! Rows are 1-indexed in A1 notation and 0-indexed in snapshots. `RowNumber` is the only place
//! where one is turned into the other.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 1-indexed row number as it appears in A1 notation.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RowNumber(u32);

impl RowNumber {
    /// Returns `None` for row zero, which does not exist in A1 notation.
    pub fn new(row: u32) -> Option<Self> {
        (row >= 1).then_some(Self(row))
    }

    /// The row number of the 0-indexed snapshot row `index`.
    pub fn from_index(index: usize) -> Self {
        Self(index as u32 + 1)
    }

    /// The 0-indexed position of this row.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RowNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Converts a 0-indexed column to its letters, e.g. `0 -> A`, `6 -> G`, `26 -> AA`.
pub fn column_letters(col: usize) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Converts column letters to a 0-indexed column, e.g. `G -> 6`. Case-insensitive.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut n: usize = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let v = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        n = n.checked_mul(26)?.checked_add(v)?;
    }
    Some(n - 1)
}

/// A single cell, e.g. `G12`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CellRef {
    pub col: usize,
    pub row: RowNumber,
}

impl CellRef {
    pub fn new(col: usize, row: RowNumber) -> Self {
        Self { col, row }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row)
    }
}

impl FromStr for CellRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| anyhow::anyhow!("Cell reference is missing a row number: {s}"))?;
        let (letters, digits) = s.split_at(split);
        let col = column_index(letters)
            .ok_or_else(|| anyhow::anyhow!("Invalid column in cell reference: {s}"))?;
        let row = digits
            .parse::<u32>()
            .ok()
            .and_then(RowNumber::new)
            .ok_or_else(|| anyhow::anyhow!("Invalid row in cell reference: {s}"))?;
        Ok(CellRef { col, row })
    }
}

/// A rectangular range on a named tab, e.g. `Cashflow!G12:H12`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RangeSpec {
    pub sheet: String,
    pub start: CellRef,
    pub end: CellRef,
}

impl RangeSpec {
    pub fn new(sheet: impl Into<String>, start: CellRef, end: CellRef) -> Self {
        Self {
            sheet: sheet.into(),
            start,
            end,
        }
    }

    /// A span of columns `first_col..=last_col` on a single row.
    pub fn row_span(
        sheet: impl Into<String>,
        row: RowNumber,
        first_col: usize,
        last_col: usize,
    ) -> Self {
        Self::new(
            sheet,
            CellRef::new(first_col, row),
            CellRef::new(last_col, row),
        )
    }

    /// The cells part of the range without the tab name, e.g. `G12:H12`.
    pub fn cells(&self) -> String {
        if self.start == self.end {
            self.start.to_string()
        } else {
            format!("{}:{}", self.start, self.end)
        }
    }
}

/// Tab names with anything beyond ASCII alphanumerics or `_` must be single-quoted in A1
/// notation, with embedded quotes doubled.
fn quote_sheet(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

fn unquote_sheet(name: &str) -> String {
    match name.strip_prefix('\'').and_then(|n| n.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => name.to_string(),
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", quote_sheet(&self.sheet), self.cells())
    }
}

impl FromStr for RangeSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (sheet, cells) = s
            .rsplit_once('!')
            .ok_or_else(|| anyhow::anyhow!("Range must be in format 'Sheet!A1:B2', got: {s}"))?;
        let sheet = unquote_sheet(sheet);
        if sheet.is_empty() {
            anyhow::bail!("Range is missing a sheet name: {s}");
        }
        let (start, end) = match cells.split_once(':') {
            Some((a, b)) => (a.parse::<CellRef>()?, b.parse::<CellRef>()?),
            None => {
                let cell = cells.parse::<CellRef>()?;
                (cell, cell)
            }
        };
        if end.col < start.col || end.row < start.row {
            anyhow::bail!("Range end comes before its start: {s}");
        }
        Ok(RangeSpec { sheet, start, end })
    }
}

impl Serialize for RangeSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RangeSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RangeSpec::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(n: u32) -> RowNumber {
        RowNumber::new(n).unwrap()
    }

    #[test]
    fn test_row_number_conversion() {
        assert!(RowNumber::new(0).is_none());
        assert_eq!(row(12).index(), 11);
        assert_eq!(RowNumber::from_index(11), row(12));
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(6), "G");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_index("g"), Some(6));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("ZZ"), Some(701));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
    }

    #[test]
    fn test_range_display() {
        let r = RangeSpec::row_span("Cashflow", row(12), 6, 7);
        assert_eq!(r.to_string(), "Cashflow!G12:H12");

        let r = RangeSpec::row_span("Gastos Extra", row(40), 1, 3);
        assert_eq!(r.to_string(), "'Gastos Extra'!B40:D40");

        let r = RangeSpec::row_span("Resumen", row(2), 3, 3);
        assert_eq!(r.to_string(), "Resumen!D2");
    }

    #[test]
    fn test_range_from_str() {
        let r: RangeSpec = "Cashflow!A1:H118".parse().unwrap();
        assert_eq!(r.sheet, "Cashflow");
        assert_eq!(r.start, CellRef::new(0, row(1)));
        assert_eq!(r.end, CellRef::new(7, row(118)));

        let r: RangeSpec = "'Marzo ''24'!G12".parse().unwrap();
        assert_eq!(r.sheet, "Marzo '24");
        assert_eq!(r.start, r.end);
        assert_eq!(r.to_string(), "'Marzo ''24'!G12");
    }

    #[test]
    fn test_range_from_str_invalid() {
        assert!("G12:H12".parse::<RangeSpec>().is_err()); // Missing sheet
        assert!("Cashflow!G0".parse::<RangeSpec>().is_err()); // Row zero
        assert!("Cashflow!12".parse::<RangeSpec>().is_err()); // Missing column
        assert!("Cashflow!H12:G12".parse::<RangeSpec>().is_err()); // Reversed
    }

    #[test]
    fn test_range_serde() {
        let r = RangeSpec::row_span("Cashflow", row(12), 6, 7);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#""Cashflow!G12:H12""#);
        let back: RangeSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
