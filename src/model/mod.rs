//! Types that represent the core data model, such as `ExpenseEntry` and `Snapshot`.
mod entry;
mod range;
mod snapshot;

pub use entry::{ExpenseEntry, Extraction};
pub use range::{column_index, column_letters, CellRef, RangeSpec, RowNumber};
pub use snapshot::Snapshot;
