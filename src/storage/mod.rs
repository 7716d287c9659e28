mod loro_sheet;

pub use loro_sheet::{LoroSheetStore, StoredRow, UpsertOutcome, SHEETS_DB, TAQUERO_DIR};

/// A flat sheet row: column name to scalar JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;
