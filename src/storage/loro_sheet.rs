use std::fs;
use std::path::{Path, PathBuf};

use loro::{LoroDoc, LoroMap, LoroValue, ValueOrContainer};
use serde_json::Value;

use super::Row;
use crate::error::{Result, TaqueroError};

pub const TAQUERO_DIR: &str = ".taquero";
pub const SHEETS_DB: &str = "sheets.db";

/// Internal per-row write counter, never exposed as a column.
const VERSION_KEY: &str = "_version";

/// A row together with its write counter
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub row: Row,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// True when no row with this id existed before the write
    pub created: bool,
    pub version: u64,
}

/// Keyed sheet store. Each sheet is a root map of `id -> row map`.
pub struct LoroSheetStore {
    doc: LoroDoc,
    path: Option<PathBuf>,
}

impl LoroSheetStore {
    /// Initialize a new taquero project
    pub fn init(root: &Path) -> Result<Self> {
        let data_dir = root.join(TAQUERO_DIR);

        if data_dir.exists() {
            return Err(TaqueroError::AlreadyInitialized);
        }

        fs::create_dir_all(&data_dir)?;

        let store = Self {
            doc: LoroDoc::new(),
            path: Some(data_dir.join(SHEETS_DB)),
        };
        store.save()?;

        Ok(store)
    }

    /// Open an existing taquero project
    pub fn open(root: &Path) -> Result<Self> {
        let path = root.join(TAQUERO_DIR).join(SHEETS_DB);

        if !path.exists() {
            return Err(TaqueroError::NotInitialized);
        }

        let bytes = fs::read(&path)?;
        let doc = LoroDoc::new();
        doc.import(&bytes)?;

        Ok(Self {
            doc,
            path: Some(path),
        })
    }

    /// A store that lives only as long as the value
    pub fn in_memory() -> Self {
        Self {
            doc: LoroDoc::new(),
            path: None,
        }
    }

    /// Write a snapshot to disk. No-op for in-memory stores.
    pub fn save(&self) -> Result<()> {
        if let Some((path, bytes)) = self.export_snapshot()? {
            fs::write(path, bytes)?;
        }
        Ok(())
    }

    /// Snapshot bytes and the file they belong in, for callers that do
    /// their own I/O. `None` for in-memory stores.
    pub fn export_snapshot(&self) -> Result<Option<(PathBuf, Vec<u8>)>> {
        match &self.path {
            Some(path) => {
                let bytes = self.doc.export(loro::ExportMode::Snapshot)?;
                Ok(Some((path.clone(), bytes)))
            }
            None => Ok(None),
        }
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }

    /// All rows of a sheet, ordered by id. Includes soft-deleted rows.
    pub fn rows(&self, sheet: &str) -> Result<Vec<StoredRow>> {
        let mut rows = Vec::new();

        if let LoroValue::Map(map) = self.doc.get_map(sheet).get_deep_value() {
            let mut ids: Vec<&String> = map.keys().collect();
            ids.sort();
            for id in ids {
                if let Some(LoroValue::Map(fields)) = map.get(id.as_str()) {
                    rows.push(stored_row_from_map(fields));
                }
            }
        }

        Ok(rows)
    }

    pub fn get(&self, sheet: &str, id: &str) -> Result<Option<StoredRow>> {
        if let LoroValue::Map(map) = self.doc.get_map(sheet).get_deep_value() {
            if let Some(LoroValue::Map(fields)) = map.get(id) {
                return Ok(Some(stored_row_from_map(fields)));
            }
        }
        Ok(None)
    }

    /// Overwrite the row with this id in place, or create it.
    ///
    /// With `expected_version`, the write only lands if the row's current
    /// version matches (a missing row has version 0).
    pub fn upsert(
        &self,
        sheet: &str,
        id: &str,
        row: &Row,
        expected_version: Option<u64>,
    ) -> Result<UpsertOutcome> {
        let mut converted = Vec::with_capacity(row.len());
        for (key, value) in row {
            if key == VERSION_KEY {
                continue;
            }
            converted.push((key.as_str(), json_to_loro(key, value)?));
        }

        let current = self.get(sheet, id)?;
        let current_version = current.as_ref().map(|r| r.version).unwrap_or(0);

        if let Some(expected) = expected_version {
            if expected != current_version {
                return Err(TaqueroError::VersionConflict {
                    id: id.to_string(),
                    expected,
                    actual: current_version,
                });
            }
        }

        let sheet_map = self.doc.get_map(sheet);
        let row_map = sheet_map.get_or_create_container(id, LoroMap::new())?;

        // Columns absent from the new row are cleared
        if let Some(existing) = &current {
            for key in existing.row.keys() {
                if !row.contains_key(key) {
                    row_map.delete(key)?;
                }
            }
        }

        for (key, value) in converted {
            row_map.insert(key, value)?;
        }

        let version = current_version + 1;
        row_map.insert(VERSION_KEY, version as i64)?;

        self.doc.commit();

        Ok(UpsertOutcome {
            created: current.is_none(),
            version,
        })
    }

    /// Physically remove a row
    pub fn remove(&self, sheet: &str, id: &str) -> Result<()> {
        let sheet_map = self.doc.get_map(sheet);

        match sheet_map.get(id) {
            Some(ValueOrContainer::Container(_)) => {}
            _ => return Err(TaqueroError::RecordNotFound(id.to_string())),
        }

        sheet_map.delete(id)?;
        self.doc.commit();
        Ok(())
    }

    pub fn row_count(&self, sheet: &str) -> usize {
        self.doc.get_map(sheet).len()
    }
}

fn stored_row_from_map(fields: &loro::LoroMapValue) -> StoredRow {
    let mut row = Row::new();
    let mut version = 0;

    for (key, value) in fields.iter() {
        if key == VERSION_KEY {
            if let LoroValue::I64(n) = value {
                version = *n as u64;
            }
            continue;
        }
        row.insert(key.to_string(), loro_to_json(value));
    }

    StoredRow { row, version }
}

fn json_to_loro(key: &str, value: &Value) -> Result<LoroValue> {
    let converted = match value {
        Value::Null => LoroValue::Null,
        Value::Bool(b) => LoroValue::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => LoroValue::from(i),
            None => LoroValue::from(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => LoroValue::from(s.as_str()),
        Value::Array(_) | Value::Object(_) => {
            return Err(TaqueroError::InvalidRow(format!(
                "column '{}' must hold a scalar value",
                key
            )))
        }
    };
    Ok(converted)
}

fn loro_to_json(value: &LoroValue) -> Value {
    match value {
        LoroValue::Bool(b) => Value::Bool(*b),
        LoroValue::I64(n) => Value::from(*n),
        LoroValue::Double(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        LoroValue::String(s) => Value::String(s.to_string()),
        _ => Value::Null,
    }
}
