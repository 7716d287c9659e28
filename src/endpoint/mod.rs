//! Per-module read and write endpoints over the sheet store.
//!
//! These functions hold the behavior of each module's remote endpoint and are
//! shared by the HTTP server and the CLI. Reads never fail outright: errors
//! are folded into a [`ReadResponse`] with `success: false`.

pub mod proving;

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::entity::{
    CleaningTask, DeletePolicy, IncidentReport, Module, SortKey, StaffSickness, Supplier,
    TemperatureLog,
};
use crate::error::{Result, TaqueroError};
use crate::storage::{LoroSheetStore, Row};

/// Body field carrying an optional compare-and-swap version. Never stored.
pub const EXPECTED_VERSION_FIELD: &str = "expectedVersion";

/// Response body for a module read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadResponse {
    pub fn ok(data: Vec<Value>) -> Self {
        Self {
            success: true,
            count: Some(data.len()),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            count: None,
            error: Some(error.to_string()),
        }
    }
}

/// Response body for a module write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriteResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.to_string()),
        }
    }
}

/// What a successful write did to the sheet
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReceipt {
    pub id: String,
    pub created: bool,
    pub removed: bool,
    /// Row version after the write; `None` once the row is gone
    pub version: Option<u64>,
    pub message: String,
}

/// GET: all non-deleted rows, newest first by the module's sort key.
pub fn read(store: &LoroSheetStore, module: Module) -> ReadResponse {
    match read_rows(store, module.sheet_name(), module.sort_key()) {
        Ok(rows) => {
            debug!(module = %module, count = rows.len(), "read rows");
            ReadResponse::ok(rows.into_iter().map(Value::Object).collect())
        }
        Err(e) => {
            warn!(module = %module, error = %e, "read failed");
            ReadResponse::failure(e)
        }
    }
}

/// Non-deleted rows of a sheet sorted descending by `sort`.
pub fn read_rows(store: &LoroSheetStore, sheet: &str, sort: SortKey) -> Result<Vec<Row>> {
    let mut rows: Vec<Row> = store
        .rows(sheet)?
        .into_iter()
        .map(|stored| stored.row)
        .filter(|row| !is_deleted(row))
        .collect();

    let field = sort.field();
    rows.sort_by(|a, b| compare_desc(a.get(field), b.get(field)));
    Ok(rows)
}

/// POST: validate, then overwrite the row with the same id or create it.
pub fn write(store: &LoroSheetStore, module: Module, body: Value) -> Result<WriteReceipt> {
    write_at(store, module, body, Utc::now())
}

pub fn write_at(
    store: &LoroSheetStore,
    module: Module,
    body: Value,
    now: DateTime<Utc>,
) -> Result<WriteReceipt> {
    let mut row = into_row(body)?;
    let expected_version = take_expected_version(&mut row)?;
    check_required(&row, module.required_fields())?;
    let id = row_id(&row, "id")?;
    let sheet = module.sheet_name();

    let existing = store.get(sheet, &id)?;

    if is_deleted(&row) {
        let Some(current) = &existing else {
            return Err(TaqueroError::RecordNotFound(id));
        };
        if module.delete_policy() == DeletePolicy::Hard {
            if let Some(expected) = expected_version {
                if expected != current.version {
                    return Err(TaqueroError::VersionConflict {
                        id,
                        expected,
                        actual: current.version,
                    });
                }
            }
            store.remove(sheet, &id)?;
            info!(module = %module, id = %id, "row removed");
            return Ok(WriteReceipt {
                message: format!("Deleted {}", id),
                id,
                created: false,
                removed: true,
                version: None,
            });
        }
    }

    stamp_row(&mut row, existing.as_ref().map(|s| &s.row), now);
    check_record_type(module, &row)?;
    let outcome = store.upsert(sheet, &id, &row, expected_version)?;

    let verb = if outcome.created {
        "Created"
    } else if is_deleted(&row) {
        "Deleted"
    } else {
        "Updated"
    };
    info!(module = %module, id = %id, version = outcome.version, "{}", verb.to_lowercase());

    Ok(WriteReceipt {
        message: format!("{} {}", verb, id),
        id,
        created: outcome.created,
        removed: false,
        version: Some(outcome.version),
    })
}

/// A row must read back as the module's record type, or clients could
/// never load it.
fn check_record_type(module: Module, row: &Row) -> Result<()> {
    match module {
        Module::TemperatureLogs => typed_row::<TemperatureLog>(row).map(drop),
        Module::CleaningChecklists => typed_row::<CleaningTask>(row).map(drop),
        Module::IncidentReports => typed_row::<IncidentReport>(row).map(drop),
        Module::Suppliers => typed_row::<Supplier>(row).map(drop),
        Module::StaffSickness => typed_row::<StaffSickness>(row).map(drop),
    }
}

pub(crate) fn typed_row<T: DeserializeOwned>(row: &Row) -> Result<T> {
    serde_json::from_value(Value::Object(row.clone()))
        .map_err(|e| TaqueroError::InvalidRow(e.to_string()))
}

pub(crate) fn into_row(body: Value) -> Result<Row> {
    match body {
        Value::Object(map) => Ok(map),
        other => Err(TaqueroError::InvalidRow(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

pub(crate) fn take_expected_version(row: &mut Row) -> Result<Option<u64>> {
    match row.remove(EXPECTED_VERSION_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
            TaqueroError::InvalidRow(format!("{} must be a non-negative integer", EXPECTED_VERSION_FIELD))
        }),
        Some(_) => Err(TaqueroError::InvalidRow(format!(
            "{} must be a non-negative integer",
            EXPECTED_VERSION_FIELD
        ))),
    }
}

/// A field counts as missing when absent, null or an empty string.
pub(crate) fn check_required(row: &Row, fields: &[&str]) -> Result<()> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|field| match row.get(**field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(|field| field.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(TaqueroError::MissingFields(missing))
    }
}

pub(crate) fn row_id(row: &Row, field: &str) -> Result<String> {
    match row.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(TaqueroError::InvalidRow(format!("{} must be a string", field))),
    }
}

pub(crate) fn is_deleted(row: &Row) -> bool {
    row.get("status").and_then(Value::as_str) == Some("deleted")
}

/// Fill bookkeeping columns: `updatedAt` always, `createdAt`, `status` and
/// `unixTimestamp` only when the caller left them out.
pub(crate) fn stamp_row(row: &mut Row, existing: Option<&Row>, now: DateTime<Utc>) {
    row.insert("updatedAt".to_string(), Value::String(now.to_rfc3339()));

    if is_blank(row.get("createdAt")) {
        let created = existing
            .and_then(|r| r.get("createdAt"))
            .filter(|v| !is_blank(Some(v)))
            .cloned()
            .unwrap_or_else(|| Value::String(now.to_rfc3339()));
        row.insert("createdAt".to_string(), created);
    }

    if is_blank(row.get("status")) {
        row.insert("status".to_string(), Value::String("active".to_string()));
    }

    if is_blank(row.get("unixTimestamp")) {
        let seconds = row
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .unwrap_or(now)
            .timestamp();
        row.insert("unixTimestamp".to_string(), Value::from(seconds));
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Descending order; rows missing the key sort last.
pub(crate) fn compare_desc(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (sort_value(a), sort_value(b)) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, PartialEq)]
enum SortValue {
    Number(f64),
    Time(DateTime<Utc>),
    Text(String),
}

impl Eq for SortValue {}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            (SortValue::Time(a), SortValue::Time(b)) => a.cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            // Mixed column types: numbers before times before text
            (SortValue::Number(_), _) => Ordering::Greater,
            (_, SortValue::Number(_)) => Ordering::Less,
            (SortValue::Time(_), _) => Ordering::Greater,
            (_, SortValue::Time(_)) => Ordering::Less,
        }
    }
}

fn sort_value(value: Option<&Value>) -> Option<SortValue> {
    match value? {
        Value::Number(n) => n.as_f64().map(SortValue::Number),
        Value::String(s) if s.is_empty() => None,
        // Numeric strings rank with the numbers of the same column
        Value::String(s) => Some(match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => SortValue::Number(n),
            _ => match parse_timestamp(s) {
                Some(t) => SortValue::Time(t),
                None => SortValue::Text(s.clone()),
            },
        }),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp(id: &str, temp: f64, unix: i64) -> Value {
        json!({
            "id": id,
            "unit": "fridge",
            "location": "Walk-in",
            "temperature": temp,
            "checkedBy": "Ana",
            "unixTimestamp": unix,
        })
    }

    #[test]
    fn test_resubmit_with_same_id_overwrites() {
        let store = LoroSheetStore::in_memory();

        write(&store, Module::TemperatureLogs, temp("a1", 4.0, 100)).unwrap();
        let receipt = write(&store, Module::TemperatureLogs, temp("a1", 6.0, 100)).unwrap();
        assert!(!receipt.created);

        let response = read(&store, Module::TemperatureLogs);
        let data = response.data.unwrap();
        assert_eq!(response.count, Some(1));
        assert_eq!(data[0]["id"], "a1");
        assert_eq!(data[0]["temperature"], json!(6.0));
    }

    #[test]
    fn test_missing_required_fields_writes_nothing() {
        let store = LoroSheetStore::in_memory();
        let body = json!({"id": "a1", "unit": "fridge", "location": "", "temperature": 3});

        let result = write(&store, Module::TemperatureLogs, body);
        match result {
            Err(TaqueroError::MissingFields(fields)) => {
                assert_eq!(fields, vec!["location".to_string(), "checkedBy".to_string()]);
            }
            other => panic!("expected MissingFields, got {:?}", other),
        }
        assert_eq!(store.row_count(Module::TemperatureLogs.sheet_name()), 0);
    }

    #[test]
    fn test_soft_deleted_rows_never_read() {
        let store = LoroSheetStore::in_memory();
        write(&store, Module::TemperatureLogs, temp("a1", 4.0, 100)).unwrap();
        write(&store, Module::TemperatureLogs, temp("a2", 3.0, 200)).unwrap();

        let mut deleted = temp("a1", 4.0, 100);
        deleted["status"] = json!("deleted");
        let receipt = write(&store, Module::TemperatureLogs, deleted).unwrap();
        assert_eq!(receipt.message, "Deleted a1");

        let data = read(&store, Module::TemperatureLogs).data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["id"], "a2");
        // Still physically present
        assert_eq!(store.row_count(Module::TemperatureLogs.sheet_name()), 2);
    }

    #[test]
    fn test_hard_delete_module_removes_row() {
        let store = LoroSheetStore::in_memory();
        let supplier = json!({"id": "s1", "name": "Farm", "contactName": "Jo", "phone": "555"});
        write(&store, Module::Suppliers, supplier.clone()).unwrap();

        let mut delete = supplier.clone();
        delete["status"] = json!("deleted");
        let receipt = write(&store, Module::Suppliers, delete.clone()).unwrap();
        assert!(receipt.removed);
        assert_eq!(store.row_count(Module::Suppliers.sheet_name()), 0);

        let again = write(&store, Module::Suppliers, delete);
        assert!(matches!(again, Err(TaqueroError::RecordNotFound(_))));
    }

    #[test]
    fn test_read_sorted_descending_by_module_key() {
        let store = LoroSheetStore::in_memory();
        write(&store, Module::TemperatureLogs, temp("old", 4.0, 100)).unwrap();
        write(&store, Module::TemperatureLogs, temp("new", 4.0, 300)).unwrap();
        write(&store, Module::TemperatureLogs, temp("mid", 4.0, 200)).unwrap();

        let ids: Vec<String> = read(&store, Module::TemperatureLogs)
            .data
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_cleaning_sorted_by_check_date() {
        let store = LoroSheetStore::in_memory();
        for (id, date) in [("c1", "2026-01-05"), ("c2", "2026-02-01"), ("c3", "2025-12-31")] {
            let body = json!({
                "id": id, "area": "Kitchen", "task": "Floors",
                "checkDate": date, "completedBy": "Sam",
            });
            write(&store, Module::CleaningChecklists, body).unwrap();
        }

        let data = read(&store, Module::CleaningChecklists).data.unwrap();
        assert_eq!(data[0]["id"], "c2");
        assert_eq!(data[2]["id"], "c3");
    }

    #[test]
    fn test_write_stamps_bookkeeping_columns() {
        let store = LoroSheetStore::in_memory();
        let now = DateTime::parse_from_rfc3339("2026-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let body = json!({
            "id": "i1", "incidentType": "complaint",
            "description": "Cold soup", "reportedBy": "FOH",
        });

        write_at(&store, Module::IncidentReports, body, now).unwrap();
        let row = store.get("IncidentReports", "i1").unwrap().unwrap().row;

        assert_eq!(row["status"], "active");
        assert_eq!(row["createdAt"], now.to_rfc3339());
        assert_eq!(row["unixTimestamp"], json!(now.timestamp()));
    }

    #[test]
    fn test_update_keeps_original_created_at() {
        let store = LoroSheetStore::in_memory();
        let first = DateTime::parse_from_rfc3339("2026-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let body = json!({
            "id": "i1", "incidentType": "complaint",
            "description": "Cold soup", "reportedBy": "FOH",
        });
        write_at(&store, Module::IncidentReports, body.clone(), first).unwrap();
        write_at(&store, Module::IncidentReports, body, first + chrono::Duration::hours(1)).unwrap();

        let row = store.get("IncidentReports", "i1").unwrap().unwrap().row;
        assert_eq!(row["createdAt"], first.to_rfc3339());
    }

    #[test]
    fn test_expected_version_is_enforced_and_not_stored() {
        let store = LoroSheetStore::in_memory();
        write(&store, Module::TemperatureLogs, temp("a1", 4.0, 100)).unwrap();

        let mut stale = temp("a1", 9.0, 100);
        stale[EXPECTED_VERSION_FIELD] = json!(0);
        let result = write(&store, Module::TemperatureLogs, stale);
        assert!(matches!(result, Err(TaqueroError::VersionConflict { .. })));

        let mut current = temp("a1", 5.0, 100);
        current[EXPECTED_VERSION_FIELD] = json!(1);
        let receipt = write(&store, Module::TemperatureLogs, current).unwrap();
        assert_eq!(receipt.version, Some(2));

        let row = store.get("TemperatureLogs", "a1").unwrap().unwrap().row;
        assert!(!row.contains_key(EXPECTED_VERSION_FIELD));
    }

    #[test]
    fn test_stale_hard_delete_conflicts() {
        let store = LoroSheetStore::in_memory();
        let supplier = json!({"id": "s1", "name": "Farm", "contactName": "Jo", "phone": "555"});
        write(&store, Module::Suppliers, supplier.clone()).unwrap();
        write(&store, Module::Suppliers, supplier.clone()).unwrap();

        let mut stale = supplier.clone();
        stale["status"] = json!("deleted");
        stale[EXPECTED_VERSION_FIELD] = json!(1);
        let result = write(&store, Module::Suppliers, stale);
        assert!(matches!(
            result,
            Err(TaqueroError::VersionConflict { expected: 1, actual: 2, .. })
        ));
        assert_eq!(store.row_count(Module::Suppliers.sheet_name()), 1);

        let mut current = supplier;
        current["status"] = json!("deleted");
        current[EXPECTED_VERSION_FIELD] = json!(2);
        let receipt = write(&store, Module::Suppliers, current).unwrap();
        assert!(receipt.removed);
    }

    #[test]
    fn test_row_of_wrong_type_rejected() {
        let store = LoroSheetStore::in_memory();
        let mut body = temp("a1", 4.0, 100);
        body["temperature"] = json!("warm");

        let result = write(&store, Module::TemperatureLogs, body);
        assert!(matches!(result, Err(TaqueroError::InvalidRow(_))));
        assert_eq!(store.row_count(Module::TemperatureLogs.sheet_name()), 0);

        let bad_date = json!({
            "id": "c1", "area": "Kitchen", "task": "Floors",
            "checkDate": "last tuesday", "completedBy": "Sam",
        });
        let result = write(&store, Module::CleaningChecklists, bad_date);
        assert!(matches!(result, Err(TaqueroError::InvalidRow(_))));
    }

    #[test]
    fn test_numeric_string_sorts_with_numbers() {
        let store = LoroSheetStore::in_memory();
        write(&store, Module::TemperatureLogs, temp("a1", 4.0, 100)).unwrap();
        write(&store, Module::TemperatureLogs, temp("a3", 4.0, 300)).unwrap();

        // Stored by an older client with the timestamp as text
        let Value::Object(mut row) = temp("a2", 4.0, 0) else { unreachable!() };
        row.insert("unixTimestamp".to_string(), json!("200"));
        row.insert("status".to_string(), json!("active"));
        store.upsert(Module::TemperatureLogs.sheet_name(), "a2", &row, None).unwrap();

        let ids: Vec<String> = read(&store, Module::TemperatureLogs)
            .data
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a3", "a2", "a1"]);
    }

    #[test]
    fn test_non_object_body_rejected() {
        let store = LoroSheetStore::in_memory();
        let result = write(&store, Module::TemperatureLogs, json!([1, 2]));
        assert!(matches!(result, Err(TaqueroError::InvalidRow(_))));
    }

    #[test]
    fn test_read_response_wire_shape() {
        let failure = serde_json::to_value(ReadResponse::failure("sheet missing")).unwrap();
        assert_eq!(failure, json!({"success": false, "error": "sheet missing"}));

        let ok = serde_json::to_value(ReadResponse::ok(vec![json!({"id": "a"})])).unwrap();
        assert_eq!(ok["count"], 1);
    }
}
