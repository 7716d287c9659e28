//! Proving-method endpoints. Methods and batches live in two sheets per
//! proving kind; reads embed each method's batches.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use super::{
    check_required, into_row, is_deleted, read_rows, row_id, stamp_row, take_expected_version,
    typed_row, ReadResponse, WriteReceipt,
};
use crate::entity::{
    Batch, MethodStatus, ProvingKind, ProvingMethod, SortKey, PROVING_BATCH_COUNT,
};
use crate::error::{Result, TaqueroError};
use crate::storage::{LoroSheetStore, Row};

pub const METHOD_REQUIRED_FIELDS: &[&str] = &["id", "foodItem", "description", "createdBy"];
pub const BATCH_REQUIRED_FIELDS: &[&str] =
    &["id", "methodId", "batchNumber", "date", "endTemp", "checkedBy"];

/// Result of recording a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReceipt {
    pub batch_id: String,
    pub method_id: String,
    pub batch_count: usize,
    pub status: MethodStatus,
    pub message: String,
}

/// GET: non-deleted methods, newest first, each with its batches.
pub fn read_methods(store: &LoroSheetStore, kind: ProvingKind) -> ReadResponse {
    match load_methods(store, kind) {
        Ok(methods) => {
            let mut data = Vec::with_capacity(methods.len());
            for method in methods {
                match serde_json::to_value(&method) {
                    Ok(value) => data.push(value),
                    Err(e) => return ReadResponse::failure(e),
                }
            }
            ReadResponse::ok(data)
        }
        Err(e) => {
            warn!(kind = %kind, error = %e, "read methods failed");
            ReadResponse::failure(e)
        }
    }
}

pub fn load_methods(store: &LoroSheetStore, kind: ProvingKind) -> Result<Vec<ProvingMethod>> {
    let batches = load_batches(store, kind)?;
    let mut methods = Vec::new();

    for row in read_rows(store, kind.methods_sheet(), SortKey::CreatedAt)? {
        let mut method: ProvingMethod = serde_json::from_value(Value::Object(row))?;
        method.batches = batches
            .iter()
            .filter(|b| b.method_id == method.id)
            .cloned()
            .collect();
        methods.push(method);
    }

    Ok(methods)
}

/// A single non-deleted method with its batches.
pub fn load_method(store: &LoroSheetStore, kind: ProvingKind, id: &str) -> Result<ProvingMethod> {
    let stored = store
        .get(kind.methods_sheet(), id)?
        .filter(|s| !is_deleted(&s.row))
        .ok_or_else(|| TaqueroError::MethodNotFound(id.to_string()))?;

    let mut method: ProvingMethod = serde_json::from_value(Value::Object(stored.row))?;
    method.batches = load_batches(store, kind)?
        .into_iter()
        .filter(|b| b.method_id == id)
        .collect();
    Ok(method)
}

fn load_batches(store: &LoroSheetStore, kind: ProvingKind) -> Result<Vec<Batch>> {
    let mut batches = Vec::new();
    for row in read_rows(store, kind.batches_sheet(), SortKey::CreatedAt)? {
        batches.push(serde_json::from_value::<Batch>(Value::Object(row))?);
    }
    batches.sort_by(|a, b| {
        a.batch_number
            .cmp(&b.batch_number)
            .then(a.created_at.cmp(&b.created_at))
    });
    Ok(batches)
}

/// POST a method. Status and `provenAt` are owned by the batch count: a
/// caller may only request `deleted`, anything else keeps the stored value.
pub fn write_method(store: &LoroSheetStore, kind: ProvingKind, body: Value) -> Result<WriteReceipt> {
    write_method_at(store, kind, body, Utc::now())
}

pub fn write_method_at(
    store: &LoroSheetStore,
    kind: ProvingKind,
    body: Value,
    now: DateTime<Utc>,
) -> Result<WriteReceipt> {
    let mut row = into_row(body)?;
    let expected_version = take_expected_version(&mut row)?;
    row.remove("batches");
    check_required(&row, METHOD_REQUIRED_FIELDS)?;
    let id = row_id(&row, "id")?;
    let sheet = kind.methods_sheet();

    let existing = store.get(sheet, &id)?;
    let deleting = is_deleted(&row);

    if deleting && existing.is_none() {
        return Err(TaqueroError::MethodNotFound(id));
    }

    if !deleting {
        let stored_status = existing
            .as_ref()
            .and_then(|s| s.row.get("status").cloned())
            .unwrap_or_else(|| Value::String(MethodStatus::InProgress.to_string()));
        let stored_proven_at = existing
            .as_ref()
            .and_then(|s| s.row.get("provenAt").cloned())
            .unwrap_or(Value::Null);

        if let Some(requested) = row.get("status").and_then(Value::as_str) {
            if Some(requested) != stored_status.as_str() {
                warn!(
                    kind = %kind,
                    id = %id,
                    requested,
                    "ignoring caller-supplied method status"
                );
            }
        }
        row.insert("status".to_string(), stored_status);
        row.insert("provenAt".to_string(), stored_proven_at);
    }

    stamp_row(&mut row, existing.as_ref().map(|s| &s.row), now);
    typed_row::<ProvingMethod>(&row)?;
    let outcome = store.upsert(sheet, &id, &row, expected_version)?;

    let verb = if outcome.created {
        "Created"
    } else if deleting {
        "Deleted"
    } else {
        "Updated"
    };
    info!(kind = %kind, id = %id, "{} method", verb.to_lowercase());

    Ok(WriteReceipt {
        message: format!("{} method {}", verb, id),
        id,
        created: outcome.created,
        removed: false,
        version: Some(outcome.version),
    })
}

/// POST a batch against an existing method and re-evaluate its status.
pub fn record_batch(store: &LoroSheetStore, kind: ProvingKind, body: Value) -> Result<BatchReceipt> {
    record_batch_at(store, kind, body, Utc::now())
}

pub fn record_batch_at(
    store: &LoroSheetStore,
    kind: ProvingKind,
    body: Value,
    now: DateTime<Utc>,
) -> Result<BatchReceipt> {
    let mut row = into_row(body)?;
    check_required(&row, BATCH_REQUIRED_FIELDS)?;
    let batch_id = row_id(&row, "id")?;
    let method_id = row_id(&row, "methodId")?;

    let mut method = load_method(store, kind, &method_id)?;

    let existing = store.get(kind.batches_sheet(), &batch_id)?;
    let owner = existing
        .as_ref()
        .and_then(|s| s.row.get("methodId"))
        .and_then(Value::as_str);
    if owner.is_some_and(|owner| owner != method_id) {
        return Err(TaqueroError::DuplicateId(batch_id));
    }

    stamp_row(&mut row, existing.as_ref().map(|s| &s.row), now);
    row.remove("updatedAt");
    let batch: Batch = typed_row(&row)?;

    let status = method.record_batch(batch.clone(), now);

    store.upsert(kind.batches_sheet(), &batch_id, &to_row(&batch)?, None)?;
    store.upsert(kind.methods_sheet(), &method_id, &method_row(&method)?, None)?;

    let batch_count = method.batches.len();
    let message = if status == MethodStatus::Proven {
        format!("Method {} proven", method_id)
    } else {
        format!(
            "Batch {} of {} recorded for {}",
            batch_count, PROVING_BATCH_COUNT, method_id
        )
    };
    info!(kind = %kind, method = %method_id, batch = %batch_id, count = batch_count, status = %status, "batch recorded");

    Ok(BatchReceipt {
        batch_id,
        method_id,
        batch_count,
        status,
        message,
    })
}

/// Move a method back to in-progress, soft-deleting its batches.
pub fn reset_method(store: &LoroSheetStore, kind: ProvingKind, id: &str) -> Result<WriteReceipt> {
    reset_method_at(store, kind, id, Utc::now())
}

pub fn reset_method_at(
    store: &LoroSheetStore,
    kind: ProvingKind,
    id: &str,
    now: DateTime<Utc>,
) -> Result<WriteReceipt> {
    let mut method = load_method(store, kind, id)?;

    for batch in &method.batches {
        let mut cleared = batch.clone();
        cleared.status = crate::entity::RecordStatus::Deleted;
        store.upsert(kind.batches_sheet(), &cleared.id, &to_row(&cleared)?, None)?;
    }

    let cleared = method.batches.len();
    method.reset(now);
    let outcome = store.upsert(kind.methods_sheet(), id, &method_row(&method)?, None)?;
    info!(kind = %kind, id = %id, cleared, "method reset");

    Ok(WriteReceipt {
        id: id.to_string(),
        created: false,
        removed: false,
        version: Some(outcome.version),
        message: format!("Reset method {} ({} batches cleared)", id, cleared),
    })
}

fn to_row<T: serde::Serialize>(value: &T) -> Result<Row> {
    into_row(serde_json::to_value(value)?)
}

fn method_row(method: &ProvingMethod) -> Result<Row> {
    let mut row = to_row(method)?;
    row.remove("batches");
    Ok(row)
}
