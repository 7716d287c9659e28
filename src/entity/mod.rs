mod cleaning;
mod incident;
mod module;
pub mod proving;
mod sickness;
mod supplier;
mod temperature;

pub use cleaning::CleaningTask;
pub use incident::{IncidentReport, IncidentSeverity};
pub use module::{DeletePolicy, Module, SortKey};
pub use proving::{Batch, MethodStatus, ProvingKind, ProvingMethod, PROVING_BATCH_COUNT};
pub use sickness::StaffSickness;
pub use supplier::Supplier;
pub use temperature::{TemperatureLog, UnitKind};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a fresh record identifier.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Soft-delete marker stored in every sheet's status column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Active,
    Deleted,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Active => write!(f, "active"),
            RecordStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(RecordStatus::Active),
            "deleted" => Ok(RecordStatus::Deleted),
            _ => Err(format!("Invalid record status: {}", s)),
        }
    }
}

/// Base fields shared by all sheet records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordBase {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: RecordStatus,
    /// Seconds since epoch; only used as a sort key
    #[serde(default)]
    pub unix_timestamp: i64,
}

impl RecordBase {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            created_at: now,
            updated_at: now,
            status: RecordStatus::Active,
            unix_timestamp: now.timestamp(),
        }
    }
}

impl Default for RecordBase {
    fn default() -> Self {
        Self::new()
    }
}

/// A row type that can live in a sheet and in a client cache bucket.
pub trait SheetRecord: Serialize + DeserializeOwned + Clone {
    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    fn is_deleted(&self) -> bool;
    fn mark_deleted(&mut self, now: DateTime<Utc>);
    fn touch(&mut self, now: DateTime<Utc>);
}

macro_rules! impl_sheet_record {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SheetRecord for $ty {
                fn id(&self) -> &str {
                    &self.base.id
                }

                fn created_at(&self) -> DateTime<Utc> {
                    self.base.created_at
                }

                fn is_deleted(&self) -> bool {
                    self.base.status == RecordStatus::Deleted
                }

                fn mark_deleted(&mut self, now: DateTime<Utc>) {
                    self.base.status = RecordStatus::Deleted;
                    self.base.updated_at = now;
                }

                fn touch(&mut self, now: DateTime<Utc>) {
                    self.base.updated_at = now;
                }
            }
        )*
    };
}

impl_sheet_record!(TemperatureLog, CleaningTask, IncidentReport, Supplier, StaffSickness);
