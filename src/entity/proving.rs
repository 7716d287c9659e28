//! Proving methods: a cooking, cooling or reheating procedure is trusted for
//! routine use once it has been carried out and measured three times.
//!
//! The batch count is the only thing that decides whether a method is proven.
//! A `status` value supplied by a caller is never taken at face value; see
//! [`ProvingMethod::record_batch`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{new_record_id, RecordStatus, SheetRecord};

/// Number of recorded batches that proves a method.
pub const PROVING_BATCH_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvingKind {
    Cooking,
    Cooling,
    Reheating,
}

impl ProvingKind {
    pub const ALL: [ProvingKind; 3] = [
        ProvingKind::Cooking,
        ProvingKind::Cooling,
        ProvingKind::Reheating,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            ProvingKind::Cooking => "cooking",
            ProvingKind::Cooling => "cooling",
            ProvingKind::Reheating => "reheating",
        }
    }

    pub fn methods_sheet(&self) -> &'static str {
        match self {
            ProvingKind::Cooking => "CookingMethods",
            ProvingKind::Cooling => "CoolingMethods",
            ProvingKind::Reheating => "ReheatingMethods",
        }
    }

    pub fn batches_sheet(&self) -> &'static str {
        match self {
            ProvingKind::Cooking => "CookingBatches",
            ProvingKind::Cooling => "CoolingBatches",
            ProvingKind::Reheating => "ReheatingBatches",
        }
    }

    /// Whether a batch's final temperature meets the target for this procedure.
    pub fn target_met(&self, batch: &Batch) -> bool {
        match self {
            ProvingKind::Cooking | ProvingKind::Reheating => batch.end_temp >= 75.0,
            ProvingKind::Cooling => batch.end_temp <= 8.0,
        }
    }
}

impl std::fmt::Display for ProvingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl std::str::FromStr for ProvingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cooking" | "cook" => Ok(ProvingKind::Cooking),
            "cooling" | "cool" => Ok(ProvingKind::Cooling),
            "reheating" | "reheat" => Ok(ProvingKind::Reheating),
            _ => Err(format!("Invalid proving kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MethodStatus {
    #[default]
    InProgress,
    Proven,
    Deleted,
}

impl std::fmt::Display for MethodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodStatus::InProgress => write!(f, "in-progress"),
            MethodStatus::Proven => write!(f, "proven"),
            MethodStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for MethodStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "in-progress" | "inprogress" => Ok(MethodStatus::InProgress),
            "proven" => Ok(MethodStatus::Proven),
            "deleted" => Ok(MethodStatus::Deleted),
            _ => Err(format!("Invalid method status: {}", s)),
        }
    }
}

/// One time/temperature measurement submitted toward proving a method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub method_id: String,
    /// Assigned by the caller; gaps and duplicates are accepted
    pub batch_number: u32,
    pub date: NaiveDate,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub start_temp: f64,
    #[serde(default)]
    pub end_time: String,
    pub end_temp: f64,
    pub checked_by: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub unix_timestamp: i64,
}

impl Batch {
    pub fn new(method_id: String, batch_number: u32, checked_by: String) -> Self {
        let now = Utc::now();
        Self {
            id: new_record_id(),
            method_id,
            batch_number,
            date: now.date_naive(),
            start_time: String::new(),
            start_temp: 0.0,
            end_time: String::new(),
            end_temp: 0.0,
            checked_by,
            notes: None,
            created_at: now,
            status: RecordStatus::Active,
            unix_timestamp: now.timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvingMethod {
    pub id: String,
    pub food_item: String,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: MethodStatus,
    #[serde(default)]
    pub proven_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unix_timestamp: i64,
    /// Embedded on read; stored in a separate sheet
    #[serde(default)]
    pub batches: Vec<Batch>,
}

impl ProvingMethod {
    pub fn new(food_item: String, description: String, created_by: String) -> Self {
        let now = Utc::now();
        Self {
            id: new_record_id(),
            food_item,
            description,
            created_by,
            created_at: now,
            updated_at: now,
            status: MethodStatus::InProgress,
            proven_at: None,
            unix_timestamp: now.timestamp(),
            batches: Vec::new(),
        }
    }

    /// Add a batch (or replace the one with the same id) and re-evaluate
    /// the method status.
    ///
    /// An in-progress method becomes proven once it holds
    /// [`PROVING_BATCH_COUNT`] batches, whatever their batch numbers.
    /// A proven method stays proven and keeps its original `proven_at`;
    /// only [`ProvingMethod::reset`] moves it back to in-progress.
    pub fn record_batch(&mut self, batch: Batch, now: DateTime<Utc>) -> MethodStatus {
        match self.batches.iter_mut().find(|b| b.id == batch.id) {
            Some(existing) => *existing = batch,
            None => self.batches.push(batch),
        }
        self.batches
            .sort_by(|a, b| a.batch_number.cmp(&b.batch_number).then(a.created_at.cmp(&b.created_at)));
        self.updated_at = now;

        if self.status == MethodStatus::InProgress && self.batches.len() >= PROVING_BATCH_COUNT {
            self.status = MethodStatus::Proven;
            self.proven_at = Some(now);
        }

        self.status
    }

    /// Explicit return to in-progress with all batches cleared.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.batches.clear();
        self.proven_at = None;
        self.updated_at = now;
        if self.status != MethodStatus::Deleted {
            self.status = MethodStatus::InProgress;
        }
    }

    pub fn next_batch_number(&self) -> u32 {
        self.batches
            .iter()
            .map(|b| b.batch_number)
            .max()
            .unwrap_or(0)
            + 1
    }

    pub fn batches_remaining(&self) -> usize {
        PROVING_BATCH_COUNT.saturating_sub(self.batches.len())
    }
}

impl SheetRecord for ProvingMethod {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn is_deleted(&self) -> bool {
        self.status == MethodStatus::Deleted
    }

    fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.status = MethodStatus::Deleted;
        self.updated_at = now;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
