use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::RecordBase;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleaningTask {
    #[serde(flatten)]
    pub base: RecordBase,
    pub area: String,
    pub task: String,
    pub check_date: NaiveDate,
    pub completed_by: String,
    pub notes: Option<String>,
}

impl CleaningTask {
    pub fn new(area: String, task: String, check_date: NaiveDate, completed_by: String) -> Self {
        Self {
            base: RecordBase::new(),
            area,
            task,
            check_date,
            completed_by,
            notes: None,
        }
    }
}
