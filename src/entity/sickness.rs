use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::RecordBase;

/// Hours a staff member must be symptom-free before returning to food handling.
pub const SYMPTOM_FREE_HOURS: i64 = 48;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffSickness {
    #[serde(flatten)]
    pub base: RecordBase,
    pub staff_name: String,
    pub symptoms: String,
    pub date_reported: NaiveDate,
    pub symptoms_ended: Option<NaiveDate>,
    pub return_to_work: Option<NaiveDate>,
}

impl StaffSickness {
    pub fn new(staff_name: String, symptoms: String, date_reported: NaiveDate) -> Self {
        Self {
            base: RecordBase::new(),
            staff_name,
            symptoms,
            date_reported,
            symptoms_ended: None,
            return_to_work: None,
        }
    }

    /// Earliest date the staff member may return, once symptoms have ended.
    pub fn earliest_return(&self) -> Option<NaiveDate> {
        self.symptoms_ended
            .map(|ended| ended + chrono::Duration::hours(SYMPTOM_FREE_HOURS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earliest_return_is_two_days_after_symptoms_end() {
        let mut record = StaffSickness::new(
            "Marta".to_string(),
            "vomiting".to_string(),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        );
        assert_eq!(record.earliest_return(), None);

        record.symptoms_ended = NaiveDate::from_ymd_opt(2026, 3, 2);
        assert_eq!(record.earliest_return(), NaiveDate::from_ymd_opt(2026, 3, 4));
    }
}
