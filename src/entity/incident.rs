use serde::{Deserialize, Serialize};

use super::RecordBase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IncidentSeverity {
    #[default]
    Low,
    Medium,
    High,
}

impl std::fmt::Display for IncidentSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentSeverity::Low => write!(f, "low"),
            IncidentSeverity::Medium => write!(f, "medium"),
            IncidentSeverity::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for IncidentSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(IncidentSeverity::Low),
            "medium" => Ok(IncidentSeverity::Medium),
            "high" => Ok(IncidentSeverity::High),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

/// Incident or customer complaint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentReport {
    #[serde(flatten)]
    pub base: RecordBase,
    pub incident_type: String,
    pub description: String,
    pub reported_by: String,
    #[serde(default)]
    pub severity: IncidentSeverity,
    pub action_taken: Option<String>,
}

impl IncidentReport {
    pub fn new(incident_type: String, description: String, reported_by: String) -> Self {
        Self {
            base: RecordBase::new(),
            incident_type,
            description,
            reported_by,
            severity: IncidentSeverity::default(),
            action_taken: None,
        }
    }
}
