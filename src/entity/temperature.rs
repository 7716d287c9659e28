use serde::{Deserialize, Serialize};

use super::RecordBase;

/// Kind of equipment or check a reading was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UnitKind {
    #[default]
    Fridge,
    Freezer,
    HotHold,
    Delivery,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::Fridge => write!(f, "fridge"),
            UnitKind::Freezer => write!(f, "freezer"),
            UnitKind::HotHold => write!(f, "hot-hold"),
            UnitKind::Delivery => write!(f, "delivery"),
        }
    }
}

impl std::str::FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "fridge" => Ok(UnitKind::Fridge),
            "freezer" => Ok(UnitKind::Freezer),
            "hot-hold" | "hothold" => Ok(UnitKind::HotHold),
            "delivery" => Ok(UnitKind::Delivery),
            _ => Err(format!("Invalid unit kind: {}", s)),
        }
    }
}

impl UnitKind {
    /// Whether a reading in degrees Celsius is within the safe range.
    pub fn is_safe(&self, celsius: f64) -> bool {
        match self {
            UnitKind::Fridge | UnitKind::Delivery => celsius <= 5.0,
            UnitKind::Freezer => celsius <= -15.0,
            UnitKind::HotHold => celsius >= 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureLog {
    #[serde(flatten)]
    pub base: RecordBase,
    pub unit: UnitKind,
    pub location: String,
    pub temperature: f64,
    pub checked_by: String,
    pub corrective_action: Option<String>,
}

impl TemperatureLog {
    pub fn new(unit: UnitKind, location: String, temperature: f64, checked_by: String) -> Self {
        Self {
            base: RecordBase::new(),
            unit,
            location,
            temperature,
            checked_by,
            corrective_action: None,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.unit.is_safe(self.temperature)
    }
}
