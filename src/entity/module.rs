use serde::{Deserialize, Serialize};

/// Column used to order a sheet's rows, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CreatedAt,
    UnixTimestamp,
    Field(&'static str),
}

impl SortKey {
    pub fn field(&self) -> &'static str {
        match self {
            SortKey::CreatedAt => "createdAt",
            SortKey::UnixTimestamp => "unixTimestamp",
            SortKey::Field(name) => name,
        }
    }
}

/// How a `status: deleted` write is applied to the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Row stays in the sheet with its status column set to `deleted`
    Soft,
    /// Row is physically removed
    Hard,
}

/// A sheet-backed record module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Module {
    TemperatureLogs,
    CleaningChecklists,
    IncidentReports,
    Suppliers,
    StaffSickness,
}

impl Module {
    pub const ALL: [Module; 5] = [
        Module::TemperatureLogs,
        Module::CleaningChecklists,
        Module::IncidentReports,
        Module::Suppliers,
        Module::StaffSickness,
    ];

    /// URL and config slug
    pub fn slug(&self) -> &'static str {
        match self {
            Module::TemperatureLogs => "temperature-logs",
            Module::CleaningChecklists => "cleaning-checklists",
            Module::IncidentReports => "incident-reports",
            Module::Suppliers => "suppliers",
            Module::StaffSickness => "staff-sickness",
        }
    }

    pub fn sheet_name(&self) -> &'static str {
        match self {
            Module::TemperatureLogs => "TemperatureLogs",
            Module::CleaningChecklists => "CleaningChecklists",
            Module::IncidentReports => "IncidentReports",
            Module::Suppliers => "Suppliers",
            Module::StaffSickness => "StaffSickness",
        }
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Module::TemperatureLogs => &["id", "unit", "location", "temperature", "checkedBy"],
            Module::CleaningChecklists => &["id", "area", "task", "checkDate", "completedBy"],
            Module::IncidentReports => &["id", "incidentType", "description", "reportedBy"],
            Module::Suppliers => &["id", "name", "contactName", "phone"],
            Module::StaffSickness => &["id", "staffName", "symptoms", "dateReported"],
        }
    }

    pub fn sort_key(&self) -> SortKey {
        match self {
            Module::TemperatureLogs => SortKey::UnixTimestamp,
            Module::CleaningChecklists => SortKey::Field("checkDate"),
            Module::IncidentReports | Module::Suppliers | Module::StaffSickness => {
                SortKey::CreatedAt
            }
        }
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        match self {
            Module::Suppliers => DeletePolicy::Hard,
            _ => DeletePolicy::Soft,
        }
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl std::str::FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "temperature-logs" | "temperature" | "temperatures" => Ok(Module::TemperatureLogs),
            "cleaning-checklists" | "cleaning" => Ok(Module::CleaningChecklists),
            "incident-reports" | "incidents" | "incident" => Ok(Module::IncidentReports),
            "suppliers" | "supplier" => Ok(Module::Suppliers),
            "staff-sickness" | "sickness" => Ok(Module::StaffSickness),
            _ => Err(format!("Unknown module: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_round_trips_through_from_str() {
        for module in Module::ALL {
            assert_eq!(module.slug().parse::<Module>().unwrap(), module);
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("cleaning".parse::<Module>().unwrap(), Module::CleaningChecklists);
        assert_eq!("STAFF_SICKNESS".parse::<Module>().unwrap(), Module::StaffSickness);
        assert!("payroll".parse::<Module>().is_err());
    }

    #[test]
    fn test_every_module_requires_id() {
        for module in Module::ALL {
            assert!(module.required_fields().contains(&"id"));
        }
    }

    #[test]
    fn test_only_suppliers_hard_delete() {
        assert_eq!(Module::Suppliers.delete_policy(), DeletePolicy::Hard);
        assert_eq!(Module::TemperatureLogs.delete_policy(), DeletePolicy::Soft);
        assert_eq!(Module::CleaningChecklists.sort_key().field(), "checkDate");
    }
}
