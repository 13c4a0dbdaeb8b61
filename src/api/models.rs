//! Status page data model types.

use serde::{Deserialize, Serialize};

/// Status of a status page component.
///
/// Values Cachet may send that the agent does not act on (0 or anything
/// above 4) decode as `Unknown` rather than failing the whole response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ComponentStatus {
    Unknown = 0,
    Operational = 1,
    PerformanceIssues = 2,
    PartialOutage = 3,
    MajorOutage = 4,
}

impl ComponentStatus {
    pub fn is_operational(self) -> bool {
        self == ComponentStatus::Operational
    }
}

impl From<u8> for ComponentStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Operational,
            2 => Self::PerformanceIssues,
            3 => Self::PartialOutage,
            4 => Self::MajorOutage,
            _ => Self::Unknown,
        }
    }
}

impl From<ComponentStatus> for u8 {
    fn from(status: ComponentStatus) -> Self {
        status as u8
    }
}

/// Progression of an incident on the status page.
///
/// Scheduled maintenance is status 0 on Cachet; it and any other value the
/// agent does not know decode as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum IncidentStatus {
    Unknown = 0,
    Investigating = 1,
    Identified = 2,
    Watching = 3,
    Fixed = 4,
}

impl From<u8> for IncidentStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Investigating,
            2 => Self::Identified,
            3 => Self::Watching,
            4 => Self::Fixed,
            _ => Self::Unknown,
        }
    }
}

impl From<IncidentStatus> for u8 {
    fn from(status: IncidentStatus) -> Self {
        status as u8
    }
}

/// A status page component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub status: ComponentStatus,
}

/// An incident as sent to and read from the status page.
///
/// `id` stays 0 until the first successful create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    #[serde(default)]
    pub id: u32,
    pub name: String,
    pub message: String,
    pub status: IncidentStatus,
    #[serde(default = "default_visible")]
    pub visible: u8,
    #[serde(default)]
    pub notify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_status: Option<ComponentStatus>,
}

fn default_visible() -> u8 {
    1
}

impl Incident {
    /// A fresh incident in the Investigating state.
    pub fn investigating(name: String, message: String, component_id: Option<u32>) -> Self {
        Self {
            id: 0,
            name,
            message,
            status: IncidentStatus::Investigating,
            visible: 1,
            notify: true,
            component_id,
            component_status: None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            IncidentStatus::Investigating | IncidentStatus::Identified | IncidentStatus::Watching
        )
    }

    pub fn set_fixed(&mut self) {
        self.status = IncidentStatus::Fixed;
    }

    /// Derive the component status this incident carries to the status page.
    ///
    /// An open incident means a partial outage unless the component is already
    /// in a major outage; a fixed incident puts the component back to operational.
    /// An incident of unknown status carries nothing.
    pub fn derive_component_status(&mut self, last_known: ComponentStatus) -> Option<ComponentStatus> {
        self.component_id?;

        let derived = match self.status {
            IncidentStatus::Unknown => return None,
            IncidentStatus::Investigating | IncidentStatus::Identified | IncidentStatus::Watching => {
                if last_known == ComponentStatus::MajorOutage {
                    ComponentStatus::MajorOutage
                } else {
                    ComponentStatus::PartialOutage
                }
            }
            IncidentStatus::Fixed => ComponentStatus::Operational,
        };

        self.component_status = Some(derived);
        Some(derived)
    }
}
