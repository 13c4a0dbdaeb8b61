//! Status page API module.
//!
//! The monitors only talk to the status page through the [`StatusPage`]
//! trait; [`CachetApi`] is the HTTP implementation used by the agent.

mod client;
mod models;

pub use client::*;
pub use models::*;

use std::future::Future;
use thiserror::Error;

/// Status page API error types.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("cannot decode API response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Operations the monitors need from the status page.
///
/// Implementations must be safe to share between every monitor task.
pub trait StatusPage: Send + Sync + 'static {
    /// Check that the API is reachable and the token is accepted.
    fn ping(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Add a data point to each metric. Failures are logged, never returned.
    fn send_metric_points(&self, metric_ids: &[u32], value: i64) -> impl Future<Output = ()> + Send;

    fn get_component(&self, id: u32) -> impl Future<Output = Result<Component, ApiError>> + Send;

    fn set_component_status(
        &self,
        id: u32,
        status: ComponentStatus,
    ) -> impl Future<Output = Result<Component, ApiError>> + Send;

    /// Create the incident when its id is 0, update it otherwise.
    ///
    /// On success the id assigned by the status page is stored on the incident.
    fn create_or_update_incident(
        &self,
        incident: &mut Incident,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Most recent incident still under investigation for a component.
    fn get_open_incident(
        &self,
        component_id: u32,
    ) -> impl Future<Output = Result<Option<Incident>, ApiError>> + Send;
}

#[cfg(test)]
pub mod testing {
    //! Recording [`StatusPage`] double for monitor tests.

    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Ping,
        Metric { ids: Vec<u32>, value: i64 },
        GetComponent(u32),
        SetComponentStatus(u32, ComponentStatus),
        SendIncident { id: u32, status: IncidentStatus, component_status: Option<ComponentStatus> },
        GetOpenIncident(u32),
    }

    #[derive(Default)]
    pub struct RecordingStatusPage {
        calls: Mutex<Vec<Call>>,
        next_incident_id: Mutex<u32>,
        pub component_status: Mutex<Option<ComponentStatus>>,
        pub open_incident: Mutex<Option<Incident>>,
        pub fail_incidents: Mutex<bool>,
        last_incident: Mutex<Option<Incident>>,
    }

    impl RecordingStatusPage {
        pub fn new() -> Self {
            Self {
                next_incident_id: Mutex::new(100),
                component_status: Mutex::new(Some(ComponentStatus::Operational)),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }

        pub fn incident_sends(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| matches!(c, Call::SendIncident { .. }))
                .collect()
        }

        pub fn status_writes(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| matches!(c, Call::SetComponentStatus(..)))
                .collect()
        }

        pub fn metrics_for(&self, id: u32) -> Vec<i64> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Metric { ids, value } if ids.contains(&id) => Some(value),
                    _ => None,
                })
                .collect()
        }

        /// The last incident body sent, with the id assigned to it.
        pub fn last_incident(&self) -> Option<Incident> {
            self.last_incident.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn unavailable() -> ApiError {
            ApiError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }
        }
    }

    impl StatusPage for RecordingStatusPage {
        async fn ping(&self) -> Result<(), ApiError> {
            self.record(Call::Ping);
            Ok(())
        }

        async fn send_metric_points(&self, metric_ids: &[u32], value: i64) {
            if metric_ids.is_empty() {
                return;
            }
            self.record(Call::Metric {
                ids: metric_ids.to_vec(),
                value,
            });
        }

        async fn get_component(&self, id: u32) -> Result<Component, ApiError> {
            self.record(Call::GetComponent(id));
            let status = (*self.component_status.lock().unwrap()).ok_or_else(Self::unavailable)?;
            Ok(Component {
                id,
                name: format!("component-{}", id),
                status,
            })
        }

        async fn set_component_status(&self, id: u32, status: ComponentStatus) -> Result<Component, ApiError> {
            self.record(Call::SetComponentStatus(id, status));
            *self.component_status.lock().unwrap() = Some(status);
            Ok(Component {
                id,
                name: format!("component-{}", id),
                status,
            })
        }

        async fn create_or_update_incident(&self, incident: &mut Incident) -> Result<(), ApiError> {
            self.record(Call::SendIncident {
                id: incident.id,
                status: incident.status,
                component_status: incident.component_status,
            });
            if *self.fail_incidents.lock().unwrap() {
                return Err(Self::unavailable());
            }
            if incident.id == 0 {
                let mut next = self.next_incident_id.lock().unwrap();
                incident.id = *next;
                *next += 1;
            }
            *self.last_incident.lock().unwrap() = Some(incident.clone());
            Ok(())
        }

        async fn get_open_incident(&self, component_id: u32) -> Result<Option<Incident>, ApiError> {
            self.record(Call::GetOpenIncident(component_id));
            Ok(self.open_incident.lock().unwrap().clone())
        }
    }
}
