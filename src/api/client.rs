//! HTTP client for the Cachet status page API.

use std::time::Duration;

use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ApiError, Component, ComponentStatus, Incident, IncidentStatus, StatusPage};
use crate::config::ApiConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Every Cachet response wraps its payload in `data`.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct IncidentId {
    id: u32,
}

/// Token authenticated Cachet API client.
///
/// Cloning is cheap; all clones share one connection pool.
#[derive(Clone)]
pub struct CachetApi {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl CachetApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method, &url)
            .header("X-Cachet-Token", &self.token)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: Envelope<T> = serde_json::from_str(&text)?;
        Ok(envelope.data)
    }
}

impl StatusPage for CachetApi {
    async fn ping(&self) -> Result<(), ApiError> {
        let url = format!("{}/ping", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("X-Cachet-Token", &self.token)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ApiError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }

    async fn send_metric_points(&self, metric_ids: &[u32], value: i64) {
        for id in metric_ids {
            tracing::debug!("Sending metric point {} => {}", id, value);

            let body = json!({
                "value": value,
                "timestamp": Utc::now().timestamp(),
            });
            let path = format!("/metrics/{}/points", id);

            if let Err(e) = self
                .request::<serde_json::Value, _>(Method::POST, &path, Some(&body))
                .await
            {
                tracing::warn!("Could not log to metric ID {}: {}", id, e);
            }
        }
    }

    async fn get_component(&self, id: u32) -> Result<Component, ApiError> {
        self.request::<Component, ()>(Method::GET, &format!("/components/{}", id), None)
            .await
    }

    async fn set_component_status(&self, id: u32, status: ComponentStatus) -> Result<Component, ApiError> {
        let body = json!({ "status": u8::from(status) });
        let component = self
            .request(Method::PUT, &format!("/components/{}", id), Some(&body))
            .await?;

        tracing::info!("Component {} status set to {:?}", id, status);
        Ok(component)
    }

    async fn create_or_update_incident(&self, incident: &mut Incident) -> Result<(), ApiError> {
        let (method, path) = if incident.id > 0 {
            (Method::PUT, format!("/incidents/{}", incident.id))
        } else {
            (Method::POST, "/incidents".to_string())
        };

        let created: IncidentId = self.request(method, &path, Some(&*incident)).await?;
        incident.id = created.id;
        Ok(())
    }

    async fn get_open_incident(&self, component_id: u32) -> Result<Option<Incident>, ApiError> {
        let path = format!("/incidents?component_id={}&sort=id&order=desc", component_id);
        let incidents: Vec<Incident> = self.request::<_, ()>(Method::GET, &path, None).await?;

        Ok(incidents
            .into_iter()
            .filter(|i| i.status == IncidentStatus::Investigating)
            .max_by_key(|i| i.id))
    }
}
