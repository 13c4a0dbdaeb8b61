//! Monitor module: the configured targets and their runtime state.
//!
//! A [`Monitor`] holds the settings shared by every kind, the kind specific
//! [`Probe`], and the state its clock mutates: the history window, the last
//! failure reason, the known component status and the open incident.

mod history;
mod hook;
mod incident;
mod template;
mod threshold;

pub use history::*;
pub use hook::*;
pub use template::*;
pub use threshold::*;

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use crate::api::{ComponentStatus, Incident, StatusPage};
use crate::probe::{Check, Probe, ProbeError, ProbeTarget};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_TIME_FORMAT: &str = "%H:%M:%S %b %-d %Z";

/// Metric ids fed on every tick.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricIds {
    #[serde(default)]
    pub response_time: Vec<u32>,
    #[serde(default)]
    pub availability: Vec<u32>,
    #[serde(default)]
    pub incident_count: Vec<u32>,
    #[serde(default)]
    pub down_count: Vec<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Templates {
    #[serde(default)]
    pub investigating: MessageTemplate,
    #[serde(default)]
    pub fixed: MessageTemplate,
}

/// A configured probe target.
#[derive(Debug)]
pub struct Monitor {
    pub name: String,
    pub target: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub component_id: Option<u32>,
    pub metric_id: Option<u32>,
    pub metrics: MetricIds,
    pub hooks: ShellHooks,
    pub thresholds: Thresholds,
    pub templates: Templates,
    /// Display name of the host running the agent.
    pub system_name: String,
    pub time_format: String,
    pub probe: Probe,

    pub(crate) component_status: ComponentStatus,
    pub(crate) last_fail_reason: String,
    pub(crate) incident: Option<Incident>,
    pub(crate) history: HistoryWindow,
}

impl Monitor {
    pub fn new(name: impl Into<String>, target: impl Into<String>, probe: Probe) -> Self {
        let thresholds = Thresholds::default();
        Self {
            name: name.into(),
            target: target.into(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            component_id: None,
            metric_id: None,
            metrics: MetricIds::default(),
            hooks: ShellHooks::default(),
            thresholds,
            templates: Templates::default(),
            system_name: String::new(),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            probe,
            component_status: ComponentStatus::Operational,
            last_fail_reason: String::new(),
            incident: None,
            history: HistoryWindow::with_capacity(thresholds.capacity()),
        }
    }

    /// Normalise defaults, compile templates and report every problem found.
    pub fn validate(&mut self) -> Vec<String> {
        let mut errs = Vec::new();

        if self.name.is_empty() {
            errs.push("Name is required".to_string());
        }
        if self.target.is_empty() {
            errs.push("'Target' has not been set".to_string());
        }

        if self.interval.is_zero() {
            self.interval = DEFAULT_INTERVAL;
        }
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        if self.timeout > self.interval {
            errs.push("Timeout greater than interval".to_string());
        }

        if self.component_id.is_none() && self.metric_id.is_none() {
            errs.push("component_id & metric_id are unset".to_string());
        }

        self.thresholds.normalize();
        self.history = HistoryWindow::with_capacity(self.thresholds.capacity());

        self.templates.investigating.set_default(&default_investigating());
        self.templates.fixed.set_default(&default_fixed());
        if let Err(e) = self.templates.fixed.compile() {
            errs.push(format!("Could not compile \"fixed\" template: {}", e));
        }
        if let Err(e) = self.templates.investigating.compile() {
            errs.push(format!("Could not compile \"investigating\" template: {}", e));
        }

        errs.extend(self.probe.validate());
        errs
    }

    pub fn describe(&self) -> Vec<String> {
        let mut features = vec![format!("Type: {}", self.probe.kind())];

        if !self.name.is_empty() {
            features.push(format!("Name: {}", self.name));
        }
        features.push(format!("Interval: {:?}, timeout: {:?}", self.interval, self.timeout));
        features.push(format!("History size: {}", self.history.capacity()));
        features.push(format!("Warning threshold: {:?}", self.thresholds.warning));
        if let Some(critical) = self.thresholds.critical {
            features.push(format!("Critical threshold: {:?}", critical));
        }
        features.push(format!("Availability count metrics: {}", self.metrics.availability.len()));
        features.push(format!("Incident count metrics: {}", self.metrics.incident_count.len()));
        features.push(format!("Response time metrics: {}", self.metrics.response_time.len()));
        features.push(format!("Down count metrics: {}", self.metrics.down_count.len()));
        if self.hooks.command(HookType::OnSuccess).is_some() {
            features.push("Has a 'on_success' shellhook".to_string());
        }
        if self.hooks.command(HookType::OnFailure).is_some() {
            features.push("Has a 'on_failure' shellhook".to_string());
        }

        features.extend(self.probe.describe());
        features
    }

    /// Pull the component status and any open incident from the status page.
    pub async fn init<C: StatusPage>(&mut self, api: &C) {
        let Some(component_id) = self.component_id else {
            self.history.record(true);
            return;
        };

        match api.get_component(component_id).await {
            Ok(component) => {
                tracing::info!("Current CachetHQ ID: {}", component.id);
                tracing::info!("Current CachetHQ name: {}", component.name);
                tracing::info!("Current CachetHQ status: {:?}", component.status);
                self.component_status = component.status;
            }
            Err(e) => {
                tracing::warn!("Could not read component {}: {}", component_id, e);
            }
        }

        let up = self.component_status.is_operational();
        self.history.record(up);
        if up {
            return;
        }

        match api.get_open_incident(component_id).await {
            Ok(Some(incident)) if incident.is_open() => {
                tracing::info!("Current incident ID: {}", incident.id);
                self.incident = Some(incident);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Could not load open incident: {}", e),
        }
    }

    /// Run the kind specific probe once.
    pub async fn run_probe(&mut self) -> Result<String, ProbeError> {
        let target = ProbeTarget {
            address: &self.target,
            timeout: self.timeout,
        };
        self.probe.test(target).await
    }

    pub fn evaluate(&self) -> Evaluation {
        self.thresholds.evaluate(&self.history)
    }

    pub fn hook(&self, hook_type: HookType, data: String) -> Option<HookInvocation> {
        let command = self.hooks.command(hook_type)?;
        Some(HookInvocation {
            command: command.to_string(),
            monitor: self.name.clone(),
            component_id: self.component_id,
            target: self.target.clone(),
            hook_type,
            data,
        })
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    pub fn incident(&self) -> Option<&Incident> {
        self.incident.as_ref()
    }

    pub fn component_status(&self) -> ComponentStatus {
        self.component_status
    }

    pub fn last_fail_reason(&self) -> &str {
        &self.last_fail_reason
    }

    fn template_context(&self) -> TemplateContext {
        let mut ctx = TemplateContext::new();
        ctx.insert("monitor.name", self.name.clone());
        ctx.insert("monitor.target", self.target.clone());
        ctx.insert("monitor.type", self.probe.kind().to_string());
        ctx.insert(
            "monitor.component_id",
            self.component_id.map(|id| id.to_string()).unwrap_or_default(),
        );
        ctx.insert("system_name", self.system_name.clone());
        ctx.insert("now", Utc::now().format(&self.time_format).to_string());
        ctx
    }
}
