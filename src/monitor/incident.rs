//! Incident lifecycle: open, escalate, resolve and reset.
//!
//! [`transition`] decides what to do from the threshold evaluation and the
//! monitor's state; [`Monitor::analyse`] carries it out against the status
//! page. API failures are logged and never stop the monitor.

use crate::api::{ComponentStatus, Incident, StatusPage};

use super::{Evaluation, Monitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Idle,
    /// Create an incident; escalate afterwards if critical fired.
    Open { escalate: bool },
    /// An incident is already open.
    Hold { escalate: bool },
    Resolve,
    /// No incident but the component is still marked as degraded.
    Reset,
}

pub fn transition(eval: &Evaluation, has_incident: bool, status: ComponentStatus) -> Transition {
    if !eval.warning.saturated {
        return Transition::Idle;
    }

    if eval.warning_triggered() {
        let escalate = eval.critical_triggered();
        return if has_incident {
            Transition::Hold {
                escalate: escalate && status != ComponentStatus::MajorOutage,
            }
        } else {
            Transition::Open { escalate }
        };
    }

    if has_incident {
        Transition::Resolve
    } else if !status.is_operational() {
        Transition::Reset
    } else {
        Transition::Idle
    }
}

impl Monitor {
    /// Apply the incident transition for `eval`.
    pub async fn analyse<C: StatusPage>(&mut self, api: &C, eval: &Evaluation) -> Transition {
        let next = transition(eval, self.incident.is_some(), self.component_status);

        match next {
            Transition::Idle => {}
            Transition::Open { escalate } => {
                self.open_incident(api).await;
                if escalate {
                    self.escalate(api).await;
                }
            }
            Transition::Hold { escalate } => {
                // the first create never reached the status page
                if self.incident.as_ref().is_some_and(|i| i.id == 0) {
                    self.send_incident(api).await;
                }
                if escalate {
                    self.escalate(api).await;
                }
            }
            Transition::Resolve => self.resolve_incident(api).await,
            Transition::Reset => self.reset_component(api).await,
        }

        next
    }

    async fn open_incident<C: StatusPage>(&mut self, api: &C) {
        let mut ctx = self.template_context();
        ctx.insert("fail_reason", self.last_fail_reason.clone());
        let (subject, message) = self.templates.investigating.exec(&ctx);

        tracing::warn!("Creating incident. Monitor is down: {}", self.last_fail_reason);
        self.incident = Some(Incident::investigating(subject, message, self.component_id));
        self.send_incident(api).await;
    }

    async fn send_incident<C: StatusPage>(&mut self, api: &C) {
        let last_known = self.component_status;
        let Some(incident) = self.incident.as_mut() else {
            return;
        };
        let derived = incident.derive_component_status(last_known);

        match api.create_or_update_incident(incident).await {
            Ok(()) => {
                tracing::info!("Incident {} sent", incident.id);
                if let Some(status) = derived {
                    self.component_status = status;
                }
            }
            Err(e) => tracing::warn!("Error sending incident: {}", e),
        }
    }

    async fn escalate<C: StatusPage>(&mut self, api: &C) {
        if self.component_status == ComponentStatus::MajorOutage {
            return;
        }
        let Some(component_id) = self.component_id else {
            return;
        };

        tracing::warn!("Critical threshold reached, marking component as major outage");
        match api
            .set_component_status(component_id, ComponentStatus::MajorOutage)
            .await
        {
            Ok(_) => self.component_status = ComponentStatus::MajorOutage,
            Err(e) => tracing::warn!("Could not escalate component {}: {}", component_id, e),
        }
    }

    async fn resolve_incident<C: StatusPage>(&mut self, api: &C) {
        let Some(mut incident) = self.incident.take() else {
            return;
        };

        let mut ctx = self.template_context();
        ctx.insert("incident.id", incident.id.to_string());
        ctx.insert("incident.name", incident.name.clone());
        ctx.insert("incident.message", incident.message.clone());
        let (subject, message) = self.templates.fixed.exec(&ctx);

        tracing::warn!("Resolving incident {}", incident.id);
        incident.name = subject;
        incident.message = message;
        incident.set_fixed();
        incident.derive_component_status(self.component_status);

        if let Err(e) = api.create_or_update_incident(&mut incident).await {
            tracing::warn!("Error resolving incident: {}", e);
        }

        self.last_fail_reason.clear();
        self.component_status = ComponentStatus::Operational;
    }

    async fn reset_component<C: StatusPage>(&mut self, api: &C) {
        tracing::info!("Resetting component's status");
        self.last_fail_reason.clear();

        if let Some(component_id) = self.component_id {
            if let Err(e) = api
                .set_component_status(component_id, ComponentStatus::Operational)
                .await
            {
                tracing::warn!("Could not reset component {}: {}", component_id, e);
            }
        }
        self.component_status = ComponentStatus::Operational;
    }
}
