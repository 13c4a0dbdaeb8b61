//! cachet-monitor - status page monitoring agent
//!
//! Probes HTTP, DNS and mock targets on a fixed interval and keeps Cachet
//! components, incidents and metrics in sync with what it observes.

mod api;
mod config;
mod monitor;
mod probe;
mod scheduler;

#[cfg(test)]
mod test_server;

use api::{CachetApi, StatusPage};
use config::{load_config, AgentConfig};
use scheduler::Runner;

use std::sync::Arc;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("cachet_monitor=info".parse()?))
        .init();

    let agent = AgentConfig::load();
    tracing::info!("Loading monitors from {}", agent.config_path.display());

    let file = match load_config(&agent.config_path) {
        Ok(file) => file,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let system_name = file.resolve_system_name(&agent);
    let immediate = agent.immediate || file.immediate;
    let api = Arc::new(CachetApi::new(&file.api)?);

    let mut monitors = match file.build_monitors(&system_name) {
        Ok(monitors) => monitors,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = api.ping().await {
        tracing::error!("Cannot ping the status page API: {}", e);
        std::process::exit(1);
    }
    tracing::info!("API ping OK, system name: {}", system_name);

    for (index, monitor) in monitors.iter().enumerate() {
        tracing::info!("Monitor #{}", index);
        for line in monitor.describe() {
            tracing::info!(" - {}", line);
        }
    }

    for monitor in monitors.iter_mut() {
        let span = tracing::info_span!("monitor", monitor = %monitor.name);
        monitor.init(api.as_ref()).instrument(span).await;
    }

    let runner = Runner::new(Arc::clone(&api), immediate);
    runner.start(monitors).await;
    tracing::info!("Running monitors: {}", runner.running().await.join(", "));

    shutdown_signal().await;

    tracing::warn!("Abort: waiting for monitors to finish");
    runner.stop();
    for monitor in runner.wait().await {
        let history = monitor.history();
        tracing::info!(
            "Monitor {} stopped: {}/{} down, status {:?}, incident {}",
            monitor.name,
            history.down_count(),
            history.size(),
            monitor.component_status(),
            monitor.incident().map_or("none".to_string(), |i| i.id.to_string()),
        );
        if !monitor.last_fail_reason().is_empty() {
            tracing::info!("Monitor {} last failure: {}", monitor.name, monitor.last_fail_reason());
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
