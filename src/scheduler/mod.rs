//! Scheduler module: one clock task per monitor.

mod clock;

pub use clock::*;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::StatusPage;
use crate::monitor::Monitor;

/// Starts, stops and waits for the monitor clocks.
pub struct Runner<C: StatusPage> {
    api: Arc<C>,
    immediate: bool,
    shutdown: CancellationToken,
    clocks: RwLock<HashMap<String, JoinHandle<Monitor>>>,
}

impl<C: StatusPage> Runner<C> {
    pub fn new(api: Arc<C>, immediate: bool) -> Self {
        Self {
            api,
            immediate,
            shutdown: CancellationToken::new(),
            clocks: RwLock::new(HashMap::new()),
        }
    }

    /// Start a clock for every monitor.
    pub async fn start(&self, monitors: Vec<Monitor>) {
        tracing::info!("Starting {} monitors", monitors.len());
        for monitor in monitors {
            self.add_monitor(monitor).await;
        }
    }

    /// Start a clock for one monitor. Returns `false` if a monitor with the
    /// same name is already running or the runner was stopped.
    pub async fn add_monitor(&self, monitor: Monitor) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }

        let mut clocks = self.clocks.write().await;
        if clocks.contains_key(&monitor.name) {
            return false;
        }

        tracing::info!("Runner: adding monitor {}", monitor.name);
        let name = monitor.name.clone();
        let cancel = self.shutdown.child_token();
        let task = tokio::spawn(run(monitor, Arc::clone(&self.api), cancel, self.immediate));
        clocks.insert(name, task);
        true
    }

    /// Signal every clock to stop. Safe to call more than once.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Runner: stopping all monitors");
        }
        self.shutdown.cancel();
    }

    /// Wait for every clock to finish and return the monitors.
    pub async fn wait(&self) -> Vec<Monitor> {
        let clocks: Vec<(String, JoinHandle<Monitor>)> = self.clocks.write().await.drain().collect();

        let mut monitors = Vec::with_capacity(clocks.len());
        for (name, task) in clocks {
            if let Some(monitor) = join(&name, task).await {
                monitors.push(monitor);
            }
        }
        monitors
    }

    pub async fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clocks.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

async fn join(name: &str, task: JoinHandle<Monitor>) -> Option<Monitor> {
    match task.await {
        Ok(monitor) => Some(monitor),
        Err(e) => {
            tracing::error!("Monitor {} clock failed: {}", name, e);
            None
        }
    }
}
