//! Per-monitor clock: tick on a fixed interval until cancelled.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::api::StatusPage;
use crate::monitor::{Evaluation, HookType, Monitor};

/// Run `monitor` until `cancel` fires, then hand it back.
///
/// A tick that is in flight when the token fires runs to completion.
pub async fn run<C: StatusPage>(
    mut monitor: Monitor,
    api: Arc<C>,
    cancel: CancellationToken,
    immediate: bool,
) -> Monitor {
    let span = tracing::info_span!("monitor", monitor = %monitor.name);

    async move {
        tracing::info!("Starting clock, interval {:?}", monitor.interval);

        if immediate && !cancel.is_cancelled() {
            tick(&mut monitor, &api).await;
        }

        let period = monitor.interval;
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Stopping clock");
                    break;
                }
                _ = ticker.tick() => {
                    tick(&mut monitor, &api).await;
                }
            }
        }

        monitor
    }
    .instrument(span)
    .await
}

/// Probe once, update the history and incident state, then emit metrics.
pub async fn tick<C: StatusPage>(monitor: &mut Monitor, api: &Arc<C>) -> Evaluation {
    let start = Instant::now();
    let result = monitor.run_probe().await;
    let lag_ms = start.elapsed().as_millis() as i64;

    let up = match result {
        Ok(data) => {
            if let Some(hook) = monitor.hook(HookType::OnSuccess, data) {
                hook.spawn();
            }
            true
        }
        Err(e) => {
            monitor.last_fail_reason = e.to_string();
            tracing::info!("Check failed: {}", monitor.last_fail_reason);
            false
        }
    };

    monitor.history.record(up);
    let eval = monitor.evaluate();
    let down = monitor.history.down_count();
    tracing::debug!(
        "Down count: {}, history: {}, warning window: {}/{}",
        down,
        monitor.history.size(),
        eval.warning.down,
        eval.warning.window_size
    );

    monitor.analyse(api.as_ref(), &eval).await;

    if !up {
        if let Some(hook) = monitor.hook(HookType::OnFailure, String::new()) {
            hook.spawn();
        }
    }

    if let Some(metric_id) = monitor.metric_id {
        spawn_metric(api, vec![metric_id], lag_ms);
    }
    spawn_metric(api, monitor.metrics.response_time.clone(), lag_ms);
    spawn_metric(api, monitor.metrics.down_count.clone(), down as i64);
    if down == 0 {
        spawn_metric(api, monitor.metrics.availability.clone(), 1);
    }
    if eval.warning_triggered() {
        spawn_metric(api, monitor.metrics.incident_count.clone(), 1);
    }

    eval
}

fn spawn_metric<C: StatusPage>(api: &Arc<C>, ids: Vec<u32>, value: i64) {
    if ids.is_empty() {
        return;
    }
    let api = Arc::clone(api);
    tokio::spawn(
        async move {
            api.send_metric_points(&ids, value).await;
        }
        .in_current_span(),
    );
}
