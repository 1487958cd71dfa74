//! Background refresh scheduler.
//!
//! Two states: idle, or running with a fixed interval. `start` on a running
//! scheduler replaces it (cancel then restart), so the interval can change
//! without a separate reconfigure path. At most one refresh is in flight at
//! a time; a tick that arrives while the previous refresh is still running
//! aborts it before spawning the next. `stop` cancels the tick loop and any
//! in-flight refresh, for session end and lock screen.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::ReviewEngine;

struct RunningState {
    loop_task: JoinHandle<()>,
    in_flight: Arc<Mutex<Option<JoinHandle<()>>>>,
    interval: Duration,
}

#[derive(Default)]
pub struct RefreshScheduler {
    running: Mutex<Option<RunningState>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start periodic refreshes. Replaces any running schedule.
    pub fn start(&self, engine: Arc<ReviewEngine>, interval: Duration) {
        self.stop();

        let in_flight: Arc<Mutex<Option<JoinHandle<()>>>> = Arc::new(Mutex::new(None));
        let flight = in_flight.clone();
        let loop_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; skip so the first refresh lands
            // one full period after start
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let engine = engine.clone();
                if let Ok(mut slot) = flight.lock() {
                    if let Some(prev) = slot.take() {
                        if !prev.is_finished() {
                            tracing::debug!("previous refresh still in flight, cancelling it");
                            prev.abort();
                        }
                    }
                    *slot = Some(tokio::spawn(async move {
                        if let Err(e) = engine.refresh(false).await {
                            tracing::warn!(error = %e, "scheduled refresh failed");
                        }
                    }));
                }
            }
        });

        if let Ok(mut running) = self.running.lock() {
            *running = Some(RunningState {
                loop_task,
                in_flight,
                interval,
            });
        }
        tracing::info!(interval_secs = interval.as_secs(), "refresh scheduler started");
    }

    /// Stop the schedule and cancel any in-flight refresh. No-op when idle.
    pub fn stop(&self) {
        let Ok(mut running) = self.running.lock() else {
            return;
        };
        if let Some(state) = running.take() {
            state.loop_task.abort();
            if let Ok(mut slot) = state.in_flight.lock() {
                if let Some(task) = slot.take() {
                    task.abort();
                }
            }
            tracing::info!("refresh scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|running| running.is_some())
            .unwrap_or(false)
    }

    /// Interval of the running schedule, if any.
    pub fn interval(&self) -> Option<Duration> {
        self.running
            .lock()
            .ok()
            .and_then(|running| running.as_ref().map(|state| state.interval))
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
