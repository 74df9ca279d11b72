//! Timer driver for the billing sweeps.
//!
//! One tokio task per sweep kind, each on its own fixed interval. A sweep
//! failure is reported and the task waits for its next tick.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::engine::BillingEngine;
use crate::sweep::SweepKind;

/// Runner statistics across all sweep kinds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunnerStats {
    pub runs: u64,
    pub failed_runs: u64,
    /// Runs that stopped early on their time budget.
    pub exhausted_runs: u64,
}

/// Handle to control a running [`SweepRunner`].
#[derive(Debug)]
pub struct SweepRunnerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<Mutex<RunnerStats>>,
}

impl SweepRunnerHandle {
    /// Signal every sweep task to stop and wait for them to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            task.await.context("sweep task panicked")?;
        }
        info!("sweep runner stopped");
        Ok(())
    }

    pub fn stats(&self) -> RunnerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

pub struct SweepRunner;

impl SweepRunner {
    /// Spawn every sweep kind on the current tokio runtime.
    pub fn spawn(engine: Arc<BillingEngine>) -> SweepRunnerHandle {
        Self::spawn_kinds(engine, &SweepKind::ALL)
    }

    pub fn spawn_kinds(engine: Arc<BillingEngine>, kinds: &[SweepKind]) -> SweepRunnerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(RunnerStats::default()));

        let tasks = kinds
            .iter()
            .map(|&kind| {
                tokio::spawn(sweep_loop(
                    engine.clone(),
                    kind,
                    shutdown_rx.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        info!(sweeps = kinds.len(), "sweep runner started");
        SweepRunnerHandle {
            shutdown,
            tasks,
            stats,
        }
    }
}

async fn sweep_loop(
    engine: Arc<BillingEngine>,
    kind: SweepKind,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<Mutex<RunnerStats>>,
) {
    let settings = kind.settings(&engine.config().sweeps);
    let mut ticker = interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        let result = engine.run_sweep(kind, Utc::now()).await;
        let (failed, exhausted) = match &result {
            Ok(report) => {
                debug!(sweep = kind.name(), ?report, "sweep finished");
                (false, report.exhausted)
            }
            Err(e) => {
                warn!(sweep = kind.name(), error = %e, "sweep aborted");
                engine.report(e).await;
                (true, false)
            }
        };

        if let Ok(mut s) = stats.lock() {
            s.runs += 1;
            s.failed_runs += u64::from(failed);
            s.exhausted_runs += u64::from(exhausted);
        }
    }
}
