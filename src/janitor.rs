//! Periodic sweep that trashes `TaskSubmit`s that have been
//! non-terminal for too long.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument};

use crate::metrics::BrokerMetrics;
use crate::orchestrator::Orchestrator;
use crate::registry::Registry;

pub struct Janitor {
    registry: Arc<Registry>,
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<BrokerMetrics>,
    timeout: chrono::Duration,
    interval: Duration,
}

impl Janitor {
    pub fn new(
        registry: Arc<Registry>,
        orchestrator: Arc<Orchestrator>,
        metrics: Arc<BrokerMetrics>,
        timeout_secs: u64,
        interval_secs: u64,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            metrics,
            timeout: chrono::Duration::seconds(timeout_secs as i64),
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Runs sweeps forever. Intended to be spawned as its own task;
    /// returns only if the surrounding task is aborted.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    #[instrument(skip(self))]
    async fn sweep(&self) {
        // Snapshot candidate ids first, then trash each outside the
        // registry's mutex — trashing itself re-enters the registry,
        // so holding its lock across the loop would deadlock.
        let candidate_ids = self.registry.task_submit_ids();
        let mut reaped = 0u64;

        for id in candidate_ids {
            let Ok(task) = self.registry.get_task_submit(&id) else {
                continue;
            };
            let age = Utc::now() - task.mod_date().await;
            if age >= self.timeout {
                info!(submit_id = %id, age_secs = age.num_seconds(), "janitor reaping stale task submit");
                self.orchestrator.trash_silently(&task).await;
                reaped += 1;
            }
        }

        if reaped > 0 {
            self.metrics.janitor_reaped_total.inc_by(reaped);
        }
    }
}
