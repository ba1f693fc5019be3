//! Sequences the registry, package manager, build emitter and cluster
//! adapter across the two entry points the ingress server calls into,
//! and owns the fan-out/fan-in and trash-on-failure logic.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tracing_futures::Instrument;

use crate::builder::Builder;
use crate::cluster::ClusterAdapter;
use crate::error::BrokerError;
use crate::frontend::BacaMessenger;
use crate::metrics::BrokerMetrics;
use crate::package::PackageManager;
use crate::registry::Registry;
use crate::settings::Settings;
use crate::submit::{SetState, TaskState};

pub struct Orchestrator {
    registry: Arc<Registry>,
    cluster: Arc<dyn ClusterAdapter>,
    frontend: Arc<BacaMessenger>,
    packages: Arc<PackageManager>,
    builder: Arc<Builder>,
    settings: Arc<Settings>,
    metrics: Arc<BrokerMetrics>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<Registry>,
        cluster: Arc<dyn ClusterAdapter>,
        frontend: Arc<BacaMessenger>,
        packages: Arc<PackageManager>,
        builder: Arc<Builder>,
        settings: Arc<Settings>,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        Self {
            registry,
            cluster,
            frontend,
            packages,
            builder,
            settings,
            metrics,
        }
    }

    /// Entry point 1: a new front-end submission.
    pub async fn handle_submission(
        &self,
        submit_id: String,
        package_path: PathBuf,
        commit_id: String,
        solution_path: PathBuf,
    ) {
        self.metrics.submissions_total.inc();

        let task = match self.registry.new_task_submit(
            &submit_id,
            package_path,
            commit_id,
            solution_path,
        ) {
            Ok(task) => task,
            Err(e) => {
                // Collision against an existing, unrelated task: do not
                // trash anything that already exists.
                warn!(submit_id = %submit_id, error = %e, "rejected duplicate submission");
                return;
            }
        };

        if let Err(e) = self.run_submission(&task).await {
            error!(submit_id = %task.submit_id, error = %e, "submission failed, trashing");
            self.trash(&task, &e.to_string()).await;
        }
    }

    async fn run_submission(
        &self,
        task: &Arc<crate::submit::TaskSubmit>,
    ) -> Result<(), BrokerError> {
        let registry = self.registry.clone();
        let task_id = task.submit_id.clone();
        task.initialise(move |set_name| {
            registry
                .new_set_submit(&task_id, set_name)
                .expect("set submit id derived from a fresh task submit cannot collide")
        })
        .await?;

        let package = task.package().await;
        self.packages
            .ensure_build(
                &package,
                &self.settings.build_namespace,
                self.settings.force_rebuild_packages,
                &self.builder,
            )
            .await?;

        task.change_state(TaskState::AwaitingSets, Some(&[TaskState::Initial]))
            .await?;

        self.dispatch_all(task).await?;

        if self.settings.active_wait {
            self.collect_all(task).await?;
            self.finalise(task).await?;
        }

        Ok(())
    }

    /// Fans out dispatch across every child set; cancels the remaining
    /// siblings on the first failure.
    async fn dispatch_all(
        &self,
        task: &Arc<crate::submit::TaskSubmit>,
    ) -> Result<(), BrokerError> {
        let sets = task.set_submits().await;
        let mut join_set = JoinSet::new();

        for set in sets {
            let cluster = self.cluster.clone();
            let task = task.clone();
            let metrics = self.metrics.clone();
            let span = tracing::info_span!("dispatch_set", set_submit = %set.submit_id);
            join_set.spawn(
                async move {
                    set.change_state(
                        SetState::SendingToCluster,
                        Some(&[SetState::Initial]),
                    )
                    .await
                    .map_err(BrokerError::from)?;

                    let timer = metrics.dispatch_duration_seconds.start_timer();
                    let result = cluster.dispatch(&task, &set).await;
                    timer.observe_duration();

                    result.map_err(BrokerError::from)?;
                    set.change_state(
                        SetState::AwaitingCluster,
                        Some(&[SetState::SendingToCluster]),
                    )
                    .await
                    .map_err(BrokerError::from)?;
                    metrics.sets_inflight.inc();
                    Ok(())
                }
                .instrument(span),
            );
        }

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    join_set.abort_all();
                }
                Err(join_err) => {
                    if join_err.is_panic() {
                        error!(task_submit = %task.submit_id, "set dispatch task panicked");
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Active mode only: synchronously collect every child's already
    /// parsed result (dispatch already ran `client execute`).
    async fn collect_all(
        &self,
        task: &Arc<crate::submit::TaskSubmit>,
    ) -> Result<(), BrokerError> {
        let sets = task.set_submits().await;
        for set in &sets {
            set.change_state(
                SetState::WaitingForResults,
                Some(&[SetState::AwaitingCluster]),
            )
            .await?;
            set.change_state(SetState::Done, Some(&[SetState::WaitingForResults]))
                .await?;
            self.metrics.sets_inflight.dec();
        }
        Ok(())
    }

    /// Entry point 2 (passive mode): the cluster notifies us that a set
    /// finished.
    pub async fn handle_cluster_callback(&self, set_submit_id: String) {
        let set = match self.registry.get_set_submit(&set_submit_id) {
            Ok(set) => set,
            Err(e) => {
                // Stray callback for an id we don't know about (or that
                // has already been trashed/finalised). Never trash on a
                // miss.
                warn!(set_submit_id = %set_submit_id, error = %e, "callback for unknown set submit");
                return;
            }
        };

        let task = match self.registry.get_task_submit(&set.task_submit_id) {
            Ok(task) => task,
            Err(e) => {
                warn!(task_submit_id = %set.task_submit_id, error = %e, "callback for orphaned set submit");
                return;
            }
        };

        if let Err(e) = self.run_callback(&task, &set).await {
            error!(submit_id = %task.submit_id, error = %e, "callback handling failed, trashing");
            self.trash(&task, &e.to_string()).await;
            return;
        }

        if task.all_done().await {
            if let Err(e) = self.finalise(&task).await {
                error!(submit_id = %task.submit_id, error = %e, "finalise failed, trashing");
                self.trash(&task, &e.to_string()).await;
            }
        }
    }

    async fn run_callback(
        &self,
        task: &Arc<crate::submit::TaskSubmit>,
        set: &Arc<crate::submit::SetSubmit>,
    ) -> Result<(), BrokerError> {
        set.change_state(
            SetState::WaitingForResults,
            Some(&[SetState::AwaitingCluster]),
        )
        .await?;
        let timer = self.metrics.collect_duration_seconds.start_timer();
        let collect_result = self.cluster.collect(task, set).await;
        timer.observe_duration();
        collect_result?;

        set.change_state(SetState::Done, Some(&[SetState::WaitingForResults]))
            .await?;
        self.metrics.sets_inflight.dec();
        Ok(())
    }

    /// Aggregates every child's result and reports success. Must only
    /// be called once all children are `DONE`. The guarded transition
    /// below is the serialization point: it is atomic under the
    /// parent's own mutex, so when two callbacks race to finalise the
    /// same task, exactly one observes `AwaitingSets` and proceeds; the
    /// loser's `StateError` means "already finalised (or trashed) by
    /// someone else" and is a benign no-op, not a failure to trash.
    async fn finalise(&self, task: &Arc<crate::submit::TaskSubmit>) -> Result<(), BrokerError> {
        if let Err(e) = task
            .change_state(TaskState::Done, Some(&[TaskState::AwaitingSets]))
            .await
        {
            debug!(submit_id = %task.submit_id, error = %e, "finalise lost the race, already finalised or trashed");
            return Ok(());
        }

        let sets = task.set_submits().await;
        let mut results = HashMap::with_capacity(sets.len());
        for set in &sets {
            let result = set.result().await.expect("DONE set submit carries a result");
            results.insert(set.set_name.clone(), result);
        }

        self.frontend.send_success(task, results).await?;

        let set_names: Vec<String> = sets.iter().map(|s| s.set_name.clone()).collect();
        self.registry.delete_task_submit(task, &set_names)?;
        info!(submit_id = %task.submit_id, "submission finalised");
        Ok(())
    }

    /// Terminates a task submit on any failure: transitions it (and
    /// every child) to `ERROR`, removes it from the registry, and
    /// best-effort notifies the front-end. Must never itself raise.
    pub async fn trash(&self, task: &Arc<crate::submit::TaskSubmit>, message: &str) {
        self.trash_impl(task, message, true).await;
    }

    /// Same as [`Self::trash`] but skips the front-end error report —
    /// used by the janitor, where the task is simply too old and there
    /// is nothing wrong to report.
    pub async fn trash_silently(&self, task: &Arc<crate::submit::TaskSubmit>) {
        self.trash_impl(task, "", false).await;
    }

    async fn trash_impl(
        &self,
        task: &Arc<crate::submit::TaskSubmit>,
        message: &str,
        notify_front_end: bool,
    ) {
        let _ = task.change_state(TaskState::Error, None).await;

        let sets = task.set_submits_or_empty().await;
        for set in &sets {
            let was_inflight = matches!(
                set.state().await,
                SetState::AwaitingCluster | SetState::WaitingForResults
            );
            let _ = set.change_state(SetState::Error, None).await;
            if was_inflight {
                self.metrics.sets_inflight.dec();
            }
        }
        let set_names: Vec<String> = sets.iter().map(|s| s.set_name.clone()).collect();

        if let Err(e) = self.registry.delete_task_submit(task, &set_names) {
            warn!(submit_id = %task.submit_id, error = %e, "trash: task already removed from registry");
        }

        if notify_front_end && !self.frontend.send_error(task, message).await {
            warn!(submit_id = %task.submit_id, "trash: front-end did not acknowledge error report");
        }
    }
}
