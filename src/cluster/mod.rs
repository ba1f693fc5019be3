//! Pluggable execution-cluster adapter: a small `{dispatch, collect}`
//! capability boundary with two implementations selected once at
//! startup, not by inheritance.

mod active;
mod passive;
mod yaml;

pub use active::ActiveClusterAdapter;
pub use passive::PassiveClusterAdapter;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::ClusterError;
use crate::submit::SetSubmit;
use crate::submit::TaskSubmit;

/// Shared configuration both adapter variants need to locate the
/// cluster tooling and build a submission's working directories.
#[derive(Clone)]
pub struct ClusterPaths {
    pub submits_dir: PathBuf,
    pub build_namespace: String,
    pub cluster_conf: PathBuf,
    pub callback_url_prefix: String,
}

impl ClusterPaths {
    pub fn task_dir(&self, task_submit_id: &str, set_name: &str) -> PathBuf {
        self.submits_dir
            .join(task_submit_id)
            .join(format!("{set_name}.task"))
    }

    pub fn result_dir(&self, task_submit_id: &str, set_name: &str) -> PathBuf {
        self.submits_dir
            .join(task_submit_id)
            .join(format!("{set_name}.result"))
    }

    pub fn callback_url(&self, set_submit_id: &str) -> String {
        if self.callback_url_prefix.ends_with('/') {
            format!("{}{}", self.callback_url_prefix, set_submit_id)
        } else {
            format!("{}/{}", self.callback_url_prefix, set_submit_id)
        }
    }
}

/// Picks the platform-appropriate interpreter used to invoke the
/// cluster's python tooling.
pub fn python_call() -> &'static str {
    if cfg!(windows) {
        "python3"
    } else {
        "py"
    }
}

/// Capability boundary shared by the passive (callback-driven) and
/// active (blocking) cluster adapters.
#[async_trait]
pub trait ClusterAdapter: Send + Sync {
    /// Prepares the cluster task directory and submits it, recording
    /// the cluster-returned handle on `set`. In active mode this also
    /// blocks until results are ready and leaves them on `set`.
    async fn dispatch(&self, task: &TaskSubmit, set: &SetSubmit) -> Result<(), ClusterError>;

    /// Retrieves and parses results for an already-dispatched set,
    /// recording them on `set`. A no-op in active mode, where
    /// `dispatch` already did this.
    async fn collect(&self, task: &TaskSubmit, set: &SetSubmit) -> Result<(), ClusterError>;
}
