use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{BrokerError, StateError};
use crate::package::Package;

use super::set_submit::SetSubmit;

/// Lifecycle of one front-end submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Initial,
    AwaitingSets,
    Done,
    Error,
}

impl TaskState {
    fn as_str(self) -> &'static str {
        match self {
            TaskState::Initial => "INITIAL",
            TaskState::AwaitingSets => "AWAITING_SETS",
            TaskState::Done => "DONE",
            TaskState::Error => "ERROR",
        }
    }
}

struct Inner {
    state: TaskState,
    mod_date: DateTime<Utc>,
    package: Option<Package>,
    set_submits: Option<Vec<Arc<SetSubmit>>>,
}

/// The broker's in-memory record of one front-end submission.
pub struct TaskSubmit {
    pub submit_id: String,
    pub package_path: PathBuf,
    pub commit_id: String,
    pub solution_path: PathBuf,
    pub creation_date: DateTime<Utc>,
    inner: Mutex<Inner>,
}

impl TaskSubmit {
    pub fn new(
        submit_id: String,
        package_path: PathBuf,
        commit_id: String,
        solution_path: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            submit_id,
            package_path,
            commit_id,
            solution_path,
            creation_date: now,
            inner: Mutex::new(Inner {
                state: TaskState::Initial,
                mod_date: now,
                package: None,
                set_submits: None,
            }),
        }
    }

    pub async fn state(&self) -> TaskState {
        self.inner.lock().await.state
    }

    pub async fn mod_date(&self) -> DateTime<Utc> {
        self.inner.lock().await.mod_date
    }

    pub async fn change_state(
        &self,
        new: TaskState,
        requires: Option<&[TaskState]>,
    ) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        if let Some(allowed) = requires {
            if !allowed.contains(&inner.state) {
                return Err(StateError {
                    kind: "TaskSubmit",
                    id: self.submit_id.clone(),
                    from: inner.state.as_str().into(),
                    to: new.as_str().into(),
                    requires: allowed.iter().map(|s| s.as_str().to_string()).collect(),
                });
            }
        }
        debug!(
            task_submit = %self.submit_id,
            from = inner.state.as_str(),
            to = new.as_str(),
            "task submit state transition"
        );
        inner.state = new;
        inner.mod_date = Utc::now();
        Ok(())
    }

    /// Loads package metadata and creates one `SetSubmit` per test set.
    /// Single-shot: a second call fails.
    pub async fn initialise<F>(&self, make_set_submit: F) -> Result<(), BrokerError>
    where
        F: Fn(&str) -> Arc<SetSubmit>,
    {
        let mut inner = self.inner.lock().await;
        if inner.set_submits.is_some() {
            return Err(BrokerError::AlreadyInitialised);
        }
        let package = Package::load(self.package_path.clone(), self.commit_id.clone()).await?;
        let mut children = Vec::with_capacity(package.sets().len());
        for t_set in package.sets() {
            children.push(make_set_submit(&t_set.name));
        }
        inner.package = Some(package);
        inner.set_submits = Some(children);
        Ok(())
    }

    pub async fn package(&self) -> Package {
        self.inner
            .lock()
            .await
            .package
            .clone()
            .expect("package loaded before access")
    }

    pub async fn set_submits(&self) -> Vec<Arc<SetSubmit>> {
        self.inner
            .lock()
            .await
            .set_submits
            .clone()
            .expect("set submits created before access")
    }

    /// Same as [`Self::set_submits`] but tolerant of a task that never
    /// got past `initialise` (used on the trash path, which can run
    /// before children exist).
    pub async fn set_submits_or_empty(&self) -> Vec<Arc<SetSubmit>> {
        self.inner.lock().await.set_submits.clone().unwrap_or_default()
    }

    pub async fn all_done(&self) -> bool {
        let submits = self.set_submits().await;
        for s in &submits {
            if s.state().await != super::SetState::Done {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn double_initialise_fails() {
        // Package loading touches the filesystem, so this only exercises
        // the guard directly rather than a full initialise() call.
        let ts = TaskSubmit::new(
            "t1".into(),
            "/nonexistent/pkg".into(),
            "abc".into(),
            "/nonexistent/solution".into(),
        );
        {
            let mut inner = ts.inner.lock().await;
            inner.set_submits = Some(vec![]);
        }
        let result = ts.initialise(|_| unreachable!()).await;
        assert!(matches!(result, Err(BrokerError::AlreadyInitialised)));
    }

    #[tokio::test]
    async fn transition_requires_current_state() {
        let ts = TaskSubmit::new(
            "t1".into(),
            "/pkg".into(),
            "abc".into(),
            "/sol".into(),
        );
        assert!(ts
            .change_state(TaskState::AwaitingSets, Some(&[TaskState::Initial]))
            .await
            .is_ok());
        assert!(ts
            .change_state(TaskState::AwaitingSets, Some(&[TaskState::Initial]))
            .await
            .is_err());
    }
}
