use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StateError;
use crate::result::SetResult;

/// Lifecycle of one test set's execution on the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetState {
    Initial,
    SendingToCluster,
    AwaitingCluster,
    WaitingForResults,
    Done,
    Error,
}

impl SetState {
    fn as_str(self) -> &'static str {
        match self {
            SetState::Initial => "INITIAL",
            SetState::SendingToCluster => "SENDING_TO_CLUSTER",
            SetState::AwaitingCluster => "AWAITING_CLUSTER",
            SetState::WaitingForResults => "WAITING_FOR_RESULTS",
            SetState::Done => "DONE",
            SetState::Error => "ERROR",
        }
    }
}

struct Inner {
    state: SetState,
    mod_date: DateTime<Utc>,
    status_code: Option<String>,
    result: Option<SetResult>,
}

/// One independent unit of work for a [`crate::submit::TaskSubmit`],
/// corresponding to one named test set of the package.
pub struct SetSubmit {
    pub submit_id: String,
    pub task_submit_id: String,
    pub set_name: String,
    pub creation_date: DateTime<Utc>,
    inner: Mutex<Inner>,
}

impl SetSubmit {
    pub fn new(submit_id: String, task_submit_id: String, set_name: String) -> Self {
        let now = Utc::now();
        Self {
            submit_id,
            task_submit_id,
            set_name,
            creation_date: now,
            inner: Mutex::new(Inner {
                state: SetState::Initial,
                mod_date: now,
                status_code: None,
                result: None,
            }),
        }
    }

    pub async fn state(&self) -> SetState {
        self.inner.lock().await.state
    }

    /// Guarded transition. `requires = None` is unguarded (used only to
    /// force the terminal `Error` state from the trash path).
    pub async fn change_state(
        &self,
        new: SetState,
        requires: Option<&[SetState]>,
    ) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        if let Some(allowed) = requires {
            if !allowed.contains(&inner.state) {
                return Err(StateError {
                    kind: "SetSubmit",
                    id: self.submit_id.clone(),
                    from: inner.state.as_str().into(),
                    to: new.as_str().into(),
                    requires: allowed.iter().map(|s| s.as_str().to_string()).collect(),
                });
            }
        }
        debug!(
            set_submit = %self.submit_id,
            from = inner.state.as_str(),
            to = new.as_str(),
            "set submit state transition"
        );
        inner.state = new;
        inner.mod_date = Utc::now();
        Ok(())
    }

    pub async fn set_status_code(&self, status_code: String) {
        self.inner.lock().await.status_code = Some(status_code);
    }

    pub async fn status_code(&self) -> Option<String> {
        self.inner.lock().await.status_code.clone()
    }

    pub async fn set_result(&self, result: SetResult) {
        self.inner.lock().await.result = Some(result);
    }

    pub async fn result(&self) -> Option<SetResult> {
        self.inner.lock().await.result.clone()
    }

    pub async fn mod_date(&self) -> DateTime<Utc> {
        self.inner.lock().await.mod_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn legal_transition_succeeds() {
        let s = SetSubmit::new("t_s1".into(), "t".into(), "s1".into());
        s.change_state(SetState::SendingToCluster, Some(&[SetState::Initial]))
            .await
            .unwrap();
        assert_eq!(s.state().await, SetState::SendingToCluster);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_and_leaves_state_unchanged() {
        let s = SetSubmit::new("t_s1".into(), "t".into(), "s1".into());
        let err = s
            .change_state(SetState::Done, Some(&[SetState::WaitingForResults]))
            .await;
        assert!(err.is_err());
        assert_eq!(s.state().await, SetState::Initial);
    }

    #[tokio::test]
    async fn error_transition_is_always_unguarded() {
        let s = SetSubmit::new("t_s1".into(), "t".into(), "s1".into());
        s.change_state(SetState::Error, None).await.unwrap();
        assert_eq!(s.state().await, SetState::Error);
    }
}
