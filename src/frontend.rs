//! Posts aggregated results, or a structured error, back to the
//! front-end.

use std::collections::HashMap;

use reqwest::Client;
use tracing::{error, warn};

use crate::error::FrontEndError;
use crate::result::{make_hash, BrokerToBaca, BrokerToBacaError};
use crate::submit::TaskSubmit;

pub struct BacaMessenger {
    client: Client,
    success_url: String,
    error_url: String,
    password: String,
}

impl BacaMessenger {
    pub fn new(success_url: String, error_url: String, password: String) -> Self {
        Self {
            client: Client::new(),
            success_url,
            error_url,
            password,
        }
    }

    /// Posts the aggregated per-set results for a completed task.
    pub async fn send_success(
        &self,
        task: &TaskSubmit,
        results: HashMap<String, crate::result::SetResult>,
    ) -> Result<(), FrontEndError> {
        let message = BrokerToBaca {
            pass_hash: make_hash(&self.password, &task.submit_id),
            submit_id: task.submit_id.clone(),
            results,
        };
        let response = self
            .client
            .post(&self.success_url)
            .json(&message)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FrontEndError::BadStatus(response.status()));
        }
        Ok(())
    }

    /// Best-effort error report. Never raises — a failure here must not
    /// itself trigger a trash.
    pub async fn send_error(&self, task: &TaskSubmit, message: &str) -> bool {
        let body = BrokerToBacaError {
            pass_hash: make_hash(&self.password, &task.submit_id),
            submit_id: task.submit_id.clone(),
            error: message.to_string(),
        };
        match self.client.post(&self.error_url).json(&body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(submit_id = %task.submit_id, status = %response.status(), "front-end rejected error report");
                false
            }
            Err(e) => {
                error!(submit_id = %task.submit_id, error = %e, "failed to reach front-end with error report");
                false
            }
        }
    }
}
