use async_trait::async_trait;
use tokio::process::Command;
use tracing::error;

use crate::error::ClusterError;
use crate::submit::{SetSubmit, TaskSubmit};

use super::{python_call, ClusterAdapter, ClusterPaths};

/// Callback-driven adapter: `dispatch` submits and returns immediately
/// with an opaque handle; the cluster later calls back and `collect`
/// fetches the results.
pub struct PassiveClusterAdapter {
    paths: ClusterPaths,
}

impl PassiveClusterAdapter {
    pub fn new(paths: ClusterPaths) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl ClusterAdapter for PassiveClusterAdapter {
    async fn dispatch(&self, task: &TaskSubmit, set: &SetSubmit) -> Result<(), ClusterError> {
        let package = task.package().await;
        let common = package.common_path(&self.paths.build_namespace);
        let kolejka_judge = common.join("kolejka-judge");
        let kolejka_client = common.join("kolejka-client");
        let judge_py = common.join("judge.py");

        let task_dir = self.paths.task_dir(&task.submit_id, &set.set_name);
        let set_submit_id = crate::submit::make_set_submit_id(&task.submit_id, &set.set_name);
        let callback_url = self.paths.callback_url(&set_submit_id);
        let tests_yaml = package
            .build_path(&self.paths.build_namespace)
            .join(&set.set_name)
            .join("tests.yaml");

        let judge_output = Command::new(python_call())
            .arg(&kolejka_judge)
            .arg("task")
            .arg("--callback")
            .arg(&callback_url)
            .arg("--library-path")
            .arg(&kolejka_judge)
            .arg(&judge_py)
            .arg(&tests_yaml)
            .arg(&task.solution_path)
            .arg(&task_dir)
            .output()
            .await?;

        if !judge_output.status.success() {
            let stderr = String::from_utf8_lossy(&judge_output.stderr).into_owned();
            error!(set_submit = %set.submit_id, %stderr, "kolejka judge failed");
            return Err(ClusterError::JudgeFailed(stderr));
        }

        let client_output = Command::new(python_call())
            .arg(&kolejka_client)
            .arg("--config-file")
            .arg(&self.paths.cluster_conf)
            .arg("task")
            .arg("put")
            .arg(&task_dir)
            .output()
            .await?;

        if !client_output.status.success() {
            let stderr = String::from_utf8_lossy(&client_output.stderr).into_owned();
            error!(set_submit = %set.submit_id, %stderr, "kolejka client task put failed");
            return Err(ClusterError::ClientFailed(stderr));
        }

        let status_code = String::from_utf8_lossy(&client_output.stdout)
            .trim()
            .to_string();
        set.set_status_code(status_code).await;
        Ok(())
    }

    async fn collect(&self, task: &TaskSubmit, set: &SetSubmit) -> Result<(), ClusterError> {
        let package = task.package().await;
        let kolejka_client = package
            .common_path(&self.paths.build_namespace)
            .join("kolejka-client");
        let result_dir = self.paths.result_dir(&task.submit_id, &set.set_name);
        let status_code = set
            .status_code()
            .await
            .ok_or_else(|| ClusterError::ResultFetchFailed("missing status code".into()))?;

        let output = Command::new(python_call())
            .arg(&kolejka_client)
            .arg("--config-file")
            .arg(&self.paths.cluster_conf)
            .arg("result")
            .arg("get")
            .arg(&status_code)
            .arg(&result_dir)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(set_submit = %set.submit_id, %stderr, "kolejka client result get failed");
            return Err(ClusterError::ResultFetchFailed(stderr));
        }

        let result = super::yaml::parse_results(&set.set_name, &result_dir).await?;
        set.set_result(result).await;
        Ok(())
    }
}
