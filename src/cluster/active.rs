use async_trait::async_trait;
use tokio::process::Command;
use tracing::error;

use crate::error::ClusterError;
use crate::submit::{SetSubmit, TaskSubmit};

use super::{python_call, ClusterAdapter, ClusterPaths};

/// Blocking adapter: a single `client execute` call submits and waits,
/// writing results in place. `collect` is then a no-op — `dispatch`
/// already left the parsed result on `set`.
pub struct ActiveClusterAdapter {
    paths: ClusterPaths,
}

impl ActiveClusterAdapter {
    pub fn new(paths: ClusterPaths) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl ClusterAdapter for ActiveClusterAdapter {
    async fn dispatch(&self, task: &TaskSubmit, set: &SetSubmit) -> Result<(), ClusterError> {
        let package = task.package().await;
        let common = package.common_path(&self.paths.build_namespace);
        let kolejka_judge = common.join("kolejka-judge");
        let kolejka_client = common.join("kolejka-client");
        let judge_py = common.join("judge.py");

        let task_dir = self.paths.task_dir(&task.submit_id, &set.set_name);
        let result_dir = self.paths.result_dir(&task.submit_id, &set.set_name);
        let tests_yaml = package
            .build_path(&self.paths.build_namespace)
            .join(&set.set_name)
            .join("tests.yaml");

        let judge_output = Command::new(python_call())
            .arg(&kolejka_judge)
            .arg("task")
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

        let execute_output = Command::new(python_call())
            .arg(&kolejka_client)
            .arg("--config-file")
            .arg(&self.paths.cluster_conf)
            .arg("execute")
            .arg(&task_dir)
            .arg(&result_dir)
            .output()
            .await?;

        if !execute_output.status.success() {
            let stderr = String::from_utf8_lossy(&execute_output.stderr).into_owned();
            error!(set_submit = %set.submit_id, %stderr, "kolejka client execute failed");
            return Err(ClusterError::ClientFailed(stderr));
        }

        let result = super::yaml::parse_results(&set.set_name, &result_dir).await?;
        set.set_status_code("active".into()).await;
        set.set_result(result).await;
        Ok(())
    }

    async fn collect(&self, _task: &TaskSubmit, _set: &SetSubmit) -> Result<(), ClusterError> {
        Ok(())
    }
}
