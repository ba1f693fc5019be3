//! Bit-exact parser for the cluster's `results.yaml`.

use std::collections::HashMap;
use std::path::Path;

use serde::de::Error as _;
use serde::Deserialize;
use tokio::fs;

use crate::error::ClusterError;
use crate::result::{SetResult, TestResult};

#[derive(Debug, Deserialize)]
struct SatoriEntry {
    status: String,
    execute_time_real: String,
    execute_time_cpu: String,
    execute_memory: String,
}

#[derive(Debug, Deserialize)]
struct ResultEntry {
    satori: SatoriEntry,
}

/// Parses `<result_dir>/results/results.yaml`. The three numeric
/// fields carry a trailing unit character (`s`, `s`, `B`, ...) that is
/// stripped before conversion, matching the cluster's own reporting
/// format exactly.
pub async fn parse_results(set_name: &str, result_dir: &Path) -> Result<SetResult, ClusterError> {
    let path = result_dir.join("results").join("results.yaml");
    let contents = fs::read_to_string(&path).await?;
    let raw: HashMap<String, ResultEntry> = serde_yaml::from_str(&contents)?;

    let mut tests = HashMap::with_capacity(raw.len());
    for (name, entry) in raw {
        let satori = entry.satori;
        let time_real = strip_unit(&satori.execute_time_real).parse::<f64>().map_err(|e| {
            ClusterError::ResultParse(serde_yaml::Error::from(
                serde::de::Error::custom(format!("execute_time_real: {e}")),
            ))
        })?;
        let time_cpu = strip_unit(&satori.execute_time_cpu).parse::<f64>().map_err(|e| {
            ClusterError::ResultParse(serde_yaml::Error::from(
                serde::de::Error::custom(format!("execute_time_cpu: {e}")),
            ))
        })?;
        let runtime_memory = strip_unit(&satori.execute_memory).parse::<i64>().map_err(|e| {
            ClusterError::ResultParse(serde_yaml::Error::from(
                serde::de::Error::custom(format!("execute_memory: {e}")),
            ))
        })?;

        tests.insert(
            name.clone(),
            TestResult {
                name,
                status: satori.status,
                time_real,
                time_cpu,
                runtime_memory,
            },
        );
    }

    Ok(SetResult {
        name: set_name.to_string(),
        tests,
    })
}

fn strip_unit(value: &str) -> &str {
    if value.is_empty() {
        value
    } else {
        &value[..value.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_unit_removes_trailing_char() {
        assert_eq!(strip_unit("12.5s"), "12.5");
        assert_eq!(strip_unit("2048B"), "2048");
        assert_eq!(strip_unit(""), "");
    }

    #[tokio::test]
    async fn parse_results_is_pure_given_same_file() {
        let dir = tempdir_with_results().await;
        let a = parse_results("set1", dir.path()).await.unwrap();
        let b = parse_results("set1", dir.path()).await.unwrap();
        assert_eq!(a, b);
    }

    async fn tempdir_with_results() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let results_dir = dir.path().join("results");
        fs::create_dir_all(&results_dir).await.unwrap();
        let yaml = "test1:\n  satori:\n    status: OK\n    execute_time_real: '1.5s'\n    execute_time_cpu: '1.2s'\n    execute_memory: '2048B'\n";
        fs::write(results_dir.join("results.yaml"), yaml).await.unwrap();
        dir
    }
}
