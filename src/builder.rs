//! Renders a package revision into a KOLEJKA cluster task description:
//! a shared `common/test.yaml` plus, per test set, a `test.yaml` that
//! `!include`s the common one and a `tests.yaml` listing every test,
//! each test's `input`/`hint` tagged `!file` so the cluster resolves
//! them as file references.

use std::path::Path;

use serde::Serialize;
use serde_yaml::Value;
use tokio::fs;

use crate::error::PackageError;
use crate::package::{Package, PackageManager, TestSet};

/// `serde_yaml` refuses to emit a bare tag on a scalar, so cross-file
/// `!include` references are written as this sentinel and rewritten to
/// the real tag in a textual post-pass. The cluster's own loader reads
/// `!include <path>` verbatim, so this on-disk contract must hold.
const INCLUDE_TAG: &str = "0tag::include";

/// Same trick as [`INCLUDE_TAG`], but as a value prefix rather than a
/// bare key: a test's `input`/`hint` entries must be tagged `!file
/// <name>` so the cluster's loader resolves them as file references
/// rather than plain strings.
const FILE_TAG: &str = "0tag::file:";

fn translate_key(key: &str) -> &str {
    match key {
        "test_generator" => "generator",
        "memory_limit" => "memory",
        "time_limit" => "time",
        other => other,
    }
}

pub struct Builder {
    enable_shortcut: bool,
}

impl Builder {
    pub fn new(enable_shortcut: bool) -> Self {
        Self { enable_shortcut }
    }

    async fn write_yaml<T: Serialize>(
        value: &T,
        path: &Path,
        namespace: &str,
    ) -> Result<(), PackageError> {
        let raw = serde_yaml::to_string(value).map_err(|e| PackageError::Build {
            namespace: namespace.to_string(),
            message: format!("serializing {}: {e}", path.display()),
        })?;
        let rewritten = raw
            .replace(INCLUDE_TAG, "!include ")
            .replace(FILE_TAG, "!file ");
        fs::write(path, rewritten).await?;
        Ok(())
    }

    fn generate_common_test_yaml(&self, package: &Package) -> Value {
        let mut limits = serde_yaml::Mapping::new();
        limits.insert("time".into(), "600s".into());
        limits.insert("memory".into(), "10G".into());
        limits.insert("swap".into(), 0.into());
        limits.insert("cpus".into(), package.cpus.into());
        limits.insert("network".into(), package.network.into());
        limits.insert("storage".into(), "5G".into());
        limits.insert("workspace".into(), "5G".into());

        let mut kolejka = serde_yaml::Mapping::new();
        kolejka.insert("image".into(), "kolejka/satori:judge".into());
        kolejka.insert("exclusive".into(), false.into());
        kolejka.insert("requires".into(), vec!["cpu:xeon e3-1270 v5"].into());
        kolejka.insert("collect".into(), vec!["log.zip"].into());
        kolejka.insert("limits".into(), Value::Mapping(limits));

        if self.enable_shortcut {
            let mut result = serde_yaml::Mapping::new();
            result.insert(
                "execute_time_real".into(),
                "/io/executor/run/real_time".into(),
            );
            result.insert(
                "execute_time_cpu".into(),
                "/io/executor/run/cpu_time".into(),
            );
            result.insert("execute_memory".into(), "/io/executor/run/memory".into());
            result.insert(
                "compile_log".into(),
                "str:/builder/**/stdout,/builder/**/stderr".into(),
            );
            result.insert(
                "tool_log".into(),
                "str:/io/generator/**/stderr,/io/verifier/**/stdout,/io/verifier/**/stderr,/io/hinter/**/stderr".into(),
            );
            result.insert(
                "checker_log".into(),
                "str:/io/checker/**/stdout,/io/checker/**/stderr".into(),
            );
            result.insert("answer".into(), "str:/io/executor/run/stdout".into());
            result.insert("logs".into(), "/logs/logs".into());
            result.insert("debug".into(), "/debug/debug".into());

            let mut satori = serde_yaml::Mapping::new();
            satori.insert("result".into(), Value::Mapping(result));
            kolejka.insert("satori".into(), Value::Mapping(satori));
        }

        let mut test_yaml = serde_yaml::Mapping::new();
        test_yaml.insert("memory".into(), "512MB".into());
        test_yaml.insert("kolejka".into(), Value::Mapping(kolejka));
        Value::Mapping(test_yaml)
    }

    fn generate_set_test_yaml(t_set: &TestSet) -> Value {
        let mut map = serde_yaml::Mapping::new();
        map.insert(INCLUDE_TAG.into(), "../common/test.yaml".into());

        if let Some(v) = t_set.time_limit {
            map.insert("time".into(), format!("{}ms", (v * 1000.0) as i64).into());
        }
        if let Some(v) = &t_set.memory_limit {
            map.insert(translate_key("memory_limit").into(), v.clone().into());
        }
        if let Some(v) = &t_set.test_generator {
            map.insert(translate_key("test_generator").into(), v.clone().into());
        }
        Value::Mapping(map)
    }

    fn generate_test_entry(test: &crate::package::TestCase, build_path: &Path) -> (Value, Vec<(std::path::PathBuf, std::path::PathBuf)>) {
        let mut map = serde_yaml::Mapping::new();
        map.insert(INCLUDE_TAG.into(), "test.yaml".into());
        let mut links = Vec::new();

        if let Some(input) = &test.input {
            let filename = format!("{}.in", test.name);
            links.push((input.clone(), build_path.join(&filename)));
            map.insert("input".into(), format!("{FILE_TAG}{filename}").into());
        }
        if let Some(output) = &test.output {
            let filename = format!("{}.out", test.name);
            links.push((output.clone(), build_path.join(&filename)));
            map.insert("hint".into(), format!("{FILE_TAG}{filename}").into());
        }
        if let Some(v) = test.time_limit {
            map.insert("time".into(), format!("{}ms", (v * 1000.0) as i64).into());
        }
        if let Some(v) = &test.memory_limit {
            map.insert("memory".into(), v.clone().into());
        }

        (Value::Mapping(map), links)
    }

    /// Builds the full cluster-task tree for `package` under
    /// `namespace`, optionally refreshing the cluster client binaries
    /// first.
    pub async fn build(
        &self,
        package: &Package,
        namespace: &str,
        packages: &PackageManager,
    ) -> Result<(), PackageError> {
        let build_path = package.build_path(namespace);
        fs::create_dir_all(&build_path).await?;

        let common_path = package.common_path(namespace);
        fs::create_dir_all(&common_path).await?;

        let common_test_yaml = self.generate_common_test_yaml(package);
        Self::write_yaml(&common_test_yaml, &common_path.join("test.yaml"), namespace).await?;

        let src = packages.kolejka_src_dir();
        symlink_or_copy(&src.join("kolejka-judge"), &common_path.join("kolejka-judge")).await?;
        symlink_or_copy(&src.join("kolejka-client"), &common_path.join("kolejka-client")).await?;
        symlink_or_copy(packages.judge_script_path(), &common_path.join("judge.py")).await?;

        for t_set in package.sets() {
            self.build_set(package, namespace, t_set).await?;
        }
        Ok(())
    }

    async fn build_set(
        &self,
        package: &Package,
        namespace: &str,
        t_set: &TestSet,
    ) -> Result<(), PackageError> {
        let set_path = package.build_path(namespace).join(&t_set.name);
        fs::create_dir_all(&set_path).await?;

        let test_yaml = Self::generate_set_test_yaml(t_set);
        Self::write_yaml(&test_yaml, &set_path.join("test.yaml"), namespace).await?;

        let mut tests_yaml = serde_yaml::Mapping::new();
        for test in &t_set.tests {
            let (entry, links) = Self::generate_test_entry(test, &set_path);
            for (src, dst) in links {
                symlink_or_copy(&src, &dst).await?;
            }
            tests_yaml.insert(test.name.clone().into(), entry);
        }
        Self::write_yaml(&Value::Mapping(tests_yaml), &set_path.join("tests.yaml"), namespace).await?;
        Ok(())
    }
}

#[cfg(unix)]
async fn symlink_or_copy(src: &Path, dst: &Path) -> Result<(), PackageError> {
    tokio::fs::symlink(src, dst).await.or_else(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            Ok(())
        } else {
            Err(e)
        }
    })?;
    Ok(())
}

#[cfg(not(unix))]
async fn symlink_or_copy(src: &Path, dst: &Path) -> Result<(), PackageError> {
    tokio::fs::copy(src, dst).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::TestSet;

    #[test]
    fn translates_known_keys() {
        assert_eq!(translate_key("test_generator"), "generator");
        assert_eq!(translate_key("memory_limit"), "memory");
        assert_eq!(translate_key("time_limit"), "time");
        assert_eq!(translate_key("unknown"), "unknown");
    }

    #[test]
    fn set_test_yaml_includes_common_and_translated_time() {
        let t_set = TestSet {
            name: "set1".into(),
            points: None,
            weight: None,
            time_limit: Some(2.5),
            memory_limit: None,
            test_generator: None,
            tests: vec![],
        };
        let rendered = Builder::generate_set_test_yaml(&t_set);
        let as_string = serde_yaml::to_string(&rendered).unwrap();
        assert!(as_string.contains(INCLUDE_TAG));
        assert!(as_string.contains("2500ms"));
    }

    #[test]
    fn test_entry_tags_input_and_hint_as_file_references() {
        let test = crate::package::TestCase {
            name: "test1".into(),
            input: Some("/pkg/tests/test1.in".into()),
            output: Some("/pkg/tests/test1.out".into()),
            time_limit: None,
            memory_limit: None,
        };
        let (rendered, links) = Builder::generate_test_entry(&test, Path::new("/build/set1"));
        assert_eq!(links.len(), 2);

        let raw = serde_yaml::to_string(&rendered).unwrap();
        let rewritten = raw.replace(INCLUDE_TAG, "!include ").replace(FILE_TAG, "!file ");
        assert!(rewritten.contains("input: !file test1.in"));
        assert!(rewritten.contains("hint: !file test1.out"));
    }
}
