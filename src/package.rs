//! Package metadata and the memoised build cache.
//!
//! Mirrors the original system's `baca2PackageManager.Package`: a
//! directory tree describing a problem, partitioned into named test
//! sets, each carrying its own tests and resource-limit overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::fs;
use tracing::{info, warn};

use crate::error::PackageError;

/// A single test within a set.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub time_limit: Option<f64>,
    #[serde(default)]
    pub memory_limit: Option<String>,
}

/// A named test set within a package.
#[derive(Debug, Clone, Deserialize)]
pub struct TestSet {
    pub name: String,
    #[serde(default)]
    pub points: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub time_limit: Option<f64>,
    #[serde(default)]
    pub memory_limit: Option<String>,
    #[serde(default)]
    pub test_generator: Option<String>,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

/// Package-level settings, loaded from `package.yaml` at the package
/// root.
#[derive(Debug, Clone, Deserialize)]
struct PackageManifest {
    #[serde(default = "default_cpus")]
    cpus: u32,
    #[serde(default)]
    network: bool,
    #[serde(default)]
    source_size: Option<String>,
    #[serde(default)]
    sets: Vec<TestSet>,
}

fn default_cpus() -> u32 {
    1
}

/// A loaded package revision.
#[derive(Debug, Clone)]
pub struct Package {
    pub path: PathBuf,
    pub commit_id: String,
    pub cpus: u32,
    pub network: bool,
    sets: Vec<TestSet>,
}

impl Package {
    /// Loads package metadata from `<path>/package.yaml`. Blocking file
    /// I/O is offloaded to a worker thread.
    pub async fn load(path: PathBuf, commit_id: String) -> Result<Self, PackageError> {
        let manifest_path = path.join("package.yaml");
        let contents = fs::read_to_string(&manifest_path)
            .await
            .map_err(|source| PackageError::Load {
                path: manifest_path.display().to_string(),
                source,
            })?;
        let manifest: PackageManifest =
            serde_yaml::from_str(&contents).map_err(|e| PackageError::Manifest {
                path: manifest_path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            path,
            commit_id,
            cpus: manifest.cpus,
            network: manifest.network,
            sets: manifest.sets,
        })
    }

    pub fn sets(&self) -> &[TestSet] {
        &self.sets
    }

    /// Root directory a build under `namespace` lands in.
    pub fn build_path(&self, namespace: &str) -> PathBuf {
        self.path.join(".build").join(namespace)
    }

    pub fn common_path(&self, namespace: &str) -> PathBuf {
        self.build_path(namespace).join("common")
    }
}

/// Memoised, namespace-keyed package build cache plus the one-shot
/// cluster client binary refresh.
pub struct PackageManager {
    kolejka_src_dir: PathBuf,
    judge_script_path: PathBuf,
    judge_url: String,
    client_url: String,
}

impl PackageManager {
    pub fn new(kolejka_src_dir: PathBuf, judge_script_path: PathBuf) -> Self {
        Self {
            kolejka_src_dir,
            judge_script_path,
            judge_url: "https://kolejka.matinf.uj.edu.pl/kolejka-judge".into(),
            client_url: "https://kolejka.matinf.uj.edu.pl/kolejka-client".into(),
        }
    }

    /// Path to the judge script symlinked into every package build's
    /// common directory as `judge.py`.
    pub fn judge_script_path(&self) -> &Path {
        &self.judge_script_path
    }

    /// Whether `namespace` already has a build for this package.
    pub async fn check_build(&self, package: &Package, namespace: &str) -> bool {
        fs::metadata(package.common_path(namespace)).await.is_ok()
    }

    /// Downloads the cluster's `judge`/`client` tools into
    /// `kolejka_src_dir`, marking them executable on POSIX.
    pub async fn refresh_cluster_binaries(&self) -> Result<(), PackageError> {
        if fs::metadata(&self.kolejka_src_dir).await.is_ok() {
            fs::remove_dir_all(&self.kolejka_src_dir).await?;
        }
        fs::create_dir_all(&self.kolejka_src_dir).await?;

        let client = reqwest::Client::new();
        let judge_bytes = client.get(&self.judge_url).send().await?.bytes().await?;
        let client_bytes = client.get(&self.client_url).send().await?.bytes().await?;

        let judge_path = self.kolejka_src_dir.join("kolejka-judge");
        let client_path = self.kolejka_src_dir.join("kolejka-client");
        fs::write(&judge_path, &judge_bytes).await?;
        fs::write(&client_path, &client_bytes).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            for path in [&judge_path, &client_path] {
                let mut perm = fs::metadata(path).await?.permissions();
                perm.set_mode(perm.mode() | 0o111);
                fs::set_permissions(path, perm).await?;
            }
        }

        info!(dir = %self.kolejka_src_dir.display(), "refreshed cluster client binaries");
        Ok(())
    }

    pub fn kolejka_src_dir(&self) -> &Path {
        &self.kolejka_src_dir
    }

    /// Ensures a build exists for `package` under `namespace`, building
    /// (and optionally refreshing cluster binaries first) when absent
    /// or when `force_rebuild` is set. The caller (the orchestrator)
    /// must guarantee this is never invoked twice concurrently for the
    /// same `(package, namespace)` pair.
    pub async fn ensure_build(
        &self,
        package: &Package,
        namespace: &str,
        force_rebuild: bool,
        builder: &crate::builder::Builder,
    ) -> Result<(), PackageError> {
        if !force_rebuild && self.check_build(package, namespace).await {
            return Ok(());
        }
        if force_rebuild {
            warn!(package = %package.path.display(), "force rebuild requested");
            self.refresh_cluster_binaries().await?;
        }
        builder.build(package, namespace, self).await
    }
}
