//! Layered configuration, modelled on the `HYP_<agent>`-prefixed loader
//! used across the agent fleet this broker is patterned after.

use std::path::PathBuf;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

const ENV_PREFIX: &str = "BROKER";

/// Command-line entrypoint. Only seeds the layered loader below; it
/// never replaces it.
#[derive(Debug, Parser)]
#[command(name = "baca-broker", about = "Submission broker between BaCa2 and KOLEJKA")]
pub struct Cli {
    /// Path to an optional TOML settings file, layered over the
    /// built-in defaults and under environment variables.
    #[arg(long, env = "BROKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: "pretty" (default) or "json".
    #[arg(long, env = "BROKER_LOG_FORMAT")]
    pub log_format: Option<String>,
}

/// Fully resolved broker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Root directory under which per-submission working directories
    /// are created.
    pub submits_dir: PathBuf,

    /// Opaque namespace key the package manager builds packages under.
    pub build_namespace: String,

    /// Path to the cluster client's own config file.
    pub cluster_conf: PathBuf,

    /// Path to the judge script symlinked into every package build's
    /// common directory as `judge.py`.
    pub judge_script_path: PathBuf,

    /// Prefix prepended to a set submit id to form its callback URL.
    pub callback_url_prefix: String,

    /// Front-end endpoint that receives successful results.
    pub front_end_success_url: String,

    /// Front-end endpoint that receives structured errors.
    pub front_end_error_url: String,

    /// Shared secret this broker signs outbound messages to the
    /// front-end with.
    pub shared_secret_front_end: String,

    /// Shared secret the front-end must present on inbound submissions.
    pub shared_secret_broker: String,

    /// Seconds after which a non-terminal TaskSubmit is trashed by the
    /// janitor.
    pub task_submit_timeout_secs: u64,

    /// Seconds between janitor sweeps.
    pub janitor_interval_secs: u64,

    /// Always rebuild a package even if a cached build exists.
    #[serde(default)]
    pub force_rebuild_packages: bool,

    /// Use the active (blocking `client execute`) cluster adapter
    /// instead of the passive callback-driven one.
    #[serde(default)]
    pub active_wait: bool,

    /// Address the HTTP ingress listens on.
    pub bind_addr: String,

    /// Log formatter: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Settings {
    /// Load settings in the following precedence (lowest to highest):
    /// 1. built-in defaults
    /// 2. an optional file passed via `--config`/`BROKER_CONFIG`
    /// 3. environment variables prefixed `BROKER_`, `__`-nested
    pub fn load(cli: &Cli) -> eyre::Result<Self> {
        let mut builder = Config::builder()
            .set_default("submits_dir", "./submits")?
            .set_default("build_namespace", "default")?
            .set_default("cluster_conf", "./kolejka-client.conf")?
            .set_default("judge_script_path", "./judges/main.py")?
            .set_default("callback_url_prefix", "http://127.0.0.1:8080/callback/")?
            .set_default("front_end_success_url", "http://127.0.0.1:8000/broker/result")?
            .set_default("front_end_error_url", "http://127.0.0.1:8000/broker/error")?
            .set_default("shared_secret_front_end", "")?
            .set_default("shared_secret_broker", "")?
            .set_default("task_submit_timeout_secs", 3600_i64)?
            .set_default("janitor_interval_secs", 60_i64)?
            .set_default("force_rebuild_packages", false)?
            .set_default("active_wait", false)?
            .set_default("bind_addr", "0.0.0.0:8080")?
            .set_default("log_format", "pretty")?;

        if let Some(path) = &cli.config {
            builder = builder.add_source(File::from(path.clone()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        if let Some(fmt) = &cli.log_format {
            settings.log_format = fmt.clone();
        }
        Ok(settings)
    }
}
