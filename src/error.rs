//! Crate-wide error taxonomy.
//!
//! Each component boundary gets its own `thiserror` enum; the
//! orchestrator's supervised region wraps all of them in [`BrokerError`]
//! so a single `trash` path can handle any failure uniformly.

use thiserror::Error;

/// Errors raised by the in-memory registry (DataMaster).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("task submit '{0}' already exists")]
    TaskAlreadyExists(String),

    #[error("set submit '{0}' already exists")]
    SetAlreadyExists(String),

    #[error("task submit '{0}' does not exist")]
    TaskNotFound(String),

    #[error("set submit '{0}' does not exist")]
    SetNotFound(String),
}

/// Raised when a guarded state transition is attempted from a state
/// not present in the `requires` set.
#[derive(Debug, Error)]
#[error("illegal transition for {kind} '{id}': {from} -> {to} (requires {requires:?})")]
pub struct StateError {
    pub kind: &'static str,
    pub id: String,
    pub from: String,
    pub to: String,
    pub requires: Vec<String>,
}

/// Errors raised while loading or building a package.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("package metadata load failed for '{path}': {source}")]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("package build failed for namespace '{namespace}': {message}")]
    Build { namespace: String, message: String },

    #[error("invalid package manifest at '{path}': {message}")]
    Manifest { path: String, message: String },

    #[error("failed to refresh cluster client binaries: {0}")]
    Refresh(#[from] reqwest::Error),

    #[error("io error while preparing build: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while talking to the execution cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("kolejka judge failed to create task; stderr: {0}")]
    JudgeFailed(String),

    #[error("kolejka client failed to communicate with cluster: {0}")]
    ClientFailed(String),

    #[error("kolejka client failed to fetch results: {0}")]
    ResultFetchFailed(String),

    #[error("failed to parse cluster results: {0}")]
    ResultParse(#[from] serde_yaml::Error),

    #[error("io error while invoking cluster tooling: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while talking to the front-end.
#[derive(Debug, Error)]
pub enum FrontEndError {
    #[error("front-end responded with non-success status: {0}")]
    BadStatus(reqwest::StatusCode),

    #[error("transport error while contacting front-end: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Top-level error type for the orchestrator's supervised region.
///
/// Any variant here causes the owning `TaskSubmit` to be trashed.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    FrontEnd(#[from] FrontEndError),

    #[error("task submit already initialised")]
    AlreadyInitialised,
}

pub type BrokerResult<T> = Result<T, BrokerError>;
