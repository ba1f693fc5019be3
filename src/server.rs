//! The broker's thin HTTP ingress: one route accepts submissions, one
//! accepts cluster callbacks, plus health and metrics.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{info, warn};

use crate::metrics::BrokerMetrics;
use crate::orchestrator::Orchestrator;
use crate::result::make_hash;
use crate::settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub settings: Arc<Settings>,
    pub metrics: Arc<BrokerMetrics>,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionRequest {
    pub submit_id: String,
    pub pass_hash: String,
    pub package_path: String,
    pub commit_id: String,
    pub submit_path: String,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/submit", post(submit))
        .route("/callback/:set_submit_id", post(callback))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmissionRequest>,
) -> StatusCode {
    let expected = make_hash(&state.settings.shared_secret_broker, &req.submit_id);
    if req.pass_hash != expected {
        warn!(submit_id = %req.submit_id, "rejected submission with bad pass_hash");
        return StatusCode::UNAUTHORIZED;
    }

    info!(submit_id = %req.submit_id, "accepted submission");
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator
            .handle_submission(
                req.submit_id,
                req.package_path.into(),
                req.commit_id,
                req.submit_path.into(),
            )
            .await;
    });

    StatusCode::OK
}

async fn callback(
    State(state): State<AppState>,
    Path(set_submit_id): Path<String>,
) -> StatusCode {
    if state.settings.active_wait {
        // No callback surface in active mode; see DESIGN.md.
        return StatusCode::NOT_FOUND;
    }

    let normalised: String = set_submit_id.chars().filter(|c| *c != '_').collect();
    if !normalised.chars().all(|c| c.is_ascii_alphanumeric()) {
        warn!(set_submit_id = %set_submit_id, "rejected malformed callback path");
        return StatusCode::BAD_REQUEST;
    }

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.handle_cluster_callback(set_submit_id).await;
    });

    StatusCode::OK
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::cluster::{ClusterPaths, PassiveClusterAdapter};
    use crate::frontend::BacaMessenger;
    use crate::package::PackageManager;
    use crate::registry::Registry;

    fn test_state() -> AppState {
        let settings = Arc::new(Settings {
            submits_dir: "/tmp/submits".into(),
            build_namespace: "test".into(),
            cluster_conf: "/tmp/kolejka.conf".into(),
            judge_script_path: "/tmp/judges/main.py".into(),
            callback_url_prefix: "http://127.0.0.1:8080/callback/".into(),
            front_end_success_url: "http://127.0.0.1:9/success".into(),
            front_end_error_url: "http://127.0.0.1:9/error".into(),
            shared_secret_front_end: "front".into(),
            shared_secret_broker: "broker-secret".into(),
            task_submit_timeout_secs: 3600,
            janitor_interval_secs: 60,
            force_rebuild_packages: false,
            active_wait: false,
            bind_addr: "127.0.0.1:0".into(),
            log_format: "pretty".into(),
        });
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(BrokerMetrics::new());
        let paths = ClusterPaths {
            submits_dir: settings.submits_dir.clone(),
            build_namespace: settings.build_namespace.clone(),
            cluster_conf: settings.cluster_conf.clone(),
            callback_url_prefix: settings.callback_url_prefix.clone(),
        };
        let cluster = Arc::new(PassiveClusterAdapter::new(paths));
        let frontend = Arc::new(BacaMessenger::new(
            settings.front_end_success_url.clone(),
            settings.front_end_error_url.clone(),
            settings.shared_secret_front_end.clone(),
        ));
        let packages = Arc::new(PackageManager::new(
            "/tmp/kolejka-src".into(),
            settings.judge_script_path.clone(),
        ));
        let builder = Arc::new(Builder::new(true));
        let orchestrator = Arc::new(Orchestrator::new(
            registry,
            cluster,
            frontend,
            packages,
            builder,
            settings.clone(),
            metrics.clone(),
        ));
        AppState {
            orchestrator,
            settings,
            metrics,
        }
    }

    #[tokio::test]
    async fn submit_rejects_bad_pass_hash() {
        let state = test_state();
        let req = SubmissionRequest {
            submit_id: "s1".into(),
            pass_hash: "wrong".into(),
            package_path: "/pkg".into(),
            commit_id: "abc".into(),
            submit_path: "/sol".into(),
        };
        let status = submit(State(state), Json(req)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn callback_rejects_non_alphanumeric_path() {
        let state = test_state();
        let status = callback(State(state), Path("bad!id".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn callback_404s_in_active_mode() {
        let mut state = test_state();
        let mut settings = (*state.settings).clone();
        settings.active_wait = true;
        state.settings = Arc::new(settings);
        let status = callback(State(state), Path("abc123".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
