#![forbid(unsafe_code)]

//! Submission broker: mediates between the BaCa2 front-end and the
//! KOLEJKA execution cluster. Wires settings, telemetry, the registry,
//! the chosen cluster adapter, the orchestrator, the janitor and the
//! HTTP ingress together and runs until shut down.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;

use baca_broker::builder::Builder;
use baca_broker::cluster::{ActiveClusterAdapter, ClusterAdapter, ClusterPaths, PassiveClusterAdapter};
use baca_broker::frontend::BacaMessenger;
use baca_broker::janitor::Janitor;
use baca_broker::metrics::BrokerMetrics;
use baca_broker::orchestrator::Orchestrator;
use baca_broker::package::PackageManager;
use baca_broker::registry::Registry;
use baca_broker::server::{self, AppState};
use baca_broker::settings::{Cli, Settings};
use baca_broker::telemetry;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let settings = Arc::new(Settings::load(&cli)?);
    telemetry::init(&settings.log_format);

    info!(bind_addr = %settings.bind_addr, active_wait = settings.active_wait, "starting broker");

    let registry = Arc::new(Registry::new());
    let metrics = Arc::new(BrokerMetrics::new());
    let packages = Arc::new(PackageManager::new(
        settings.submits_dir.join(".kolejka-src"),
        settings.judge_script_path.clone(),
    ));
    let builder = Arc::new(Builder::new(true));
    let frontend = Arc::new(BacaMessenger::new(
        settings.front_end_success_url.clone(),
        settings.front_end_error_url.clone(),
        settings.shared_secret_front_end.clone(),
    ));

    let cluster_paths = ClusterPaths {
        submits_dir: settings.submits_dir.clone(),
        build_namespace: settings.build_namespace.clone(),
        cluster_conf: settings.cluster_conf.clone(),
        callback_url_prefix: settings.callback_url_prefix.clone(),
    };
    let cluster: Arc<dyn ClusterAdapter> = if settings.active_wait {
        Arc::new(ActiveClusterAdapter::new(cluster_paths))
    } else {
        Arc::new(PassiveClusterAdapter::new(cluster_paths))
    };

    let orchestrator = Arc::new(Orchestrator::new(
        registry.clone(),
        cluster,
        frontend,
        packages,
        builder,
        settings.clone(),
        metrics.clone(),
    ));

    let janitor = Janitor::new(
        registry.clone(),
        orchestrator.clone(),
        metrics.clone(),
        settings.task_submit_timeout_secs,
        settings.janitor_interval_secs,
    );
    let janitor_handle = tokio::spawn(janitor.run());

    let state = AppState {
        orchestrator,
        settings: settings.clone(),
        metrics,
    };
    let app = server::routes(state);
    let addr: std::net::SocketAddr = settings.bind_addr.parse()?;

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    janitor_handle.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
