//! Service binary wiring: storage selection, component construction, the
//! HTTP API and the background expiry sweeper.

pub mod api;
pub mod arguments;
pub mod marketplace;

use {
    crate::marketplace::Marketplace,
    acceptance::{AcceptanceArbiter, AcceptanceLock},
    rate_confirmation::{
        ExpirySweeper,
        Notifying,
        RateConfirmations,
        traits::LoggingNotifier,
    },
    sqlx::PgPool,
    std::sync::Arc,
    storage::{InMemoryStorage, LoadStoring, LockStoring, Postgres, WorkflowStoring},
};

pub async fn run(args: arguments::Arguments) {
    let (loads, locks, workflows): (
        Arc<dyn LoadStoring>,
        Arc<dyn LockStoring>,
        Arc<dyn WorkflowStoring>,
    ) = match &args.db_url {
        Some(url) => {
            let pool = PgPool::connect_lazy(url.as_str()).expect("failed to create database pool");
            let postgres = Arc::new(Postgres(pool));
            (postgres.clone(), postgres.clone(), postgres)
        }
        None => {
            tracing::warn!("no database configured, running on the in-memory store");
            let storage = Arc::new(InMemoryStorage::new());
            (storage.clone(), storage.clone(), storage)
        }
    };

    let notifier: Arc<dyn Notifying> = Arc::new(LoggingNotifier);
    let confirmations = Arc::new(RateConfirmations::new(
        workflows.clone(),
        loads.clone(),
        notifier.clone(),
        args.driver_decision_window,
    ));
    let marketplace = Arc::new(Marketplace::new(
        AcceptanceArbiter::new(AcceptanceLock::new(locks, args.lock_ttl), loads.clone()),
        confirmations.clone(),
    ));
    let sweeper = ExpirySweeper::new(workflows, loads, notifier, args.sweep_interval).spawn();

    let app = api::handle_all_routes(marketplace, confirmations);
    let listener = tokio::net::TcpListener::bind(args.bind_address)
        .await
        .expect("failed to bind API address");
    tracing::info!(address = %args.bind_address, "serving HTTP API");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("API server failed");

    tracing::info!("API stopped, shutting down the expiry sweeper");
    sweeper.stop().await;
}

#[cfg(unix)]
async fn shutdown_signal() {
    // Kubernetes sends sigterm, whereas locally sigint (ctrl-c) is most
    // common.
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install signal handler");
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .expect("failed to install signal handler");
    tokio::select! {
        _ = sigterm.recv() => (),
        _ = sigint.recv() => (),
    }
}

#[cfg(windows)]
async fn shutdown_signal() {
    // We don't support signal handling on windows.
    std::future::pending().await
}
