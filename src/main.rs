#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use keygate::api::MgmtState;
use keygate::config::Config;
use keygate::services::auth_service::AuthService;
use keygate::services::health_service::HealthService;
use keygate::storage::credential_repo::CredentialRepository;
use keygate::storage::user_repo::UserRepository;
use keygate::storage::{CredentialStore, UserStore};
use keygate::workers::credential_cleanup::CredentialCleanupWorker;
use keygate::{api, storage, telemetry};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    telemetry::init_telemetry(&config.telemetry)?;

    let boot_span = tracing::info_span!("boot_server");
    let (api_listener, mgmt_listener, app_router, mgmt_app, shutdown_tx, shutdown_rx, cleanup_worker) = async {
        let pool = storage::init_pool(&config.database_url).await?;
        keygate::run_migrations(&pool).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        keygate::spawn_signal_handler(shutdown_tx.clone());

        let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(pool.clone()));
        let credentials: Arc<dyn CredentialStore> = Arc::new(CredentialRepository::new(pool));

        let auth_service = AuthService::new(config.auth.clone(), Arc::clone(&users), Arc::clone(&credentials));
        let health_service = HealthService::new(users, Arc::clone(&credentials));

        let cleanup_worker =
            CredentialCleanupWorker::new(Arc::clone(&credentials), config.auth.credential_sweep_interval_secs);

        let app_router = api::app_router(config.clone(), auth_service, credentials);
        let mgmt_app = api::mgmt_router(MgmtState { health_service });

        let api_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let mgmt_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.mgmt_port).parse()?;

        tracing::info!(address = %api_addr, "listening");
        tracing::info!(address = %mgmt_addr, "management server listening");

        let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
        let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;

        Ok::<_, anyhow::Error>((
            api_listener,
            mgmt_listener,
            app_router,
            mgmt_app,
            shutdown_tx,
            shutdown_rx,
            cleanup_worker,
        ))
    }
    .instrument(boot_span)
    .await?;

    let worker_task = tokio::spawn(cleanup_worker.run(shutdown_rx.clone()));

    let mut api_rx = shutdown_rx.clone();
    let api_server = axum::serve(api_listener, app_router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = api_rx.wait_for(|&s| s).await;
        });

    let mut mgmt_rx = shutdown_rx;
    let mgmt_server = axum::serve(mgmt_listener, mgmt_app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = mgmt_rx.wait_for(|&s| s).await;
        });

    if let Err(e) = tokio::try_join!(api_server, mgmt_server) {
        tracing::error!(error = %e, "Server error");
    }

    let _ = shutdown_tx.send(true);
    tokio::select! {
        _ = worker_task => {
            tracing::info!("Background tasks finished.");
        }
        () = tokio::time::sleep(std::time::Duration::from_secs(config.server.shutdown_timeout_secs)) => {
            tracing::warn!("Timeout waiting for background tasks to finish.");
        }
    }

    Ok(())
}
