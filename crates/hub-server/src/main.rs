use std::sync::Arc;

use tracing::{info, warn};

use hub_api::{AppState, AppStateInner, build_router};
use hub_db::Database;
use hub_gateway::dispatcher::Dispatcher;
use hub_gateway::scheduler::run_scheduler_loop;
use hub_server::config::Config;
use hub_service::MessageService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "community_hub=debug,hub_gateway=debug,hub_service=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    if config.uses_dev_secret() {
        warn!("HUB_JWT_SECRET is unset; using the development secret");
    }

    // Init database
    let db = Database::open(&config.db_path)?;
    let service = MessageService::new(Arc::new(db));
    let dispatcher = Dispatcher::default();

    // Scheduled-message sweeper
    tokio::spawn(run_scheduler_loop(
        service.clone(),
        dispatcher.clone(),
        config.scheduler_interval,
    ));

    let state: AppState = Arc::new(AppStateInner {
        service,
        dispatcher,
        jwt_secret: config.jwt_secret.clone(),
        require_session: config.require_session,
    });
    let app = build_router(state);

    let addr = config.bind_addr()?;
    info!("Community hub listening on {}", addr);
    if config.require_session {
        info!("Gateway joins require a session token");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Community hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
