use std::{net::SocketAddr, sync::Arc};

use tokio::{signal, sync::watch};
use tracing::{error, info, warn};

use inventory_ledger as ledger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = ledger::config::load_config()?;
    ledger::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = ledger::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        ledger::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_sender, event_rx) = ledger::events::EventSender::channel(cfg.event_channel_capacity);
    tokio::spawn(ledger::events::process_events(event_rx));

    let state = ledger::AppState::new(db_arc, cfg.clone(), event_sender);

    // Expiration sweeper runs until shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = state.sweeper.clone().spawn(shutdown_rx);

    let app = ledger::app_router(state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!("inventory-ledger listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped; stopping reservation sweeper");
    if shutdown_tx.send(true).is_err() {
        warn!("reservation sweeper already stopped");
    }
    if let Err(e) = sweeper.await {
        error!("reservation sweeper task failed: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
