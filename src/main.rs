use gamespheres::{AppState, IdentityProvider, Limits, SqliteStore, config::Config, follows};
use tokio::{net::TcpListener, signal::ctrl_c};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;

    info!("Connecting to {}", config.database_url);
    let store = SqliteStore::connect(&config.database_url, config.database_max_connections, config.retry_policy()).await?;
    store.migrate().await?;

    let identity = IdentityProvider::firebase(&config.identity_url, &config.firebase_api_key)?;
    let app_state = AppState {
        store: store.clone(),
        identity,
        limits: Limits {
            max_username_probes: config.max_username_probes,
        },
    };

    if let Some(every) = config.reconcile_interval {
        info!("Reconciling follow graph every {every:?}");
        tokio::spawn(follows::run_reconciler(store, every, config.reconcile_page_size));
    }

    let app = gamespheres::app(app_state);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Server running on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
