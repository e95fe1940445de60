//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::demo::DemoServices;
use api::{AppState, create_app, create_default_state, create_state, http_collaborators};
use booking_store::{BookingStore, PostgresBookingStore};
use domain::{Clock, SystemClock};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
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
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<S: BookingStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
    addr: &str,
) {
    let app = create_app(state, metrics_handle);

    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let policy = config.lead_time_policy();
    let addr = config.addr();

    // 3. Collaborators
    let collaborators = if config.uses_remote_collaborators() {
        tracing::info!("using HTTP collaborators");
        Some(http_collaborators(&config).expect("failed to build collaborator client"))
    } else {
        None
    };

    // 4. Store and application state
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresBookingStore::new(pool);
            store.run_migrations().await.expect("migrations failed");
            tracing::info!("using PostgreSQL booking store");

            let collaborators = collaborators.unwrap_or_else(|| {
                DemoServices::new(clock.clone(), policy.today(clock.now())).collaborators()
            });
            let state = create_state(store, collaborators, policy, clock);
            serve(state, metrics_handle, &addr).await;
        }
        None => {
            tracing::info!("using seeded in-memory booking store");
            let (state, _demo) = create_default_state(policy, clock.clone())
                .await
                .expect("failed to seed demo fleet");
            let state = match collaborators {
                Some(collaborators) => {
                    let store = state.saga.bookings().store().clone();
                    create_state(store, collaborators, policy, clock)
                }
                None => state,
            };
            serve(state, metrics_handle, &addr).await;
        }
    }
}
