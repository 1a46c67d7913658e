//! Badge games binary entrypoint wiring the WAMP session and the status HTTP route.

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use badge_games::{
    config::AppConfig,
    routes,
    services::session_service,
    state::{AppState, SharedState},
};
use tokio::{net::TcpListener, sync::oneshot};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load().context("loading configuration")?;
    let port = config.port;
    let app_state = AppState::new(config);

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting status server");
    let listener = TcpListener::bind(addr).await.context("binding server")?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let session = run_session(app_state).await;

    let _ = stop_tx.send(());
    server
        .await
        .context("joining status server")?
        .context("serving axum")?;

    session
}

/// Connect to the router and process events until disconnect or shutdown.
async fn run_session(state: SharedState) -> anyhow::Result<()> {
    let bus = session_service::connect(&state)
        .await
        .context("connecting to the bus")?;
    info!(game_id = %state.game_id(), "joined realm");

    if let Err(err) = session_service::run(state, bus, shutdown_signal()).await {
        error!(error = %err, "session ended with an error");
        return Err(err).context("running session");
    }
    info!("session ended");
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
