mod config;
mod constants;
mod errors;
mod middlewares;
mod models;
mod routes;
mod services;
mod state;
mod utils;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Json, Router,
};
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    config::Config,
    services::{rounds, scheduler},
    state::AppState,
};

async fn health_check() -> (StatusCode, String) {
    (StatusCode::OK, "Healthy!".to_string())
}

pub fn create_service(state: Arc<AppState>) -> Router {
    let (public_router, public_api) = OpenApiRouter::new()
        .nest("/auth", routes::auth::public_router())
        .split_for_parts();
    let (protected_router, protected_api) = OpenApiRouter::new()
        .nest("/auth", routes::auth::protected_router())
        .nest("/auctions", routes::auctions::router())
        .nest("/bids", routes::bids::router())
        .nest("/users", routes::users::router())
        .split_for_parts();

    let mut api = public_api;
    api.merge(protected_api);
    let api = Arc::new(api);

    let trace_layer =
        TraceLayer::new_for_http().on_request(|req: &Request<Body>, _: &tracing::Span| {
            tracing::info!("Got request with path: {}", req.uri().path());
        });

    Router::new()
        .merge(public_router)
        .merge(protected_router.layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::auth::auth_middleware,
        )))
        .route("/health", get(health_check))
        .route("/ws", get(routes::ws::ws_handler))
        .route(
            "/api-docs/openapi.json",
            get(move || {
                let api = api.clone();
                async move { Json((*api).clone()) }
            }),
        )
        .layer(trace_layer)
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let db = state::connect(&config).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (fire_tx, fire_rx) = mpsc::unbounded_channel();
    let (scheduler, wheel) = scheduler::spawn(db.clone(), fire_tx.clone(), shutdown_rx.clone());
    let sweeper = scheduler::spawn_sweeper(db.clone(), fire_tx, shutdown_rx.clone());

    let state = Arc::new(AppState::new(config, db, scheduler));
    let dispatcher = rounds::spawn_dispatcher(state.clone(), fire_rx, shutdown_rx);

    let app = create_service(state.clone());
    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr).await?;
    tracing::info!(addr = %state.config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    // Background tasks observe the shutdown flag and finish their in-flight
    // callback before exiting; wait for that drain.
    let _ = tokio::join!(wheel, sweeper, dispatcher);
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
}
