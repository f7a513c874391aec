use std::net::SocketAddr;

use axum::http::{HeaderValue, Method};
use tikio::{AppState, config::Config, error::ApiError, routes::build_router};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tikio=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = Config::from_env();
    info!(
        "environment: port={} node_env={} upstream={}",
        config.port, config.node_env, config.tikwm_base_url
    );

    let cors = build_cors_layer(&config.cors_origin);
    let addr = config.bind_addr();
    let state = AppState::new(config)?;

    let app = build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|error| ApiError::internal(format!("Failed to bind {addr}: {error}")))?;

    info!("Tikio API listening on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}

fn build_cors_layer(cors_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(86_400));

    if cors_origin == "*" {
        return cors.allow_origin(Any);
    }

    let origins = cors_origin
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect::<Vec<_>>();

    if origins.is_empty() {
        warn!("CORS_ORIGIN had no usable origins, falling back to allow-all");
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}
