//! clipshare board server
//!
//! Keeps the shared board in memory and pushes changes to connected clients.
//!
//! # Configuration
//!
//! Environment variables:
//! - `CLIPSHARE_PORT`: Port to listen on (default: 8080)
//! - `CLIPSHARE_PUBLIC_HOST`: Host advertised by `/getSocketInfo` (default: localhost)
//! - `CLIPSHARE_MAX_UPLOAD_MB`: Largest accepted upload (default: 512)
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint
//! - `GET /getSocketInfo`: Push endpoint discovery
//! - `POST /upload`: Multipart upload
//! - `GET /files/{hash}`: File download
//! - `GET /`: WebSocket push channel

use std::net::SocketAddr;

use clipshare::server::{router, AppState, ServerConfig};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipshare=info,clipshare_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!(
        "Advertising push endpoint ws://{}:{}/",
        config.public_host,
        config.port
    );

    let app = router(AppState::new(config)).layer(TraceLayer::new_for_http());

    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
