mod catalog;
mod config;
mod engines;
mod error;
mod format;
mod handlers;
mod package;
mod router;
mod session;

use anyhow::Context;
use config::Settings;
use engines::PdfiumRasterizer;
use handlers::{routes, AppState};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "filemill=info,tower_http=info".into()),
        )
        .init();

    let settings = Settings::from_env();
    info!(?settings, "Loaded settings");

    let rasterizer = PdfiumRasterizer::new(settings.pdfium_library_path.clone());
    let pdfium_ready = tokio::task::spawn_blocking(move || rasterizer.is_available())
        .await
        .unwrap_or(false);
    if pdfium_ready {
        info!("✓ pdfium available - PDF to image enabled");
    } else {
        warn!("✗ pdfium not found - PDF to image conversions will fail");
    }

    let addr = settings.addr.clone();
    let state = Arc::new(AppState::new(settings));

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("🚀 filemill running on http://{}", addr);
    info!("📖 API documentation: http://{}/info", addr);
    info!("🔄 Select a file: POST http://{}/select", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
