//! # meetgate: HTTP gateway for meeting records
//!
//! `meetgate` is the backend of a small meeting-minutes application. Meeting records are stored
//! in a Vika datasheet (a hosted spreadsheet-as-database); this crate exposes a JSON API in front
//! of it, together with an image upload endpoint, a server-side image proxy and static hosting for
//! the prebuilt frontend.
//!
//! ## Request Flow
//!
//! - `/api/meetings` requests are validated and forwarded to the vendor datasheet through the
//!   [`vendor::Datasheet`] trait. Record creation is retried a bounded number of times with a
//!   fixed delay; every other call is attempted once.
//! - `/api/upload` stores the image under the uploads directory and forwards it to the vendor
//!   attachment endpoint. When the vendor upload fails the local copy is described instead, and
//!   the response's `storage` field says which one the client got.
//! - `/api/proxy-image` fetches a remote image with a fixed `Referer` so the vendor CDN serves it.
//!   The target URL is not restricted, which makes this an open proxy; deploy accordingly.
//! - Everything else is served from the static asset directory, with `/uploads` mapped to the
//!   uploads directory.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use meetgate::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = meetgate::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     meetgate::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```
pub mod api;
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod vendor;

#[cfg(test)]
mod test;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    routing::{get, post, put},
};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};

use crate::config::CorsOrigin;
use crate::vendor::{Datasheet, VikaDatasheet};

/// Multipart framing overhead allowed on top of the file size limit.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .datasheet(Arc::new(VikaDatasheet::new(&config.vendor)?))
///     .http_client(reqwest::Client::new())
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    /// Vendor datasheet holding meeting records
    pub datasheet: Arc<dyn Datasheet>,
    /// Client used for image proxy fetches
    pub http_client: reqwest::Client,
}

/// Install the process-wide rustls crypto provider. Calling it again is a no-op.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allow_origin = if config.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// API routes are matched first; `/uploads` and the frontend bundle are served from disk for
/// everything else.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let upload_limit = state.config.uploads.max_file_size + MULTIPART_OVERHEAD;

    let api_routes = Router::new()
        .route(
            "/meetings",
            get(api::handlers::meetings::list_meetings).post(api::handlers::meetings::create_meeting),
        )
        .route(
            "/meetings/{record_id}",
            put(api::handlers::meetings::update_meeting).delete(api::handlers::meetings::delete_meeting),
        )
        .route(
            "/upload",
            post(api::handlers::uploads::upload_image).layer(DefaultBodyLimit::max(upload_limit as usize)),
        )
        .route("/proxy-image", get(api::handlers::proxy::proxy_image))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api", api_routes)
        .merge(api::handlers::static_assets::router(&state.config));

    let router = router.layer(create_cors_layer(&state.config)?);

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application talking to the configured Vika datasheet
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        install_crypto_provider();
        let datasheet = VikaDatasheet::new(&config.vendor).context("Failed to create vendor HTTP client")?;
        Self::with_datasheet(config, Arc::new(datasheet)).await
    }

    /// Create an application backed by any [`Datasheet`] implementation
    pub async fn with_datasheet(
        config: Config,
        datasheet: Arc<dyn Datasheet>,
    ) -> anyhow::Result<Self> {
        install_crypto_provider();
        debug!("Starting meeting gateway with configuration: {:#?}", config);

        tokio::fs::create_dir_all(&config.uploads.dir)
            .await
            .with_context(|| format!("Failed to create uploads directory {}", config.uploads.dir.display()))?;

        let worst_case = config.worst_case_create_latency();
        if worst_case > config.vendor.request_timeout {
            warn!(
                attempts = config.records.create_retry.max_attempts,
                vendor_retries = config.vendor.request_retries,
                request_timeout = ?config.vendor.request_timeout,
                "Meeting creation has no overall timeout and may take up to {:?} before failing",
                worst_case
            );
        }

        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to create image proxy HTTP client")?;

        let state = AppState::builder()
            .config(config.clone())
            .datasheet(datasheet)
            .http_client(http_client)
            .build();

        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Meeting gateway listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
