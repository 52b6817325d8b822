//! # imgrelay: image uploads backed by a GitHub repository
//!
//! `imgrelay` is a small HTTP relay that lets a client upload or delete image files, persisting
//! them as committed files in a GitHub repository instead of on local disk or an object store.
//! Each request is translated into one or two calls against the repository contents API, and the
//! result is relayed back.
//!
//! ## Overview
//!
//! The relay holds no state of its own. Credentials and repository coordinates are read once at
//! startup into an immutable [`Config`], and every request is handled independently:
//!
//! - `GET /api/ping` acknowledges that the process is reachable
//! - `POST /api/upload` takes a multipart `image` field, commits it to
//!   `images/<unix-millis>_<sanitized-name>` and returns `{ path, url }`
//! - `POST /api/delete` takes `{ path }`, looks up the file's current version token and deletes
//!   it, returning `{ ok: true }`
//!
//! Failures from the remote store are relayed with the store's status code and body. Nothing is
//! retried.
//!
//! ## Architecture
//!
//! The HTTP layer is built on [Axum](https://github.com/tokio-rs/axum). Handlers in [`api`] parse
//! requests and hand them to [`relay::ImageRelay`], which derives storage paths and drives the
//! [`store::ContentStore`] capability. [`store::GithubContentStore`] implements that capability
//! with `reqwest`; [`store::InMemoryContentStore`] implements it in memory for tests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use imgrelay::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = imgrelay::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     imgrelay::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config)?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod config;
pub mod errors;
mod openapi;
pub mod relay;
pub mod store;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use crate::config::{CorsConfig, CorsOrigin};
use crate::openapi::ApiDoc;
use crate::relay::{ImageRelay, SystemClock};
use crate::store::{ContentStore, GithubContentStore};
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue, Method},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .relay(Arc::new(relay))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub relay: Arc<ImageRelay>,
}

/// Install the process-wide rustls crypto provider used by outbound HTTPS clients.
///
/// Safe to call more than once.
pub fn install_crypto_provider() {
    // An error only means a provider is already installed
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Build the relay from configuration. Missing credentials leave it without a store.
pub fn create_relay(config: &Config) -> anyhow::Result<ImageRelay> {
    let store = match config.github.credentials() {
        Some(credentials) => {
            info!(
                owner = %credentials.owner,
                repo = %credentials.repo,
                branch = %config.github.branch,
                "Storing images in GitHub repository"
            );
            let store = Arc::new(GithubContentStore::new(credentials, &config.github)?);
            Some(store as Arc<dyn ContentStore>)
        }
        None => {
            warn!(
                "GITHUB_TOKEN, GITHUB_OWNER, or GITHUB_REPO not set. Uploads and deletes will fail until configured."
            );
            None
        }
    };

    Ok(ImageRelay::new(store, Arc::new(SystemClock), config.upload.path_prefix.clone()))
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &CorsConfig) -> anyhow::Result<CorsLayer> {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_credentials(config.allow_credentials);

    if config.allowed_origins.contains(&CorsOrigin::Wildcard) {
        cors = cors.allow_origin(Any);
    } else {
        let mut origins = Vec::new();
        for origin in &config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        cors = cors.allow_origin(origins);
    }

    if let Some(max_age) = config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// This includes the relay endpoints, OpenAPI documentation, optional Prometheus metrics, CORS
/// and request tracing.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let upload_limit = usize::try_from(state.config.upload.max_file_size)?.saturating_add(MULTIPART_OVERHEAD);

    let api_routes = Router::new()
        .route("/api/ping", get(api::handlers::health::ping))
        .route(
            "/api/upload",
            post(api::handlers::images::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/delete", post(api::handlers::images::delete_image))
        .with_state(state.clone());

    let mut router = Router::new()
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/api/docs", ApiDoc::openapi()))
        .merge(api_routes);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(create_cors_layer(&state.config.cors)?),
    );

    Ok(router)
}

/// The relay's HTTP server.
///
/// 1. **Create**: [`Application::new`] builds the remote store client and router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests
/// 3. **Shutdown**: when the shutdown future resolves, in-flight requests finish and telemetry
///    is flushed
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting image relay with configuration: {:#?}", config);

        let relay = create_relay(&config)?;
        let app_state = AppState::builder().config(config.clone()).relay(Arc::new(relay)).build();
        let router = build_router(&app_state)?;

        Ok(Self { router, config })
    }

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
            "Image relay listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
