//! # ocrgw: OCR proxy gateway
//!
//! `ocrgw` sits between a browser frontend and a remote table-recognition (OCR) service. The
//! frontend uploads a document to `POST /ocr`; the gateway forwards the raw bytes to the OCR
//! service, reads the spreadsheet rendition embedded in the answer, and returns one normalized
//! JSON document:
//!
//! ```json
//! {
//!   "filename": "invoice.png",
//!   "excel_base64": "UEsDBBQ...",
//!   "ocr_json": { "excel": "UEsDBBQ...", "pages": [] },
//!   "has_excel_data": true
//! }
//! ```
//!
//! ## Request Flow
//!
//! Each request runs a linear pipeline, and every stage can end it with a JSON error body:
//!
//! 1. **Extract upload**: the multipart part named `file` ([`api::handlers::ocr`])
//! 2. **Forward**: one POST to the OCR service with an octet-stream body ([`upstream`])
//! 3. **Check status**: anything but 200 is passed back with its status and body text
//! 4. **Parse**: `result.excel` and the whole `result` object are pulled from the JSON body
//! 5. **Inspect**: the workbook is decoded and A1 of the first sheet checked ([`spreadsheet`])
//! 6. **Assemble**: the [`OcrResponse`](api::models::ocr::OcrResponse) is returned
//!
//! The failure kinds are listed in [`errors::Error`]. Nothing is stored and nothing is shared
//! between requests except the upstream connection pool.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use ocrgw::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = ocrgw::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     ocrgw::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     Application::new(config)?
//!         .serve(async {
//!             tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!         })
//!         .await
//! }
//! ```

pub mod api;
pub mod config;
pub mod errors;
mod openapi;
pub mod spreadsheet;
pub mod telemetry;
pub mod upstream;

#[cfg(test)]
mod test_utils;

use crate::config::CorsOrigin;
use crate::openapi::ApiDoc;
use crate::upstream::UpstreamClient;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::{
    Json, Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Install the process-wide rustls crypto provider.
///
/// reqwest is built without a bundled provider, so this must run before the first client is
/// constructed. Repeated calls are no-ops.
pub fn install_crypto_provider() {
    // Err only means a provider is already installed
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .upstream(UpstreamClient::new(&config.upstream)?)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        Ok(Self::builder().config(config).upstream(upstream).build())
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;

    let allow_origin = if cors_config.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Browsers send the origin without a trailing slash
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(max_age);
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// - `POST /ocr` - document recognition, bounded by `max_upload_size`
/// - `GET /healthz` - liveness probe
/// - `GET /openapi.json`, `GET /docs` - API documentation
/// - `GET /internal/metrics` - Prometheus metrics, when `enable_metrics` is set
///
/// Request tracing wraps every route. CORS wraps every route except `/internal/metrics`, which
/// is for scrapers and never answers browser origins.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors_layer = create_cors_layer(&state.config)?;
    let enable_metrics = state.config.enable_metrics;
    let max_upload_size = state.config.max_upload_size;

    let mut router = Router::new()
        .route("/ocr", post(api::handlers::ocr::recognize))
        .layer(DefaultBodyLimit::max(max_upload_size))
        .with_state(state)
        .route("/healthz", get(|| async { "OK" }))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(cors_layer);

    if enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns the router and its configuration.
///
/// 1. **Create**: [`Application::new`] builds the upstream client and the router
/// 2. **Serve**: [`Application::serve`] binds to the configured address and handles requests
/// 3. **Shutdown**: when the shutdown future resolves, in-flight requests drain and telemetry
///    is flushed
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting OCR gateway with configuration: {:#?}", config);

        let state = AppState::new(config.clone())?;
        info!("Forwarding uploads to {}", state.upstream.endpoint());
        let router = build_router(state)?;

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
            "OCR gateway listening on http://{}, available at http://localhost:{}",
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{create_test_config, create_test_server};
    use axum::http::StatusCode;
    use url::Url;

    #[tokio::test]
    async fn test_healthz() {
        let server = create_test_server(create_test_config("http://127.0.0.1:9/recognize"));

        let response = server.get("/healthz").await;

        response.assert_status_ok();
        assert_eq!(response.text(), "OK");
    }

    #[tokio::test]
    async fn test_application_integration() {
        let server = Application::new(create_test_config("http://127.0.0.1:9/recognize"))
            .unwrap()
            .into_test_server();

        let response = server.get("/healthz").await;
        assert_eq!(response.status_code().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_openapi_json_endpoint() {
        let server = create_test_server(create_test_config("http://127.0.0.1:9/recognize"));

        let response = server.get("/openapi.json").await;

        response.assert_status_ok();
        let content = response.text();
        assert!(content.contains("\"openapi\""));
        assert!(content.contains("/ocr"));
        assert!(content.contains("has_excel_data"));
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin_by_default() {
        let server = create_test_server(create_test_config("http://127.0.0.1:9/recognize"));

        let response = server
            .get("/healthz")
            .add_header("origin", "https://frontend.example.com")
            .await;

        response.assert_status_ok();
        assert_eq!(response.header("access-control-allow-origin"), "*");
    }

    #[tokio::test]
    async fn test_cors_preflight_for_upload() {
        let server = create_test_server(create_test_config("http://127.0.0.1:9/recognize"));

        let response = server
            .method(Method::OPTIONS, "/ocr")
            .add_header("origin", "https://frontend.example.com")
            .add_header("access-control-request-method", "POST")
            .add_header("access-control-request-headers", "content-type")
            .await;

        assert!(response.status_code().is_success());
        assert_eq!(response.header("access-control-allow-origin"), "*");
        assert_eq!(response.header("access-control-allow-headers"), "content-type");
    }

    #[tokio::test]
    async fn test_cors_explicit_origins() {
        let mut config = create_test_config("http://127.0.0.1:9/recognize");
        config.cors.allowed_origins = vec![CorsOrigin::Url(Url::parse("https://frontend.example.com").unwrap())];
        let server = create_test_server(config);

        let allowed = server
            .get("/healthz")
            .add_header("origin", "https://frontend.example.com")
            .await;
        assert_eq!(allowed.header("access-control-allow-origin"), "https://frontend.example.com");

        let denied = server.get("/healthz").add_header("origin", "https://elsewhere.example.com").await;
        assert!(denied.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_metrics_disabled_by_default() {
        let server = create_test_server(create_test_config("http://127.0.0.1:9/recognize"));

        let response = server.get("/internal/metrics").await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_skips_cors() {
        let mut config = create_test_config("http://127.0.0.1:9/recognize");
        config.enable_metrics = true;
        let server = create_test_server(config);

        server.get("/healthz").await.assert_status_ok();
        let response = server
            .get("/internal/metrics")
            .add_header("origin", "https://frontend.example.com")
            .await;

        response.assert_status_ok();
        let content = response.text();
        assert!(content.contains("# HELP") || content.contains("# TYPE"));
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_ocr_rejects_get() {
        let server = create_test_server(create_test_config("http://127.0.0.1:9/recognize"));

        let response = server.get("/ocr").expect_failure().await;

        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }
}
