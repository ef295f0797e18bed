use crate::config::{ApiConfig, Config, ConfigError};
use crate::discovery::AddressDiscovery;
use crate::error::DropError;
use crate::ingest::UploadIngestor;
use crate::qr::QrAdvertiser;
use crate::retrieval::RetrievalServer;
use crate::storage::StorageDirectory;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{header, HeaderName, HeaderValue, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

/// Form field / JSON key carrying the uploaded payload
pub const PAYLOAD_FIELD: &str = "raw";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<UploadIngestor>,
    pub retrieval: Arc<RetrievalServer>,
    pub discovery: Arc<AddressDiscovery>,
    pub qr: Arc<QrAdvertiser>,
}

impl AppState {
    /// Wire every component against an explicit storage directory
    pub fn new(storage: StorageDirectory, config: &Config) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            ingestor: Arc::new(UploadIngestor::new(
                storage.clone(),
                config.storage.public_prefix.clone(),
            )),
            retrieval: Arc::new(RetrievalServer::new(storage)),
            discovery: Arc::new(AddressDiscovery::new()),
            qr: Arc::new(QrAdvertiser::from_config(&config.qr)?),
        })
    }
}

/// Upload response
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Retrieval path of the stored object
    pub url: String,
}

/// Text upload request
#[derive(Debug, Deserialize)]
pub struct TextUploadRequest {
    pub raw: Option<String>,
}

/// Query parameters for QR rendering
#[derive(Debug, Deserialize)]
pub struct QrQuery {
    #[serde(default)]
    pub content: String,
}

/// Local address listing
#[derive(Debug, Serialize, Deserialize)]
pub struct AddressesResponse {
    pub addresses: Vec<String>,
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if !config.cors_enabled {
        return CorsLayer::new();
    }

    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &Config) -> Router {
    let download_route = format!("{}/:path", state.ingestor.public_prefix());

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/files", post(upload_file))
        .route("/api/v1/texts", post(upload_text))
        .route("/api/v1/qrcodes", get(qr_code))
        .route("/api/v1/addresses", get(addresses))
        .route(&download_route, get(download));

    if let Some(dir) = &config.static_assets.dir {
        let index = dir.join(&config.static_assets.index);
        router = router.nest_service("/static", ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    router
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(config.api.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.api))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "drop-service"
    }))
}

/// Store the multipart field `raw` as a file
#[instrument(skip(state, multipart))]
async fn upload_file(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<UploadResponse>, DropError> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(PAYLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let object = state
            .ingestor
            .ingest_file(file_name.as_deref(), field)
            .await?;

        return Ok(Json(UploadResponse { url: object.url }));
    }

    Err(DropError::MissingField(PAYLOAD_FIELD))
}

/// Store `{"raw": "..."}` as a text object
#[instrument(skip(state, payload))]
async fn upload_text(
    State(state): State<AppState>,
    payload: std::result::Result<Json<TextUploadRequest>, JsonRejection>,
) -> std::result::Result<Json<UploadResponse>, DropError> {
    let Json(request) = payload?;
    let raw = request.raw.ok_or(DropError::MissingField(PAYLOAD_FIELD))?;

    let object = state.ingestor.ingest_text(&raw).await?;

    Ok(Json(UploadResponse { url: object.url }))
}

/// Render `content` as a PNG QR code
#[instrument(skip(state, query))]
async fn qr_code(
    State(state): State<AppState>,
    query: std::result::Result<Query<QrQuery>, QueryRejection>,
) -> std::result::Result<Response, DropError> {
    let Query(params) = query.map_err(|e| DropError::DecodeFailure(e.body_text()))?;
    let png = state.qr.encode(&params.content)?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

/// List LAN addresses clients can use to reach this host
#[instrument(skip(state))]
async fn addresses(
    State(state): State<AppState>,
) -> std::result::Result<Json<AddressesResponse>, DropError> {
    let addresses = state
        .discovery
        .list_local_addresses()?
        .iter()
        .map(ToString::to_string)
        .collect();

    Ok(Json(AddressesResponse { addresses }))
}

/// Stream a stored object back as an attachment
#[instrument(skip(state, path))]
async fn download(
    State(state): State<AppState>,
    path: std::result::Result<Path<String>, PathRejection>,
) -> std::result::Result<Response, DropError> {
    let Path(segment) = path.map_err(|_| DropError::NotFound(String::new()))?;
    let object = state.retrieval.open(&segment).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        object.file_name.replace('"', "_")
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|_| DropError::InvalidPath(object.file_name.clone()))?;

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        ),
        (
            HeaderName::from_static("content-description"),
            HeaderValue::from_static("File Transfer"),
        ),
        (
            HeaderName::from_static("content-transfer-encoding"),
            HeaderValue::from_static("binary"),
        ),
        (header::CONTENT_DISPOSITION, disposition),
        (header::CONTENT_LENGTH, HeaderValue::from(object.size)),
    ];

    let body = Body::from_stream(ReaderStream::new(object.file));
    Ok((headers, body).into_response())
}

async fn not_found(uri: Uri) -> DropError {
    DropError::NotFound(uri.path().to_string())
}

/// Start the HTTP server and serve until `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = config.listen_addr();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(address = %addr, "Drop API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
