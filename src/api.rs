//! HTTP substrate adapter.
//!
//! Exposes the four catalog operations over HTTP/JSON, with
//! newline-delimited JSON for the streamed directions. This layer only
//! adapts: it builds per-request cancellation tokens (children of the
//! server shutdown token), converts bodies to message streams and back, and
//! maps [`ServiceError`] onto status codes. The core never sees axum.

use crate::config::{ServerConfig, StreamConfig};
use crate::error::ServiceError;
use crate::image_store::DiskImageStore;
use crate::record::{Filter, Memory, MemoryUnit, Record};
use crate::service::{CatalogService, RateRequest};
use crate::upload::{ImageInfo, UploadMessage, UploadSummary};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{LinesStream, ReceiverStream};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CatalogService<DiskImageStore>>,
    /// Server-wide shutdown token; every request derives its own child.
    pub shutdown: CancellationToken,
    pub streams: StreamConfig,
}

/// Response to a create request
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRecordResponse {
    /// Resolved record ID
    pub id: String,
}

/// Search filter as query parameters
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Maximum list price in USD (inclusive)
    #[serde(default = "default_max_price")]
    pub max_price_usd: f64,
    /// Minimum number of CPU cores
    #[serde(default)]
    pub min_cpu_cores: u32,
    /// Minimum base clock frequency in GHz
    #[serde(default)]
    pub min_cpu_ghz: f64,
    /// Minimum memory magnitude
    #[serde(default)]
    pub min_ram_value: u64,
    /// Minimum memory unit
    #[serde(default)]
    pub min_ram_unit: MemoryUnit,
}

fn default_max_price() -> f64 {
    f64::MAX
}

impl From<SearchParams> for Filter {
    fn from(params: SearchParams) -> Self {
        Self {
            max_price_usd: params.max_price_usd,
            min_cpu_cores: params.min_cpu_cores,
            min_cpu_ghz: params.min_cpu_ghz,
            min_ram: Memory::new(params.min_ram_value, params.min_ram_unit),
        }
    }
}

/// Query parameters of an upload request
#[derive(Debug, Deserialize)]
pub struct UploadParams {
    /// Image type tag, used as the stored file extension
    pub image_type: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::AlreadyExists(_) => StatusCode::CONFLICT,
            ServiceError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });
        (status, body).into_response()
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/records", post(create_record))
        .route("/api/v1/records/search", get(search_records))
        .route("/api/v1/records/ratings", post(rate_records))
        .route("/api/v1/records/:record_id", get(get_record))
        .route("/api/v1/records/:record_id/image", post(upload_image))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "catalog-service",
        "records": state.service.store().len(),
    }))
}

/// Register a record
#[instrument(skip(state, record))]
async fn create_record(
    State(state): State<AppState>,
    Json(record): Json<Record>,
) -> Result<(StatusCode, Json<CreateRecordResponse>), ServiceError> {
    let cancel = state.shutdown.child_token();
    let id = state.service.create_record(record, &cancel)?;
    Ok((StatusCode::CREATED, Json(CreateRecordResponse { id })))
}

/// Look up a single record
async fn get_record(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
) -> Result<Json<Record>, ServiceError> {
    state
        .service
        .find_record(&record_id)
        .map(Json)
        .ok_or_else(|| ServiceError::NotFound(format!("record {record_id} does not exist")))
}

/// Stream matching records as NDJSON
#[instrument(skip(state))]
async fn search_records(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let filter = Filter::from(params);
    let (tx, rx) = mpsc::channel(state.streams.search_buffer);
    let cancel = state.shutdown.child_token();
    let service = state.service.clone();

    // The scan runs concurrently and applies backpressure through the
    // bounded channel; dropping the response body ends it.
    tokio::spawn(async move {
        service.search_records(filter, cancel, tx).await;
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(|record| ndjson_line(&record)));
    ([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], body)
}

/// Accept a chunked image upload for a record
#[instrument(skip(state, body))]
async fn upload_image(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    Query(params): Query<UploadParams>,
    body: Body,
) -> Result<Json<UploadSummary>, ServiceError> {
    let info = ImageInfo {
        record_id,
        image_type: params.image_type,
    };
    let chunks = body.into_data_stream().map(|chunk| match chunk {
        Ok(data) => Ok(UploadMessage::Chunk(data)),
        Err(err) => {
            warn!(error = %err, "upload stream transport failure");
            Err(ServiceError::Cancelled)
        }
    });
    let inbound = stream::once(async move { Ok(UploadMessage::Info(info)) }).chain(chunks);

    let summary = state.service.upload_image(inbound).await?;
    Ok(Json(summary))
}

/// Pair an NDJSON stream of ratings with an NDJSON stream of responses
async fn rate_records(State(state): State<AppState>, body: Body) -> impl IntoResponse {
    let reader = StreamReader::new(
        body.into_data_stream()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err)),
    );
    let inbound = LinesStream::new(BufReader::new(reader).lines()).filter_map(|line| async move {
        match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str::<RateRequest>(&line).map_err(|err| {
                ServiceError::InvalidArgument(format!("malformed rating request: {err}"))
            })),
            Err(err) => {
                warn!(error = %err, "rating stream transport failure");
                Some(Err(ServiceError::Cancelled))
            }
        }
    });

    let (tx, rx) = mpsc::channel(state.streams.rating_buffer);
    let service = state.service.clone();
    let worker = tokio::spawn(async move { service.rate_records(inbound, tx).await });

    let responses =
        ReceiverStream::new(rx).map(|response| ndjson_line(&response).map_err(axum::Error::new));
    // A failed stream aborts the response body after the pairs already sent.
    let outcome = stream::once(async move {
        let result: Option<Result<Bytes, axum::Error>> = match worker.await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => {
                warn!(error = %err, "rating stream terminated");
                Some(Err(axum::Error::new(err)))
            }
            Err(err) => Some(Err(axum::Error::new(err))),
        };
        result
    })
    .filter_map(|item| async move { item });

    (
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(responses.chain(outcome)),
    )
}

/// Serialize one value as an NDJSON line.
fn ndjson_line<T: Serialize>(value: &T) -> Result<Bytes, serde_json::Error> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

/// Serve the API until the shutdown future resolves
pub async fn start_api_server(
    state: AppState,
    config: &ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting catalog API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
