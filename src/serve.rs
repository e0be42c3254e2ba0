use axum::{
    body::Body,
    extract::{
        multipart::MultipartError, rejection::QueryRejection, DefaultBodyLimit, Multipart, Path,
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use log::{error, info, warn};
use std::sync::Arc as StdArc;
use tower_http::cors::{Any, CorsLayer};

use crate::chunk_store::ChunkStore;
use crate::config::ServerConfig;
use crate::errors::{CatalogError, StoreError};
use crate::range::parse_range_header;
use crate::recordings::{ListQuery, NewRecording, RecordingCatalog, RecordingSummary};
use crate::upload::UploadReceipt;

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Multipart framing and the text fields on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

// State shared by all recording handlers
pub struct AppState {
    pub catalog: RecordingCatalog,
}

/// Serve recordings from the configured database (for serve command)
pub fn serve_recordings(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    println!("Database: {}", config.database_path.display());
    println!("Listening on: http://[::]:{} (IPv4 + IPv6)", config.port);
    println!("Endpoints:");
    println!("  GET /health  - Health check");
    println!("  GET /recordings?sort=&order=&search=  - List recordings");
    println!("  POST /recordings  - Upload a recording (multipart)");
    println!("  GET /recordings/:id  - Stream a recording (supports Range)");
    println!("  DELETE /recordings/:id  - Delete a recording");

    // Create tokio runtime and run server
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_server(config))
        .map_err(|e| e as Box<dyn std::error::Error>)
}

async fn run_server(config: ServerConfig) -> Result<(), DynError> {
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                format!("Failed to create directory '{}': {}", parent.display(), e)
            })?;
        }
    }

    let pool = crate::db::open_database_pool(&config.database_path).await?;
    crate::db::init_database_schema(&pool).await?;

    let store = ChunkStore::new(pool, config.chunk_size);
    let app_state = StdArc::new(AppState {
        catalog: RecordingCatalog::new(store, config.limits()),
    });
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(format!("[::]:{}", config.port))
        .await
        .map_err(|e| format!("Failed to bind to port {}: {}", config.port, e))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    Ok(())
}

/// Routes, CORS and the upload body limit
pub fn build_router(app_state: StdArc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = usize::try_from(app_state.catalog.limits().max_size_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health_handler))
        .route("/recordings", get(list_handler).post(upload_handler))
        .route(
            "/recordings/{id}",
            get(stream_handler).delete(delete_handler),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(app_state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(serde_json::json!({"error": message.into()})),
    )
        .into_response()
}

/// Recording ids are positive integers
fn parse_recording_id(raw: &str) -> Result<i64, Response> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid recording id '{}'", raw),
        )),
    }
}

// Health check endpoint - returns 200 OK if server is running
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn list_handler(
    State(state): State<StdArc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> impl IntoResponse {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
    };

    match state.catalog.list(&query).await {
        Ok(records) => {
            let summaries: Vec<RecordingSummary> = records.iter().map(|r| r.summary()).collect();
            (StatusCode::OK, axum::Json(summaries)).into_response()
        }
        Err(e) => {
            error!("Failed to list recordings: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list recordings")
        }
    }
}

/// Fields collected from an upload form
#[derive(Default)]
struct UploadForm {
    data: Option<Bytes>,
    content_type: Option<String>,
    title: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

/// Body read failures; an over-limit body is a rejected upload like any other oversize file
fn multipart_error_response(e: MultipartError, max_size_bytes: u64) -> Response {
    warn!("Failed to read multipart body: {}", e);
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("File too large (limit {} bytes)", max_size_bytes),
        );
    }
    error_response(e.status(), e.body_text())
}

async fn read_upload_form(
    multipart: &mut Multipart,
    max_size_bytes: u64,
) -> Result<UploadForm, Response> {
    let mut form = UploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_error_response(e, max_size_bytes)),
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "recording" => {
                form.content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error_response(e, max_size_bytes))?;
                form.data = Some(data);
            }
            "title" | "duration" | "size" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error_response(e, max_size_bytes))?;
                match name.as_str() {
                    "title" => form.title = Some(value),
                    "duration" => form.duration = Some(value),
                    _ => form.size = Some(value),
                }
            }
            other => {
                warn!("Ignoring unexpected form field '{}'", other);
            }
        }
    }

    Ok(form)
}

/// Whole seconds from a `duration` form field; fractional values are rounded
fn parse_duration_field(raw: Option<&str>) -> Result<u32, String> {
    let raw = match raw.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => return Ok(0),
    };
    let secs: f64 = raw
        .parse()
        .map_err(|_| format!("Invalid duration '{}'", raw))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("Invalid duration '{}'", raw));
    }
    Ok(secs.round().min(u32::MAX as f64) as u32)
}

async fn upload_handler(
    State(state): State<StdArc<AppState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let max_size_bytes = state.catalog.limits().max_size_bytes;
    let form = match read_upload_form(&mut multipart, max_size_bytes).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    let data = match form.data {
        Some(data) if !data.is_empty() => data,
        _ => return error_response(StatusCode::BAD_REQUEST, "No recording file provided"),
    };

    let duration_secs = match parse_duration_field(form.duration.as_deref()) {
        Ok(secs) => secs,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    if let Some(declared) = form.size.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        match declared.parse::<u64>() {
            Ok(size) if size == data.len() as u64 => {}
            Ok(size) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Declared size {} does not match {} bytes received", size, data.len()),
                )
            }
            Err(_) => {
                return error_response(StatusCode::BAD_REQUEST, format!("Invalid size '{}'", declared))
            }
        }
    }

    let new = NewRecording {
        title: form.title,
        duration_secs,
        content_type: form.content_type.unwrap_or_default(),
    };

    match state.catalog.create(new, &data).await {
        Ok(record) => {
            info!("Uploaded recording {} ({} bytes)", record.id, record.size);
            (
                StatusCode::OK,
                axum::Json(UploadReceipt {
                    message: "Recording uploaded successfully".to_string(),
                    id: record.id,
                    url: record.url(),
                }),
            )
                .into_response()
        }
        Err(CatalogError::InvalidInput(message)) => {
            warn!("Rejected upload: {}", message);
            error_response(StatusCode::BAD_REQUEST, message)
        }
        Err(e) => {
            error!("Failed to store recording: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store recording")
        }
    }
}

async fn stream_handler(
    State(state): State<StdArc<AppState>>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let id = match parse_recording_id(&raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let record = match state.catalog.get(id).await {
        Ok(record) => record,
        Err(CatalogError::NotFound(_)) => {
            return error_response(StatusCode::NOT_FOUND, "Recording not found")
        }
        Err(e) => {
            error!("Failed to look up recording {}: {}", id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load recording");
        }
    };

    let range = match headers.get(header::RANGE) {
        Some(value) => {
            let parsed = value
                .to_str()
                .map_err(|_| "Malformed Range header".to_string())
                .and_then(|v| parse_range_header(v).map_err(|e| e.to_string()));
            match parsed {
                Ok(range) => Some(range),
                Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
            }
        }
        None => None,
    };

    let chunks = match state.catalog.store().get(&record.file_ref, range).await {
        Ok(chunks) => chunks,
        Err(StoreError::NotFound(file_ref)) => {
            warn!("Recording {} has no stored data ({})", id, file_ref);
            return error_response(StatusCode::NOT_FOUND, "Recording data not found");
        }
        Err(StoreError::RangeNotSatisfiable { length, .. }) => {
            return (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{}", length))],
                axum::Json(serde_json::json!({"error": "Requested range not satisfiable"})),
            )
                .into_response();
        }
        Err(e) => {
            error!("Failed to stream recording {}: {}", id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to stream recording");
        }
    };

    let total_len = chunks.total_length;
    let content_length = chunks.content_length;
    let disposition = format!("inline; filename=\"{}\"", record.filename);
    let content_range = chunks
        .end()
        .map(|end| format!("bytes {}-{}/{}", chunks.start, end, total_len));
    let body = Body::from_stream(chunks.into_stream());

    match (range, content_range) {
        (Some(_), Some(content_range)) => (
            StatusCode::PARTIAL_CONTENT,
            [
                (header::CONTENT_TYPE, record.content_type),
                (header::CONTENT_RANGE, content_range),
                (header::ACCEPT_RANGES, "bytes".to_string()),
                (header::CONTENT_LENGTH, content_length.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            body,
        )
            .into_response(),
        _ => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, record.content_type),
                (header::ACCEPT_RANGES, "bytes".to_string()),
                (header::CONTENT_LENGTH, content_length.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            body,
        )
            .into_response(),
    }
}

async fn delete_handler(
    State(state): State<StdArc<AppState>>,
    Path(raw_id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_recording_id(&raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.catalog.delete(id).await {
        Ok(_) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"message": "Recording deleted successfully"})),
        )
            .into_response(),
        Err(CatalogError::NotFound(_)) => error_response(StatusCode::NOT_FOUND, "Recording not found"),
        Err(e) => {
            error!("Failed to delete recording {}: {}", id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete recording")
        }
    }
}
