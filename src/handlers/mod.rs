use crate::catalog::FormatCatalog;
use crate::config::Settings;
use crate::engines::{FfmpegTranscoder, Transcoder};
use crate::error::{AppError, Result};
use crate::router::ConversionRouter;
use crate::session::{parse_session_id, ConvertStatus, SelectedFile, SessionStore};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub struct AppState {
    pub settings: Settings,
    pub router: ConversionRouter,
    pub sessions: SessionStore,
    /// Loaded on the first media selection and kept for the process lifetime
    pub transcoder: OnceCell<FfmpegTranscoder>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            router: ConversionRouter::new(&settings),
            sessions: SessionStore::new(settings.max_sessions),
            settings,
            transcoder: OnceCell::new(),
        }
    }

    async fn ensure_transcoder(&self) -> bool {
        let path = self.settings.ffmpeg_path.clone();
        match self
            .transcoder
            .get_or_try_init(|| FfmpegTranscoder::init(path))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("Transcoding engine failed to load: {}", e);
                false
            }
        }
    }
}

pub fn routes(state: Arc<AppState>) -> Router {
    let upload_limit = state.settings.max_upload_bytes;
    Router::new()
        .route("/select", post(select_handler))
        .route("/convert", post(convert_handler))
        .route("/download", get(download_handler))
        .route("/formats", get(formats_handler))
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .route("/", get(info_handler))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

/// Declared content type, or a guess from the file name when the client sent
/// nothing useful.
fn resolve_mime(declared: Option<&str>, file_name: &str) -> String {
    match declared.map(str::trim) {
        Some(m) if !m.is_empty() && m != mime::APPLICATION_OCTET_STREAM.as_ref() => m.to_string(),
        _ => mime_guess::from_path(file_name)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_default(),
    }
}

/// Pick a file for conversion and list its output formats. Starts a new
/// session unless the form carries a `session_id` to reuse.
pub async fn select_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut selected: Option<SelectedFile> = None;
    let mut session_id = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::InvalidRequest(format!("Failed to parse multipart data: {}", e))
    })? {
        match field.name() {
            Some("session_id") => {
                let raw = field.text().await.map_err(|e| {
                    AppError::InvalidRequest(format!("Failed to read session id: {}", e))
                })?;
                session_id = Some(parse_session_id(&raw)?);
            }
            Some("file") => {
                let name = field
                    .file_name()
                    .ok_or_else(|| AppError::InvalidRequest("No filename provided".to_string()))?
                    .to_string();
                let mime_type = resolve_mime(field.content_type(), &name);
                let data = field.bytes().await.map_err(|e| {
                    AppError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?;

                info!("Received file: {} ({} bytes)", name, data.len());
                selected = Some(SelectedFile {
                    name,
                    mime_type,
                    data: data.to_vec(),
                });
            }
            _ => continue,
        }
    }

    let file = selected.ok_or_else(|| AppError::InvalidRequest("No file provided".to_string()))?;
    let is_media = file.family().map(|f| f.is_media()).unwrap_or(false);
    let (file_name, mime_type, size_bytes) = (file.name.clone(), file.mime_type.clone(), file.data.len());

    let (session_id, session) = match session_id {
        Some(id) => (id, state.sessions.get(&id).await?),
        None => state.sessions.create().await,
    };

    let formats = {
        let mut session = session
            .try_lock()
            .map_err(|_| AppError::ConversionInProgress)?;
        session.select(file)
    };

    let engine_ready = if is_media {
        state.ensure_transcoder().await
    } else {
        state.transcoder.initialized()
    };

    Ok(Json(json!({
        "session_id": session_id.to_string(),
        "file_name": file_name,
        "mime_type": mime_type,
        "size_bytes": size_bytes,
        "formats": FormatCatalog::labels(formats),
        "engine_ready": engine_ready,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ConvertBody {
    pub session_id: String,
    pub format: String,
}

/// Convert the session's selected file. Only one conversion runs at a time
/// per session.
pub async fn convert_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConvertBody>,
) -> Result<Response> {
    let session = state.sessions.get(&parse_session_id(&body.session_id)?).await?;
    let mut session = session
        .try_lock()
        .map_err(|_| AppError::ConversionInProgress)?;

    let transcoder = state.transcoder.get().map(|t| t as &dyn Transcoder);
    let status = session.convert(&state.router, &body.format, transcoder).await?;

    let body = match status {
        ConvertStatus::Converted { file_name } => json!({
            "status": "converted",
            "file_name": file_name,
        }),
        ConvertStatus::NoConversionNeeded => json!({
            "status": "no_conversion_needed",
        }),
    };
    Ok(Json(body).into_response())
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub session_id: String,
}

/// Serve the session's most recent conversion as an attachment
pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let session = state.sessions.get(&parse_session_id(&query.session_id)?).await?;
    let session = session.lock().await;
    let unit = session.download()?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, unit.data.mime_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", unit.file_name.replace('"', "")),
            ),
        ],
        unit.data.payload.clone(),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct FormatsQuery {
    pub mime: Option<String>,
    pub name: Option<String>,
}

/// Catalog lookup without selecting a file
pub async fn formats_handler(Query(query): Query<FormatsQuery>) -> impl IntoResponse {
    let mime = query.mime.unwrap_or_default();
    let name = query.name.unwrap_or_default();
    let formats = FormatCatalog::lookup(&mime, &name);

    Json(json!({
        "mime_type": mime,
        "file_name": name,
        "formats": FormatCatalog::labels(formats),
    }))
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "filemill"
    }))
}

/// Information endpoint - lists the format catalog
pub async fn info_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let catalog: serde_json::Map<String, serde_json::Value> = FormatCatalog::entries()
        .map(|(mime, formats)| (mime.to_string(), json!(FormatCatalog::labels(formats))))
        .collect();

    Json(json!({
        "service": "filemill",
        "version": env!("CARGO_PKG_VERSION"),
        "transcoder_loaded": state.transcoder.initialized(),
        "sessions": state.sessions.count().await,
        "catalog": catalog,
        "endpoints": {
            "select": {
                "path": "/select",
                "method": "POST",
                "content_type": "multipart/form-data",
                "description": "Select a file (field 'file', optional 'session_id') and list the formats it converts to; returns a session_id"
            },
            "convert": {
                "path": "/convert",
                "method": "POST",
                "content_type": "application/json",
                "description": "Convert the selected file: {\"session_id\": \"...\", \"format\": \"png\"}"
            },
            "download": {
                "path": "/download?session_id=<id>",
                "method": "GET",
                "description": "Download the session's most recent conversion"
            },
            "formats": {
                "path": "/formats?mime=<type>&name=<file name>",
                "method": "GET",
                "description": "Formats a file type converts to"
            },
            "health": {
                "path": "/health",
                "method": "GET",
                "description": "Health check endpoint"
            }
        }
    }))
}
