//! API handlers

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use futures_util::Stream;
use grabcore::core::validation::{validate_job_id, validate_media_url, ValidationError};
use grabcore::download::{ytdlp, DownloadedFile, JobSink, MediaFormat};
use grabcore::{AppError, ProgressEvent, ProgressSink};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

use crate::web::error::{ApiError, PlainError};
use crate::web::state::AppState;

const PROCESS_FAILURE_TEXT: &str = "Failed to process video via external API.";

#[derive(Debug, Deserialize)]
pub struct UrlBody {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub url: Option<String>,
    pub format: Option<String>,
    pub quality: Option<String>,
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

/// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// POST /api/info
pub async fn info(
    State(state): State<AppState>,
    body: Result<Json<UrlBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let url = validate_media_url(body.url.as_deref().ok_or(ValidationError::Missing("url"))?)?;

    let info = ytdlp::fetch_info(&state.settings, &url).await?;
    Ok(Json(json!({ "success": true, "info": info })))
}

/// "1080", "1080p" and "720p60" all mean a max height; anything else means no limit
fn parse_quality(quality: Option<&str>) -> Option<u32> {
    let digits: String = quality?
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().filter(|h| *h > 0)
}

/// GET /api/download
///
/// Runs the download to completion, then streams the file. When `jobId` is
/// given, progress is published to that job's listener and the listener is
/// closed shortly after the job ends.
pub async fn download(State(state): State<AppState>, Query(query): Query<DownloadQuery>) -> Result<Response, PlainError> {
    let url = validate_media_url(query.url.as_deref().ok_or(ValidationError::Missing("url"))?)?;
    let format: MediaFormat = query.format.as_deref().unwrap_or("mp4").parse()?;
    let max_height = parse_quality(query.quality.as_deref());
    let job_id = query.job_id.as_deref().map(validate_job_id).transpose()?.map(str::to_string);

    let sink: Option<JobSink> = job_id.as_deref().map(|id| state.registry.sink(id));
    let result = ytdlp::download(
        &state.settings,
        &url,
        format,
        max_height,
        sink.as_ref().map(|s| s as &dyn ProgressSink),
    )
    .await;

    if let Some(id) = job_id.as_deref() {
        if result.is_ok() {
            state.registry.publish(id, &ProgressEvent::complete());
        }
        state.registry.finish(id, state.completion_grace);
    }

    let file = result?;
    file_response(file).await.map_err(PlainError::from)
}

/// ASCII-only fallback for the quoted `filename` parameter
fn ascii_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect()
}

pub fn content_disposition(file_name: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_file_name(file_name),
        urlencoding::encode(file_name)
    )
}

async fn file_response(file: DownloadedFile) -> Result<Response, AppError> {
    let file_name = file.file_name();
    let disposition = HeaderValue::from_str(&content_disposition(&file_name)).map_err(|e| AppError::Stream(e.to_string()));
    let opened = match disposition {
        Ok(disposition) => tokio::fs::File::open(file.path())
            .await
            .map(|handle| (handle, disposition))
            .map_err(AppError::from),
        Err(e) => Err(e),
    };
    let (handle, disposition) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            file.discard().await;
            return Err(e);
        }
    };

    log::info!("Streaming {} ({} bytes)", file_name, file.size());

    let content_type = HeaderValue::from_static(file.format().mime());
    let length = HeaderValue::from(file.size());
    let body = Body::from_stream(FileBody {
        inner: ReaderStream::new(handle),
        file: Some(file),
    });

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, length);
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

/// Body stream that keeps the work directory alive until the transfer ends.
///
/// The directory is released to the blocking pool when the body is dropped,
/// whether the transfer completed, failed or the client went away.
struct FileBody {
    inner: ReaderStream<tokio::fs::File>,
    file: Option<DownloadedFile>,
}

impl Drop for FileBody {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            file.release();
        }
    }
}

impl Stream for FileBody {
    type Item = Result<Bytes, AppError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|item| {
            item.map(|chunk| {
                chunk.map_err(|e| {
                    log::warn!("File stream interrupted: {}", e);
                    AppError::Stream(e.to_string())
                })
            })
        })
    }
}

fn process_error(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "status": "error", "text": text }))).into_response()
}

/// POST /api/process
///
/// Relays the request to the Cobalt-compatible media API and returns its JSON as is.
pub async fn process(State(state): State<AppState>, body: Result<Json<UrlBody>, JsonRejection>) -> Response {
    let url = match body {
        Ok(Json(UrlBody { url: Some(url) })) if !url.trim().is_empty() => url,
        _ => return process_error(StatusCode::BAD_REQUEST, "URL is required"),
    };
    let url = match validate_media_url(&url) {
        Ok(url) => url,
        Err(e) => return process_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    log::info!("Processing URL via media API: {}", url);

    let payload = json!({
        "url": url.as_str(),
        "videoQuality": "1080",
        "audioFormat": "mp3",
        "downloadMode": "auto",
    });

    let response = state
        .http
        .post(&state.cobalt_url)
        .header(header::ACCEPT, "application/json")
        .json(&payload)
        .send()
        .await;

    let result = match response {
        Ok(response) => response.json::<Value>().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(data) => Json(data).into_response(),
        Err(e) => {
            log::error!("Media API error: {}", AppError::from(e));
            process_error(StatusCode::INTERNAL_SERVER_ERROR, PROCESS_FAILURE_TEXT)
        }
    }
}
