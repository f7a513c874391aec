use std::net::SocketAddr;

use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{ConnectInfo, Path, Request, State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, EXPIRES, PRAGMA},
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{info, warn};

use crate::{
    AppState,
    access_filter::access_filter,
    config::non_empty,
    error::ApiError,
    normalize::{SearchResultView, VideoView, normalize_search_result, normalize_video},
    upstream::is_valid_tiktok_url,
};

const FILE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Success half of the uniform response contract. Failures are rendered by
/// [`ApiError`]; `success=false` never carries `data`.
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadFileRequest {
    url: Option<String>,
    filename: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: String,
    server: String,
}

/// Client identity for rate limiting, resolved once per request by
/// [`resolve_client_ip`].
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health))
        .route("/api/stats", get(health))
        .route("/api/download", post(download))
        .route("/api/search", post(search))
        .route("/api/download/{id}", get(download_by_id))
        .route("/api/download-file", post(download_file))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            resolve_client_ip,
        ))
        .layer(middleware::from_fn(access_filter))
        .with_state(state)
}

/// Proxy-aware client IP: first `x-forwarded-for` hop, then `x-real-ip`,
/// then the socket address. Header trust can be switched off when the
/// server is not behind a reverse proxy.
async fn resolve_client_ip(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let socket_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string());

    let header_ip = if state.config.trust_proxy_headers {
        extract_forwarded_ip(request.headers())
    } else {
        None
    };

    let ip = header_ip
        .or(socket_ip)
        .unwrap_or_else(|| "127.0.0.1".to_string());

    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}

fn extract_forwarded_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let first_hop = forwarded
            .split(',')
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(ToString::to_string);
        if first_hop.is_some() {
            return first_hop;
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(non_empty)
        .map(ToString::to_string)
}

async fn welcome() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "msg": "Welcome to Tikio API" }))
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
        server: state.server_ip.clone(),
    })
}

async fn download(
    State(state): State<AppState>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Response {
    let development = state.config.is_development();
    match download_inner(state, client_ip, payload).await {
        Ok(response) => response.into_response(),
        Err(error) => error.into_response_for(development),
    }
}

async fn download_inner(
    state: AppState,
    client_ip: String,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<ApiEnvelope<VideoView>>, ApiError> {
    consume_rate_limit(&state, &client_ip).await?;

    let Json(request) = payload
        .map_err(|_| ApiError::bad_request("Invalid JSON in request body"))?;
    let url = request
        .url
        .as_deref()
        .and_then(non_empty)
        .ok_or_else(|| ApiError::bad_request("URL is required"))?;

    if !is_valid_tiktok_url(url) {
        warn!("rejected non-TikTok URL from {client_ip}");
        return Err(ApiError::bad_request("Invalid TikTok URL"));
    }

    let raw = state.tikwm.fetch_video(url).await?;
    Ok(ApiEnvelope::ok(normalize_video(raw)))
}

async fn search(
    State(state): State<AppState>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Response {
    let development = state.config.is_development();
    match search_inner(state, client_ip, payload).await {
        Ok(response) => response.into_response(),
        Err(error) => error.into_response_for(development),
    }
}

async fn search_inner(
    state: AppState,
    client_ip: String,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<ApiEnvelope<Vec<SearchResultView>>>, ApiError> {
    consume_rate_limit(&state, &client_ip).await?;

    let Json(request) = payload
        .map_err(|_| ApiError::bad_request("Invalid JSON in request body"))?;
    let query = request
        .query
        .as_deref()
        .and_then(non_empty)
        .ok_or_else(|| ApiError::bad_request("Search query is required"))?;

    info!("searching upstream for {query:?}");
    let raw_videos = state.tikwm.search(query).await?;
    let results = raw_videos
        .into_iter()
        .map(|raw| normalize_search_result(raw, state.tikwm.base_url()))
        .collect();

    Ok(ApiEnvelope::ok(results))
}

// The by-id route deliberately skips the rate limiter, matching the
// original service; only the two POST write paths are limited.
async fn download_by_id(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let development = state.config.is_development();
    match download_by_id_inner(state, id).await {
        Ok(response) => response.into_response(),
        Err(error) => error.into_response_for(development),
    }
}

async fn download_by_id_inner(
    state: AppState,
    id: String,
) -> Result<Json<ApiEnvelope<VideoView>>, ApiError> {
    let id = non_empty(&id).ok_or_else(|| ApiError::bad_request("Video ID is required"))?;

    let raw = state.tikwm.fetch_video_by_id(id).await?;
    Ok(ApiEnvelope::ok(normalize_video(raw)))
}

async fn download_file(
    State(state): State<AppState>,
    payload: Result<Json<DownloadFileRequest>, JsonRejection>,
) -> Response {
    let development = state.config.is_development();
    match download_file_inner(state, payload).await {
        Ok(response) => response,
        Err(error) => error.into_response_for(development),
    }
}

/// Fetches an already-resolved media URL and relays the bytes to the
/// browser as an attachment, so cross-origin download links still save
/// with a sensible filename.
async fn download_file_inner(
    state: AppState,
    payload: Result<Json<DownloadFileRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload
        .map_err(|_| ApiError::bad_request("Invalid JSON in request body"))?;

    let (url, filename) = match (
        request.url.as_deref().and_then(non_empty),
        request.filename.as_deref().and_then(non_empty),
    ) {
        (Some(url), Some(filename)) => (url, filename),
        _ => return Err(ApiError::bad_request("URL and filename are required")),
    };

    let parsed = url::Url::parse(url).map_err(|_| ApiError::bad_request("Invalid URL"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::bad_request("Invalid URL"));
    }

    let response = state
        .file_client
        .get(parsed)
        .timeout(FILE_FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|error| {
            warn!("file fetch failed: {error}");
            if error.is_timeout() {
                ApiError::upstream("Download timeout")
            } else {
                ApiError::upstream("An unexpected error occurred during download")
                    .with_details(error.to_string())
            }
        })?;

    let upstream_status = response.status();
    if !upstream_status.is_success() {
        let status = StatusCode::from_u16(upstream_status.as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Err(ApiError::passthrough(
            status,
            format!("Failed to fetch file: {}", upstream_status.as_u16()),
        ));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let content_length = response.content_length();

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(length) = content_length
        && let Ok(value) = HeaderValue::from_str(&length.to_string())
    {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&build_content_disposition(filename))
            .map_err(|_| ApiError::internal("Failed to build download headers"))?,
    );
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));

    let body = Body::from_stream(response.bytes_stream());
    Ok((headers, body).into_response())
}

async fn consume_rate_limit(state: &AppState, client_ip: &str) -> Result<(), ApiError> {
    match state.limiter.check_and_consume(client_ip).await {
        crate::rate_limit::Decision::Allowed => Ok(()),
        crate::rate_limit::Decision::Denied {
            retry_after_seconds,
        } => {
            warn!("rate limit hit for {client_ip}");
            Err(ApiError::rate_limited(retry_after_seconds))
        }
    }
}

fn build_content_disposition(filename: &str) -> String {
    let safe_ascii = sanitize_ascii_filename(filename);
    format!(
        "attachment; filename=\"{safe_ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let mut sanitized = String::with_capacity(value.len());

    for character in value.chars() {
        if character.is_ascii_alphanumeric()
            || matches!(character, '.' | '-' | '_' | ' ' | '(' | ')')
        {
            sanitized.push(character);
        } else {
            sanitized.push('_');
        }
    }

    let compact = sanitized.trim();
    if compact.is_empty() {
        "download.bin".to_string()
    } else {
        compact.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_disposition_keeps_an_ascii_fallback() {
        let header = build_content_disposition("vídeo final.mp4");
        assert!(header.starts_with("attachment; filename=\"v_deo final.mp4\""));
        assert!(header.contains("filename*=UTF-8''v%C3%ADdeo%20final.mp4"));
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_ascii_filename("a/b\\c.mp4"), "a_b_c.mp4");
        assert_eq!(sanitize_ascii_filename("  "), "download.bin");
    }

    #[test]
    fn forwarded_ip_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(
            extract_forwarded_ip(&headers),
            Some("203.0.113.9".to_string())
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(
            extract_forwarded_ip(&headers),
            Some("198.51.100.4".to_string())
        );

        assert_eq!(extract_forwarded_ip(&HeaderMap::new()), None);
    }
}
