use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::ApiError;

/// Browser-impersonation User-Agent the upstream free tier expects.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/140.0.0.0 Mobile Safari/537.36";

const SEARCH_RESULT_COUNT: &str = "12";

/// Application-level envelope every tikwm response arrives in. `code == 0`
/// means success; anything else carries a human-readable `msg`.
#[derive(Debug, Deserialize)]
struct TikwmEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMusicInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub original: bool,
    #[serde(default)]
    pub play: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAuthor {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar: String,
}

/// One video as tikwm reports it. Counters default to zero and string
/// fields to empty so a partial payload still normalizes.
#[derive(Debug, Clone, Deserialize)]
pub struct RawVideo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub play: String,
    #[serde(default)]
    pub wmplay: String,
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub play_count: u64,
    #[serde(default)]
    pub digg_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub share_count: u64,
    pub music_info: Option<RawMusicInfo>,
    pub author: Option<RawAuthor>,
}

#[derive(Debug, Deserialize)]
struct RawSearchData {
    #[serde(default)]
    videos: Vec<RawVideo>,
}

/// Anchored TikTok-domain check: the scheme and host must belong to
/// tiktok.com (or a short-link subdomain), not merely appear somewhere in
/// the string.
pub fn is_valid_tiktok_url(input: &str) -> bool {
    let parsed = match Url::parse(input.trim()) {
        Ok(url) => url,
        Err(_) => return false,
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    let host = match parsed.host_str() {
        Some(host) => host.to_ascii_lowercase(),
        None => return false,
    };

    const TIKTOK_DOMAINS: [&str; 3] = ["tiktok.com", "vm.tiktok.com", "vt.tiktok.com"];

    TIKTOK_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// Client for the tikwm.com scraping API.
///
/// Carries the fixed browser-impersonation header set on every call and a
/// bounded timeout. A configurable courtesy delay runs before each request
/// to go easy on the upstream free tier; it is zero in tests.
#[derive(Clone)]
pub struct TikwmClient {
    http: reqwest::Client,
    base_url: String,
    courtesy_delay: Duration,
}

impl TikwmClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        courtesy_delay: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.into();

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            "x-requested-with",
            HeaderValue::from_static("XMLHttpRequest"),
        );
        if let Ok(referer) = HeaderValue::from_str(&base_url) {
            headers.insert(REFERER, referer);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|error| ApiError::internal(format!("Failed to build HTTP client: {error}")))?;

        Ok(Self {
            http,
            base_url,
            courtesy_delay,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one video's metadata for a full TikTok URL.
    pub async fn fetch_video(&self, video_url: &str) -> Result<RawVideo, ApiError> {
        self.pause_for_upstream().await;

        let request_url = format!(
            "{}/api?url={}",
            self.base_url,
            urlencoding::encode(video_url)
        );
        debug!("fetching video metadata from upstream");
        let response = self
            .http
            .get(&request_url)
            .send()
            .await
            .map_err(map_send_error)?;

        let envelope = decode_envelope(response).await?;
        let data = envelope
            .data
            .ok_or_else(|| ApiError::not_found("Video data not found"))?;

        serde_json::from_value(data)
            .map_err(|error| ApiError::upstream("Failed to fetch data, please try again later!")
                .with_details(error.to_string()))
    }

    /// Fetch one video's metadata for a bare id by synthesizing the
    /// canonical URL the upstream accepts.
    pub async fn fetch_video_by_id(&self, id: &str) -> Result<RawVideo, ApiError> {
        self.pause_for_upstream().await;

        let canonical_url = format!("https://www.tiktok.com/@user/video/{id}");
        let response = self
            .http
            .post(format!("{}/api/", self.base_url))
            .form(&[("url", canonical_url.as_str()), ("hd", "1")])
            .send()
            .await
            .map_err(map_send_error)?;

        let envelope = decode_envelope(response).await?;
        let data = envelope
            .data
            .ok_or_else(|| ApiError::not_found("Video data not found"))?;

        serde_json::from_value(data)
            .map_err(|error| ApiError::upstream("Failed to fetch data, please try again later!")
                .with_details(error.to_string()))
    }

    /// Keyword search against the upstream feed. An absent or empty video
    /// list is a valid empty result, not an error.
    pub async fn search(&self, query: &str) -> Result<Vec<RawVideo>, ApiError> {
        self.pause_for_upstream().await;

        let response = self
            .http
            .post(format!("{}/api/feed/search", self.base_url))
            .form(&[
                ("keywords", query),
                ("count", SEARCH_RESULT_COUNT),
                ("hd", "1"),
                ("web", "1"),
                ("cursor", "1"),
            ])
            .send()
            .await
            .map_err(map_send_error)?;

        let envelope = decode_envelope(response).await?;
        let Some(data) = envelope.data else {
            return Ok(Vec::new());
        };

        let search_data: RawSearchData = serde_json::from_value(data)
            .map_err(|error| ApiError::upstream("Failed to fetch search data")
                .with_details(error.to_string()))?;

        Ok(search_data.videos)
    }

    async fn pause_for_upstream(&self) {
        if !self.courtesy_delay.is_zero() {
            tokio::time::sleep(self.courtesy_delay).await;
        }
    }
}

fn map_send_error(error: reqwest::Error) -> ApiError {
    warn!("upstream request failed: {error}");
    if error.is_timeout() {
        ApiError::upstream("TikWM API request timed out").with_details(error.to_string())
    } else {
        ApiError::upstream("Failed to fetch data, please try again later!")
            .with_details(error.to_string())
    }
}

async fn decode_envelope(response: reqwest::Response) -> Result<TikwmEnvelope, ApiError> {
    let status = response.status();
    if !status.is_success() {
        warn!("upstream answered with HTTP {status}");
        return Err(ApiError::upstream(format!(
            "TikWM API error: {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("unknown")
        )));
    }

    let envelope: TikwmEnvelope = response.json().await.map_err(|error| {
        warn!("upstream body was not valid JSON: {error}");
        ApiError::upstream("Failed to fetch data, please try again later!")
            .with_details(error.to_string())
    })?;

    if envelope.code != 0 {
        let message = envelope
            .msg
            .clone()
            .unwrap_or_else(|| "Failed to fetch video data".to_string());
        return Err(ApiError::upstream_rejected(message));
    }

    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> TikwmClient {
        TikwmClient::new(base_url, Duration::from_secs(5), Duration::ZERO)
            .expect("client should build")
    }

    fn raw_video_json() -> serde_json::Value {
        serde_json::json!({
            "id": "7123456789",
            "title": "a video",
            "region": "US",
            "size": 1048576,
            "create_time": 1700000000,
            "duration": 15,
            "cover": "/cover.jpg",
            "play": "/play.mp4",
            "wmplay": "/wmplay.mp4",
            "play_count": 1500,
            "digg_count": 100,
            "comment_count": 10,
            "share_count": 5,
            "music_info": {
                "title": "original sound",
                "author": "someone",
                "original": true,
                "play": "/music.mp3"
            },
            "author": {
                "nickname": "someone",
                "avatar": "/avatar.jpg"
            }
        })
    }

    #[test]
    fn tiktok_url_validation_anchors_at_the_host() {
        assert!(is_valid_tiktok_url("https://www.tiktok.com/@u/video/123"));
        assert!(is_valid_tiktok_url("https://tiktok.com/@u/video/123"));
        assert!(is_valid_tiktok_url("https://vm.tiktok.com/ZM123/"));
        assert!(is_valid_tiktok_url("http://vt.tiktok.com/abc"));

        assert!(!is_valid_tiktok_url("https://evil.com/tiktok.com"));
        assert!(!is_valid_tiktok_url("https://eviltiktok.com/video/1"));
        assert!(!is_valid_tiktok_url("ftp://tiktok.com/video/1"));
        assert!(!is_valid_tiktok_url("not-a-url"));
        assert!(!is_valid_tiktok_url(""));
    }

    #[tokio::test]
    async fn fetch_video_unwraps_the_data_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("url", "https://www.tiktok.com/@u/video/7123456789"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "msg": "success",
                "data": raw_video_json()
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let video = client
            .fetch_video("https://www.tiktok.com/@u/video/7123456789")
            .await
            .expect("fetch should succeed");

        assert_eq!(video.id, "7123456789");
        assert_eq!(video.play_count, 1500);
        assert!(video.images.is_none());
    }

    #[tokio::test]
    async fn non_2xx_surfaces_as_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let error = client
            .fetch_video("https://www.tiktok.com/@u/video/1")
            .await
            .expect_err("expected failure");

        assert_eq!(error.code, Some("UPSTREAM_ERROR"));
        assert!(error.message.contains("TikWM API error: 502"));
    }

    #[tokio::test]
    async fn nonzero_upstream_code_surfaces_its_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": -1,
                "msg": "Free Api Limit: 1 request/second"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let error = client
            .fetch_video("https://www.tiktok.com/@u/video/1")
            .await
            .expect_err("expected failure");

        assert_eq!(error.code, Some("UPSTREAM_REJECTED"));
        assert!(error.message.contains("Free Api Limit"));
    }

    #[tokio::test]
    async fn missing_data_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 0, "msg": "success"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let error = client
            .fetch_video("https://www.tiktok.com/@u/video/1")
            .await
            .expect_err("expected failure");

        assert_eq!(error.status, axum::http::StatusCode::NOT_FOUND);
        assert!(error.message.contains("Video data not found"));
    }

    #[tokio::test]
    async fn search_decodes_the_video_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/feed/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "data": { "videos": [raw_video_json(), raw_video_json()] }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let videos = client.search("cats").await.expect("search should succeed");
        assert_eq!(videos.len(), 2);
    }

    #[tokio::test]
    async fn search_with_no_data_yields_empty_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/feed/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 0})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let videos = client.search("nothing").await.expect("search should succeed");
        assert!(videos.is_empty());
    }

    #[tokio::test]
    async fn fetch_by_id_posts_the_canonical_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/"))
            .and(wiremock::matchers::body_string_contains(
                "url=https%3A%2F%2Fwww.tiktok.com%2F%40user%2Fvideo%2F42",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "data": raw_video_json()
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let video = client.fetch_video_by_id("42").await.expect("fetch should succeed");
        assert_eq!(video.id, "7123456789");
    }
}
