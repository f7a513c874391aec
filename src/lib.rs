use std::sync::Arc;

pub mod access_filter;
pub mod config;
pub mod error;
pub mod normalize;
pub mod rate_limit;
pub mod routes;
pub mod upstream;

use config::Config;
use error::ApiError;
use rate_limit::FixedWindowLimiter;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use upstream::{BROWSER_USER_AGENT, TikwmClient};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub tikwm: TikwmClient,
    /// Plain client for the file relay route; timeout is set per request.
    pub file_client: reqwest::Client,
    pub server_ip: String,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, ApiError> {
        let tikwm = TikwmClient::new(
            config.tikwm_base_url.clone(),
            config.request_timeout(),
            config.courtesy_delay(),
        )?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        let file_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|error| ApiError::internal(format!("Failed to build HTTP client: {error}")))?;

        let limiter = Arc::new(FixedWindowLimiter::new(
            config.rate_limit_max,
            config.rate_limit_window(),
        ));

        Ok(Self {
            config: Arc::new(config),
            limiter,
            tikwm,
            file_client,
            server_ip: detect_server_ip(),
        })
    }
}

/// Outward-facing IPv4 of this host, reported by `/health`. The connected
/// UDP socket never sends a packet; it only asks the OS which interface
/// would route out.
fn detect_server_ip() -> String {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "0.0.0.0".to_string())
}
