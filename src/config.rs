use std::time::Duration;

/// Runtime configuration, read once from the environment at startup.
/// Every knob has a default so the server boots with no `.env` at all.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub node_env: String,
    pub tikwm_base_url: String,
    pub cors_origin: String,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max: usize,
    pub request_timeout_ms: u64,
    pub courtesy_delay_ms: u64,
    pub trust_proxy_headers: bool,
}

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_TIKWM_BASE_URL: &str = "https://tikwm.com";
const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 60_000;
const DEFAULT_RATE_LIMIT_MAX: usize = 10;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_COURTESY_DELAY_MS: u64 = 1_000;

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: read_string_env("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: read_parsed_env("PORT").unwrap_or(DEFAULT_PORT),
            node_env: read_string_env("NODE_ENV").unwrap_or_else(|| "development".to_string()),
            tikwm_base_url: read_string_env("TIKWM_BASE_URL")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_TIKWM_BASE_URL.to_string()),
            cors_origin: read_string_env("CORS_ORIGIN").unwrap_or_else(|| "*".to_string()),
            rate_limit_window_ms: read_parsed_env("RATE_LIMIT_WINDOW_MS")
                .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_MS),
            rate_limit_max: read_parsed_env("RATE_LIMIT_MAX").unwrap_or(DEFAULT_RATE_LIMIT_MAX),
            request_timeout_ms: read_parsed_env("REQUEST_TIMEOUT_MS")
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            courtesy_delay_ms: read_parsed_env("COURTESY_DELAY_MS")
                .unwrap_or(DEFAULT_COURTESY_DELAY_MS),
            trust_proxy_headers: read_bool_env("TRUST_PROXY_HEADERS").unwrap_or(true),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_development(&self) -> bool {
        self.node_env == "development"
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn courtesy_delay(&self) -> Duration {
        Duration::from_millis(self.courtesy_delay_ms)
    }
}

fn read_string_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
}

fn read_parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

fn read_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}
