use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::ApiError;

/// Filenames that must never be reachable through the HTTP surface.
const SENSITIVE_FILES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "bun.lock",
    ".env",
    ".env.local",
    ".env.production",
    "tsconfig.json",
    "astro.config.mjs",
    "tailwind.config.mjs",
    "ecosystem.config.cjs",
    "cargo.toml",
    "cargo.lock",
];

const SENSITIVE_DIRS: &[&str] = &[
    "node_modules",
    "src",
    "backend",
    "logs",
    ".git",
    ".astro",
    "dist",
    "target",
];

const SENSITIVE_EXTENSIONS: &[&str] = &[
    ".json", ".lock", ".env", ".config", ".log", ".ts", ".js", ".mjs", ".cjs", ".rs", ".toml",
];

const ADMIN_KEYWORDS: &[&str] = &["admin", "wp-", "phpmyadmin", "config"];

/// API paths the extension / namespace rules must not reject. Everything
/// else under `/api/` is blocked outright.
const ALLOWED_API_PREFIXES: &[&str] = &["/api/download", "/api/search", "/api/stats"];

/// Path-based denylist, shared by every route. Ordered checks, first match
/// wins. This is deliberate substring matching rather than path
/// normalization, carried over as-is from the two original filter layers:
/// a legitimate path that happens to contain a denylisted fragment gets
/// blocked too.
pub fn is_blocked_path(path: &str) -> bool {
    let pathname = path.to_ascii_lowercase();

    for file in SENSITIVE_FILES {
        if pathname.contains(file) {
            return true;
        }
    }

    for dir in SENSITIVE_DIRS {
        if pathname.contains(dir) {
            return true;
        }
    }

    let api_allowed = ALLOWED_API_PREFIXES
        .iter()
        .any(|prefix| pathname.starts_with(prefix));

    // The extension rule would reject the JSON API routes themselves, so
    // the allowlisted prefixes skip it.
    if !api_allowed {
        for ext in SENSITIVE_EXTENSIONS {
            if pathname.ends_with(ext) {
                return true;
            }
        }
    }

    if pathname.contains("..") || pathname.contains('~') {
        return true;
    }

    for keyword in ADMIN_KEYWORDS {
        if pathname.contains(keyword) {
            return true;
        }
    }

    if pathname.contains("api/") && !api_allowed {
        return true;
    }

    false
}

pub async fn access_filter(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if is_blocked_path(&path) {
        warn!("blocked request to sensitive path: {path}");
        return ApiError::forbidden("Access denied").into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_sensitive_files_anywhere_in_the_path() {
        assert!(is_blocked_path("/.env"));
        assert!(is_blocked_path("/static/.env.production"));
        assert!(is_blocked_path("/package.json"));
        assert!(is_blocked_path("/deep/nested/package.json/whatever"));
    }

    #[test]
    fn blocks_sensitive_directories() {
        assert!(is_blocked_path("/node_modules/axum/Cargo.toml"));
        assert!(is_blocked_path("/src/main.rs"));
        assert!(is_blocked_path("/.git/HEAD"));
        assert!(is_blocked_path("/logs/access.log"));
    }

    #[test]
    fn blocks_traversal_and_admin_probes() {
        assert!(is_blocked_path("/../etc/passwd"));
        assert!(is_blocked_path("/~root"));
        assert!(is_blocked_path("/wp-admin"));
        assert!(is_blocked_path("/phpmyadmin/index.php"));
        assert!(is_blocked_path("/app/config"));
    }

    #[test]
    fn blocks_unknown_api_namespace() {
        assert!(is_blocked_path("/api/secret"));
        assert!(is_blocked_path("/v1/api/users"));
        assert!(!is_blocked_path("/api/download"));
        assert!(!is_blocked_path("/api/download/123"));
        assert!(!is_blocked_path("/api/download-file"));
        assert!(!is_blocked_path("/api/search"));
        assert!(!is_blocked_path("/api/stats"));
    }

    #[test]
    fn allows_ordinary_paths() {
        assert!(!is_blocked_path("/"));
        assert!(!is_blocked_path("/health"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(is_blocked_path("/Package.JSON"));
        assert!(is_blocked_path("/NODE_MODULES/x"));
        assert!(is_blocked_path("/WP-LOGIN"));
    }
}
