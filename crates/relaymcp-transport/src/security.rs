//! Origin validation and CORS for HTTP-facing transports. The `Origin`
//! header should be validated against an allowlist in any production
//! deployment exposed to browsers.

use tower_http::cors::{AllowOrigin, CorsLayer};

/// Allowed origins for browser-facing deployments of the StreamableHTTP
/// transport. `Any` is a permissive local-dev default; production
/// deployments should supply an explicit allowlist.
#[derive(Debug, Clone)]
pub enum OriginPolicy {
    /// Accept every origin (development only).
    Any,
    /// Accept only the listed origins.
    Allowlist(Vec<String>),
}

impl OriginPolicy {
    /// Build the corresponding `tower_http` CORS layer.
    #[must_use]
    pub fn cors_layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
                axum::http::header::ACCEPT,
                axum::http::HeaderName::from_static("x-session-id"),
                axum::http::HeaderName::from_static("mcp-session-id"),
                axum::http::HeaderName::from_static("last-event-id"),
            ])
            .expose_headers([axum::http::HeaderName::from_static("mcp-session-id")]);

        match self {
            OriginPolicy::Any => layer.allow_origin(AllowOrigin::any()),
            OriginPolicy::Allowlist(origins) => {
                let parsed: Vec<_> = origins
                    .iter()
                    .filter_map(|o| o.parse::<axum::http::HeaderValue>().ok())
                    .collect();
                layer.allow_origin(AllowOrigin::list(parsed))
            }
        }
    }

    /// Whether an `Origin` header value is acceptable under this policy.
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            OriginPolicy::Any => true,
            OriginPolicy::Allowlist(origins) => origins.iter().any(|o| o == origin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_policy_allows_everything() {
        assert!(OriginPolicy::Any.allows("https://evil.example"));
    }

    #[test]
    fn allowlist_rejects_unlisted_origin() {
        let policy = OriginPolicy::Allowlist(vec!["https://trusted.example".to_string()]);
        assert!(policy.allows("https://trusted.example"));
        assert!(!policy.allows("https://untrusted.example"));
    }
}
