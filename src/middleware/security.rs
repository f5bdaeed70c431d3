//! Response hardening for the JSON API
//!
//! Nothing here is ever rendered by a browser, so the policy locks every
//! fetch directive down and forbids caching of customer data. Handlers may
//! set their own value for any of these headers; the layer only fills gaps.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::config::Environment;

fn permissions_policy() -> HeaderName {
    HeaderName::from_static("permissions-policy")
}

const HSTS: &str = "max-age=31536000; includeSubDomains";

fn baseline() -> [(HeaderName, &'static str); 6] {
    [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::REFERRER_POLICY, "no-referrer"),
        (header::CONTENT_SECURITY_POLICY, "default-src 'none'; frame-ancestors 'none'"),
        (permissions_policy(), "camera=(), geolocation=(), microphone=(), payment=()"),
        // Balances and KYC data must not be cached by intermediaries
        (header::CACHE_CONTROL, "no-store"),
    ]
}

/// Which headers the API adds to every response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityPolicy {
    /// Strict-Transport-Security; only sent when TLS terminates in front of us
    pub hsts: bool,
}

impl SecurityPolicy {
    pub fn for_environment(environment: &Environment) -> Self {
        Self {
            hsts: environment.is_production(),
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in baseline() {
            headers
                .entry(name)
                .or_insert_with(|| HeaderValue::from_static(value));
        }
        if self.hsts {
            headers
                .entry(header::STRICT_TRANSPORT_SECURITY)
                .or_insert_with(|| HeaderValue::from_static(HSTS));
        }
    }
}

pub async fn security_headers(
    State(policy): State<SecurityPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    policy.apply(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsts_only_in_production() {
        let mut headers = HeaderMap::new();
        SecurityPolicy::for_environment(&Environment::Staging).apply(&mut headers);
        assert!(!headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");

        let mut headers = HeaderMap::new();
        SecurityPolicy::for_environment(&Environment::Production).apply(&mut headers);
        assert_eq!(headers[header::STRICT_TRANSPORT_SECURITY], HSTS);
    }

    #[test]
    fn test_handler_values_win() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=60"));

        SecurityPolicy { hsts: false }.apply(&mut headers);

        assert_eq!(headers[header::CACHE_CONTROL], "private, max-age=60");
        assert_eq!(headers[permissions_policy()], "camera=(), geolocation=(), microphone=(), payment=()");
        assert_eq!(headers.len(), 6);
    }
}
