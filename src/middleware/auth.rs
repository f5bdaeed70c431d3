//! Authentication extractors
//!
//! [`StaffUser`] verifies the bearer token; [`RequestContext`] builds on it
//! and adds the operation deadline.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::{JwtError, TokenVerifier};
use crate::context::RequestContext;
use crate::state::OperationDeadline;

/// Optional header that shortens the server's default deadline
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Staff member extracted from a verified access token
#[derive(Debug, Clone)]
pub struct StaffUser {
    pub user_id: Uuid,
    pub role: String,
    pub jti: String,
}

/// Error response for authentication failures
#[derive(Debug, Serialize)]
struct AuthError {
    #[serde(skip)]
    status: StatusCode,
    error: AuthErrorDetails,
}

#[derive(Debug, Serialize)]
struct AuthErrorDetails {
    code: String,
    message: String,
}

impl AuthError {
    fn new(code: &str, message: &str) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, code, message)
    }

    fn with_status(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            error: AuthErrorDetails {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for StaffUser
where
    Arc<TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AuthError::new(
                        "MISSING_TOKEN",
                        "Authorization header with Bearer token required",
                    )
                    .into_response()
                })?;

        let verifier = Arc::<TokenVerifier>::from_ref(state);

        let identity = verifier.verify(bearer.token()).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            let (code, message) = match e {
                JwtError::TokenExpired => ("TOKEN_EXPIRED", "Token has expired"),
                JwtError::WrongTokenType(_) => ("INVALID_TOKEN_TYPE", "Expected access token"),
                _ => ("INVALID_TOKEN", "Invalid token"),
            };
            AuthError::new(code, message).into_response()
        })?;

        Ok(StaffUser {
            user_id: identity.user_id,
            role: identity.role,
            jti: identity.jti,
        })
    }
}

/// Deadline requested by the caller, if any
fn requested_timeout(parts: &Parts) -> Result<Option<Duration>, Response> {
    let Some(value) = parts.headers.get(REQUEST_TIMEOUT_HEADER) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(|ms| Some(Duration::from_millis(ms)))
        .ok_or_else(|| {
            AuthError::with_status(
                StatusCode::BAD_REQUEST,
                "INVALID_TIMEOUT",
                "X-Request-Timeout-Ms must be a positive number of milliseconds",
            )
            .into_response()
        })
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    Arc<TokenVerifier>: FromRef<S>,
    OperationDeadline: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let staff = StaffUser::from_request_parts(parts, state).await?;
        let OperationDeadline(default) = OperationDeadline::from_ref(state);

        let ctx = RequestContext::new(staff.user_id, default);
        Ok(match requested_timeout(parts)? {
            Some(requested) => ctx.with_deadline(requested),
            None => ctx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/loans");
        if let Some(value) = header {
            builder = builder.header(REQUEST_TIMEOUT_HEADER, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_requested_timeout_parsing() {
        assert!(matches!(requested_timeout(&parts_with(None)), Ok(None)));
        assert!(matches!(
            requested_timeout(&parts_with(Some("250"))),
            Ok(Some(d)) if d == Duration::from_millis(250)
        ));

        let rejected = requested_timeout(&parts_with(Some("soon"))).err().map(|r| r.status());
        assert_eq!(rejected, Some(StatusCode::BAD_REQUEST));
        assert!(requested_timeout(&parts_with(Some("0"))).is_err());
    }
}
