//! Axum extractor for an incoming span context.
//!
//! Reads `X-Trace-Id` and `X-Parent-Span-Id` from request headers. Both are
//! optional; a request without them starts a new trace. A header that is
//! present but not a valid UUID is rejected with 400.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::context::SpanContext;

pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const PARENT_SPAN_ID_HEADER: &str = "x-parent-span-id";

/// Axum extractor yielding the caller's span context, if any.
pub struct SpanContextExtractor(pub Option<SpanContext>);

/// Rejection type for malformed span context headers.
pub struct SpanContextRejection {
    message: String,
}

impl IntoResponse for SpanContextRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "INVALID_SPAN_CONTEXT",
                "message": self.message
            })),
        )
            .into_response()
    }
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, SpanContextRejection> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(Some)
            .ok_or_else(|| SpanContextRejection {
                message: format!("{} header must be a valid UUID", name),
            }),
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SpanContextExtractor {
    type Rejection = SpanContextRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let trace_id = header_uuid(&parts.headers, TRACE_ID_HEADER)?;
        let parent_span_id = header_uuid(&parts.headers, PARENT_SPAN_ID_HEADER)?;

        let context = match (trace_id, parent_span_id) {
            (_, None) => None,
            (trace_id, Some(span_id)) => Some(SpanContext {
                trace_id: trace_id.unwrap_or_else(Uuid::new_v4),
                span_id,
            }),
        };

        Ok(Self(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    async fn echo(SpanContextExtractor(ctx): SpanContextExtractor) -> String {
        ctx.map(|c| c.span_id.to_string()).unwrap_or_default()
    }

    fn app() -> Router {
        Router::new().route("/", get(echo))
    }

    #[tokio::test]
    async fn test_missing_headers_is_no_context() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_parent_is_rejected() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(PARENT_SPAN_ID_HEADER, "not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_valid_parent_is_extracted() {
        let parent = Uuid::new_v4();
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(PARENT_SPAN_ID_HEADER, parent.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, parent.to_string().as_bytes());
    }
}
