//! Caller identification
//!
//! Reads the `x-principal` header and stores the parsed address in request
//! extensions. Requests without the header pass through untouched; the
//! mutating handlers reject them. A header that does not parse is rejected
//! here.

use crate::address::Principal;
use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

pub const PRINCIPAL_HEADER: &str = "x-principal";

/// Principal resolved from the request headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Principal);

pub async fn principal_middleware(mut req: Request, next: Next) -> Result<Response, PrincipalError> {
    if let Some(raw) = req.headers().get(PRINCIPAL_HEADER) {
        let principal = raw
            .to_str()
            .map_err(|_| PrincipalError::InvalidFormat)?
            .parse::<Principal>()
            .map_err(|_| PrincipalError::InvalidFormat)?;
        req.extensions_mut().insert(Caller(principal));
    }

    Ok(next.run(req).await)
}

/// Extract the caller (use after the principal middleware)
pub fn extract_caller(req: &Request) -> Option<Caller> {
    req.extensions().get::<Caller>().copied()
}

#[derive(Debug)]
pub enum PrincipalError {
    InvalidFormat,
}

impl IntoResponse for PrincipalError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            PrincipalError::InvalidFormat => (
                StatusCode::BAD_REQUEST,
                "Invalid x-principal header. Use: 0x followed by 40 hex digits",
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use axum::http::Request;
    use axum::{body::Body, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    async fn echo(caller: Option<Extension<Caller>>) -> String {
        caller
            .map(|Extension(Caller(p))| p.to_string())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(echo))
            .layer(middleware::from_fn(principal_middleware))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_header_is_parsed() {
        let principal = Address::from_low_u64(42);
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(PRINCIPAL_HEADER, principal.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, principal.to_string());
    }

    #[tokio::test]
    async fn test_missing_header_passes_through() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_malformed_header_rejected() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(PRINCIPAL_HEADER, "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
