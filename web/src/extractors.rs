//! Caller identity extractor.
//!
//! Authentication happens upstream. The gateway forwards the authenticated
//! user in two headers:
//!
//! - `X-User-Id`: required, the stable user id
//! - `X-User-Name`: optional display name, defaults to the id
//!
//! # Example
//!
//! ```ignore
//! async fn handler(caller: CallerIdentity) -> String {
//!     format!("Hello {}", caller.username)
//! }
//! ```

use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated user's display name.
pub const USER_NAME_HEADER: &str = "x-user-name";

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Stable user id
    pub user_id: String,
    /// Display name
    pub username: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized("Missing authenticated user"))?;
        let username = header(USER_NAME_HEADER).unwrap_or_else(|| user_id.clone());

        Ok(Self { user_id, username })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum::{Json, Router, routing::get};
    use axum_test::TestServer;

    async fn whoami(caller: CallerIdentity) -> Json<(String, String)> {
        Json((caller.user_id, caller.username))
    }

    fn server() -> TestServer {
        TestServer::new(Router::new().route("/whoami", get(whoami))).unwrap()
    }

    #[tokio::test]
    async fn reads_both_headers() {
        let response = server()
            .get("/whoami")
            .add_header(HeaderName::from_static(USER_ID_HEADER), HeaderValue::from_static("u-42"))
            .add_header(HeaderName::from_static(USER_NAME_HEADER), HeaderValue::from_static("ada"))
            .await;

        response.assert_status_ok();
        assert_eq!(
            response.json::<(String, String)>(),
            ("u-42".to_string(), "ada".to_string())
        );
    }

    #[tokio::test]
    async fn name_defaults_to_id() {
        let response = server()
            .get("/whoami")
            .add_header(HeaderName::from_static(USER_ID_HEADER), HeaderValue::from_static("u-7"))
            .await;

        assert_eq!(response.json::<(String, String)>().1, "u-7");
    }

    #[tokio::test]
    async fn missing_user_is_unauthorized() {
        let response = server().get("/whoami").await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<serde_json::Value>()["code"], "UNAUTHORIZED");
    }
}
