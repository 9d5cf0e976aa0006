//! services/api/src/web/middleware.rs
//!
//! Identity middleware for protecting routes.

use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::ApiError;

/// Header carrying the caller's user id, set by the upstream authentication proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, available to handlers as `Extension<Identity>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity(pub String);

/// Middleware that extracts the caller's id and inserts it into the request extensions.
///
/// If the header is missing or blank, returns 401 Unauthorized.
pub async fn require_identity(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::Unauthenticated)?
        .to_string();

    req.extensions_mut().insert(Identity(user_id));
    Ok(next.run(req).await)
}
