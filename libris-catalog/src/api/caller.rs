//! Caller identity extractor
//!
//! Authentication happens upstream; the authenticated caller id arrives in
//! the `x-caller-id` header. Requests without it are rejected with 401.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;
use crate::import::CallerIdentity;

pub const CALLER_HEADER: &str = "x-caller-id";

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(CallerIdentity::new)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", CALLER_HEADER)))
    }
}
