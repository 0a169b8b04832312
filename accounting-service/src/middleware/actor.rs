use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

/// Acting user extractor.
///
/// Reads the numeric user id from the X-User-ID header set by the gateway.
/// Order creation records it as `created_by`, and the user-invoice listing is
/// scoped to it.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header")))?;

        let user_id: i64 = raw.parse().map_err(|_| {
            AppError::Unauthorized(anyhow::anyhow!("X-User-ID header must be a numeric id"))
        })?;

        tracing::Span::current().record("user_id", user_id);

        Ok(Actor(user_id))
    }
}
