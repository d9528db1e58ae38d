pub mod admin;
pub mod credits;
pub mod jobs;
pub mod worker;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use reelworks_model::ActorId;

use crate::errors::AppError;

/// Caller identity from the `X-Actor-Id` header, as stamped by the
/// authenticating proxy in front of this service. Required on every
/// mutating endpoint so transactions and audit entries carry a real
/// actor.
#[derive(Debug, Clone)]
pub struct Actor(pub ActorId);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get("x-actor-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::bad_request("missing X-Actor-Id header")
            })?;
        Ok(Actor(ActorId::new(value)))
    }
}
