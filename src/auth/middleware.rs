use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::AppError;

use super::{AuthContext, IdentityProvider};

/// Verifies `Authorization: Bearer <id token>` when present and attaches the
/// resulting [`AuthContext`]. Requests without the header pass through with
/// no identity; a malformed header or rejected token ends the request with 401.
pub async fn authenticate(
    State(identity): State<IdentityProvider>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(header) = request.headers().get(AUTHORIZATION) else {
        return Ok(next.run(request).await);
    };

    let Some(token) = header.to_str().ok().and_then(bearer_token) else {
        warn!("malformed authorization header");
        return Err(AppError::unauthorized("malformed authorization header"));
    };

    let context = identity.verify(token).await.inspect_err(|err| {
        warn!(error = %err, "bearer token not accepted");
    })?;

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// The credentials of a `Bearer` authorization value. The scheme is
/// case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl<S: Send + Sync> FromRequestParts<S> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("authentication required"))
    }
}
